//! # rewrap-core
//!
//! Media pipelines over pure Rust codecs: demux a container into streams,
//! configs and packets, decode packets into raw frames, render them, and
//! re-mux packets back into a container buffer.

// ============================================================================
// Data Model
// ============================================================================
pub mod config;
pub mod packet;

// ============================================================================
// Container Adapters
// ============================================================================
pub mod demux;
pub mod mux;

// ============================================================================
// Decoders
// ============================================================================
pub mod decode;
pub mod h264;

// ============================================================================
// Renderers
// ============================================================================
pub mod playback;
pub mod waveform;

// ============================================================================
// Pipelines
// ============================================================================
pub mod pipeline;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
