//! Packets, stream descriptors and time bases.
//!
//! Timestamps travel as a 64-bit value split across two 32-bit halves
//! (unsigned low word plus signed high word), the layout the packet I/O
//! layer exchanges with 32-bit hosts. Conversion to wall-clock units goes
//! through a rational [`TimeBase`].

use serde::{Deserialize, Serialize};

/// Bit 0 of [`Packet::flags`]: the packet starts a key frame.
pub const PACKET_FLAG_KEY: u32 = 1;

// ============================================================================
// Time Base
// ============================================================================

/// Rational scale factor converting stream timestamp ticks to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl TimeBase {
    /// Microsecond time base (1/1000000)
    pub const MICROSECONDS: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Scale a raw stream timestamp into microseconds.
    ///
    /// Negative timestamps are clamped to zero before scaling; the result is
    /// rounded to the nearest integer.
    pub fn to_micros(&self, ticks: i64) -> i64 {
        let ticks = ticks.max(0);
        if self.den == 0 {
            return 0;
        }
        (ticks as f64 * self.num as f64 / self.den as f64 * 1_000_000.0).round() as i64
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

// ============================================================================
// Packet
// ============================================================================

/// A compressed chunk of media data with timing metadata.
///
/// Lives for a single pipeline pass: produced by demuxing (or supplied by
/// the caller), consumed by a decoder or muxer.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Index of the stream this packet belongs to
    pub stream_index: u32,
    /// Presentation timestamp, low 32 bits
    pub pts: u32,
    /// Presentation timestamp, signed high 32 bits
    pub pts_hi: i32,
    /// Decode timestamp, low 32 bits
    pub dts: u32,
    /// Decode timestamp, signed high 32 bits
    pub dts_hi: i32,
    /// Flag bits; bit 0 marks a key frame
    pub flags: u32,
    /// Compressed payload
    pub data: Vec<u8>,
}

impl Packet {
    /// Build a packet with pts == dts from a full 64-bit timestamp.
    pub fn new(stream_index: u32, ts: i64, keyframe: bool, data: Vec<u8>) -> Self {
        let (lo, hi) = split_ts(ts);
        Self {
            stream_index,
            pts: lo,
            pts_hi: hi,
            dts: lo,
            dts_hi: hi,
            flags: if keyframe { PACKET_FLAG_KEY } else { 0 },
            data,
        }
    }

    /// Reconstruct the presentation timestamp from its two halves.
    pub fn pts64(&self) -> i64 {
        join_ts(self.pts, self.pts_hi)
    }

    /// Reconstruct the decode timestamp from its two halves.
    pub fn dts64(&self) -> i64 {
        join_ts(self.dts, self.dts_hi)
    }

    pub fn is_key(&self) -> bool {
        self.flags & PACKET_FLAG_KEY != 0
    }
}

/// Split a 64-bit timestamp into (low, high) halves.
pub fn split_ts(ts: i64) -> (u32, i32) {
    (ts as u32, (ts >> 32) as i32)
}

/// Join (low, high) halves back into a 64-bit timestamp.
pub fn join_ts(lo: u32, hi: i32) -> i64 {
    ((hi as i64) << 32) | lo as i64
}

// ============================================================================
// Stream Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Audio,
    Video,
}

/// Per-kind stream parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamParams {
    Audio { sample_rate: u32, channels: u32 },
    Video { width: u32, height: u32 },
}

/// An elementary stream as reported by the demuxer.
///
/// Derived once per source file and read-only afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Position of the stream among the demuxed streams
    pub index: u32,
    pub kind: StreamKind,
    /// Codec string in WebCodecs registry form ("avc1.42001e", "opus", ...)
    pub codec: String,
    /// Scale from packet timestamp ticks to seconds
    pub time_base: TimeBase,
    /// Codec-specific out-of-band configuration bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extradata: Option<Vec<u8>>,
    pub params: StreamParams,
}

// ============================================================================
// Tests
// ============================================================================
