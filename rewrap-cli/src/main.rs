//! # rewrap
//!
//! Command line front end for the rewrap media pipelines.
//!
//! ## Usage
//! ```bash
//! # Inspect a file's streams and decoder configs as JSON
//! rewrap probe input.mkv
//!
//! # Decode the first audio stream and render its waveform to a PNG
//! rewrap wave input.mka waveform.png
//!
//! # Decode the first video stream and cycle its frames at a fixed rate
//! rewrap play input.mkv --fps 30 --cycles 1
//!
//! # Re-wrap one stream's packets into a fresh container
//! rewrap remux input.mkv output.mkv --stream 0
//!
//! # With debug logging
//! RUST_LOG=debug rewrap probe input.mkv
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tracing::info;

use rewrap_core::config::DecoderConfig;
use rewrap_core::packet::StreamKind;
use rewrap_core::pipeline::{
    concat_channel, decode_audio_stream, decode_video_stream, demux_file, remux_stream,
};
use rewrap_core::playback::play_frames;
use rewrap_core::waveform::{encode_png, render_waveform_default};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rewrap=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = match args.get(1).map(String::as_str) {
        Some("probe") => cmd_probe(&args[2..]),
        Some("wave") => cmd_wave(&args[2..]),
        Some("play") => cmd_play(&args[2..]),
        Some("remux") => cmd_remux(&args[2..]),
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        Some(other) => {
            print_usage();
            Err(anyhow!("unknown command: {other}"))
        }
        None => {
            print_usage();
            Err(anyhow!("missing command"))
        }
    };
    command
}

fn print_usage() {
    eprintln!(
        "\nrewrap v{}\n\n\
         Usage:\n  \
         rewrap probe <input>\n  \
         rewrap wave <input> <output.png>\n  \
         rewrap play <input> [--fps <n>] [--cycles <n>]\n  \
         rewrap remux <input> <output> [--stream <index>]\n",
        rewrap_core::VERSION
    );
}

// ============================================================================
// probe
// ============================================================================

fn cmd_probe(args: &[String]) -> Result<()> {
    let input = required_path(args, 0, "probe <input>")?;
    let output = demux_file(&input).with_context(|| format!("demuxing {}", input.display()))?;

    let report = json!({
        "file": input.display().to_string(),
        "streams": output.streams,
        "configs": output.configs,
        "packets": output.packets.len(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ============================================================================
// wave
// ============================================================================

fn cmd_wave(args: &[String]) -> Result<()> {
    let input = required_path(args, 0, "wave <input> <output.png>")?;
    let dest = required_path(args, 1, "wave <input> <output.png>")?;

    let output = demux_file(&input).with_context(|| format!("demuxing {}", input.display()))?;
    let (stream, config) = find_stream(&output.streams, &output.configs, StreamKind::Audio)?;
    let config = match config {
        DecoderConfig::Audio(c) => c,
        DecoderConfig::Video(_) => return Err(anyhow!("stream {} is not audio", stream.index)),
    };

    let frames = decode_audio_stream(config, &output.packets, stream)?;
    info!(frames = frames.len(), "audio decoded");

    let samples = concat_channel(&frames, 0);
    let image = render_waveform_default(&samples);
    let png = encode_png(&image)?;
    std::fs::write(&dest, png).with_context(|| format!("writing {}", dest.display()))?;

    info!(samples = samples.len(), dest = %dest.display(), "waveform written");
    Ok(())
}

// ============================================================================
// play
// ============================================================================

fn cmd_play(args: &[String]) -> Result<()> {
    let input = required_path(args, 0, "play <input> [--fps <n>] [--cycles <n>]")?;
    let fps: f64 = flag_value(args, "--fps")?.unwrap_or(30.0);
    let cycles: usize = flag_value(args, "--cycles")?.unwrap_or(1);

    let output = demux_file(&input).with_context(|| format!("demuxing {}", input.display()))?;
    let (stream, config) = find_stream(&output.streams, &output.configs, StreamKind::Video)?;
    let config = match config {
        DecoderConfig::Video(c) => c,
        DecoderConfig::Audio(_) => return Err(anyhow!("stream {} is not video", stream.index)),
    };

    let frames = decode_video_stream(config, &output.packets, stream)?;
    if frames.is_empty() {
        return Err(anyhow!("no frames decoded from stream {}", stream.index));
    }
    info!(frames = frames.len(), fps, cycles, "starting playback");

    play_frames(&frames, fps, cycles, &mut |frame| {
        println!(
            "frame pts={}us {}x{}{}",
            frame.timestamp_us,
            frame.coded_width,
            frame.coded_height,
            if frame.keyframe { " key" } else { "" }
        );
    });
    Ok(())
}

// ============================================================================
// remux
// ============================================================================

fn cmd_remux(args: &[String]) -> Result<()> {
    let input = required_path(args, 0, "remux <input> <output> [--stream <index>]")?;
    let dest = required_path(args, 1, "remux <input> <output> [--stream <index>]")?;
    let stream_index: u32 = flag_value(args, "--stream")?.unwrap_or(0);

    let output = demux_file(&input).with_context(|| format!("demuxing {}", input.display()))?;
    let stream = output
        .streams
        .iter()
        .find(|s| s.index == stream_index)
        .ok_or_else(|| anyhow!("no stream with index {stream_index}"))?;

    let bytes = remux_stream(&output.packets, stream)?;
    std::fs::write(&dest, &bytes).with_context(|| format!("writing {}", dest.display()))?;

    info!(
        stream = stream_index,
        bytes = bytes.len(),
        dest = %dest.display(),
        "stream re-wrapped"
    );
    Ok(())
}

// ============================================================================
// Argument helpers
// ============================================================================

fn required_path(args: &[String], index: usize, usage: &str) -> Result<PathBuf> {
    args.get(index)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: rewrap {usage}"))
}

fn flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let raw = args
        .get(pos + 1)
        .ok_or_else(|| anyhow!("{flag} needs a value"))?;
    raw.parse()
        .map(Some)
        .map_err(|e| anyhow!("invalid value for {flag}: {e}"))
}

fn find_stream<'a>(
    streams: &'a [rewrap_core::packet::StreamInfo],
    configs: &'a [DecoderConfig],
    kind: StreamKind,
) -> Result<(&'a rewrap_core::packet::StreamInfo, &'a DecoderConfig)> {
    streams
        .iter()
        .zip(configs)
        .find(|(s, _)| s.kind == kind)
        .ok_or_else(|| anyhow!("no {kind:?} stream in file"))
}
