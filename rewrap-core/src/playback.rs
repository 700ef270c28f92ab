//! Fixed-interval frame playback.
//!
//! Approximates playback by cycling decoded frames on a fixed timer:
//! every `round(1000 / fps)` milliseconds the next frame is handed to the
//! present callback, wrapping back to the first frame after the last.

use std::time::Duration;

use crate::decode::VideoFrame;

/// Interval between presented frames for a target rate.
pub fn frame_interval(fps: f64) -> Duration {
    if fps <= 0.0 {
        return Duration::from_millis(1000);
    }
    Duration::from_millis((1000.0 / fps).round() as u64)
}

/// Cycle through `frames` for `cycles` full passes, presenting each frame
/// and sleeping the frame interval in between.
pub fn play_frames(
    frames: &[VideoFrame],
    fps: f64,
    cycles: usize,
    present: &mut dyn FnMut(&VideoFrame),
) {
    play_frames_with_interval(frames, frame_interval(fps), cycles, present)
}

/// Like [`play_frames`] with an explicit interval (tests pass zero).
pub fn play_frames_with_interval(
    frames: &[VideoFrame],
    interval: Duration,
    cycles: usize,
    present: &mut dyn FnMut(&VideoFrame),
) {
    if frames.is_empty() {
        return;
    }
    tracing::debug!(frames = frames.len(), ?interval, cycles, "starting playback");

    let mut idx = 0;
    let total = frames.len() * cycles;
    for shown in 0..total {
        present(&frames[idx]);
        idx += 1;
        if idx >= frames.len() {
            idx = 0;
        }
        if shown + 1 < total && !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
}
