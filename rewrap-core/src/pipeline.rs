//! The demo pipelines, each a flat sequence of adapter calls.
//!
//! - demux: open file, enumerate streams, read every packet into memory
//! - decode: configure a decoder, feed packets in order, collect frames,
//!   flush
//! - remux: wrap packets with millisecond timestamps, prime missing header
//!   metadata, write header + packets + trailer, return the file bytes
//!
//! No state outlives a single call; each pipeline owns its adapter values
//! and drops them on every exit path.

use std::path::Path;

use crate::config::{
    matroska_codec_id, stream_to_config, AudioDecoderConfig, VideoDecoderConfig,
};
use crate::decode::{
    AudioFrame, AudioStreamDecoder, DecodeError, VideoFrame, VideoStreamDecoder,
};
use crate::demux::{DemuxError, DemuxOutput, MediaDemuxer};
use crate::mux::{prime_video_context, MkvMuxer, MuxError, MuxTrack};
use crate::packet::{Packet, StreamInfo, StreamParams};

/// Demux pipeline: load a file and return its stream descriptors, decoder
/// configs and the complete packet list.
pub fn demux_file(path: &Path) -> Result<DemuxOutput, DemuxError> {
    let mut demuxer = MediaDemuxer::open(path)?;
    let streams = demuxer.streams().to_vec();
    let configs = streams.iter().map(stream_to_config).collect();
    let packets = demuxer.read_all()?;
    tracing::debug!(
        streams = streams.len(),
        packets = packets.len(),
        "demux complete"
    );
    Ok(DemuxOutput {
        streams,
        configs,
        packets,
    })
}

/// Decode pipeline, audio flavor: feed the stream's packets in order,
/// timestamps scaled to microseconds, and collect the planar frames.
pub fn decode_audio_stream(
    config: &AudioDecoderConfig,
    packets: &[Packet],
    stream: &StreamInfo,
) -> Result<Vec<AudioFrame>, DecodeError> {
    let mut decoder = AudioStreamDecoder::new(config)?;
    let mut frames = Vec::new();

    for packet in packets.iter().filter(|p| p.stream_index == stream.index) {
        let timestamp_us = stream.time_base.to_micros(packet.pts64());
        decoder.decode(timestamp_us, &packet.data, &mut |f| frames.push(f))?;
    }
    decoder.flush(&mut |f| frames.push(f))?;

    Ok(frames)
}

/// Decode pipeline, video flavor.
pub fn decode_video_stream(
    config: &VideoDecoderConfig,
    packets: &[Packet],
    stream: &StreamInfo,
) -> Result<Vec<VideoFrame>, DecodeError> {
    let mut decoder = VideoStreamDecoder::new(config)?;
    let mut frames = Vec::new();

    for packet in packets.iter().filter(|p| p.stream_index == stream.index) {
        let timestamp_us = stream.time_base.to_micros(packet.pts64());
        decoder.decode(timestamp_us, packet.is_key(), &packet.data, &mut |f| {
            frames.push(f)
        })?;
    }
    decoder.flush(&mut |f| frames.push(f))?;

    Ok(frames)
}

/// Mux pipeline: re-wrap one stream's packets into a fresh container and
/// return its bytes.
///
/// Timestamps are scaled to microseconds and truncated to milliseconds,
/// matching the container's timestamp scale. Video tracks with unknown
/// coded dimensions are primed from extradata plus the first packet.
pub fn remux_stream(packets: &[Packet], stream: &StreamInfo) -> Result<Vec<u8>, MuxError> {
    let codec_id = matroska_codec_id(&stream.codec)
        .ok_or_else(|| MuxError::UnsupportedCodec(stream.codec.clone()))?;

    let stream_packets: Vec<&Packet> = packets
        .iter()
        .filter(|p| p.stream_index == stream.index)
        .collect();

    let params = match stream.params {
        StreamParams::Video { width, height } => {
            let ctx = prime_video_context(
                width,
                height,
                stream.extradata.as_deref(),
                stream_packets.first().map(|p| p.data.as_slice()),
            )?;
            StreamParams::Video {
                width: ctx.width,
                height: ctx.height,
            }
        }
        StreamParams::Audio { .. } => stream.params.clone(),
    };

    let mut muxer = MkvMuxer::new(MuxTrack {
        codec_id: codec_id.to_string(),
        codec_private: stream.extradata.clone(),
        params,
    });

    muxer.write_header()?;
    for packet in &stream_packets {
        let pts_ms = stream.time_base.to_micros(packet.pts64()) / 1000;
        muxer.write_packet(pts_ms, packet.is_key(), &packet.data)?;
    }
    muxer.finalize()
}

/// Concatenate one channel across frames, the way the waveform demo glues
/// its decoded output together before rendering.
pub fn concat_channel(frames: &[AudioFrame], channel: usize) -> Vec<f32> {
    let mut out = Vec::new();
    for frame in frames {
        if let Some(plane) = frame.planes.get(channel) {
            out.extend_from_slice(plane);
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{StreamKind, TimeBase};
    use std::io::Write;

    fn pcm_stream() -> StreamInfo {
        StreamInfo {
            index: 0,
            kind: StreamKind::Audio,
            codec: "pcm-f32".to_string(),
            time_base: TimeBase::new(1, 1000),
            extradata: None,
            params: StreamParams::Audio {
                sample_rate: 44_100,
                channels: 1,
            },
        }
    }

    fn pcm_config() -> AudioDecoderConfig {
        AudioDecoderConfig {
            codec: "pcm-f32".to_string(),
            sample_rate: 44_100,
            channels: 1,
            description: None,
        }
    }

    fn pcm_packet(pts_ms: i64, samples: &[f32]) -> Packet {
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        Packet::new(0, pts_ms, true, data)
    }

    #[test]
    fn empty_packet_list_decodes_to_no_frames() {
        let frames = decode_audio_stream(&pcm_config(), &[], &pcm_stream()).expect("decode");
        assert!(frames.is_empty());

        let video_stream = StreamInfo {
            index: 0,
            kind: StreamKind::Video,
            codec: "avc1.42001e".to_string(),
            time_base: TimeBase::new(1, 1000),
            extradata: None,
            params: StreamParams::Video {
                width: 320,
                height: 240,
            },
        };
        let video_config = VideoDecoderConfig {
            codec: "avc1.42001e".to_string(),
            coded_width: 320,
            coded_height: 240,
            description: None,
        };
        let frames =
            decode_video_stream(&video_config, &[], &video_stream).expect("decode");
        assert!(frames.is_empty());
    }

    #[test]
    fn audio_timestamps_are_scaled_to_micros() {
        let packets = vec![
            pcm_packet(0, &[0.1, 0.2]),
            pcm_packet(50, &[0.3, 0.4]),
        ];
        let frames =
            decode_audio_stream(&pcm_config(), &packets, &pcm_stream()).expect("decode");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].timestamp_us, 0);
        assert_eq!(frames[1].timestamp_us, 50_000);
    }

    #[test]
    fn packets_from_other_streams_are_ignored() {
        let mut foreign = pcm_packet(0, &[0.5]);
        foreign.stream_index = 3;
        let frames =
            decode_audio_stream(&pcm_config(), &[foreign], &pcm_stream()).expect("decode");
        assert!(frames.is_empty());
    }

    #[test]
    fn concat_channel_glues_frames_in_order() {
        let packets = vec![pcm_packet(0, &[0.1, 0.2]), pcm_packet(1, &[0.3])];
        let frames =
            decode_audio_stream(&pcm_config(), &packets, &pcm_stream()).expect("decode");
        let glued = concat_channel(&frames, 0);
        assert_eq!(glued, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn demux_decode_remux_round_trip() {
        // Mux a small PCM file, demux it back, decode it, and re-mux it.
        let samples: Vec<[f32; 2]> = vec![[0.0, 0.5], [-0.5, 1.0], [0.25, -0.25]];

        let mut muxer = MkvMuxer::new(MuxTrack {
            codec_id: "A_PCM/FLOAT/IEEE".to_string(),
            codec_private: None,
            params: StreamParams::Audio {
                sample_rate: 44_100,
                channels: 1,
            },
        });
        muxer.write_header().expect("header");
        for (i, pair) in samples.iter().enumerate() {
            let mut data = Vec::new();
            for s in pair {
                data.extend_from_slice(&s.to_le_bytes());
            }
            muxer.write_packet(i as i64 * 10, true, &data).expect("packet");
        }
        let bytes = muxer.finalize().expect("finalize");

        let mut file = tempfile::Builder::new()
            .suffix(".mka")
            .tempfile()
            .expect("tempfile");
        file.write_all(&bytes).expect("write");

        let output = demux_file(file.path()).expect("demux");
        assert_eq!(output.streams.len(), 1);
        assert_eq!(output.packets.len(), samples.len());
        let stream = &output.streams[0];
        assert_eq!(stream.codec, "pcm-f32");
        assert!(output.packets.iter().all(|p| p.is_key()));

        // decode and check the glued channel
        let config = match &output.configs[0] {
            crate::config::DecoderConfig::Audio(c) => c.clone(),
            _ => panic!("expected audio config"),
        };
        let frames = decode_audio_stream(&config, &output.packets, stream).expect("decode");
        let glued = concat_channel(&frames, 0);
        let want: Vec<f32> = samples.iter().flatten().copied().collect();
        assert_eq!(glued, want);

        // re-mux and confirm the packet count survives
        let rewrapped = remux_stream(&output.packets, stream).expect("remux");
        let mut mkv = matroska_demuxer::MatroskaFile::open(std::io::Cursor::new(rewrapped))
            .expect("reopen");
        let mut frame = matroska_demuxer::Frame::default();
        let mut count = 0;
        while mkv.next_frame(&mut frame).expect("frame") {
            count += 1;
            assert!(frame.is_keyframe.unwrap_or(false));
        }
        assert_eq!(count, samples.len());
    }
}
