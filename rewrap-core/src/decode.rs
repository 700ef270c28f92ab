//! Streaming decoder adapters.
//!
//! A decoder is configured once from a stream config, fed packets strictly
//! in increasing timestamp order, and emits frames through a sink callback
//! as they become available. After the last packet the caller flushes the
//! decoder; teardown happens on every exit path because the decoder is an
//! owned value.
//!
//! Decoder failures are returned as [`DecodeError`] values on a distinct
//! channel from the frame sink; there is no retry and no partial-result
//! recovery.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CodecParameters, Decoder as _, DecoderOptions};
use symphonia::core::formats::Packet as SymphoniaPacket;
use thiserror::Error;

use openh264::decoder::Decoder as H264Decoder;
use openh264::formats::YUVSource;

use crate::config::{symphonia_codec_type, AudioDecoderConfig, VideoDecoderConfig};
use crate::h264::{avcc_to_annexb, AvcConfig};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("decoder init failed: {0}")]
    Init(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

// ============================================================================
// Frames
// ============================================================================

/// Decoded raw audio: planar f32 samples, one plane per channel.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Presentation timestamp in microseconds
    pub timestamp_us: i64,
    pub sample_rate: u32,
    pub channels: u32,
    pub planes: Vec<Vec<f32>>,
}

impl AudioFrame {
    pub fn samples_per_channel(&self) -> usize {
        self.planes.first().map(|p| p.len()).unwrap_or(0)
    }
}

/// Decoded raw video: I420 pixel buffer with coded dimensions.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation timestamp in microseconds
    pub timestamp_us: i64,
    pub coded_width: u32,
    pub coded_height: u32,
    pub keyframe: bool,
    /// Y plane followed by U and V planes, no padding between rows
    pub data: Vec<u8>,
}

// ============================================================================
// Audio Decoder (symphonia)
// ============================================================================

pub struct AudioStreamDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl AudioStreamDecoder {
    pub fn new(config: &AudioDecoderConfig) -> Result<Self, DecodeError> {
        let codec = symphonia_codec_type(&config.codec)
            .ok_or_else(|| DecodeError::UnsupportedCodec(config.codec.clone()))?;

        let mut params = CodecParameters::new();
        params
            .for_codec(codec)
            .with_sample_rate(config.sample_rate)
            .with_channels(channel_mask(config.channels))
            .with_max_frames_per_packet(64 * 1024);
        match config.codec.as_str() {
            "pcm-f32" => {
                params.with_bits_per_sample(32);
            }
            "pcm-s16" => {
                params.with_bits_per_sample(16);
            }
            _ => {}
        }
        if let Some(description) = &config.description {
            params.with_extra_data(description.clone().into_boxed_slice());
        }

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Init(e.to_string()))?;

        Ok(Self {
            decoder,
            sample_buf: None,
        })
    }

    /// Decode one packet; any produced frame is handed to `sink`.
    pub fn decode(
        &mut self,
        timestamp_us: i64,
        data: &[u8],
        sink: &mut dyn FnMut(AudioFrame),
    ) -> Result<(), DecodeError> {
        let packet = SymphoniaPacket::new_from_slice(0, timestamp_us.max(0) as u64, 0, data);
        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| DecodeError::DecodeFailed(e.to_string()))?;

        let spec = *decoded.spec();
        let buf = self
            .sample_buf
            .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        buf.copy_planar_ref(decoded);

        let channels = spec.channels.count();
        let samples = buf.samples();
        let per_channel = if channels > 0 {
            samples.len() / channels
        } else {
            0
        };

        let planes = (0..channels)
            .map(|c| samples[c * per_channel..(c + 1) * per_channel].to_vec())
            .collect();

        sink(AudioFrame {
            timestamp_us,
            sample_rate: spec.rate,
            channels: channels as u32,
            planes,
        });
        Ok(())
    }

    /// Drain the decoder after the last packet.
    pub fn flush(&mut self, _sink: &mut dyn FnMut(AudioFrame)) -> Result<(), DecodeError> {
        // symphonia decoders emit one buffer per packet; finalize only
        // verifies, it never produces more frames.
        let _ = self.decoder.finalize();
        Ok(())
    }
}

fn channel_mask(channels: u32) -> Channels {
    match channels {
        1 => Channels::FRONT_LEFT,
        2 => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        n => Channels::from_bits_truncate((1u32 << n.min(31)) - 1),
    }
}

// ============================================================================
// Video Decoder (openh264)
// ============================================================================

pub struct VideoStreamDecoder {
    decoder: H264Decoder,
    /// NAL length prefix size for AVCC payloads; 0 means Annex B already
    nal_length_size: usize,
    /// SPS/PPS to feed ahead of the first packet
    pending_parameter_sets: Option<Vec<u8>>,
}

impl VideoStreamDecoder {
    pub fn new(config: &VideoDecoderConfig) -> Result<Self, DecodeError> {
        if !(config.codec.starts_with("avc1") || config.codec.starts_with("avc3")) {
            return Err(DecodeError::UnsupportedCodec(config.codec.clone()));
        }

        let (nal_length_size, pending_parameter_sets) = match &config.description {
            Some(extradata) => {
                let avc = AvcConfig::parse(extradata)
                    .ok_or_else(|| DecodeError::Init("malformed avcC extradata".into()))?;
                (avc.nal_length_size, Some(avc.parameter_sets_annexb()))
            }
            None => (0, None),
        };

        let decoder = H264Decoder::new().map_err(|e| DecodeError::Init(e.to_string()))?;

        Ok(Self {
            decoder,
            nal_length_size,
            pending_parameter_sets,
        })
    }

    /// Decode one packet; any produced frame is handed to `sink`.
    pub fn decode(
        &mut self,
        timestamp_us: i64,
        keyframe: bool,
        data: &[u8],
        sink: &mut dyn FnMut(VideoFrame),
    ) -> Result<(), DecodeError> {
        let mut bitstream = self.pending_parameter_sets.take().unwrap_or_default();
        if self.nal_length_size > 0 && !crate::h264::is_annexb(data) {
            bitstream.extend_from_slice(&avcc_to_annexb(data, self.nal_length_size));
        } else {
            bitstream.extend_from_slice(data);
        }

        let decoded = self
            .decoder
            .decode(&bitstream)
            .map_err(|e| DecodeError::DecodeFailed(e.to_string()))?;

        if let Some(yuv) = decoded {
            sink(copy_yuv(&yuv, timestamp_us, keyframe));
        }
        Ok(())
    }

    /// Drain the decoder after the last packet.
    pub fn flush(&mut self, _sink: &mut dyn FnMut(VideoFrame)) -> Result<(), DecodeError> {
        // openh264 emits frames synchronously in decode order; nothing is
        // buffered once the last packet has been submitted.
        Ok(())
    }
}

/// Copy a decoded picture into a tightly packed I420 buffer.
fn copy_yuv(yuv: &impl YUVSource, timestamp_us: i64, keyframe: bool) -> VideoFrame {
    let (width, height) = yuv.dimensions();
    let (stride_y, stride_u, stride_v) = yuv.strides();
    let chroma_width = (width + 1) / 2;
    let chroma_height = (height + 1) / 2;

    let mut data = Vec::with_capacity(width * height + 2 * chroma_width * chroma_height);
    for row in 0..height {
        let start = row * stride_y;
        data.extend_from_slice(&yuv.y()[start..start + width]);
    }
    for row in 0..chroma_height {
        let start = row * stride_u;
        data.extend_from_slice(&yuv.u()[start..start + chroma_width]);
    }
    for row in 0..chroma_height {
        let start = row * stride_v;
        data.extend_from_slice(&yuv.v()[start..start + chroma_width]);
    }

    VideoFrame {
        timestamp_us,
        coded_width: width as u32,
        coded_height: height as u32,
        keyframe,
        data,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_config(channels: u32) -> AudioDecoderConfig {
        AudioDecoderConfig {
            codec: "pcm-f32".to_string(),
            sample_rate: 44_100,
            channels,
            description: None,
        }
    }

    #[test]
    fn pcm_packet_decodes_to_planar_f32() {
        let mut decoder = AudioStreamDecoder::new(&pcm_config(1)).expect("decoder");

        let samples = [0.0f32, 0.5, -0.5, 1.0];
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }

        let mut frames = Vec::new();
        decoder
            .decode(7_000, &data, &mut |f| frames.push(f))
            .expect("decode");
        decoder.flush(&mut |f| frames.push(f)).expect("flush");

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.timestamp_us, 7_000);
        assert_eq!(frame.channels, 1);
        assert_eq!(frame.planes.len(), 1);
        assert_eq!(frame.planes[0], samples);
    }

    #[test]
    fn unknown_audio_codec_is_rejected() {
        let config = AudioDecoderConfig {
            codec: "speex".to_string(),
            sample_rate: 8_000,
            channels: 1,
            description: None,
        };
        assert!(matches!(
            AudioStreamDecoder::new(&config),
            Err(DecodeError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn video_decoder_requires_h264() {
        let config = VideoDecoderConfig {
            codec: "vp8".to_string(),
            coded_width: 320,
            coded_height: 240,
            description: None,
        };
        assert!(matches!(
            VideoStreamDecoder::new(&config),
            Err(DecodeError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn malformed_extradata_fails_init() {
        let config = VideoDecoderConfig {
            codec: "avc1.42001e".to_string(),
            coded_width: 320,
            coded_height: 240,
            description: Some(vec![0xde, 0xad]),
        };
        assert!(matches!(
            VideoStreamDecoder::new(&config),
            Err(DecodeError::Init(_))
        ));
    }
}
