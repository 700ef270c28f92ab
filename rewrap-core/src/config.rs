//! Decoder configurations derived from stream descriptors.
//!
//! Configs follow the WebCodecs registry shape: a codec string plus the
//! out-of-band `description` bytes and the per-kind stream parameters.
//! Codec naming is mapped here in both directions (container codec ID to
//! codec string, and back for the muxer).

use serde::{Deserialize, Serialize};
use symphonia::core::codecs::{
    CodecType, CODEC_TYPE_AAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_OPUS,
    CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_VORBIS,
};

use crate::h264::AvcConfig;
use crate::packet::{StreamInfo, StreamKind, StreamParams};

// ============================================================================
// Config Types
// ============================================================================

/// Init object for an audio decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDecoderConfig {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Vec<u8>>,
}

/// Init object for a video decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDecoderConfig {
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DecoderConfig {
    Audio(AudioDecoderConfig),
    Video(VideoDecoderConfig),
}

/// Derive the decoder init object for one stream.
pub fn stream_to_config(stream: &StreamInfo) -> DecoderConfig {
    match (&stream.kind, &stream.params) {
        (StreamKind::Audio, StreamParams::Audio { sample_rate, channels }) => {
            DecoderConfig::Audio(AudioDecoderConfig {
                codec: stream.codec.clone(),
                sample_rate: *sample_rate,
                channels: *channels,
                description: stream.extradata.clone(),
            })
        }
        (StreamKind::Video, StreamParams::Video { width, height }) => {
            DecoderConfig::Video(VideoDecoderConfig {
                codec: stream.codec.clone(),
                coded_width: *width,
                coded_height: *height,
                description: stream.extradata.clone(),
            })
        }
        // A descriptor whose params disagree with its kind never leaves the
        // demuxer; fall back to an empty config of the declared kind.
        (StreamKind::Audio, _) => DecoderConfig::Audio(AudioDecoderConfig {
            codec: stream.codec.clone(),
            sample_rate: 0,
            channels: 0,
            description: stream.extradata.clone(),
        }),
        (StreamKind::Video, _) => DecoderConfig::Video(VideoDecoderConfig {
            codec: stream.codec.clone(),
            coded_width: 0,
            coded_height: 0,
            description: stream.extradata.clone(),
        }),
    }
}

// ============================================================================
// Codec Naming
// ============================================================================

/// Map a Matroska codec ID to a WebCodecs codec string.
///
/// For H.264 the profile/compat/level triple is read out of the avcC
/// extradata; without extradata a baseline default is used.
pub fn codec_string_from_matroska(codec_id: &str, extradata: Option<&[u8]>) -> Option<String> {
    match codec_id {
        "V_MPEG4/ISO/AVC" => Some(
            extradata
                .and_then(AvcConfig::parse)
                .map(|c| c.codec_string())
                .unwrap_or_else(|| "avc1.42001f".to_string()),
        ),
        "V_VP8" => Some("vp8".to_string()),
        "V_VP9" => Some("vp09.00.10.08".to_string()),
        "V_AV1" => Some("av01.0.01M.08".to_string()),
        "A_OPUS" => Some("opus".to_string()),
        "A_VORBIS" => Some("vorbis".to_string()),
        "A_FLAC" => Some("flac".to_string()),
        "A_MPEG/L3" => Some("mp3".to_string()),
        "A_PCM/FLOAT/IEEE" => Some("pcm-f32".to_string()),
        "A_PCM/INT/LIT" => Some("pcm-s16".to_string()),
        id if id.starts_with("A_AAC") => Some("mp4a.40.2".to_string()),
        _ => None,
    }
}

/// Map a WebCodecs codec string back to the Matroska codec ID the muxer
/// writes into the track entry.
pub fn matroska_codec_id(codec: &str) -> Option<&'static str> {
    if codec.starts_with("avc1") || codec.starts_with("avc3") {
        return Some("V_MPEG4/ISO/AVC");
    }
    if codec == "vp8" {
        return Some("V_VP8");
    }
    if codec.starts_with("vp09") || codec == "vp9" {
        return Some("V_VP9");
    }
    if codec.starts_with("av01") || codec == "av1" {
        return Some("V_AV1");
    }
    if codec.starts_with("mp4a") {
        return Some("A_AAC");
    }
    match codec {
        "opus" => Some("A_OPUS"),
        "vorbis" => Some("A_VORBIS"),
        "flac" => Some("A_FLAC"),
        "mp3" => Some("A_MPEG/L3"),
        "pcm-f32" => Some("A_PCM/FLOAT/IEEE"),
        "pcm-s16" => Some("A_PCM/INT/LIT"),
        _ => None,
    }
}

/// Codec string for a symphonia codec type (audio containers).
pub fn codec_string_from_symphonia(codec: CodecType) -> Option<String> {
    let name = match codec {
        c if c == CODEC_TYPE_MP3 => "mp3",
        c if c == CODEC_TYPE_FLAC => "flac",
        c if c == CODEC_TYPE_VORBIS => "vorbis",
        c if c == CODEC_TYPE_OPUS => "opus",
        c if c == CODEC_TYPE_AAC => "mp4a.40.2",
        c if c == CODEC_TYPE_PCM_F32LE => "pcm-f32",
        c if c == CODEC_TYPE_PCM_S16LE => "pcm-s16",
        _ => return None,
    };
    Some(name.to_string())
}

/// Symphonia codec type for a codec string (audio decode path).
pub fn symphonia_codec_type(codec: &str) -> Option<CodecType> {
    if codec.starts_with("mp4a") {
        return Some(CODEC_TYPE_AAC);
    }
    match codec {
        "mp3" => Some(CODEC_TYPE_MP3),
        "flac" => Some(CODEC_TYPE_FLAC),
        "vorbis" => Some(CODEC_TYPE_VORBIS),
        "opus" => Some(CODEC_TYPE_OPUS),
        "pcm-f32" => Some(CODEC_TYPE_PCM_F32LE),
        "pcm-s16" => Some(CODEC_TYPE_PCM_S16LE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TimeBase;

    #[test]
    fn avc_codec_string_uses_extradata_profile() {
        let avcc = vec![
            0x01, 0x64, 0x00, 0x28, 0xff, 0xe0, // high profile, level 4.0, no SPS
            0x00, // no PPS
        ];
        assert_eq!(
            codec_string_from_matroska("V_MPEG4/ISO/AVC", Some(&avcc)).unwrap(),
            "avc1.640028"
        );
        assert_eq!(
            codec_string_from_matroska("V_MPEG4/ISO/AVC", None).unwrap(),
            "avc1.42001f"
        );
    }

    #[test]
    fn codec_strings_map_back_to_matroska_ids() {
        for (codec, id) in [
            ("avc1.42001e", "V_MPEG4/ISO/AVC"),
            ("vp8", "V_VP8"),
            ("opus", "A_OPUS"),
            ("mp3", "A_MPEG/L3"),
            ("mp4a.40.2", "A_AAC"),
            ("pcm-f32", "A_PCM/FLOAT/IEEE"),
        ] {
            assert_eq!(matroska_codec_id(codec), Some(id));
        }
        assert_eq!(matroska_codec_id("theora"), None);
    }

    #[test]
    fn stream_config_carries_description() {
        let stream = StreamInfo {
            index: 0,
            kind: StreamKind::Audio,
            codec: "opus".to_string(),
            time_base: TimeBase::new(1, 48_000),
            extradata: Some(vec![1, 2, 3]),
            params: StreamParams::Audio {
                sample_rate: 48_000,
                channels: 2,
            },
        };

        match stream_to_config(&stream) {
            DecoderConfig::Audio(config) => {
                assert_eq!(config.codec, "opus");
                assert_eq!(config.sample_rate, 48_000);
                assert_eq!(config.description.as_deref(), Some(&[1u8, 2, 3][..]));
            }
            DecoderConfig::Video(_) => panic!("expected audio config"),
        }
    }
}
