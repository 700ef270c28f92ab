//! Minimal single-track Matroska muxer over an in-memory buffer.
//!
//! Layout: EBML header, then one Segment holding Info, Tracks, and one
//! Cluster + SimpleBlock per packet (millisecond timestamps). The segment
//! size is backfilled when the muxer is finalized, which stands in for the
//! container trailer.
//!
//! Matroska requires coded dimensions in the track header before the first
//! cluster is written, but a caller re-wrapping raw packets may only hold
//! extradata. [`prime_video_context`] recovers the missing metadata: parse
//! the parameter sets and, if that is not enough, decode the first packet.

use bytes::BufMut;
use thiserror::Error;

use openh264::decoder::Decoder as H264Decoder;
use openh264::formats::YUVSource;

use crate::h264::{avcc_to_annexb, AvcConfig};
use crate::packet::StreamParams;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("header metadata incomplete: {0}")]
    MissingHeaderData(String),
    #[error("codec context priming failed: {0}")]
    Prime(String),
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("muxer misuse: {0}")]
    Misuse(&'static str),
}

// ============================================================================
// EBML element IDs
// ============================================================================

const ID_EBML: u32 = 0x1A45_DFA3;
const ID_EBML_VERSION: u32 = 0x4286;
const ID_EBML_READ_VERSION: u32 = 0x42F7;
const ID_EBML_MAX_ID_LENGTH: u32 = 0x42F2;
const ID_EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
const ID_DOC_TYPE: u32 = 0x4282;
const ID_DOC_TYPE_VERSION: u32 = 0x4287;
const ID_DOC_TYPE_READ_VERSION: u32 = 0x4285;

const ID_SEGMENT: u32 = 0x1853_8067;
const ID_INFO: u32 = 0x1549_A966;
const ID_TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
const ID_MUXING_APP: u32 = 0x4D80;
const ID_WRITING_APP: u32 = 0x5741;

const ID_TRACKS: u32 = 0x1654_AE6B;
const ID_TRACK_ENTRY: u32 = 0xAE;
const ID_TRACK_NUMBER: u32 = 0xD7;
const ID_TRACK_UID: u32 = 0x73C5;
const ID_TRACK_TYPE: u32 = 0x83;
const ID_FLAG_LACING: u32 = 0x9C;
const ID_CODEC_ID: u32 = 0x86;
const ID_CODEC_PRIVATE: u32 = 0x63A2;
const ID_VIDEO: u32 = 0xE0;
const ID_PIXEL_WIDTH: u32 = 0xB0;
const ID_PIXEL_HEIGHT: u32 = 0xBA;
const ID_AUDIO: u32 = 0xE1;
const ID_SAMPLING_FREQUENCY: u32 = 0xB5;
const ID_CHANNELS: u32 = 0x9F;

const ID_CLUSTER: u32 = 0x1F43_B675;
const ID_CLUSTER_TIMESTAMP: u32 = 0xE7;
const ID_SIMPLE_BLOCK: u32 = 0xA3;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

/// Nanoseconds per timestamp tick (1 ms).
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;

// ============================================================================
// EBML writing helpers
// ============================================================================

/// Write an element ID verbatim (IDs carry their own length marker).
fn put_id(buf: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    buf.put_slice(&bytes[skip..]);
}

/// Number of bytes a size vint needs for `value`.
fn size_len(value: u64) -> usize {
    for len in 1..8usize {
        // all-ones payloads are reserved for "unknown size"
        if value < (1u64 << (7 * len)) - 1 {
            return len;
        }
    }
    8
}

/// Write an element size as a minimal-length vint.
fn put_size(buf: &mut Vec<u8>, value: u64) {
    let len = size_len(value);
    let marker = 1u64 << (7 * len);
    let encoded = marker | value;
    let bytes = encoded.to_be_bytes();
    buf.put_slice(&bytes[8 - len..]);
}

fn put_uint(buf: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    put_id(buf, id);
    put_size(buf, (8 - skip) as u64);
    buf.put_slice(&bytes[skip..]);
}

fn put_float(buf: &mut Vec<u8>, id: u32, value: f64) {
    put_id(buf, id);
    put_size(buf, 8);
    buf.put_f64(value);
}

fn put_string(buf: &mut Vec<u8>, id: u32, value: &str) {
    put_binary(buf, id, value.as_bytes());
}

fn put_binary(buf: &mut Vec<u8>, id: u32, value: &[u8]) {
    put_id(buf, id);
    put_size(buf, value.len() as u64);
    buf.put_slice(value);
}

fn put_master(buf: &mut Vec<u8>, id: u32, payload: &[u8]) {
    put_binary(buf, id, payload);
}

// ============================================================================
// Muxer
// ============================================================================

/// The single track a muxer instance writes.
#[derive(Debug, Clone)]
pub struct MuxTrack {
    /// Matroska codec ID ("V_MPEG4/ISO/AVC", "A_OPUS", ...)
    pub codec_id: String,
    /// Codec-specific extradata, written as CodecPrivate
    pub codec_private: Option<Vec<u8>>,
    pub params: StreamParams,
}

pub struct MkvMuxer {
    buf: Vec<u8>,
    track: MuxTrack,
    /// Offset of the segment size placeholder, set by `write_header`
    segment_size_pos: Option<usize>,
    packets_written: u64,
}

impl MkvMuxer {
    pub fn new(track: MuxTrack) -> Self {
        Self {
            buf: Vec::new(),
            track,
            segment_size_pos: None,
            packets_written: 0,
        }
    }

    /// Write the EBML header and the segment up to the first cluster.
    pub fn write_header(&mut self) -> Result<(), MuxError> {
        if self.segment_size_pos.is_some() {
            return Err(MuxError::Misuse("header already written"));
        }
        if let StreamParams::Video { width, height } = self.track.params {
            if width == 0 || height == 0 {
                return Err(MuxError::MissingHeaderData(
                    "video track has no coded dimensions".into(),
                ));
            }
        }

        let mut ebml = Vec::new();
        put_uint(&mut ebml, ID_EBML_VERSION, 1);
        put_uint(&mut ebml, ID_EBML_READ_VERSION, 1);
        put_uint(&mut ebml, ID_EBML_MAX_ID_LENGTH, 4);
        put_uint(&mut ebml, ID_EBML_MAX_SIZE_LENGTH, 8);
        put_string(&mut ebml, ID_DOC_TYPE, "matroska");
        put_uint(&mut ebml, ID_DOC_TYPE_VERSION, 4);
        put_uint(&mut ebml, ID_DOC_TYPE_READ_VERSION, 2);
        put_master(&mut self.buf, ID_EBML, &ebml);

        // Segment with an 8-byte size placeholder, backfilled on finalize.
        put_id(&mut self.buf, ID_SEGMENT);
        self.segment_size_pos = Some(self.buf.len());
        self.buf.put_slice(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        let mut info = Vec::new();
        put_uint(&mut info, ID_TIMESTAMP_SCALE, TIMESTAMP_SCALE_NS);
        put_string(&mut info, ID_MUXING_APP, concat!("rewrap ", env!("CARGO_PKG_VERSION")));
        put_string(&mut info, ID_WRITING_APP, concat!("rewrap ", env!("CARGO_PKG_VERSION")));
        put_master(&mut self.buf, ID_INFO, &info);

        let mut entry = Vec::new();
        put_uint(&mut entry, ID_TRACK_NUMBER, 1);
        put_uint(&mut entry, ID_TRACK_UID, 1);
        let track_type = match self.track.params {
            StreamParams::Video { .. } => TRACK_TYPE_VIDEO,
            StreamParams::Audio { .. } => TRACK_TYPE_AUDIO,
        };
        put_uint(&mut entry, ID_TRACK_TYPE, track_type);
        put_uint(&mut entry, ID_FLAG_LACING, 0);
        put_string(&mut entry, ID_CODEC_ID, &self.track.codec_id);
        if let Some(private) = &self.track.codec_private {
            put_binary(&mut entry, ID_CODEC_PRIVATE, private);
        }
        match self.track.params {
            StreamParams::Video { width, height } => {
                let mut video = Vec::new();
                put_uint(&mut video, ID_PIXEL_WIDTH, width as u64);
                put_uint(&mut video, ID_PIXEL_HEIGHT, height as u64);
                put_master(&mut entry, ID_VIDEO, &video);
            }
            StreamParams::Audio {
                sample_rate,
                channels,
            } => {
                let mut audio = Vec::new();
                put_float(&mut audio, ID_SAMPLING_FREQUENCY, sample_rate as f64);
                put_uint(&mut audio, ID_CHANNELS, channels.max(1) as u64);
                put_master(&mut entry, ID_AUDIO, &audio);
            }
        }

        let mut tracks = Vec::new();
        put_master(&mut tracks, ID_TRACK_ENTRY, &entry);
        put_master(&mut self.buf, ID_TRACKS, &tracks);

        Ok(())
    }

    /// Write one packet as its own cluster.
    ///
    /// `pts_ms` is in milliseconds; negative values are clamped to zero
    /// (cluster timestamps are unsigned). The key flag lands in the
    /// SimpleBlock keyframe bit.
    pub fn write_packet(&mut self, pts_ms: i64, keyframe: bool, data: &[u8]) -> Result<(), MuxError> {
        if self.segment_size_pos.is_none() {
            return Err(MuxError::Misuse("write_packet before write_header"));
        }

        let mut block = Vec::with_capacity(data.len() + 4);
        block.put_u8(0x81); // track 1 as a vint
        block.put_i16(0); // timestamp relative to the cluster
        block.put_u8(if keyframe { 0x80 } else { 0x00 });
        block.put_slice(data);

        let mut cluster = Vec::with_capacity(block.len() + 16);
        put_uint(&mut cluster, ID_CLUSTER_TIMESTAMP, pts_ms.max(0) as u64);
        put_binary(&mut cluster, ID_SIMPLE_BLOCK, &block);
        put_master(&mut self.buf, ID_CLUSTER, &cluster);

        self.packets_written += 1;
        Ok(())
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Backfill the segment size and hand back the finished file bytes.
    pub fn finalize(mut self) -> Result<Vec<u8>, MuxError> {
        let pos = self
            .segment_size_pos
            .ok_or(MuxError::Misuse("finalize before write_header"))?;
        let payload_len = (self.buf.len() - pos - 8) as u64;
        let encoded = (1u64 << 56) | payload_len;
        self.buf[pos..pos + 8].copy_from_slice(&encoded.to_be_bytes());
        tracing::debug!(
            packets = self.packets_written,
            bytes = self.buf.len(),
            "finalized container"
        );
        Ok(self.buf)
    }
}

// ============================================================================
// Header priming
// ============================================================================

/// Coded dimensions recovered for the track header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoContext {
    pub width: u32,
    pub height: u32,
}

/// Recover the header metadata a video track needs.
///
/// Known dimensions pass through untouched. Otherwise the parameter sets
/// from the extradata plus the first packet are run through the decoder
/// just long enough to learn the coded size.
pub fn prime_video_context(
    width: u32,
    height: u32,
    extradata: Option<&[u8]>,
    first_packet: Option<&[u8]>,
) -> Result<VideoContext, MuxError> {
    if width > 0 && height > 0 {
        return Ok(VideoContext { width, height });
    }

    let packet = first_packet.ok_or_else(|| {
        MuxError::MissingHeaderData("no dimensions and no packet to decode".into())
    })?;

    let mut bitstream = Vec::new();
    let mut nal_length_size = 0;
    if let Some(extradata) = extradata {
        let avc = AvcConfig::parse(extradata)
            .ok_or_else(|| MuxError::Prime("malformed avcC extradata".into()))?;
        bitstream.extend_from_slice(&avc.parameter_sets_annexb());
        nal_length_size = avc.nal_length_size;
    }
    if nal_length_size > 0 && !crate::h264::is_annexb(packet) {
        bitstream.extend_from_slice(&avcc_to_annexb(packet, nal_length_size));
    } else {
        bitstream.extend_from_slice(packet);
    }

    let mut decoder = H264Decoder::new().map_err(|e| MuxError::Prime(e.to_string()))?;
    let decoded = decoder
        .decode(&bitstream)
        .map_err(|e| MuxError::Prime(e.to_string()))?;

    match decoded {
        Some(yuv) => {
            let (w, h) = yuv.dimensions();
            Ok(VideoContext {
                width: w as u32,
                height: h as u32,
            })
        }
        None => Err(MuxError::Prime(
            "decoder produced no frame from the first packet".into(),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use matroska_demuxer::{Frame, MatroskaFile, TrackType};
    use std::io::Cursor;

    #[test]
    fn encodes_minimal_size_vints() {
        let mut buf = Vec::new();
        put_size(&mut buf, 0x01);
        assert_eq!(buf, vec![0x81]);

        buf.clear();
        put_size(&mut buf, 0x7F); // all-ones in 1 byte is reserved
        assert_eq!(buf, vec![0x40, 0x7F]);

        buf.clear();
        put_size(&mut buf, 0x3FFF - 1);
        assert_eq!(buf, vec![0x7F, 0xFE]);
    }

    #[test]
    fn encodes_ids_and_uints() {
        let mut buf = Vec::new();
        put_id(&mut buf, ID_TRACK_ENTRY);
        assert_eq!(buf, vec![0xAE]);

        buf.clear();
        put_id(&mut buf, ID_SEGMENT);
        assert_eq!(buf, vec![0x18, 0x53, 0x80, 0x67]);

        buf.clear();
        put_uint(&mut buf, ID_TRACK_NUMBER, 1);
        assert_eq!(buf, vec![0xD7, 0x81, 0x01]);
    }

    #[test]
    fn packets_before_header_are_rejected() {
        let mut muxer = MkvMuxer::new(MuxTrack {
            codec_id: "A_PCM/FLOAT/IEEE".to_string(),
            codec_private: None,
            params: StreamParams::Audio {
                sample_rate: 44_100,
                channels: 1,
            },
        });
        assert!(matches!(
            muxer.write_packet(0, true, &[0, 1, 2]),
            Err(MuxError::Misuse(_))
        ));
    }

    #[test]
    fn video_header_requires_dimensions() {
        let mut muxer = MkvMuxer::new(MuxTrack {
            codec_id: "V_MPEG4/ISO/AVC".to_string(),
            codec_private: None,
            params: StreamParams::Video {
                width: 0,
                height: 0,
            },
        });
        assert!(matches!(
            muxer.write_header(),
            Err(MuxError::MissingHeaderData(_))
        ));
    }

    #[test]
    fn known_dimensions_skip_priming() {
        let ctx = prime_video_context(640, 480, None, None).unwrap();
        assert_eq!(ctx, VideoContext { width: 640, height: 480 });
    }

    #[test]
    fn round_trips_packets_through_the_demuxer() {
        let mut muxer = MkvMuxer::new(MuxTrack {
            codec_id: "V_MPEG4/ISO/AVC".to_string(),
            codec_private: Some(vec![0x01, 0x42, 0x00, 0x1e, 0xff, 0xe0, 0x00]),
            params: StreamParams::Video {
                width: 320,
                height: 240,
            },
        });
        muxer.write_header().expect("header");

        let inputs: &[(i64, bool, &[u8])] = &[
            (0, true, &[0x10, 0x11, 0x12]),
            (33, false, &[0x20]),
            (66, false, &[0x30, 0x31]),
            (100, true, &[0x40]),
        ];
        for &(pts_ms, key, data) in inputs {
            muxer.write_packet(pts_ms, key, data).expect("packet");
        }
        assert_eq!(muxer.packets_written(), inputs.len() as u64);

        let bytes = muxer.finalize().expect("finalize");

        let mut mkv = MatroskaFile::open(Cursor::new(bytes)).expect("reopen container");
        {
            let tracks = mkv.tracks();
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].track_type(), TrackType::Video);
            assert_eq!(tracks[0].codec_id(), "V_MPEG4/ISO/AVC");
        }

        let mut frame = Frame::default();
        let mut read_back = Vec::new();
        while mkv.next_frame(&mut frame).expect("read frame") {
            read_back.push((
                frame.timestamp as i64,
                frame.is_keyframe.unwrap_or(false),
                frame.data.clone(),
            ));
        }

        // packet count survives the round trip
        assert_eq!(read_back.len(), inputs.len());
        for (got, want) in read_back.iter().zip(inputs) {
            assert_eq!(got.0, want.0);
            assert_eq!(got.1, want.1); // key/delta flag survives
            assert_eq!(got.2, want.2);
        }
    }

    #[test]
    fn negative_timestamps_are_clamped() {
        let mut muxer = MkvMuxer::new(MuxTrack {
            codec_id: "A_PCM/FLOAT/IEEE".to_string(),
            codec_private: None,
            params: StreamParams::Audio {
                sample_rate: 48_000,
                channels: 2,
            },
        });
        muxer.write_header().expect("header");
        muxer.write_packet(-20, true, &[0xAA]).expect("packet");
        let bytes = muxer.finalize().expect("finalize");

        let mut mkv = MatroskaFile::open(Cursor::new(bytes)).expect("reopen container");
        let mut frame = Frame::default();
        assert!(mkv.next_frame(&mut frame).expect("read frame"));
        assert_eq!(frame.timestamp, 0);
    }
}
