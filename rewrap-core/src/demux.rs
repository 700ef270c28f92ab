//! Demultiplexer facade over the supported containers.
//!
//! Opens a file, probes the container, enumerates the elementary streams
//! with their codec configuration, and reads packets until end of stream.
//! Matroska/WebM goes through `matroska-demuxer`; everything else is handed
//! to symphonia's format probe (audio containers: MP3, FLAC, OGG, WAV, ...).

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use matroska_demuxer::{Frame as MkvFrame, MatroskaFile, TrackType};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::config::{codec_string_from_matroska, codec_string_from_symphonia, DecoderConfig};
use crate::packet::{Packet, StreamInfo, StreamKind, StreamParams, TimeBase};

#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse container: {0}")]
    Container(String),
    #[error("no decodable streams found")]
    NoStreams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Matroska,
    Audio,
}

/// Everything a demux pass produces: stream descriptors, the decoder
/// configs derived from them, and every packet in the file.
#[derive(Debug)]
pub struct DemuxOutput {
    pub streams: Vec<StreamInfo>,
    pub configs: Vec<DecoderConfig>,
    pub packets: Vec<Packet>,
}

// ============================================================================
// Demuxer Facade
// ============================================================================

pub enum MediaDemuxer {
    Matroska(MkvBackend),
    Audio(AudioBackend),
}

impl MediaDemuxer {
    /// Open a file and probe its container by extension.
    pub fn open(path: &Path) -> Result<Self, DemuxError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "mkv" | "mka" | "webm" => Ok(Self::Matroska(MkvBackend::open(path)?)),
            _ => Ok(Self::Audio(AudioBackend::open(path)?)),
        }
    }

    pub fn container(&self) -> ContainerKind {
        match self {
            MediaDemuxer::Matroska(_) => ContainerKind::Matroska,
            MediaDemuxer::Audio(_) => ContainerKind::Audio,
        }
    }

    pub fn streams(&self) -> &[StreamInfo] {
        match self {
            MediaDemuxer::Matroska(backend) => &backend.streams,
            MediaDemuxer::Audio(backend) => &backend.streams,
        }
    }

    /// Read the next packet, `None` at end of stream.
    pub fn read_packet(&mut self) -> Result<Option<Packet>, DemuxError> {
        match self {
            MediaDemuxer::Matroska(backend) => backend.read_packet(),
            MediaDemuxer::Audio(backend) => backend.read_packet(),
        }
    }

    /// Drain the whole file into memory.
    pub fn read_all(&mut self) -> Result<Vec<Packet>, DemuxError> {
        let mut packets = Vec::new();
        while let Some(packet) = self.read_packet()? {
            packets.push(packet);
        }
        tracing::debug!(count = packets.len(), "read all packets");
        Ok(packets)
    }
}

// ============================================================================
// Matroska Backend
// ============================================================================

pub struct MkvBackend {
    file: MatroskaFile<File>,
    frame: MkvFrame,
    streams: Vec<StreamInfo>,
    /// Matroska track number -> (stream index, kind)
    track_map: HashMap<u64, (u32, StreamKind)>,
}

impl MkvBackend {
    pub fn open(path: &Path) -> Result<Self, DemuxError> {
        let file = File::open(path)?;
        let mkv = MatroskaFile::open(file)
            .map_err(|e| DemuxError::Container(format!("matroska: {e:?}")))?;

        // Frame timestamps arrive in ticks of the segment timestamp scale
        // (nanoseconds per tick), so every stream shares one time base.
        let scale = mkv.info().timestamp_scale().get();
        let time_base = TimeBase::new(u32::try_from(scale).unwrap_or(1_000_000), 1_000_000_000);

        let mut streams = Vec::new();
        let mut track_map = HashMap::new();

        for track in mkv.tracks() {
            let number = track.track_number().get();
            let codec_id = track.codec_id();
            let extradata = track.codec_private().map(|p| p.to_vec());

            let (kind, params) = match track.track_type() {
                TrackType::Video => match track.video() {
                    Some(video) => (
                        StreamKind::Video,
                        StreamParams::Video {
                            width: video.pixel_width().get() as u32,
                            height: video.pixel_height().get() as u32,
                        },
                    ),
                    None => continue,
                },
                TrackType::Audio => match track.audio() {
                    Some(audio) => (
                        StreamKind::Audio,
                        StreamParams::Audio {
                            sample_rate: audio.sampling_frequency() as u32,
                            channels: audio.channels().get() as u32,
                        },
                    ),
                    None => continue,
                },
                _ => {
                    tracing::debug!(track = number, codec = codec_id, "skipping track");
                    continue;
                }
            };

            let codec = match codec_string_from_matroska(codec_id, extradata.as_deref()) {
                Some(codec) => codec,
                None => {
                    tracing::warn!(track = number, codec = codec_id, "unsupported codec");
                    continue;
                }
            };

            let index = streams.len() as u32;
            track_map.insert(number, (index, kind));
            streams.push(StreamInfo {
                index,
                kind,
                codec,
                time_base,
                extradata,
                params,
            });
        }

        if streams.is_empty() {
            return Err(DemuxError::NoStreams);
        }

        Ok(Self {
            file: mkv,
            frame: MkvFrame::default(),
            streams,
            track_map,
        })
    }

    pub fn read_packet(&mut self) -> Result<Option<Packet>, DemuxError> {
        loop {
            let more = self
                .file
                .next_frame(&mut self.frame)
                .map_err(|e| DemuxError::Container(format!("matroska: {e:?}")))?;
            if !more {
                return Ok(None);
            }

            let Some(&(index, kind)) = self.track_map.get(&self.frame.track) else {
                continue;
            };

            // Audio packets are self-contained; every audio chunk counts
            // as a key frame.
            let keyframe = match kind {
                StreamKind::Audio => true,
                StreamKind::Video => self.frame.is_keyframe.unwrap_or(false),
            };

            return Ok(Some(Packet::new(
                index,
                self.frame.timestamp as i64,
                keyframe,
                self.frame.data.clone(),
            )));
        }
    }
}

// ============================================================================
// Audio Backend (symphonia probe)
// ============================================================================

pub struct AudioBackend {
    format: Box<dyn FormatReader>,
    streams: Vec<StreamInfo>,
    track_map: HashMap<u32, u32>,
}

impl AudioBackend {
    pub fn open(path: &Path) -> Result<Self, DemuxError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DemuxError::Container(format!("probe: {e}")))?;
        let format = probed.format;

        let mut streams = Vec::new();
        let mut track_map = HashMap::new();

        for track in format.tracks() {
            let params = &track.codec_params;
            if params.codec == CODEC_TYPE_NULL {
                continue;
            }
            let Some(codec) = codec_string_from_symphonia(params.codec) else {
                tracing::warn!(track = track.id, "unsupported audio codec");
                continue;
            };

            let sample_rate = params.sample_rate.unwrap_or(44_100);
            let channels = params.channels.map(|c| c.count() as u32).unwrap_or(2);
            let time_base = params
                .time_base
                .map(|tb| TimeBase::new(tb.numer, tb.denom))
                .unwrap_or_else(|| TimeBase::new(1, sample_rate.max(1)));

            let index = streams.len() as u32;
            track_map.insert(track.id, index);
            streams.push(StreamInfo {
                index,
                kind: StreamKind::Audio,
                codec,
                time_base,
                extradata: params.extra_data.as_ref().map(|d| d.to_vec()),
                params: StreamParams::Audio {
                    sample_rate,
                    channels,
                },
            });
        }

        if streams.is_empty() {
            return Err(DemuxError::NoStreams);
        }

        Ok(Self {
            format,
            streams,
            track_map,
        })
    }

    pub fn read_packet(&mut self) -> Result<Option<Packet>, DemuxError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(DemuxError::Container(format!("read: {e}"))),
            };

            let Some(&index) = self.track_map.get(&packet.track_id()) else {
                continue;
            };

            return Ok(Some(Packet::new(
                index,
                packet.ts() as i64,
                true,
                packet.buf().to_vec(),
            )));
        }
    }
}
