//! Container file layout.
//!
//! A fixed header followed by one chunk per appended sample. All integers
//! are little-endian.
//!
//! ```text
//! [0-3]    "MCKF"
//! [4-5]    version
//! [6-7]    track flags (bit 0 video, bit 1 audio)
//! [8-11]   video width
//! [12-15]  video height
//! [16-19]  video frame rate
//! [20-23]  video bit rate
//! [24-27]  audio sample rate (Hz, rounded)
//! [28-29]  audio channels
//! [30]     video codec
//! [31]     reserved
//! [32-35]  audio bit rate
//! [36-43]  sample count        (patched on finish)
//! [44-51]  media duration, ns  (patched on finish)
//! [52-59]  session start, ns   (source clock)
//! [60-63]  reserved
//! ```
//!
//! Chunks: `[track u8][pts ns u64][duration ns u64][len u32][payload]`,
//! with `pts` relative to the session start.

use crate::models::config::{AudioTrackSettings, TrackSettings, VideoCodec, VideoTrackSettings};
use crate::models::device::MediaKind;
use crate::models::sample::MediaTime;

pub const CONTAINER_MAGIC: &[u8; 4] = b"MCKF";
pub const CONTAINER_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 64;
pub const CHUNK_HEADER_SIZE: usize = 21;

pub const SAMPLE_COUNT_OFFSET: u64 = 36;
pub const DURATION_OFFSET: u64 = 44;
pub const START_OFFSET: u64 = 52;

const FLAG_VIDEO: u16 = 0b01;
const FLAG_AUDIO: u16 = 0b10;

pub fn track_id(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Video => 0,
        MediaKind::Audio => 1,
    }
}

pub fn kind_from_track_id(id: u8) -> Option<MediaKind> {
    match id {
        0 => Some(MediaKind::Video),
        1 => Some(MediaKind::Audio),
        _ => None,
    }
}

fn codec_id(codec: VideoCodec) -> u8 {
    match codec {
        VideoCodec::H264 => 0,
        VideoCodec::Hevc => 1,
        VideoCodec::ProRes => 2,
        VideoCodec::Raw => 3,
    }
}

fn codec_from_id(id: u8) -> Option<VideoCodec> {
    match id {
        0 => Some(VideoCodec::H264),
        1 => Some(VideoCodec::Hevc),
        2 => Some(VideoCodec::ProRes),
        3 => Some(VideoCodec::Raw),
        _ => None,
    }
}

/// Header for a new file. Count, duration and start are zero placeholders.
pub fn generate_header(tracks: &TrackSettings) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    let video = &tracks.video;
    let mut flags = FLAG_VIDEO;

    header[0..4].copy_from_slice(CONTAINER_MAGIC);
    header[4..6].copy_from_slice(&CONTAINER_VERSION.to_le_bytes());
    header[8..12].copy_from_slice(&video.width.to_le_bytes());
    header[12..16].copy_from_slice(&video.height.to_le_bytes());
    header[16..20].copy_from_slice(&video.frame_rate.to_le_bytes());
    header[20..24].copy_from_slice(&video.bit_rate.to_le_bytes());
    header[30] = codec_id(video.codec);

    if let Some(audio) = &tracks.audio {
        flags |= FLAG_AUDIO;
        let rate = audio.sample_rate.round() as u32;
        header[24..28].copy_from_slice(&rate.to_le_bytes());
        header[28..30].copy_from_slice(&audio.channels.to_le_bytes());
        header[32..36].copy_from_slice(&audio.bit_rate.to_le_bytes());
    }
    header[6..8].copy_from_slice(&flags.to_le_bytes());
    header
}

/// Prefix written before each sample payload.
pub fn chunk_header(kind: MediaKind, pts: MediaTime, duration: MediaTime, len: u32) -> [u8; CHUNK_HEADER_SIZE] {
    let mut chunk = [0u8; CHUNK_HEADER_SIZE];
    chunk[0] = track_id(kind);
    chunk[1..9].copy_from_slice(&pts.as_nanos().to_le_bytes());
    chunk[9..17].copy_from_slice(&duration.as_nanos().to_le_bytes());
    chunk[17..21].copy_from_slice(&len.to_le_bytes());
    chunk
}

/// Header fields read back from a container file.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub version: u16,
    pub tracks: TrackSettings,
    pub sample_count: u64,
    pub media_duration: MediaTime,
    pub session_start: MediaTime,
}

/// Parse a header. Returns a description of the problem if malformed.
pub fn parse_header(header: &[u8]) -> Result<ContainerSummary, String> {
    if header.len() < HEADER_SIZE {
        return Err(format!("header too short: {} bytes", header.len()));
    }
    if &header[0..4] != CONTAINER_MAGIC {
        return Err("not a container file (bad magic)".into());
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != CONTAINER_VERSION {
        return Err(format!("unsupported container version {}", version));
    }
    let flags = u16::from_le_bytes([header[6], header[7]]);
    let codec = codec_from_id(header[30]).ok_or_else(|| format!("unknown video codec id {}", header[30]))?;

    let video = VideoTrackSettings {
        codec,
        width: read_u32(header, 8),
        height: read_u32(header, 12),
        frame_rate: read_u32(header, 16),
        bit_rate: read_u32(header, 20),
    };
    let audio = (flags & FLAG_AUDIO != 0).then(|| AudioTrackSettings {
        sample_rate: read_u32(header, 24) as f64,
        channels: u16::from_le_bytes([header[28], header[29]]),
        bit_rate: read_u32(header, 32),
    });

    Ok(ContainerSummary {
        version,
        tracks: TrackSettings { video, audio },
        sample_count: read_u64(header, SAMPLE_COUNT_OFFSET as usize),
        media_duration: MediaTime::from_nanos(read_u64(header, DURATION_OFFSET as usize)),
        session_start: MediaTime::from_nanos(read_u64(header, START_OFFSET as usize)),
    })
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}
