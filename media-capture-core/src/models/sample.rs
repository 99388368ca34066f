use std::ops::{Add, Sub};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::device::MediaKind;

/// A point on the capture hardware's monotonic clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MediaTime(u64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * 1_000_000_000.0).round() as u64)
    }

    /// Timestamp of frame `index` at `frame_rate` frames per second.
    pub fn from_frame_index(index: u64, frame_rate: u32) -> Self {
        if frame_rate == 0 {
            return Self::ZERO;
        }
        Self(index * 1_000_000_000 / frame_rate as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    pub fn saturating_sub(self, other: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(other.0))
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for MediaTime {
    fn from(d: Duration) -> Self {
        Self(d.as_nanos().min(u64::MAX as u128) as u64)
    }
}

impl From<MediaTime> for Duration {
    fn from(t: MediaTime) -> Self {
        Duration::from_nanos(t.0)
    }
}

/// Pixel layout of a video payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgra8,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    /// Expected payload size for a frame of `width × height`.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Bgra8 => pixels * 4,
            Self::Nv12 => pixels * 3 / 2,
            Self::Yuyv => pixels * 2,
        }
    }
}

/// Sample encoding of an interleaved PCM payload (little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleEncoding {
    Float32,
    Int16,
    Int32,
}

impl SampleEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Int16 => 2,
        }
    }
}

/// Describes how to interpret a sample buffer's payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FormatDescriptor {
    Video {
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    },
    Audio {
        sample_rate: f64,
        channels: u16,
        encoding: SampleEncoding,
    },
}

impl FormatDescriptor {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::Video { .. } => MediaKind::Video,
            Self::Audio { .. } => MediaKind::Audio,
        }
    }
}

/// One timestamped unit of captured media. Immutable once produced;
/// cloning shares the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    media_type: MediaKind,
    presentation_timestamp: MediaTime,
    duration: MediaTime,
    payload: Bytes,
    format: FormatDescriptor,
}

impl SampleBuffer {
    pub fn new(presentation_timestamp: MediaTime, duration: MediaTime, payload: Bytes, format: FormatDescriptor) -> Self {
        Self {
            media_type: format.media_kind(),
            presentation_timestamp,
            duration,
            payload,
            format,
        }
    }

    /// Build an audio buffer from f32 samples, encoding them as little-endian PCM.
    pub fn audio_f32(presentation_timestamp: MediaTime, samples: &[f32], sample_rate: f64, channels: u16) -> Self {
        let mut payload = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        let frames = samples.len() / channels.max(1) as usize;
        let duration = MediaTime::from_secs_f64(frames as f64 / sample_rate);
        Self::new(
            presentation_timestamp,
            duration,
            Bytes::from(payload),
            FormatDescriptor::Audio {
                sample_rate,
                channels,
                encoding: SampleEncoding::Float32,
            },
        )
    }

    /// Build an audio buffer from i16 samples.
    pub fn audio_i16(presentation_timestamp: MediaTime, samples: &[i16], sample_rate: f64, channels: u16) -> Self {
        let mut payload = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        let frames = samples.len() / channels.max(1) as usize;
        let duration = MediaTime::from_secs_f64(frames as f64 / sample_rate);
        Self::new(
            presentation_timestamp,
            duration,
            Bytes::from(payload),
            FormatDescriptor::Audio {
                sample_rate,
                channels,
                encoding: SampleEncoding::Int16,
            },
        )
    }

    /// Copy of this buffer at a different timestamp, sharing the payload.
    pub fn retimed(&self, presentation_timestamp: MediaTime) -> Self {
        Self {
            presentation_timestamp,
            ..self.clone()
        }
    }

    pub fn media_type(&self) -> MediaKind {
        self.media_type
    }

    pub fn presentation_timestamp(&self) -> MediaTime {
        self.presentation_timestamp
    }

    pub fn duration(&self) -> MediaTime {
        self.duration
    }

    /// Presentation timestamp plus duration.
    pub fn end_timestamp(&self) -> MediaTime {
        self.presentation_timestamp + self.duration
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }
}
