use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// File extension of the container files written by the built-in writer.
pub const CONTAINER_EXTENSION: &str = "mckf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
    ProRes,
    Raw,
}

/// Negotiated settings for the video track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTrackSettings {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Average bit rate in bits per second.
    pub bit_rate: u32,
}

impl Default for VideoTrackSettings {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            width: 1920,
            height: 1080,
            frame_rate: 30,
            bit_rate: 10_000_000,
        }
    }
}

/// Negotiated settings for the optional audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackSettings {
    pub sample_rate: f64,
    pub channels: u16,
    pub bit_rate: u32,
}

impl Default for AudioTrackSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            channels: 2,
            bit_rate: 128_000,
        }
    }
}

/// Track layout handed to the writer factory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackSettings {
    pub video: VideoTrackSettings,
    pub audio: Option<AudioTrackSettings>,
}

/// Configuration for a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfiguration {
    /// Explicit output file. When unset, a date-stamped file is created in
    /// `output_directory`.
    pub output_path: Option<PathBuf>,

    /// Directory for generated file names (default: the user's videos directory).
    pub output_directory: Option<PathBuf>,

    /// Prefix of generated file names (default: "Recording").
    pub file_prefix: String,

    pub video: VideoTrackSettings,

    /// Audio track settings, or None for a video-only recording.
    pub audio: Option<AudioTrackSettings>,

    /// Capacity of the sample channels opened for the recording.
    pub channel_capacity: usize,
}

impl RecordingConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(format!(
                "invalid video dimensions: {}x{}",
                self.video.width, self.video.height
            ));
        }
        if self.video.frame_rate == 0 {
            return Err("video frame rate must be positive".into());
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate <= 0.0 || !audio.sample_rate.is_finite() {
                return Err("audio sample rate must be positive".into());
            }
            if ![1, 2].contains(&audio.channels) {
                return Err(format!("unsupported channel count: {}", audio.channels));
            }
        }
        if self.channel_capacity == 0 {
            return Err("channel capacity must be positive".into());
        }
        if self.file_prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(format!("file prefix must not contain a path separator: {}", self.file_prefix));
        }
        Ok(())
    }

    pub fn track_settings(&self) -> TrackSettings {
        TrackSettings {
            video: self.video.clone(),
            audio: self.audio.clone(),
        }
    }

    /// Output file for a recording started at `now`.
    ///
    /// `<dir>/<prefix>-YYYY-MM-DD-HH-MM-SS.mckf`, where `<dir>` falls back to
    /// the user's videos directory and then the working directory.
    pub fn resolve_output_path(&self, now: DateTime<Local>) -> PathBuf {
        if let Some(path) = &self.output_path {
            return path.clone();
        }
        let directory = self
            .output_directory
            .clone()
            .or_else(dirs_next::video_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = format!(
            "{}-{}.{}",
            self.file_prefix,
            now.format("%Y-%m-%d-%H-%M-%S"),
            CONTAINER_EXTENSION
        );
        directory.join(file_name)
    }
}

impl Default for RecordingConfiguration {
    fn default() -> Self {
        Self {
            output_path: None,
            output_directory: None,
            file_prefix: "Recording".into(),
            video: VideoTrackSettings::default(),
            audio: Some(AudioTrackSettings::default()),
            channel_capacity: 32,
        }
    }
}

/// Tuning for the audio level monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfiguration {
    /// Number of smoothed levels kept in the history (minimum 8).
    pub history_capacity: usize,
    /// Weight of the previous level in the exponential smoothing, in [0, 0.98].
    pub smoothing: f32,
    /// Multiplier applied to the raw RMS before clamping to [0, 1].
    pub gain: f32,
    pub channel_capacity: usize,
}

impl MonitorConfiguration {
    pub const MIN_HISTORY: usize = 8;
    pub const MAX_SMOOTHING: f32 = 0.98;

    /// Copy with every field clamped into its supported range.
    pub fn sanitized(&self) -> Self {
        let smoothing = if self.smoothing.is_finite() {
            self.smoothing.clamp(0.0, Self::MAX_SMOOTHING)
        } else {
            0.0
        };
        let gain = if self.gain.is_finite() { self.gain.max(0.1) } else { 1.0 };
        Self {
            history_capacity: self.history_capacity.max(Self::MIN_HISTORY),
            smoothing,
            gain,
            channel_capacity: self.channel_capacity.max(1),
        }
    }
}

impl Default for MonitorConfiguration {
    fn default() -> Self {
        Self {
            history_capacity: 48,
            smoothing: 0.75,
            gain: 18.0,
            channel_capacity: 16,
        }
    }
}

/// Bounded retry policy for recovering an interrupted session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// What a screen capture records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureTarget {
    Display { display_id: u32 },
    Window { window_id: u32 },
    /// An external camera treated as a screen-like video source.
    ExternalCamera { device_id: String },
}

/// Configuration for the screen capture adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenCaptureConfiguration {
    pub target: CaptureTarget,
    /// Output width; defaults to the target's width times `scale_factor`.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: u32,
    pub shows_cursor: bool,
    pub captures_audio: bool,
    pub scale_factor: f64,
}

impl ScreenCaptureConfiguration {
    pub fn new(target: CaptureTarget) -> Self {
        Self {
            target,
            width: None,
            height: None,
            frame_rate: 30,
            shows_cursor: true,
            captures_audio: false,
            scale_factor: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err(format!("unsupported frame rate: {}", self.frame_rate));
        }
        if self.scale_factor <= 0.0 || !self.scale_factor.is_finite() {
            return Err("scale factor must be positive".into());
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err("explicit dimensions must be positive".into());
        }
        Ok(())
    }
}
