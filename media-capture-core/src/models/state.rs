use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recording pipeline state machine.
///
/// State transitions:
/// ```text
/// idle → configuring → running ⇄ paused
///             ↓           ↓        ↓
///             └──────→ finalizing → stopped → configuring …
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    #[default]
    Idle,
    Configuring,
    Running,
    Paused,
    Finalizing,
    Stopped,
}

impl RecordingPhase {
    /// Whether a recording is in progress (writer open, channels attached).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Configuring | Self::Running | Self::Paused)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }
}

/// Copy of the recorder's state handed out to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub phase: RecordingPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub output_path: Option<PathBuf>,
    /// Active (unpaused) time since start, in seconds.
    pub duration_secs: f64,
}

impl Default for RecordingStatus {
    fn default() -> Self {
        Self {
            phase: RecordingPhase::Idle,
            started_at: None,
            output_path: None,
            duration_secs: 0.0,
        }
    }
}
