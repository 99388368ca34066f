use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::TrackSettings;
use super::device::MediaKind;

/// Result returned when a recording is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    /// Wall-clock recording time excluding pauses.
    pub duration_secs: f64,
    /// Span of encoded content in the file.
    pub media_duration_secs: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub checksum: String,
    pub metadata: RecordingMetadata,
}

/// A track written to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedTrack {
    pub kind: MediaKind,
    pub samples_written: u64,
    pub samples_dropped: u64,
}

/// Descriptive metadata about a finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub tracks: Vec<RecordedTrack>,
    pub settings: TrackSettings,
    /// Buffers discarded while paused.
    pub samples_discarded_paused: u64,
    /// Whether the recording ended because its sample source terminated.
    pub ended_by_source: bool,
}

impl RecordingMetadata {
    pub fn new(settings: TrackSettings, tracks: Vec<RecordedTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339(),
            tracks,
            settings,
            samples_discarded_paused: 0,
            ended_by_source: false,
        }
    }

    pub fn track(&self, kind: MediaKind) -> Option<&RecordedTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_has_unique_ids() {
        let a = RecordingMetadata::new(TrackSettings::default(), Vec::new());
        let b = RecordingMetadata::new(TrackSettings::default(), Vec::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let metadata = RecordingMetadata::new(
            TrackSettings::default(),
            vec![RecordedTrack {
                kind: MediaKind::Video,
                samples_written: 150,
                samples_dropped: 0,
            }],
        );
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: RecordingMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
        assert_eq!(parsed.track(MediaKind::Video).map(|t| t.samples_written), Some(150));
    }
}
