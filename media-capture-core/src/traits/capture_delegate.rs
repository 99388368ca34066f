use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::session::SessionStatus;
use crate::models::state::RecordingPhase;
use crate::monitor::level_monitor::AudioSnapshot;

/// Push notifications from the capture core.
///
/// Every method has an empty default, so observers implement only what they
/// need. Methods are called from capture, worker or caller threads, never
/// the UI thread; implementations should marshal if needed and must not
/// block.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the capture session's status changes.
    fn on_session_status_changed(&self, _status: &SessionStatus) {}

    /// Called when the recording phase changes.
    fn on_recording_phase_changed(&self, _phase: RecordingPhase) {}

    /// Called after each processed audio buffer with a fresh snapshot.
    fn on_levels_updated(&self, _snapshot: &AudioSnapshot) {}

    /// Called when an error occurs off the caller's thread.
    fn on_error(&self, _error: &CaptureError) {}

    /// Called when a recording is finalized, including source-ended recordings.
    fn on_recording_finished(&self, _result: &RecordingResult) {}
}
