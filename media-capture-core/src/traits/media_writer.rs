use std::path::Path;

use crate::models::config::TrackSettings;
use crate::models::device::MediaKind;
use crate::models::error::CaptureError;
use crate::models::sample::{MediaTime, SampleBuffer};

/// Outcome of a successful finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedMedia {
    /// SHA-256 hex digest of the finished file.
    pub checksum: String,
    /// Span of encoded content, from session start to the latest sample end.
    pub media_duration: MediaTime,
    pub bytes_written: u64,
}

/// Incremental media file writer.
///
/// Call order: `start_session` once, any number of `append`, then
/// `mark_finished` per track and `finish` exactly once.
pub trait MediaWriter: Send {
    /// Start the file timeline; `at` becomes t=0 in the file.
    fn start_session(&mut self, at: MediaTime) -> Result<(), CaptureError>;

    /// Whether the track for `kind` can take another sample right now.
    fn is_ready_for_more(&self, kind: MediaKind) -> bool;

    fn append(&mut self, sample: &SampleBuffer) -> Result<(), CaptureError>;

    /// No more samples will be appended to the track for `kind`.
    fn mark_finished(&mut self, kind: MediaKind);

    /// Close out the file so it is a valid container.
    fn finish(&mut self) -> Result<FinishedMedia, CaptureError>;

    fn output_path(&self) -> &Path;
}

/// Creates writers for new recordings.
pub trait WriterFactory: Send + Sync {
    fn create_writer(&self, path: &Path, tracks: &TrackSettings) -> Result<Box<dyn MediaWriter>, CaptureError>;
}
