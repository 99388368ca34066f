use thiserror::Error;

use super::device::MediaKind;
use super::session::OutputKind;

/// Which OS authorization a capture operation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaAccess {
    Camera,
    Microphone,
    ScreenRecording,
}

impl MediaAccess {
    /// The authorization needed to capture from a device of `kind`.
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self::Camera,
            MediaKind::Audio => Self::Microphone,
        }
    }
}

impl std::fmt::Display for MediaAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Camera => "camera",
            Self::Microphone => "microphone",
            Self::ScreenRecording => "screen recording",
        };
        f.write_str(name)
    }
}

/// Broad error class, used by callers to decide how to react.
///
/// ```text
/// Configuration → fix the input and retry
/// Lifecycle     → caller-side state mismatch, never retried automatically
/// Resource      → terminal for this attempt, restart from idle
/// Transient     → expected to trigger a restart attempt
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Lifecycle,
    Resource,
    Transient,
}

/// Errors that can occur during capture, streaming and recording.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("an input of kind {0} is already active")]
    InputConflict(MediaKind),

    #[error("no active input matches device {0}")]
    InputNotFound(String),

    #[error("output {0:?} is already attached")]
    OutputConflict(OutputKind),

    #[error("output {0:?} is not attached")]
    OutputNotFound(OutputKind),

    #[error("session cannot be configured")]
    SessionNotConfigurable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("capture target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("recording already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("capture already in progress")]
    AlreadyCapturing,

    #[error("no capture in progress")]
    NotCapturing,

    #[error("{0} permission denied")]
    PermissionDenied(MediaAccess),

    #[error("{0} permission has not been determined")]
    PermissionNotDetermined(MediaAccess),

    #[error("writer setup failed: {0}")]
    WriterSetupFailed(String),

    #[error("finalization failed: {0}")]
    FinalizationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("capture interrupted: {0}")]
    Interrupted(String),

    #[error("reconnect failed after {attempts} attempts: {reason}")]
    ReconnectFailed { attempts: u32, reason: String },

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceUnavailable(_)
            | Self::InputConflict(_)
            | Self::InputNotFound(_)
            | Self::OutputConflict(_)
            | Self::OutputNotFound(_)
            | Self::SessionNotConfigurable
            | Self::ConfigurationFailed(_)
            | Self::TargetUnavailable(_) => ErrorKind::Configuration,
            Self::AlreadyRecording | Self::NotRecording | Self::AlreadyCapturing | Self::NotCapturing => {
                ErrorKind::Lifecycle
            }
            Self::PermissionDenied(_)
            | Self::PermissionNotDetermined(_)
            | Self::WriterSetupFailed(_)
            | Self::FinalizationFailed(_)
            | Self::StorageError(_)
            | Self::ReconnectFailed { .. }
            | Self::Unknown(_) => ErrorKind::Resource,
            Self::Interrupted(_) => ErrorKind::Transient,
        }
    }

    /// Whether the caller is expected to attempt an automatic restart.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
