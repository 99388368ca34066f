use crate::models::device::{Device, MediaKind};
use crate::models::error::CaptureError;

/// Interface to the OS device catalog.
///
/// Implementations query the system on every call; nothing is cached.
pub trait DeviceCatalog: Send + Sync {
    /// All devices of `kind` known to the system, connected or not.
    fn devices(&self, kind: MediaKind) -> Result<Vec<Device>, CaptureError>;
}
