use std::sync::Arc;

use crate::models::device::{Device, MediaKind};
use crate::models::error::CaptureError;
use crate::traits::device_catalog::DeviceCatalog;

/// Read-only view over the OS device catalog.
///
/// Every call re-queries the catalog, so hot-plugged devices appear and
/// unplugged ones disappear without any refresh step. Only connected
/// devices are returned.
#[derive(Clone)]
pub struct DeviceRegistry {
    catalog: Arc<dyn DeviceCatalog>,
}

impl DeviceRegistry {
    pub fn new(catalog: Arc<dyn DeviceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn list_video_devices(&self) -> Result<Vec<Device>, CaptureError> {
        self.connected(MediaKind::Video)
    }

    pub fn list_audio_devices(&self) -> Result<Vec<Device>, CaptureError> {
        self.connected(MediaKind::Audio)
    }

    /// Live device for `id`, or `None` if it is absent or disconnected.
    pub fn resolve(&self, id: &str) -> Option<Device> {
        [MediaKind::Video, MediaKind::Audio]
            .into_iter()
            .filter_map(|kind| match self.connected(kind) {
                Ok(devices) => Some(devices),
                Err(e) => {
                    log::warn!("{} device query failed while resolving {}: {}", kind, id, e);
                    None
                }
            })
            .flatten()
            .find(|device| device.id == id)
    }

    /// The system default device of `kind`, falling back to the first
    /// connected one.
    pub fn default_device(&self, kind: MediaKind) -> Option<Device> {
        let devices = match self.connected(kind) {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("{} device query failed: {}", kind, e);
                return None;
            }
        };
        let fallback = devices.first().cloned();
        devices.into_iter().find(|d| d.is_default).or(fallback)
    }

    fn connected(&self, kind: MediaKind) -> Result<Vec<Device>, CaptureError> {
        let mut devices = self.catalog.devices(kind)?;
        devices.retain(|d| d.is_connected && d.kind == kind);
        Ok(devices)
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry").finish_non_exhaustive()
    }
}
