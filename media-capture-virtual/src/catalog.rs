//! In-memory device catalog with hot-plug.
//!
//! Plays the role of the OS device list: tests and the demo plug and unplug
//! devices at runtime, and the core's `DeviceRegistry` sees the change on
//! its next query.

use parking_lot::RwLock;

use media_capture_core::models::device::{Device, DevicePosition, MediaKind};
use media_capture_core::models::error::CaptureError;
use media_capture_core::traits::device_catalog::DeviceCatalog;

pub struct VirtualDeviceCatalog {
    devices: RwLock<Vec<Device>>,
}

impl VirtualDeviceCatalog {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Two cameras and two microphones; the first of each kind is the default.
    pub fn with_default_devices() -> Self {
        let catalog = Self::new();
        catalog.plug(
            Device::new("virtual-cam-0", MediaKind::Video, "Virtual Camera")
                .with_position(DevicePosition::Front)
                .as_default(),
        );
        catalog.plug(Device::new("virtual-cam-1", MediaKind::Video, "Virtual USB Camera").with_position(DevicePosition::External));
        catalog.plug(Device::new("virtual-mic-0", MediaKind::Audio, "Virtual Microphone").as_default());
        catalog.plug(Device::new("virtual-mic-1", MediaKind::Audio, "Virtual Headset"));
        catalog
    }

    /// Add a device, or reconnect it if the id is already known.
    pub fn plug(&self, device: Device) {
        let mut devices = self.devices.write();
        match devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => {
                *existing = device;
                existing.is_connected = true;
            }
            None => devices.push(device),
        }
    }

    /// Mark a device disconnected. Returns false for unknown ids.
    pub fn unplug(&self, id: &str) -> bool {
        let mut devices = self.devices.write();
        match devices.iter_mut().find(|d| d.id == id) {
            Some(device) => {
                device.is_connected = false;
                log::info!("virtual device unplugged: {}", id);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.devices.read().iter().any(|d| d.id == id && d.is_connected)
    }
}

impl Default for VirtualDeviceCatalog {
    fn default() -> Self {
        Self::with_default_devices()
    }
}

impl DeviceCatalog for VirtualDeviceCatalog {
    fn devices(&self, kind: MediaKind) -> Result<Vec<Device>, CaptureError> {
        Ok(self.devices.read().iter().filter(|d| d.kind == kind).cloned().collect())
    }
}
