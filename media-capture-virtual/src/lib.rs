//! # media-capture-virtual
//!
//! Software capture backend for media-capture-kit.
//!
//! Provides:
//! - `VirtualDeviceCatalog`: in-memory cameras and microphones with hot-plug
//! - `VirtualCaptureHardware`: synthetic frames and tones, real-time or manually pulsed
//! - `VirtualScreenBackend`: synthetic displays, windows and a capture card
//! - `VirtualPermissions`: scriptable authorization
//!
//! ## Usage
//! ```ignore
//! use media_capture_core::{OutputKind, Recorder, RecordingConfiguration};
//! use media_capture_virtual::{VirtualHardwareConfig, VirtualRig};
//!
//! let rig = VirtualRig::new(VirtualHardwareConfig::default());
//! rig.wire_defaults()?;
//! rig.session.start()?;
//! let mut recorder = Recorder::default();
//! recorder.start_recording(&rig.session, &RecordingConfiguration::default())?;
//! ```

pub mod catalog;
pub mod hardware;
pub mod permissions;
pub mod screen;

use std::sync::Arc;

use media_capture_core::devices::registry::DeviceRegistry;
use media_capture_core::models::device::MediaKind;
use media_capture_core::models::error::CaptureError;
use media_capture_core::models::session::OutputKind;
use media_capture_core::session::capture_session::CaptureSession;

pub use catalog::VirtualDeviceCatalog;
pub use hardware::{Timing, VirtualCaptureHardware, VirtualHardwareConfig, VirtualHardwareControl};
pub use permissions::VirtualPermissions;
pub use screen::{VirtualScreenBackend, VirtualScreenControl};

/// A capture session wired to virtual hardware, plus the handles that drive it.
pub struct VirtualRig {
    pub session: CaptureSession,
    pub control: VirtualHardwareControl,
    pub catalog: Arc<VirtualDeviceCatalog>,
    pub permissions: Arc<VirtualPermissions>,
}

impl VirtualRig {
    pub fn new(config: VirtualHardwareConfig) -> Self {
        let catalog = Arc::new(VirtualDeviceCatalog::with_default_devices());
        let permissions = Arc::new(VirtualPermissions::new());
        let (hardware, control) = VirtualCaptureHardware::new(config, Arc::clone(&catalog));
        let session = CaptureSession::new(
            Box::new(hardware),
            DeviceRegistry::new(catalog.clone()),
            permissions.clone(),
        );
        Self {
            session,
            control,
            catalog,
            permissions,
        }
    }

    /// Wire the default camera and microphone with both data outputs, in one
    /// transaction.
    pub fn wire_defaults(&self) -> Result<(), CaptureError> {
        let registry = self.session.registry();
        let mut tx = self.session.begin_configuration();
        for kind in [MediaKind::Video, MediaKind::Audio] {
            let device = registry
                .default_device(kind)
                .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no {} device", kind)))?;
            tx.add_input(&device)?;
            tx.add_output(OutputKind::for_kind(kind))?;
        }
        tx.commit()
    }
}
