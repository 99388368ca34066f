//! # media-capture-core
//!
//! Platform-agnostic media capture core library.
//!
//! Provides device discovery, a transactional capture session, best-effort
//! sample channels, audio level metering and a recording pipeline that
//! writes a single container file. Platform backends implement the
//! `CaptureHardware`, `DeviceCatalog`, `PermissionGate` and
//! `ScreenCaptureBackend` traits and plug into the generic components.
//!
//! ## Architecture
//!
//! ```text
//! media-capture-core (this crate)
//! ├── traits/       ← CaptureHardware, DeviceCatalog, MediaWriter, PermissionGate, CaptureDelegate, Clock
//! ├── models/       ← CaptureError, Device, SampleBuffer, SessionWiring, configurations, results
//! ├── devices/      ← DeviceRegistry
//! ├── session/      ← CaptureSession, Transaction
//! ├── channel/      ← SampleRouter, SampleChannel
//! ├── monitor/      ← AudioLevelMonitor
//! ├── recording/    ← Recorder, Timeline
//! ├── screen/       ← ScreenCaptureAdapter
//! ├── processing/   ← RMS/peak metering, RingBuffer
//! └── storage/      ← container format and writer
//! ```

pub mod channel;
pub mod devices;
pub mod models;
pub mod monitor;
pub mod processing;
pub mod recording;
pub mod screen;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types at crate root for convenience.
pub use channel::sample_channel::{
    CancelToken, ChannelOptions, ChannelStats, DeliveryFilter, OverflowPolicy, SampleChannel,
};
pub use devices::registry::DeviceRegistry;
pub use models::config::{
    AudioTrackSettings, CaptureTarget, MonitorConfiguration, ReconnectPolicy, RecordingConfiguration,
    ScreenCaptureConfiguration, TrackSettings, VideoCodec, VideoTrackSettings,
};
pub use models::device::{Device, DevicePosition, MediaKind};
pub use models::error::{CaptureError, ErrorKind, MediaAccess};
pub use models::recording_result::{RecordedTrack, RecordingMetadata, RecordingResult};
pub use models::sample::{FormatDescriptor, MediaTime, PixelFormat, SampleBuffer, SampleEncoding};
pub use models::session::{OutputKind, SessionStatus, SessionWiring};
pub use models::state::{RecordingPhase, RecordingStatus};
pub use monitor::level_monitor::{AudioLevelMonitor, AudioSnapshot};
pub use recording::pipeline::Recorder;
pub use screen::adapter::ScreenCaptureAdapter;
pub use session::capture_session::CaptureSession;
pub use session::transaction::Transaction;
pub use storage::container_writer::{
    read_container_chunks, read_container_summary, ChunkInfo, ContainerFileWriter, ContainerWriterFactory,
};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_hardware::{CaptureHardware, HardwareEvent, HardwareEventHandler, SampleHandler};
pub use traits::clock::{Clock, ManualClock, SystemClock};
pub use traits::device_catalog::DeviceCatalog;
pub use traits::media_writer::{FinishedMedia, MediaWriter, WriterFactory};
pub use traits::permission_gate::{AllowAll, AuthorizationStatus, PermissionGate};
pub use traits::sample_source::SampleSource;
pub use traits::screen_backend::{DisplayInfo, ResolvedScreenCapture, ScreenCaptureBackend, ShareableContent, WindowInfo};
