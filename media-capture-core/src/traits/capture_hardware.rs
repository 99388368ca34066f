use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::sample::SampleBuffer;
use crate::models::session::{OutputKind, SessionWiring};

/// Callback invoked with every buffer produced for an output.
///
/// Fires on the backend's dedicated capture thread. Implementations must
/// return quickly and never block.
pub type SampleHandler = Arc<dyn Fn(SampleBuffer) + Send + Sync + 'static>;

/// Callback invoked with hardware lifecycle events.
pub type HardwareEventHandler = Arc<dyn Fn(HardwareEvent) + Send + Sync + 'static>;

/// Asynchronous notifications raised by the hardware layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    /// Capture paused by the system (device claimed elsewhere, lid closed).
    Interrupted { reason: String },
    /// A previous interruption ended and frames are flowing again.
    InterruptionEnded,
    /// The hardware pipeline was torn down underneath the session
    /// (device unplugged, media services reset).
    Invalidated { reason: String },
}

/// The OS-level capture pipeline a `CaptureSession` owns exclusively.
///
/// Implemented by platform backends (AVFoundation, V4L2, the virtual
/// backend). No component other than the session may hold one.
pub trait CaptureHardware: Send {
    /// Replace the current wiring with `wiring` as one atomic
    /// reconfiguration. On error the previous wiring must remain in effect.
    fn apply(&mut self, wiring: &SessionWiring) -> Result<(), CaptureError>;

    /// Start producing buffers. Called only while stopped.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop producing buffers. Called only while running.
    fn stop(&mut self) -> Result<(), CaptureError>;

    fn is_running(&self) -> bool;

    /// Install the callback for an output's buffers, replacing any previous one.
    fn set_sample_handler(&mut self, output: OutputKind, handler: SampleHandler);

    fn set_event_handler(&mut self, handler: HardwareEventHandler);
}
