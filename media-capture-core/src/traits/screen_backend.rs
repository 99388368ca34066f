use serde::{Deserialize, Serialize};

use crate::models::config::ScreenCaptureConfiguration;
use crate::models::device::Device;
use crate::models::error::CaptureError;
use crate::traits::capture_hardware::SampleHandler;

/// A display available for capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// A window available for capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
    pub app_name: String,
    pub width: u32,
    pub height: u32,
    pub is_on_screen: bool,
}

/// Everything the OS lets us capture right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareableContent {
    pub displays: Vec<DisplayInfo>,
    pub windows: Vec<WindowInfo>,
    pub cameras: Vec<Device>,
}

impl ShareableContent {
    /// Narrowest window worth offering as a capture target.
    pub const MIN_WINDOW_WIDTH: u32 = 100;

    /// On-screen windows wide enough to be meaningful targets.
    pub fn capturable_windows(&self) -> impl Iterator<Item = &WindowInfo> {
        self.windows
            .iter()
            .filter(|w| w.is_on_screen && w.width > Self::MIN_WINDOW_WIDTH)
    }
}

/// A screen capture request with its output size resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScreenCapture {
    pub config: ScreenCaptureConfiguration,
    pub width: u32,
    pub height: u32,
}

/// OS screen/window capture (ScreenCaptureKit, PipeWire, the virtual backend).
pub trait ScreenCaptureBackend: Send {
    fn shareable_content(&self) -> Result<ShareableContent, CaptureError>;

    /// Begin delivering frames to `video` (and system audio to `audio` when
    /// requested) on the backend's own thread.
    fn start(
        &mut self,
        capture: &ResolvedScreenCapture,
        video: SampleHandler,
        audio: Option<SampleHandler>,
    ) -> Result<(), CaptureError>;

    fn stop(&mut self) -> Result<(), CaptureError>;
}
