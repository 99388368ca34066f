use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel::router::SampleRouter;
use crate::channel::sample_channel::{ChannelOptions, SampleChannel};
use crate::models::config::{CaptureTarget, ScreenCaptureConfiguration};
use crate::models::error::{CaptureError, MediaAccess};
use crate::models::session::OutputKind;
use crate::traits::permission_gate::{ensure_authorized, PermissionGate};
use crate::traits::sample_source::SampleSource;
use crate::traits::screen_backend::{ResolvedScreenCapture, ScreenCaptureBackend, ShareableContent};

/// Output size used for external cameras.
const CAMERA_WIDTH: u32 = 1920;
const CAMERA_HEIGHT: u32 = 1080;

struct AdapterState {
    backend: Box<dyn ScreenCaptureBackend>,
    active: Option<ResolvedScreenCapture>,
}

/// Screen, window or external-camera capture exposed as a sample source.
///
/// Channels opened here follow the same contract as the capture session's:
/// best-effort delivery, per-channel ordering, and termination when the
/// capture stops.
pub struct ScreenCaptureAdapter {
    state: Mutex<AdapterState>,
    permissions: Arc<dyn PermissionGate>,
    video: Arc<SampleRouter>,
    audio: Arc<SampleRouter>,
}

impl ScreenCaptureAdapter {
    pub fn new(backend: Box<dyn ScreenCaptureBackend>, permissions: Arc<dyn PermissionGate>) -> Self {
        Self {
            state: Mutex::new(AdapterState { backend, active: None }),
            permissions,
            video: SampleRouter::new(OutputKind::VideoData),
            audio: SampleRouter::new(OutputKind::AudioData),
        }
    }

    /// Displays, capturable windows and cameras currently available.
    pub fn shareable_content(&self) -> Result<ShareableContent, CaptureError> {
        let mut content = self.state.lock().backend.shareable_content()?;
        content.windows.retain(|w| w.is_on_screen && w.width > ShareableContent::MIN_WINDOW_WIDTH);
        Ok(content)
    }

    pub fn start(&self, config: &ScreenCaptureConfiguration) -> Result<ResolvedScreenCapture, CaptureError> {
        let mut state = self.state.lock();
        if state.active.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let access = match config.target {
            CaptureTarget::ExternalCamera { .. } => MediaAccess::Camera,
            _ => MediaAccess::ScreenRecording,
        };
        ensure_authorized(self.permissions.as_ref(), access)?;

        let content = state.backend.shareable_content()?;
        let capture = resolve(config, &content)?;

        let audio = config.captures_audio.then(|| self.audio.handler());
        state.backend.start(&capture, self.video.handler(), audio)?;
        log::info!(
            "screen capture started: {:?} at {}x{} {} fps",
            capture.config.target,
            capture.width,
            capture.height,
            capture.config.frame_rate
        );
        state.active = Some(capture.clone());
        Ok(capture)
    }

    /// Stop capturing and terminate every open channel.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.active.take().is_none() {
            return Err(CaptureError::NotCapturing);
        }
        let result = state.backend.stop();
        let closed = self.video.close_all() + self.audio.close_all();
        log::info!("screen capture stopped, closed {} channels", closed);
        result
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// The running capture, if any.
    pub fn current_capture(&self) -> Option<ResolvedScreenCapture> {
        self.state.lock().active.clone()
    }
}

/// Check the target exists and settle the output size.
fn resolve(config: &ScreenCaptureConfiguration, content: &ShareableContent) -> Result<ResolvedScreenCapture, CaptureError> {
    let (native_width, native_height, scaled) = match &config.target {
        CaptureTarget::Display { display_id } => content
            .displays
            .iter()
            .find(|d| d.id == *display_id)
            .map(|d| (d.width, d.height, true))
            .ok_or_else(|| CaptureError::TargetUnavailable(format!("display {}", display_id)))?,
        CaptureTarget::Window { window_id } => content
            .capturable_windows()
            .find(|w| w.id == *window_id)
            .map(|w| (w.width, w.height, true))
            .ok_or_else(|| CaptureError::TargetUnavailable(format!("window {}", window_id)))?,
        CaptureTarget::ExternalCamera { device_id } => content
            .cameras
            .iter()
            .find(|c| c.id == *device_id && c.is_connected)
            .map(|_| (CAMERA_WIDTH, CAMERA_HEIGHT, false))
            .ok_or_else(|| CaptureError::TargetUnavailable(format!("camera {}", device_id)))?,
    };
    let scale = |v: u32| if scaled { (v as f64 * config.scale_factor).round() as u32 } else { v };

    Ok(ResolvedScreenCapture {
        config: config.clone(),
        width: config.width.unwrap_or_else(|| scale(native_width)).max(1),
        height: config.height.unwrap_or_else(|| scale(native_height)).max(1),
    })
}

impl SampleSource for ScreenCaptureAdapter {
    fn open_channel(&self, output: OutputKind, options: ChannelOptions) -> Result<SampleChannel, CaptureError> {
        let router = match output {
            OutputKind::VideoData => &self.video,
            OutputKind::AudioData => &self.audio,
        };
        Ok(router.subscribe(options))
    }
}

impl Drop for ScreenCaptureAdapter {
    fn drop(&mut self) {
        if self.is_capturing() {
            if let Err(e) = self.stop() {
                log::warn!("screen capture stop on drop failed: {}", e);
            }
        }
    }
}
