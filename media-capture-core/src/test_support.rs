//! Fakes shared by the unit tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::channel::router::SampleRouter;
use crate::channel::sample_channel::{ChannelOptions, SampleChannel};
use crate::devices::registry::DeviceRegistry;
use crate::models::config::TrackSettings;
use crate::models::device::{Device, MediaKind};
use crate::models::error::{CaptureError, MediaAccess};
use crate::models::recording_result::RecordingResult;
use crate::models::sample::{FormatDescriptor, MediaTime, PixelFormat, SampleBuffer};
use crate::models::session::{OutputKind, SessionStatus, SessionWiring};
use crate::models::state::RecordingPhase;
use crate::monitor::level_monitor::AudioSnapshot;
use crate::session::capture_session::CaptureSession;
use crate::storage::container_writer::ContainerFileWriter;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_hardware::{CaptureHardware, HardwareEvent, HardwareEventHandler, SampleHandler};
use crate::traits::device_catalog::DeviceCatalog;
use crate::traits::media_writer::{FinishedMedia, MediaWriter, WriterFactory};
use crate::traits::permission_gate::{AuthorizationStatus, PermissionGate};
use crate::traits::sample_source::SampleSource;

/// A 2×2 BGRA frame at index `i` of a 30 fps stream.
pub fn video_frame(i: u64) -> SampleBuffer {
    SampleBuffer::new(
        MediaTime::from_frame_index(i, 30),
        MediaTime::from_frame_index(1, 30),
        Bytes::from(vec![i as u8; 16]),
        FormatDescriptor::Video {
            width: 2,
            height: 2,
            pixel_format: PixelFormat::Bgra8,
        },
    )
}

/// 10 ms of quiet stereo audio at index `i`.
pub fn audio_chunk(i: u64) -> SampleBuffer {
    let samples = vec![0.1f32; 960];
    SampleBuffer::audio_f32(MediaTime::from_nanos(i * 10_000_000), &samples, 48_000.0, 2)
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub struct FakeCatalog {
    devices: Mutex<Vec<Device>>,
    failing: AtomicBool,
}

impl FakeCatalog {
    /// Two cameras (cam-1 is the default) and one microphone.
    pub fn with_defaults() -> Self {
        Self {
            devices: Mutex::new(vec![
                Device::new("cam-1", MediaKind::Video, "Built-in Camera").as_default(),
                Device::new("cam-2", MediaKind::Video, "USB Camera"),
                Device::new("mic-1", MediaKind::Audio, "Built-in Microphone").as_default(),
            ]),
            failing: AtomicBool::new(false),
        }
    }

    pub fn disconnect(&self, id: &str) {
        self.set_connected(id, false);
    }

    pub fn connect(&self, id: &str) {
        self.set_connected(id, true);
    }

    pub fn fail_queries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_connected(&self, id: &str, connected: bool) {
        for device in self.devices.lock().iter_mut().filter(|d| d.id == id) {
            device.is_connected = connected;
        }
    }
}

impl DeviceCatalog for FakeCatalog {
    fn devices(&self, kind: MediaKind) -> Result<Vec<Device>, CaptureError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CaptureError::Unknown("device query failed".into()));
        }
        Ok(self.devices.lock().iter().filter(|d| d.kind == kind).cloned().collect())
    }
}

/// Authorizes everything not explicitly denied.
#[derive(Default)]
pub struct FakePermissions {
    denied: Mutex<HashSet<MediaAccess>>,
}

impl FakePermissions {
    pub fn deny(&self, access: MediaAccess) {
        self.denied.lock().insert(access);
    }
}

impl PermissionGate for FakePermissions {
    fn status(&self, access: MediaAccess) -> AuthorizationStatus {
        if self.denied.lock().contains(&access) {
            AuthorizationStatus::Denied
        } else {
            AuthorizationStatus::Authorized
        }
    }

    fn request(&self, access: MediaAccess) -> AuthorizationStatus {
        self.status(access)
    }
}

#[derive(Default)]
struct FakeHardwareState {
    applied: SessionWiring,
    apply_count: usize,
    failing_applies: u32,
    apply_failure: String,
    running: bool,
    start_count: usize,
    stop_count: usize,
    failing_starts: u32,
    video_handler: Option<SampleHandler>,
    audio_handler: Option<SampleHandler>,
    event_handler: Option<HardwareEventHandler>,
}

/// In-memory hardware. Its probe lets tests inspect and drive it.
pub struct FakeHardware {
    state: Arc<Mutex<FakeHardwareState>>,
}

#[derive(Clone)]
pub struct FakeHardwareProbe {
    state: Arc<Mutex<FakeHardwareState>>,
}

impl FakeHardware {
    pub fn new() -> (Self, FakeHardwareProbe) {
        let state = Arc::new(Mutex::new(FakeHardwareState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            FakeHardwareProbe { state },
        )
    }
}

impl CaptureHardware for FakeHardware {
    fn apply(&mut self, wiring: &SessionWiring) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.apply_count += 1;
        if state.failing_applies > 0 {
            state.failing_applies -= 1;
            return Err(CaptureError::ConfigurationFailed(state.apply_failure.clone()));
        }
        state.applied = wiring.clone();
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(CaptureError::Interrupted("hardware not ready".into()));
        }
        state.running = true;
        state.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.running = false;
        state.stop_count += 1;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn set_sample_handler(&mut self, output: OutputKind, handler: SampleHandler) {
        let mut state = self.state.lock();
        match output {
            OutputKind::VideoData => state.video_handler = Some(handler),
            OutputKind::AudioData => state.audio_handler = Some(handler),
        }
    }

    fn set_event_handler(&mut self, handler: HardwareEventHandler) {
        self.state.lock().event_handler = Some(handler);
    }
}

impl FakeHardwareProbe {
    pub fn apply_count(&self) -> usize {
        self.state.lock().apply_count
    }

    pub fn fail_next_apply(&self, reason: &str) {
        self.fail_next_applies(1, reason);
    }

    pub fn fail_next_applies(&self, count: u32, reason: &str) {
        let mut state = self.state.lock();
        state.failing_applies = count;
        state.apply_failure = reason.to_string();
    }

    pub fn applied_wiring(&self) -> SessionWiring {
        self.state.lock().applied.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().start_count
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().stop_count
    }

    pub fn fail_next_starts(&self, count: u32) {
        self.state.lock().failing_starts = count;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Deliver `buffer` as if the capture thread produced it.
    pub fn emit(&self, buffer: SampleBuffer) {
        let handler = {
            let state = self.state.lock();
            match buffer.media_type() {
                MediaKind::Video => state.video_handler.clone(),
                MediaKind::Audio => state.audio_handler.clone(),
            }
        };
        if let Some(handler) = handler {
            handler(buffer);
        }
    }

    pub fn raise(&self, event: HardwareEvent) {
        let handler = self.state.lock().event_handler.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

pub fn fake_session() -> (CaptureSession, FakeHardwareProbe, Arc<FakeCatalog>) {
    fake_session_with(Arc::new(FakePermissions::default()))
}

pub fn fake_session_with(permissions: Arc<FakePermissions>) -> (CaptureSession, FakeHardwareProbe, Arc<FakeCatalog>) {
    let catalog = Arc::new(FakeCatalog::with_defaults());
    let (hardware, probe) = FakeHardware::new();
    let session = CaptureSession::new(Box::new(hardware), DeviceRegistry::new(catalog.clone()), permissions);
    (session, probe, catalog)
}

/// A sample source driven by hand.
pub struct ManualSource {
    video: Arc<SampleRouter>,
    audio: Arc<SampleRouter>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self {
            video: SampleRouter::new(OutputKind::VideoData),
            audio: SampleRouter::new(OutputKind::AudioData),
        }
    }

    pub fn emit(&self, buffer: SampleBuffer) {
        match buffer.media_type() {
            MediaKind::Video => self.video.dispatch(buffer),
            MediaKind::Audio => self.audio.dispatch(buffer),
        }
    }

    pub fn open_channels(&self, output: OutputKind) -> usize {
        match output {
            OutputKind::VideoData => self.video.subscriber_count(),
            OutputKind::AudioData => self.audio.subscriber_count(),
        }
    }

    /// End every open channel, as a source going away would.
    pub fn close_all(&self) {
        self.video.close_all();
        self.audio.close_all();
    }

    /// End the channels of one output only.
    pub fn close(&self, output: OutputKind) {
        match output {
            OutputKind::VideoData => self.video.close_all(),
            OutputKind::AudioData => self.audio.close_all(),
        };
    }
}

impl SampleSource for ManualSource {
    fn open_channel(&self, output: OutputKind, options: ChannelOptions) -> Result<SampleChannel, CaptureError> {
        let router = match output {
            OutputKind::VideoData => &self.video,
            OutputKind::AudioData => &self.audio,
        };
        Ok(router.subscribe(options))
    }
}

/// Delegate that remembers every callback.
#[derive(Default)]
pub struct RecordingDelegate {
    statuses: Mutex<Vec<SessionStatus>>,
    phases: Mutex<Vec<RecordingPhase>>,
    errors: Mutex<Vec<CaptureError>>,
    finished: Mutex<Vec<RecordingResult>>,
    level_updates: AtomicUsize,
}

impl RecordingDelegate {
    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.statuses.lock().clone()
    }

    pub fn phases(&self) -> Vec<RecordingPhase> {
        self.phases.lock().clone()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.errors.lock().clone()
    }

    pub fn finished(&self) -> Vec<RecordingResult> {
        self.finished.lock().clone()
    }

    pub fn level_updates(&self) -> usize {
        self.level_updates.load(Ordering::SeqCst)
    }
}

impl CaptureDelegate for RecordingDelegate {
    fn on_session_status_changed(&self, status: &SessionStatus) {
        self.statuses.lock().push(status.clone());
    }

    fn on_recording_phase_changed(&self, phase: RecordingPhase) {
        self.phases.lock().push(phase);
    }

    fn on_levels_updated(&self, _snapshot: &AudioSnapshot) {
        self.level_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        self.finished.lock().push(result.clone());
    }
}

/// Writer factory that fails at a chosen step.
pub struct FailingWriterFactory {
    fail_on_create: bool,
}

impl FailingWriterFactory {
    pub fn on_create() -> Self {
        Self { fail_on_create: true }
    }

    /// Writes a real file but fails to finalize it.
    pub fn on_finish() -> Self {
        Self { fail_on_create: false }
    }
}

impl WriterFactory for FailingWriterFactory {
    fn create_writer(&self, path: &Path, tracks: &TrackSettings) -> Result<Box<dyn MediaWriter>, CaptureError> {
        if self.fail_on_create {
            return Err(CaptureError::WriterSetupFailed("disk full".into()));
        }
        Ok(Box::new(UnfinishableWriter(ContainerFileWriter::create(path, tracks)?)))
    }
}

struct UnfinishableWriter(ContainerFileWriter);

impl MediaWriter for UnfinishableWriter {
    fn start_session(&mut self, at: MediaTime) -> Result<(), CaptureError> {
        self.0.start_session(at)
    }

    fn is_ready_for_more(&self, kind: MediaKind) -> bool {
        self.0.is_ready_for_more(kind)
    }

    fn append(&mut self, sample: &SampleBuffer) -> Result<(), CaptureError> {
        self.0.append(sample)
    }

    fn mark_finished(&mut self, kind: MediaKind) {
        self.0.mark_finished(kind)
    }

    fn finish(&mut self) -> Result<FinishedMedia, CaptureError> {
        Err(CaptureError::FinalizationFailed("volume went away".into()))
    }

    fn output_path(&self) -> &Path {
        self.0.output_path()
    }
}

#[derive(Default)]
struct WriterGate {
    released: Mutex<bool>,
    opened: Condvar,
    stalled: AtomicBool,
    finished: Mutex<Vec<MediaKind>>,
}

/// Writer factory whose writers hold their first append until
/// [`GatedWriterFactory::release`], like a writer that fell behind.
/// Also records `mark_finished` calls.
#[derive(Clone, Default)]
pub struct GatedWriterFactory {
    gate: Arc<WriterGate>,
}

impl GatedWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a writer is blocked in its first append.
    pub fn is_stalled(&self) -> bool {
        self.gate.stalled.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        *self.gate.released.lock() = true;
        self.gate.opened.notify_all();
    }

    pub fn finished_tracks(&self) -> Vec<MediaKind> {
        self.gate.finished.lock().clone()
    }
}

impl WriterFactory for GatedWriterFactory {
    fn create_writer(&self, path: &Path, tracks: &TrackSettings) -> Result<Box<dyn MediaWriter>, CaptureError> {
        Ok(Box::new(GatedWriter {
            inner: ContainerFileWriter::create(path, tracks)?,
            gate: Arc::clone(&self.gate),
            appended: false,
        }))
    }
}

struct GatedWriter {
    inner: ContainerFileWriter,
    gate: Arc<WriterGate>,
    appended: bool,
}

impl MediaWriter for GatedWriter {
    fn start_session(&mut self, at: MediaTime) -> Result<(), CaptureError> {
        self.inner.start_session(at)
    }

    fn is_ready_for_more(&self, kind: MediaKind) -> bool {
        self.inner.is_ready_for_more(kind)
    }

    fn append(&mut self, sample: &SampleBuffer) -> Result<(), CaptureError> {
        if !self.appended {
            self.appended = true;
            let mut released = self.gate.released.lock();
            if !*released {
                self.gate.stalled.store(true, Ordering::SeqCst);
            }
            while !*released {
                self.gate.opened.wait(&mut released);
            }
        }
        self.inner.append(sample)
    }

    fn mark_finished(&mut self, kind: MediaKind) {
        self.gate.finished.lock().push(kind);
        self.inner.mark_finished(kind)
    }

    fn finish(&mut self) -> Result<FinishedMedia, CaptureError> {
        self.inner.finish()
    }

    fn output_path(&self) -> &Path {
        self.inner.output_path()
    }
}
