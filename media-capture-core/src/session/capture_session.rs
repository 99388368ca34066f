use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{FairMutex, Mutex, RwLock};

use crate::channel::router::SampleRouter;
use crate::channel::sample_channel::{ChannelOptions, SampleChannel};
use crate::devices::registry::DeviceRegistry;
use crate::models::config::ReconnectPolicy;
use crate::models::device::{Device, MediaKind};
use crate::models::error::{CaptureError, MediaAccess};
use crate::models::session::{OutputKind, SessionStatus, SessionWiring};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_hardware::{CaptureHardware, HardwareEvent};
use crate::traits::permission_gate::{ensure_authorized, PermissionGate};
use crate::traits::sample_source::SampleSource;

use super::transaction::Transaction;

/// State behind the configuration lock.
pub(crate) struct SessionCore {
    pub(crate) hardware: Box<dyn CaptureHardware>,
    pub(crate) wiring: SessionWiring,
    pub(crate) torn_down: bool,
}

/// State shared with the hardware's callback threads. Never requires the
/// configuration lock.
struct SessionShared {
    status: Mutex<SessionStatus>,
    delegate: RwLock<Option<Arc<dyn CaptureDelegate>>>,
    invalidated: AtomicBool,
    torn_down: AtomicBool,
    video: Arc<SampleRouter>,
    audio: Arc<SampleRouter>,
}

impl SessionShared {
    fn router(&self, output: OutputKind) -> &Arc<SampleRouter> {
        match output {
            OutputKind::VideoData => &self.video,
            OutputKind::AudioData => &self.audio,
        }
    }

    fn close_channels(&self) {
        self.video.close_all();
        self.audio.close_all();
    }

    fn set_status(&self, status: SessionStatus) {
        {
            let mut current = self.status.lock();
            if *current == status {
                return;
            }
            *current = status.clone();
        }
        log::info!("capture session status: {:?}", status);
        if let Some(delegate) = self.delegate.read().as_ref() {
            delegate.on_session_status_changed(&status);
        }
    }

    fn report(&self, error: &CaptureError) {
        if let Some(delegate) = self.delegate.read().as_ref() {
            delegate.on_error(error);
        }
    }

    fn handle_event(&self, event: HardwareEvent) {
        match event {
            HardwareEvent::Interrupted { reason } => {
                log::warn!("capture interrupted: {}", reason);
                self.set_status(SessionStatus::Interrupted { reason });
            }
            HardwareEvent::InterruptionEnded => {
                let resumed = self.status.lock().is_interrupted() && !self.invalidated.load(Ordering::Acquire);
                if resumed {
                    self.set_status(SessionStatus::Running);
                }
            }
            HardwareEvent::Invalidated { reason } => {
                log::error!("capture session invalidated: {}", reason);
                self.invalidated.store(true, Ordering::Release);
                self.close_channels();
                self.set_status(SessionStatus::Interrupted { reason: reason.clone() });
                self.report(&CaptureError::Interrupted(reason));
            }
        }
    }
}

/// Owner of the hardware capture pipeline.
///
/// All reconfiguration goes through [`CaptureSession::begin_configuration`],
/// a fair mutex around the hardware: one transaction at a time, waiters
/// served in arrival order. Capture callbacks never take that lock; they
/// only touch the per-output routers that fan buffers out to channels.
///
/// ```text
/// begin_configuration ─→ [FairMutex<SessionCore>] ─→ CaptureHardware::apply
///
/// capture thread ─→ SampleRouter (video) ─→ SampleChannel …
///                ─→ SampleRouter (audio) ─→ SampleChannel …
/// ```
pub struct CaptureSession {
    core: FairMutex<SessionCore>,
    shared: Arc<SessionShared>,
    registry: DeviceRegistry,
    permissions: Arc<dyn PermissionGate>,
}

impl CaptureSession {
    pub fn new(
        mut hardware: Box<dyn CaptureHardware>,
        registry: DeviceRegistry,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        let shared = Arc::new(SessionShared {
            status: Mutex::new(SessionStatus::Idle),
            delegate: RwLock::new(None),
            invalidated: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            video: SampleRouter::new(OutputKind::VideoData),
            audio: SampleRouter::new(OutputKind::AudioData),
        });

        hardware.set_sample_handler(OutputKind::VideoData, shared.video.handler());
        hardware.set_sample_handler(OutputKind::AudioData, shared.audio.handler());
        let events = Arc::downgrade(&shared);
        hardware.set_event_handler(Arc::new(move |event| {
            if let Some(shared) = events.upgrade() {
                shared.handle_event(event);
            }
        }));

        Self {
            core: FairMutex::new(SessionCore {
                hardware,
                wiring: SessionWiring::default(),
                torn_down: false,
            }),
            shared,
            registry,
            permissions,
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.shared.delegate.write() = Some(delegate);
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub(crate) fn permissions(&self) -> &dyn PermissionGate {
        self.permissions.as_ref()
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.shared.invalidated.load(Ordering::Acquire)
    }

    /// Open a configuration transaction, waiting for any open one to finish.
    pub fn begin_configuration(&self) -> Transaction<'_> {
        Transaction::new(self, self.core.lock())
    }

    /// Copy of the committed wiring.
    pub fn configuration(&self) -> SessionWiring {
        self.core.lock().wiring.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.core.lock().hardware.is_running()
    }

    /// Start producing buffers. No-op if already running.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut core = self.core.lock();
        if core.torn_down || self.is_invalidated() {
            return Err(CaptureError::SessionNotConfigurable);
        }
        if core.hardware.is_running() {
            return Ok(());
        }
        for device in core.wiring.inputs() {
            ensure_authorized(self.permissions(), MediaAccess::for_kind(device.kind))?;
        }
        core.hardware.start()?;
        drop(core);
        self.shared.set_status(SessionStatus::Running);
        Ok(())
    }

    /// Stop producing buffers and terminate every open channel. No-op if
    /// already stopped.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let mut core = self.core.lock();
        if core.hardware.is_running() {
            core.hardware.stop()?;
        }
        drop(core);
        self.shared.close_channels();
        if !matches!(self.status(), SessionStatus::Idle) {
            self.shared.set_status(SessionStatus::Stopped);
        }
        Ok(())
    }

    /// Replace the active input of `kind` with `device` in one transaction.
    ///
    /// A session that cannot be configured is left untouched. Otherwise, if
    /// the new device cannot be added or applied, the session is left with
    /// the previous input removed and no replacement, and the error is
    /// returned. If even that degraded wiring cannot be applied, the
    /// committed wiring stays as it was and the second error is returned.
    pub fn swap_input(&self, kind: MediaKind, device: &Device) -> Result<(), CaptureError> {
        let mut tx = self.begin_configuration();
        tx.ensure_configurable()?;
        let previous = match tx.remove_input_of_kind(kind) {
            Ok(removed) => Some(removed),
            Err(CaptureError::InputNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let outcome = tx.add_input(device).and_then(|()| tx.apply());
        let Err(error) = outcome else {
            log::info!(
                "swapped {} input {} → {}",
                kind,
                previous.as_ref().map_or("none", |d| d.id.as_str()),
                device.id
            );
            return Ok(());
        };

        let mut degraded = None;
        if previous.is_some() {
            log::warn!("swap to {} failed, leaving {} input detached: {}", device.id, kind, error);
            tx.clear_input(kind);
            if let Err(e) = tx.apply() {
                log::error!("failed to apply degraded wiring: {}", e);
                degraded = Some(e);
            }
        } else {
            log::warn!("adding {} input {} failed: {}", kind, device.id, error);
        }
        drop(tx);

        self.shared.report(&error);
        match degraded {
            Some(e) => {
                self.shared.report(&e);
                Err(e)
            }
            None => Err(error),
        }
    }

    /// Remove every input and output, stop the hardware and terminate open
    /// channels. The session cannot be configured afterwards.
    pub fn teardown(&self) -> Result<(), CaptureError> {
        let mut core = self.core.lock();
        if core.torn_down {
            return Ok(());
        }
        let mut result = Ok(());
        if core.hardware.is_running() {
            if let Err(e) = core.hardware.stop() {
                log::error!("failed to stop hardware during teardown: {}", e);
                result = Err(e);
            }
        }
        if let Err(e) = core.hardware.apply(&SessionWiring::default()) {
            log::error!("failed to release inputs during teardown: {}", e);
            result = result.and(Err(e));
        }
        core.wiring = SessionWiring::default();
        core.torn_down = true;
        self.shared.torn_down.store(true, Ordering::Release);
        drop(core);

        self.shared.close_channels();
        self.shared.set_status(SessionStatus::Stopped);
        log::info!("capture session torn down");
        result
    }

    /// Drive an interrupted session back to running.
    ///
    /// ```text
    /// interrupted → reconnecting(1) → … → reconnecting(n) → running
    ///                                            ↓
    ///                                          failed
    /// ```
    ///
    /// Each attempt re-applies the committed wiring and restarts the
    /// hardware, sleeping `policy.backoff` between attempts. A session
    /// that is not interrupted is left alone.
    pub fn recover(&self, policy: &ReconnectPolicy) -> Result<(), CaptureError> {
        let mut core = self.core.lock();
        if core.torn_down {
            return Err(CaptureError::SessionNotConfigurable);
        }
        match self.status() {
            SessionStatus::Interrupted { .. } | SessionStatus::Reconnecting { .. } | SessionStatus::Failed { .. } => {}
            _ => return Ok(()),
        }

        let attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            self.shared.set_status(SessionStatus::Reconnecting { attempt });
            match Self::restart(&mut core) {
                Ok(()) => {
                    self.shared.invalidated.store(false, Ordering::Release);
                    drop(core);
                    self.shared.set_status(SessionStatus::Running);
                    log::info!("capture session recovered after {} attempt(s)", attempt);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("reconnect attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        thread::sleep(policy.backoff);
                    }
                }
            }
        }
        drop(core);

        let error = CaptureError::ReconnectFailed {
            attempts,
            reason: last_error,
        };
        self.shared.set_status(SessionStatus::Failed {
            message: error.to_string(),
        });
        self.shared.report(&error);
        Err(error)
    }

    fn restart(core: &mut SessionCore) -> Result<(), CaptureError> {
        if core.hardware.is_running() {
            core.hardware.stop()?;
        }
        let wiring = core.wiring.clone();
        core.hardware.apply(&wiring)?;
        core.hardware.start()
    }
}

impl SampleSource for CaptureSession {
    fn open_channel(&self, output: OutputKind, options: ChannelOptions) -> Result<SampleChannel, CaptureError> {
        if self.shared.torn_down.load(Ordering::Acquire) {
            return Err(CaptureError::SessionNotConfigurable);
        }
        Ok(self.shared.router(output).subscribe(options))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::warn!("teardown on drop failed: {}", e);
        }
    }
}
