use parking_lot::FairMutexGuard;

use crate::models::device::{Device, MediaKind};
use crate::models::error::{CaptureError, MediaAccess};
use crate::models::session::{OutputKind, SessionWiring};
use crate::traits::permission_gate::ensure_authorized;

use super::capture_session::{CaptureSession, SessionCore};

/// Exclusive configuration access to a [`CaptureSession`].
///
/// Changes are staged against a copy of the committed wiring and reach the
/// hardware only on [`Transaction::commit`], as one atomic reconfiguration.
/// Dropping the transaction without committing discards the staged changes.
/// While a transaction is alive every other `begin_configuration` call
/// waits, and waiters are served in arrival order.
pub struct Transaction<'s> {
    session: &'s CaptureSession,
    core: FairMutexGuard<'s, SessionCore>,
    pending: SessionWiring,
    dirty: bool,
}

impl<'s> Transaction<'s> {
    pub(super) fn new(session: &'s CaptureSession, core: FairMutexGuard<'s, SessionCore>) -> Self {
        let pending = core.wiring.clone();
        Self {
            session,
            core,
            pending,
            dirty: false,
        }
    }

    /// Stage `device` as the active input of its kind.
    ///
    /// The device is re-resolved against the catalog, so a device that was
    /// unplugged after enumeration fails with `DeviceUnavailable`.
    pub fn add_input(&mut self, device: &Device) -> Result<(), CaptureError> {
        self.ensure_configurable()?;
        if self.pending.input(device.kind).is_some() {
            return Err(CaptureError::InputConflict(device.kind));
        }
        let live = self
            .session
            .registry()
            .resolve(&device.id)
            .filter(|d| d.kind == device.kind)
            .ok_or_else(|| CaptureError::DeviceUnavailable(device.id.clone()))?;
        ensure_authorized(self.session.permissions(), MediaAccess::for_kind(live.kind))?;

        let kind = live.kind;
        log::debug!("staging {} input {}", kind, live.id);
        *self.pending.input_slot(kind) = Some(live);
        self.dirty = true;
        Ok(())
    }

    /// Unstage the input matching `device`.
    pub fn remove_input(&mut self, device: &Device) -> Result<Device, CaptureError> {
        self.ensure_configurable()?;
        let slot = self.pending.input_slot(device.kind);
        match slot.take_if(|active| active.id == device.id) {
            Some(removed) => {
                self.dirty = true;
                Ok(removed)
            }
            None => Err(CaptureError::InputNotFound(device.id.clone())),
        }
    }

    /// Unstage whatever input of `kind` is active.
    pub fn remove_input_of_kind(&mut self, kind: MediaKind) -> Result<Device, CaptureError> {
        self.ensure_configurable()?;
        let removed = self
            .pending
            .input_slot(kind)
            .take()
            .ok_or_else(|| CaptureError::InputNotFound(kind.to_string()))?;
        self.dirty = true;
        Ok(removed)
    }

    pub fn add_output(&mut self, output: OutputKind) -> Result<(), CaptureError> {
        self.ensure_configurable()?;
        if !self.pending.outputs.insert(output) {
            return Err(CaptureError::OutputConflict(output));
        }
        self.dirty = true;
        Ok(())
    }

    pub fn remove_output(&mut self, output: OutputKind) -> Result<(), CaptureError> {
        self.ensure_configurable()?;
        if !self.pending.outputs.remove(&output) {
            return Err(CaptureError::OutputNotFound(output));
        }
        self.dirty = true;
        Ok(())
    }

    /// The wiring as it will look after commit.
    pub fn pending(&self) -> &SessionWiring {
        &self.pending
    }

    /// Apply the staged changes and release the session.
    pub fn commit(mut self) -> Result<(), CaptureError> {
        self.apply()
    }

    /// Push staged changes to the hardware without releasing the session.
    /// On failure the committed wiring is unchanged.
    pub(super) fn apply(&mut self) -> Result<(), CaptureError> {
        if !self.dirty {
            return Ok(());
        }
        self.core.hardware.apply(&self.pending)?;
        self.core.wiring = self.pending.clone();
        self.dirty = false;
        log::info!(
            "session configured: video={:?} audio={:?} outputs={:?}",
            self.pending.video_input.as_ref().map(|d| d.id.as_str()),
            self.pending.audio_input.as_ref().map(|d| d.id.as_str()),
            self.pending.outputs
        );
        Ok(())
    }

    /// Clear a staged input without the configurability check. Used to
    /// fall back to a degraded wiring after a failed swap.
    pub(super) fn clear_input(&mut self, kind: MediaKind) {
        if self.pending.input_slot(kind).take().is_some() {
            self.dirty = true;
        }
    }

    pub(super) fn ensure_configurable(&self) -> Result<(), CaptureError> {
        if self.core.torn_down || self.session.is_invalidated() {
            return Err(CaptureError::SessionNotConfigurable);
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.dirty {
            log::debug!("configuration transaction dropped, discarding staged changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::test_support::fake_session;

    #[test]
    fn commit_applies_once_atomically() {
        let (session, probe, _) = fake_session();
        let cam = session.registry().resolve("cam-1").unwrap();
        let mic = session.registry().resolve("mic-1").unwrap();

        let mut tx = session.begin_configuration();
        tx.add_input(&cam).unwrap();
        tx.add_input(&mic).unwrap();
        tx.add_output(OutputKind::VideoData).unwrap();
        tx.add_output(OutputKind::AudioData).unwrap();
        tx.commit().unwrap();

        assert_eq!(probe.apply_count(), 1);
        let wiring = session.configuration();
        assert_eq!(wiring.video_input, Some(cam));
        assert_eq!(wiring.audio_input, Some(mic));
        assert_eq!(wiring.outputs.len(), 2);
    }

    #[test]
    fn dropping_discards_changes() {
        let (session, probe, _) = fake_session();
        let cam = session.registry().resolve("cam-1").unwrap();
        {
            let mut tx = session.begin_configuration();
            tx.add_input(&cam).unwrap();
        }
        assert_eq!(probe.apply_count(), 0);
        assert!(session.configuration().is_empty());
    }

    #[test]
    fn second_input_of_same_kind_conflicts() {
        let (session, _, _) = fake_session();
        let cam1 = session.registry().resolve("cam-1").unwrap();
        let cam2 = session.registry().resolve("cam-2").unwrap();

        let mut tx = session.begin_configuration();
        tx.add_input(&cam1).unwrap();
        assert_eq!(tx.add_input(&cam2), Err(CaptureError::InputConflict(MediaKind::Video)));
        assert_eq!(tx.pending().video_input.as_ref(), Some(&cam1));
    }

    #[test]
    fn unplugged_device_is_unavailable() {
        let (session, _, catalog) = fake_session();
        let cam2 = session.registry().resolve("cam-2").unwrap();
        catalog.disconnect("cam-2");

        let mut tx = session.begin_configuration();
        assert_eq!(tx.add_input(&cam2), Err(CaptureError::DeviceUnavailable("cam-2".into())));
    }

    #[test]
    fn remove_unknown_input_fails() {
        let (session, _, _) = fake_session();
        let cam = session.registry().resolve("cam-1").unwrap();
        let mut tx = session.begin_configuration();
        assert_eq!(tx.remove_input(&cam), Err(CaptureError::InputNotFound("cam-1".into())));
        assert_eq!(tx.remove_output(OutputKind::AudioData), Err(CaptureError::OutputNotFound(OutputKind::AudioData)));
        tx.add_output(OutputKind::AudioData).unwrap();
        assert_eq!(tx.add_output(OutputKind::AudioData), Err(CaptureError::OutputConflict(OutputKind::AudioData)));
    }

    #[test]
    fn failed_commit_keeps_previous_wiring() {
        let (session, probe, _) = fake_session();
        let cam = session.registry().resolve("cam-1").unwrap();
        probe.fail_next_apply("device busy");

        let mut tx = session.begin_configuration();
        tx.add_input(&cam).unwrap();
        assert!(tx.commit().is_err());
        assert!(session.configuration().is_empty());
        assert!(probe.applied_wiring().is_empty());
    }

    #[test]
    fn torn_down_session_is_not_configurable() {
        let (session, _, _) = fake_session();
        session.teardown().unwrap();
        let cam = Device::new("cam-1", MediaKind::Video, "Camera");
        let mut tx = session.begin_configuration();
        assert_eq!(tx.add_input(&cam), Err(CaptureError::SessionNotConfigurable));
        assert_eq!(tx.add_output(OutputKind::VideoData), Err(CaptureError::SessionNotConfigurable));
    }

    #[test]
    fn transactions_are_serialized_in_arrival_order() {
        let (session, _, _) = fake_session();
        let session = Arc::new(session);
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = session.begin_configuration();
        let mut waiters = Vec::new();
        for i in 0..3 {
            let session = Arc::clone(&session);
            let order = Arc::clone(&order);
            waiters.push(thread::spawn(move || {
                let _tx = session.begin_configuration();
                order.lock().push(i);
            }));
            // Give each waiter time to queue before the next one arrives.
            thread::sleep(Duration::from_millis(30));
        }
        assert!(order.lock().is_empty());
        drop(first);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
