use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use crossbeam_channel::{never, select, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::channel::sample_channel::{CancelToken, ChannelOptions, DeliveryFilter, OverflowPolicy, SampleChannel};
use crate::models::config::{RecordingConfiguration, TrackSettings};
use crate::models::device::MediaKind;
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordedTrack, RecordingMetadata, RecordingResult};
use crate::models::sample::SampleBuffer;
use crate::models::session::OutputKind;
use crate::models::state::{RecordingPhase, RecordingStatus};
use crate::storage::container_writer::ContainerWriterFactory;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::clock::{Clock, SystemClock};
use crate::traits::media_writer::{MediaWriter, WriterFactory};
use crate::traits::sample_source::SampleSource;

use super::timeline::Timeline;

/// Mutable recording state, protected by `parking_lot::Mutex`.
struct RecordingState {
    phase: RecordingPhase,
    started_at: Option<DateTime<Utc>>,
    output_path: Option<PathBuf>,
    start_instant: Option<Instant>,
    end_instant: Option<Instant>,
    paused_since: Option<Instant>,
    paused_total: Duration,
    /// Bumped on every pause so the next admitted buffer closes the gap
    /// even if no buffer arrived during it.
    pause_epoch: u64,
    mapped_epoch: u64,
    timeline: Timeline,
    session_started: bool,
    samples_written: u64,
    discarded_paused: u64,
}

impl RecordingState {
    fn new() -> Self {
        Self {
            phase: RecordingPhase::Idle,
            started_at: None,
            output_path: None,
            start_instant: None,
            end_instant: None,
            paused_since: None,
            paused_total: Duration::ZERO,
            pause_epoch: 0,
            mapped_epoch: 0,
            timeline: Timeline::new(),
            session_started: false,
            samples_written: 0,
            discarded_paused: 0,
        }
    }

    /// Wall time since start, minus time spent paused.
    fn active_duration(&self, now: Instant) -> Duration {
        let Some(start) = self.start_instant else {
            return Duration::ZERO;
        };
        let end = self.end_instant.unwrap_or(now);
        let mut paused = self.paused_total;
        if let Some(since) = self.paused_since {
            paused += end.saturating_duration_since(since);
        }
        end.saturating_duration_since(start).saturating_sub(paused)
    }
}

struct RecorderShared {
    state: Mutex<RecordingState>,
    delegate: RwLock<Option<Arc<dyn CaptureDelegate>>>,
    clock: Arc<dyn Clock>,
}

impl RecorderShared {
    fn phase(&self) -> RecordingPhase {
        self.state.lock().phase
    }

    fn notify_phase(&self, phase: RecordingPhase) {
        log::info!("recording phase: {:?}", phase);
        if let Some(delegate) = self.delegate.read().as_ref() {
            delegate.on_recording_phase_changed(phase);
        }
    }

    fn set_phase(&self, phase: RecordingPhase) {
        self.state.lock().phase = phase;
        self.notify_phase(phase);
    }

    /// Move an active recording to finalizing. Returns false if someone
    /// else already did.
    fn begin_finalizing(&self) -> bool {
        {
            let mut s = self.state.lock();
            if !s.phase.is_active() {
                return false;
            }
            let now = self.clock.now();
            if let Some(since) = s.paused_since.take() {
                s.paused_total += now.saturating_duration_since(since);
            }
            s.end_instant = Some(now);
            s.phase = RecordingPhase::Finalizing;
        }
        self.notify_phase(RecordingPhase::Finalizing);
        true
    }

    fn report(&self, error: &CaptureError) {
        if let Some(delegate) = self.delegate.read().as_ref() {
            delegate.on_error(error);
        }
    }

    /// Decide a buffer's fate when it arrives, on the producer's thread.
    /// Buffers arriving while paused are discarded; the rest are moved onto
    /// the file timeline. The outcome depends on arrival, never on how far
    /// behind the writer is.
    fn admit(&self, buffer: SampleBuffer) -> Option<SampleBuffer> {
        let pts = {
            let mut s = self.state.lock();
            if s.phase == RecordingPhase::Paused {
                s.discarded_paused += 1;
                log::trace!("paused, discarding {} buffer", buffer.media_type());
                return None;
            }
            if s.mapped_epoch != s.pause_epoch {
                s.mapped_epoch = s.pause_epoch;
                s.timeline.mark_pause();
            }
            s.timeline.map(buffer.presentation_timestamp(), buffer.duration())
        };
        if pts == buffer.presentation_timestamp() {
            Some(buffer)
        } else {
            Some(buffer.retimed(pts))
        }
    }
}

enum Control {
    Stop,
}

struct RecordingWorker {
    control: Sender<Control>,
    tokens: Vec<CancelToken>,
    handle: thread::JoinHandle<Result<RecordingResult, CaptureError>>,
}

/// Records a sample source into a media file.
///
/// ```text
/// idle → configuring → running ⇄ paused → finalizing → stopped
///            │                                            │
///            └─ setup failure → idle       start again ───┘
/// ```
///
/// A dedicated worker thread owns the writer and waits on the video
/// channel, the optional audio channel and a control channel at once.
/// The first buffer starts the file timeline. While paused, buffers are
/// discarded and the skipped time is cut out of the file timeline.
pub struct Recorder {
    writers: Arc<dyn WriterFactory>,
    shared: Arc<RecorderShared>,
    worker: Option<RecordingWorker>,
}

impl Recorder {
    pub fn new(writers: Arc<dyn WriterFactory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            writers,
            shared: Arc::new(RecorderShared {
                state: Mutex::new(RecordingState::new()),
                delegate: RwLock::new(None),
                clock,
            }),
            worker: None,
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.shared.delegate.write() = Some(delegate);
    }

    /// Copy of the current recording state.
    pub fn status(&self) -> RecordingStatus {
        let s = self.shared.state.lock();
        RecordingStatus {
            phase: s.phase,
            started_at: s.started_at,
            output_path: s.output_path.clone(),
            duration_secs: s.active_duration(self.shared.clock.now()).as_secs_f64(),
        }
    }

    pub fn phase(&self) -> RecordingPhase {
        self.shared.phase()
    }

    /// Active recording time in seconds, excluding pauses.
    pub fn duration(&self) -> f64 {
        let s = self.shared.state.lock();
        s.active_duration(self.shared.clock.now()).as_secs_f64()
    }

    /// Samples appended to the file so far, across tracks.
    pub fn samples_written(&self) -> u64 {
        self.shared.state.lock().samples_written
    }

    /// Samples discarded because the recording was paused.
    pub fn samples_discarded(&self) -> u64 {
        self.shared.state.lock().discarded_paused
    }

    /// Begin recording `source` with `config`.
    ///
    /// Allowed from idle or stopped. Any failure before the worker runs
    /// returns the recorder to idle and removes the partial file.
    pub fn start_recording(
        &mut self,
        source: &dyn SampleSource,
        config: &RecordingConfiguration,
    ) -> Result<(), CaptureError> {
        {
            let mut s = self.shared.state.lock();
            if !matches!(s.phase, RecordingPhase::Idle | RecordingPhase::Stopped) {
                return Err(CaptureError::AlreadyRecording);
            }
            config.validate().map_err(CaptureError::ConfigurationFailed)?;
            *s = RecordingState::new();
            s.phase = RecordingPhase::Configuring;
            s.start_instant = Some(self.shared.clock.now());
        }
        self.shared.notify_phase(RecordingPhase::Configuring);
        self.reap_worker();

        let path = config.resolve_output_path(Local::now());
        match self.launch(source, config, &path) {
            Ok(worker) => {
                {
                    let mut s = self.shared.state.lock();
                    s.started_at = Some(Utc::now());
                    s.output_path = Some(path.clone());
                }
                self.worker = Some(worker);
                log::info!("recording to {}", path.display());
                Ok(())
            }
            Err(e) => {
                log::error!("failed to start recording: {}", e);
                remove_partial(&path);
                *self.shared.state.lock() = RecordingState::new();
                self.shared.notify_phase(RecordingPhase::Idle);
                Err(e)
            }
        }
    }

    fn launch(
        &self,
        source: &dyn SampleSource,
        config: &RecordingConfiguration,
        path: &Path,
    ) -> Result<RecordingWorker, CaptureError> {
        let tracks = config.track_settings();
        let options = ChannelOptions::new(config.channel_capacity, OverflowPolicy::DropNewest);

        let video = source.open_channel(OutputKind::VideoData, options)?;
        let audio = match tracks.audio {
            Some(_) => Some(source.open_channel(OutputKind::AudioData, options)?),
            None => None,
        };
        let writer = self.writers.create_writer(path, &tracks)?;

        let shared = Arc::clone(&self.shared);
        let admit: DeliveryFilter = Arc::new(move |buffer: SampleBuffer| shared.admit(buffer));
        video.set_filter(Arc::clone(&admit));
        if let Some(audio) = &audio {
            audio.set_filter(admit);
        }

        let mut tokens = vec![video.cancel_token()];
        tokens.extend(audio.as_ref().map(SampleChannel::cancel_token));
        let (control, control_rx) = crossbeam_channel::bounded(1);

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            writer,
            tracks,
            video,
            audio,
            control: control_rx,
            audio_finished: false,
            video_track: TrackCounters::default(),
            audio_track: TrackCounters::default(),
        };
        let handle = thread::Builder::new()
            .name("recording-writer".into())
            .spawn(move || worker.run())
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn recording thread: {}", e)))?;

        Ok(RecordingWorker {
            control,
            tokens,
            handle,
        })
    }

    /// Stop discarding buffers from the writer; duration freezes.
    pub fn pause(&self) -> Result<(), CaptureError> {
        {
            let mut s = self.shared.state.lock();
            match s.phase {
                RecordingPhase::Paused => return Ok(()),
                RecordingPhase::Running | RecordingPhase::Configuring => {
                    s.phase = RecordingPhase::Paused;
                    s.paused_since = Some(self.shared.clock.now());
                    s.pause_epoch += 1;
                }
                _ => return Err(CaptureError::NotRecording),
            }
        }
        self.shared.notify_phase(RecordingPhase::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), CaptureError> {
        let phase = {
            let mut s = self.shared.state.lock();
            match s.phase {
                RecordingPhase::Running | RecordingPhase::Configuring => return Ok(()),
                RecordingPhase::Paused => {
                    let now = self.shared.clock.now();
                    if let Some(since) = s.paused_since.take() {
                        s.paused_total += now.saturating_duration_since(since);
                    }
                    s.phase = if s.session_started {
                        RecordingPhase::Running
                    } else {
                        RecordingPhase::Configuring
                    };
                    s.phase
                }
                _ => return Err(CaptureError::NotRecording),
            }
        };
        self.shared.notify_phase(phase);
        Ok(())
    }

    /// Finalize the recording and wait for the file to be closed out.
    ///
    /// Fails with `NotRecording` when nothing is active, including after a
    /// previous stop. On finalization failure the recorder still ends up
    /// stopped and the partial file is kept.
    pub fn stop_recording(&mut self) -> Result<RecordingResult, CaptureError> {
        if !self.shared.begin_finalizing() {
            return Err(CaptureError::NotRecording);
        }
        let worker = self
            .worker
            .take()
            .ok_or_else(|| CaptureError::Unknown("recording worker missing".into()))?;

        for token in &worker.tokens {
            token.cancel();
        }
        // The worker may already be gone if its channels just ended.
        let _ = worker.control.try_send(Control::Stop);
        match worker.handle.join() {
            Ok(result) => result,
            Err(_) => {
                self.shared.set_phase(RecordingPhase::Stopped);
                Err(CaptureError::Unknown("recording thread panicked".into()))
            }
        }
    }

    /// Join a worker that finished on its own.
    fn reap_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.control.try_send(Control::Stop);
            if worker.handle.join().is_err() {
                log::error!("recording thread panicked");
            }
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(Arc::new(ContainerWriterFactory), Arc::new(SystemClock))
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.shared.phase().is_active() {
            if let Err(e) = self.stop_recording() {
                log::warn!("stop on drop failed: {}", e);
            }
        }
        self.reap_worker();
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("failed to remove partial file {}: {}", path.display(), e);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TrackCounters {
    written: u64,
    dropped: u64,
}

enum Ending {
    Requested,
    SourceEnded,
}

/// State owned by the recording thread.
struct Worker {
    shared: Arc<RecorderShared>,
    writer: Box<dyn MediaWriter>,
    tracks: TrackSettings,
    video: SampleChannel,
    audio: Option<SampleChannel>,
    control: Receiver<Control>,
    audio_finished: bool,
    video_track: TrackCounters,
    audio_track: TrackCounters,
}

impl Worker {
    fn run(mut self) -> Result<RecordingResult, CaptureError> {
        let control = self.control.clone();
        let video_rx = self.video.receiver().clone();
        let mut audio_rx = self
            .audio
            .as_ref()
            .map(|c| c.receiver().clone())
            .unwrap_or_else(never);

        let ending = loop {
            let audio = audio_rx.clone();
            select! {
                recv(control) -> _ => break Ending::Requested,
                recv(video_rx) -> msg => match msg {
                    Ok(buffer) => self.handle(buffer)?,
                    Err(_) => break self.ending(),
                },
                recv(audio) -> msg => match msg {
                    Ok(buffer) => self.handle(buffer)?,
                    Err(_) => {
                        if self.shared.phase() == RecordingPhase::Finalizing {
                            break Ending::Requested;
                        }
                        log::warn!("audio channel ended, continuing video-only");
                        self.writer.mark_finished(MediaKind::Audio);
                        self.audio_finished = true;
                        audio_rx = never();
                    }
                },
            }
        };

        // Keep whatever was already queued on either track.
        let queued: Vec<SampleBuffer> = video_rx.try_iter().chain(audio_rx.try_iter()).collect();
        for buffer in queued {
            self.handle(buffer)?;
        }
        match ending {
            Ending::Requested => self.finalize(false),
            Ending::SourceEnded => {
                log::info!("sample source ended, finalizing recording");
                self.finalize(true)
            }
        }
    }

    fn ending(&self) -> Ending {
        if self.shared.begin_finalizing() {
            Ending::SourceEnded
        } else {
            Ending::Requested
        }
    }

    /// Append a buffer that was admitted on delivery and already retimed.
    fn handle(&mut self, buffer: SampleBuffer) -> Result<(), CaptureError> {
        let kind = buffer.media_type();
        let session_started = self.shared.state.lock().session_started;
        if !session_started {
            if let Err(e) = self.writer.start_session(buffer.presentation_timestamp()) {
                return Err(self.abort(e));
            }
            let moved = {
                let mut s = self.shared.state.lock();
                s.session_started = true;
                if s.phase == RecordingPhase::Configuring {
                    s.phase = RecordingPhase::Running;
                    true
                } else {
                    false
                }
            };
            if moved {
                self.shared.notify_phase(RecordingPhase::Running);
            }
        }

        let counters = match kind {
            MediaKind::Video => &mut self.video_track,
            MediaKind::Audio => &mut self.audio_track,
        };
        if !self.writer.is_ready_for_more(kind) {
            counters.dropped += 1;
            log::debug!("writer not ready, dropping {} buffer", kind);
            return Ok(());
        }

        match self.writer.append(&buffer) {
            Ok(()) => {
                counters.written += 1;
                self.shared.state.lock().samples_written += 1;
            }
            Err(e) => {
                counters.dropped += 1;
                log::warn!("dropping {} buffer: {}", kind, e);
            }
        }
        Ok(())
    }

    /// The writer could not start: tear the recording down to idle.
    fn abort(&mut self, error: CaptureError) -> CaptureError {
        log::error!("writer failed to start session: {}", error);
        self.video.cancel();
        if let Some(audio) = &self.audio {
            audio.cancel();
        }
        remove_partial(self.writer.output_path());
        *self.shared.state.lock() = RecordingState::new();
        self.shared.notify_phase(RecordingPhase::Idle);
        self.shared.report(&error);
        error
    }

    fn finalize(mut self, ended_by_source: bool) -> Result<RecordingResult, CaptureError> {
        self.video.cancel();
        if let Some(audio) = &self.audio {
            audio.cancel();
        }
        self.writer.mark_finished(MediaKind::Video);
        if self.tracks.audio.is_some() && !self.audio_finished {
            self.writer.mark_finished(MediaKind::Audio);
        }

        let finished = self.writer.finish();
        let (duration, started_at, discarded_paused) = {
            let s = self.shared.state.lock();
            (
                s.active_duration(self.shared.clock.now()),
                s.started_at.unwrap_or_else(Utc::now),
                s.discarded_paused,
            )
        };
        self.shared.set_phase(RecordingPhase::Stopped);

        let media = match finished {
            Ok(media) => media,
            Err(e) => {
                log::error!(
                    "finalization failed, keeping partial file {}: {}",
                    self.writer.output_path().display(),
                    e
                );
                self.shared.report(&e);
                return Err(e);
            }
        };

        let mut tracks = vec![RecordedTrack {
            kind: MediaKind::Video,
            samples_written: self.video_track.written,
            samples_dropped: self.video_track.dropped + self.video.stats().dropped,
        }];
        if let Some(audio) = &self.audio {
            tracks.push(RecordedTrack {
                kind: MediaKind::Audio,
                samples_written: self.audio_track.written,
                samples_dropped: self.audio_track.dropped + audio.stats().dropped,
            });
        }
        let mut metadata = RecordingMetadata::new(self.tracks.clone(), tracks);
        metadata.samples_discarded_paused = discarded_paused;
        metadata.ended_by_source = ended_by_source;

        let result = RecordingResult {
            file_path: self.writer.output_path().to_path_buf(),
            duration_secs: duration.as_secs_f64(),
            media_duration_secs: media.media_duration.as_secs_f64(),
            started_at,
            ended_at: Utc::now(),
            checksum: media.checksum,
            metadata,
        };
        if let Some(delegate) = self.shared.delegate.read().as_ref() {
            delegate.on_recording_finished(&result);
        }
        Ok(result)
    }
}
