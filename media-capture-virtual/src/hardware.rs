//! Synthetic capture hardware.
//!
//! Produces BGRA frames tinted per camera and a sine tone per microphone.
//! With [`Timing::RealTime`] a generator thread paces buffers at the
//! configured rates; with [`Timing::Manual`] nothing is produced until the
//! [`VirtualHardwareControl`] handle pulses it, which keeps tests
//! deterministic.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use media_capture_core::models::error::CaptureError;
use media_capture_core::models::sample::{FormatDescriptor, MediaTime, PixelFormat, SampleBuffer};
use media_capture_core::models::session::{OutputKind, SessionWiring};
use media_capture_core::traits::capture_hardware::{CaptureHardware, HardwareEvent, HardwareEventHandler, SampleHandler};

use crate::catalog::VirtualDeviceCatalog;

/// How buffers are paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// A generator thread emits at the configured rates while running.
    RealTime,
    /// Buffers are emitted only through [`VirtualHardwareControl`].
    Manual,
}

#[derive(Debug, Clone)]
pub struct VirtualHardwareConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub sample_rate: f64,
    pub channels: u16,
    /// Audio frames per emitted chunk.
    pub chunk_frames: usize,
    pub tone_hz: f32,
    pub amplitude: f32,
    pub timing: Timing,
}

impl Default for VirtualHardwareConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
            frame_rate: 30,
            sample_rate: 48_000.0,
            channels: 2,
            chunk_frames: 480,
            tone_hz: 440.0,
            amplitude: 0.25,
            timing: Timing::RealTime,
        }
    }
}

impl VirtualHardwareConfig {
    pub fn manual() -> Self {
        Self {
            timing: Timing::Manual,
            ..Default::default()
        }
    }

    fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_frames as f64 / self.sample_rate)
    }
}

struct HardwareState {
    wiring: SessionWiring,
    running: bool,
    interrupted: bool,
    failing_starts: u32,
    video_handler: Option<SampleHandler>,
    audio_handler: Option<SampleHandler>,
    event_handler: Option<HardwareEventHandler>,
    next_frame: u64,
    next_chunk: u64,
    tone_phase: f32,
    frame_payload: Bytes,
    generator: Option<Generator>,
}

struct Generator {
    alive: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

struct Shared {
    config: VirtualHardwareConfig,
    catalog: Arc<VirtualDeviceCatalog>,
    state: Mutex<HardwareState>,
    frames_emitted: AtomicU64,
    chunks_emitted: AtomicU64,
}

impl Shared {
    fn emit_video(&self) -> bool {
        let config = &self.config;
        let (handler, buffer) = {
            let mut s = self.state.lock();
            if !s.running || s.interrupted || s.wiring.video_input.is_none() || !s.wiring.has_output(OutputKind::VideoData) {
                return false;
            }
            let Some(handler) = s.video_handler.clone() else {
                return false;
            };
            let pts = MediaTime::from_frame_index(s.next_frame, config.frame_rate);
            s.next_frame += 1;
            let buffer = SampleBuffer::new(
                pts,
                MediaTime::from_frame_index(1, config.frame_rate),
                s.frame_payload.clone(),
                FormatDescriptor::Video {
                    width: config.width,
                    height: config.height,
                    pixel_format: PixelFormat::Bgra8,
                },
            );
            (handler, buffer)
        };
        handler(buffer);
        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn emit_audio(&self) -> bool {
        let config = &self.config;
        let (handler, buffer) = {
            let mut s = self.state.lock();
            if !s.running || s.interrupted || s.wiring.audio_input.is_none() || !s.wiring.has_output(OutputKind::AudioData) {
                return false;
            }
            let Some(handler) = s.audio_handler.clone() else {
                return false;
            };
            let pts = MediaTime::from_secs_f64(s.next_chunk as f64 * config.chunk_frames as f64 / config.sample_rate);
            s.next_chunk += 1;

            let step = TAU * config.tone_hz / config.sample_rate as f32;
            let channels = config.channels.max(1) as usize;
            let mut samples = Vec::with_capacity(config.chunk_frames * channels);
            for _ in 0..config.chunk_frames {
                let value = s.tone_phase.sin() * config.amplitude;
                samples.extend(std::iter::repeat(value).take(channels));
                s.tone_phase = (s.tone_phase + step) % TAU;
            }
            (handler, SampleBuffer::audio_f32(pts, &samples, config.sample_rate, config.channels))
        };
        handler(buffer);
        self.chunks_emitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn raise(&self, event: HardwareEvent) {
        let handler = self.state.lock().event_handler.clone();
        match handler {
            Some(handler) => handler(event),
            None => log::debug!("no event handler installed, dropping {:?}", event),
        }
    }

    /// Stop the generator thread, if any, and wait for it.
    fn halt_generator(&self) {
        let generator = self.state.lock().generator.take();
        if let Some(generator) = generator {
            generator.alive.store(false, Ordering::SeqCst);
            if generator.handle.thread().id() != thread::current().id() && generator.handle.join().is_err() {
                log::error!("virtual capture thread panicked");
            }
        }
    }
}

/// Paces video frames and audio chunks against wall time until `alive` clears.
fn generate(shared: Arc<Shared>, alive: Arc<AtomicBool>) {
    let frame_interval = Duration::from_secs_f64(1.0 / shared.config.frame_rate.max(1) as f64);
    let chunk_interval = shared.config.chunk_duration();
    let started = Instant::now();
    let mut frames: u32 = 0;
    let mut chunks: u32 = 0;

    while alive.load(Ordering::SeqCst) {
        let elapsed = started.elapsed();
        while frame_interval * frames <= elapsed {
            shared.emit_video();
            frames += 1;
        }
        while chunk_interval * chunks <= elapsed {
            shared.emit_audio();
            chunks += 1;
        }
        let next = (frame_interval * frames).min(chunk_interval * chunks);
        thread::sleep(next.saturating_sub(started.elapsed()).min(Duration::from_millis(5)));
    }
    log::debug!("virtual capture thread exiting after {} frames", frames);
}

/// Software implementation of [`CaptureHardware`].
pub struct VirtualCaptureHardware {
    shared: Arc<Shared>,
}

impl VirtualCaptureHardware {
    pub fn new(config: VirtualHardwareConfig, catalog: Arc<VirtualDeviceCatalog>) -> (Self, VirtualHardwareControl) {
        let shared = Arc::new(Shared {
            config,
            catalog,
            state: Mutex::new(HardwareState {
                wiring: SessionWiring::default(),
                running: false,
                interrupted: false,
                failing_starts: 0,
                video_handler: None,
                audio_handler: None,
                event_handler: None,
                next_frame: 0,
                next_chunk: 0,
                tone_phase: 0.0,
                frame_payload: Bytes::new(),
                generator: None,
            }),
            frames_emitted: AtomicU64::new(0),
            chunks_emitted: AtomicU64::new(0),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            VirtualHardwareControl { shared },
        )
    }
}

/// BGRA frame filled with a color derived from the camera id.
fn tinted_frame(device_id: &str, width: u32, height: u32) -> Bytes {
    let seed = device_id.bytes().fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    let pixel = [seed as u8, (seed >> 8) as u8, (seed >> 16) as u8, 0xFF];
    let size = PixelFormat::Bgra8.frame_size(width, height);
    Bytes::from(pixel.iter().copied().cycle().take(size).collect::<Vec<u8>>())
}

impl CaptureHardware for VirtualCaptureHardware {
    fn apply(&mut self, wiring: &SessionWiring) -> Result<(), CaptureError> {
        if let Some(missing) = wiring.inputs().find(|d| !self.shared.catalog.is_connected(&d.id)) {
            return Err(CaptureError::DeviceUnavailable(missing.id.clone()));
        }
        let payload = match &wiring.video_input {
            Some(camera) => tinted_frame(&camera.id, self.shared.config.width, self.shared.config.height),
            None => Bytes::new(),
        };
        let mut s = self.shared.state.lock();
        s.wiring = wiring.clone();
        s.frame_payload = payload;
        log::debug!("virtual hardware wired: {:?}", s.wiring);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        {
            let mut s = self.shared.state.lock();
            if s.failing_starts > 0 {
                s.failing_starts -= 1;
                return Err(CaptureError::Interrupted("virtual device busy".into()));
            }
            if s.running {
                return Ok(());
            }
        }
        // A generator left over from an invalidation may still be winding down.
        self.shared.halt_generator();

        let mut s = self.shared.state.lock();
        s.running = true;
        s.interrupted = false;
        if self.shared.config.timing == Timing::RealTime {
            let alive = Arc::new(AtomicBool::new(true));
            let shared = Arc::clone(&self.shared);
            let thread_alive = Arc::clone(&alive);
            let spawned = thread::Builder::new()
                .name("virtual-capture".into())
                .spawn(move || generate(shared, thread_alive));
            match spawned {
                Ok(handle) => s.generator = Some(Generator { alive, handle }),
                Err(e) => {
                    s.running = false;
                    return Err(CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)));
                }
            }
        }
        log::info!("virtual hardware started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.shared.state.lock().running = false;
        self.shared.halt_generator();
        log::info!("virtual hardware stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    fn set_sample_handler(&mut self, output: OutputKind, handler: SampleHandler) {
        let mut s = self.shared.state.lock();
        match output {
            OutputKind::VideoData => s.video_handler = Some(handler),
            OutputKind::AudioData => s.audio_handler = Some(handler),
        }
    }

    fn set_event_handler(&mut self, handler: HardwareEventHandler) {
        self.shared.state.lock().event_handler = Some(handler);
    }
}

impl Drop for VirtualCaptureHardware {
    fn drop(&mut self) {
        self.shared.state.lock().running = false;
        self.shared.halt_generator();
    }
}

/// Drives and disturbs a [`VirtualCaptureHardware`] from the outside.
#[derive(Clone)]
pub struct VirtualHardwareControl {
    shared: Arc<Shared>,
}

impl VirtualHardwareControl {
    /// Emit up to `count` video frames now. Returns how many were delivered;
    /// nothing is delivered while stopped, interrupted or unwired.
    pub fn emit_video_frames(&self, count: usize) -> usize {
        (0..count).take_while(|_| self.shared.emit_video()).count()
    }

    pub fn emit_audio_chunks(&self, count: usize) -> usize {
        (0..count).take_while(|_| self.shared.emit_audio()).count()
    }

    /// Pause production and report an interruption.
    pub fn interrupt(&self, reason: &str) {
        self.shared.state.lock().interrupted = true;
        self.shared.raise(HardwareEvent::Interrupted { reason: reason.into() });
    }

    pub fn end_interruption(&self) {
        self.shared.state.lock().interrupted = false;
        self.shared.raise(HardwareEvent::InterruptionEnded);
    }

    /// Tear the pipeline down underneath the session.
    pub fn invalidate(&self, reason: &str) {
        {
            let mut s = self.shared.state.lock();
            s.running = false;
            if let Some(generator) = &s.generator {
                generator.alive.store(false, Ordering::SeqCst);
            }
        }
        self.shared.raise(HardwareEvent::Invalidated { reason: reason.into() });
    }

    /// Make the next `count` start attempts fail.
    pub fn fail_next_starts(&self, count: u32) {
        self.shared.state.lock().failing_starts = count;
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    pub fn wiring(&self) -> SessionWiring {
        self.shared.state.lock().wiring.clone()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.shared.frames_emitted.load(Ordering::Relaxed)
    }

    pub fn chunks_emitted(&self) -> u64 {
        self.shared.chunks_emitted.load(Ordering::Relaxed)
    }
}
