//! Synthetic screen capture backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use media_capture_core::models::device::{Device, MediaKind};
use media_capture_core::models::error::CaptureError;
use media_capture_core::models::sample::{FormatDescriptor, MediaTime, PixelFormat, SampleBuffer};
use media_capture_core::traits::capture_hardware::SampleHandler;
use media_capture_core::traits::screen_backend::{
    DisplayInfo, ResolvedScreenCapture, ScreenCaptureBackend, ShareableContent, WindowInfo,
};

use crate::hardware::Timing;

/// Per-capture state shared with the frame thread and the control handle.
struct ScreenStream {
    capture: ResolvedScreenCapture,
    video: SampleHandler,
    audio: Option<SampleHandler>,
    payload: Bytes,
    next_frame: u64,
}

impl ScreenStream {
    fn emit(&mut self) {
        let rate = self.capture.config.frame_rate;
        let pts = MediaTime::from_frame_index(self.next_frame, rate);
        let duration = MediaTime::from_frame_index(1, rate);
        self.next_frame += 1;
        (self.video)(SampleBuffer::new(
            pts,
            duration,
            self.payload.clone(),
            FormatDescriptor::Video {
                width: self.capture.width,
                height: self.capture.height,
                pixel_format: PixelFormat::Nv12,
            },
        ));
        if let Some(audio) = &self.audio {
            // Silent system audio spanning the frame.
            let frames = (48_000 / rate.max(1)) as usize;
            audio(SampleBuffer::audio_f32(pts, &vec![0.0; frames * 2], 48_000.0, 2));
        }
    }
}

type StreamSlot = Arc<Mutex<Option<ScreenStream>>>;

/// Software [`ScreenCaptureBackend`] with a fixed set of displays, windows
/// and cameras.
pub struct VirtualScreenBackend {
    content: ShareableContent,
    timing: Timing,
    stream: StreamSlot,
    ticker: Option<(Arc<AtomicBool>, thread::JoinHandle<()>)>,
}

impl VirtualScreenBackend {
    pub fn new(content: ShareableContent, timing: Timing) -> (Self, VirtualScreenControl) {
        let stream: StreamSlot = Arc::new(Mutex::new(None));
        (
            Self {
                content,
                timing,
                stream: Arc::clone(&stream),
                ticker: None,
            },
            VirtualScreenControl { stream },
        )
    }

    /// One 1920×1080 display, two windows (one too narrow to offer) and a
    /// capture card.
    pub fn default_content() -> ShareableContent {
        ShareableContent {
            displays: vec![DisplayInfo {
                id: 1,
                name: "Virtual Display".into(),
                width: 1920,
                height: 1080,
                is_primary: true,
            }],
            windows: vec![
                WindowInfo {
                    id: 101,
                    title: "Terminal".into(),
                    app_name: "Terminal".into(),
                    width: 1200,
                    height: 800,
                    is_on_screen: true,
                },
                WindowInfo {
                    id: 102,
                    title: "Tooltip".into(),
                    app_name: "Finder".into(),
                    width: 80,
                    height: 30,
                    is_on_screen: true,
                },
            ],
            cameras: vec![Device::new("virtual-capture-card", MediaKind::Video, "Virtual Capture Card")],
        }
    }
}

impl ScreenCaptureBackend for VirtualScreenBackend {
    fn shareable_content(&self) -> Result<ShareableContent, CaptureError> {
        Ok(self.content.clone())
    }

    fn start(
        &mut self,
        capture: &ResolvedScreenCapture,
        video: SampleHandler,
        audio: Option<SampleHandler>,
    ) -> Result<(), CaptureError> {
        let size = PixelFormat::Nv12.frame_size(capture.width, capture.height);
        *self.stream.lock() = Some(ScreenStream {
            capture: capture.clone(),
            video,
            audio,
            payload: Bytes::from(vec![0x80; size]),
            next_frame: 0,
        });

        if self.timing == Timing::RealTime {
            let alive = Arc::new(AtomicBool::new(true));
            let stream = Arc::clone(&self.stream);
            let thread_alive = Arc::clone(&alive);
            let interval = Duration::from_secs_f64(1.0 / capture.config.frame_rate.max(1) as f64);
            let handle = thread::Builder::new()
                .name("virtual-screen".into())
                .spawn(move || {
                    let started = Instant::now();
                    let mut ticks: u32 = 0;
                    while thread_alive.load(Ordering::SeqCst) {
                        if let Some(stream) = stream.lock().as_mut() {
                            stream.emit();
                        }
                        ticks += 1;
                        thread::sleep((interval * ticks).saturating_sub(started.elapsed()));
                    }
                })
                .map_err(|e| CaptureError::Unknown(format!("failed to spawn screen thread: {}", e)))?;
            self.ticker = Some((alive, handle));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some((alive, handle)) = self.ticker.take() {
            alive.store(false, Ordering::SeqCst);
            if handle.join().is_err() {
                log::error!("virtual screen thread panicked");
            }
        }
        *self.stream.lock() = None;
        Ok(())
    }
}

impl Drop for VirtualScreenBackend {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Pulses a manually timed [`VirtualScreenBackend`].
#[derive(Clone)]
pub struct VirtualScreenControl {
    stream: StreamSlot,
}

impl VirtualScreenControl {
    /// Emit `count` frames now. Returns 0 when no capture is running.
    pub fn emit_frames(&self, count: usize) -> usize {
        let mut slot = self.stream.lock();
        match slot.as_mut() {
            Some(stream) => {
                for _ in 0..count {
                    stream.emit();
                }
                count
            }
            None => 0,
        }
    }

    pub fn current_capture(&self) -> Option<ResolvedScreenCapture> {
        self.stream.lock().as_ref().map(|s| s.capture.clone())
    }
}

#[cfg(test)]
mod tests {
    use media_capture_core::models::config::{CaptureTarget, ScreenCaptureConfiguration};

    use super::*;

    fn capture() -> ResolvedScreenCapture {
        ResolvedScreenCapture {
            config: ScreenCaptureConfiguration::new(CaptureTarget::Display { display_id: 1 }),
            width: 64,
            height: 36,
        }
    }

    #[test]
    fn manual_frames_follow_capture_size() {
        let (mut backend, control) = VirtualScreenBackend::new(VirtualScreenBackend::default_content(), Timing::Manual);
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        assert_eq!(control.emit_frames(1), 0);

        backend.start(&capture(), Arc::new(move |b| sink.lock().push(b)), None).unwrap();
        assert_eq!(control.emit_frames(3), 3);
        backend.stop().unwrap();
        assert_eq!(control.emit_frames(1), 0);

        let frames = frames.lock();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload().len(), 64 * 36 * 3 / 2);
        assert_eq!(frames[2].presentation_timestamp(), MediaTime::from_frame_index(2, 30));
    }

    #[test]
    fn real_time_ticks_until_stopped() {
        let (mut backend, _) = VirtualScreenBackend::new(VirtualScreenBackend::default_content(), Timing::RealTime);
        let frames = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&frames);
        backend.start(&capture(), Arc::new(move |_| *sink.lock() += 1), None).unwrap();
        thread::sleep(Duration::from_millis(150));
        backend.stop().unwrap();
        let seen = *frames.lock();
        assert!(seen >= 2);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*frames.lock(), seen);
    }
}
