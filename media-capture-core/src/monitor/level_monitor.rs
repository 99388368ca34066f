use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::channel::sample_channel::{CancelToken, ChannelOptions, OverflowPolicy};
use crate::models::config::MonitorConfiguration;
use crate::models::error::CaptureError;
use crate::models::sample::SampleBuffer;
use crate::models::session::OutputKind;
use crate::processing::level_meter;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::sample_source::SampleSource;

/// Point-in-time copy of the monitor's output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioSnapshot {
    /// Smoothed, gain-adjusted level in [0, 1].
    pub level: f32,
    /// Peak absolute sample of the latest buffer, in [0, 1].
    pub peak: f32,
    /// Recent smoothed levels, oldest first.
    pub history: Vec<f32>,
}

struct MonitorState {
    level: f32,
    peak: f32,
    history: RingBuffer<f32>,
}

impl MonitorState {
    fn new(capacity: usize) -> Self {
        Self {
            level: 0.0,
            peak: 0.0,
            history: RingBuffer::new(capacity),
        }
    }

    fn snapshot(&self) -> AudioSnapshot {
        AudioSnapshot {
            level: self.level,
            peak: self.peak,
            history: self.history.to_vec(),
        }
    }
}

struct MonitorRun {
    token: CancelToken,
    handle: thread::JoinHandle<()>,
}

/// Meters an audio channel into a smoothed level plus a bounded history.
///
/// Each buffer's RMS is multiplied by `gain`, clamped to [0, 1] and folded
/// into the running level as `prev * smoothing + new * (1 - smoothing)`.
/// Readers poll [`AudioLevelMonitor::snapshot`]; an optional delegate is
/// pushed every update.
pub struct AudioLevelMonitor {
    config: MonitorConfiguration,
    state: Arc<Mutex<MonitorState>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    run: Option<MonitorRun>,
}

impl AudioLevelMonitor {
    pub fn new(config: MonitorConfiguration) -> Self {
        let config = config.sanitized();
        Self {
            state: Arc::new(Mutex::new(MonitorState::new(config.history_capacity))),
            config,
            delegate: None,
            run: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &MonitorConfiguration {
        &self.config
    }

    /// Begin metering `source`'s audio output, stopping any previous run
    /// first. Levels and history start from zero.
    pub fn start(&mut self, source: &dyn SampleSource) -> Result<(), CaptureError> {
        self.stop();
        *self.state.lock() = MonitorState::new(self.config.history_capacity);

        let channel = source.open_channel(
            OutputKind::AudioData,
            ChannelOptions::new(self.config.channel_capacity, OverflowPolicy::DropOldest),
        )?;
        let token = channel.cancel_token();
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let delegate = self.delegate.clone();

        let handle = thread::Builder::new()
            .name("audio-level-monitor".into())
            .spawn(move || {
                for buffer in channel {
                    Self::process(&state, &config, delegate.as_deref(), &buffer);
                }
                log::debug!("audio level monitor channel ended");
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn monitor thread: {}", e)))?;

        self.run = Some(MonitorRun { token, handle });
        log::info!("audio level monitor started");
        Ok(())
    }

    /// Stop metering. The last snapshot stays readable.
    pub fn stop(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        run.token.cancel();
        if run.handle.join().is_err() {
            log::error!("audio level monitor thread panicked");
        }
        log::info!("audio level monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.handle.is_finished())
    }

    pub fn snapshot(&self) -> AudioSnapshot {
        self.state.lock().snapshot()
    }

    /// Fold one buffer into the level. Returns `false` if the buffer was
    /// dropped as unmeasurable.
    pub fn ingest(&self, buffer: &SampleBuffer) -> bool {
        Self::process(&self.state, &self.config, self.delegate.as_deref(), buffer)
    }

    fn process(
        state: &Mutex<MonitorState>,
        config: &MonitorConfiguration,
        delegate: Option<&dyn CaptureDelegate>,
        buffer: &SampleBuffer,
    ) -> bool {
        let Some(levels) = level_meter::measure(buffer) else {
            log::warn!(
                "dropping unmeasurable {} buffer ({} bytes)",
                buffer.media_type(),
                buffer.payload().len()
            );
            return false;
        };

        let raw = unit_clamp(levels.rms * config.gain);
        let snapshot = {
            let mut s = state.lock();
            let smoothed = s.level * config.smoothing + raw * (1.0 - config.smoothing);
            s.level = unit_clamp(smoothed);
            s.peak = unit_clamp(levels.peak);
            let level = s.level;
            s.history.push(level);
            delegate.map(|_| s.snapshot())
        };

        if let (Some(delegate), Some(snapshot)) = (delegate, snapshot) {
            delegate.on_levels_updated(&snapshot);
        }
        true
    }
}

impl Drop for AudioLevelMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unit_clamp(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use bytes::Bytes;

    use super::*;
    use crate::models::sample::{FormatDescriptor, MediaTime, SampleEncoding};
    use crate::test_support::{video_frame, wait_until, ManualSource, RecordingDelegate};

    fn tone(amplitude: f32) -> SampleBuffer {
        SampleBuffer::audio_f32(MediaTime::ZERO, &[amplitude, -amplitude, amplitude, -amplitude], 48_000.0, 2)
    }

    fn monitor(smoothing: f32, gain: f32) -> AudioLevelMonitor {
        AudioLevelMonitor::new(MonitorConfiguration {
            smoothing,
            gain,
            ..Default::default()
        })
    }

    #[test]
    fn applies_gain_and_clamps() {
        let monitor = monitor(0.0, 18.0);
        monitor.ingest(&tone(0.01));
        assert_relative_eq!(monitor.snapshot().level, 0.18, epsilon = 1e-4);

        monitor.ingest(&tone(0.5));
        assert_relative_eq!(monitor.snapshot().level, 1.0);
    }

    #[test]
    fn smooths_exponentially() {
        let monitor = monitor(0.75, 1.0);
        monitor.ingest(&tone(0.8));
        assert_relative_eq!(monitor.snapshot().level, 0.2, epsilon = 1e-5);
        monitor.ingest(&tone(0.8));
        assert_relative_eq!(monitor.snapshot().level, 0.35, epsilon = 1e-5);
    }

    #[test]
    fn silence_decays_by_the_smoothing_factor() {
        let monitor = monitor(0.75, 18.0);
        for _ in 0..20 {
            monitor.ingest(&tone(0.5));
        }
        let mut previous = monitor.snapshot().level;
        assert!(previous > 0.9);

        for _ in 0..10 {
            assert!(monitor.ingest(&tone(0.0)));
            let level = monitor.snapshot().level;
            assert_relative_eq!(level, previous * 0.75, epsilon = 1e-6);
            previous = level;
        }
        assert!(previous < 0.06);
    }

    #[test]
    fn history_is_bounded_and_ordered() {
        let monitor = AudioLevelMonitor::new(MonitorConfiguration {
            history_capacity: 8,
            smoothing: 0.0,
            gain: 1.0,
            ..Default::default()
        });
        for i in 1..=20 {
            monitor.ingest(&tone(i as f32 / 40.0));
        }
        let history = monitor.snapshot().history;
        assert_eq!(history.len(), 8);
        assert!(history.windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(*history.last().unwrap(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn integer_samples_are_normalized() {
        let monitor = monitor(0.0, 1.0);
        monitor.ingest(&SampleBuffer::audio_i16(MediaTime::ZERO, &[i16::MIN; 8], 44_100.0, 1));
        assert_relative_eq!(monitor.snapshot().level, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn malformed_buffers_are_dropped() {
        let monitor = monitor(0.0, 1.0);
        assert!(!monitor.ingest(&video_frame(0)));

        let truncated = SampleBuffer::new(
            MediaTime::ZERO,
            MediaTime::ZERO,
            Bytes::from_static(&[1, 2, 3]),
            FormatDescriptor::Audio {
                sample_rate: 48_000.0,
                channels: 1,
                encoding: SampleEncoding::Float32,
            },
        );
        assert!(!monitor.ingest(&truncated));
        assert_eq!(monitor.snapshot(), AudioSnapshot::default());
    }

    #[test]
    fn never_nan_or_negative() {
        let monitor = monitor(0.5, 18.0);
        monitor.ingest(&SampleBuffer::audio_f32(MediaTime::ZERO, &[f32::NAN, f32::INFINITY, 0.2], 48_000.0, 1));
        let snapshot = monitor.snapshot();
        assert!(snapshot.level.is_finite() && snapshot.level >= 0.0);
        assert!(snapshot.peak.is_finite() && snapshot.peak >= 0.0);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let monitor = monitor(0.0, 1.0);
        monitor.ingest(&tone(0.5));
        let before = monitor.snapshot();
        monitor.ingest(&tone(0.1));
        assert_eq!(before.history.len(), 1);
        assert_eq!(monitor.snapshot().history.len(), 2);
    }

    #[test]
    fn runs_on_a_channel_and_restarts_cleanly() {
        let source = ManualSource::new();
        let delegate = Arc::new(RecordingDelegate::default());
        let mut monitor = monitor(0.0, 1.0);
        monitor.set_delegate(delegate.clone());

        monitor.start(&source).unwrap();
        source.emit(tone(0.5));
        wait_until(|| monitor.snapshot().history.len() == 1);

        monitor.start(&source).unwrap();
        assert_eq!(source.open_channels(OutputKind::AudioData), 1);
        assert!(monitor.snapshot().history.is_empty());
        source.emit(tone(0.25));
        wait_until(|| monitor.snapshot().history.len() == 1);
        assert_relative_eq!(monitor.snapshot().level, 0.25, epsilon = 1e-5);
        assert!(delegate.level_updates() >= 2);

        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(source.open_channels(OutputKind::AudioData), 0);
    }
}
