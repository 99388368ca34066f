mod common;

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;

use media_capture_core::{
    read_container_chunks, read_container_summary, ContainerWriterFactory, ManualClock, MediaKind, MediaTime, Recorder,
    RecordingPhase,
};
use media_capture_virtual::{VirtualHardwareConfig, VirtualHardwareControl, VirtualRig};

use common::{recording_config, wait_until};

const FRAME: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// Emit `count` frames, moving the clock one frame period per frame.
fn play(control: &VirtualHardwareControl, clock: &ManualClock, count: usize) {
    for _ in 0..count {
        assert_eq!(control.emit_video_frames(1), 1);
        clock.advance(FRAME);
    }
}

fn rig() -> VirtualRig {
    let rig = VirtualRig::new(VirtualHardwareConfig::manual());
    rig.wire_defaults().unwrap();
    rig.session.start().unwrap();
    rig
}

#[test]
fn five_seconds_of_video_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig();
    let clock = Arc::new(ManualClock::new());
    let mut recorder = Recorder::new(Arc::new(ContainerWriterFactory), clock.clone());

    recorder.start_recording(&rig.session, &recording_config(dir.path(), false)).unwrap();
    play(&rig.control, &clock, 150);
    wait_until(|| recorder.samples_written() == 150);
    let result = recorder.stop_recording().unwrap();

    assert_relative_eq!(result.duration_secs, 5.0, epsilon = 0.1);
    assert_relative_eq!(result.media_duration_secs, 5.0, epsilon = 0.1);
    assert!(result.file_path.exists());
    assert!(result.file_path.starts_with(dir.path()));
    assert!(std::fs::metadata(&result.file_path).unwrap().len() > 0);
    assert_eq!(result.checksum.len(), 64);

    let summary = read_container_summary(&result.file_path).unwrap();
    assert_eq!(summary.sample_count, 150);
    assert_eq!(summary.tracks.video.width, 320);
    assert!(summary.tracks.audio.is_none());
    assert_eq!(recorder.phase(), RecordingPhase::Stopped);
}

#[test]
fn pause_and_resume_cut_the_gap() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig();
    let clock = Arc::new(ManualClock::new());
    let mut recorder = Recorder::new(Arc::new(ContainerWriterFactory), clock.clone());

    recorder.start_recording(&rig.session, &recording_config(dir.path(), false)).unwrap();
    play(&rig.control, &clock, 60);
    wait_until(|| recorder.samples_written() == 60);

    recorder.pause().unwrap();
    play(&rig.control, &clock, 60);
    wait_until(|| recorder.samples_discarded() == 60);
    recorder.resume().unwrap();

    play(&rig.control, &clock, 30);
    wait_until(|| recorder.samples_written() == 90);
    let result = recorder.stop_recording().unwrap();

    assert_relative_eq!(result.duration_secs, 3.0, epsilon = 0.1);
    assert_relative_eq!(result.media_duration_secs, 3.0, epsilon = 0.1);

    let chunks = read_container_chunks(&result.file_path).unwrap();
    assert_eq!(chunks.len(), 90);
    assert!(chunks.windows(2).all(|w| w[0].pts < w[1].pts));
    let gap = chunks[60].pts - chunks[59].pts;
    assert!(gap < MediaTime::from_secs_f64(0.05), "pause left a gap of {:?}", gap);
}

#[test]
fn audio_and_video_share_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig();
    let mut recorder = Recorder::default();

    recorder.start_recording(&rig.session, &recording_config(dir.path(), true)).unwrap();
    for _ in 0..10 {
        rig.control.emit_video_frames(1);
        rig.control.emit_audio_chunks(3);
    }
    wait_until(|| recorder.samples_written() == 40);
    let result = recorder.stop_recording().unwrap();

    assert_eq!(result.metadata.track(MediaKind::Video).unwrap().samples_written, 10);
    assert_eq!(result.metadata.track(MediaKind::Audio).unwrap().samples_written, 30);
    let chunks = read_container_chunks(&result.file_path).unwrap();
    assert_eq!(chunks.iter().filter(|c| c.kind == MediaKind::Audio).count(), 30);
}

#[test]
fn stop_twice_and_restart() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig();
    let mut recorder = Recorder::default();
    let config = recording_config(dir.path(), false);

    recorder.start_recording(&rig.session, &config).unwrap();
    rig.control.emit_video_frames(5);
    let first = recorder.stop_recording().unwrap();
    assert!(recorder.stop_recording().is_err());

    let config = media_capture_core::RecordingConfiguration {
        file_prefix: "Second".into(),
        ..config
    };
    recorder.start_recording(&rig.session, &config).unwrap();
    rig.control.emit_video_frames(5);
    let second = recorder.stop_recording().unwrap();
    assert_ne!(first.file_path, second.file_path);
    assert_ne!(first.metadata.id, second.metadata.id);
}

#[test]
fn session_stop_finalizes_the_recording() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig();
    let mut recorder = Recorder::default();

    recorder.start_recording(&rig.session, &recording_config(dir.path(), true)).unwrap();
    rig.control.emit_video_frames(10);
    wait_until(|| recorder.samples_written() == 10);
    rig.session.stop().unwrap();

    wait_until(|| recorder.phase() == RecordingPhase::Stopped);
    let summary = read_container_summary(&recorder.status().output_path.unwrap()).unwrap();
    assert_eq!(summary.sample_count, 10);
}
