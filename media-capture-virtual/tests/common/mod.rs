#![allow(dead_code)]

use std::path::Path;
use std::time::{Duration, Instant};

use media_capture_core::RecordingConfiguration;

/// Poll `condition` until it holds, panicking after a few seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Recording into `dir` with a channel deep enough for bursts of manual frames.
pub fn recording_config(dir: &Path, with_audio: bool) -> RecordingConfiguration {
    let mut config = RecordingConfiguration {
        output_directory: Some(dir.to_path_buf()),
        channel_capacity: 1024,
        ..Default::default()
    };
    config.video.width = 320;
    config.video.height = 180;
    if !with_audio {
        config.audio = None;
    }
    config
}
