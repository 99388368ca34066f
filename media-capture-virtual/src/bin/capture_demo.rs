//! Records from virtual devices and prints the result as JSON.
//!
//! ```text
//! capture-demo --list-devices
//! capture-demo --seconds 5 --swap-after 2 --pause-at 3 --pause-for 1
//! capture-demo --screen --seconds 2 --output /tmp/screen.mckf
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;

use media_capture_core::{
    AudioLevelMonitor, CaptureTarget, MediaKind, MonitorConfiguration, Recorder, RecordingConfiguration,
    ScreenCaptureAdapter, ScreenCaptureConfiguration, VideoTrackSettings,
};
use media_capture_virtual::{Timing, VirtualHardwareConfig, VirtualPermissions, VirtualRig, VirtualScreenBackend};

#[derive(Parser, Debug)]
#[command(name = "capture-demo", about = "Record from virtual capture devices")]
struct Args {
    /// Print the virtual devices and screen content, then exit.
    #[arg(long)]
    list_devices: bool,

    /// Recording length in seconds of wall time.
    #[arg(long, default_value_t = 3.0)]
    seconds: f64,

    /// Output file. Defaults to a date-stamped file in --output-dir.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Record video only.
    #[arg(long)]
    no_audio: bool,

    /// Swap to the second camera after this many seconds.
    #[arg(long)]
    swap_after: Option<f64>,

    /// Pause the recording at this many seconds.
    #[arg(long)]
    pause_at: Option<f64>,

    /// How long the pause lasts.
    #[arg(long, default_value_t = 1.0)]
    pause_for: f64,

    /// Record the virtual display instead of the camera.
    #[arg(long)]
    screen: bool,

    #[arg(long, default_value_t = 30)]
    frame_rate: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.seconds <= 0.0 {
        bail!("--seconds must be positive");
    }

    if args.list_devices {
        return list_devices();
    }
    if args.screen {
        record_screen(&args)
    } else {
        record_camera(&args)
    }
}

fn list_devices() -> Result<()> {
    let rig = VirtualRig::new(VirtualHardwareConfig::manual());
    let registry = rig.session.registry();
    let content = VirtualScreenBackend::default_content();
    let listing = json!({
        "video": registry.list_video_devices()?,
        "audio": registry.list_audio_devices()?,
        "displays": content.displays,
        "windows": content.capturable_windows().collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn recording_config(args: &Args, video: VideoTrackSettings, audio: bool) -> RecordingConfiguration {
    let mut config = RecordingConfiguration {
        output_path: args.output.clone(),
        output_directory: args.output_dir.clone(),
        video,
        ..Default::default()
    };
    if !audio {
        config.audio = None;
    }
    config
}

fn record_camera(args: &Args) -> Result<()> {
    let hardware = VirtualHardwareConfig {
        frame_rate: args.frame_rate,
        ..Default::default()
    };
    let rig = VirtualRig::new(hardware.clone());
    rig.wire_defaults().context("wiring default devices")?;
    rig.session.start().context("starting capture session")?;

    let mut monitor = AudioLevelMonitor::new(MonitorConfiguration::default());
    if !args.no_audio {
        monitor.start(&rig.session)?;
    }

    let video = VideoTrackSettings {
        width: hardware.width,
        height: hardware.height,
        frame_rate: hardware.frame_rate,
        ..Default::default()
    };
    let config = recording_config(args, video, !args.no_audio);
    let mut recorder = Recorder::default();
    recorder.start_recording(&rig.session, &config)?;

    let swap_to = rig.session.registry().list_video_devices()?.into_iter().find(|d| !d.is_default);
    let mut swapped = false;
    run_for(args, &recorder, |elapsed| {
        if let (Some(at), Some(camera), false) = (args.swap_after, &swap_to, swapped) {
            if elapsed >= at {
                swapped = true;
                match rig.session.swap_input(MediaKind::Video, camera) {
                    Ok(()) => log::info!("swapped to {}", camera.display_name),
                    Err(e) => log::warn!("swap failed: {}", e),
                }
            }
        }
        if monitor.is_running() {
            log::debug!("level {:.2}", monitor.snapshot().level);
        }
    })?;

    let result = recorder.stop_recording()?;
    monitor.stop();
    rig.session.stop()?;
    rig.session.teardown()?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn record_screen(args: &Args) -> Result<()> {
    let (backend, _) = VirtualScreenBackend::new(VirtualScreenBackend::default_content(), Timing::RealTime);
    let adapter = ScreenCaptureAdapter::new(Box::new(backend), Arc::new(VirtualPermissions::new()));
    let screen = ScreenCaptureConfiguration {
        frame_rate: args.frame_rate,
        scale_factor: 0.25,
        captures_audio: !args.no_audio,
        ..ScreenCaptureConfiguration::new(CaptureTarget::Display { display_id: 1 })
    };
    let capture = adapter.start(&screen)?;

    let video = VideoTrackSettings {
        width: capture.width,
        height: capture.height,
        frame_rate: args.frame_rate,
        ..Default::default()
    };
    let config = recording_config(args, video, !args.no_audio);
    let mut recorder = Recorder::default();
    recorder.start_recording(&adapter, &config)?;
    run_for(args, &recorder, |_| {})?;

    let result = recorder.stop_recording()?;
    adapter.stop()?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Let the recording run for `args.seconds`, handling the optional pause.
fn run_for(args: &Args, recorder: &Recorder, mut tick: impl FnMut(f64)) -> Result<()> {
    let started = Instant::now();
    let mut paused_at: Option<f64> = None;
    let mut pause_done = false;
    loop {
        let elapsed = started.elapsed().as_secs_f64();
        if elapsed >= args.seconds {
            break;
        }
        if let (Some(at), None, false) = (args.pause_at, paused_at, pause_done) {
            if elapsed >= at {
                recorder.pause()?;
                paused_at = Some(elapsed);
            }
        }
        if let Some(since) = paused_at {
            if elapsed - since >= args.pause_for {
                recorder.resume()?;
                paused_at = None;
                pause_done = true;
            }
        }
        tick(elapsed);
        thread::sleep(Duration::from_millis(50));
    }
    log::info!("recorded {:.2}s of active time", recorder.duration());
    Ok(())
}
