//! hitzoned - hit-zone detection daemon
//!
//! This daemon:
//! 1. Captures frames from the configured camera (or the synthetic stub)
//! 2. Segments and detects colored circular markers
//! 3. Tracks them in two slots and debounces per-zone hits
//! 4. Pushes the debounced pair to the controller from a writer thread
//! 5. Re-reads tuning from the config file when it changes

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hitzone::{
    CameraSource, ConfigWatcher, DetectorMode, EnipLink, FrameLoop, HitOutput, HitzoneConfig,
    PipelineState, PlcWriter, SystemClock, TuningStore,
};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(author, version, about = "Track colored markers and report target-zone hits to a PLC")]
struct Args {
    /// Config file (JSON, or TOML when the extension is .toml).
    #[arg(long, env = "HITZONE_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device path or stub://<name>. Overrides the config file.
    #[arg(long)]
    device: Option<String>,

    /// Run without the controller writer.
    #[arg(long)]
    no_plc: bool,

    /// Detector mode: fast or robust. Overrides the config file.
    #[arg(long)]
    mode: Option<DetectorMode>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = HitzoneConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if let Some(mode) = args.mode {
        cfg.tuning.detector_mode = mode;
    }
    if args.no_plc {
        cfg.plc.enabled = false;
    }

    log::info!(
        "hitzoned {} starting: camera={} {}x{}@{} mode={} plc={}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.device,
        cfg.camera.width,
        cfg.camera.height,
        cfg.camera.target_fps,
        cfg.tuning.detector_mode,
        if cfg.plc.enabled {
            format!("{}:{} slot {}", cfg.plc.addr, cfg.plc.port, cfg.plc.slot)
        } else {
            "disabled".to_string()
        }
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let mut output = if cfg.plc.enabled {
        let link = EnipLink::new(cfg.plc.io_timeout);
        let writer = PlcWriter::spawn(cfg.writer_config()?, Box::new(link), Arc::new(SystemClock))?;
        HitOutput::Plc(writer)
    } else {
        log::warn!("plc output disabled; hits are only logged");
        HitOutput::Disabled
    };

    let store = TuningStore::new(cfg.tuning.clone());
    let watcher = args
        .config
        .clone()
        .map(|path| spawn_config_watcher(path, store.clone(), stop.clone(), args.mode))
        .transpose()?;

    let source = CameraSource::new(cfg.camera_config())?;
    let mut frame_loop = FrameLoop::new(
        source,
        PipelineState::new(cfg.segmenter()),
        store,
        cfg.loop_policy(),
        stop.clone(),
    );
    frame_loop.run(&output, |_| {});

    log::info!("shutdown signal received, stopping writer...");
    output.shutdown();
    if let Some(handle) = watcher {
        if handle.join().is_err() {
            log::error!("config watcher thread panicked");
        }
    }
    Ok(())
}

/// Push tuning edits from the config file into the store until stopped.
///
/// A `--mode` given on the command line keeps winning over the file.
fn spawn_config_watcher(
    path: PathBuf,
    store: TuningStore,
    stop: Arc<AtomicBool>,
    mode_override: Option<DetectorMode>,
) -> Result<JoinHandle<()>> {
    let mut watcher = ConfigWatcher::new(path);
    let handle = std::thread::Builder::new()
        .name("config-watcher".to_string())
        .spawn(move || {
            let mut last_poll = Instant::now();
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
                if last_poll.elapsed() < CONFIG_POLL_INTERVAL {
                    continue;
                }
                last_poll = Instant::now();
                match watcher.poll() {
                    Ok(Some(mut tuning)) => {
                        if let Some(mode) = mode_override {
                            tuning.detector_mode = mode;
                        }
                        log::info!(
                            "reloaded tuning from {} (mode={} min_radius={} deadband={})",
                            watcher.path().display(),
                            tuning.detector_mode,
                            tuning.min_radius,
                            tuning.deadband_px
                        );
                        store.replace(tuning);
                    }
                    Ok(None) => {}
                    Err(err) => log::warn!(
                        "ignoring invalid config change in {}: {:#}",
                        watcher.path().display(),
                        err
                    ),
                }
            }
        })?;
    Ok(handle)
}
