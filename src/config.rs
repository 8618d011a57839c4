use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::detect::{DetectorMode, HsvBand, Segmenter};
use crate::ingest::CameraConfig;
use crate::runner::LoopPolicy;
use crate::transport::{ControllerEndpoint, WriterConfig, DEFAULT_ENIP_PORT};
use crate::tuning::{
    Tuning, ZoneSpec, DEFAULT_DEADBAND_PX, DEFAULT_HOLD_FRAMES, DEFAULT_HOUGH_THRESHOLD,
    DEFAULT_MIN_RADIUS, DEFAULT_OFF_FRAMES,
};
use crate::SLOT_COUNT;

pub const CONFIG_ENV: &str = "HITZONE_CONFIG";

const DEFAULT_CAMERA_DEVICE: &str = "stub://demo";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 30;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
const DEFAULT_PLC_ADDR: &str = "192.168.1.6";
const DEFAULT_TARGET1_TAG: &str = "Target1_Hit";
const DEFAULT_TARGET2_TAG: &str = "Target2_Hit";
const DEFAULT_RECONNECT_INTERVAL_S: f64 = 2.0;
const DEFAULT_WRITE_RETRY_INTERVAL_S: f64 = 0.25;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
const DEFAULT_IO_TIMEOUT_MS: u64 = 1000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HitzoneConfigFile {
    camera: Option<CameraConfigFile>,
    plc: Option<PlcConfigFile>,
    tuning: Option<TuningConfigFile>,
    targets: Option<Vec<TargetConfigFile>>,
    marker: Option<MarkerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_consecutive_failures: Option<u32>,
    reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PlcConfigFile {
    enabled: Option<bool>,
    addr: Option<String>,
    port: Option<u16>,
    slot: Option<u8>,
    target1_tag: Option<String>,
    target2_tag: Option<String>,
    reconnect_interval_s: Option<f64>,
    write_retry_interval_s: Option<f64>,
    poll_timeout_ms: Option<u64>,
    io_timeout_ms: Option<u64>,
    shutdown_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TuningConfigFile {
    detector_mode: Option<String>,
    min_radius: Option<u32>,
    hough_threshold: Option<u32>,
    deadband_px: Option<f32>,
    stability_frames: Option<u32>,
    off_frames: Option<u32>,
    hold_frames: Option<u32>,
}

/// A target is given either relative (`rel_x`/`rel_y`) or in pixels (`x`/`y`).
#[derive(Debug, Deserialize, Default)]
struct TargetConfigFile {
    rel_x: Option<f32>,
    rel_y: Option<f32>,
    x: Option<u32>,
    y: Option<u32>,
    diameter: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MarkerConfigFile {
    bands: Option<Vec<HsvBand>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HitzoneConfig {
    pub camera: CameraSettings,
    pub plc: PlcSettings,
    pub tuning: Tuning,
    pub marker_bands: [HsvBand; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub max_consecutive_failures: u32,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlcSettings {
    pub enabled: bool,
    pub addr: String,
    pub port: u16,
    pub slot: u8,
    pub target1_tag: String,
    pub target2_tag: String,
    pub reconnect_interval_s: f64,
    pub write_retry_interval_s: f64,
    pub poll_timeout: Duration,
    pub io_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl HitzoneConfig {
    /// Load from `HITZONE_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => HitzoneConfigFile::default(),
        };
        let mut cfg = Self::build(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn build(file: HitzoneConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            max_consecutive_failures: camera_file
                .max_consecutive_failures
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            reconnect_delay: Duration::from_millis(
                camera_file
                    .reconnect_delay_ms
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
        };

        let plc_file = file.plc.unwrap_or_default();
        let plc = PlcSettings {
            enabled: plc_file.enabled.unwrap_or(true),
            addr: plc_file.addr.unwrap_or_else(|| DEFAULT_PLC_ADDR.to_string()),
            port: plc_file.port.unwrap_or(DEFAULT_ENIP_PORT),
            slot: plc_file.slot.unwrap_or(0),
            target1_tag: plc_file
                .target1_tag
                .unwrap_or_else(|| DEFAULT_TARGET1_TAG.to_string()),
            target2_tag: plc_file
                .target2_tag
                .unwrap_or_else(|| DEFAULT_TARGET2_TAG.to_string()),
            reconnect_interval_s: plc_file
                .reconnect_interval_s
                .unwrap_or(DEFAULT_RECONNECT_INTERVAL_S),
            write_retry_interval_s: plc_file
                .write_retry_interval_s
                .unwrap_or(DEFAULT_WRITE_RETRY_INTERVAL_S),
            poll_timeout: Duration::from_millis(
                plc_file.poll_timeout_ms.unwrap_or(DEFAULT_POLL_TIMEOUT_MS),
            ),
            io_timeout: Duration::from_millis(plc_file.io_timeout_ms.unwrap_or(DEFAULT_IO_TIMEOUT_MS)),
            shutdown_timeout: Duration::from_millis(
                plc_file
                    .shutdown_timeout_ms
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            ),
        };

        let tuning = build_tuning(
            file.tuning.unwrap_or_default(),
            file.targets,
            camera.width,
            camera.height,
        )?;

        let marker_bands = match file.marker.and_then(|m| m.bands) {
            None => *Segmenter::red().bands(),
            Some(bands) => {
                let count = bands.len();
                <[HsvBand; 2]>::try_from(bands).map_err(|_| {
                    anyhow!("marker.bands must list exactly 2 HSV bands, got {}", count)
                })?
            }
        };

        Ok(Self {
            camera,
            plc,
            tuning,
            marker_bands,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("HITZONE_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(addr) = std::env::var("HITZONE_PLC_ADDR") {
            if !addr.trim().is_empty() {
                self.plc.addr = addr.trim().to_string();
            }
        }
        if let Ok(slot) = std::env::var("HITZONE_PLC_SLOT") {
            self.plc.slot = slot
                .trim()
                .parse()
                .map_err(|_| anyhow!("HITZONE_PLC_SLOT must be an integer between 0 and 255"))?;
        }
        if let Ok(enabled) = std::env::var("HITZONE_PLC_ENABLED") {
            self.plc.enabled = parse_bool(&enabled)
                .ok_or_else(|| anyhow!("HITZONE_PLC_ENABLED must be true or false"))?;
        }
        if let Ok(mode) = std::env::var("HITZONE_DETECTOR_MODE") {
            if !mode.trim().is_empty() {
                self.tuning.detector_mode = mode.parse().context("HITZONE_DETECTOR_MODE")?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera dimensions must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera.device must not be empty"));
        }
        if !(self.plc.reconnect_interval_s > 0.0) {
            return Err(anyhow!("plc.reconnect_interval_s must be greater than zero"));
        }
        if !(self.plc.write_retry_interval_s >= 0.0) {
            return Err(anyhow!("plc.write_retry_interval_s must not be negative"));
        }
        for (key, timeout) in [
            ("plc.poll_timeout_ms", self.plc.poll_timeout),
            ("plc.io_timeout_ms", self.plc.io_timeout),
            ("plc.shutdown_timeout_ms", self.plc.shutdown_timeout),
        ] {
            if timeout.is_zero() {
                return Err(anyhow!("{} must be greater than zero", key));
            }
        }
        if self.plc.target1_tag.trim().is_empty() || self.plc.target2_tag.trim().is_empty() {
            return Err(anyhow!("plc target tags must not be empty"));
        }
        if self.plc.enabled && self.plc.addr.trim().is_empty() {
            return Err(anyhow!("plc.addr must not be empty when the plc is enabled"));
        }
        if !(self.tuning.deadband_px >= 0.0) {
            return Err(anyhow!("tuning.deadband_px must not be negative"));
        }
        Ok(())
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self.camera.device.clone(),
            width: self.camera.width,
            height: self.camera.height,
            target_fps: self.camera.target_fps,
        }
    }

    pub fn loop_policy(&self) -> LoopPolicy {
        LoopPolicy {
            max_consecutive_failures: self.camera.max_consecutive_failures,
            reconnect_delay: self.camera.reconnect_delay,
            ..LoopPolicy::default()
        }
    }

    pub fn segmenter(&self) -> Segmenter {
        Segmenter::new(self.marker_bands)
    }

    pub fn endpoint(&self) -> Result<ControllerEndpoint> {
        ControllerEndpoint::parse(&self.plc.addr, self.plc.port, self.plc.slot)
    }

    pub fn writer_config(&self) -> Result<WriterConfig> {
        let mut config = WriterConfig::new(
            self.endpoint()?,
            &self.plc.target1_tag,
            &self.plc.target2_tag,
        );
        config.reconnect_interval = Duration::from_secs_f64(self.plc.reconnect_interval_s);
        config.write_retry_interval = Duration::from_secs_f64(self.plc.write_retry_interval_s);
        config.poll_timeout = self.plc.poll_timeout;
        config.shutdown_timeout = self.plc.shutdown_timeout;
        Ok(config)
    }
}

fn build_tuning(
    file: TuningConfigFile,
    targets: Option<Vec<TargetConfigFile>>,
    width: u32,
    height: u32,
) -> Result<Tuning> {
    let mut tuning = Tuning {
        detector_mode: match file.detector_mode.as_deref() {
            Some(mode) => mode.parse().context("tuning.detector_mode")?,
            None => DetectorMode::default(),
        },
        min_radius: file.min_radius.unwrap_or(DEFAULT_MIN_RADIUS),
        hough_threshold: file.hough_threshold.unwrap_or(DEFAULT_HOUGH_THRESHOLD),
        deadband_px: file.deadband_px.unwrap_or(DEFAULT_DEADBAND_PX),
        off_frames: file.off_frames.unwrap_or(DEFAULT_OFF_FRAMES),
        hold_frames: file.hold_frames.unwrap_or(DEFAULT_HOLD_FRAMES),
        ..Tuning::default()
    };
    if let Some(frames) = file.stability_frames {
        tuning = tuning.with_stability_frames(frames);
    }

    if let Some(targets) = targets {
        if targets.len() != SLOT_COUNT {
            return Err(anyhow!(
                "targets must list exactly {} entries, got {}",
                SLOT_COUNT,
                targets.len()
            ));
        }
        for (i, target) in targets.iter().enumerate() {
            tuning.zones[i] = target_zone(i, target, tuning.zones[i], width, height)?;
        }
    }
    Ok(tuning)
}

fn target_zone(
    index: usize,
    target: &TargetConfigFile,
    default: ZoneSpec,
    width: u32,
    height: u32,
) -> Result<ZoneSpec> {
    let diameter = target.diameter.unwrap_or(default.diameter);
    match (target.rel_x, target.rel_y, target.x, target.y) {
        (Some(rel_x), Some(rel_y), None, None) => {
            if !(0.0..=1.0).contains(&rel_x) || !(0.0..=1.0).contains(&rel_y) {
                return Err(anyhow!(
                    "targets[{}]: rel_x/rel_y must be within [0, 1], got ({}, {})",
                    index,
                    rel_x,
                    rel_y
                ));
            }
            Ok(ZoneSpec::new(rel_x, rel_y, diameter))
        }
        (None, None, Some(x), Some(y)) => Ok(ZoneSpec::from_pixels(x, y, diameter, width, height)),
        (None, None, None, None) => Ok(ZoneSpec::new(default.rel_x, default.rel_y, diameter)),
        _ => Err(anyhow!(
            "targets[{}]: give either rel_x and rel_y, or x and y",
            index
        )),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_config_file(path: &Path) -> Result<HitzoneConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Polls a config file's modification time and re-reads its tuning on change.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = modified(&path);
        Self {
            path,
            last_modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The reloaded tuning when the file changed since the last call.
    ///
    /// A file that changed but fails to parse or validate is an error; the
    /// change is still consumed so the same bad edit is reported once.
    pub fn poll(&mut self) -> Result<Option<Tuning>> {
        let current = modified(&self.path);
        if current.is_none() || current == self.last_modified {
            return Ok(None);
        }
        self.last_modified = current;
        let cfg = HitzoneConfig::load_from(Some(&self.path))?;
        Ok(Some(cfg.tuning))
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = HitzoneConfig::build(HitzoneConfigFile::default()).unwrap();
        assert_eq!(cfg.camera.device, "stub://demo");
        assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
        assert_eq!(cfg.plc.port, 44818);
        assert_eq!(cfg.plc.target1_tag, "Target1_Hit");
        assert_eq!(cfg.tuning, Tuning::default());
        assert_eq!(cfg.marker_bands, *Segmenter::red().bands());
    }

    #[test]
    fn stability_frames_override_counters() {
        let file: HitzoneConfigFile =
            serde_json::from_str(r#"{"tuning": {"stability_frames": 5, "off_frames": 9}}"#).unwrap();
        let cfg = HitzoneConfig::build(file).unwrap();
        assert_eq!(cfg.tuning.off_frames, 5);
        assert_eq!(cfg.tuning.hold_frames, 10);
    }

    #[test]
    fn pixel_targets_convert_against_camera_size() {
        let file: HitzoneConfigFile = serde_json::from_str(
            r#"{"camera": {"width": 800, "height": 600},
                "targets": [{"x": 200, "y": 300, "diameter": 3}, {"x": 900, "y": 150}]}"#,
        )
        .unwrap();
        let cfg = HitzoneConfig::build(file).unwrap();
        assert_eq!(cfg.tuning.zones[0].rel_x, 0.25);
        assert_eq!(cfg.tuning.zones[0].rel_y, 0.5);
        assert_eq!(cfg.tuning.zones[0].diameter, 5);
        assert_eq!(cfg.tuning.zones[1].rel_x, 1.0);
        assert_eq!(cfg.tuning.zones[1].diameter, 40);
    }

    #[test]
    fn rejects_bad_targets() {
        let one: HitzoneConfigFile =
            serde_json::from_str(r#"{"targets": [{"rel_x": 0.5, "rel_y": 0.5}]}"#).unwrap();
        assert!(HitzoneConfig::build(one).is_err());

        let outside: HitzoneConfigFile = serde_json::from_str(
            r#"{"targets": [{"rel_x": 1.5, "rel_y": 0.5}, {"rel_x": 0.5, "rel_y": 0.5}]}"#,
        )
        .unwrap();
        assert!(HitzoneConfig::build(outside).is_err());

        let mixed: HitzoneConfigFile = serde_json::from_str(
            r#"{"targets": [{"rel_x": 0.5, "y": 10}, {"rel_x": 0.5, "rel_y": 0.5}]}"#,
        )
        .unwrap();
        assert!(HitzoneConfig::build(mixed).is_err());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
