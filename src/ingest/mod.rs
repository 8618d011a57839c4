//! Frame ingestion sources.
//!
//! - Synthetic source (`stub://...`): two red markers moving through the
//!   default target zones, for demos and tests.
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source yields owned RGB [`Frame`]s. A failed read is reported as an
//! error for that cycle only; the frame loop decides when to reconnect.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

pub const STUB_PREFIX: &str = "stub://";

/// A source of camera frames.
pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
    pub width: u32,
    pub height: u32,
}

/// Camera selection and requested capture format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Device path (e.g. "/dev/video0") or a `stub://` name.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Requested frame rate. 0 lets the source run unpaced.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://demo".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Camera frame source chosen from the configured device string.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with(STUB_PREFIX) {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        Self::device(config)
    }

    #[cfg(feature = "ingest-v4l2")]
    fn device(config: CameraConfig) -> Result<Self> {
        Ok(Self {
            backend: CameraBackend::Device(V4l2Source::new(config)?),
        })
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn device(config: CameraConfig) -> Result<Self> {
        Err(anyhow!(
            "camera device {} requires the ingest-v4l2 feature (use stub://<name> for the synthetic source)",
            config.device
        ))
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.backend, CameraBackend::Synthetic(_))
    }

    /// Change the capture resolution. Takes effect on the next frame.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(anyhow!("invalid resolution {}x{}", width, height));
        }
        match &mut self.backend {
            CameraBackend::Synthetic(source) => {
                source.set_resolution(width, height);
                Ok(())
            }
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.set_resolution(width, height),
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 0,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn stub_device_selects_synthetic_backend() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        assert!(source.is_synthetic());
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn resolution_change_applies_to_next_frame() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.connect()?;
        source.next_frame()?;
        source.set_resolution(320, 240)?;
        let frame = source.next_frame()?;
        assert_eq!(frame.dimensions(), (320, 240));
        assert!(source.set_resolution(0, 240).is_err());
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_path_without_feature_is_rejected() {
        let config = CameraConfig {
            device: "/dev/video0".to_string(),
            ..CameraConfig::default()
        };
        assert!(CameraSource::new(config).is_err());
    }
}
