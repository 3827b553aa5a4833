//! Stream settings
//!
//! Read once at pipeline construction; nothing here is revisited per frame.

use crate::error::{Error, Result};
use crate::types::{Framerate, Resolution};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Encoder-facing settings supplied by the host application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Codec selector ("h264", "hevc"/"h265")
    pub codec: String,
    /// Render width in pixels
    pub width: u32,
    /// Render height in pixels
    pub height: u32,
    /// Target refresh rate in frames per second
    pub refresh_rate: u32,
    /// Target bitrate in Mbps
    pub bitrate_mbps: u32,
    /// CUDA device ordinal (None = driver default)
    pub device: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            codec: "h264".to_string(),
            width: 1920,
            height: 1080,
            refresh_rate: 90,
            bitrate_mbps: 30,
            device: None,
        }
    }
}

impl StreamSettings {
    /// Parse settings from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Reject zero dimensions, rate or bitrate
    pub fn validate(&self) -> Result<()> {
        if !self.resolution().is_valid() {
            return Err(Error::InvalidSettings(format!(
                "resolution must be positive, got {}",
                self.resolution()
            )));
        }
        if self.refresh_rate == 0 {
            return Err(Error::InvalidSettings("refresh rate must be positive".into()));
        }
        if self.bitrate_mbps == 0 {
            return Err(Error::InvalidSettings("bitrate must be positive".into()));
        }
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn framerate(&self) -> Framerate {
        Framerate::new(self.refresh_rate, 1)
    }

    /// Target bitrate in bits per second
    pub fn bitrate_bps(&self) -> u64 {
        self.bitrate_mbps as u64 * 1_000_000
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_refresh_rate(mut self, fps: u32) -> Self {
        self.refresh_rate = fps;
        self
    }

    pub fn with_bitrate_mbps(mut self, mbps: u32) -> Self {
        self.bitrate_mbps = mbps;
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }
}
