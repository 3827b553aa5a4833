//! Encoder session
//!
//! Resolves the NVENC implementation for a codec, builds its fixed low-latency
//! parameter block and opens it through the hardware backend.

use std::str::FromStr;

use crate::clock;
use crate::config::StreamSettings;
use crate::error::{code, Error, Result};
use crate::hw::HwBackend;
use crate::types::{Framerate, PixelLayout, Resolution, ENCODER_INPUT_LAYOUT};

/// Keyframe interval in frames
pub const GOP_SIZE: u32 = 30;
/// B-frames add reordering delay, so they stay off
pub const MAX_B_FRAMES: u32 = 0;

/// Supported video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Codec {
    /// H.264/AVC
    #[default]
    H264,
    /// H.265/HEVC
    Hevc,
}

/// NVENC private options for the lowest-latency, speed-first profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyProfile {
    /// `p1` (fastest) .. `p7` (slowest)
    pub preset: &'static str,
    pub tune: &'static str,
    pub zero_latency: bool,
    /// Output delay in frames
    pub delay: u32,
}

impl LatencyProfile {
    pub const H264: Self = Self {
        preset: "p1",
        tune: "ull",
        zero_latency: true,
        delay: 0,
    };

    pub const HEVC: Self = Self {
        preset: "p1",
        tune: "ull",
        zero_latency: true,
        delay: 0,
    };

    /// Key/value pairs as passed to the encoder on open
    pub fn options(&self) -> Vec<(&'static str, String)> {
        vec![
            ("preset", self.preset.to_string()),
            ("tune", self.tune.to_string()),
            ("zerolatency", u8::from(self.zero_latency).to_string()),
            ("delay", self.delay.to_string()),
        ]
    }
}

impl Codec {
    pub const ALL: [Codec; 2] = [Codec::H264, Codec::Hevc];

    /// FFmpeg encoder name for NVENC
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Codec::H264 => "h264_nvenc",
            Codec::Hevc => "hevc_nvenc",
        }
    }

    /// Get human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Codec::H264 => "H.264 (AVC)",
            Codec::Hevc => "H.265 (HEVC)",
        }
    }

    pub fn latency_profile(&self) -> LatencyProfile {
        match self {
            Codec::H264 => LatencyProfile::H264,
            Codec::Hevc => LatencyProfile::HEVC,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Codec::H264),
            "hevc" | "h265" => Ok(Codec::Hevc),
            other => Err(Error::UnsupportedCodec {
                code: code::EINVAL,
                hint: format!("invalid codec {:?}", other),
            }),
        }
    }
}

impl TryFrom<u32> for Codec {
    type Error = Error;

    /// Numeric selector: 0 = H.264, 1 = HEVC
    fn try_from(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Codec::H264),
            1 => Ok(Codec::Hevc),
            other => Err(Error::UnsupportedCodec {
                code: code::EINVAL,
                hint: format!("invalid codec {}", other),
            }),
        }
    }
}

/// Fully resolved encoder parameter block
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParams {
    pub codec: Codec,
    pub resolution: Resolution,
    pub framerate: Framerate,
    /// Target bitrate in bits/sec
    pub bitrate_bps: u64,
    pub pixel_layout: PixelLayout,
    pub latency: LatencyProfile,
    /// Sample aspect ratio (num, den)
    pub aspect_ratio: (i32, i32),
    pub max_b_frames: u32,
    pub gop_size: u32,
    /// Matches the presentation clock so PTS are raw ticks
    pub time_base: (i32, i32),
}

impl EncoderParams {
    pub fn new(codec: Codec, settings: &StreamSettings) -> Self {
        Self {
            codec,
            resolution: settings.resolution(),
            framerate: settings.framerate(),
            bitrate_bps: settings.bitrate_bps(),
            pixel_layout: ENCODER_INPUT_LAYOUT,
            latency: codec.latency_profile(),
            aspect_ratio: (1, 1),
            max_b_frames: MAX_B_FRAMES,
            gop_size: GOP_SIZE,
            time_base: clock::TIME_BASE,
        }
    }

    /// Parse the codec selector and build the parameter block
    pub fn from_settings(settings: &StreamSettings) -> Result<Self> {
        settings.validate()?;
        let codec = settings.codec.parse()?;
        Ok(Self::new(codec, settings))
    }

    pub fn options(&self) -> Vec<(&'static str, String)> {
        self.latency.options()
    }
}

/// An opened hardware encoder and the parameters it was opened with
pub struct EncoderSession<B: HwBackend> {
    params: EncoderParams,
    encoder: B::Encoder,
}

impl<B: HwBackend> EncoderSession<B> {
    /// Resolve, configure and open the encoder described by `settings`.
    ///
    /// Nothing is held on failure: the resolved codec handle and any
    /// half-configured context are dropped before the error returns.
    pub fn open(backend: &B, settings: &StreamSettings) -> Result<Self> {
        let params = EncoderParams::from_settings(settings)?;
        let codec = backend.find_encoder(params.codec)?;
        let encoder = backend.open_encoder(codec, &params)?;

        tracing::debug!(
            "NVENC encoder opened: {} {} @ {} {}kbps (gop {}, b-frames {})",
            params.codec,
            params.resolution,
            params.framerate,
            params.bitrate_bps / 1000,
            params.gop_size,
            params.max_b_frames
        );

        Ok(Self { params, encoder })
    }

    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    pub fn codec(&self) -> Codec {
        self.params.codec
    }

    pub fn encoder(&self) -> &B::Encoder {
        &self.encoder
    }

    pub(crate) fn encoder_mut(&mut self) -> &mut B::Encoder {
        &mut self.encoder
    }
}
