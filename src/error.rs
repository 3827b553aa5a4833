//! Error types for GhostPush

use thiserror::Error;

/// Result type alias for GhostPush operations
pub type Result<T> = std::result::Result<T, Error>;

/// AVERROR-style codes used when the failing layer reports no code of its own.
///
/// Values follow FFmpeg's convention: negated POSIX errno or a negated tag.
pub mod code {
    const fn tag(a: u8, b: u8, c: u8, d: u8) -> i32 {
        (a as i32) | ((b as i32) << 8) | ((c as i32) << 16) | ((d as i32) << 24)
    }

    /// `AVERROR(EAGAIN)`
    pub const EAGAIN: i32 = -11;
    /// `AVERROR(ENOMEM)`
    pub const ENOMEM: i32 = -12;
    /// `AVERROR(EINVAL)`
    pub const EINVAL: i32 = -22;
    /// `AVERROR_ENCODER_NOT_FOUND`
    pub const ENCODER_NOT_FOUND: i32 = -tag(0xF8, b'E', b'N', b'C');
}

/// GhostPush error type
#[derive(Error, Debug)]
pub enum Error {
    // Device / frame pool errors
    #[error("Failed to create hardware device: {hint} (code {code})")]
    DeviceCreation { code: i32, hint: String },

    #[error("Failed to allocate hardware frame pool: {hint} (code {code})")]
    FramePoolAllocation { code: i32, hint: String },

    #[error("Failed to initialize hardware frame pool: {hint} (code {code})")]
    FramePoolInit { code: i32, hint: String },

    #[error("Failed to reference source frame: {hint} (code {code})")]
    SourceAdoption { code: i32, hint: String },

    #[error("No source frame slots supplied")]
    NoSourceFrames,

    // Encoder errors
    #[error("Unsupported codec: {hint} (code {code})")]
    UnsupportedCodec { code: i32, hint: String },

    #[error("Encoder not found: {hint} (code {code})")]
    EncoderNotFound { code: i32, hint: String },

    #[error("Cannot open video encoder: {hint} (code {code})")]
    EncoderOpen { code: i32, hint: String },

    // Per-frame errors
    #[error("Hardware frame transfer failed: {hint} (code {code})")]
    Transfer { code: i32, hint: String },

    #[error("Frame submission failed: {hint} (code {code})")]
    Submission { code: i32, hint: String },

    // Settings errors
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Numeric failure code from the hardware/driver layer, if any
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::DeviceCreation { code, .. }
            | Error::FramePoolAllocation { code, .. }
            | Error::FramePoolInit { code, .. }
            | Error::SourceAdoption { code, .. }
            | Error::UnsupportedCodec { code, .. }
            | Error::EncoderNotFound { code, .. }
            | Error::EncoderOpen { code, .. }
            | Error::Transfer { code, .. }
            | Error::Submission { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Per-frame errors leave the pipeline usable; the caller may push again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Transfer { .. } | Error::Submission { .. })
    }

    /// Check if this is a hardware/driver issue
    pub fn is_hardware_issue(&self) -> bool {
        matches!(
            self,
            Error::DeviceCreation { .. }
                | Error::FramePoolInit { .. }
                | Error::EncoderNotFound { .. }
                | Error::EncoderOpen { .. }
        )
    }
}
