//! GhostPush — NVENC push pipeline for GPU-rendered frames
//!
//! Takes frames that already live on the GPU, copies them device-side into a
//! CUDA frame and submits them to NVENC for low-latency streaming. Packet
//! retrieval is left to whoever drains the encoder.
//!
//! # Features
//!
//! - **Device**: CUDA device context and a `BGR0` frame pool sized to the source
//! - **Encode**: H.264 / HEVC through `h264_nvenc` / `hevc_nvenc`, zero-latency tuning
//! - **Push**: one transfer frame reused for every submission, forced IDR on request
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "nvenc")]
//! use ghostpush::hw::cuda::CudaBackend;
//! # #[cfg(feature = "nvenc")]
//! use ghostpush::{EncodePipeline, PixelLayout, Resolution, SourceFrameContext, StreamSettings};
//!
//! # #[cfg(feature = "nvenc")]
//! fn run(slots: Vec<ffmpeg_next::frame::Video>) -> ghostpush::Result<()> {
//!     let settings = StreamSettings::default().with_codec("hevc");
//!     let source = SourceFrameContext::new(Resolution::FHD_1080P, PixelLayout::Bgra);
//!
//!     let backend = CudaBackend::from_settings(&settings)?;
//!     let mut pipeline = EncodePipeline::new(backend, &slots, &source, &settings)?;
//!     pipeline.push_frame(0, true)?;
//!     pipeline.push_frame(1, false)?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod encode;
pub mod error;
pub mod hw;
pub mod pipeline;
pub mod types;

// Re-exports for convenience
pub use config::StreamSettings;
pub use encode::{Codec, EncoderParams, EncoderSession};
pub use error::{Error, Result};
pub use hw::{DeviceManager, FramePoolDesc, HwBackend, TransferTarget};
pub use pipeline::{EncodePipeline, PushStats};
pub use types::{Framerate, PictureType, PixelLayout, Resolution, SourceFrameContext};

/// FFmpeg/CUDA pipeline
#[cfg(feature = "nvenc")]
pub type NvencPipeline = EncodePipeline<hw::cuda::CudaBackend>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if a CUDA device can be opened for NVENC
#[cfg(feature = "nvenc")]
pub fn is_nvenc_available() -> bool {
    hw::cuda::is_available()
}
