//! Hardware device and frame-pool management
//!
//! The core never talks to a driver directly. Everything device-specific sits
//! behind [`HwBackend`], whose handle types own their native resource and
//! release it on drop. [`DeviceManager`] builds the device context and the
//! transfer frame pool on top of that contract.

#[cfg(feature = "nvenc")]
pub mod cuda;
#[cfg(test)]
pub(crate) mod mock;

use crate::encode::{Codec, EncoderParams};
use crate::error::{code, Error, Result};
use crate::types::{PictureType, PixelLayout, Resolution, SourceFrameContext, ENCODER_INPUT_LAYOUT};

/// A hardware frame that can be tagged before submission
pub trait TransferTarget {
    fn set_picture_type(&mut self, kind: PictureType);
    fn set_pts(&mut self, pts: i64);
}

/// Hardware capability collaborator
///
/// Each associated handle type is exclusively owned and releases its native
/// resource when dropped, so any early return during construction rolls back
/// whatever was acquired so far.
pub trait HwBackend {
    /// Frame handle as exposed by the rendering surface
    type Slot;
    /// Slot referenced into this backend's frame domain
    type SourceFrame;
    /// Device context
    type Device;
    /// Frame pool descriptor
    type FramePool;
    /// Hardware frame drawn from the pool
    type Frame: TransferTarget;
    /// Resolved encoder implementation
    type EncoderCodec;
    /// Opened encoder
    type Encoder;

    fn adopt_source(&self, slot: &Self::Slot) -> Result<Self::SourceFrame>;

    /// Fails with [`Error::DeviceCreation`]
    fn create_device(&self) -> Result<Self::Device>;

    /// Fails with [`Error::FramePoolAllocation`]
    fn alloc_frame_pool(&self, device: &Self::Device) -> Result<Self::FramePool>;

    /// Fails with [`Error::FramePoolInit`]; the pool is left for the caller to drop
    fn init_frame_pool(&self, pool: &mut Self::FramePool, desc: &FramePoolDesc) -> Result<()>;

    fn alloc_frame(&self, pool: &Self::FramePool) -> Result<Self::Frame>;

    /// Fails with [`Error::EncoderNotFound`]
    fn find_encoder(&self, codec: Codec) -> Result<Self::EncoderCodec>;

    /// Fails with [`Error::EncoderOpen`]
    fn open_encoder(&self, codec: Self::EncoderCodec, params: &EncoderParams) -> Result<Self::Encoder>;

    /// Device-side copy of `src` into `dst`. Fails with [`Error::Transfer`]
    fn transfer(&self, dst: &mut Self::Frame, src: &Self::SourceFrame) -> Result<()>;

    /// Queue `frame` on the encoder. Fails with [`Error::Submission`]
    fn submit(&self, encoder: &mut Self::Encoder, frame: &Self::Frame) -> Result<()>;
}

/// Frame pool negotiated between the source frames and the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePoolDesc {
    pub resolution: Resolution,
    /// Software-visible layout of the pooled frames
    pub sw_layout: PixelLayout,
}

impl FramePoolDesc {
    /// Source dimensions, encoder layout. Alpha is dropped without checking
    /// whether the source actually uses it.
    pub fn for_source(source: &SourceFrameContext) -> Self {
        Self {
            resolution: source.resolution,
            sw_layout: ENCODER_INPUT_LAYOUT,
        }
    }
}

/// Owns the device context, the adapted source frames and, until the transfer
/// frame is drawn, the frame pool.
///
/// Fields drop in declaration order: source frames, pool, device.
pub struct DeviceManager<B: HwBackend> {
    sources: Vec<B::SourceFrame>,
    pool: Option<B::FramePool>,
    device: B::Device,
    pool_desc: FramePoolDesc,
}

impl<B: HwBackend> DeviceManager<B> {
    /// Adapt every slot, open the device and initialize the frame pool
    pub fn new(backend: &B, slots: &[B::Slot], source: &SourceFrameContext) -> Result<Self> {
        if slots.is_empty() {
            return Err(Error::NoSourceFrames);
        }

        let sources = slots
            .iter()
            .map(|slot| backend.adopt_source(slot))
            .collect::<Result<Vec<_>>>()?;

        let device = backend.create_device()?;
        tracing::debug!("Hardware device context created");

        let pool_desc = FramePoolDesc::for_source(source);
        if source.layout != pool_desc.sw_layout {
            tracing::debug!(
                "Source layout {:?} substituted with {:?}, alpha ignored",
                source.layout,
                pool_desc.sw_layout
            );
        }

        let mut pool = backend.alloc_frame_pool(&device)?;
        backend.init_frame_pool(&mut pool, &pool_desc)?;
        tracing::debug!(
            "Frame pool initialized: {} {:?}",
            pool_desc.resolution,
            pool_desc.sw_layout
        );

        Ok(Self {
            sources,
            pool: Some(pool),
            device,
            pool_desc,
        })
    }

    /// Draw the single persistent transfer frame. The pool descriptor is
    /// released afterwards, so this succeeds at most once.
    pub fn draw_transfer_frame(&mut self, backend: &B) -> Result<B::Frame> {
        let pool = self.pool.take().ok_or_else(|| Error::FramePoolAllocation {
            code: code::EINVAL,
            hint: "transfer frame already drawn".into(),
        })?;
        let frame = backend.alloc_frame(&pool)?;
        tracing::debug!("Transfer frame allocated, frame pool released");
        Ok(frame)
    }

    /// Adapted source frame for `index`
    ///
    /// # Panics
    ///
    /// If `index` is not below [`source_count`](Self::source_count).
    pub fn source(&self, index: usize) -> &B::SourceFrame {
        &self.sources[index]
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn pool_desc(&self) -> &FramePoolDesc {
        &self.pool_desc
    }

    /// Whether the pool is still held (transfer frame not drawn yet)
    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }
}
