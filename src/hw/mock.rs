//! In-memory backend that tracks every handle it hands out

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{FramePoolDesc, HwBackend, TransferTarget};
use crate::encode::{Codec, EncoderParams};
use crate::error::{code, Error, Result};
use crate::types::{PictureType, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Source,
    Device,
    FramePool,
    Frame,
    Encoder,
}

#[derive(Default)]
struct Ledger {
    live: HashMap<Resource, usize>,
    released: Vec<Resource>,
}

/// Shared live-handle counters and release log
#[derive(Clone, Default)]
pub struct Tracker(Arc<Mutex<Ledger>>);

impl Tracker {
    fn acquire(&self, resource: Resource) -> Handle {
        *self.0.lock().live.entry(resource).or_default() += 1;
        Handle {
            resource,
            tracker: self.clone(),
        }
    }

    fn release(&self, resource: Resource) {
        let mut ledger = self.0.lock();
        let count = ledger.live.entry(resource).or_default();
        assert!(*count > 0, "double release of {:?}", resource);
        *count -= 1;
        ledger.released.push(resource);
    }

    pub fn live(&self, resource: Resource) -> usize {
        self.0.lock().live.get(&resource).copied().unwrap_or(0)
    }

    pub fn total_live(&self) -> usize {
        self.0.lock().live.values().sum()
    }

    /// Resources in the order they were released
    pub fn released(&self) -> Vec<Resource> {
        self.0.lock().released.clone()
    }
}

pub struct Handle {
    resource: Resource,
    tracker: Tracker,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.tracker.release(self.resource);
    }
}

/// Renderer-side slot
#[derive(Debug, Clone, Copy)]
pub struct MockSlot(pub usize);

impl MockSlot {
    pub fn many(n: usize) -> Vec<MockSlot> {
        (0..n).map(MockSlot).collect()
    }
}

pub struct MockSource {
    pub slot: usize,
    _handle: Handle,
}

pub struct MockDevice {
    _handle: Handle,
}

pub struct MockPool {
    desc: Option<FramePoolDesc>,
    _handle: Handle,
}

pub struct MockFrame {
    pub picture_type: PictureType,
    pub pts: Option<i64>,
    /// Slot whose content was last transferred in, None after a failed transfer
    pub content: Option<usize>,
    pub resolution: Resolution,
    _handle: Handle,
}

impl TransferTarget for MockFrame {
    fn set_picture_type(&mut self, kind: PictureType) {
        self.picture_type = kind;
    }

    fn set_pts(&mut self, pts: i64) {
        self.pts = Some(pts);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub slot: Option<usize>,
    pub picture_type: PictureType,
    pub pts: Option<i64>,
}

pub struct MockEncoder {
    pub params: EncoderParams,
    pub submitted: Vec<Submitted>,
    _handle: Handle,
}

/// Failure injection knobs; call numbers are 1-based
#[derive(Default)]
pub struct MockBackend {
    pub tracker: Tracker,
    pub fail_adopt_at: Option<usize>,
    pub fail_device: bool,
    pub fail_pool_alloc: bool,
    pub fail_pool_init: bool,
    pub fail_frame_alloc: bool,
    pub missing_encoders: Vec<Codec>,
    pub max_bitrate_bps: Option<u64>,
    pub transfer_failures: Vec<usize>,
    pub submit_failures: Vec<usize>,
    pub(crate) transfer_calls: Cell<usize>,
    pub(crate) submit_calls: Cell<usize>,
}

impl HwBackend for MockBackend {
    type Slot = MockSlot;
    type SourceFrame = MockSource;
    type Device = MockDevice;
    type FramePool = MockPool;
    type Frame = MockFrame;
    type EncoderCodec = Codec;
    type Encoder = MockEncoder;

    fn adopt_source(&self, slot: &MockSlot) -> Result<MockSource> {
        if self.fail_adopt_at == Some(slot.0) {
            return Err(Error::SourceAdoption {
                code: code::ENOMEM,
                hint: format!("slot {}", slot.0),
            });
        }
        Ok(MockSource {
            slot: slot.0,
            _handle: self.tracker.acquire(Resource::Source),
        })
    }

    fn create_device(&self) -> Result<MockDevice> {
        if self.fail_device {
            return Err(Error::DeviceCreation {
                code: code::EINVAL,
                hint: "no CUDA-capable device".into(),
            });
        }
        Ok(MockDevice {
            _handle: self.tracker.acquire(Resource::Device),
        })
    }

    fn alloc_frame_pool(&self, _device: &MockDevice) -> Result<MockPool> {
        if self.fail_pool_alloc {
            return Err(Error::FramePoolAllocation {
                code: code::ENOMEM,
                hint: "descriptor allocation failed".into(),
            });
        }
        Ok(MockPool {
            desc: None,
            _handle: self.tracker.acquire(Resource::FramePool),
        })
    }

    fn init_frame_pool(&self, pool: &mut MockPool, desc: &FramePoolDesc) -> Result<()> {
        if self.fail_pool_init || !desc.resolution.is_valid() {
            return Err(Error::FramePoolInit {
                code: code::ENOMEM,
                hint: "out of device memory".into(),
            });
        }
        pool.desc = Some(*desc);
        Ok(())
    }

    fn alloc_frame(&self, pool: &MockPool) -> Result<MockFrame> {
        let desc = pool.desc.ok_or_else(|| Error::FramePoolAllocation {
            code: code::EINVAL,
            hint: "pool not initialized".into(),
        })?;
        if self.fail_frame_alloc {
            return Err(Error::FramePoolAllocation {
                code: code::ENOMEM,
                hint: "pool exhausted".into(),
            });
        }
        Ok(MockFrame {
            picture_type: PictureType::Auto,
            pts: None,
            content: None,
            resolution: desc.resolution,
            _handle: self.tracker.acquire(Resource::Frame),
        })
    }

    fn find_encoder(&self, codec: Codec) -> Result<Codec> {
        if self.missing_encoders.contains(&codec) {
            return Err(Error::EncoderNotFound {
                code: code::ENCODER_NOT_FOUND,
                hint: codec.encoder_name().into(),
            });
        }
        Ok(codec)
    }

    fn open_encoder(&self, _codec: Codec, params: &EncoderParams) -> Result<MockEncoder> {
        if let Some(max) = self.max_bitrate_bps {
            if params.bitrate_bps > max {
                return Err(Error::EncoderOpen {
                    code: code::EINVAL,
                    hint: "bitrate too high for device".into(),
                });
            }
        }
        Ok(MockEncoder {
            params: params.clone(),
            submitted: Vec::new(),
            _handle: self.tracker.acquire(Resource::Encoder),
        })
    }

    fn transfer(&self, dst: &mut MockFrame, src: &MockSource) -> Result<()> {
        let call = self.transfer_calls.get() + 1;
        self.transfer_calls.set(call);
        if self.transfer_failures.contains(&call) {
            dst.content = None;
            return Err(Error::Transfer {
                code: code::EAGAIN,
                hint: format!("transient failure on call {}", call),
            });
        }
        dst.content = Some(src.slot);
        Ok(())
    }

    fn submit(&self, encoder: &mut MockEncoder, frame: &MockFrame) -> Result<()> {
        let call = self.submit_calls.get() + 1;
        self.submit_calls.set(call);
        if self.submit_failures.contains(&call) {
            return Err(Error::Submission {
                code: code::EAGAIN,
                hint: "encoder queue full".into(),
            });
        }
        encoder.submitted.push(Submitted {
            slot: frame.content,
            picture_type: frame.picture_type,
            pts: frame.pts,
        });
        Ok(())
    }
}
