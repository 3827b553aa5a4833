//! Encode pipeline
//!
//! Connects rendered frame slots → hardware transfer frame → encoder.
//!
//! Construction either yields a fully wired pipeline or releases everything it
//! acquired. Each [`EncodePipeline::push_frame`] moves exactly one frame through
//! transfer, tag and submit; encoded packets are drained elsewhere.

use std::time::Instant;

use crate::clock;
use crate::config::StreamSettings;
use crate::encode::{Codec, EncoderParams, EncoderSession};
use crate::error::Result;
use crate::hw::{DeviceManager, HwBackend, TransferTarget};
use crate::types::{PictureType, SourceFrameContext};

/// Per-pipeline counters
#[derive(Debug, Clone, Default)]
pub struct PushStats {
    /// Completed device transfers
    pub transfers: u64,
    /// Frames accepted by the encoder
    pub frames_submitted: u64,
    /// Frames submitted with a forced intra picture type
    pub keyframes_forced: u64,
    pub transfer_errors: u64,
    pub submit_errors: u64,
    /// Duration of the most recent transfer in µs
    pub last_transfer_us: u64,
    /// Exponential moving average of transfer duration in µs
    pub avg_transfer_us: f64,
}

impl PushStats {
    fn record_transfer(&mut self, us: u64) {
        self.avg_transfer_us = if self.transfers == 0 {
            us as f64
        } else {
            self.avg_transfer_us * 0.95 + us as f64 * 0.05
        };
        self.last_transfer_us = us;
        self.transfers += 1;
    }
}

/// Hardware encode pipeline for a fixed set of rendered frame slots
///
/// Not safe for concurrent use: every push reuses the one transfer frame, so
/// calls must be serialized. Callers with several producer threads must
/// provide their own synchronization.
///
/// Teardown follows field order: source handles, device context, transfer
/// frame, encoder.
pub struct EncodePipeline<B: HwBackend> {
    devices: DeviceManager<B>,
    transfer_frame: B::Frame,
    session: EncoderSession<B>,
    stats: PushStats,
    backend: B,
}

impl<B: HwBackend> EncodePipeline<B> {
    /// Build the device context, open the encoder and draw the transfer frame
    pub fn new(
        backend: B,
        slots: &[B::Slot],
        source: &SourceFrameContext,
        settings: &StreamSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let mut devices = DeviceManager::new(&backend, slots, source)?;
        let session = EncoderSession::open(&backend, settings)?;
        let transfer_frame = devices.draw_transfer_frame(&backend)?;

        tracing::debug!(
            "Encode pipeline ready: {} slots, source {} -> {} {}",
            devices.source_count(),
            source.resolution,
            session.codec(),
            session.params().resolution
        );

        Ok(Self {
            devices,
            transfer_frame,
            session,
            stats: PushStats::default(),
            backend,
        })
    }

    /// Transfer slot `frame_index` into the encoder's frame, tag it and submit it.
    ///
    /// Blocks until the device transfer and the submission return. Errors are
    /// per frame; the next call starts from a fresh transfer.
    ///
    /// # Panics
    ///
    /// If `frame_index` is not below [`source_count`](Self::source_count).
    pub fn push_frame(&mut self, frame_index: usize, keyframe: bool) -> Result<()> {
        assert!(
            frame_index < self.devices.source_count(),
            "frame index {} out of range ({} source slots)",
            frame_index,
            self.devices.source_count()
        );

        let source = self.devices.source(frame_index);
        let transfer_start = Instant::now();
        if let Err(e) = self.backend.transfer(&mut self.transfer_frame, source) {
            self.stats.transfer_errors += 1;
            return Err(e);
        }
        let transfer_us = transfer_start.elapsed().as_micros() as u64;
        tracing::info!("Hardware frame transfer took {} us", transfer_us);
        self.stats.record_transfer(transfer_us);

        let kind = PictureType::from_keyframe_request(keyframe);
        self.transfer_frame.set_picture_type(kind);
        self.transfer_frame.set_pts(clock::now_ticks());

        if let Err(e) = self
            .backend
            .submit(self.session.encoder_mut(), &self.transfer_frame)
        {
            self.stats.submit_errors += 1;
            return Err(e);
        }

        self.stats.frames_submitted += 1;
        if kind == PictureType::Intra {
            self.stats.keyframes_forced += 1;
        }
        Ok(())
    }

    pub fn source_count(&self) -> usize {
        self.devices.source_count()
    }

    pub fn codec(&self) -> Codec {
        self.session.codec()
    }

    pub fn params(&self) -> &EncoderParams {
        self.session.params()
    }

    pub fn stats(&self) -> &PushStats {
        &self.stats
    }

    pub fn transfer_frame(&self) -> &B::Frame {
        &self.transfer_frame
    }

    pub fn encoder(&self) -> &B::Encoder {
        self.session.encoder()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: HwBackend> Drop for EncodePipeline<B> {
    fn drop(&mut self) {
        tracing::debug!(
            "Dropping encode pipeline after {} frames",
            self.stats.frames_submitted
        );
    }
}
