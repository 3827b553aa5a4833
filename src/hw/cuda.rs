//! CUDA hardware backend via FFmpeg
//!
//! Rendered frames arrive as FFmpeg hardware frames (already bound to the
//! renderer's own frames context). They are copied device-side into one CUDA
//! frame drawn from a `BGR0` pool and handed to `h264_nvenc`/`hevc_nvenc`.

use std::ffi::{c_int, CString};
use std::ptr::{self, NonNull};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::util::picture;
use ffmpeg_next::{Dictionary, Rational};

use super::{FramePoolDesc, HwBackend, TransferTarget};
use crate::config::StreamSettings;
use crate::encode::{Codec, EncoderParams};
use crate::error::{code, Error, Result};
use crate::types::{Framerate, PictureType, PixelLayout};

fn av_err(err: c_int) -> String {
    ffmpeg::Error::from(err).to_string()
}

/// Owned `AVBufferRef`; unref'd on drop
struct BufferRef(NonNull<ffi::AVBufferRef>);

impl BufferRef {
    fn from_raw(raw: *mut ffi::AVBufferRef) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    fn as_ptr(&self) -> *mut ffi::AVBufferRef {
        self.0.as_ptr()
    }
}

// SAFETY: AVBufferRef refcounting is atomic and each BufferRef is the sole
// owner of its reference; the pipeline never shares one across threads.
unsafe impl Send for BufferRef {}

impl Drop for BufferRef {
    fn drop(&mut self) {
        let mut raw = self.0.as_ptr();
        // SAFETY: we hold exactly one reference, created by FFmpeg
        unsafe { ffi::av_buffer_unref(&mut raw) };
    }
}

/// CUDA `AVHWDeviceContext`
pub struct CudaDevice(BufferRef);

/// CUDA `AVHWFramesContext` descriptor
pub struct CudaFramePool(BufferRef);

/// Hardware frame backed by CUDA memory
pub struct CudaFrame(ffmpeg::frame::Video);

impl CudaFrame {
    pub fn as_video(&self) -> &ffmpeg::frame::Video {
        &self.0
    }
}

impl TransferTarget for CudaFrame {
    fn set_picture_type(&mut self, kind: PictureType) {
        self.0.set_kind(match kind {
            PictureType::Intra => picture::Type::I,
            PictureType::Auto => picture::Type::None,
        });
    }

    fn set_pts(&mut self, pts: i64) {
        self.0.set_pts(Some(pts));
    }
}

fn frame_rate(framerate: Framerate) -> Result<Rational> {
    match (i32::try_from(framerate.num), i32::try_from(framerate.den)) {
        (Ok(num), Ok(den)) => Ok(Rational::new(num, den)),
        _ => Err(Error::EncoderOpen {
            code: code::EINVAL,
            hint: format!("frame rate {}/{} out of range", framerate.num, framerate.den),
        }),
    }
}

fn sw_format(layout: PixelLayout) -> ffi::AVPixelFormat {
    match layout {
        PixelLayout::Bgra => ffi::AVPixelFormat::AV_PIX_FMT_BGRA,
        PixelLayout::Bgrx => ffi::AVPixelFormat::AV_PIX_FMT_BGR0,
    }
}

fn encoder_format(layout: PixelLayout) -> Pixel {
    match layout {
        PixelLayout::Bgra => Pixel::BGRA,
        PixelLayout::Bgrx => Pixel::BGRZ,
    }
}

/// FFmpeg CUDA/NVENC backend
pub struct CudaBackend {
    device: Option<CString>,
}

impl CudaBackend {
    /// Backend on the driver's default CUDA device
    pub fn new() -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::DeviceCreation {
            code: e.into(),
            hint: format!("FFmpeg initialization failed: {}", e),
        })?;
        Ok(Self { device: None })
    }

    /// Backend on a specific CUDA device ordinal
    pub fn with_device(device: &str) -> Result<Self> {
        let device = CString::new(device)
            .map_err(|_| Error::InvalidSettings(format!("invalid device name {:?}", device)))?;
        let mut backend = Self::new()?;
        backend.device = Some(device);
        Ok(backend)
    }

    pub fn from_settings(settings: &StreamSettings) -> Result<Self> {
        match settings.device.as_deref() {
            Some(device) => Self::with_device(device),
            None => Self::new(),
        }
    }
}

impl HwBackend for CudaBackend {
    type Slot = ffmpeg::frame::Video;
    type SourceFrame = ffmpeg::frame::Video;
    type Device = CudaDevice;
    type FramePool = CudaFramePool;
    type Frame = CudaFrame;
    type EncoderCodec = ffmpeg::Codec;
    type Encoder = ffmpeg::encoder::Video;

    fn adopt_source(&self, slot: &Self::Slot) -> Result<Self::SourceFrame> {
        // SAFETY: slot is a live AVFrame; the clone takes new buffer references
        let raw = unsafe { ffi::av_frame_clone(slot.as_ptr()) };
        if raw.is_null() {
            return Err(Error::SourceAdoption {
                code: code::ENOMEM,
                hint: "av_frame_clone failed".into(),
            });
        }
        // SAFETY: raw is a freshly allocated frame we now own
        Ok(unsafe { ffmpeg::frame::Video::wrap(raw) })
    }

    fn create_device(&self) -> Result<CudaDevice> {
        let mut raw: *mut ffi::AVBufferRef = ptr::null_mut();
        let device = self.device.as_ref().map_or(ptr::null(), |d| d.as_ptr());
        // SAFETY: out-pointer is valid; device is null or a NUL-terminated string
        let err = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut raw,
                ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
                device,
                ptr::null_mut(),
                0,
            )
        };
        if err < 0 {
            return Err(Error::DeviceCreation {
                code: err,
                hint: format!("Failed to create a CUDA device: {}", av_err(err)),
            });
        }
        BufferRef::from_raw(raw)
            .map(CudaDevice)
            .ok_or_else(|| Error::DeviceCreation {
                code: code::ENOMEM,
                hint: "CUDA device context is null".into(),
            })
    }

    fn alloc_frame_pool(&self, device: &CudaDevice) -> Result<CudaFramePool> {
        // SAFETY: device holds a valid device context reference
        let raw = unsafe { ffi::av_hwframe_ctx_alloc(device.0.as_ptr()) };
        BufferRef::from_raw(raw)
            .map(CudaFramePool)
            .ok_or_else(|| Error::FramePoolAllocation {
                code: code::ENOMEM,
                hint: "Failed to create CUDA frame context".into(),
            })
    }

    fn init_frame_pool(&self, pool: &mut CudaFramePool, desc: &FramePoolDesc) -> Result<()> {
        let dims = (
            c_int::try_from(desc.resolution.width),
            c_int::try_from(desc.resolution.height),
        );
        let (width, height) = match dims {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(Error::FramePoolInit {
                    code: code::EINVAL,
                    hint: format!("frame size {} out of range", desc.resolution),
                })
            }
        };

        // SAFETY: data of a frames-context buffer is an AVHWFramesContext
        let err = unsafe {
            let frames = (*pool.0.as_ptr()).data as *mut ffi::AVHWFramesContext;
            (*frames).format = ffi::AVPixelFormat::AV_PIX_FMT_CUDA;
            (*frames).sw_format = sw_format(desc.sw_layout);
            (*frames).width = width;
            (*frames).height = height;
            ffi::av_hwframe_ctx_init(pool.0.as_ptr())
        };
        if err < 0 {
            return Err(Error::FramePoolInit {
                code: err,
                hint: format!("Failed to initialize CUDA frame context: {}", av_err(err)),
            });
        }
        Ok(())
    }

    fn alloc_frame(&self, pool: &CudaFramePool) -> Result<CudaFrame> {
        let mut frame = ffmpeg::frame::Video::empty();
        // SAFETY: pool is initialized; frame is an empty AVFrame we own
        let err = unsafe { ffi::av_hwframe_get_buffer(pool.0.as_ptr(), frame.as_mut_ptr(), 0) };
        if err < 0 {
            return Err(Error::FramePoolAllocation {
                code: err,
                hint: format!("av_hwframe_get_buffer: {}", av_err(err)),
            });
        }
        Ok(CudaFrame(frame))
    }

    fn find_encoder(&self, codec: Codec) -> Result<ffmpeg::Codec> {
        let name = codec.encoder_name();
        ffmpeg::encoder::find_by_name(name).ok_or_else(|| Error::EncoderNotFound {
            code: code::ENCODER_NOT_FOUND,
            hint: format!("Failed to find encoder {}", name),
        })
    }

    fn open_encoder(
        &self,
        codec: ffmpeg::Codec,
        params: &EncoderParams,
    ) -> Result<ffmpeg::encoder::Video> {
        let frame_rate = frame_rate(params.framerate)?;
        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut encoder = context.encoder().video().map_err(|e| Error::EncoderOpen {
            code: e.into(),
            hint: format!("failed to allocate {} context: {}", params.codec.encoder_name(), e),
        })?;

        encoder.set_format(encoder_format(params.pixel_layout));
        encoder.set_width(params.resolution.width);
        encoder.set_height(params.resolution.height);
        encoder.set_time_base(Rational::new(params.time_base.0, params.time_base.1));
        encoder.set_frame_rate(Some(frame_rate));
        encoder.set_aspect_ratio(Rational::new(params.aspect_ratio.0, params.aspect_ratio.1));
        encoder.set_max_b_frames(params.max_b_frames as usize);
        encoder.set_gop(params.gop_size);
        encoder.set_bit_rate(usize::try_from(params.bitrate_bps).unwrap_or(usize::MAX));

        let mut opts = Dictionary::new();
        for (key, value) in params.options() {
            opts.set(key, &value);
        }

        encoder.open_with(opts).map_err(|e| Error::EncoderOpen {
            code: e.into(),
            hint: format!("Cannot open video encoder codec: {}", e),
        })
    }

    fn transfer(&self, dst: &mut CudaFrame, src: &ffmpeg::frame::Video) -> Result<()> {
        // SAFETY: both frames are live hardware frames; dst owns its CUDA buffer
        let err = unsafe { ffi::av_hwframe_transfer_data(dst.0.as_mut_ptr(), src.as_ptr(), 0) };
        if err != 0 {
            return Err(Error::Transfer {
                code: err,
                hint: format!("av_hwframe_transfer_data: {}", av_err(err)),
            });
        }
        Ok(())
    }

    fn submit(&self, encoder: &mut ffmpeg::encoder::Video, frame: &CudaFrame) -> Result<()> {
        encoder.send_frame(&frame.0).map_err(|e| Error::Submission {
            code: e.into(),
            hint: format!("avcodec_send_frame failed: {}", e),
        })
    }
}

// ============================================================================
// NVENC Detection Functions
// ============================================================================

/// Check if a CUDA device can be opened
pub fn is_available() -> bool {
    probe_device(None).is_ok()
}

/// Open and immediately release a CUDA device context
pub fn probe_device(device: Option<&str>) -> Result<()> {
    let backend = match device {
        Some(device) => CudaBackend::with_device(device)?,
        None => CudaBackend::new()?,
    };
    backend.create_device().map(drop)
}

/// Check if FFmpeg exposes the NVENC encoder for `codec`
pub fn supports_codec(codec: Codec) -> bool {
    if ffmpeg::init().is_err() {
        return false;
    }
    ffmpeg::encoder::find_by_name(codec.encoder_name()).is_some()
}

/// Get GPU name via nvidia-smi
pub fn gpu_name() -> Option<String> {
    nvidia_smi_query("name")
}

/// Get NVIDIA driver version
pub fn driver_version() -> Option<String> {
    nvidia_smi_query("driver_version")
}

fn nvidia_smi_query(field: &str) -> Option<String> {
    let query = format!("--query-gpu={}", field);
    std::process::Command::new("nvidia-smi")
        .args([query.as_str(), "--format=csv,noheader"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}

/// Hardware encode capabilities of this host
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub cuda: bool,
    pub h264: bool,
    pub hevc: bool,
    pub gpu_name: Option<String>,
    pub driver_version: Option<String>,
}

pub fn get_capabilities() -> Capabilities {
    Capabilities {
        cuda: is_available(),
        h264: supports_codec(Codec::H264),
        hevc: supports_codec(Codec::Hevc),
        gpu_name: gpu_name(),
        driver_version: driver_version(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::DeviceManager;
    use crate::types::{Resolution, SourceFrameContext};
    use crate::NvencPipeline;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_pipeline_is_send() {
        assert_send::<CudaDevice>();
        assert_send::<CudaFramePool>();
        assert_send::<DeviceManager<CudaBackend>>();
        assert_send::<NvencPipeline>();
    }

    #[test]
    fn test_frame_rate_conversion() {
        let rate = frame_rate(Framerate::new(90, 1)).unwrap();
        assert_eq!((rate.numerator(), rate.denominator()), (90, 1));

        let err = frame_rate(Framerate::new(u32::MAX, 1)).unwrap_err();
        assert!(matches!(err, Error::EncoderOpen { .. }));
        assert_eq!(err.code(), Some(code::EINVAL));
    }

    #[test]
    fn test_capability_detection() {
        let caps = get_capabilities();
        println!("NVENC Capabilities: {:?}", caps);
    }

    #[test]
    fn test_invalid_device_name() {
        let result = CudaBackend::with_device("0\0");
        assert!(matches!(result, Err(Error::InvalidSettings(_))));
    }

    #[test]
    fn test_layout_mapping() {
        assert_eq!(encoder_format(PixelLayout::Bgrx), Pixel::BGRZ);
        assert_eq!(sw_format(PixelLayout::Bgrx), ffi::AVPixelFormat::AV_PIX_FMT_BGR0);
    }

    #[test]
    fn test_device_and_pool() {
        if !is_available() {
            println!("CUDA not available, skipping test");
            return;
        }

        let backend = CudaBackend::new().unwrap();
        let device = backend.create_device().unwrap();
        let mut pool = backend.alloc_frame_pool(&device).unwrap();
        let desc = FramePoolDesc::for_source(&SourceFrameContext::new(
            Resolution::HD_720P,
            PixelLayout::Bgra,
        ));
        backend.init_frame_pool(&mut pool, &desc).unwrap();
        let frame = backend.alloc_frame(&pool).unwrap();
        assert_eq!(frame.as_video().width(), 1280);
    }

    #[test]
    fn test_empty_slots_with_cuda() {
        let Ok(backend) = CudaBackend::new() else {
            return;
        };
        let ctx = SourceFrameContext::new(Resolution::HD_720P, PixelLayout::Bgra);
        let result = DeviceManager::new(&backend, &[], &ctx);
        assert!(matches!(result, Err(Error::NoSourceFrames)));
    }
}
