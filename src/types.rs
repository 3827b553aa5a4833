//! Common types used throughout GhostPush

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);
    pub const QHD_1440P: Self = Self::new(2560, 1440);

    /// Both dimensions are non-zero
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FHD_1080P
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Framerate representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framerate {
    pub num: u32,
    pub den: u32,
}

impl Framerate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub const FPS_90: Self = Self::new(90, 1);

    /// Get framerate as f64
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_90
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{} fps", self.num)
        } else {
            write!(f, "{:.2} fps", self.as_f64())
        }
    }
}

/// Packed 32-bit pixel layouts exchanged between the renderer and the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelLayout {
    /// BGRA 8:8:8:8, as rendered
    #[default]
    Bgra,
    /// BGRX 8:8:8:8, X unused (FFmpeg `BGR0`)
    Bgrx,
}

impl PixelLayout {
    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelLayout::Bgra)
    }
}

/// Layout the encoder consumes. NVENC takes `BGR0` but not `BGRA`, so the
/// alpha byte of the rendered frame is dropped unconditionally.
pub const ENCODER_INPUT_LAYOUT: PixelLayout = PixelLayout::Bgrx;

/// Picture type tag set on a frame before submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PictureType {
    /// Encoder decides
    #[default]
    Auto,
    /// Forced intra (IDR) frame
    Intra,
}

impl PictureType {
    pub fn from_keyframe_request(keyframe: bool) -> Self {
        if keyframe {
            PictureType::Intra
        } else {
            PictureType::Auto
        }
    }
}

/// Shared format/dimensions of the renderer's frame slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFrameContext {
    pub resolution: Resolution,
    pub layout: PixelLayout,
}

impl SourceFrameContext {
    pub fn new(resolution: Resolution, layout: PixelLayout) -> Self {
        Self { resolution, layout }
    }
}
