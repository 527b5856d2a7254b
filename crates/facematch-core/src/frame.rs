//! Still frame type and pixel helpers: decoding, capture normalisation,
//! luma grids and dark-frame detection.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use std::fmt;
use std::sync::Arc;

/// Pixels with an average channel value below this count as dark.
const DARK_PIXEL_LUMA: f32 = 32.0;

/// Fraction of dark pixels above which a frame is considered unusable.
pub const DARK_FRAME_RATIO: f32 = 0.95;

/// Side length of a normalised capture (square, in pixels).
pub const CAPTURE_SIZE: u32 = 160;

/// A decoded RGBA still. Cloning shares the pixel buffer.
#[derive(Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
}

impl Frame {
    /// Wrap an already-decoded image.
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Decode an encoded still (PNG, JPEG, WebP, ...).
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let decoded = image::load_from_memory(bytes)?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(FrameError::Empty);
        }
        Ok(Self::new(decoded.to_rgba8()))
    }

    /// Normalise a raw capture: resize to a `size`×`size` square and,
    /// when `mirror` is set, flip horizontally (selfie view).
    pub fn from_capture(image: &DynamicImage, size: u32, mirror: bool) -> Self {
        Self::new(image.to_rgba8()).normalized(size, mirror)
    }

    /// Apply capture normalisation to an already-decoded frame, so stills
    /// imported from disk line up with live captures.
    pub fn normalized(&self, size: u32, mirror: bool) -> Self {
        let mut resized = imageops::resize(self.image.as_ref(), size, size, FilterType::Triangle);
        if mirror {
            imageops::flip_horizontal_in_place(&mut resized);
        }
        Self::new(resized)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Downsample to a `grid`×`grid` square and return one luma value per
    /// cell, row-major. Luma is the unweighted mean of R, G and B; alpha is
    /// ignored.
    ///
    /// An empty frame yields an all-zero grid of the requested size.
    pub fn luma_grid(&self, grid: u32) -> Vec<f32> {
        let cells = grid as usize * grid as usize;
        if self.is_empty() {
            return vec![0.0; cells];
        }
        let small = imageops::resize(self.image.as_ref(), grid, grid, FilterType::Triangle);
        small.pixels().map(|p| luma(p.0)).collect()
    }

    /// Average pixel luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let total: f32 = self.image.pixels().map(|p| luma(p.0)).sum();
        total / (self.width() * self.height()) as f32
    }

    /// True when the frame is too dark to contain a usable face.
    pub fn is_dark(&self) -> bool {
        let lumas: Vec<f32> = self.image.pixels().map(|p| luma(p.0)).collect();
        is_dark_frame(&lumas, DARK_FRAME_RATIO)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

fn luma(rgba: [u8; 4]) -> f32 {
    (rgba[0] as f32 + rgba[1] as f32 + rgba[2] as f32) / 3.0
}

/// Check whether more than `threshold_pct` of the luma values are dark.
///
/// An empty slice is dark.
pub fn is_dark_frame(lumas: &[f32], threshold_pct: f32) -> bool {
    if lumas.is_empty() {
        return true;
    }
    let dark_count = lumas.iter().filter(|&&l| l < DARK_PIXEL_LUMA).count();
    (dark_count as f32 / lumas.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels")]
    Empty,
}
