//! Image Engine boundary.
//!
//! The interpreter computes every operation parameter itself and hands the
//! engine a fully resolved `PixelOp`. Engines own decoding, encoding, the
//! pixel kernels and the in-memory metadata store.

#[cfg(test)]
pub mod mock;
pub mod raster;

use std::path::{Path, PathBuf};

use snafu::Snafu;

use crate::processor::ast::MetadataField;

pub use raster::{RasterEngine, RasterImage};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("cannot decode '{}': {message}", path.display()))]
    Decode { path: PathBuf, message: String },

    #[snafu(display("cannot encode '{}': {message}", path.display()))]
    Encode { path: PathBuf, message: String },

    #[snafu(display("{operation} is not supported by this image engine"))]
    Unsupported { operation: String },

    #[snafu(display("I/O error on '{}': {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// How a `PixelOp::Resize` maps the image onto the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Largest size inside the box that keeps the aspect ratio.
    Fit,
    /// Exactly the box, distorting if needed.
    Exact,
    /// Cover the box keeping the aspect ratio, then centre-crop to it.
    Fill,
}

/// A resolved pixel operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelOp {
    RotateLeft,
    RotateRight,
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Resize {
        width: u32,
        height: u32,
        mode: ResizeMode,
    },
    Grayscale,
    Sepia,
    Invert,
    Sharpen,
    HueRotate(i32),
    /// Multiplier, 1.0 leaves the image unchanged.
    Brightness(f32),
    /// Multiplier, 1.0 leaves the image unchanged.
    Contrast(f32),
    /// Alpha multiplier in `[0, 1]`.
    Opacity(f32),
    /// Amplitude in `[0, 1]`.
    Noise(f32),
    /// Gaussian sigma.
    Blur(f32),
    /// Block edge in pixels.
    Pixelate(u32),
    /// Maximum palette size.
    Quantize(u8),
}

/// Encoder settings picked from a handle's pending export state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub jpeg_quality: u8,
    pub png_best_compression: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            png_best_compression: false,
        }
    }
}

pub trait ImageEngine {
    type Image: Clone;

    fn load(&self, path: &Path) -> Result<Self::Image, EngineError>;

    /// Encode `image` to `path`; the format follows the path's extension.
    fn save(
        &self,
        image: &Self::Image,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<(), EngineError>;

    fn dimensions(&self, image: &Self::Image) -> (u32, u32);

    fn apply(&self, image: &mut Self::Image, op: &PixelOp) -> Result<(), EngineError>;

    /// Composite `mark` onto the bottom-right corner of `image`, scaled to a
    /// quarter of its width.
    fn overlay(
        &self,
        image: &mut Self::Image,
        mark: &Self::Image,
        opacity: f32,
    ) -> Result<(), EngineError>;

    fn draw_text(
        &self,
        image: &mut Self::Image,
        text: &str,
        rgba: [u8; 4],
    ) -> Result<(), EngineError>;

    /// Remove the given fields, or every field when `fields` is `None`.
    fn strip_metadata(&self, image: &mut Self::Image, fields: Option<&[MetadataField]>);

    fn add_metadata(&self, image: &mut Self::Image, field: MetadataField, value: &str);
}
