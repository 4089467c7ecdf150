//! `ImageEngine` backed by the `image` crate.
//!
//! Text watermarks are drawn with the bundled DejaVu Sans face. Metadata
//! edits live on the in-memory image until save, where they are written as
//! EXIF for the containers that carry it (JPEG, PNG, WebP).

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ab_glyph::{FontRef, PxScale};
use color_quant::NeuQuant;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata as ExifMetadata;
use rand::Rng;
use snafu::ResultExt;
use tracing::{debug, warn};

use super::{
    DecodeSnafu, EncodeOptions, EncodeSnafu, EngineError, ImageEngine, IoSnafu, PixelOp,
    ResizeMode, UnsupportedSnafu,
};
use crate::processor::ast::MetadataField;

const WATERMARK_INSET: i64 = 10;
const TEXT_ORIGIN: i32 = 10;
/// NeuQuant sampling factor: 1 looks at every pixel, 30 is fastest.
const NEUQUANT_SAMPLE: i32 = 10;

static FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

#[derive(Debug, Clone)]
pub struct RasterImage {
    pub pixels: DynamicImage,
    pub metadata: BTreeMap<MetadataField, String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RasterEngine;

impl RasterEngine {
    pub fn new() -> Self {
        Self
    }
}

fn encode_err(path: &Path, err: image::ImageError) -> EngineError {
    EncodeSnafu {
        path,
        message: err.to_string(),
    }
    .build()
}

/// Apply `f` to every pixel, working in RGBA8.
fn map_rgba(pixels: &DynamicImage, mut f: impl FnMut(&mut Rgba<u8>)) -> DynamicImage {
    let mut rgba = pixels.to_rgba8();
    rgba.pixels_mut().for_each(|px| f(px));
    DynamicImage::ImageRgba8(rgba)
}

fn scale_channel(c: u8, factor: f32) -> u8 {
    (f32::from(c) * factor).round().clamp(0.0, 255.0) as u8
}

fn sepia(px: &mut Rgba<u8>) {
    let [r, g, b, a] = px.0.map(f32::from);
    let tone = |cr: f32, cg: f32, cb: f32| (r * cr + g * cg + b * cb).min(255.0) as u8;
    *px = Rgba([
        tone(0.393, 0.769, 0.189),
        tone(0.349, 0.686, 0.168),
        tone(0.272, 0.534, 0.131),
        a as u8,
    ]);
}

fn pixelate(pixels: &DynamicImage, block: u32) -> DynamicImage {
    if block <= 1 {
        return pixels.clone();
    }
    let (w, h) = (pixels.width(), pixels.height());
    let small = pixels.resize_exact((w / block).max(1), (h / block).max(1), FilterType::Triangle);
    small.resize_exact(w, h, FilterType::Nearest)
}

fn exceeds_colors(rgba: &RgbaImage, limit: usize) -> bool {
    let mut seen = HashSet::new();
    rgba.pixels().any(|p| seen.insert(p.0) && seen.len() > limit)
}

/// Reduce to a palette of at most `colors` entries (0 is treated as 1).
fn quantize(pixels: &DynamicImage, colors: u8) -> DynamicImage {
    let mut rgba = pixels.to_rgba8();
    let limit = usize::from(colors.max(1));
    if !exceeds_colors(&rgba, limit) {
        return DynamicImage::ImageRgba8(rgba);
    }

    if limit == 1 {
        let mut sum = [0u64; 4];
        for px in rgba.pixels() {
            sum.iter_mut().zip(px.0).for_each(|(s, c)| *s += u64::from(c));
        }
        let count = u64::from(rgba.width()) * u64::from(rgba.height());
        let mean = Rgba(sum.map(|s| (s / count) as u8));
        rgba.pixels_mut().for_each(|px| *px = mean);
        return DynamicImage::ImageRgba8(rgba);
    }

    let nq = NeuQuant::new(NEUQUANT_SAMPLE, limit, rgba.as_raw());
    let palette = nq.color_map_rgba();
    for px in rgba.pixels_mut() {
        let i = nq.index_of(&px.0) * 4;
        px.0.copy_from_slice(&palette[i..i + 4]);
    }
    DynamicImage::ImageRgba8(rgba)
}

/// EXIF `UserComment` payload: 8-byte character code, then the text.
fn user_comment(text: &str) -> Vec<u8> {
    let mut bytes = b"ASCII\0\0\0".to_vec();
    bytes.extend_from_slice(text.as_bytes());
    bytes
}

/// Write the added metadata fields into the saved file as EXIF.
fn write_exif(path: &Path, fields: &BTreeMap<MetadataField, String>) -> Result<(), EngineError> {
    let mut exif = ExifMetadata::new();
    let mut comment = Vec::new();
    for (field, value) in fields {
        match field {
            MetadataField::Title => {
                exif.set_tag(ExifTag::ImageDescription(value.clone()));
            }
            MetadataField::Copyright => {
                exif.set_tag(ExifTag::Copyright(value.clone()));
            }
            MetadataField::Description => comment.insert(0, value.clone()),
            MetadataField::Tags => comment.push(format!("Keywords: {value}")),
            other => debug!(%other, "field has no EXIF mapping"),
        }
    }
    if !comment.is_empty() {
        exif.set_tag(ExifTag::UserComment(user_comment(&comment.join("\n"))));
    }
    exif.write_to_file(path).context(IoSnafu { path })
}
fn add_noise(pixels: &DynamicImage, amount: f32) -> DynamicImage {
    if amount <= 0.0 {
        return pixels.clone();
    }
    let amplitude = (amount * 127.0).round() as i32;
    let mut rng = rand::thread_rng();
    map_rgba(pixels, |px| {
        for c in px.0.iter_mut().take(3) {
            let delta = rng.gen_range(-amplitude..=amplitude);
            *c = (i32::from(*c) + delta).clamp(0, 255) as u8;
        }
    })
}

impl ImageEngine for RasterEngine {
    type Image = RasterImage;

    fn load(&self, path: &Path) -> Result<RasterImage, EngineError> {
        let pixels = image::open(path).map_err(|e| {
            DecodeSnafu {
                path,
                message: e.to_string(),
            }
            .build()
        })?;
        Ok(RasterImage {
            pixels,
            metadata: BTreeMap::new(),
        })
    }

    fn save(
        &self,
        image: &RasterImage,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<(), EngineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let encoded = match ext.as_str() {
            "jpg" | "jpeg" => {
                let file = File::create(path).context(IoSnafu { path })?;
                let mut writer = BufWriter::new(file);
                let encoder = JpegEncoder::new_with_quality(&mut writer, options.jpeg_quality);
                DynamicImage::ImageRgb8(image.pixels.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(path, e))
            }
            "png" => {
                let file = File::create(path).context(IoSnafu { path })?;
                let compression = if options.png_best_compression {
                    CompressionType::Best
                } else {
                    CompressionType::Default
                };
                let encoder = PngEncoder::new_with_quality(
                    BufWriter::new(file),
                    compression,
                    PngFilter::Adaptive,
                );
                image
                    .pixels
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(path, e))
            }
            "webp" => DynamicImage::ImageRgba8(image.pixels.to_rgba8())
                .save_with_format(path, ImageFormat::WebP)
                .map_err(|e| encode_err(path, e)),
            "bmp" => DynamicImage::ImageRgba8(image.pixels.to_rgba8())
                .save_with_format(path, ImageFormat::Bmp)
                .map_err(|e| encode_err(path, e)),
            _ => image.pixels.save(path).map_err(|e| encode_err(path, e)),
        };
        encoded?;

        if image.metadata.is_empty() {
            return Ok(());
        }
        if matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp") {
            write_exif(path, &image.metadata)?;
            debug!(path = %path.display(), fields = image.metadata.len(), "metadata written");
        } else {
            warn!(path = %path.display(), "metadata is not written for this format");
        }
        Ok(())
    }

    fn dimensions(&self, image: &RasterImage) -> (u32, u32) {
        (image.pixels.width(), image.pixels.height())
    }

    fn apply(&self, image: &mut RasterImage, op: &PixelOp) -> Result<(), EngineError> {
        let px = &image.pixels;
        let next = match *op {
            PixelOp::RotateLeft => px.rotate270(),
            PixelOp::RotateRight => px.rotate90(),
            PixelOp::Crop {
                x,
                y,
                width,
                height,
            } => px.crop_imm(x, y, width, height),
            PixelOp::Resize {
                width,
                height,
                mode,
            } => match mode {
                ResizeMode::Fit => px.resize(width, height, FilterType::Lanczos3),
                ResizeMode::Exact => px.resize_exact(width, height, FilterType::Lanczos3),
                ResizeMode::Fill => px.resize_to_fill(width, height, FilterType::Lanczos3),
            },
            PixelOp::Grayscale => px.grayscale(),
            PixelOp::Sepia => map_rgba(px, sepia),
            PixelOp::Invert => {
                let mut inverted = px.clone();
                inverted.invert();
                inverted
            }
            PixelOp::Sharpen => px.unsharpen(1.5, 0),
            PixelOp::HueRotate(degrees) => px.huerotate(degrees),
            PixelOp::Brightness(factor) => map_rgba(px, |p| {
                for c in p.0.iter_mut().take(3) {
                    *c = scale_channel(*c, factor);
                }
            }),
            PixelOp::Contrast(factor) => px.adjust_contrast((factor - 1.0) * 100.0),
            PixelOp::Opacity(factor) => map_rgba(px, |p| p.0[3] = scale_channel(p.0[3], factor)),
            PixelOp::Noise(amount) => add_noise(px, amount),
            PixelOp::Blur(sigma) if sigma > 0.0 => px.blur(sigma),
            PixelOp::Blur(_) => return Ok(()),
            PixelOp::Pixelate(block) => pixelate(px, block),
            PixelOp::Quantize(colors) => quantize(px, colors),
        };
        image.pixels = next;
        Ok(())
    }

    fn overlay(
        &self,
        image: &mut RasterImage,
        mark: &RasterImage,
        opacity: f32,
    ) -> Result<(), EngineError> {
        let (w, h) = (image.pixels.width(), image.pixels.height());
        let (mw, mh) = (mark.pixels.width().max(1), mark.pixels.height().max(1));

        let target_w = (w / 4).max(1);
        let target_h = ((u64::from(mh) * u64::from(target_w)) / u64::from(mw)).max(1) as u32;
        let scaled = mark
            .pixels
            .resize_exact(target_w, target_h, FilterType::Lanczos3);

        let alpha = opacity.clamp(0.0, 1.0);
        let mut top = scaled.to_rgba8();
        top.pixels_mut()
            .for_each(|p| p.0[3] = scale_channel(p.0[3], alpha));

        let mut base = image.pixels.to_rgba8();
        let x = i64::from(w) - i64::from(target_w) - WATERMARK_INSET;
        let y = i64::from(h) - i64::from(target_h) - WATERMARK_INSET;
        imageops::overlay(&mut base, &top, x.max(0), y.max(0));
        image.pixels = DynamicImage::ImageRgba8(base);
        Ok(())
    }

    fn draw_text(
        &self,
        image: &mut RasterImage,
        text: &str,
        rgba: [u8; 4],
    ) -> Result<(), EngineError> {
        let font = FontRef::try_from_slice(FONT).map_err(|e| {
            UnsupportedSnafu {
                operation: format!("text watermark ({e})"),
            }
            .build()
        })?;

        let (w, h) = (image.pixels.width(), image.pixels.height());
        let scale = PxScale::from((w.min(h) as f32 / 20.0).max(1.0));
        let mut base = image.pixels.to_rgba8();
        draw_text_mut(&mut base, Rgba(rgba), TEXT_ORIGIN, TEXT_ORIGIN, scale, &font, text);
        image.pixels = DynamicImage::ImageRgba8(base);
        Ok(())
    }

    fn strip_metadata(&self, image: &mut RasterImage, fields: Option<&[MetadataField]>) {
        match fields {
            None => image.metadata.clear(),
            Some(fields) => fields.iter().for_each(|f| {
                image.metadata.remove(f);
            }),
        }
    }

    fn add_metadata(&self, image: &mut RasterImage, field: MetadataField, value: &str) {
        image.metadata.insert(field, value.to_string());
    }
}
