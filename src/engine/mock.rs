//! Codec-free engine for interpreter tests.
//!
//! An "image" file is a text file whose first line is `WxH`. Saving writes
//! the current size followed by one line per applied operation, so tests can
//! assert on exported files directly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use snafu::ResultExt;

use super::{
    DecodeSnafu, EncodeOptions, EngineError, ImageEngine, IoSnafu, PixelOp, ResizeMode,
    UnsupportedSnafu,
};
use crate::processor::ast::MetadataField;

#[derive(Debug, Clone, PartialEq)]
pub struct MockImage {
    pub width: u32,
    pub height: u32,
    pub ops: Vec<String>,
    pub metadata: BTreeMap<MetadataField, String>,
}

#[derive(Debug, Default)]
pub struct MockEngine {
    /// When set, `draw_text` fails like an engine without font support.
    pub no_text: bool,
}

pub fn write_mock_image(path: &Path, width: u32, height: u32) {
    fs::write(path, format!("{width}x{height}\n")).expect("write mock image");
}

impl ImageEngine for MockEngine {
    type Image = MockImage;

    fn load(&self, path: &Path) -> Result<MockImage, EngineError> {
        let text = fs::read_to_string(path).context(IoSnafu { path })?;
        let header = text.lines().next().unwrap_or_default();
        let dims = header
            .split_once('x')
            .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)));
        let Some((width, height)) = dims else {
            return DecodeSnafu {
                path,
                message: format!("bad header {header:?}"),
            }
            .fail();
        };
        Ok(MockImage {
            width,
            height,
            ops: Vec::new(),
            metadata: BTreeMap::new(),
        })
    }

    fn save(
        &self,
        image: &MockImage,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<(), EngineError> {
        let mut out = format!("{}x{}\n", image.width, image.height);
        for op in &image.ops {
            out.push_str(op);
            out.push('\n');
        }
        out.push_str(&format!(
            "jpeg_quality={} png_best={}\n",
            options.jpeg_quality, options.png_best_compression
        ));
        for (field, value) in &image.metadata {
            out.push_str(&format!("meta {field}={value}\n"));
        }
        fs::write(path, out).context(IoSnafu { path })
    }

    fn dimensions(&self, image: &MockImage) -> (u32, u32) {
        (image.width, image.height)
    }

    fn apply(&self, image: &mut MockImage, op: &PixelOp) -> Result<(), EngineError> {
        match *op {
            PixelOp::RotateLeft | PixelOp::RotateRight => {
                std::mem::swap(&mut image.width, &mut image.height);
            }
            PixelOp::Crop { width, height, .. } => {
                image.width = width;
                image.height = height;
            }
            PixelOp::Resize {
                width,
                height,
                mode,
            } => match mode {
                ResizeMode::Exact | ResizeMode::Fill => {
                    image.width = width;
                    image.height = height;
                }
                ResizeMode::Fit => {
                    let scale = f64::min(
                        f64::from(width) / f64::from(image.width),
                        f64::from(height) / f64::from(image.height),
                    );
                    image.width = (f64::from(image.width) * scale).round().max(1.0) as u32;
                    image.height = (f64::from(image.height) * scale).round().max(1.0) as u32;
                }
            },
            _ => {}
        }
        image.ops.push(format!("{op:?}"));
        Ok(())
    }

    fn overlay(
        &self,
        image: &mut MockImage,
        mark: &MockImage,
        opacity: f32,
    ) -> Result<(), EngineError> {
        image.ops.push(format!(
            "Overlay({}x{}, {opacity:.2})",
            mark.width, mark.height
        ));
        Ok(())
    }

    fn draw_text(
        &self,
        image: &mut MockImage,
        text: &str,
        rgba: [u8; 4],
    ) -> Result<(), EngineError> {
        if self.no_text {
            return UnsupportedSnafu {
                operation: "text watermark",
            }
            .fail();
        }
        image.ops.push(format!("Text({text:?}, {rgba:?})"));
        Ok(())
    }

    fn strip_metadata(&self, image: &mut MockImage, fields: Option<&[MetadataField]>) {
        match fields {
            None => image.metadata.clear(),
            Some(fields) => fields.iter().for_each(|f| {
                image.metadata.remove(f);
            }),
        }
    }

    fn add_metadata(&self, image: &mut MockImage, field: MetadataField, value: &str) {
        image.metadata.insert(field, value.to_string());
    }
}
