//! Interpreter environment: named slots holding values or image handles.

use std::collections::HashMap;
use std::path::PathBuf;

use snafu::OptionExt;

use super::ast::WebOptimizeMode;
use crate::engine::EncodeOptions;
use crate::error::{
    ImageInExpressionSnafu, NotABatchSnafu, RuntimeError, UnknownBatchSnafu, UnknownImageSnafu,
    UnknownVariableSnafu,
};
use crate::model::{Value, ValueType};

const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Export settings recorded by `COMPRESS` and `WEBOPTIMIZE`, read only when
/// the handle is saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingExport {
    pub compression_quality: Option<u8>,
    pub web_optimize: Option<WebOptimizeMode>,
}

impl PendingExport {
    pub fn encode_options(&self) -> EncodeOptions {
        let web_quality = self.web_optimize.map(|mode| match mode {
            WebOptimizeMode::Lossless => 100,
            WebOptimizeMode::Lossy(q) => q,
        });
        EncodeOptions {
            jpeg_quality: self
                .compression_quality
                .or(web_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            png_best_compression: self.web_optimize == Some(WebOptimizeMode::Lossless),
        }
    }
}

/// A decoded image plus everything needed to export it later.
#[derive(Debug, Clone)]
pub struct ImageHandle<I> {
    pub image: I,
    /// File the image was loaded from.
    pub source: PathBuf,
    /// Working filename (with extension) used on export.
    pub filename: String,
    pub pending: PendingExport,
}

impl<I> ImageHandle<I> {
    pub fn new(image: I, source: PathBuf) -> Self {
        let filename = source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            image,
            source,
            filename,
            pending: PendingExport::default(),
        }
    }

    /// Working filename without its extension.
    pub fn stem(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.filename,
        }
    }

    /// Extension of the working filename including the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        match self.filename.rfind('.') {
            Some(i) if i > 0 => Some(&self.filename[i..]),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum Slot<I> {
    Scalar(Value),
    Image(ImageHandle<I>),
}

#[derive(Debug)]
pub struct Environment<I> {
    slots: HashMap<String, Slot<I>>,
    types: HashMap<String, ValueType>,
}

impl<I> Default for Environment<I> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            types: HashMap::new(),
        }
    }
}

impl<I> Environment<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, name: &str, value: Value) {
        self.types.insert(name.to_string(), value.value_type());
        self.slots.insert(name.to_string(), Slot::Scalar(value));
    }

    /// Bind `handle` to `name`, dropping whatever the slot held before.
    pub fn bind_image(&mut self, name: &str, handle: ImageHandle<I>) {
        self.types.insert(name.to_string(), ValueType::Image);
        self.slots.insert(name.to_string(), Slot::Image(handle));
    }

    pub fn remove(&mut self, name: &str) -> Option<Slot<I>> {
        self.types.remove(name);
        self.slots.remove(name)
    }

    pub fn type_of(&self, name: &str) -> Option<ValueType> {
        self.types.get(name).copied()
    }

    pub fn value(&self, name: &str) -> Result<&Value, RuntimeError> {
        match self.slots.get(name) {
            Some(Slot::Scalar(value)) => Ok(value),
            Some(Slot::Image(_)) => ImageInExpressionSnafu { name }.fail(),
            None => UnknownVariableSnafu { name }.fail(),
        }
    }

    pub fn image(&self, name: &str) -> Result<&ImageHandle<I>, RuntimeError> {
        match self.slots.get(name) {
            Some(Slot::Image(handle)) => Ok(handle),
            _ => UnknownImageSnafu { name }.fail(),
        }
    }

    pub fn image_mut(&mut self, name: &str) -> Result<&mut ImageHandle<I>, RuntimeError> {
        match self.slots.get_mut(name) {
            Some(Slot::Image(handle)) => Ok(handle),
            _ => UnknownImageSnafu { name }.fail(),
        }
    }

    pub fn batch(&self, name: &str) -> Result<&[PathBuf], RuntimeError> {
        let slot = self.slots.get(name).context(UnknownBatchSnafu { name })?;
        match slot {
            Slot::Scalar(Value::Batch(paths)) => Ok(paths),
            Slot::Scalar(other) => NotABatchSnafu {
                name,
                found: other.value_type(),
            }
            .fail(),
            Slot::Image(_) => NotABatchSnafu {
                name,
                found: ValueType::Image,
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups_by_slot_kind() {
        let mut env: Environment<()> = Environment::new();
        env.set_value("$n", Value::Int(3));
        env.set_value("#b", Value::Batch(vec![PathBuf::from("/d")]));
        env.bind_image("$img", ImageHandle::new((), PathBuf::from("/d/a.png")));

        assert_eq!(env.value("$n").unwrap(), &Value::Int(3));
        assert!(matches!(
            env.value("$img"),
            Err(RuntimeError::ImageInExpression { .. })
        ));
        assert!(matches!(
            env.value("$missing"),
            Err(RuntimeError::UnknownVariable { .. })
        ));
        assert!(matches!(
            env.image("$n"),
            Err(RuntimeError::UnknownImage { .. })
        ));
        assert_eq!(env.batch("#b").unwrap(), &[PathBuf::from("/d")]);
        assert!(matches!(
            env.batch("$n"),
            Err(RuntimeError::NotABatch { found: ValueType::Int, .. })
        ));
        assert!(matches!(
            env.batch("#nope"),
            Err(RuntimeError::UnknownBatch { .. })
        ));

        assert_eq!(env.type_of("$img"), Some(ValueType::Image));
        env.remove("$img");
        assert_eq!(env.type_of("$img"), None);
    }

    #[test]
    fn test_handle_names() {
        let handle = ImageHandle::new((), PathBuf::from("/in/holiday.2024.JPG"));
        assert_eq!(handle.filename, "holiday.2024.JPG");
        assert_eq!(handle.stem(), "holiday.2024");
        assert_eq!(handle.extension(), Some(".JPG"));

        let bare = ImageHandle::new((), PathBuf::from("/in/README"));
        assert_eq!(bare.stem(), "README");
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn test_encode_options() {
        let test_cases = vec![
            (PendingExport::default(), (90, false)),
            (
                PendingExport {
                    compression_quality: Some(40),
                    web_optimize: Some(WebOptimizeMode::Lossy(70)),
                },
                (40, false),
            ),
            (
                PendingExport {
                    compression_quality: None,
                    web_optimize: Some(WebOptimizeMode::Lossy(70)),
                },
                (70, false),
            ),
            (
                PendingExport {
                    compression_quality: None,
                    web_optimize: Some(WebOptimizeMode::Lossless),
                },
                (100, true),
            ),
        ];
        for (pending, (quality, best)) in test_cases {
            let opts = pending.encode_options();
            assert_eq!((opts.jpeg_quality, opts.png_best_compression), (quality, best));
        }
    }
}
