//! Tree-walking interpreter.
//!
//! One `Interpreter` owns an engine and runs programs against a fresh
//! environment each time. Top-level runtime errors abort the run; errors
//! while processing one image of a `FOREACH` are logged, recorded in the
//! report and skipped.

use std::fs;
use std::path::{Component, Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::ast::*;
use super::environment::{Environment, ImageHandle};
use super::eval;
use crate::engine::{ImageEngine, PixelOp, ResizeMode};
use crate::error::{
    ImageNotFoundSnafu, IoSnafu, LoadSnafu, NotNumericSnafu, RuntimeError,
};
use crate::model::Value;

/// Extensions picked up when a batch directory is scanned.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "tiff", "bmp"];

/// One image of a `FOREACH` that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Statements executed to completion.
    pub operations: usize,
    /// Every file written, in order.
    pub exported: Vec<PathBuf>,
    pub failures: Vec<ImageFailure>,
}

impl ExecutionReport {
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            format!("Executed successfully with {} operations", self.operations)
        } else {
            format!(
                "Executed successfully with {} operations ({} images failed)",
                self.operations,
                self.failures.len()
            )
        }
    }
}

/// Replace characters that are not valid in file names.
pub fn sanitize_filename(name: &str) -> String {
    const INVALID: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    name.split(|c: char| INVALID.contains(&c) || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .trim_end_matches('.')
        .to_string()
}

/// Lexically resolve `path` against `base`: `.` and `..` are folded without
/// touching the file system.
pub fn resolve_path(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Image files directly inside `dir`, sorted by file name.
fn image_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn dimension(value: Value, what: &'static str) -> Result<u32, RuntimeError> {
    let Some(n) = value.as_number() else {
        return NotNumericSnafu {
            what,
            found: value.value_type(),
        }
        .fail();
    };
    Ok(n.round().clamp(1.0, f64::from(u32::MAX)) as u32)
}

pub struct Interpreter<E: ImageEngine> {
    engine: E,
    env: Environment<E::Image>,
    base_dir: PathBuf,
    counter: u64,
    report: ExecutionReport,
}

impl<E: ImageEngine> Interpreter<E> {
    pub fn new(engine: E, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            env: Environment::new(),
            base_dir: base_dir.into(),
            counter: 0,
            report: ExecutionReport::default(),
        }
    }

    pub fn environment(&self) -> &Environment<E::Image> {
        &self.env
    }

    /// Run `program` and render the outcome as a one-line summary. Never
    /// fails: errors become `"Error: …"`.
    pub fn execute(&mut self, program: &Program) -> String {
        match self.run(program) {
            Ok(report) => report.summary(),
            Err(err) => format!("Error: {err}"),
        }
    }

    pub fn run(&mut self, program: &Program) -> Result<ExecutionReport, RuntimeError> {
        self.env = Environment::new();
        self.counter = 0;
        self.report = ExecutionReport::default();

        for block in &program.blocks {
            self.exec_block(block)?;
        }
        Ok(std::mem::take(&mut self.report))
    }

    fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.base_dir, path)
    }

    fn exec_block(&mut self, block: &Block) -> Result<(), RuntimeError> {
        for stmt in &block.statements {
            self.exec_stmt(stmt)?;
            self.report.operations += 1;
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr) -> Result<Value, RuntimeError> {
        eval::evaluate(expr, &self.env, &self.engine)
    }

    fn apply(&mut self, image: &str, op: PixelOp) -> Result<(), RuntimeError> {
        let handle = self.env.image_mut(image)?;
        self.engine.apply(&mut handle.image, &op)?;
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::BatchDeclaration { name, expr } => {
                let paths: Vec<PathBuf> = eval::evaluate_batch(expr, &self.env)?
                    .into_iter()
                    .map(|p| resolve_path(&self.base_dir, p))
                    .collect();
                info!(batch = %name, paths = paths.len(), "created batch");
                self.env.set_value(name, Value::Batch(paths));
            }
            Stmt::ImageDeclaration { name, path } => {
                let path = self.resolve(path);
                if !path.is_file() {
                    return ImageNotFoundSnafu { path }.fail();
                }
                let image = self.engine.load(&path).context(LoadSnafu { path: &path })?;
                self.env.bind_image(name, ImageHandle::new(image, path));
            }
            Stmt::VariableDeclaration {
                ty,
                name,
                initializer,
            } => {
                let value = match initializer {
                    Some(expr) => self.eval(expr)?,
                    None => Value::zero(*ty),
                };
                self.env.set_value(name, value);
            }
            Stmt::Assignment { name, value } => {
                let value = self.eval(value)?;
                self.env.set_value(name, value);
            }
            Stmt::ForEach {
                var,
                batch,
                export_path,
                body,
            } => self.exec_foreach(var, batch, export_path, body)?,
            Stmt::If {
                condition,
                then_branch,
                elif_branches,
                else_branch,
            } => {
                if self.eval(condition)?.is_truthy() {
                    return self.exec_block(then_branch);
                }
                for branch in elif_branches {
                    if self.eval(&branch.condition)?.is_truthy() {
                        return self.exec_block(&branch.body);
                    }
                }
                if let Some(block) = else_branch {
                    self.exec_block(block)?;
                }
            }
            Stmt::Filter { image, filter } => {
                let op = match filter {
                    Filter::Sharpen => PixelOp::Sharpen,
                    Filter::Negative => PixelOp::Invert,
                    Filter::Bw => PixelOp::Grayscale,
                    Filter::Sepia => PixelOp::Sepia,
                };
                self.apply(image, op)?;
            }
            Stmt::Hue { image, degrees } => {
                self.apply(image, PixelOp::HueRotate(*degrees as i32))?;
            }
            Stmt::Adjust {
                image,
                adjustment,
                amount,
            } => {
                let pct = *amount as f32 / 100.0;
                let op = match adjustment {
                    Adjustment::Brightness => PixelOp::Brightness(pct),
                    Adjustment::Contrast => PixelOp::Contrast(pct),
                    Adjustment::Opacity => PixelOp::Opacity(pct),
                    Adjustment::Noise => PixelOp::Noise(pct),
                    Adjustment::Blur => PixelOp::Blur(*amount as f32 / 10.0),
                    Adjustment::Pixelate => PixelOp::Pixelate(((101 - *amount) / 2).max(1) as u32),
                };
                self.apply(image, op)?;
            }
            Stmt::Rotate { image, direction } => {
                let op = match direction {
                    Direction::Left => PixelOp::RotateLeft,
                    Direction::Right => PixelOp::RotateRight,
                };
                self.apply(image, op)?;
            }
            Stmt::Crop {
                image,
                width,
                height,
            } => {
                let width = dimension(self.eval(width)?, "crop width")?;
                let height = dimension(self.eval(height)?, "crop height")?;
                let (iw, ih) = self.engine.dimensions(&self.env.image(image)?.image);

                let x = iw.saturating_sub(width) / 2;
                let y = ih.saturating_sub(height) / 2;
                let op = PixelOp::Crop {
                    x,
                    y,
                    width: width.min(iw - x),
                    height: height.min(ih - y),
                };
                self.apply(image, op)?;
            }
            Stmt::Orientation { image, orientation } => {
                let (w, h) = self.engine.dimensions(&self.env.image(image)?.image);
                let landscape = w > h;
                let wanted = *orientation == Orientation::Landscape;
                if landscape != wanted {
                    self.apply(image, PixelOp::RotateRight)?;
                }
            }
            Stmt::Watermark { image, text, color } => {
                let handle = self.env.image_mut(image)?;
                self.engine.draw_text(&mut handle.image, text, color.rgba)?;
            }
            Stmt::ImageWatermark {
                image,
                watermark,
                transparency,
            } => {
                let mark = self.env.image(watermark)?.image.clone();
                let handle = self.env.image_mut(image)?;
                let opacity = f32::from(*transparency) / 255.0;
                self.engine.overlay(&mut handle.image, &mark, opacity)?;
            }
            Stmt::StripMetadata { image, selection } => {
                let handle = self.env.image_mut(image)?;
                let fields = match selection {
                    StripSelection::All => None,
                    StripSelection::Fields(fields) => Some(fields.as_slice()),
                };
                self.engine.strip_metadata(&mut handle.image, fields);
            }
            Stmt::AddMetadata {
                image,
                field,
                value,
            } => {
                let handle = self.env.image_mut(image)?;
                self.engine.add_metadata(&mut handle.image, *field, value);
                debug!(image = %image, %field, value = %value, "metadata added");
            }
            Stmt::Rename { image, terms } => self.rename(image, terms)?,
            Stmt::Export {
                image,
                destination,
                keep_original,
            } => {
                let is_dir_hint = destination.ends_with(['/', '\\']);
                let target = self.resolve(destination);
                self.export(image, &target, is_dir_hint, *keep_original)?;
            }
            Stmt::Convert { image, format } => {
                let handle = self.env.image_mut(image)?;
                handle.filename = format!("{}.{}", handle.stem(), format.extension());
            }
            Stmt::Resize { image, spec } => {
                let op = match spec {
                    ResizeSpec::Aspect(ratio) => {
                        let (iw, ih) = self.engine.dimensions(&self.env.image(image)?.image);
                        let (rw, rh) = ratio.parts();
                        let mut width = iw;
                        let mut height = (u64::from(iw) * u64::from(rh) / u64::from(rw)) as u32;
                        if height > ih {
                            height = ih;
                            width = (u64::from(ih) * u64::from(rw) / u64::from(rh)) as u32;
                        }
                        PixelOp::Resize {
                            width: width.max(1),
                            height: height.max(1),
                            mode: ResizeMode::Fill,
                        }
                    }
                    ResizeSpec::Resolution {
                        width,
                        height,
                        keep_aspect,
                    } => PixelOp::Resize {
                        width: dimension(self.eval(width)?, "resize width")?,
                        height: dimension(self.eval(height)?, "resize height")?,
                        mode: if *keep_aspect {
                            ResizeMode::Fit
                        } else {
                            ResizeMode::Exact
                        },
                    },
                };
                self.apply(image, op)?;
            }
            Stmt::Compress { image, quality } => {
                self.env.image_mut(image)?.pending.compression_quality = Some(*quality);
            }
            Stmt::Quantize { image, colors } => {
                self.apply(image, PixelOp::Quantize(*colors))?;
            }
            Stmt::WebOptimize { image, mode } => {
                let handle = self.env.image_mut(image)?;
                handle.pending.web_optimize = Some(*mode);
                let ext = match mode {
                    WebOptimizeMode::Lossless => "png",
                    WebOptimizeMode::Lossy(_) => "jpg",
                };
                handle.filename = format!("{}.{ext}", handle.stem());
            }
        }
        Ok(())
    }

    fn exec_foreach(
        &mut self,
        var: &str,
        batch: &str,
        export_path: &str,
        body: &Block,
    ) -> Result<(), RuntimeError> {
        let dirs = self.env.batch(batch)?.to_vec();
        let export_dir = self.resolve(export_path);
        fs::create_dir_all(&export_dir).context(IoSnafu { path: &export_dir })?;

        info!(batch = %batch, dirs = dirs.len(), "processing batch");
        let mut files = Vec::new();
        for dir in &dirs {
            if dir.is_dir() {
                let found = image_files(dir);
                info!(dir = %dir.display(), images = found.len(), "scanned batch directory");
                files.extend(found);
            } else {
                warn!(dir = %dir.display(), "batch directory not found");
            }
        }
        info!(images = files.len(), "total images to process");

        for file in files {
            let result = self.process_image(var, &file, body, &export_dir);
            // The binding never outlives its iteration.
            self.env.remove(var);

            if let Err(err) = result {
                error!(path = %file.display(), error = %err, "error processing image");
                self.report.failures.push(ImageFailure {
                    path: file,
                    message: err.to_string(),
                });
            }
        }
        Ok(())
    }

    fn process_image(
        &mut self,
        var: &str,
        file: &Path,
        body: &Block,
        export_dir: &Path,
    ) -> Result<(), RuntimeError> {
        let image = self.engine.load(file).context(LoadSnafu { path: file })?;
        self.env.bind_image(var, ImageHandle::new(image, file.to_path_buf()));
        self.exec_block(body)?;
        self.export(var, export_dir, true, true)
    }

    fn rename(&mut self, image: &str, terms: &[RenameTerm]) -> Result<(), RuntimeError> {
        let handle = self.env.image(image)?;
        let stem = handle.stem().to_string();
        let ext = handle.extension().unwrap_or_default().to_string();

        let mut name = String::new();
        for term in terms {
            match term {
                RenameTerm::Text(text) => name.push_str(text),
                RenameTerm::Counter => {
                    name.push_str(&self.counter.to_string());
                    self.counter += 1;
                }
                // Always the renamed image's own name, whichever handle the
                // query names.
                RenameTerm::FileName(_) => name.push_str(&stem),
            }
        }

        if name.is_empty() {
            name = stem;
        }
        if !name.ends_with(&ext) {
            name.push_str(&ext);
        }

        let filename = sanitize_filename(&name);
        debug!(image = %image, filename = %filename, "renamed");
        self.env.image_mut(image)?.filename = filename;
        Ok(())
    }

    /// Save the handle bound to `image`. A `target` that is a directory (or
    /// was written with a trailing separator) receives the handle's filename.
    fn export(
        &mut self,
        image: &str,
        target: &Path,
        is_dir_hint: bool,
        keep_original: bool,
    ) -> Result<(), RuntimeError> {
        let handle = self.env.image(image)?;

        let mut path = target.to_path_buf();
        if is_dir_hint || path.is_dir() {
            fs::create_dir_all(&path).context(IoSnafu { path: &path })?;
            path.push(&handle.filename);
        } else if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context(IoSnafu { path: parent })?;
        }

        self.engine
            .save(&handle.image, &path, &handle.pending.encode_options())?;
        info!(image = %image, path = %path.display(), "exported");

        let overwrote_source = path == handle.source
            || matches!(
                (fs::canonicalize(&path), fs::canonicalize(&handle.source)),
                (Ok(out), Ok(src)) if out == src
            );
        if overwrote_source {
            debug!(path = %path.display(), "export replaced its source, nothing to delete");
        } else if !keep_original && handle.source.exists() {
            if let Err(err) = fs::remove_file(&handle.source) {
                warn!(
                    path = %handle.source.display(),
                    error = %err,
                    "could not delete original file"
                );
            }
        }

        self.report.exported.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockEngine, write_mock_image};
    use crate::processor::{lexer::tokenize, script_parser::parse};

    fn program(src: &str) -> Program {
        parse(tokenize(src).expect("lexes")).expect("parses")
    }

    fn interpreter(base: &Path) -> Interpreter<MockEngine> {
        Interpreter::new(MockEngine::default(), base)
    }

    #[test]
    fn test_sanitize_filename() {
        let test_cases = vec![
            ("plain.png", "plain.png"),
            ("a/b\\c.png", "a_b_c.png"),
            ("what?*.jpg", "what_.jpg"),
            ("<<x>>", "x"),
            ("trailing..", "trailing"),
            ("tab\there.png", "tab_here.png"),
        ];
        for (input, expected) in test_cases {
            assert_eq!(sanitize_filename(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/work/scripts");
        let test_cases = vec![
            ("photos", "/work/scripts/photos"),
            ("./photos/../raw", "/work/scripts/raw"),
            ("../out", "/work/out"),
            ("/abs/dir", "/abs/dir"),
        ];
        for (input, expected) in test_cases {
            assert_eq!(resolve_path(base, input), PathBuf::from(expected), "{input}");
        }
    }

    #[test]
    fn test_batch_paths_resolve_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut interp = interpreter(dir.path());
        interp
            .run(&program(r#"{ BATCH #a = "dirA" + "dirB"; BATCH #c = #a + "dirC"; }"#))
            .unwrap();

        assert_eq!(
            interp.environment().batch("#a").unwrap(),
            &[dir.path().join("dirA"), dir.path().join("dirB")]
        );
        assert_eq!(interp.environment().batch("#c").unwrap().len(), 3);
    }

    #[test]
    fn test_coercion_and_branches() {
        let dir = tempfile::tempdir().unwrap();
        let mut interp = interpreter(dir.path());
        let report = interp
            .run(&program(
                r#"{
                    STRING $a = 1 + "2";
                    STRING $b = "3" + 4;
                    INT $n = 7;
                    STRING $which;
                    IF $n > 10 { $which = "big"; }
                    ELIF $n > 5 { $which = "mid"; }
                    ELSE { $which = "small"; }
                }"#,
            ))
            .unwrap();

        let env = interp.environment();
        assert_eq!(env.value("$a").unwrap(), &Value::Str("12".into()));
        assert_eq!(env.value("$b").unwrap(), &Value::Str("34".into()));
        assert_eq!(env.value("$which").unwrap(), &Value::Str("mid".into()));
        // 5 top-level statements plus the one inside the taken branch.
        assert_eq!(report.operations, 6);
    }

    #[test]
    fn test_image_operations_and_export() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("wide.png"), 1920, 1080);

        let mut interp = interpreter(dir.path());
        let report = interp
            .run(&program(
                r#"{
                    IMG $img = "wide.png";
                    RESIZE $img 1:1;
                    ORIENTATION $img LANDSCAPE;
                    CROP $img (2000, 500);
                    SET $img BLUR 25;
                    SET $img PIXELATE 100;
                    COMPRESS $img 40;
                    CONVERT $img TO JPG;
                    ADD METADATA $img TITLE "Dune";
                    EXPORT $img TO "out/" OGKEEP;
                }"#,
            ))
            .unwrap();

        let out = dir.path().join("out").join("wide.jpg");
        assert_eq!(report.exported, vec![out.clone()]);
        let written = fs::read_to_string(out).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                "1080x500",
                "Resize { width: 1080, height: 1080, mode: Fill }",
                "RotateRight",
                "Crop { x: 0, y: 290, width: 1080, height: 500 }",
                "Blur(2.5)",
                "Pixelate(1)",
                "jpeg_quality=40 png_best=false",
                "meta TITLE=Dune",
            ]
        );
        assert!(dir.path().join("wide.png").exists());
    }

    #[test]
    fn test_export_to_file_and_delete_original() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("a.png"), 4, 4);

        let mut interp = interpreter(dir.path());
        let report = interp
            .run(&program(
                r#"{ IMG $i = "a.png"; WEBOPTIMIZE $i LOSSLESS; EXPORT $i TO "nested/deeper/final.png" OGDELETE; }"#,
            ))
            .unwrap();

        let out = dir.path().join("nested/deeper/final.png");
        assert_eq!(report.exported, vec![out.clone()]);
        assert!(fs::read_to_string(out).unwrap().contains("png_best=true"));
        assert!(!dir.path().join("a.png").exists());
    }

    #[test]
    fn test_rename_counter_and_web_optimize() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("cat.png"), 4, 4);

        let mut interp = interpreter(dir.path());
        interp
            .run(&program(
                r#"{
                    IMG $i = "cat.png";
                    RENAME $i "x:" + COUNTER + "_" + METADATA $i FNAME;
                    RENAME $i METADATA $i FNAME + "-" + COUNTER;
                    WEBOPTIMIZE $i LOSSY 55;
                }"#,
            ))
            .unwrap();

        let handle = interp.environment().image("$i").unwrap();
        assert_eq!(handle.filename, "x_0_cat-1.jpg");
        assert_eq!(handle.pending.encode_options().jpeg_quality, 55);
    }

    #[test]
    fn test_foreach_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        write_mock_image(&photos.join("a.png"), 10, 10);
        fs::write(photos.join("b.png"), "not an image").unwrap();
        write_mock_image(&photos.join("c.JPG"), 10, 20);
        fs::write(photos.join("notes.txt"), "ignored").unwrap();

        let mut interp = interpreter(dir.path());
        let report = interp
            .run(&program(
                r#"{
                    BATCH #b = "photos" + "missing";
                    FOREACH IMG $p IN #b EXPORT TO "out" {
                        RENAME $p "img_" + COUNTER + "_" + METADATA $p FNAME;
                    }
                }"#,
            ))
            .unwrap();

        let out = dir.path().join("out");
        assert_eq!(
            report.exported,
            vec![out.join("img_0_a.png"), out.join("img_1_c.JPG")]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, photos.join("b.png"));
        // BATCH, FOREACH and one RENAME per successful image.
        assert_eq!(report.operations, 4);
        assert!(interp.environment().type_of("$p").is_none());
    }

    #[test]
    fn test_foreach_body_error_is_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("p");
        fs::create_dir(&photos).unwrap();
        write_mock_image(&photos.join("a.png"), 10, 10);
        write_mock_image(&photos.join("b.png"), 30, 10);

        let mut interp = interpreter(dir.path());
        let report = interp
            .run(&program(
                r#"{
                    BATCH #b = "p";
                    FOREACH $p IN #b EXPORT TO "o" {
                        IF METADATA $p FWIDTH > 20 { INT $x = 1 / 0; }
                    }
                }"#,
            ))
            .unwrap();

        assert_eq!(report.exported, vec![dir.path().join("o").join("a.png")]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("Division by zero"));
    }

    #[test]
    fn test_top_level_errors_abort() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("a.png"), 1, 1);

        let test_cases = vec![
            (r#"{ IMG $i = "nope.png"; }"#, "Error: Image file not found"),
            (r#"{ INT $x = $y + 1; }"#, "Error: Unknown variable: $y"),
            (
                r#"{ BATCH #b = "x"; FOREACH $i IN #c EXPORT TO "o" { } }"#,
                "Error: Unknown batch identifier: #c",
            ),
            (
                r#"{ IMG $i = "a.png"; INT $x = 1; $x = $i; }"#,
                "Error: Image variable $i cannot be used as a value",
            ),
        ];

        for (src, expected) in test_cases {
            let mut interp = interpreter(dir.path());
            let out = interp.execute(&program(src));
            assert!(out.starts_with(expected), "{src}\n  got: {out}");
        }
    }

    #[test]
    fn test_text_watermark_reaches_engine() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("a.png"), 8, 8);

        let mut interp = interpreter(dir.path());
        let report = interp
            .run(&program(
                r#"{ IMG $i = "a.png"; WATERMARK $i "hi" ~HFF000080~; EXPORT $i TO "out/" OGKEEP; }"#,
            ))
            .unwrap();
        let written = fs::read_to_string(&report.exported[0]).unwrap();
        assert!(written.contains(r#"Text("hi", [255, 0, 0, 128])"#), "{written}");
    }

    #[test]
    fn test_engine_failure_aborts_top_level() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("a.png"), 8, 8);
        let mut interp = Interpreter::new(MockEngine { no_text: true }, dir.path());

        let out = interp.execute(&program(r#"{ IMG $i = "a.png"; WATERMARK $i "hi" ~HFFFFFF~; }"#));
        assert_eq!(out, "Error: text watermark is not supported by this image engine");
    }

    #[test]
    fn test_export_over_source_keeps_result() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("a.png"), 6, 4);

        let test_cases = vec![
            r#"{ IMG $i = "a.png"; ROTATE $i LEFT; EXPORT $i TO "a.png" OGDELETE; }"#,
            r#"{ IMG $i = "a.png"; ROTATE $i LEFT; EXPORT $i TO "./sub/../a.png" OGDELETE; }"#,
            r#"{ IMG $i = "a.png"; ROTATE $i LEFT; EXPORT $i TO "./" OGDELETE; }"#,
        ];
        for src in test_cases {
            write_mock_image(&dir.path().join("a.png"), 6, 4);
            let report = interpreter(dir.path()).run(&program(src)).unwrap();

            assert_eq!(report.exported, vec![dir.path().join("a.png")], "{src}");
            let written = fs::read_to_string(dir.path().join("a.png")).unwrap();
            assert!(written.starts_with("4x6\nRotateLeft"), "{src}: {written}");
        }
    }

    #[test]
    fn test_rename_uses_own_file_name() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("cat.png"), 4, 4);
        write_mock_image(&dir.path().join("dog.png"), 4, 4);

        let mut interp = interpreter(dir.path());
        interp
            .run(&program(
                r#"{
                    IMG $a = "cat.png";
                    IMG $b = "dog.png";
                    RENAME $a "x_" + METADATA $b FNAME;
                }"#,
            ))
            .unwrap();

        assert_eq!(interp.environment().image("$a").unwrap().filename, "x_cat.png");
        assert_eq!(interp.environment().image("$b").unwrap().filename, "dog.png");
    }

    #[test]
    fn test_execute_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_mock_image(&dir.path().join("a.png"), 8, 8);
        write_mock_image(&dir.path().join("m.png"), 2, 2);
        let mut interp = interpreter(dir.path());

        let out = interp.execute(&program(
            r#"{ IMG $i = "a.png"; IMG $m = "m.png"; WATERMARK $i $m 255; } { INT $x; }"#,
        ));
        assert_eq!(out, "Executed successfully with 4 operations");
    }
}
