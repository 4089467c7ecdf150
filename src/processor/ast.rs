//! Sum-type AST for one pixil script.
//!
//! The tree is plain owned data: every node owns its children, there is no
//! sharing and no back-references. Consumers (interpreter, printers) match
//! exhaustively over `Stmt` and `Expr`.

use std::fmt;

use serde::Serialize;

pub use super::lexer::AspectRatio;

/// One complete script: a sequence of top-level `{ … }` blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

/// Declared type of a scalar variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarType {
    Int,
    Double,
    Str,
    Bool,
    Pixels,
}

impl ScalarType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Double | ScalarType::Pixels)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalarType::Int => "INT",
            ScalarType::Double => "DOUBLE",
            ScalarType::Str => "STRING",
            ScalarType::Bool => "BOOL",
            ScalarType::Pixels => "PIXEL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        })
    }
}

/// Properties readable through `METADATA $img <kind>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MetadataKind {
    /// `FSIZE` – source file size in KiB.
    FileSize,
    /// `FNAME` – working filename without extension.
    FileName,
    /// `FHEIGHT`
    Height,
    /// `FWIDTH`
    Width,
}

impl MetadataKind {
    /// Static type a query of this kind produces.
    pub fn value_type(self) -> ScalarType {
        match self {
            MetadataKind::FileSize => ScalarType::Double,
            MetadataKind::FileName => ScalarType::Str,
            MetadataKind::Height | MetadataKind::Width => ScalarType::Int,
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetadataKind::FileSize => "FSIZE",
            MetadataKind::FileName => "FNAME",
            MetadataKind::Height => "FHEIGHT",
            MetadataKind::Width => "FWIDTH",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Int(i64),
    Double(f64),
    /// Unquoted string contents.
    Str(String),
    Bool(bool),
    /// `640p`
    Pixels(i64),
}

impl Literal {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Literal::Int(_) => ScalarType::Int,
            Literal::Double(_) => ScalarType::Double,
            Literal::Str(_) => ScalarType::Str,
            Literal::Bool(_) => ScalarType::Bool,
            Literal::Pixels(_) => ScalarType::Pixels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Literal(Literal),
    /// `$name`
    Variable(String),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// `METADATA $img FWIDTH`
    Metadata { image: String, kind: MetadataKind },
    /// Right-hand side of a `BATCH` declaration: string literals and `#batch`
    /// references joined by path-concatenating `+`.
    Batch(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Filter {
    Sharpen,
    Negative,
    Bw,
    Sepia,
}

/// Numeric `SET` adjustments. `HUE` has its own statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Adjustment {
    Brightness,
    Contrast,
    Opacity,
    Noise,
    Blur,
    Pixelate,
}

impl Adjustment {
    /// Inclusive range accepted at parse time.
    pub fn range(self) -> (i64, i64) {
        match self {
            Adjustment::Brightness | Adjustment::Contrast => (0, 200),
            Adjustment::Opacity | Adjustment::Noise | Adjustment::Blur => (0, 100),
            Adjustment::Pixelate => (1, 100),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Adjustment::Brightness => "Brightness",
            Adjustment::Contrast => "Contrast",
            Adjustment::Opacity => "Opacity",
            Adjustment::Noise => "Noise",
            Adjustment::Blur => "Blur",
            Adjustment::Pixelate => "Pixelate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// A colour literal, kept with its source spelling for printing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Color {
    pub literal: String,
    pub rgba: [u8; 4],
}

/// Metadata fields that `STRIP METADATA` may remove and `ADD METADATA` may
/// set (the latter only `Tags`, `Title`, `Copyright`, `Description`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MetadataField {
    Gps,
    Camera,
    Advance,
    Origin,
    Description,
    Tags,
    Title,
    Copyright,
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetadataField::Gps => "GPS",
            MetadataField::Camera => "CAMERA",
            MetadataField::Advance => "ADVANCE",
            MetadataField::Origin => "ORIGIN",
            MetadataField::Description => "DESCRIPTION",
            MetadataField::Tags => "TAGS",
            MetadataField::Title => "TITLE",
            MetadataField::Copyright => "COPYRIGHT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StripSelection {
    All,
    Fields(Vec<MetadataField>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RenameTerm {
    Text(String),
    Counter,
    /// `METADATA $img FNAME`
    FileName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
    Webp,
    Tiff,
    Bmp,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Bmp => "bmp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResizeSpec {
    Aspect(AspectRatio),
    Resolution {
        width: Expr,
        height: Expr,
        keep_aspect: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WebOptimizeMode {
    Lossless,
    Lossy(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElifBranch {
    pub condition: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    /// `BATCH #b = "dir" + #other;`
    BatchDeclaration { name: String, expr: Expr },
    /// `IMG $i = "photo.png";`
    ImageDeclaration { name: String, path: String },
    /// `INT $x = 3;`
    VariableDeclaration {
        ty: ScalarType,
        name: String,
        initializer: Option<Expr>,
    },
    /// `$x = $x + 1;`
    Assignment { name: String, value: Expr },
    /// `FOREACH IMG $i IN #b EXPORT TO "out" { … }`
    ForEach {
        var: String,
        batch: String,
        export_path: String,
        body: Block,
    },
    If {
        condition: Expr,
        then_branch: Block,
        elif_branches: Vec<ElifBranch>,
        else_branch: Option<Block>,
    },
    /// `SET $i SEPIA;`
    Filter { image: String, filter: Filter },
    /// `SET $i HUE 90;`
    Hue { image: String, degrees: i64 },
    /// `SET $i BRIGHTNESS 120;` and friends.
    Adjust {
        image: String,
        adjustment: Adjustment,
        amount: i64,
    },
    Rotate { image: String, direction: Direction },
    /// `CROP $i (w, h);`
    Crop {
        image: String,
        width: Expr,
        height: Expr,
    },
    Orientation {
        image: String,
        orientation: Orientation,
    },
    /// `WATERMARK $i "text" ~HFFFFFF~;`
    Watermark {
        image: String,
        text: String,
        color: Color,
    },
    /// `WATERMARK $i $logo 128;`
    ImageWatermark {
        image: String,
        watermark: String,
        transparency: u8,
    },
    StripMetadata {
        image: String,
        selection: StripSelection,
    },
    AddMetadata {
        image: String,
        field: MetadataField,
        value: String,
    },
    Rename { image: String, terms: Vec<RenameTerm> },
    Export {
        image: String,
        destination: String,
        keep_original: bool,
    },
    Convert { image: String, format: ImageFormat },
    Resize { image: String, spec: ResizeSpec },
    Compress { image: String, quality: u8 },
    Quantize { image: String, colors: u8 },
    WebOptimize {
        image: String,
        mode: WebOptimizeMode,
    },
}
