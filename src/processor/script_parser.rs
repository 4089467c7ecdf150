//! Recursive-descent parser that consumes the lexer's tokens and builds a
//! `Program` AST.
//!
//! Static checks run while parsing: the parser keeps a symbol table of every
//! declared identifier and rejects image operations on non-images, metadata
//! initialisers whose type disagrees with the declaration, incomparable
//! operands, out-of-range literals and `EXPORT` inside `FOREACH`. The symbol
//! table lives and dies with one `Parser`.

use std::collections::HashMap;
use std::fmt;

use super::ast::*;
use super::lexer::{Token, TokenKind};
use crate::error::SyntaxError;

const IMAGE_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".webp", ".tiff", ".bmp"];

/// Parse a complete token stream (as produced by `lexer::tokenize`).
pub fn parse(tokens: Vec<Token>) -> Result<Program, SyntaxError> {
    Parser::new(tokens).parse_program()
}

/// Static type recorded in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Declared {
    Scalar(ScalarType),
    Image,
    Batch,
}

impl Declared {
    fn compatible(self, other: Declared) -> bool {
        match (self, other) {
            (Declared::Scalar(a), Declared::Scalar(b)) => {
                a == b || (a.is_numeric() && b.is_numeric())
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Declared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declared::Scalar(ty) => write!(f, "{ty}"),
            Declared::Image => f.write_str("IMG"),
            Declared::Batch => f.write_str("BATCH"),
        }
    }
}

fn metadata_kind(kind: TokenKind) -> Option<MetadataKind> {
    match kind {
        TokenKind::Fsize => Some(MetadataKind::FileSize),
        TokenKind::Fname => Some(MetadataKind::FileName),
        TokenKind::Fheight => Some(MetadataKind::Height),
        TokenKind::Fwidth => Some(MetadataKind::Width),
        _ => None,
    }
}

fn strippable_field(kind: TokenKind) -> Option<MetadataField> {
    match kind {
        TokenKind::Gps => Some(MetadataField::Gps),
        TokenKind::Camera => Some(MetadataField::Camera),
        TokenKind::Advance => Some(MetadataField::Advance),
        TokenKind::Origin => Some(MetadataField::Origin),
        TokenKind::Description => Some(MetadataField::Description),
        TokenKind::Tags => Some(MetadataField::Tags),
        TokenKind::Title => Some(MetadataField::Title),
        TokenKind::Copyright => Some(MetadataField::Copyright),
        _ => None,
    }
}

fn adjustment(kind: TokenKind) -> Option<Adjustment> {
    match kind {
        TokenKind::Brightness => Some(Adjustment::Brightness),
        TokenKind::Contrast => Some(Adjustment::Contrast),
        TokenKind::Opacity => Some(Adjustment::Opacity),
        TokenKind::Noise => Some(Adjustment::Noise),
        TokenKind::Blur => Some(Adjustment::Blur),
        TokenKind::Pixelate => Some(Adjustment::Pixelate),
        _ => None,
    }
}

fn unquote(text: &str) -> String {
    let text = text.strip_prefix('"').unwrap_or(text);
    text.strip_suffix('"').unwrap_or(text).to_string()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    symbols: HashMap<String, Declared>,
    foreach_depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let (line, column) = tokens.last().map_or((1, 1), |t| (t.line, t.column));
            tokens.push(Token::new(TokenKind::Eof, "", line, column));
        }
        Self {
            tokens,
            pos: 0,
            symbols: HashMap::new(),
            foreach_depth: 0,
        }
    }

    // ── Token cursor ──────────────────────────────────────────────────

    fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        let last = self.tokens.len() - 1;
        self.tokens[(self.pos + offset).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        let token = self.current();
        SyntaxError {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T, SyntaxError> {
        Err(self.error(message))
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        match self.kind() {
            k if k == kind => Ok(self.advance()),
            TokenKind::Eof => self.fail(format!("Unexpected end of input, expected {expected}")),
            other => self.fail(format!("Expected {expected}, but got {other}")),
        }
    }

    fn eol(&mut self) -> Result<(), SyntaxError> {
        self.expect(TokenKind::Eol, "';'").map(drop)
    }

    fn var_identifier(&mut self) -> Result<String, SyntaxError> {
        if self.kind() != TokenKind::VarIdentifier {
            return self.fail("Expected a variable identifier");
        }
        Ok(self.advance().text)
    }

    fn batch_identifier(&mut self) -> Result<String, SyntaxError> {
        if self.kind() != TokenKind::BatchIdentifier {
            return self.fail("Expected a batch identifier");
        }
        Ok(self.advance().text)
    }

    fn string_literal(&mut self, expected: &str) -> Result<String, SyntaxError> {
        if self.kind() != TokenKind::StrValue {
            return self.fail(format!("Expected {expected}"));
        }
        Ok(unquote(&self.advance().text))
    }

    /// Read a `$name` operand and check it was declared as an image.
    fn image_operand(&mut self, operation: &str) -> Result<String, SyntaxError> {
        let name = self.var_identifier()?;
        match self.symbols.get(&name) {
            Some(Declared::Image) => Ok(name),
            Some(other) => self.fail(format!(
                "{operation} operation requires an image variable, but {name} is {other}"
            )),
            None => self.fail(format!(
                "{operation} operation requires an image variable, but {name} is undefined"
            )),
        }
    }

    /// Read an INT literal and check it falls inside `lo..=hi`.
    fn int_in_range(&mut self, what: &str, lo: i64, hi: i64) -> Result<i64, SyntaxError> {
        if self.kind() != TokenKind::IntValue {
            return self.fail("Expected an integer value");
        }
        let Ok(value) = self.current().text.parse::<i64>() else {
            return self.fail("Integer value out of range");
        };
        if !(lo..=hi).contains(&value) {
            return self.fail(format!("{what} value must be between {lo} and {hi}"));
        }
        self.advance();
        Ok(value)
    }

    fn u8_in_range(&mut self, what: &str, lo: u8, hi: u8) -> Result<u8, SyntaxError> {
        let value = self.int_in_range(what, i64::from(lo), i64::from(hi))?;
        u8::try_from(value).map_err(|_| self.error(format!("{what} value must be between {lo} and {hi}")))
    }

    // ── Program structure ─────────────────────────────────────────────

    pub fn parse_program(mut self) -> Result<Program, SyntaxError> {
        let mut blocks = Vec::new();
        while self.kind() != TokenKind::Eof {
            blocks.push(self.parse_block()?);
        }
        Ok(Program { blocks })
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        if self.kind() != TokenKind::OpenBlock {
            return self.fail("Expected a block");
        }
        self.advance();

        let mut statements = Vec::new();
        while !matches!(self.kind(), TokenKind::CloseBlock | TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::CloseBlock, "'}'")?;
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> Result<Stmt, SyntaxError> {
        match self.kind() {
            TokenKind::TypeBatch => self.parse_batch_declaration(),
            TokenKind::TypeImg => self.parse_image_declaration(),
            TokenKind::TypeInt
            | TokenKind::TypeDbl
            | TokenKind::TypeStr
            | TokenKind::TypeBool
            | TokenKind::TypePxls => self.parse_variable_declaration(),
            TokenKind::VarIdentifier => self.parse_assignment(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::If => self.parse_if(),
            TokenKind::Set => match self.peek_kind(2) {
                TokenKind::Hue => self.parse_hue(),
                k if adjustment(k).is_some() => self.parse_adjust(),
                _ => self.parse_filter(),
            },
            TokenKind::Rotate => self.parse_rotate(),
            TokenKind::Crop => self.parse_crop(),
            TokenKind::Orientation => self.parse_orientation(),
            TokenKind::Watermark => self.parse_watermark(),
            TokenKind::Strip if self.peek_kind(1) == TokenKind::Metadata => self.parse_strip(),
            TokenKind::Strip => {
                self.advance();
                self.fail("Unexpected token after STRIP")
            }
            TokenKind::Add if self.peek_kind(1) == TokenKind::Metadata => {
                self.parse_add_metadata()
            }
            TokenKind::Add => {
                self.advance();
                self.fail("Unexpected token after ADD")
            }
            TokenKind::Rename => self.parse_rename(),
            TokenKind::Export => self.parse_export(),
            TokenKind::Convert => self.parse_convert(),
            TokenKind::Resize => self.parse_resize(),
            TokenKind::Compress => self.parse_compress(),
            TokenKind::Quantize => self.parse_quantize(),
            TokenKind::WebOptimize => self.parse_web_optimize(),
            other => self.fail(format!("Unexpected token {other}")),
        }
    }

    // ── Declarations ──────────────────────────────────────────────────

    fn parse_batch_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let name = self.batch_identifier()?;
        self.symbols.insert(name.clone(), Declared::Batch);
        self.expect(TokenKind::Assign, "'='")?;

        let mut terms = vec![self.parse_batch_term()?];
        while self.kind() == TokenKind::Plus {
            self.advance();
            terms.push(self.parse_batch_term()?);
        }
        self.eol()?;

        Ok(Stmt::BatchDeclaration {
            name,
            expr: Expr::Batch(terms),
        })
    }

    fn parse_batch_term(&mut self) -> Result<Expr, SyntaxError> {
        match self.kind() {
            TokenKind::StrValue => Ok(Expr::Literal(Literal::Str(unquote(&self.advance().text)))),
            TokenKind::BatchIdentifier => Ok(Expr::Variable(self.advance().text)),
            _ => self.fail("Expected a string value or batch identifier"),
        }
    }

    fn parse_image_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let name = self.var_identifier()?;
        self.expect(TokenKind::Assign, "'='")?;

        if self.kind() != TokenKind::StrValue {
            return self.fail("Expected a string value");
        }
        let path = unquote(&self.current().text);
        let lower = path.to_lowercase();
        if !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return self.fail(
                "Invalid image file format (supported formats: PNG, JPG, JPEG, WEBP, TIFF, BMP)",
            );
        }
        self.advance();
        self.eol()?;

        self.symbols.insert(name.clone(), Declared::Image);
        Ok(Stmt::ImageDeclaration { name, path })
    }

    fn parse_variable_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let ty = match self.advance().kind {
            TokenKind::TypeInt => ScalarType::Int,
            TokenKind::TypeDbl => ScalarType::Double,
            TokenKind::TypeStr => ScalarType::Str,
            TokenKind::TypeBool => ScalarType::Bool,
            _ => ScalarType::Pixels,
        };
        let name = self.var_identifier()?;
        self.symbols.insert(name.clone(), Declared::Scalar(ty));

        let mut initializer = None;
        if self.kind() == TokenKind::Assign {
            self.advance();

            // METADATA $img <kind>: the kind sits two tokens ahead.
            if self.kind() == TokenKind::Metadata {
                if let Some(kind) = metadata_kind(self.peek_kind(2)) {
                    let required = kind.value_type();
                    if required != ty {
                        return self.fail(format!(
                            "Type mismatch: {kind} requires {required} but variable is {ty}"
                        ));
                    }
                }
            }
            initializer = Some(self.parse_expression()?);
        }
        self.eol()?;

        Ok(Stmt::VariableDeclaration {
            ty,
            name,
            initializer,
        })
    }

    fn parse_assignment(&mut self) -> Result<Stmt, SyntaxError> {
        let name = self.advance().text;
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_expression()?;
        self.eol()?;
        Ok(Stmt::Assignment { name, value })
    }

    // ── Control flow ──────────────────────────────────────────────────

    fn parse_foreach(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        if self.kind() == TokenKind::TypeImg {
            self.advance();
        }
        let var = self.var_identifier()?;
        self.symbols.insert(var.clone(), Declared::Image);

        self.expect(TokenKind::In, "IN")?;
        let batch = self.batch_identifier()?;

        if self.kind() != TokenKind::Export {
            return self.fail("Expected EXPORT after batch identifier");
        }
        self.advance();
        if self.kind() != TokenKind::To {
            return self.fail("Expected TO after EXPORT");
        }
        self.advance();
        let export_path = self.string_literal("a string value for export path")?;

        self.foreach_depth += 1;
        let body = self.parse_block();
        self.foreach_depth -= 1;

        Ok(Stmt::ForEach {
            var,
            batch,
            export_path,
            body: body?,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let condition = self.parse_expression()?;
        let then_branch = self.parse_block()?;

        let mut elif_branches = Vec::new();
        while self.kind() == TokenKind::Elif {
            self.advance();
            let condition = self.parse_expression()?;
            let body = self.parse_block()?;
            elif_branches.push(ElifBranch { condition, body });
        }

        let else_branch = if self.kind() == TokenKind::Else {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            elif_branches,
            else_branch,
        })
    }

    // ── SET family ────────────────────────────────────────────────────

    fn parse_filter(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("SET")?;
        let filter = match self.kind() {
            TokenKind::Sharpen => Filter::Sharpen,
            TokenKind::Negative => Filter::Negative,
            TokenKind::Bw => Filter::Bw,
            TokenKind::Sepia => Filter::Sepia,
            _ => return self.fail("Expected a filter type"),
        };
        self.advance();
        self.eol()?;
        Ok(Stmt::Filter { image, filter })
    }

    fn parse_hue(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("HUE")?;
        self.advance();
        let degrees = self.int_in_range("Hue", 0, 360)?;
        self.eol()?;
        Ok(Stmt::Hue { image, degrees })
    }

    fn parse_adjust(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let Some(adjustment) = adjustment(self.peek_kind(1)) else {
            return self.fail("Expected an adjustment type");
        };
        let image = self.image_operand(&adjustment.name().to_uppercase())?;
        self.advance();
        let (lo, hi) = adjustment.range();
        let amount = self.int_in_range(adjustment.name(), lo, hi)?;
        self.eol()?;
        Ok(Stmt::Adjust {
            image,
            adjustment,
            amount,
        })
    }

    // ── Geometry ──────────────────────────────────────────────────────

    fn parse_rotate(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("ROTATE")?;
        let direction = match self.kind() {
            TokenKind::Left => Direction::Left,
            TokenKind::Right => Direction::Right,
            _ => return self.fail("Expected a direction (RIGHT or LEFT)"),
        };
        self.advance();
        self.eol()?;
        Ok(Stmt::Rotate { image, direction })
    }

    /// `'(' Expr ',' Expr ')'`
    fn parse_dimensions(&mut self) -> Result<(Expr, Expr), SyntaxError> {
        self.expect(TokenKind::OpenP, "'('")?;
        let width = self.parse_expression()?;
        self.expect(TokenKind::Comma, "','")?;
        let height = self.parse_expression()?;
        self.expect(TokenKind::CloseP, "')'")?;
        Ok((width, height))
    }

    fn parse_crop(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("CROP")?;
        let (width, height) = self.parse_dimensions()?;
        self.eol()?;
        Ok(Stmt::Crop {
            image,
            width,
            height,
        })
    }

    fn parse_orientation(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("ORIENTATION")?;
        let orientation = match self.kind() {
            TokenKind::Landscape => Orientation::Landscape,
            TokenKind::Portrait => Orientation::Portrait,
            _ => return self.fail("Expected an orientation type (LANDSCAPE or PORTRAIT)"),
        };
        self.advance();
        self.eol()?;
        Ok(Stmt::Orientation { image, orientation })
    }

    fn parse_resize(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("RESIZE")?;

        let spec = if let TokenKind::Ratio(ratio) = self.kind() {
            self.advance();
            ResizeSpec::Aspect(ratio)
        } else if self.kind() == TokenKind::OpenP {
            let (width, height) = self.parse_dimensions()?;
            let keep_aspect = if self.kind() == TokenKind::RatioFalse {
                self.advance();
                false
            } else {
                true
            };
            ResizeSpec::Resolution {
                width,
                height,
                keep_aspect,
            }
        } else {
            return self.fail("Expected an aspect ratio or a (width, height) resolution");
        };
        self.eol()?;
        Ok(Stmt::Resize { image, spec })
    }

    // ── Watermarks ────────────────────────────────────────────────────

    fn parse_watermark(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("WATERMARK")?;

        let stmt = match self.kind() {
            TokenKind::StrValue => {
                let text = unquote(&self.advance().text);
                let color = match self.kind() {
                    TokenKind::HexColor | TokenKind::RgbColor => self.parse_color()?,
                    _ => return self.fail("Expected a color value"),
                };
                Stmt::Watermark { image, text, color }
            }
            TokenKind::VarIdentifier => {
                let watermark = self.image_operand("WATERMARK source")?;
                if self.kind() != TokenKind::IntValue {
                    return self.fail("Expected an integer value (0-255) for transparency");
                }
                let transparency = self.u8_in_range("Transparency", 0, 255)?;
                Stmt::ImageWatermark {
                    image,
                    watermark,
                    transparency,
                }
            }
            _ => return self.fail("Expected a string value or variable identifier"),
        };
        self.eol()?;
        Ok(stmt)
    }

    fn parse_color(&mut self) -> Result<Color, SyntaxError> {
        let token = self.current().clone();
        let digits = token
            .text
            .get(2..token.text.len().saturating_sub(1))
            .unwrap_or_default();

        let (width, radix) = match token.kind {
            TokenKind::HexColor => (2, 16),
            _ => (3, 10),
        };

        let mut rgba = [0, 0, 0, 255];
        for (i, chunk) in digits.as_bytes().chunks(width).enumerate().take(4) {
            let chunk = std::str::from_utf8(chunk).unwrap_or_default();
            let component = u32::from_str_radix(chunk, radix)
                .map_err(|_| self.error("Invalid color literal"))?;
            rgba[i] = u8::try_from(component)
                .map_err(|_| self.error("RGB color components must be between 0 and 255"))?;
        }

        self.advance();
        Ok(Color {
            literal: token.text,
            rgba,
        })
    }

    // ── Metadata ──────────────────────────────────────────────────────

    fn parse_strip(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        self.advance();
        let image = self.var_identifier()?;

        let selection = if self.kind() == TokenKind::All {
            self.advance();
            StripSelection::All
        } else {
            let mut fields = Vec::new();
            loop {
                let Some(field) = strippable_field(self.kind()) else {
                    return match self.kind() {
                        k if metadata_kind(k).is_some() => {
                            self.fail(format!("Cannot strip essential metadata: {k}"))
                        }
                        _ => self.fail("Expected a strippable metadata type"),
                    };
                };
                fields.push(field);
                self.advance();

                if self.kind() != TokenKind::Comma {
                    break;
                }
                self.advance();
            }
            StripSelection::Fields(fields)
        };
        self.eol()?;
        Ok(Stmt::StripMetadata { image, selection })
    }

    fn parse_add_metadata(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        self.advance();
        let image = self.var_identifier()?;

        let field = match self.kind() {
            TokenKind::Tags => MetadataField::Tags,
            TokenKind::Title => MetadataField::Title,
            TokenKind::Copyright => MetadataField::Copyright,
            TokenKind::Description => MetadataField::Description,
            _ => return self.fail("Expected TAGS, TITLE, COPYRIGHT or DESCRIPTION"),
        };
        self.advance();
        let value = self.string_literal("a string value")?;
        self.eol()?;
        Ok(Stmt::AddMetadata {
            image,
            field,
            value,
        })
    }

    // ── File operations ───────────────────────────────────────────────

    fn parse_rename(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.var_identifier()?;

        let mut terms = vec![self.parse_rename_term()?];
        while self.kind() == TokenKind::Plus {
            self.advance();
            terms.push(self.parse_rename_term()?);
        }

        if !terms.iter().any(|t| matches!(t, RenameTerm::FileName(_))) {
            return self.fail(
                "RENAME operation must include the original filename (METADATA $photo FNAME)",
            );
        }
        self.eol()?;
        Ok(Stmt::Rename { image, terms })
    }

    fn parse_rename_term(&mut self) -> Result<RenameTerm, SyntaxError> {
        match self.kind() {
            TokenKind::StrValue => Ok(RenameTerm::Text(unquote(&self.advance().text))),
            TokenKind::Counter => {
                self.advance();
                Ok(RenameTerm::Counter)
            }
            TokenKind::Metadata => match self.parse_metadata_query()? {
                Expr::Metadata {
                    image,
                    kind: MetadataKind::FileName,
                } => Ok(RenameTerm::FileName(image)),
                Expr::Metadata { kind, .. } => self.fail(format!(
                    "Only FNAME metadata can be used in RENAME operations, but got {kind}"
                )),
                _ => self.fail("Expected a metadata query"),
            },
            _ => self.fail("Expected a string, COUNTER or METADATA"),
        }
    }

    fn parse_export(&mut self) -> Result<Stmt, SyntaxError> {
        if self.foreach_depth > 0 {
            return self.fail(
                "EXPORT statements are not allowed inside FOREACH blocks, \
                 the export destination is already specified in the FOREACH statement",
            );
        }
        self.advance();
        let image = self.var_identifier()?;
        self.expect(TokenKind::To, "TO")?;
        let destination = self.string_literal("a string value")?;

        let keep_original = match self.kind() {
            TokenKind::OgKeep => true,
            TokenKind::OgDelete => false,
            _ => return self.fail("Expected OGKEEP or OGDELETE"),
        };
        self.advance();
        self.eol()?;
        Ok(Stmt::Export {
            image,
            destination,
            keep_original,
        })
    }

    fn parse_convert(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("CONVERT")?;
        self.expect(TokenKind::To, "TO")?;

        let format = match self.kind() {
            TokenKind::Png => ImageFormat::Png,
            TokenKind::Jpg => ImageFormat::Jpg,
            TokenKind::Jpeg => ImageFormat::Jpeg,
            TokenKind::Webp => ImageFormat::Webp,
            TokenKind::Tiff => ImageFormat::Tiff,
            TokenKind::Bmp => ImageFormat::Bmp,
            _ => {
                return self
                    .fail("Expected a valid image format (PNG, JPG, JPEG, WEBP, TIFF, BMP)");
            }
        };
        self.advance();
        self.eol()?;
        Ok(Stmt::Convert { image, format })
    }

    fn parse_compress(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("COMPRESS")?;
        let quality = self.u8_in_range("Compression quality", 0, 100)?;
        self.eol()?;
        Ok(Stmt::Compress { image, quality })
    }

    fn parse_quantize(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("QUANTIZE")?;
        let colors = self.u8_in_range("Color count", 0, 255)?;
        self.eol()?;
        Ok(Stmt::Quantize { image, colors })
    }

    fn parse_web_optimize(&mut self) -> Result<Stmt, SyntaxError> {
        self.advance();
        let image = self.image_operand("WEBOPTIMIZE")?;
        let mode = match self.kind() {
            TokenKind::Lossless => {
                self.advance();
                WebOptimizeMode::Lossless
            }
            TokenKind::Lossy => {
                self.advance();
                WebOptimizeMode::Lossy(self.u8_in_range("Quality", 0, 100)?)
            }
            _ => return self.fail("Expected LOSSLESS or LOSSY"),
        };
        self.eol()?;
        Ok(Stmt::WebOptimize { image, mode })
    }

    // ── Expressions ───────────────────────────────────────────────────

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_additive()?;

        while self.kind().is_comparison() {
            let op = match self.advance().kind {
                TokenKind::Equal => BinaryOp::Eq,
                TokenKind::NotEqual => BinaryOp::Ne,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::GreaterEqual => BinaryOp::Ge,
                TokenKind::Smaller => BinaryOp::Lt,
                _ => BinaryOp::Le,
            };
            let right = self.parse_additive()?;

            let (lt, rt) = (self.expr_type(&left)?, self.expr_type(&right)?);
            if !lt.compatible(rt) {
                return self.fail(format!("Cannot compare {lt} with {rt}"));
            }

            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative()?;
        while matches!(self.kind(), TokenKind::Plus | TokenKind::Minus) {
            let op = match self.advance().kind {
                TokenKind::Plus => BinaryOp::Add,
                _ => BinaryOp::Sub,
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_primary()?;
        while matches!(self.kind(), TokenKind::Multiply | TokenKind::Divide) {
            let op = match self.advance().kind {
                TokenKind::Multiply => BinaryOp::Mul,
                _ => BinaryOp::Div,
            };
            let right = self.parse_primary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.kind() {
            TokenKind::IntValue
            | TokenKind::DblValue
            | TokenKind::StrValue
            | TokenKind::BoolValue
            | TokenKind::PxlsValue => self.parse_literal().map(Expr::Literal),
            TokenKind::VarIdentifier => Ok(Expr::Variable(self.advance().text)),
            TokenKind::OpenP => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::CloseP, "')'")?;
                Ok(expr)
            }
            TokenKind::Metadata => self.parse_metadata_query(),
            other => self.fail(format!("Unexpected token {other}")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, SyntaxError> {
        let token = self.current();
        let literal = match token.kind {
            TokenKind::IntValue => token.text.parse().ok().map(Literal::Int),
            TokenKind::DblValue => token.text.parse().ok().map(Literal::Double),
            TokenKind::StrValue => Some(Literal::Str(unquote(&token.text))),
            TokenKind::BoolValue => Some(Literal::Bool(token.text.eq_ignore_ascii_case("true"))),
            TokenKind::PxlsValue => token
                .text
                .trim_end_matches('p')
                .parse()
                .ok()
                .map(Literal::Pixels),
            other => return self.fail(format!("Unexpected literal type {other}")),
        };
        match literal {
            Some(literal) => {
                self.advance();
                Ok(literal)
            }
            None => self.fail(format!("Invalid numeric literal '{}'", token.text)),
        }
    }

    fn parse_metadata_query(&mut self) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::Metadata, "METADATA")?;
        let image = self.var_identifier()?;
        let Some(kind) = metadata_kind(self.kind()) else {
            return self.fail("Expected a metadata type");
        };
        self.advance();
        Ok(Expr::Metadata { image, kind })
    }

    /// Structural type of an expression, for comparison checks. Compound
    /// expressions are approximated as INT.
    fn expr_type(&self, expr: &Expr) -> Result<Declared, SyntaxError> {
        match expr {
            Expr::Literal(lit) => Ok(Declared::Scalar(lit.scalar_type())),
            Expr::Variable(name) => match self.symbols.get(name) {
                Some(ty) => Ok(*ty),
                None => self.fail(format!("Unknown variable: {name}")),
            },
            Expr::Metadata { kind, .. } => Ok(Declared::Scalar(kind.value_type())),
            Expr::Batch(_) => Ok(Declared::Batch),
            Expr::Binary { .. } => Ok(Declared::Scalar(ScalarType::Int)),
        }
    }
}
