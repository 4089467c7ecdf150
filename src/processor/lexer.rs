//! Hand-written lexer for the pixil script language.
//!
//! The lexer turns raw script text into a flat stream of `Token`s. It is an
//! iterator: every call yields the next token, the stream always ends with a
//! single `Eof`, and the first unrecognised input yields an `Err` after which
//! the iterator is exhausted.
//
//  Lexical items (informal):
//
//      Ratio      ::= one of 16:9 9:16 4:3 3:4 1:1 2:3 3:2 2:1 1:2
//                     16:10 10:16 21:9 9:21
//      Number     ::= \d+\.\d+ | \d+p | \d+        (DOUBLE / PIXELS / INT)
//      Word       ::= [letter $ #][alnum $ #]*     (keyword, $var or #batch)
//      String     ::= '"' .*? '"'                  (no escapes)
//      Color      ::= '~H' hex{6|8} '~' | '~R' digit{9|12} '~'
//      Comment    ::= '//' up to end of line
//
//  Keywords are matched case-insensitively.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{
    InvalidColorSnafu, LexError, UnexpectedCharSnafu, UnexpectedWordSnafu,
    UnterminatedColorSnafu,
};

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]+\.[0-9]+|[0-9]+p|[0-9]+)").expect("number pattern"));

/// Aspect ratios understood by `RESIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    R16x9,
    #[serde(rename = "9:16")]
    R9x16,
    #[serde(rename = "4:3")]
    R4x3,
    #[serde(rename = "3:4")]
    R3x4,
    #[serde(rename = "1:1")]
    R1x1,
    #[serde(rename = "2:3")]
    R2x3,
    #[serde(rename = "3:2")]
    R3x2,
    #[serde(rename = "2:1")]
    R2x1,
    #[serde(rename = "1:2")]
    R1x2,
    #[serde(rename = "16:10")]
    R16x10,
    #[serde(rename = "10:16")]
    R10x16,
    #[serde(rename = "21:9")]
    R21x9,
    #[serde(rename = "9:21")]
    R9x21,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 13] = [
        AspectRatio::R16x9,
        AspectRatio::R9x16,
        AspectRatio::R4x3,
        AspectRatio::R3x4,
        AspectRatio::R1x1,
        AspectRatio::R2x3,
        AspectRatio::R3x2,
        AspectRatio::R2x1,
        AspectRatio::R1x2,
        AspectRatio::R16x10,
        AspectRatio::R10x16,
        AspectRatio::R21x9,
        AspectRatio::R9x21,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::R16x9 => "16:9",
            AspectRatio::R9x16 => "9:16",
            AspectRatio::R4x3 => "4:3",
            AspectRatio::R3x4 => "3:4",
            AspectRatio::R1x1 => "1:1",
            AspectRatio::R2x3 => "2:3",
            AspectRatio::R3x2 => "3:2",
            AspectRatio::R2x1 => "2:1",
            AspectRatio::R1x2 => "1:2",
            AspectRatio::R16x10 => "16:10",
            AspectRatio::R10x16 => "10:16",
            AspectRatio::R21x9 => "21:9",
            AspectRatio::R9x21 => "9:21",
        }
    }

    pub fn from_text(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == text)
    }

    /// `(width, height)` parts of the ratio.
    pub fn parts(self) -> (u32, u32) {
        match self {
            AspectRatio::R16x9 => (16, 9),
            AspectRatio::R9x16 => (9, 16),
            AspectRatio::R4x3 => (4, 3),
            AspectRatio::R3x4 => (3, 4),
            AspectRatio::R1x1 => (1, 1),
            AspectRatio::R2x3 => (2, 3),
            AspectRatio::R3x2 => (3, 2),
            AspectRatio::R2x1 => (2, 1),
            AspectRatio::R1x2 => (1, 2),
            AspectRatio::R16x10 => (16, 10),
            AspectRatio::R10x16 => (10, 16),
            AspectRatio::R21x9 => (21, 9),
            AspectRatio::R9x21 => (9, 21),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // ── Keywords ──────────────────────────────────────────────────────
    In,
    Foreach,
    Fsize,
    Fname,
    Fheight,
    Fwidth,
    Metadata,
    Right,
    Left,
    Set,
    Elif,
    Else,
    If,
    Export,
    To,
    OgKeep,
    OgDelete,
    Sharpen,
    Negative,
    Bw,
    Sepia,
    WebOptimize,
    Lossless,
    Lossy,
    Crop,
    Orientation,
    Rotate,
    Landscape,
    Portrait,
    Convert,
    Hue,
    Resize,
    RatioFalse,
    Compress,
    Quantize,
    Brightness,
    Contrast,
    Opacity,
    Noise,
    Blur,
    Pixelate,
    Watermark,
    Strip,
    Add,
    All,
    Tags,
    Title,
    Copyright,
    Gps,
    Camera,
    Advance,
    Origin,
    Description,
    Rename,
    Counter,
    Png,
    Jpg,
    Jpeg,
    Webp,
    Tiff,
    Bmp,

    // ── Types ─────────────────────────────────────────────────────────
    TypeBatch,
    TypeImg,
    TypeStr,
    TypeBool,
    TypeDbl,
    TypeInt,
    TypePxls,

    // ── Values ────────────────────────────────────────────────────────
    PxlsValue,
    StrValue,
    BoolValue,
    DblValue,
    IntValue,
    HexColor,
    RgbColor,
    Ratio(AspectRatio),

    // ── Identifiers ───────────────────────────────────────────────────
    /// `$name` – scalar or image variable.
    VarIdentifier,
    /// `#name` – batch variable.
    BatchIdentifier,

    // ── Symbols ───────────────────────────────────────────────────────
    OpenP,
    CloseP,
    Comma,
    NotEqual,
    Equal,
    Smaller,
    Greater,
    SmallerEqual,
    GreaterEqual,
    Assign,
    OpenBlock,
    CloseBlock,
    Divide,
    Multiply,
    Minus,
    Plus,

    /// `;`
    Eol,
    Eof,
}

impl TokenKind {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Smaller
                | TokenKind::SmallerEqual
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            TokenKind::OpenP => "'('",
            TokenKind::CloseP => "')'",
            TokenKind::Comma => "','",
            TokenKind::NotEqual => "'!='",
            TokenKind::Equal => "'=='",
            TokenKind::Smaller => "'<'",
            TokenKind::Greater => "'>'",
            TokenKind::SmallerEqual => "'<='",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::Assign => "'='",
            TokenKind::OpenBlock => "'{'",
            TokenKind::CloseBlock => "'}'",
            TokenKind::Divide => "'/'",
            TokenKind::Multiply => "'*'",
            TokenKind::Minus => "'-'",
            TokenKind::Plus => "'+'",
            TokenKind::Eol => "';'",
            TokenKind::Ratio(r) => return write!(f, "{r}"),
            other => return write!(f, "{}", format!("{other:?}").to_uppercase()),
        };
        f.write_str(symbol)
    }
}

/// Resolve a word (already upper-cased) against the keyword table.
fn keyword(upper: &str) -> Option<TokenKind> {
    let kind = match upper {
        "INT" => TokenKind::TypeInt,
        "PIXEL" => TokenKind::TypePxls,
        "DOUBLE" => TokenKind::TypeDbl,
        "STRING" => TokenKind::TypeStr,
        "BOOL" => TokenKind::TypeBool,
        "IMG" => TokenKind::TypeImg,
        "BATCH" => TokenKind::TypeBatch,
        "TRUE" | "FALSE" => TokenKind::BoolValue,
        "IN" => TokenKind::In,
        "FOREACH" => TokenKind::Foreach,
        "FSIZE" => TokenKind::Fsize,
        "FNAME" => TokenKind::Fname,
        "FHEIGHT" => TokenKind::Fheight,
        "FWIDTH" => TokenKind::Fwidth,
        "METADATA" => TokenKind::Metadata,
        "RIGHT" => TokenKind::Right,
        "LEFT" => TokenKind::Left,
        "SET" => TokenKind::Set,
        "ELIF" => TokenKind::Elif,
        "ELSE" => TokenKind::Else,
        "IF" => TokenKind::If,
        "SHARPEN" => TokenKind::Sharpen,
        "NEGATIVE" => TokenKind::Negative,
        "BW" => TokenKind::Bw,
        "SEPIA" => TokenKind::Sepia,
        "CROP" => TokenKind::Crop,
        "ORIENTATION" => TokenKind::Orientation,
        "LANDSCAPE" => TokenKind::Landscape,
        "PORTRAIT" => TokenKind::Portrait,
        "ROTATE" => TokenKind::Rotate,
        "HUE" => TokenKind::Hue,
        "WATERMARK" => TokenKind::Watermark,
        "STRIP" => TokenKind::Strip,
        "ADD" => TokenKind::Add,
        "ALL" => TokenKind::All,
        "TAGS" => TokenKind::Tags,
        "TITLE" => TokenKind::Title,
        "COPYRIGHT" => TokenKind::Copyright,
        "GPS" => TokenKind::Gps,
        "CAMERA" => TokenKind::Camera,
        "ADVANCE" => TokenKind::Advance,
        "ORIGIN" => TokenKind::Origin,
        "DESCRIPTION" => TokenKind::Description,
        "RENAME" => TokenKind::Rename,
        "COUNTER" => TokenKind::Counter,
        "EXPORT" => TokenKind::Export,
        "TO" => TokenKind::To,
        "OGKEEP" => TokenKind::OgKeep,
        "OGDELETE" => TokenKind::OgDelete,
        "CONVERT" => TokenKind::Convert,
        "PNG" => TokenKind::Png,
        "JPG" => TokenKind::Jpg,
        "JPEG" => TokenKind::Jpeg,
        "WEBP" => TokenKind::Webp,
        "TIFF" => TokenKind::Tiff,
        "BMP" => TokenKind::Bmp,
        "RESIZE" => TokenKind::Resize,
        "RATIOFALSE" => TokenKind::RatioFalse,
        "COMPRESS" => TokenKind::Compress,
        "BRIGHTNESS" => TokenKind::Brightness,
        "CONTRAST" => TokenKind::Contrast,
        "OPACITY" => TokenKind::Opacity,
        "NOISE" => TokenKind::Noise,
        "BLUR" => TokenKind::Blur,
        "PIXELATE" => TokenKind::Pixelate,
        "WEBOPTIMIZE" => TokenKind::WebOptimize,
        "LOSSLESS" => TokenKind::Lossless,
        "LOSSY" => TokenKind::Lossy,
        "QUANTIZE" => TokenKind::Quantize,
        _ => return None,
    };
    Some(kind)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token. String literals keep their quotes.
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

/// Lex a whole script. Fails on the first unrecognised input.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).collect()
}

#[derive(Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            finished: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        self.column += 1;
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == '/' && self.peek_next() == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            if !c.is_whitespace() {
                break;
            }

            self.bump();
            match c {
                '\n' => self.newline(),
                '\r' => {
                    if self.peek() == Some('\n') {
                        self.bump();
                    }
                    self.newline();
                }
                _ => {}
            }
        }
    }

    fn newline(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn symbol(&mut self, kind: TokenKind, width: usize) -> Token {
        let (line, column, start) = (self.line, self.column, self.pos);
        for _ in 0..width {
            self.bump();
        }
        Token::new(kind, &self.src[start..self.pos], line, column)
    }

    fn match_token(&mut self, c: char) -> Result<Token, LexError> {
        if c.is_ascii_digit() {
            if let Some(ratio) = self.try_aspect_ratio() {
                return Ok(ratio);
            }
        }

        let next = self.peek_next();
        let token = match c {
            ')' => self.symbol(TokenKind::CloseP, 1),
            '(' => self.symbol(TokenKind::OpenP, 1),
            ',' => self.symbol(TokenKind::Comma, 1),
            '}' => self.symbol(TokenKind::CloseBlock, 1),
            '{' => self.symbol(TokenKind::OpenBlock, 1),
            ';' => self.symbol(TokenKind::Eol, 1),
            '/' => self.symbol(TokenKind::Divide, 1),
            '*' => self.symbol(TokenKind::Multiply, 1),
            '+' => self.symbol(TokenKind::Plus, 1),
            '-' => self.symbol(TokenKind::Minus, 1),
            '=' if next == Some('=') => self.symbol(TokenKind::Equal, 2),
            '=' => self.symbol(TokenKind::Assign, 1),
            '>' if next == Some('=') => self.symbol(TokenKind::GreaterEqual, 2),
            '>' => self.symbol(TokenKind::Greater, 1),
            '<' if next == Some('=') => self.symbol(TokenKind::SmallerEqual, 2),
            '<' => self.symbol(TokenKind::Smaller, 1),
            '!' if next == Some('=') => self.symbol(TokenKind::NotEqual, 2),
            c if c.is_alphabetic() || c == '$' || c == '#' => return self.read_word(),
            c if c.is_ascii_digit() => return self.read_number(c),
            '"' => self.read_string(),
            '~' if next == Some('H') => return self.read_hex_color(),
            '~' if next == Some('R') => return self.read_rgb_color(),
            ch => {
                return UnexpectedCharSnafu {
                    ch,
                    line: self.line,
                    column: self.column,
                }
                .fail();
            }
        };
        Ok(token)
    }

    /// Tentatively scan `digits ':' digits`; restores the position unless the
    /// result is one of the supported ratios.
    fn try_aspect_ratio(&mut self) -> Option<Token> {
        let (start, start_column) = (self.pos, self.column);

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(':') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
            let text = &self.src[start..self.pos];
            if let Some(ratio) = AspectRatio::from_text(text) {
                return Some(Token::new(
                    TokenKind::Ratio(ratio),
                    text,
                    self.line,
                    start_column,
                ));
            }
        }

        self.pos = start;
        self.column = start_column;
        None
    }

    fn read_word(&mut self) -> Result<Token, LexError> {
        let (start, column) = (self.pos, self.column);
        let mut found_colon = false;
        let mut prev: Option<char> = None;

        while let Some(c) = self.peek() {
            let colon_ok =
                c == ':' && !found_colon && prev.is_some_and(|p| p.is_ascii_digit());
            if !(c.is_alphanumeric() || c == '$' || c == '#' || colon_ok) {
                break;
            }
            found_colon |= c == ':';
            prev = Some(c);
            self.bump();
        }

        let word = &self.src[start..self.pos];
        if let Some(kind) = keyword(&word.to_uppercase()) {
            return Ok(Token::new(kind, word, self.line, column));
        }

        let kind = match word.chars().next() {
            Some('$') => TokenKind::VarIdentifier,
            Some('#') => TokenKind::BatchIdentifier,
            _ => {
                return UnexpectedWordSnafu {
                    word,
                    line: self.line,
                    column,
                }
                .fail();
            }
        };
        Ok(Token::new(kind, word, self.line, column))
    }

    fn read_number(&mut self, first: char) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let Some(found) = NUMBER.find(&self.src[self.pos..]) else {
            return UnexpectedCharSnafu {
                ch: first,
                line,
                column,
            }
            .fail();
        };

        let text = found.as_str();
        let kind = if text.ends_with('p') {
            TokenKind::PxlsValue
        } else if text.contains('.') {
            TokenKind::DblValue
        } else {
            TokenKind::IntValue
        };
        self.pos += text.len();
        self.column += text.len();
        Ok(Token::new(kind, text, line, column))
    }

    /// Reads verbatim up to the next `"`; an unterminated string runs to the
    /// end of the input.
    fn read_string(&mut self) -> Token {
        let (line, column, start) = (self.line, self.column, self.pos);
        self.bump();
        while let Some(c) = self.bump() {
            match c {
                '"' => break,
                '\n' => self.newline(),
                '\r' => {
                    if self.peek() == Some('\n') {
                        self.bump();
                    }
                    self.newline();
                }
                _ => {}
            }
        }
        Token::new(TokenKind::StrValue, &self.src[start..self.pos], line, column)
    }

    fn read_hex_color(&mut self) -> Result<Token, LexError> {
        self.read_color(TokenKind::HexColor, "Hex", |c| c.is_ascii_hexdigit(), &[6, 8])
    }

    fn read_rgb_color(&mut self) -> Result<Token, LexError> {
        self.read_color(TokenKind::RgbColor, "RGB", |c| c.is_ascii_digit(), &[9, 12])
    }

    fn read_color(
        &mut self,
        kind: TokenKind,
        name: &'static str,
        is_digit: fn(char) -> bool,
        lengths: &[usize],
    ) -> Result<Token, LexError> {
        let (column, start) = (self.column, self.pos);
        self.bump();
        self.bump();

        let mut digits = 0;
        while self.peek().is_some_and(is_digit) {
            self.bump();
            digits += 1;
        }

        if !lengths.contains(&digits) {
            return InvalidColorSnafu {
                kind: name,
                expected: if kind == TokenKind::HexColor {
                    "exactly 6 digits (RRGGBB) or 8 digits (RRGGBBAA)"
                } else {
                    "exactly 9 digits (RRRGGGBBB) or 12 digits (RRRGGGBBBAAA)"
                },
                line: self.line,
                column: self.column,
            }
            .fail();
        }

        if self.peek() != Some('~') {
            return UnterminatedColorSnafu {
                kind: name,
                line: self.line,
                column: self.column,
            }
            .fail();
        }
        self.bump();

        Ok(Token::new(kind, &self.src[start..self.pos], self.line, column))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.skip_trivia();

        let Some(c) = self.peek() else {
            self.finished = true;
            return Some(Ok(Token::new(TokenKind::Eof, "", self.line, self.column)));
        };

        let res = self.match_token(c);
        if res.is_err() {
            self.finished = true;
        }
        Some(res)
    }
}
