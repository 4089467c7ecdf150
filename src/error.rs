//! Error types shared across the front end and the interpreter.

use std::path::PathBuf;

use snafu::Snafu;

use crate::engine::EngineError;
use crate::model::ValueType;
use crate::processor::ast::BinaryOp;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LexError {
    #[snafu(display("Unexpected char '{ch}', at line {line}, column {column}."))]
    UnexpectedChar {
        ch: char,
        line: usize,
        column: usize,
    },

    #[snafu(display("Unexpected word '{word}', at line {line}, column {column}."))]
    UnexpectedWord {
        word: String,
        line: usize,
        column: usize,
    },

    #[snafu(display("{kind} color must have {expected} at line {line}, column {column}"))]
    InvalidColor {
        kind: &'static str,
        expected: &'static str,
        line: usize,
        column: usize,
    },

    #[snafu(display("Expected closing '~' for {kind} color at line {line}, column {column}"))]
    UnterminatedColor {
        kind: &'static str,
        line: usize,
        column: usize,
    },
}

/// Grammar or static type violation. Always fatal to the parse.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("{message} at line {line}, column {column}"))]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Snafu)]
pub enum FrontendError {
    #[snafu(context(false), display("{source}"))]
    Lex { source: LexError },

    #[snafu(context(false), display("{source}"))]
    Syntax { source: SyntaxError },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RuntimeError {
    #[snafu(display("Unknown variable: {name}"))]
    UnknownVariable { name: String },

    #[snafu(display("Unknown image variable: {name}"))]
    UnknownImage { name: String },

    #[snafu(display("Unknown batch identifier: {name}"))]
    UnknownBatch { name: String },

    #[snafu(display("{name} does not hold a batch (found {found})"))]
    NotABatch { name: String, found: ValueType },

    #[snafu(display("Image variable {name} cannot be used as a value"))]
    ImageInExpression { name: String },

    #[snafu(display("Image file not found: {}", path.display()))]
    ImageNotFound { path: PathBuf },

    #[snafu(display("Cannot perform operation {op} on types {left} and {right}"))]
    TypeMismatch {
        op: BinaryOp,
        left: ValueType,
        right: ValueType,
    },

    #[snafu(display("Division by zero"))]
    DivisionByZero,

    #[snafu(display("Batch expressions only accept paths and batches, found {found}"))]
    InvalidBatchTerm { found: ValueType },

    #[snafu(display("Expected a numeric value for {what}, found {found}"))]
    NotNumeric { what: &'static str, found: ValueType },

    #[snafu(display("Error loading image '{}': {source}", path.display()))]
    Load { path: PathBuf, source: EngineError },

    #[snafu(context(false), display("{source}"))]
    Engine { source: EngineError },

    #[snafu(display("I/O error on '{}': {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
