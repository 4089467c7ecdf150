//! Component 3 – the functional core.
//!
//! Text is lexed, parsed (with inline type checks) into an AST and then
//! interpreted against an [`ImageEngine`].
pub mod ast;
pub mod environment;
pub mod eval;
pub mod interpreter;
pub mod lexer;
pub mod script_parser;

use std::path::Path;

use anyhow::{Context, Result};

use crate::engine::ImageEngine;
use crate::error::FrontendError;
use ast::Program;
pub use interpreter::{ExecutionReport, ImageFailure, Interpreter};

/// Lex and parse one script.
pub fn compile(text: &str) -> Result<Program, FrontendError> {
    let tokens = lexer::tokenize(text)?;
    Ok(script_parser::parse(tokens)?)
}

/// Compile and execute one script, resolving relative paths against
/// `base_dir`.
pub fn run_script<E: ImageEngine>(text: &str, engine: E, base_dir: &Path) -> Result<ExecutionReport> {
    let program = compile(text).with_context(|| "Compiling script")?;
    let mut interpreter = Interpreter::new(engine, base_dir);
    let report = interpreter
        .run(&program)
        .with_context(|| "Executing script")?;
    Ok(report)
}
