pub mod cli;
pub mod engine;
pub mod error;
pub mod loader;
pub mod model;
pub mod processor;
pub mod writer;

use anyhow::{Context, bail};
use tracing::{error, info};

use crate::engine::RasterEngine;
use crate::model::ScriptSource;
use crate::processor::{Interpreter, lexer, script_parser};

pub use processor::compile;

pub fn run(args: cli::Cli) -> anyhow::Result<()> {
    let config = args.config()?;

    // 1. ── Load ───────────────────────────────────────────────────────
    let scripts = loader::load(&config.input).with_context(|| "Loading scripts")?;

    // 2. ── Run each script ────────────────────────────────────────────
    let mut failed = 0;
    for script in &scripts {
        if let Err(err) = run_one(&config, script) {
            error!(script = %script.path.display(), "{err:#}");
            println!("Error: {err:#}");
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} scripts failed", scripts.len());
    }
    Ok(())
}

fn run_one(config: &cli::Config, script: &ScriptSource) -> anyhow::Result<()> {
    let name = script.path.display();
    info!(script = %name, "running script");

    // 1. ── Lex ────────────────────────────────────────────────────────
    let tokens = lexer::tokenize(&script.text).with_context(|| format!("Lexing {name}"))?;
    if config.show_tokens {
        for token in &tokens {
            println!(
                "{}: '{}' at line {}, column {}",
                token.kind, token.text, token.line, token.column
            );
        }
    }

    // 2. ── Parse ──────────────────────────────────────────────────────
    let program = script_parser::parse(tokens).with_context(|| format!("Parsing {name}"))?;
    if config.show_ast {
        print!("{}", writer::text::print(&program));
    }
    if config.show_json {
        println!(
            "{}",
            writer::json::emit(&program).with_context(|| "Serialising AST")?
        );
    }
    if config.check_only {
        return Ok(());
    }

    // 3. ── Execute ────────────────────────────────────────────────────
    let mut interpreter = Interpreter::new(RasterEngine::new(), &config.base_dir);
    let report = interpreter
        .run(&program)
        .with_context(|| format!("Executing {name}"))?;
    println!("{}", report.summary());
    Ok(())
}
