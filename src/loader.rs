//! Component 1 – script loading.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cli::ScriptInput;
use crate::model::ScriptSource;

pub const SCRIPT_EXTENSION: &str = "pixil";

pub fn load(input: &ScriptInput) -> Result<Vec<ScriptSource>> {
    match input {
        ScriptInput::File(path) => Ok(vec![load_script(path)?]),
        ScriptInput::Directory(dir) => load_directory(dir),
    }
}

pub fn load_script(path: &Path) -> Result<ScriptSource> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    debug!(path = %path.display(), bytes = text.len(), "script loaded");
    Ok(ScriptSource {
        path: path.to_path_buf(),
        text,
    })
}

/// Every `*.pixil` file directly inside `dir`, in file-name order.
pub fn load_directory(dir: &Path) -> Result<Vec<ScriptSource>> {
    if !dir.is_dir() {
        bail!("Input directory {} not found", dir.display());
    }
    let mut scripts = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Scanning {}", dir.display()))?;
        let is_script = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == SCRIPT_EXTENSION);
        if is_script {
            scripts.push(load_script(entry.path())?);
        }
    }
    info!(dir = %dir.display(), scripts = scripts.len(), "found scripts");
    Ok(scripts)
}
