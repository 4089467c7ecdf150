use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Script to run (.pixil). Without one, every script in --inputs is run
    pub script: Option<PathBuf>,
    /// Directory scanned for scripts when none is given
    #[arg(long, env = "PIXIL_INPUTS", default_value = "TestInputs")]
    pub inputs: PathBuf,
    /// Directory that relative paths inside scripts resolve against
    /// [default: the working directory]
    #[arg(long, env = "PIXIL_BASE_DIR")]
    pub base_dir: Option<PathBuf>,
    /// Print the token stream
    #[arg(long)]
    pub tokens: bool,
    /// Print the parsed tree
    #[arg(long)]
    pub ast: bool,
    /// Print the parsed tree as JSON
    #[arg(long)]
    pub json: bool,
    /// Stop after parsing
    #[arg(long)]
    pub check: bool,
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Where scripts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptInput {
    File(PathBuf),
    Directory(PathBuf),
}

/// Resolved run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub input: ScriptInput,
    /// Always absolute.
    pub base_dir: PathBuf,
    pub show_tokens: bool,
    pub show_ast: bool,
    pub show_json: bool,
    pub check_only: bool,
}

impl Cli {
    pub fn config(self) -> anyhow::Result<Config> {
        let cwd = std::env::current_dir().with_context(|| "Reading the working directory")?;
        let base_dir = match self.base_dir {
            Some(dir) => cwd.join(dir),
            None => cwd,
        };

        Ok(Config {
            input: match self.script {
                Some(path) => ScriptInput::File(path),
                None => ScriptInput::Directory(self.inputs),
            },
            base_dir,
            show_tokens: self.tokens,
            show_ast: self.ast,
            show_json: self.json,
            check_only: self.check,
        })
    }

    /// Default filter directive for the `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_resolution() {
        let cwd = std::env::current_dir().unwrap();

        let cli = Cli::try_parse_from(["pixil", "job.pixil", "--base-dir", "work", "--ast", "-vv"])
            .unwrap();
        assert_eq!(cli.log_level(), "trace");
        let config = cli.config().unwrap();
        assert_eq!(config.input, ScriptInput::File(PathBuf::from("job.pixil")));
        assert_eq!(config.base_dir, cwd.join("work"));
        assert!(config.show_ast && !config.show_json && !config.check_only);

        let cli = Cli::try_parse_from(["pixil", "--inputs", "scripts", "--check"]).unwrap();
        assert_eq!(cli.log_level(), "info");
        let config = cli.config().unwrap();
        assert_eq!(config.input, ScriptInput::Directory(PathBuf::from("scripts")));
        assert_eq!(config.base_dir, cwd);
        assert!(config.check_only);
    }
}
