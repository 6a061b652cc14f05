// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `taskloom`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskloom",
    version,
    about = "Run scheduled shell tasks with dependencies, priorities and retries.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskloom.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKLOOM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the tasks, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[scheduler].max_concurrency` from the config file.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_concurrency: Option<u32>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_taskloom_toml() {
        let args = CliArgs::try_parse_from(["taskloom"]).unwrap();
        assert_eq!(args.config, default_config_path());
        assert!(!args.dry_run);
        assert!(args.max_concurrency.is_none());
    }

    #[test]
    fn zero_max_concurrency_is_rejected() {
        assert!(CliArgs::try_parse_from(["taskloom", "--max-concurrency", "0"]).is_err());
    }
}
