//! CLI argument definitions for the Sotto application.
//!
//! Uses `clap` with derive macros. Priority resolution:
//! CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Sotto — local voice dictation that types where your cursor is.
#[derive(Parser, Debug)]
#[command(name = "sotto", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the corrections file and models.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SOTTO_CONFIG env var > ~/.sotto/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SOTTO_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }
}

/// Platform default config path (~/.sotto/config.toml).
fn default_config_path() -> PathBuf {
    home_dir().join(".sotto").join("config.toml")
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    PathBuf::from(home.unwrap_or_else(|_| ".".to_string()))
}

/// Expand a leading ~ to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/") || path.starts_with("~\\") {
        home_dir().join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}
