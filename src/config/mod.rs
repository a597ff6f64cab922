//! Configuration file loading and parsing.
//!
//! The configuration file is optional. It is looked up in this order:
//!
//! 1. Path given on the command line (must exist)
//! 2. Default location, used only if present:
//!    - **Linux/macOS:** `~/.parent-pipe/config.json`
//!    - **Windows:** `%USERPROFILE%\.parent-pipe\config.json`
//!
//! Without a file, built-in defaults apply.

mod settings;

pub use settings::{Config, DiagnosticsConfig, LoggingConfig, TransportConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.parent-pipe/`
/// - **Windows:** `%USERPROFILE%\.parent-pipe\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".parent-pipe"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, the default location is tried and defaults are
/// returned when nothing is there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given file does not exist
/// - The file cannot be read
/// - The JSON is malformed
/// - Fields are invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    read_config(&config_path)
}

fn read_config(config_path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}
