//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Protocol stream settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Panic reporting settings.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if self.transport.read_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "transport.read_timeout_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Protocol stream configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Seconds to wait for the next line before treating the parent as gone.
    /// Unset means wait forever.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
}

impl TransportConfig {
    /// The read timeout as a [`Duration`].
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }
}

/// Panic reporting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Backtrace frames logged for a handler panic (0 disables backtraces).
    #[serde(default = "default_backtrace_depth")]
    pub backtrace_depth: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            backtrace_depth: default_backtrace_depth(),
        }
    }
}

const fn default_backtrace_depth() -> usize {
    8
}
