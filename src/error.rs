//! Error types for parent-pipe.
//!
//! Only transport-level failures escape the receive loop. Everything raised
//! by a handler is turned into a reply or a log line by
//! [`crate::pipe::fault`] and never shows up here.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while moving lines over the protocol streams.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Reading from or writing to a stream failed.
    #[error("protocol stream I/O failed")]
    Io(#[from] std::io::Error),

    /// A received line was not a JSON document.
    #[error("received a line that is not valid JSON: {line}")]
    Decode {
        /// The offending line, without its terminator.
        line: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An outgoing message could not be serialised.
    #[error("failed to serialise outgoing message")]
    Encode(#[source] serde_json::Error),

    /// No line arrived within the configured read timeout.
    #[error("no message received within {secs}s, treating peer as disconnected")]
    ReadTimeout {
        /// The timeout that elapsed, in seconds.
        secs: u64,
    },
}

/// Errors that stop the server loop.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The transport failed; there is no channel left to report on.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
