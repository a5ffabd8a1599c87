//! Error types for docoutline.
//!
//! Library crates use [`OutlineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docoutline operations.
#[derive(Debug, thiserror::Error)]
pub enum OutlineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Block document (middle JSON) or TOC file could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Structural error: invalid tree shape or invalid scheduler settings.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A single node analysis failed (recorded per node, never aggregated).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// The external title-mapping capability failed.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Bridge subprocess error (spawn, protocol, or exit status).
    #[error("bridge error: {0}")]
    Bridge(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OutlineError>;

impl OutlineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
