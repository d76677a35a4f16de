//! Error types for leadpipe.
//!
//! Library crates use [`LeadPipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all leadpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadPipeError {
    /// Configuration loading or validation error (missing credentials, bad TOML).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a search provider or a lead's site.
    #[error("network error: {0}")]
    Network(String),

    /// Response or HTML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Cache or checkpoint storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Third-party enrichment error (domain search, credit checks).
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// External tabular backend error.
    #[error("sync error: {0}")]
    Sync(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid lead fields, inconsistent scoring table, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadPipeError>;

impl LeadPipeError {
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

    /// Whether this error came from missing or invalid configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadPipeError::config("SERPAPI_KEY is not set");
        assert_eq!(err.to_string(), "config error: SERPAPI_KEY is not set");
        assert!(err.is_config());

        let err = LeadPipeError::validation("rating NaN is not a number");
        assert!(err.to_string().contains("rating NaN"));
        assert!(!err.is_config());
    }

    #[test]
    fn io_error_includes_path() {
        let err = LeadPipeError::io(
            "/tmp/cache.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("cache.json"));
        assert!(msg.contains("gone"));
    }
}
