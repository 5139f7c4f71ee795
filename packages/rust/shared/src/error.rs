//! Error types for lvkit.
//!
//! Library crates use [`LvkitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all lvkit operations.
#[derive(Debug, thiserror::Error)]
pub enum LvkitError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Price source, snapshot, or rule table could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Session store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller-supplied input was rejected.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A referenced record (session, trade) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Text-completion provider error (missing key, HTTP, response shape).
    #[error("llm error: {0}")]
    Llm(String),

    /// Document rendering error.
    #[error("render error: {0}")]
    Render(String),

    /// Decimal price arithmetic left the representable range.
    #[error("arithmetic overflow: {0}")]
    Arithmetic(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LvkitError>;

impl LvkitError {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LvkitError::config("missing snapshot path");
        assert_eq!(err.to_string(), "config error: missing snapshot path");

        let err = LvkitError::validation("Feld 'category' ist erforderlich");
        assert!(err.to_string().contains("category"));

        let err = LvkitError::NotFound("session 42".into());
        assert_eq!(err.to_string(), "not found: session 42");

        let err = LvkitError::Arithmetic("net total".into());
        assert_eq!(err.to_string(), "arithmetic overflow: net total");
    }

    #[test]
    fn io_error_keeps_path() {
        let err = LvkitError::io(
            "/tmp/pricing.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("pricing.json"));
    }
}
