//! Error types and handling infrastructure for logsift.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types. The binary wraps these in `anyhow` for top-level context.
//!
//! ## Error classes
//!
//! - **Recoverable**: navigation past a bound, no further match, removing the last
//!   filter, a bad pattern. The coordinator answers these with a beep and leaves
//!   its state untouched.
//! - **Fatal**: I/O failures on the initial open and broken chain invariants. These
//!   end the coordinator instead of leaving the pipeline half-mutated.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for logsift operations.
#[derive(Error, Debug)]
pub enum SiftError {
    /// Navigation beyond the source or viewport bounds
    #[error("Line {line} is out of bounds")]
    OutOfBounds { line: usize },

    /// No further match in the requested direction
    #[error("Not found")]
    NotFound,

    /// Removing a filter would leave fewer than Source + Cache
    #[error("Cannot remove filter: pipeline needs at least {minimum} nodes")]
    NotEnoughFilters { minimum: usize },

    /// Keyword could not be compiled as a regular expression
    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Unknown filter mode name
    #[error("Invalid filter mode: {value}")]
    InvalidMode { value: String },

    /// Timestamp argument could not be parsed
    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    /// File system related errors (file not found, permission denied, etc.)
    #[error("File operation failed: {message}")]
    FileError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Path exists but is not a regular file
    #[error("Path is not a regular file: {path}")]
    NotAFile { path: PathBuf },

    /// A filter chain invariant was violated
    #[error("Filter chain invariant violated: {message}")]
    Invariant { message: String },

    /// The coordinator is gone
    #[error("Filter manager channel closed")]
    ChannelClosed,
}

/// Standard Result type for logsift operations.
pub type Result<T> = std::result::Result<T, SiftError>;

impl SiftError {
    /// Create a FileError from an io::Error with additional context
    pub fn file_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileError {
            message: message.into(),
            source,
        }
    }

    /// Create an Invariant error with a descriptive message
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Whether the coordinator should answer with a beep and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::NotFound
                | Self::NotEnoughFilters { .. }
                | Self::InvalidPattern { .. }
        )
    }
}

// Automatic conversion from io::Error to SiftError
impl From<std::io::Error> for SiftError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileError {
                message: "File not found".to_string(),
                source: err,
            },
            std::io::ErrorKind::PermissionDenied => Self::FileError {
                message: "Permission denied".to_string(),
                source: err,
            },
            _ => Self::FileError {
                message: "IO operation failed".to_string(),
                source: err,
            },
        }
    }
}
