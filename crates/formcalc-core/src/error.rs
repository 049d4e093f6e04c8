//! Error types for formcalc-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in formcalc-core
#[derive(Debug, Error)]
pub enum Error {
    /// A number that does not fit a fixed-point decimal
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// JSON shape that has no [`Value`](crate::Value) counterpart
    #[error("Unsupported JSON value: {0}")]
    UnsupportedJson(String),

    /// Two versions of the same formula share a version number
    #[error("Formula '{formula}' already has version {version}")]
    DuplicateVersion { formula: String, version: u32 },

    /// A version was added to the history of another formula
    #[error("Version belongs to formula '{actual}', not '{expected}'")]
    ForeignVersion { expected: String, actual: String },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
