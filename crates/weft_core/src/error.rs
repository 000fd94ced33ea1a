//! Core error types for weft.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Parse error
    ParseError { message: String },

    /// Validation error
    Validation { field: String, reason: String },

    /// Settings file could not be read
    Io {
        /// Path that failed
        path: String,
        /// Underlying error message
        message: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError { message } => write!(f, "Parse error: {}", message),
            Self::Validation { field, reason } => {
                write!(f, "Validation failed for {}: {}", field, reason)
            }
            Self::Io { path, message } => write!(f, "Cannot read {}: {}", path, message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::ParseError {
            message: err.message().to_string(),
        }
    }
}
