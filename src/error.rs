//! Dataset error types.

use thiserror::Error;

/// Dataset error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Construction errors
    MissingPageSize,
    MissingSource,
    InvalidHorizon,
    InvalidConfig,

    // Page errors
    InvalidTransition,

    // Environment errors
    NoRuntime,
    Io,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingPageSize => "MissingPageSize",
            ErrorCode::MissingSource => "MissingSource",
            ErrorCode::InvalidHorizon => "InvalidHorizon",
            ErrorCode::InvalidConfig => "InvalidConfig",
            ErrorCode::InvalidTransition => "InvalidTransition",
            ErrorCode::NoRuntime => "NoRuntime",
            ErrorCode::Io => "Io",
        }
    }

    /// Returns true for errors raised while validating a configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCode::MissingPageSize
                | ErrorCode::MissingSource
                | ErrorCode::InvalidHorizon
                | ErrorCode::InvalidConfig
        )
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingPageSize => "created dataset without pageSize",
            ErrorCode::MissingSource => "created dataset without fetch()",
            ErrorCode::InvalidHorizon => "created dataset with unloadHorizon less than loadHorizon",
            ErrorCode::InvalidConfig => "The dataset configuration could not be parsed.",
            ErrorCode::InvalidTransition => "The page cannot make this state transition.",
            ErrorCode::NoRuntime => "A dataset must be built inside a tokio runtime.",
            ErrorCode::Io => "An I/O error occurred.",
        }
    }
}

/// Dataset error with code and message.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct DatasetError {
    pub code: ErrorCode,
    pub message: String,
}

impl DatasetError {
    /// Creates a new dataset error with the given code and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.default_message().to_string(),
            code,
        }
    }

    /// Creates a new dataset error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        DatasetError::with_message(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        DatasetError::with_message(
            ErrorCode::InvalidConfig,
            format!("Failed to parse dataset config: {}", err),
        )
    }
}

/// Result type alias for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
