//! Error types for int8cal

use thiserror::Error;

/// Result type alias for int8cal operations
pub type Result<T> = std::result::Result<T, Error>;

/// int8cal error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle errors (device allocation and host-to-device copies)
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Calibration algorithm key is not one of the known selectors
    #[error("Unknown calibration algorithm: {key}")]
    UnknownAlgorithm {
        /// The key that failed to resolve
        key: String,
    },

    /// A scale override line carried a scale that is not a decimal number
    #[error("Invalid scale '{value}' on line {line}")]
    InvalidScale {
        /// 1-based line number in the source file
        line: usize,
        /// The offending scale text
        value: String,
    },

    /// Host batch does not match the declared input layout
    #[error("Batch shape mismatch: {message}")]
    BatchShape {
        /// Error message
        message: String,
    },

    /// Scale override file could not be read
    #[error("Could not load user calibration scale file {path}: {source}")]
    ScaleFile {
        /// Path of the scale file
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Config validation errors
    #[error("Invalid config: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Device selection or validation errors
    #[error("Device validation failed: {message}")]
    DeviceValidation {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create an UnknownAlgorithm error
    pub fn unknown_algorithm(key: impl Into<String>) -> Self {
        Self::UnknownAlgorithm { key: key.into() }
    }

    /// Create a BatchShape error
    pub fn batch_shape(message: impl Into<String>) -> Self {
        Self::BatchShape {
            message: message.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a DeviceValidation error
    pub fn device_validation(message: impl Into<String>) -> Self {
        Self::DeviceValidation {
            message: message.into(),
        }
    }
}
