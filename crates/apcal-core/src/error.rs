//! Error types for the calibration library.
//!
//! Every failure the registry, loader, or model wrappers can surface is a
//! variant of [`ApcalError`]. Row-level invalidity (NaN features) is not an
//! error and never reaches this type.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the calibration library.
#[derive(Debug, Error)]
pub enum ApcalError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Model '{name}' is not defined in the configuration")]
    UnknownModel { name: String },

    #[error("Unknown repository type '{0}'")]
    UnknownRepository(String),

    // Input table errors
    /// Other tooling parses this message: names are comma-joined in manifest order.
    #[error("Missing features from input data: {}", .missing.join(","))]
    MissingFeatures { missing: Vec<String> },

    #[error("Missing label column from input data: {label}")]
    MissingLabel { label: String },

    #[error(
        "Your data does not contain positions. Please provide either Galactic latitude b, cosb, or ra+dec."
    )]
    MissingPosition,

    #[error("Model '{model}' has no sub-model for group '{key}'")]
    UnknownGroup { model: String, key: String },

    // Artifact errors
    #[error("Could not find the source of model {model}\n Expected: {path}")]
    ArtifactNotFound { model: String, path: PathBuf },

    #[error(
        "Model {model} ({path}) input file does not match the configuration. Expecting {expected}, got {actual}"
    )]
    IntegrityMismatch {
        model: String,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Model {model}: no callable artifact named '{artifact}' is registered")]
    UnknownCallable { model: String, artifact: String },

    #[error("Predictor for model {model} failed: {message}")]
    Predictor { model: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout: {message}")]
    Timeout { message: String },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed {
        url: String,
        message: String,
        retryable: bool,
    },

    // Table backend errors
    #[error("Table error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for calibration operations.
pub type Result<T> = std::result::Result<T, ApcalError>;

impl From<std::io::Error> for ApcalError {
    fn from(err: std::io::Error) -> Self {
        ApcalError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ApcalError {
    fn from(err: serde_json::Error) -> Self {
        ApcalError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ApcalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApcalError::Timeout {
                message: err.to_string(),
            }
        } else {
            ApcalError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl ApcalError {
    /// Create an IO error with path context.
    ///
    /// A `NotFound` IO error becomes [`ApcalError::FileNotFound`] so callers can
    /// tell a missing artifact apart from an unreadable one.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            return ApcalError::FileNotFound(path);
        }
        ApcalError::Io {
            message: err.to_string(),
            path: Some(path),
            source: Some(err),
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        ApcalError::Config {
            message: message.into(),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApcalError::Network { .. } | ApcalError::Timeout { .. } => true,
            ApcalError::DownloadFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// True when the error means a file is absent on disk.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApcalError::FileNotFound(_))
    }
}
