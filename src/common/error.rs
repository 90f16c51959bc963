//! Error types for landmark_slam

use thiserror::Error;

use crate::common::types::LandmarkId;

/// Main error type for the estimator, ranking and metric operations
#[derive(Error, Debug)]
pub enum SlamError {
    /// Malformed control or measurement shape
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Metric inputs are misaligned
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    /// Marginal covariance could not be extracted
    #[error("Singular system: {0}")]
    SingularSystem(String),
    /// Operation invoked in the wrong estimator state
    #[error("Illegal state: {0}")]
    IllegalState(String),
    /// Measurement references an unregistered landmark id
    #[error("Unknown landmark: {0}")]
    UnknownLandmark(LandmarkId),
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
    /// Snapshot (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlamError {
    pub fn shape_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        SlamError::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl From<toml::de::Error> for SlamError {
    fn from(e: toml::de::Error) -> Self {
        SlamError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for SlamError {
    fn from(e: toml::ser::Error) -> Self {
        SlamError::Config(e.to_string())
    }
}

/// Result type alias for SLAM operations
pub type SlamResult<T> = Result<T, SlamError>;
