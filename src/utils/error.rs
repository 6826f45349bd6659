//! Error Handling Module
//!
//! Defines the error taxonomy for the recycle_edge library.
//! Uses thiserror for ergonomic error definitions.
//!
//! The serving path only ever produces three kinds of failure:
//! - `ArtifactLoad`: the model artifact is missing or corrupt (fatal at startup)
//! - `Preprocess`: the uploaded bytes are not a decodable image
//! - `ShapeMismatch`: the image cannot be brought to the artifact's input shape
//!
//! The remaining variants belong to the offline jobs (training, export) and
//! to the hardening around `classify` (timeouts).

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use crate::preprocess::InputShape;

/// Main error type for recycle_edge operations
#[derive(Error, Debug)]
pub enum EdgeError {
    /// The artifact file is missing, corrupt, or declares an unusable shape
    #[error("Failed to load artifact '{origin}': {reason}")]
    ArtifactLoad { origin: String, reason: String },

    /// The input bytes could not be decoded as an image
    #[error("Failed to preprocess image: {0}")]
    Preprocess(String),

    /// Decoded dimensions disagree with the artifact's expected input shape
    #[error("Input shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        expected: InputShape,
        actual: InputShape,
    },

    /// Classification did not finish within the configured bound
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    /// Error raised by the forward pass itself
    #[error("Inference error: {0}")]
    Inference(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error while quantizing or writing an artifact
    #[error("Export error: {0}")]
    Export(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EdgeError {
    /// Build an `ArtifactLoad` error for the given artifact origin (usually a path)
    pub fn artifact(origin: impl Display, reason: impl Into<String>) -> Self {
        EdgeError::ArtifactLoad {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the request input rather than the service
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EdgeError::Preprocess(_) | EdgeError::ShapeMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(err: serde_json::Error) -> Self {
        EdgeError::Serialization(err.to_string())
    }
}

/// Convenience Result type for recycle_edge operations
pub type Result<T> = std::result::Result<T, EdgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EdgeError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_artifact_error_names_origin() {
        let err = EdgeError::artifact("/models/missing.rclf", "file not found");
        let message = err.to_string();
        assert!(message.contains("missing.rclf"));
        assert!(message.contains("file not found"));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = EdgeError::ShapeMismatch {
            expected: InputShape::rgb(224, 224),
            actual: InputShape::rgb(10, 10),
        };
        assert_eq!(
            err.to_string(),
            "Input shape mismatch: expected 224x224x3, got 10x10x3"
        );
    }

    #[test]
    fn test_input_error_classification() {
        assert!(EdgeError::Preprocess("bad".into()).is_input_error());
        assert!(!EdgeError::Timeout(Duration::from_secs(1)).is_input_error());
        assert!(!EdgeError::artifact("x", "y").is_input_error());
    }
}
