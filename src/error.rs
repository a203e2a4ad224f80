//! Error types for background removal operations

use crate::services::ProcessingStage;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model download failed (connection error, non-success HTTP status, truncated body)
    #[error("Model provisioning failed: {0}")]
    Provisioning(String),

    /// Downloaded model archive was empty or malformed
    #[error("Model archive extraction failed: {0}")]
    Archive(String),

    /// Input image could not be read or decoded
    #[error("Image decode error: {0}")]
    Decode(String),

    /// Engine load or execution failure, including tensor shape mismatches
    #[error("Inference error: {0}")]
    Inference(String),

    /// Output image could not be encoded or persisted
    #[error("Output error: {0}")]
    Output(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),

    /// An error annotated with the pipeline stage that produced it
    #[error("{stage} failed: {source}")]
    Stage {
        stage: ProcessingStage,
        #[source]
        source: Box<BgRemovalError>,
    },
}

impl BgRemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new output encode/write error
    pub fn output<S: Into<String>>(msg: S) -> Self {
        Self::Output(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a provisioning error from a network-level failure
    pub fn network_error<S: AsRef<str>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Provisioning(format!("{}: {}", context.as_ref(), error))
    }

    /// Create file I/O error with operation context, keeping the original error kind
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Wrap this error with the stage it was raised in.
    ///
    /// Already-annotated errors are returned unchanged so the innermost stage wins.
    #[must_use]
    pub fn in_stage(self, stage: ProcessingStage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage that produced this error, if it was annotated
    #[must_use]
    pub fn stage(&self) -> Option<ProcessingStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying cause with any stage annotation stripped
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this error came out of model provisioning
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        match self {
            Self::Stage { stage, source } => {
                *stage == ProcessingStage::Provisioning || source.is_provisioning()
            },
            Self::Provisioning(_) | Self::Archive(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = BgRemovalError::invalid_config("test config error");
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));

        let err = BgRemovalError::archive("zip is empty");
        assert!(matches!(err, BgRemovalError::Archive(_)));
        assert!(err.is_provisioning());
    }

    #[test]
    fn test_error_display() {
        let err = BgRemovalError::invalid_config("Invalid model path");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model path");

        let err = BgRemovalError::network_error("Failed to download model", "404 Not Found");
        assert_eq!(
            err.to_string(),
            "Model provisioning failed: Failed to download model: 404 Not Found"
        );
    }

    #[test]
    fn test_file_io_error_keeps_kind() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let path = Path::new("/models/u2net.onnx");
        let err = BgRemovalError::file_io_error("write model", path, &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write model"));
        assert!(error_string.contains("/models/u2net.onnx"));

        match err {
            BgRemovalError::Io(inner) => {
                assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
            },
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_stage_annotation() {
        let err = BgRemovalError::decode("not an image").in_stage(ProcessingStage::ImageLoading);
        assert_eq!(err.stage(), Some(ProcessingStage::ImageLoading));
        assert!(matches!(err.root_cause(), BgRemovalError::Decode(_)));
        assert!(err.to_string().starts_with("Loading input image failed"));
        assert!(!err.is_provisioning());

        // Re-annotating keeps the original stage
        let err = err.in_stage(ProcessingStage::FileSaving);
        assert_eq!(err.stage(), Some(ProcessingStage::ImageLoading));
    }

    #[test]
    fn test_io_error_during_provisioning_is_provisioning() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = BgRemovalError::from(io_error).in_stage(ProcessingStage::Provisioning);
        assert!(err.is_provisioning());
        assert!(matches!(err.root_cause(), BgRemovalError::Io(_)));
    }
}
