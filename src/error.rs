//! Error taxonomy for the OCR pipeline
//!
//! Only [`OcrError::Input`] is fatal to a run. Every other variant is produced
//! by a collaborator or a single stage and is contained where it occurs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised inside the pipeline and its collaborators
#[derive(Debug, Error)]
pub enum OcrError {
    /// Source image missing or undecodable
    #[error("cannot load image {path:?}: {reason}")]
    Input { path: PathBuf, reason: String },

    /// A recognition capability is not installed, not reachable or failed
    #[error("recognizer '{name}' unavailable: {reason}")]
    RecognizerUnavailable { name: String, reason: String },

    /// A preprocessing stage failed; the stage is skipped
    #[error("preprocessing step '{step}' failed: {reason}")]
    Transform { step: &'static str, reason: String },

    /// Super-resolution collaborator failed
    #[error("image enhancement failed: {0}")]
    Enhancement(String),

    /// External text-box detector failed
    #[error("text box detection failed: {0}")]
    Detection(String),

    /// Language-model corrector failed
    #[error("text correction failed: {0}")]
    Correction(String),

    /// Remote OCR service returned nothing usable
    #[error("remote OCR service error: {0}")]
    Remote(String),

    /// Model file or session problem
    #[error("model error: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OcrError {
    /// Shorthand for a recognizer that could not be used
    pub fn unavailable(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::RecognizerUnavailable {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ort::Error> for OcrError {
    fn from(err: ort::Error) -> Self {
        Self::Model(err.to_string())
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, OcrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_message_names_path() {
        let err = OcrError::Input {
            path: PathBuf::from("/tmp/missing.png"),
            reason: "not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("missing.png"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_unavailable_shorthand() {
        let err = OcrError::unavailable("tesseract-hin", "binary not found");
        match err {
            OcrError::RecognizerUnavailable { name, reason } => {
                assert_eq!(name, "tesseract-hin");
                assert_eq!(reason, "binary not found");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
