//! Error taxonomy for the classification engine.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Coarse category of an engine failure, surfaced on every failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The model asset is missing, unreadable, or rejected by the runtime.
    /// Retried on the next classification.
    Asset,
    /// The model declares tensors the engine cannot drive (shape or element type).
    Format,
    /// Resampling, tensor packing, or inference failed for a single call.
    Runtime,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Asset => "asset",
            ErrorKind::Format => "format",
            ErrorKind::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("model asset {} could not be loaded: {reason}", .path.display())]
    Asset { path: PathBuf, reason: String },
    #[error("invalid model input format: {0}")]
    InvalidInput(String),
    #[error("invalid model output format: {0}")]
    InvalidOutput(String),
    #[error("classification failed: {0}")]
    Runtime(String),
}

impl EngineError {
    pub fn asset(path: &Path, reason: impl ToString) -> Self {
        EngineError::Asset {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        EngineError::InvalidInput(detail.into())
    }

    pub fn invalid_output(detail: impl Into<String>) -> Self {
        EngineError::InvalidOutput(detail.into())
    }

    pub fn runtime(detail: impl ToString) -> Self {
        EngineError::Runtime(detail.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Asset { .. } => ErrorKind::Asset,
            EngineError::InvalidInput(_) | EngineError::InvalidOutput(_) => ErrorKind::Format,
            EngineError::Runtime(_) => ErrorKind::Runtime,
        }
    }
}
