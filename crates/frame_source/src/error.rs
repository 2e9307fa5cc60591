//! Frame source error types

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

/// Frame source specific error
#[derive(Debug, Error)]
pub enum FrameSourceError {
    /// Recording manifest missing or malformed
    #[error("invalid recording manifest '{path}': {message}")]
    Manifest { path: PathBuf, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl FrameSourceError {
    pub fn manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<FrameSourceError> for ContractError {
    fn from(err: FrameSourceError) -> Self {
        match err {
            FrameSourceError::Contract(inner) => inner,
            FrameSourceError::Io(io) => ContractError::Io(io),
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, FrameSourceError>;
