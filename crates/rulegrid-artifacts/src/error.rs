//! Error types for artifact storage.

use thiserror::Error;

pub type ArtifactResult<T> = Result<T, ArtifactError>;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("artifact storage i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact gateway: {0}")]
    Gateway(String),

    #[error("invalid artifact key: {0}")]
    InvalidKey(String),
}
