//! Error types for the registry store.

use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during registry operations.
///
/// `Unavailable` covers every storage-layer failure (open, transaction,
/// read, write): callers on the deployment path abort on it, callers on the
/// health-reconciliation path log and continue with cached state.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("no free port at or above {base}")]
    PortSpaceExhausted { base: u16 },

    #[error("legacy registry import failed: {0}")]
    Import(String),
}
