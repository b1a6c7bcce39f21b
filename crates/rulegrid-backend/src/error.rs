//! Error types for runtime backends.

use thiserror::Error;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by runtime platform adapters.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A runtime resource with this name exists but the registry does not
    /// know about it. Refusing to adopt or replace it keeps us from
    /// clobbering something another system owns.
    #[error("runtime resource '{container_name}' exists but is not registered")]
    ProvisionConflict { container_name: String },

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("cluster API error: {0}")]
    Cluster(String),

    #[error("rule server error: {0}")]
    RuleServer(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}
