//! Error types for request routing.

use thiserror::Error;

use rulegrid_core::{HealthState, LifecycleStatus};

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Error)]
pub enum RoutingError {
    /// No active instance is registered for this identity.
    #[error("no deployment for ruleset '{0}'")]
    NotDeployed(String),

    /// An instance exists but is not in a routable state, even after a
    /// fresh probe.
    #[error("instance '{container_name}' unavailable (status {status}, health {health})")]
    Unavailable {
        container_name: String,
        status: LifecycleStatus,
        health: HealthState,
    },

    #[error(transparent)]
    Registry(#[from] rulegrid_registry::RegistryError),

    #[error(transparent)]
    Evaluation(#[from] rulegrid_backend::BackendError),
}
