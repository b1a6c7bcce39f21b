//! Error types for health monitoring.

use thiserror::Error;

pub type HealthResult<T> = Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    /// A freshly provisioned instance never became healthy inside the
    /// provisioning window. The instance is left in place, marked failed,
    /// for inspection.
    #[error("instance '{container_name}' not healthy after {waited_secs}s")]
    ProvisionTimeout {
        container_name: String,
        waited_secs: u64,
    },

    #[error(transparent)]
    Registry(#[from] rulegrid_registry::RegistryError),
}
