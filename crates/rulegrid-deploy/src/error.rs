//! Error types for the deployment pipeline.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Stage-level failures. The pipeline converts these into step reports;
/// they only propagate out of individual stage helpers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The external build tool failed, timed out, or was missing.
    #[error("build failed: {detail}")]
    Build { detail: String },

    /// The build succeeded but left no artifact where one was expected.
    #[error("built artifact not found under {0}")]
    MissingArtifact(String),

    #[error("workspace i/o: {0}")]
    Workspace(#[from] std::io::Error),

    #[error(transparent)]
    Backend(#[from] rulegrid_backend::BackendError),

    #[error(transparent)]
    Health(#[from] rulegrid_health::HealthError),

    #[error(transparent)]
    Registry(#[from] rulegrid_registry::RegistryError),

    #[error(transparent)]
    Artifact(#[from] rulegrid_artifacts::ArtifactError),
}
