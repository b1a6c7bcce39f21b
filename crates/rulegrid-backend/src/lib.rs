//! rulegrid-backend — runtime platform adapters.
//!
//! A [`RuntimeBackend`] turns an abstract "run this rule-server image under
//! this name" request into a concrete container (Docker Engine API over the
//! local Unix socket) or cluster workload (Kubernetes Deployment + Service).
//! Callers hold a `Arc<dyn RuntimeBackend>` chosen once at startup; nothing
//! above this crate branches on the platform.
//!
//! Health probing is also a backend concern: what "up" means differs per
//! platform (a container that is running and answering HTTP, a deployment
//! with a ready replica), so the trait carries a [`RuntimeBackend::probe`]
//! with platform-specific semantics behind the shared [`ProbeResult`].
//!
//! The [`ruleserver`] module speaks the rule server's own REST protocol
//! (deploying compiled rulesets into a running server and firing rules),
//! which is the same regardless of which backend hosts the server.

pub mod cluster;
pub mod engine;
pub mod error;
pub mod probe;
pub mod ruleserver;

use std::time::Duration;

use async_trait::async_trait;

use rulegrid_core::{Platform, RulesetIdentity};

pub use cluster::ClusterBackend;
pub use engine::EngineBackend;
pub use error::{BackendError, BackendResult};
pub use probe::{http_probe, ProbeResult};
pub use ruleserver::{EvaluationOutcome, Fact, RuleServerClient, ServerInfo, SERVER_REST_PATH};

/// Everything a backend needs to provision one rule-server instance.
#[derive(Debug, Clone)]
pub struct ProvisionSpec {
    pub identity: RulesetIdentity,
    /// Runtime resource name (container / deployment / service name).
    pub container_name: String,
    /// Rule-server image to run.
    pub image: String,
    /// Host port to publish (container-engine backend only).
    pub host_port: Option<u16>,
    /// Endpoint the registry already knows for this name, if any.
    ///
    /// When the backend finds a resource with this name already running,
    /// a known endpoint means "ours, reuse it"; no known endpoint means an
    /// unmanaged resource squatting on the name, which is a hard conflict.
    pub known_endpoint: Option<String>,
    /// Extra environment for the rule-server process.
    pub env: Vec<(String, String)>,
}

/// Outcome of a provision call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// A new runtime resource was created and started.
    Created { endpoint: String },
    /// A resource with this name was already running and is ours.
    Exists { endpoint: String },
}

impl Provisioned {
    pub fn endpoint(&self) -> &str {
        match self {
            Provisioned::Created { endpoint } | Provisioned::Exists { endpoint } => endpoint,
        }
    }
}

/// What teardown managed to clean up. Teardown never fails: a missing
/// resource is a success, and partial cleanup is reported, not raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// The resource existed and was removed.
    pub removed: bool,
    /// Non-fatal problems hit along the way.
    pub warnings: Vec<String>,
}

/// A runtime platform that can host rule-server instances.
#[async_trait]
pub trait RuntimeBackend: Send + Sync {
    /// Which platform this backend drives.
    fn platform(&self) -> Platform;

    /// Ensure a rule-server instance named `spec.container_name` is
    /// running, creating it if needed.
    ///
    /// Returns [`Provisioned::Exists`] when the resource already runs and
    /// the spec carries its known endpoint. A same-named resource with no
    /// known endpoint is [`BackendError::ProvisionConflict`].
    async fn provision(&self, spec: &ProvisionSpec) -> BackendResult<Provisioned>;

    /// Stop and remove the runtime resource with this name, if present.
    async fn teardown(&self, container_name: &str) -> TeardownReport;

    /// One short-timeout health probe of a provisioned instance.
    ///
    /// Container-engine: the container must be running AND its rule-server
    /// endpoint must answer HTTP. Orchestrated-cluster: the backing
    /// deployment must report at least one ready replica (checked through
    /// the API server, since pod endpoints only resolve in-cluster).
    async fn probe(&self, container_name: &str, endpoint: &str, timeout: Duration) -> ProbeResult;
}
