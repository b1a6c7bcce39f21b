//! Environment-driven configuration.
//!
//! All knobs are read once at daemon startup via [`OrchestratorConfig::from_env`]
//! and passed explicitly into the subsystems that need them. Defaults match a
//! local single-node development setup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Platform;

/// Configuration error — an environment variable holds an unusable value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level configuration for the orchestration daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Which runtime backend variant to construct at startup.
    pub platform: Platform,
    /// Whether each ruleset gets its own dedicated runtime instance.
    pub dedicated_instances: bool,
    pub engine: EngineConfig,
    pub cluster: ClusterConfig,
    pub rule_server: RuleServerConfig,
    pub build: BuildConfig,
    pub health: HealthConfig,
    pub artifacts: ArtifactConfig,
}

/// Container-engine backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the engine's unix socket.
    pub socket: String,
    /// Shared network all rule-server containers join.
    pub network: String,
    /// Image to run for each rule-server instance.
    pub image: String,
    /// Lowest host port handed out to dedicated instances.
    pub base_port: u16,
}

/// Orchestrated-cluster backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster API server base URL.
    pub api_url: String,
    /// Path to the bearer token file (service-account mount in-cluster).
    pub token_path: String,
    pub namespace: String,
    /// Service type for per-ruleset services (usually ClusterIP).
    pub service_type: String,
}

/// Credentials and location of the shared rule-execution server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleServerConfig {
    /// Full REST base URL of the shared (fallback) rule server.
    pub url: String,
    pub username: String,
    pub password: String,
}

/// External build-tool invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build tool binary, e.g. `mvn`.
    pub command: String,
    /// Wall-clock limit for one build invocation, in seconds.
    pub timeout_secs: u64,
}

/// Health-probe and provisioning-wait timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Timeout for a single probe, in seconds. Short by design.
    pub probe_timeout_secs: u64,
    /// Interval between polls while waiting for a fresh instance.
    pub poll_interval_secs: u64,
    /// Total wait before a provisioning attempt is declared dead.
    pub provision_timeout_secs: u64,
}

/// Durable artifact storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Local root for the filesystem store.
    pub root: String,
    /// Optional HTTP object-gateway base URL. When set, the gateway store
    /// is used instead of the filesystem store.
    pub endpoint: Option<String>,
    /// Shared secret for presigned download URLs.
    pub presign_secret: String,
    /// Presigned URL validity, in seconds.
    pub presign_expiry_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".into(),
            network: "underwriting-net".into(),
            image: "quay.io/kiegroup/kie-server-showcase:latest".into(),
            base_port: 8081,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: "https://kubernetes.default.svc".into(),
            token_path: "/var/run/secrets/kubernetes.io/serviceaccount/token".into(),
            namespace: "underwriting".into(),
            service_type: "ClusterIP".into(),
        }
    }
}

impl Default for RuleServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/kie-server/services/rest/server".into(),
            username: "kieserver".into(),
            password: "kieserver1!".into(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: "mvn".into(),
            timeout_secs: 300,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5,
            poll_interval_secs: 5,
            provision_timeout_secs: 120,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: "/var/lib/rulegrid/artifacts".into(),
            endpoint: None,
            presign_secret: "rulegrid-dev-secret".into(),
            presign_expiry_secs: 3600,
        }
    }
}

impl OrchestratorConfig {
    /// Load the full configuration from `RULEGRID_*` environment variables,
    /// falling back to development defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let platform = match env_or("RULEGRID_PLATFORM", "container-engine").as_str() {
            "container-engine" | "docker" => Platform::ContainerEngine,
            "orchestrated-cluster" | "kubernetes" => Platform::OrchestratedCluster,
            other => {
                return Err(ConfigError::Invalid {
                    key: "RULEGRID_PLATFORM",
                    value: other.to_string(),
                    reason: "expected container-engine or orchestrated-cluster".into(),
                });
            }
        };

        Ok(Self {
            platform,
            dedicated_instances: env_or("RULEGRID_DEDICATED_INSTANCES", "false") == "true",
            engine: EngineConfig {
                socket: env_or("RULEGRID_ENGINE_SOCKET", "/var/run/docker.sock"),
                network: env_or("RULEGRID_NETWORK", "underwriting-net"),
                image: env_or(
                    "RULEGRID_RUNTIME_IMAGE",
                    "quay.io/kiegroup/kie-server-showcase:latest",
                ),
                base_port: env_parse("RULEGRID_BASE_PORT", 8081)?,
            },
            cluster: ClusterConfig {
                api_url: env_or("RULEGRID_CLUSTER_API_URL", "https://kubernetes.default.svc"),
                token_path: env_or(
                    "RULEGRID_CLUSTER_TOKEN_PATH",
                    "/var/run/secrets/kubernetes.io/serviceaccount/token",
                ),
                namespace: env_or("RULEGRID_CLUSTER_NAMESPACE", "underwriting"),
                service_type: env_or("RULEGRID_CLUSTER_SERVICE_TYPE", "ClusterIP"),
            },
            rule_server: RuleServerConfig {
                url: env_or(
                    "RULEGRID_RULE_SERVER_URL",
                    "http://localhost:8080/kie-server/services/rest/server",
                ),
                username: env_or("RULEGRID_RULE_SERVER_USER", "kieserver"),
                password: env_or("RULEGRID_RULE_SERVER_PASSWORD", "kieserver1!"),
            },
            build: BuildConfig {
                command: env_or("RULEGRID_BUILD_COMMAND", "mvn"),
                timeout_secs: env_parse("RULEGRID_BUILD_TIMEOUT_SECS", 300)?,
            },
            health: HealthConfig {
                probe_timeout_secs: env_parse("RULEGRID_PROBE_TIMEOUT_SECS", 5)?,
                poll_interval_secs: env_parse("RULEGRID_POLL_INTERVAL_SECS", 5)?,
                provision_timeout_secs: env_parse("RULEGRID_PROVISION_TIMEOUT_SECS", 120)?,
            },
            artifacts: ArtifactConfig {
                root: env_or("RULEGRID_ARTIFACT_ROOT", "/var/lib/rulegrid/artifacts"),
                endpoint: std::env::var("RULEGRID_ARTIFACT_ENDPOINT").ok(),
                presign_secret: env_or("RULEGRID_ARTIFACT_SECRET", "rulegrid-dev-secret"),
                presign_expiry_secs: env_parse("RULEGRID_ARTIFACT_EXPIRY_SECS", 3600)?,
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
