//! Platform and lifecycle vocabulary shared across RuleGrid crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which runtime backend owns an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// A named container on a shared container-engine daemon.
    ContainerEngine,
    /// A Deployment + Service pair on an orchestrated cluster.
    OrchestratedCluster,
    /// Pre-existing resource RuleGrid routes to but does not manage.
    Unmanaged,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::ContainerEngine => "container-engine",
            Platform::OrchestratedCluster => "orchestrated-cluster",
            Platform::Unmanaged => "unmanaged",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a runtime instance. Exactly these five states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Deploying,
    Running,
    Stopped,
    Failed,
    Unhealthy,
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleStatus::Deploying => "deploying",
            LifecycleStatus::Running => "running",
            LifecycleStatus::Stopped => "stopped",
            LifecycleStatus::Failed => "failed",
            LifecycleStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Health as observed by probes, independent of lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Release identifier for a built rule artifact: group/artifact/version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseId {
    #[serde(rename = "group-id")]
    pub group_id: String,
    #[serde(rename = "artifact-id")]
    pub artifact_id: String,
    pub version: String,
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&LifecycleStatus::Deploying).unwrap(),
            "\"deploying\""
        );
        assert_eq!(
            serde_json::to_string(&HealthState::Unknown).unwrap(),
            "\"unknown\""
        );
    }

    #[test]
    fn platform_round_trips() {
        let p: Platform = serde_json::from_str("\"container-engine\"").unwrap();
        assert_eq!(p, Platform::ContainerEngine);
        assert_eq!(p.to_string(), "container-engine");
    }

    #[test]
    fn release_id_display() {
        let rel = ReleaseId {
            group_id: "com.underwriting".into(),
            artifact_id: "underwriting-rules".into(),
            version: "2".into(),
        };
        assert_eq!(rel.to_string(), "com.underwriting:underwriting-rules:2");
    }
}
