//! Persisted domain types for the registry store.

use serde::{Deserialize, Serialize};

use rulegrid_core::{HealthState, LifecycleStatus, Platform, RulesetIdentity};

/// One live (or historical) rule-execution runtime instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeInstance {
    pub identity: RulesetIdentity,
    /// Name of the underlying runtime resource. Stable across versions of
    /// the same ruleset; unique together with `version`.
    pub container_name: String,
    pub platform: Platform,
    /// Base URL of the instance's rule-server REST endpoint.
    pub endpoint: String,
    /// Host port, only meaningful for the container-engine backend.
    pub port: Option<u16>,
    pub status: LifecycleStatus,
    pub health: HealthState,
    /// Unix timestamp of the last health probe that touched this row.
    pub last_checked: Option<u64>,
    /// Reason recorded alongside an unhealthy/failed status.
    pub failure_reason: Option<String>,
    /// Monotonically increasing; bumped on every successful redeployment.
    pub version: u32,
    pub is_active: bool,
    /// SHA-256 of the source policy document this ruleset was built from.
    pub document_hash: Option<String>,
    pub source_document_uri: Option<String>,
    pub artifact_uri: Option<String>,
    pub rule_source_uri: Option<String>,
    pub decision_table_uri: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub stopped_at: Option<u64>,
}

impl RuntimeInstance {
    /// Whether the cached row looks routable without a fresh probe.
    pub fn looks_healthy(&self) -> bool {
        self.status == LifecycleStatus::Running && self.health == HealthState::Healthy
    }
}

/// Input for registering a freshly provisioned instance.
///
/// Version, activation, and timestamps are assigned by the store inside the
/// registration transaction.
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub identity: RulesetIdentity,
    pub container_name: String,
    pub platform: Platform,
    pub endpoint: String,
    pub port: Option<u16>,
    pub document_hash: Option<String>,
}

/// Partial update of the durable-storage artifact URIs on a row.
#[derive(Debug, Clone, Default)]
pub struct ArtifactUris {
    pub source_document_uri: Option<String>,
    pub artifact_uri: Option<String>,
    pub rule_source_uri: Option<String>,
    pub decision_table_uri: Option<String>,
}

/// What happened in one deployment action. Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub container_name: String,
    pub identity: RulesetIdentity,
    pub action: DeploymentAction,
    pub version: u32,
    pub platform: Platform,
    pub endpoint: String,
    pub document_hash: Option<String>,
    pub description: Option<String>,
    pub actor: String,
    pub created_at: u64,
}

/// Audit action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    Deployed,
    Updated,
    Stopped,
    Restarted,
    Failed,
}

/// Filter for listing instances. All fields are optional conjuncts.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub tenant: Option<String>,
    pub policy_type: Option<String>,
    pub status: Option<LifecycleStatus>,
    pub active_only: bool,
}

impl InstanceFilter {
    pub fn matches(&self, instance: &RuntimeInstance) -> bool {
        if let Some(tenant) = &self.tenant {
            if instance.identity.tenant_id() != tenant {
                return false;
            }
        }
        if let Some(policy) = &self.policy_type {
            if instance.identity.policy_type_id() != policy {
                return false;
            }
        }
        if let Some(status) = self.status {
            if instance.status != status {
                return false;
            }
        }
        if self.active_only && !instance.is_active {
            return false;
        }
        true
    }
}
