//! RegistryStore — redb-backed persistence for runtime instances.
//!
//! The store is the single source of truth for which runtime instance
//! serves each ruleset. It guarantees at most one active instance per
//! identity: registration deactivates the previous active row and inserts
//! the replacement inside one write transaction.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info, warn};

use rulegrid_core::{epoch_secs, HealthState, LifecycleStatus, Platform, RulesetIdentity};

use crate::error::{RegistryError, RegistryResult};
use crate::tables::{instance_key, ACTIVE, HISTORY, INSTANCES, PORTS};
use crate::types::*;

/// Convert any `Display` error into a `RegistryError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| RegistryError::$variant(e.to_string())
    };
}

/// Thread-safe registry store backed by redb.
#[derive(Clone)]
pub struct RegistryStore {
    db: Arc<Database>,
}

impl RegistryStore {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let db = Database::create(path).map_err(map_err!(Unavailable))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "registry store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory registry (for testing).
    pub fn open_in_memory() -> RegistryResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Unavailable))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory registry store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
        txn.open_table(ACTIVE).map_err(map_err!(Unavailable))?;
        txn.open_table(HISTORY).map_err(map_err!(Unavailable))?;
        txn.open_table(PORTS).map_err(map_err!(Unavailable))?;
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(())
    }

    // ── Registration ───────────────────────────────────────────────

    /// Register a freshly provisioned instance as the active one for its
    /// identity.
    ///
    /// Atomic: the previous active row (if any) is deactivated
    /// (`is_active = false`, `status = stopped`, `stopped_at = now`) and the
    /// new row inserted with `version = old.version + 1` in the same write
    /// transaction. A port reservation held for the new instance is
    /// consumed here.
    ///
    /// The new row starts in `deploying`/`unknown`; the health monitor
    /// promotes it to `running`/`healthy` once the instance answers probes.
    pub fn register(&self, new: NewInstance) -> RegistryResult<RuntimeInstance> {
        let now = epoch_secs();
        let identity_key = new.identity.table_key();

        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let instance;
        {
            let mut instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
            let mut active = txn.open_table(ACTIVE).map_err(map_err!(Unavailable))?;
            let mut ports = txn.open_table(PORTS).map_err(map_err!(Unavailable))?;

            // Deactivate the previous active row for this identity.
            let prior_key = active
                .get(identity_key.as_str())
                .map_err(map_err!(Unavailable))?
                .map(|g| g.value().to_string());

            let mut version = 1;
            if let Some(prior_key) = prior_key {
                let prior_bytes = instances
                    .get(prior_key.as_str())
                    .map_err(map_err!(Unavailable))?
                    .map(|g| g.value().to_vec());
                if let Some(bytes) = prior_bytes {
                    let mut old: RuntimeInstance =
                        serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                    version = old.version + 1;
                    old.is_active = false;
                    old.status = LifecycleStatus::Stopped;
                    old.stopped_at = Some(now);
                    old.updated_at = now;
                    let encoded = serde_json::to_vec(&old).map_err(map_err!(Serialize))?;
                    instances
                        .insert(prior_key.as_str(), encoded.as_slice())
                        .map_err(map_err!(Unavailable))?;
                }
            }

            instance = RuntimeInstance {
                identity: new.identity,
                container_name: new.container_name,
                platform: new.platform,
                endpoint: new.endpoint,
                port: new.port,
                status: LifecycleStatus::Deploying,
                health: HealthState::Unknown,
                last_checked: None,
                failure_reason: None,
                version,
                is_active: true,
                document_hash: new.document_hash,
                source_document_uri: None,
                artifact_uri: None,
                rule_source_uri: None,
                decision_table_uri: None,
                created_at: now,
                updated_at: now,
                stopped_at: None,
            };

            let row_key = instance_key(&instance.container_name, version);
            let encoded = serde_json::to_vec(&instance).map_err(map_err!(Serialize))?;
            instances
                .insert(row_key.as_str(), encoded.as_slice())
                .map_err(map_err!(Unavailable))?;
            active
                .insert(identity_key.as_str(), row_key.as_str())
                .map_err(map_err!(Unavailable))?;

            // The port is now visible through the active row.
            if let Some(port) = instance.port {
                ports.remove(port).map_err(map_err!(Unavailable))?;
            }
        }
        txn.commit().map_err(map_err!(Unavailable))?;

        info!(
            identity = %instance.identity,
            container = %instance.container_name,
            version = instance.version,
            "instance registered"
        );
        Ok(instance)
    }

    // ── Lookups ────────────────────────────────────────────────────

    /// Get the currently active instance for an identity, or None.
    pub fn get_active(&self, identity: &RulesetIdentity) -> RegistryResult<Option<RuntimeInstance>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let active = txn.open_table(ACTIVE).map_err(map_err!(Unavailable))?;
        let row_key = match active
            .get(identity.table_key().as_str())
            .map_err(map_err!(Unavailable))?
        {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };
        let instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
        match instances.get(row_key.as_str()).map_err(map_err!(Unavailable))? {
            Some(guard) => {
                let instance: RuntimeInstance =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                // Deactivated rows can linger in the index briefly after a
                // teardown; treat them as absent.
                Ok(instance.is_active.then_some(instance))
            }
            None => Ok(None),
        }
    }

    /// Get the newest row for a container name, active or not.
    pub fn get_current(&self, container_name: &str) -> RegistryResult<Option<RuntimeInstance>> {
        let prefix = format!("{container_name}@");
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
        let mut newest: Option<RuntimeInstance> = None;
        for entry in instances.iter().map_err(map_err!(Unavailable))? {
            let (key, value) = entry.map_err(map_err!(Unavailable))?;
            if key.value().starts_with(&prefix) {
                let instance: RuntimeInstance =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                newest = Some(instance);
            }
        }
        Ok(newest)
    }

    /// List instances matching a filter, newest-first.
    pub fn list(&self, filter: &InstanceFilter) -> RegistryResult<Vec<RuntimeInstance>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
        let mut results = Vec::new();
        for entry in instances.iter().map_err(map_err!(Unavailable))? {
            let (_, value) = entry.map_err(map_err!(Unavailable))?;
            let instance: RuntimeInstance =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if filter.matches(&instance) {
                results.push(instance);
            }
        }
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.version.cmp(&a.version)));
        Ok(results)
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Load the newest row for `container_name`, apply `f`, stamp
    /// `updated_at`, and write it back in one transaction.
    fn mutate_current<F>(&self, container_name: &str, f: F) -> RegistryResult<RuntimeInstance>
    where
        F: FnOnce(&mut RuntimeInstance),
    {
        let prefix = format!("{container_name}@");
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let instance;
        {
            let mut instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
            let mut newest: Option<(String, Vec<u8>)> = None;
            for entry in instances.iter().map_err(map_err!(Unavailable))? {
                let (key, value) = entry.map_err(map_err!(Unavailable))?;
                if key.value().starts_with(&prefix) {
                    newest = Some((key.value().to_string(), value.value().to_vec()));
                }
            }
            let (row_key, bytes) = newest
                .ok_or_else(|| RegistryError::NotFound(container_name.to_string()))?;
            let mut row: RuntimeInstance =
                serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
            f(&mut row);
            row.updated_at = epoch_secs();
            let encoded = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
            instances
                .insert(row_key.as_str(), encoded.as_slice())
                .map_err(map_err!(Unavailable))?;
            instance = row;
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(instance)
    }

    /// Partially update status/health on the newest row for a container.
    ///
    /// Only supplied fields are overwritten. `last_checked` is always
    /// stamped. A `stopped` status also deactivates the row and stamps
    /// `stopped_at`.
    pub fn update_status(
        &self,
        container_name: &str,
        status: LifecycleStatus,
        health: Option<HealthState>,
        reason: Option<String>,
    ) -> RegistryResult<RuntimeInstance> {
        self.mutate_current(container_name, |instance| {
            instance.status = status;
            if let Some(health) = health {
                instance.health = health;
            }
            if let Some(reason) = reason {
                instance.failure_reason = Some(reason);
            }
            instance.last_checked = Some(epoch_secs());
            if status == LifecycleStatus::Stopped {
                instance.is_active = false;
                instance.stopped_at = Some(epoch_secs());
            }
        })
    }

    /// Partially update durable-storage artifact URIs on the newest row.
    pub fn update_artifacts(
        &self,
        container_name: &str,
        uris: ArtifactUris,
    ) -> RegistryResult<RuntimeInstance> {
        self.mutate_current(container_name, |instance| {
            if let Some(uri) = uris.source_document_uri {
                instance.source_document_uri = Some(uri);
            }
            if let Some(uri) = uris.artifact_uri {
                instance.artifact_uri = Some(uri);
            }
            if let Some(uri) = uris.rule_source_uri {
                instance.rule_source_uri = Some(uri);
            }
            if let Some(uri) = uris.decision_table_uri {
                instance.decision_table_uri = Some(uri);
            }
        })
    }

    /// Soft-delete the active instance for an identity. Returns the
    /// deactivated row, or None when there was nothing active.
    pub fn deactivate(&self, identity: &RulesetIdentity) -> RegistryResult<Option<RuntimeInstance>> {
        let Some(instance) = self.get_active(identity)? else {
            return Ok(None);
        };
        let updated = self.update_status(
            &instance.container_name,
            LifecycleStatus::Stopped,
            None,
            None,
        )?;
        // Drop the index entry so lookups stop resolving the stopped row.
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        {
            let mut active = txn.open_table(ACTIVE).map_err(map_err!(Unavailable))?;
            active
                .remove(identity.table_key().as_str())
                .map_err(map_err!(Unavailable))?;
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(Some(updated))
    }

    /// Physically delete every row for a container name. Administrative
    /// teardown only; normal lifecycle uses soft deletion. Returns the
    /// number of rows removed.
    pub fn remove(&self, container_name: &str) -> RegistryResult<u32> {
        let prefix = format!("{container_name}@");
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
            let instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
            instances
                .iter()
                .map_err(map_err!(Unavailable))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect()
        };

        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let count = keys.len() as u32;
        {
            let mut instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
            let mut active = txn.open_table(ACTIVE).map_err(map_err!(Unavailable))?;
            for key in &keys {
                let removed = instances
                    .remove(key.as_str())
                    .map_err(map_err!(Unavailable))?;
                if let Some(guard) = removed {
                    let instance: RuntimeInstance = serde_json::from_slice(guard.value())
                        .map_err(map_err!(Deserialize))?;
                    if instance.is_active {
                        active
                            .remove(instance.identity.table_key().as_str())
                            .map_err(map_err!(Unavailable))?;
                    }
                }
            }
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        debug!(container = container_name, rows = count, "instance rows removed");
        Ok(count)
    }

    // ── Port allocation ────────────────────────────────────────────

    /// Reserve the lowest free host port ≥ `base` for `container_name`.
    ///
    /// Ports held by active instances and outstanding reservations are both
    /// skipped. The scan and the reservation insert share one write
    /// transaction, so two concurrent allocations cannot hand out the same
    /// port.
    pub fn allocate_port(&self, base: u16, container_name: &str) -> RegistryResult<u16> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let port;
        {
            let instances = txn.open_table(INSTANCES).map_err(map_err!(Unavailable))?;
            let mut taken: Vec<u16> = Vec::new();
            for entry in instances.iter().map_err(map_err!(Unavailable))? {
                let (_, value) = entry.map_err(map_err!(Unavailable))?;
                let instance: RuntimeInstance =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if instance.is_active {
                    if let Some(p) = instance.port {
                        taken.push(p);
                    }
                }
            }

            let mut ports = txn.open_table(PORTS).map_err(map_err!(Unavailable))?;
            let mut candidate = base;
            loop {
                let reserved = ports
                    .get(candidate)
                    .map_err(map_err!(Unavailable))?
                    .is_some();
                if !reserved && !taken.contains(&candidate) {
                    break;
                }
                candidate = candidate
                    .checked_add(1)
                    .ok_or(RegistryError::PortSpaceExhausted { base })?;
            }
            ports
                .insert(candidate, container_name)
                .map_err(map_err!(Unavailable))?;
            port = candidate;
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        debug!(container = container_name, port, "port reserved");
        Ok(port)
    }

    /// Release a reservation that will not be consumed (failed provision).
    pub fn release_port(&self, port: u16) -> RegistryResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        {
            let mut ports = txn.open_table(PORTS).map_err(map_err!(Unavailable))?;
            ports.remove(port).map_err(map_err!(Unavailable))?;
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(())
    }

    // ── Deployment history ─────────────────────────────────────────

    /// Append an audit record. Records are never mutated afterwards.
    pub fn append_history(&self, record: &DeploymentRecord) -> RegistryResult<u64> {
        let encoded = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let seq;
        {
            let mut history = txn.open_table(HISTORY).map_err(map_err!(Unavailable))?;
            seq = history
                .last()
                .map_err(map_err!(Unavailable))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(0);
            history
                .insert(seq, encoded.as_slice())
                .map_err(map_err!(Unavailable))?;
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(seq)
    }

    /// Deployment history for one container, newest-first.
    pub fn history_for(
        &self,
        container_name: &str,
        limit: usize,
    ) -> RegistryResult<Vec<DeploymentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let history = txn.open_table(HISTORY).map_err(map_err!(Unavailable))?;
        let mut results = Vec::new();
        for entry in history.iter().map_err(map_err!(Unavailable))? {
            let (_, value) = entry.map_err(map_err!(Unavailable))?;
            let record: DeploymentRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.container_name == container_name {
                results.push(record);
            }
        }
        results.reverse();
        results.truncate(limit);
        Ok(results)
    }

    // ── Legacy import ──────────────────────────────────────────────

    /// One-time import of a legacy JSON-file registry.
    ///
    /// The file maps ruleset id → `{container_name, platform, endpoint,
    /// port, status}`. The file is read once and never written back;
    /// entries that cannot be parsed are skipped with a warning. Returns
    /// the number of rows imported.
    pub fn import_registry_file(&self, path: &Path) -> RegistryResult<usize> {
        let raw = std::fs::read_to_string(path).map_err(map_err!(Import))?;
        let parsed: serde_json::Value =
            serde_json::from_str(&raw).map_err(map_err!(Import))?;
        let Some(entries) = parsed.as_object() else {
            return Err(RegistryError::Import("expected a top-level object".into()));
        };

        let mut imported = 0;
        for (ruleset_id, entry) in entries {
            let Some(identity) = RulesetIdentity::from_ruleset_id(ruleset_id) else {
                warn!(ruleset_id, "skipping legacy entry with unparseable id");
                continue;
            };
            let Some(endpoint) = entry.get("endpoint").and_then(|v| v.as_str()) else {
                warn!(ruleset_id, "skipping legacy entry without endpoint");
                continue;
            };
            let container_name = entry
                .get("container_name")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| identity.container_name());
            let platform = match entry.get("platform").and_then(|v| v.as_str()) {
                Some("docker") | Some("container-engine") => Platform::ContainerEngine,
                Some("kubernetes") | Some("orchestrated-cluster") => Platform::OrchestratedCluster,
                _ => Platform::Unmanaged,
            };
            let port = entry
                .get("port")
                .and_then(|v| v.as_u64())
                .and_then(|p| u16::try_from(p).ok());

            self.register(NewInstance {
                identity,
                container_name,
                platform,
                endpoint: endpoint.to_string(),
                port,
                document_hash: None,
            })?;
            imported += 1;
        }
        info!(?path, imported, "legacy registry imported");
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_instance(tenant: &str, policy: &str, port: Option<u16>) -> NewInstance {
        let identity = RulesetIdentity::new(tenant, policy);
        NewInstance {
            container_name: identity.container_name(),
            identity,
            platform: Platform::ContainerEngine,
            endpoint: format!("http://{tenant}-{policy}:8080"),
            port,
            document_hash: None,
        }
    }

    #[test]
    fn register_starts_at_version_one() {
        let store = RegistryStore::open_in_memory().unwrap();
        let instance = store.register(new_instance("chase", "auto", Some(8081))).unwrap();
        assert_eq!(instance.version, 1);
        assert!(instance.is_active);
        assert_eq!(instance.status, LifecycleStatus::Deploying);
        assert_eq!(instance.health, HealthState::Unknown);
    }

    #[test]
    fn register_deactivates_previous_and_bumps_version() {
        let store = RegistryStore::open_in_memory().unwrap();
        let identity = RulesetIdentity::new("chase", "auto");
        store.register(new_instance("chase", "auto", Some(8081))).unwrap();
        let second = store.register(new_instance("chase", "auto", Some(8081))).unwrap();

        assert_eq!(second.version, 2);

        let active = store.get_active(&identity).unwrap().unwrap();
        assert_eq!(active.version, 2);

        // Exactly one active row for the identity, old row stopped.
        let all = store.list(&InstanceFilter::default()).unwrap();
        let active_rows: Vec<_> = all.iter().filter(|i| i.is_active).collect();
        assert_eq!(active_rows.len(), 1);
        let old = all.iter().find(|i| i.version == 1).unwrap();
        assert!(!old.is_active);
        assert_eq!(old.status, LifecycleStatus::Stopped);
        assert!(old.stopped_at.is_some());
    }

    #[test]
    fn at_most_one_active_after_many_registrations() {
        let store = RegistryStore::open_in_memory().unwrap();
        let identity = RulesetIdentity::new("chase", "auto");
        for _ in 0..5 {
            store.register(new_instance("chase", "auto", None)).unwrap();
        }
        let active: Vec<_> = store
            .list(&InstanceFilter { active_only: true, ..Default::default() })
            .unwrap()
            .into_iter()
            .filter(|i| i.identity == identity)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version, 5);
    }

    #[test]
    fn identities_are_independent() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.register(new_instance("chase", "auto", None)).unwrap();
        store.register(new_instance("wells", "home", None)).unwrap();

        let chase = store.get_active(&RulesetIdentity::new("chase", "auto")).unwrap();
        let wells = store.get_active(&RulesetIdentity::new("wells", "home")).unwrap();
        assert!(chase.is_some());
        assert!(wells.is_some());
        assert_eq!(chase.unwrap().version, 1);
        assert_eq!(wells.unwrap().version, 1);
    }

    #[test]
    fn get_active_returns_none_for_unknown_identity() {
        let store = RegistryStore::open_in_memory().unwrap();
        let missing = store.get_active(&RulesetIdentity::new("nobody", "nothing")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn update_status_is_partial() {
        let store = RegistryStore::open_in_memory().unwrap();
        let instance = store.register(new_instance("chase", "auto", None)).unwrap();

        // Status only — health untouched.
        let updated = store
            .update_status(&instance.container_name, LifecycleStatus::Running, None, None)
            .unwrap();
        assert_eq!(updated.status, LifecycleStatus::Running);
        assert_eq!(updated.health, HealthState::Unknown);
        assert!(updated.last_checked.is_some());
        assert!(updated.failure_reason.is_none());

        // Health + reason.
        let updated = store
            .update_status(
                &instance.container_name,
                LifecycleStatus::Unhealthy,
                Some(HealthState::Unhealthy),
                Some("probe timed out".into()),
            )
            .unwrap();
        assert_eq!(updated.health, HealthState::Unhealthy);
        assert_eq!(updated.failure_reason.as_deref(), Some("probe timed out"));
    }

    #[test]
    fn stopped_status_deactivates_row() {
        let store = RegistryStore::open_in_memory().unwrap();
        let instance = store.register(new_instance("chase", "auto", None)).unwrap();
        let updated = store
            .update_status(&instance.container_name, LifecycleStatus::Stopped, None, None)
            .unwrap();
        assert!(!updated.is_active);
        assert!(updated.stopped_at.is_some());
    }

    #[test]
    fn unhealthy_probe_is_visible_through_get_active() {
        let store = RegistryStore::open_in_memory().unwrap();
        let identity = RulesetIdentity::new("chase", "auto");
        let instance = store.register(new_instance("chase", "auto", None)).unwrap();

        store
            .update_status(
                &instance.container_name,
                LifecycleStatus::Unhealthy,
                Some(HealthState::Unhealthy),
                None,
            )
            .unwrap();

        let seen = store.get_active(&identity).unwrap().unwrap();
        assert_eq!(seen.health, HealthState::Unhealthy);
        assert_eq!(seen.status, LifecycleStatus::Unhealthy);
    }

    #[test]
    fn update_status_unknown_container_is_not_found() {
        let store = RegistryStore::open_in_memory().unwrap();
        let err = store
            .update_status("drools-ghost", LifecycleStatus::Running, None, None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn update_artifacts_merges_uris() {
        let store = RegistryStore::open_in_memory().unwrap();
        let instance = store.register(new_instance("chase", "auto", None)).unwrap();

        store
            .update_artifacts(
                &instance.container_name,
                ArtifactUris {
                    artifact_uri: Some("store://chase/auto/v1/rules.jar".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let updated = store
            .update_artifacts(
                &instance.container_name,
                ArtifactUris {
                    rule_source_uri: Some("store://chase/auto/v1/rules.drl".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(
            updated.artifact_uri.as_deref(),
            Some("store://chase/auto/v1/rules.jar")
        );
        assert_eq!(
            updated.rule_source_uri.as_deref(),
            Some("store://chase/auto/v1/rules.drl")
        );
    }

    #[test]
    fn deactivate_clears_active_lookup() {
        let store = RegistryStore::open_in_memory().unwrap();
        let identity = RulesetIdentity::new("chase", "auto");
        store.register(new_instance("chase", "auto", None)).unwrap();

        let deactivated = store.deactivate(&identity).unwrap();
        assert!(deactivated.is_some());
        assert!(store.get_active(&identity).unwrap().is_none());

        // Second deactivate is a no-op.
        assert!(store.deactivate(&identity).unwrap().is_none());
    }

    #[test]
    fn remove_deletes_all_versions() {
        let store = RegistryStore::open_in_memory().unwrap();
        let identity = RulesetIdentity::new("chase", "auto");
        store.register(new_instance("chase", "auto", None)).unwrap();
        store.register(new_instance("chase", "auto", None)).unwrap();

        let removed = store.remove(&identity.container_name()).unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_active(&identity).unwrap().is_none());
        assert!(store.list(&InstanceFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn allocated_ports_are_distinct_and_at_least_base() {
        let store = RegistryStore::open_in_memory().unwrap();
        let mut ports = Vec::new();
        for i in 0..4 {
            ports.push(store.allocate_port(8081, &format!("drools-c{i}")).unwrap());
        }
        for port in &ports {
            assert!(*port >= 8081);
        }
        let mut dedup = ports.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), ports.len());
    }

    #[test]
    fn allocation_skips_ports_of_active_instances() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.register(new_instance("chase", "auto", Some(8081))).unwrap();
        let port = store.allocate_port(8081, "drools-other").unwrap();
        assert_eq!(port, 8082);
    }

    #[test]
    fn released_port_is_reusable() {
        let store = RegistryStore::open_in_memory().unwrap();
        let port = store.allocate_port(8081, "drools-a").unwrap();
        store.release_port(port).unwrap();
        let again = store.allocate_port(8081, "drools-b").unwrap();
        assert_eq!(port, again);
    }

    #[test]
    fn registration_consumes_reservation() {
        let store = RegistryStore::open_in_memory().unwrap();
        let identity = RulesetIdentity::new("chase", "auto");
        let port = store.allocate_port(8081, &identity.container_name()).unwrap();
        store.register(new_instance("chase", "auto", Some(port))).unwrap();

        // The port stays taken via the active row, not the reservation.
        let next = store.allocate_port(8081, "drools-other").unwrap();
        assert_eq!(next, 8082);
    }

    #[test]
    fn history_is_append_only_and_newest_first() {
        let store = RegistryStore::open_in_memory().unwrap();
        let identity = RulesetIdentity::new("chase", "auto");
        for (version, action) in [
            (1, DeploymentAction::Deployed),
            (2, DeploymentAction::Updated),
            (2, DeploymentAction::Stopped),
        ] {
            store
                .append_history(&DeploymentRecord {
                    container_name: identity.container_name(),
                    identity: identity.clone(),
                    action,
                    version,
                    platform: Platform::ContainerEngine,
                    endpoint: "http://x:8080".into(),
                    document_hash: None,
                    description: None,
                    actor: "system".into(),
                    created_at: epoch_secs(),
                })
                .unwrap();
        }

        let records = store.history_for(&identity.container_name(), 10).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].action, DeploymentAction::Stopped);
        assert_eq!(records[2].action, DeploymentAction::Deployed);

        let limited = store.history_for(&identity.container_name(), 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn list_filters_by_tenant_and_status() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.register(new_instance("chase", "auto", None)).unwrap();
        store.register(new_instance("wells", "home", None)).unwrap();
        store
            .update_status(
                &RulesetIdentity::new("chase", "auto").container_name(),
                LifecycleStatus::Running,
                Some(HealthState::Healthy),
                None,
            )
            .unwrap();

        let chase_only = store
            .list(&InstanceFilter { tenant: Some("chase".into()), ..Default::default() })
            .unwrap();
        assert_eq!(chase_only.len(), 1);

        let running = store
            .list(&InstanceFilter {
                status: Some(LifecycleStatus::Running),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].identity.tenant_id(), "chase");
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.redb");
        {
            let store = RegistryStore::open(&path).unwrap();
            store.register(new_instance("chase", "auto", Some(8081))).unwrap();
        }
        let store = RegistryStore::open(&path).unwrap();
        let active = store.get_active(&RulesetIdentity::new("chase", "auto")).unwrap();
        assert_eq!(active.unwrap().port, Some(8081));
    }

    #[test]
    fn imports_legacy_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container_registry.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "chase-auto-underwriting-rules": {
                    "platform": "docker",
                    "container_name": "drools-chase-auto-underwriting-rules",
                    "endpoint": "http://drools-chase-auto-underwriting-rules:8080",
                    "port": 8081,
                    "status": "running"
                },
                "broken entry": {"no": "endpoint"}
            })
            .to_string(),
        )
        .unwrap();

        let store = RegistryStore::open_in_memory().unwrap();
        let imported = store.import_registry_file(&path).unwrap();
        assert_eq!(imported, 1);

        let active = store
            .get_active(&RulesetIdentity::new("chase", "auto"))
            .unwrap()
            .unwrap();
        assert_eq!(active.port, Some(8081));
        assert_eq!(active.platform, Platform::ContainerEngine);
    }
}
