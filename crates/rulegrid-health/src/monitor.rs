//! Health monitor — probe results become registry state transitions.
//!
//! Two entry points:
//!
//! - [`wait_until_healthy`] gates a fresh provisioning attempt: poll until
//!   the instance answers or the provisioning window closes, then persist
//!   the verdict.
//! - [`HealthMonitor`] reconciles already-registered instances, either one
//!   at a time (the router's just-in-time check) or in a background sweep.
//!
//! A reconcile persists exactly what the probe observed: one failed probe
//! marks the row unhealthy before anything else can read it, so a cached
//! "healthy" can never outlive the probe that contradicted it. The
//! per-instance tracker only paces the background sweep (backing off on
//! instances that stay down); it never softens the persisted state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use rulegrid_backend::{ProbeResult, RuntimeBackend};
use rulegrid_core::{HealthConfig, HealthState, LifecycleStatus};
use rulegrid_registry::{InstanceFilter, RegistryStore, RuntimeInstance};

use crate::checker::HealthTracker;
use crate::error::{HealthError, HealthResult};

/// Poll a freshly provisioned instance until it answers probes, then
/// promote it to `running`/`healthy` in the registry.
///
/// On timeout the instance is marked `failed` with the last probe's reason
/// and left in place for inspection; the caller decides whether to tear it
/// down.
pub async fn wait_until_healthy(
    store: &RegistryStore,
    backend: &dyn RuntimeBackend,
    instance: &RuntimeInstance,
    config: &HealthConfig,
) -> HealthResult<RuntimeInstance> {
    let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let deadline = Instant::now() + Duration::from_secs(config.provision_timeout_secs);

    let mut last_result = ProbeResult::Failed {
        reason: "never probed".into(),
    };
    loop {
        last_result = backend
            .probe(&instance.container_name, &instance.endpoint, probe_timeout)
            .await;
        if last_result.is_healthy() {
            let promoted = store.update_status(
                &instance.container_name,
                LifecycleStatus::Running,
                Some(HealthState::Healthy),
                None,
            )?;
            info!(
                container = %instance.container_name,
                endpoint = %instance.endpoint,
                "instance became healthy"
            );
            return Ok(promoted);
        }
        if Instant::now() + poll_interval > deadline {
            break;
        }
        debug!(
            container = %instance.container_name,
            result = ?last_result,
            "instance not ready, polling again"
        );
        tokio::time::sleep(poll_interval).await;
    }

    let reason = last_result
        .describe()
        .unwrap_or_else(|| "provisioning timed out".into());
    warn!(
        container = %instance.container_name,
        waited = config.provision_timeout_secs,
        reason = %reason,
        "instance never became healthy"
    );
    store.update_status(
        &instance.container_name,
        LifecycleStatus::Failed,
        Some(HealthState::Unhealthy),
        Some(reason),
    )?;
    Err(HealthError::ProvisionTimeout {
        container_name: instance.container_name.clone(),
        waited_secs: config.provision_timeout_secs,
    })
}

/// Per-instance sweep pacing: the tracker's backoff decides when the
/// background sweep probes this instance again.
struct SweepEntry {
    tracker: HealthTracker,
    next_due: Instant,
}

/// Reconciles registered instances against live probe results.
///
/// Clone-cheap; sweep pacing is shared behind a lock so the background
/// sweep and just-in-time checks see the same failure counts.
#[derive(Clone)]
pub struct HealthMonitor {
    store: RegistryStore,
    backend: Arc<dyn RuntimeBackend>,
    config: HealthConfig,
    trackers: Arc<RwLock<HashMap<String, SweepEntry>>>,
}

impl HealthMonitor {
    pub fn new(
        store: RegistryStore,
        backend: Arc<dyn RuntimeBackend>,
        config: HealthConfig,
    ) -> Self {
        Self {
            store,
            backend,
            config,
            trackers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Probe one instance and persist exactly what the probe observed.
    ///
    /// Returns the updated row. Registry write failures on this path are
    /// logged, not raised: a reconcile must never take the router down.
    pub async fn reconcile(&self, instance: &RuntimeInstance) -> RuntimeInstance {
        let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let result = self
            .backend
            .probe(&instance.container_name, &instance.endpoint, probe_timeout)
            .await;

        {
            let mut trackers = self.trackers.write().await;
            let entry = trackers
                .entry(instance.container_name.clone())
                .or_insert_with(|| SweepEntry {
                    tracker: HealthTracker::new(Duration::from_secs(
                        self.config.poll_interval_secs,
                    )),
                    next_due: Instant::now(),
                });
            entry.tracker.record(&result);
            entry.next_due = Instant::now() + entry.tracker.next_interval();
        }

        let (status, health) = match &result {
            ProbeResult::Healthy => (LifecycleStatus::Running, HealthState::Healthy),
            ProbeResult::Unhealthy { .. } | ProbeResult::Failed { .. } => {
                (LifecycleStatus::Unhealthy, HealthState::Unhealthy)
            }
        };

        match self.store.update_status(
            &instance.container_name,
            status,
            Some(health),
            result.describe(),
        ) {
            Ok(updated) => updated,
            Err(e) => {
                error!(
                    container = %instance.container_name,
                    error = %e,
                    "failed to persist health transition"
                );
                instance.clone()
            }
        }
    }

    /// Probe every active instance whose backoff window has elapsed.
    /// Returns how many were probed.
    pub async fn reconcile_all(&self) -> usize {
        let filter = InstanceFilter {
            active_only: true,
            ..Default::default()
        };
        let instances = match self.store.list(&filter) {
            Ok(list) => list,
            Err(e) => {
                error!(error = %e, "cannot list instances for health sweep");
                return 0;
            }
        };

        let mut probed = 0;
        for instance in &instances {
            let due = {
                let trackers = self.trackers.read().await;
                trackers
                    .get(&instance.container_name)
                    .is_none_or(|entry| Instant::now() >= entry.next_due)
            };
            if !due {
                debug!(container = %instance.container_name, "inside backoff, skipping");
                continue;
            }
            self.reconcile(instance).await;
            probed += 1;
        }
        probed
    }

    /// Background sweep loop. Runs until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        info!(interval_secs = self.config.poll_interval_secs, "health sweep started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let probed = self.reconcile_all().await;
                    debug!(probed, "health sweep pass complete");
                }
                _ = shutdown.changed() => {
                    info!("health sweep stopping");
                    break;
                }
            }
        }
    }

    /// Drop the sweep state for a removed instance.
    pub async fn forget(&self, container_name: &str) {
        self.trackers.write().await.remove(container_name);
    }
}
