//! Active-instance resolution and evaluation dispatch.

use tracing::{debug, info, warn};

use rulegrid_backend::{EvaluationOutcome, Fact, RuleServerClient};
use rulegrid_core::{RuleServerConfig, RulesetIdentity};
use rulegrid_health::HealthMonitor;
use rulegrid_registry::RegistryStore;

use crate::error::{RoutingError, RoutingResult};

/// Path segment that precedes the ruleset identifier in rule-server paths.
const CONTAINERS_SEGMENT: &str = "containers";

/// Routes evaluation traffic to dedicated instances, falling back to the
/// shared rule server for path-based routing.
#[derive(Clone)]
pub struct RequestRouter {
    store: RegistryStore,
    monitor: HealthMonitor,
    rule_server: RuleServerConfig,
    /// Base URL of the shared fallback server (config URL minus REST path).
    shared_endpoint: String,
}

impl RequestRouter {
    pub fn new(store: RegistryStore, monitor: HealthMonitor, rule_server: RuleServerConfig) -> Self {
        let trimmed = rule_server.url.trim_end_matches('/');
        let shared_endpoint = trimmed
            .strip_suffix(rulegrid_backend::SERVER_REST_PATH)
            .unwrap_or(trimmed)
            .to_string();
        Self {
            store,
            monitor,
            rule_server,
            shared_endpoint,
        }
    }

    /// Endpoint of the shared fallback rule server.
    pub fn shared_endpoint(&self) -> &str {
        &self.shared_endpoint
    }

    /// Resolve the endpoint serving an identity.
    ///
    /// A cached `running`/`healthy` row answers immediately. Anything else
    /// gets one just-in-time probe; only a confirmed-unroutable instance is
    /// an error.
    pub async fn resolve(&self, identity: &RulesetIdentity) -> RoutingResult<String> {
        let instance = self
            .store
            .get_active(identity)?
            .ok_or_else(|| RoutingError::NotDeployed(identity.ruleset_id()))?;

        if instance.looks_healthy() {
            debug!(%identity, endpoint = %instance.endpoint, "resolved from cache");
            return Ok(instance.endpoint);
        }

        let refreshed = self.monitor.reconcile(&instance).await;
        if refreshed.looks_healthy() {
            info!(
                %identity,
                endpoint = %refreshed.endpoint,
                "instance recovered on just-in-time probe"
            );
            return Ok(refreshed.endpoint);
        }

        Err(RoutingError::Unavailable {
            container_name: refreshed.container_name,
            status: refreshed.status,
            health: refreshed.health,
        })
    }

    /// Resolve the endpoint for a raw rule-server request path.
    ///
    /// The segment after `containers` is the ruleset identifier. Any
    /// extraction or resolution failure falls back to the shared endpoint;
    /// this path never errors.
    pub async fn resolve_path(&self, path: &str) -> String {
        let Some(identity) = extract_identity(path) else {
            warn!(fallback = true, path, "no ruleset identity in path");
            return self.shared_endpoint.clone();
        };

        match self.resolve(&identity).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(
                    fallback = true,
                    %identity,
                    reason = %e,
                    "routing to shared rule server"
                );
                self.shared_endpoint.clone()
            }
        }
    }

    /// Resolve and fire rules against the identity's execution context.
    pub async fn evaluate(
        &self,
        identity: &RulesetIdentity,
        facts: &[Fact],
    ) -> RoutingResult<EvaluationOutcome> {
        let endpoint = self.resolve(identity).await?;
        let client = RuleServerClient::for_instance(
            &endpoint,
            &self.rule_server.username,
            &self.rule_server.password,
        );
        let outcome = client.evaluate(&identity.ruleset_id(), facts).await?;
        debug!(
            %identity,
            rules_fired = outcome.rules_fired,
            "evaluation dispatched"
        );
        Ok(outcome)
    }
}

/// Pull the ruleset identity out of a rule-server request path.
fn extract_identity(path: &str) -> Option<RulesetIdentity> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == CONTAINERS_SEGMENT {
            // Evaluation paths insert `instances` between `containers` and
            // the ruleset id.
            let candidate = match segments.next()? {
                "instances" => segments.next()?,
                other => other,
            };
            return RulesetIdentity::from_ruleset_id(candidate);
        }
    }
    None
}
