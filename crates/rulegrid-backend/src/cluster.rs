//! Orchestrated-cluster backend.
//!
//! Provisions one Deployment plus one ClusterIP Service per rule-server
//! instance through the cluster's REST API, authenticating with the
//! service-account bearer token mounted into the pod. Manifests are plain
//! JSON documents; no cluster client library is involved.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use rulegrid_core::{ClusterConfig, Platform};

use crate::error::{BackendError, BackendResult};
use crate::probe::ProbeResult;
use crate::{Provisioned, ProvisionSpec, RuntimeBackend, TeardownReport};

/// Port the rule server listens on inside its pod.
const SERVER_PORT: u16 = 8080;

/// Label attached to everything this backend creates.
const MANAGED_BY: &str = "rulegrid";

/// Kubernetes-style cluster backend.
#[derive(Debug)]
pub struct ClusterBackend {
    config: ClusterConfig,
    http: reqwest::Client,
    token: String,
}

impl ClusterBackend {
    /// Build a backend, reading the bearer token from the configured path.
    pub fn new(config: ClusterConfig) -> BackendResult<Self> {
        let token = std::fs::read_to_string(&config.token_path)
            .map_err(|e| {
                BackendError::Cluster(format!("read token {}: {e}", config.token_path))
            })?
            .trim()
            .to_string();
        let http = reqwest::Client::builder()
            // In-cluster API certs are handled by the platform trust bundle;
            // dev clusters routinely present self-signed certs.
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| BackendError::Cluster(e.to_string()))?;
        Ok(Self {
            config,
            http,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    async fn api_get(
        &self,
        path: &str,
    ) -> BackendResult<(reqwest::StatusCode, serde_json::Value)> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BackendError::Cluster(format!("GET {path}: {e}")))?;
        let status = resp.status();
        let body = resp.json().await.unwrap_or(serde_json::Value::Null);
        Ok((status, body))
    }

    async fn api_post(&self, path: &str, body: &serde_json::Value) -> BackendResult<()> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Cluster(format!("POST {path}: {e}")))?;
        let status = resp.status();
        if status.is_success() || status.as_u16() == 409 {
            debug!(path, status = status.as_u16(), "cluster API call");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(BackendError::Cluster(format!(
                "POST {path}: HTTP {}: {body}",
                status.as_u16()
            )))
        }
    }

    async fn api_delete(&self, path: &str) -> Result<bool, BackendError> {
        let resp = self
            .http
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BackendError::Cluster(format!("DELETE {path}: {e}")))?;
        match resp.status().as_u16() {
            404 => Ok(false),
            code if (200..300).contains(&code) => Ok(true),
            code => Err(BackendError::Cluster(format!("DELETE {path}: HTTP {code}"))),
        }
    }

    fn deployment_path(&self, name: &str) -> String {
        format!(
            "/apis/apps/v1/namespaces/{}/deployments/{name}",
            self.config.namespace
        )
    }

    fn service_path(&self, name: &str) -> String {
        format!(
            "/api/v1/namespaces/{}/services/{name}",
            self.config.namespace
        )
    }

    /// In-cluster DNS endpoint of a per-ruleset service.
    fn endpoint_for(&self, name: &str) -> String {
        format!(
            "http://{name}.{}.svc.cluster.local:{SERVER_PORT}",
            self.config.namespace
        )
    }
}

#[async_trait]
impl RuntimeBackend for ClusterBackend {
    fn platform(&self) -> Platform {
        Platform::OrchestratedCluster
    }

    async fn provision(&self, spec: &ProvisionSpec) -> BackendResult<Provisioned> {
        let name = &spec.container_name;

        let (status, _) = self.api_get(&self.deployment_path(name)).await?;
        if status.is_success() {
            let Some(endpoint) = &spec.known_endpoint else {
                warn!(deployment = %name, "unregistered deployment occupies the name");
                return Err(BackendError::ProvisionConflict {
                    container_name: name.clone(),
                });
            };
            return Ok(Provisioned::Exists {
                endpoint: endpoint.clone(),
            });
        }
        if status.as_u16() != 404 {
            return Err(BackendError::Cluster(format!(
                "inspect deployment {name}: HTTP {}",
                status.as_u16()
            )));
        }

        let deployment = deployment_manifest(name, &spec.image, &spec.env);
        self.api_post(
            &format!(
                "/apis/apps/v1/namespaces/{}/deployments",
                self.config.namespace
            ),
            &deployment,
        )
        .await?;

        let service = service_manifest(name, &self.config.service_type);
        self.api_post(
            &format!("/api/v1/namespaces/{}/services", self.config.namespace),
            &service,
        )
        .await?;

        info!(deployment = %name, namespace = %self.config.namespace, "workload provisioned");
        Ok(Provisioned::Created {
            endpoint: self.endpoint_for(name),
        })
    }

    async fn teardown(&self, container_name: &str) -> TeardownReport {
        let mut report = TeardownReport::default();

        match self.api_delete(&self.deployment_path(container_name)).await {
            Ok(removed) => report.removed = removed,
            Err(e) => report.warnings.push(format!("deployment: {e}")),
        }
        match self.api_delete(&self.service_path(container_name)).await {
            Ok(_) => {}
            Err(e) => report.warnings.push(format!("service: {e}")),
        }

        if report.removed {
            info!(deployment = container_name, "workload torn down");
        }
        report
    }

    /// Deployment readiness through the API server. The pod endpoint's
    /// cluster-internal DNS name is useless from outside the cluster, so
    /// the probe never touches it.
    async fn probe(&self, container_name: &str, _endpoint: &str, timeout: Duration) -> ProbeResult {
        let path = self.deployment_path(container_name);
        let fetched = match tokio::time::timeout(timeout, self.api_get(&path)).await {
            Ok(result) => result,
            Err(_) => {
                return ProbeResult::Failed {
                    reason: format!("deployment status timed out after {}s", timeout.as_secs()),
                };
            }
        };
        match fetched {
            Err(e) => ProbeResult::Failed {
                reason: e.to_string(),
            },
            Ok((status, _)) if status.as_u16() == 404 => ProbeResult::Failed {
                reason: format!("deployment {container_name} not found"),
            },
            Ok((status, _)) if !status.is_success() => ProbeResult::Failed {
                reason: format!("deployment status: HTTP {}", status.as_u16()),
            },
            Ok((_, body)) => {
                let ready = ready_replicas(&body);
                if ready >= 1 {
                    ProbeResult::Healthy
                } else {
                    ProbeResult::Unhealthy {
                        reason: format!("{ready} ready replicas"),
                    }
                }
            }
        }
    }
}

/// Ready-replica count from a Deployment object. Absent while no pod has
/// ever become ready.
fn ready_replicas(deployment: &serde_json::Value) -> i64 {
    deployment
        .pointer("/status/readyReplicas")
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

/// Build the apps/v1 Deployment manifest for one rule-server instance.
fn deployment_manifest(name: &str, image: &str, env: &[(String, String)]) -> serde_json::Value {
    let env: Vec<serde_json::Value> = env
        .iter()
        .map(|(k, v)| serde_json::json!({"name": k, "value": v}))
        .collect();
    serde_json::json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "labels": { "app": name, "app.kubernetes.io/managed-by": MANAGED_BY }
        },
        "spec": {
            "replicas": 1,
            "selector": { "matchLabels": { "app": name } },
            "template": {
                "metadata": { "labels": { "app": name } },
                "spec": {
                    "containers": [{
                        "name": "rule-server",
                        "image": image,
                        "env": env,
                        "ports": [{ "containerPort": SERVER_PORT }],
                        "readinessProbe": {
                            "httpGet": {
                                "path": "/kie-server/services/rest/server",
                                "port": SERVER_PORT
                            },
                            "initialDelaySeconds": 30,
                            "periodSeconds": 5
                        }
                    }]
                }
            }
        }
    })
}

/// Build the v1 Service manifest fronting a rule-server deployment.
fn service_manifest(name: &str, service_type: &str) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "labels": { "app": name, "app.kubernetes.io/managed-by": MANAGED_BY }
        },
        "spec": {
            "type": service_type,
            "selector": { "app": name },
            "ports": [{ "port": SERVER_PORT, "targetPort": SERVER_PORT }]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_manifest_shape() {
        let manifest = deployment_manifest(
            "drools-chase-auto-underwriting-rules",
            "quay.io/kiegroup/kie-server-showcase:latest",
            &[("KIE_SERVER_USER".into(), "kieserver".into())],
        );
        assert_eq!(manifest["kind"], "Deployment");
        assert_eq!(manifest["spec"]["replicas"], 1);
        assert_eq!(
            manifest["spec"]["selector"]["matchLabels"]["app"],
            "drools-chase-auto-underwriting-rules"
        );
        let container = &manifest["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["ports"][0]["containerPort"], 8080);
        assert_eq!(container["env"][0]["name"], "KIE_SERVER_USER");
    }

    #[test]
    fn service_manifest_selects_deployment_pods() {
        let manifest = service_manifest("drools-x", "ClusterIP");
        assert_eq!(manifest["kind"], "Service");
        assert_eq!(manifest["spec"]["type"], "ClusterIP");
        assert_eq!(manifest["spec"]["selector"]["app"], "drools-x");
        assert_eq!(manifest["spec"]["ports"][0]["port"], 8080);
    }

    #[test]
    fn manifests_carry_managed_by_label() {
        let d = deployment_manifest("drools-x", "img", &[]);
        let s = service_manifest("drools-x", "ClusterIP");
        assert_eq!(d["metadata"]["labels"]["app.kubernetes.io/managed-by"], "rulegrid");
        assert_eq!(s["metadata"]["labels"]["app.kubernetes.io/managed-by"], "rulegrid");
    }

    #[test]
    fn ready_replicas_defaults_to_zero() {
        let rollout_pending = serde_json::json!({
            "kind": "Deployment",
            "status": { "replicas": 1, "unavailableReplicas": 1 }
        });
        assert_eq!(ready_replicas(&rollout_pending), 0);

        let serving = serde_json::json!({
            "kind": "Deployment",
            "status": { "replicas": 1, "readyReplicas": 1 }
        });
        assert_eq!(ready_replicas(&serving), 1);
    }

    #[tokio::test]
    async fn probe_with_unreachable_api_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "sa-token\n").unwrap();
        let backend = ClusterBackend::new(ClusterConfig {
            api_url: "http://127.0.0.1:1".into(),
            token_path: token_path.to_string_lossy().into_owned(),
            ..ClusterConfig::default()
        })
        .unwrap();

        let result = backend
            .probe("drools-ghost", "unused", Duration::from_millis(500))
            .await;
        assert!(matches!(result, ProbeResult::Failed { .. }));
    }

    #[test]
    fn missing_token_file_is_a_cluster_error() {
        let err = ClusterBackend::new(ClusterConfig {
            token_path: "/nonexistent/token".into(),
            ..ClusterConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, BackendError::Cluster(_)));
    }
}
