//! Container-engine backend.
//!
//! Talks the Docker Engine HTTP API over the local Unix socket with a
//! hand-rolled hyper http1 client (one handshake per request; this is a
//! control-plane path, not a data path). Each rule-server instance becomes
//! one container on a shared bridge network, with the server's port 8080
//! published on a registry-allocated host port.

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use rulegrid_core::{EngineConfig, Platform};

use crate::error::{BackendError, BackendResult};
use crate::probe::{http_probe, ProbeResult};
use crate::{Provisioned, ProvisionSpec, RuntimeBackend, TeardownReport};

/// Engine API version every request is pinned to.
const API_VERSION: &str = "v1.43";

/// Port the rule server listens on inside the container.
const SERVER_PORT: u16 = 8080;

/// Docker-engine runtime backend.
pub struct EngineBackend {
    config: EngineConfig,
}

impl EngineBackend {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Perform one HTTP request against the engine socket.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> BackendResult<(http::StatusCode, Vec<u8>)> {
        let stream = UnixStream::connect(&self.config.socket)
            .await
            .map_err(|e| {
                BackendError::Engine(format!("connect {}: {e}", self.config.socket))
            })?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| BackendError::Engine(format!("handshake: {e}")))?;
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let payload = match body {
            Some(value) => serde_json::to_vec(&value)
                .map_err(|e| BackendError::Engine(e.to_string()))?,
            None => Vec::new(),
        };
        let req = http::Request::builder()
            .method(method)
            .uri(format!("/{API_VERSION}{path}"))
            .header("host", "docker")
            .header("content-type", "application/json")
            .body(Full::new(bytes::Bytes::from(payload)))
            .map_err(|e| BackendError::Engine(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| BackendError::Engine(format!("{method} {path}: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| BackendError::Engine(e.to_string()))?
            .to_bytes()
            .to_vec();
        debug!(method, path, status = status.as_u16(), "engine API call");
        Ok((status, bytes))
    }

    /// Whether a container with this name exists, and whether it runs.
    async fn inspect(&self, name: &str) -> BackendResult<Option<bool>> {
        let (status, body) = self
            .request("GET", &format!("/containers/{name}/json"), None)
            .await?;
        match status.as_u16() {
            200 => {
                let parsed: serde_json::Value = serde_json::from_slice(&body)
                    .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
                let running = parsed
                    .pointer("/State/Running")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Ok(Some(running))
            }
            404 => Ok(None),
            code => Err(BackendError::Engine(format!(
                "inspect {name}: HTTP {code}: {}",
                String::from_utf8_lossy(&body)
            ))),
        }
    }

    /// Create the shared bridge network if it doesn't exist yet.
    async fn ensure_network(&self) -> BackendResult<()> {
        let body = serde_json::json!({
            "Name": self.config.network,
            "CheckDuplicate": true,
        });
        let (status, bytes) = self.request("POST", "/networks/create", Some(body)).await?;
        match status.as_u16() {
            201 => {
                info!(network = %self.config.network, "bridge network created");
                Ok(())
            }
            // Already exists.
            409 => Ok(()),
            code => Err(BackendError::Engine(format!(
                "create network {}: HTTP {code}: {}",
                self.config.network,
                String::from_utf8_lossy(&bytes)
            ))),
        }
    }

    fn endpoint_for(&self, host_port: u16) -> String {
        format!("http://localhost:{host_port}")
    }
}

#[async_trait]
impl RuntimeBackend for EngineBackend {
    fn platform(&self) -> Platform {
        Platform::ContainerEngine
    }

    async fn provision(&self, spec: &ProvisionSpec) -> BackendResult<Provisioned> {
        let name = &spec.container_name;
        let host_port = spec.host_port.ok_or_else(|| {
            BackendError::Engine("container-engine provisioning requires a host port".into())
        })?;

        if let Some(running) = self.inspect(name).await? {
            let Some(endpoint) = &spec.known_endpoint else {
                warn!(container = %name, "unregistered container occupies the name");
                return Err(BackendError::ProvisionConflict {
                    container_name: name.clone(),
                });
            };
            if !running {
                let (status, body) = self
                    .request("POST", &format!("/containers/{name}/start"), None)
                    .await?;
                if !matches!(status.as_u16(), 204 | 304) {
                    return Err(BackendError::Engine(format!(
                        "start {name}: HTTP {}: {}",
                        status.as_u16(),
                        String::from_utf8_lossy(&body)
                    )));
                }
                info!(container = %name, "existing container restarted");
            }
            return Ok(Provisioned::Exists {
                endpoint: endpoint.clone(),
            });
        }

        self.ensure_network().await?;

        let body =
            container_create_body(name, &spec.image, host_port, &self.config.network, &spec.env);
        let (status, bytes) = self
            .request("POST", &format!("/containers/create?name={name}"), Some(body))
            .await?;
        if status.as_u16() != 201 {
            return Err(BackendError::Engine(format!(
                "create {name}: HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&bytes)
            )));
        }

        let (status, bytes) = self
            .request("POST", &format!("/containers/{name}/start"), None)
            .await?;
        if status.as_u16() != 204 {
            return Err(BackendError::Engine(format!(
                "start {name}: HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&bytes)
            )));
        }

        info!(container = %name, port = host_port, "container provisioned");
        Ok(Provisioned::Created {
            endpoint: self.endpoint_for(host_port),
        })
    }

    async fn teardown(&self, container_name: &str) -> TeardownReport {
        let mut report = TeardownReport::default();

        match self
            .request(
                "POST",
                &format!("/containers/{container_name}/stop?t=10"),
                None,
            )
            .await
        {
            Ok((status, _)) if matches!(status.as_u16(), 204 | 304) => {}
            Ok((status, _)) if status.as_u16() == 404 => {
                debug!(container = container_name, "nothing to tear down");
                return report;
            }
            Ok((status, body)) => report.warnings.push(format!(
                "stop: HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )),
            Err(e) => {
                report.warnings.push(format!("stop: {e}"));
                return report;
            }
        }

        match self
            .request("DELETE", &format!("/containers/{container_name}?force=true"), None)
            .await
        {
            Ok((status, _)) if matches!(status.as_u16(), 204 | 404) => {
                report.removed = status.as_u16() == 204;
            }
            Ok((status, body)) => report.warnings.push(format!(
                "remove: HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )),
            Err(e) => report.warnings.push(format!("remove: {e}")),
        }

        if report.removed {
            info!(container = container_name, "container torn down");
        }
        report
    }

    /// Running state per the engine AND an HTTP answer from the instance.
    async fn probe(&self, container_name: &str, endpoint: &str, timeout: Duration) -> ProbeResult {
        let running = match tokio::time::timeout(timeout, self.inspect(container_name)).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                return ProbeResult::Failed {
                    reason: format!("inspect: {e}"),
                };
            }
            Err(_) => {
                return ProbeResult::Failed {
                    reason: format!("inspect timed out after {}s", timeout.as_secs()),
                };
            }
        };
        match running {
            None => ProbeResult::Failed {
                reason: format!("container {container_name} not found"),
            },
            Some(false) => ProbeResult::Unhealthy {
                reason: "container not running".into(),
            },
            Some(true) => http_probe(endpoint, timeout).await,
        }
    }
}

/// Build the Engine API container-create payload. The container's hostname
/// matches its name so other containers on the network can resolve it.
fn container_create_body(
    name: &str,
    image: &str,
    host_port: u16,
    network: &str,
    env: &[(String, String)],
) -> serde_json::Value {
    let container_port = format!("{SERVER_PORT}/tcp");
    let env: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
    serde_json::json!({
        "Image": image,
        "Hostname": name,
        "Env": env,
        "ExposedPorts": { container_port.clone(): {} },
        "HostConfig": {
            "NetworkMode": network,
            "PortBindings": {
                container_port: [{ "HostPort": host_port.to_string() }]
            },
            "RestartPolicy": { "Name": "unless-stopped" }
        }
    })
}
