//! Health probes.
//!
//! [`ProbeResult`] is the shared vocabulary for every platform's probe:
//! probing never errors, a probe that could not be executed is `Failed`
//! with the reason attached, and an instance that was reached but is not
//! serving is `Unhealthy`. [`http_probe`] is the HTTP readiness half of the
//! container-engine probe: one GET against the instance's rule-server REST
//! root over a raw TCP connection.

use std::time::Duration;

use tracing::debug;

use crate::ruleserver::SERVER_REST_PATH;

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The instance is up and serving (for HTTP probes, a 2xx or an auth
    /// challenge; for cluster probes, at least one ready replica).
    Healthy,
    /// The instance was reached but reports itself unable to serve.
    Unhealthy { reason: String },
    /// The probe could not be executed at all.
    Failed { reason: String },
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy)
    }

    /// Human-readable reason suitable for the registry's failure column.
    pub fn describe(&self) -> Option<String> {
        match self {
            ProbeResult::Healthy => None,
            ProbeResult::Unhealthy { reason } => Some(format!("unhealthy: {reason}")),
            ProbeResult::Failed { reason } => Some(format!("probe failed: {reason}")),
        }
    }
}

/// Probe an instance endpoint (base URL) at the rule-server REST root.
///
/// An auth challenge (401/403) counts as healthy: the server answers every
/// route with one until credentials are presented, so the challenge proves
/// it is up and serving.
pub async fn http_probe(endpoint: &str, timeout: Duration) -> ProbeResult {
    let Some((authority, base_path)) = split_endpoint(endpoint) else {
        return ProbeResult::Failed {
            reason: format!("unparseable endpoint {endpoint:?}"),
        };
    };
    let path = format!("{base_path}{SERVER_REST_PATH}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(&authority).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, endpoint, "probe connection failed");
                return ProbeResult::Failed {
                    reason: format!("connect: {e}"),
                };
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, endpoint, "probe handshake failed");
                return ProbeResult::Failed {
                    reason: format!("handshake: {e}"),
                };
            }
        };
        tokio::spawn(async move {
            let _ = conn.await;
        });

        // Registry endpoints are not validated on import; a bad one must
        // fail the probe, not the probing task.
        let req = match http::Request::builder()
            .method("GET")
            .uri(&path)
            .header("host", &authority)
            .header("user-agent", "rulegrid-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, endpoint, "probe request invalid");
                return ProbeResult::Failed {
                    reason: format!("invalid probe request: {e}"),
                };
            }
        };

        match sender.send_request(req).await {
            Ok(resp) => {
                let status = resp.status();
                // 401/403 mean the server is up and enforcing auth.
                if status.is_success() || matches!(status.as_u16(), 401 | 403) {
                    ProbeResult::Healthy
                } else {
                    debug!(status = status.as_u16(), endpoint, "probe error status");
                    ProbeResult::Unhealthy {
                        reason: format!("HTTP {}", status.as_u16()),
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, endpoint, "probe request failed");
                ProbeResult::Failed {
                    reason: format!("request: {e}"),
                }
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(endpoint, "probe timed out");
            ProbeResult::Failed {
                reason: format!("timed out after {}s", timeout.as_secs()),
            }
        }
    }
}

/// Split `http://host:port/base` into (`host:port`, `/base`).
fn split_endpoint(endpoint: &str) -> Option<(String, String)> {
    let rest = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))?;
    let (authority, path) = match rest.split_once('/') {
        Some((a, p)) => (a, format!("/{p}")),
        None => (rest, String::new()),
    };
    if authority.is_empty() {
        return None;
    }
    let authority = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };
    Some((authority, path.trim_end_matches('/').to_string()))
}
