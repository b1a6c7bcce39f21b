//! Rule-server REST protocol client.
//!
//! Every provisioned instance runs the same rule-execution server and
//! exposes the same REST surface: execution contexts are created by PUTting
//! a release id, and rules fire through batched insert/fire commands. This
//! client is shared by the deploy pipeline (context lifecycle), the health
//! monitor (readiness), and the router (evaluation).

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use rulegrid_core::ReleaseId;

use crate::error::{BackendError, BackendResult};

/// Path of the server REST root relative to an instance endpoint.
pub const SERVER_REST_PATH: &str = "/kie-server/services/rest/server";

/// Connection retry schedule: 10 attempts, delay growing 1.5x, capped.
const RETRY_ATTEMPTS: u32 = 10;
const RETRY_BASE: Duration = Duration::from_secs(2);
const RETRY_CAP: Duration = Duration::from_secs(30);

/// Identity block a rule server reports about itself.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Result of one rule evaluation round-trip.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// Number of rules fired, when the server reports it.
    pub rules_fired: Option<i64>,
    /// Keyed command outputs (inserted facts after rule firing).
    pub results: serde_json::Value,
}

/// One fact to insert before firing rules.
#[derive(Debug, Clone)]
pub struct Fact {
    /// Fully qualified fact type, e.g. `com.underwriting.Applicant`.
    pub fact_type: String,
    /// Identifier under which the post-firing object is returned.
    pub out_identifier: String,
    pub fields: serde_json::Value,
}

/// Client for one rule server's REST API.
#[derive(Clone)]
pub struct RuleServerClient {
    http: reqwest::Client,
    /// Full REST server root, e.g. `http://host:8080/kie-server/services/rest/server`.
    base_url: String,
    username: String,
    password: String,
}

impl RuleServerClient {
    /// Client for an explicit REST server root URL.
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Client for a provisioned instance, given its registry endpoint
    /// (instance base URL without the REST path).
    pub fn for_instance(endpoint: &str, username: &str, password: &str) -> Self {
        let base = format!("{}{SERVER_REST_PATH}", endpoint.trim_end_matches('/'));
        Self::new(&base, username, password)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .header("accept", "application/json")
    }

    /// Fetch the server's identity block. Fails when the server is not
    /// reachable or not yet accepting requests.
    pub async fn server_info(&self) -> BackendResult<ServerInfo> {
        let resp = self
            .request(reqwest::Method::GET, "")
            .send()
            .await
            .map_err(|e| BackendError::RuleServer(format!("server info: {e}")))?;
        if !resp.status().is_success() {
            return Err(BackendError::RuleServer(format!(
                "server info: HTTP {}",
                resp.status().as_u16()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let info = body
            .pointer("/result/kie-server-info")
            .cloned()
            .ok_or_else(|| {
                BackendError::InvalidResponse("missing kie-server-info block".into())
            })?;
        serde_json::from_value(info).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    /// Wait for the server to accept requests, retrying with a growing
    /// delay (1.5x per attempt, capped at 30s, at most 10 attempts).
    pub async fn wait_ready(&self) -> BackendResult<ServerInfo> {
        let mut delay = RETRY_BASE;
        let mut last_err = None;
        for attempt in 1..=RETRY_ATTEMPTS {
            match self.server_info().await {
                Ok(info) => {
                    info!(server = %info.id, version = %info.version, "rule server ready");
                    return Ok(info);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "rule server not ready yet");
                    last_err = Some(e);
                }
            }
            if attempt < RETRY_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay = next_retry_delay(delay);
            }
        }
        Err(last_err.unwrap_or_else(|| BackendError::RuleServer("never reachable".into())))
    }

    /// Create (or replace) the execution context for a compiled ruleset.
    pub async fn deploy_context(&self, context_id: &str, release: &ReleaseId) -> BackendResult<()> {
        let body = serde_json::json!({
            "container-id": context_id,
            "release-id": release,
        });
        let resp = self
            .request(reqwest::Method::PUT, &format!("/containers/{context_id}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::RuleServer(format!("deploy context: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::RuleServer(format!(
                "deploy context {context_id}: HTTP {}: {body}",
                status.as_u16()
            )));
        }
        info!(context = context_id, release = %release, "execution context deployed");
        Ok(())
    }

    /// Remove an execution context. Absent contexts are not an error.
    pub async fn dispose_context(&self, context_id: &str) -> BackendResult<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/containers/{context_id}"))
            .send()
            .await
            .map_err(|e| BackendError::RuleServer(format!("dispose context: {e}")))?;
        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 {
            debug!(context = context_id, "execution context disposed");
            Ok(())
        } else {
            Err(BackendError::RuleServer(format!(
                "dispose context {context_id}: HTTP {}",
                status.as_u16()
            )))
        }
    }

    /// Whether an execution context with this id exists on the server.
    pub async fn context_exists(&self, context_id: &str) -> BackendResult<bool> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/containers/{context_id}"))
            .send()
            .await
            .map_err(|e| BackendError::RuleServer(format!("context lookup: {e}")))?;
        Ok(resp.status().is_success())
    }

    /// Insert facts, fire all rules, and return the post-firing facts.
    pub async fn evaluate(
        &self,
        context_id: &str,
        facts: &[Fact],
    ) -> BackendResult<EvaluationOutcome> {
        let body = batch_commands(facts);
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/containers/instances/{context_id}"),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::RuleServer(format!("evaluate: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::RuleServer(format!(
                "evaluate on {context_id}: HTTP {}: {body}",
                status.as_u16()
            )));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        parse_execution_response(&body)
    }
}

/// Grow a retry delay by 1.5x, capped.
fn next_retry_delay(current: Duration) -> Duration {
    (current.mul_f64(1.5)).min(RETRY_CAP)
}

/// Build the batch-execution payload: one insert per fact, then fire-all.
fn batch_commands(facts: &[Fact]) -> serde_json::Value {
    let mut commands: Vec<serde_json::Value> = facts
        .iter()
        .map(|fact| {
            serde_json::json!({
                "insert": {
                    "object": { (fact.fact_type.clone()): fact.fields },
                    "out-identifier": fact.out_identifier,
                    "return-object": true,
                }
            })
        })
        .collect();
    commands.push(serde_json::json!({
        "fire-all-rules": { "out-identifier": "fired" }
    }));
    serde_json::json!({ "lookup": null, "commands": commands })
}

/// Pull the keyed results out of a batch-execution response envelope.
fn parse_execution_response(body: &serde_json::Value) -> BackendResult<EvaluationOutcome> {
    let kind = body.get("type").and_then(|v| v.as_str()).unwrap_or("");
    if kind != "SUCCESS" {
        let msg = body.get("msg").and_then(|v| v.as_str()).unwrap_or("unknown");
        warn!(response = kind, msg, "rule execution rejected");
        return Err(BackendError::RuleServer(format!("execution failed: {msg}")));
    }

    let entries = body
        .pointer("/result/execution-results/results")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut rules_fired = None;
    let mut results = serde_json::Map::new();
    for entry in entries {
        let Some(key) = entry.get("key").and_then(|v| v.as_str()) else {
            continue;
        };
        let value = entry.get("value").cloned().unwrap_or(serde_json::Value::Null);
        if key == "fired" {
            rules_fired = value.as_i64();
        } else {
            results.insert(key.to_string(), value);
        }
    }

    Ok(EvaluationOutcome {
        rules_fired,
        results: serde_json::Value::Object(results),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_client_appends_rest_path() {
        let client = RuleServerClient::for_instance("http://localhost:8081/", "u", "p");
        assert_eq!(
            client.base_url,
            "http://localhost:8081/kie-server/services/rest/server"
        );
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let mut delay = RETRY_BASE;
        delay = next_retry_delay(delay);
        assert_eq!(delay, Duration::from_secs(3));
        for _ in 0..10 {
            delay = next_retry_delay(delay);
        }
        assert_eq!(delay, RETRY_CAP);
    }

    #[test]
    fn batch_commands_insert_then_fire() {
        let facts = vec![Fact {
            fact_type: "com.underwriting.Applicant".into(),
            out_identifier: "applicant".into(),
            fields: serde_json::json!({ "creditScore": 712, "income": 85000 }),
        }];
        let body = batch_commands(&facts);

        let commands = body["commands"].as_array().unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[0]["insert"]["object"]["com.underwriting.Applicant"]["creditScore"],
            712
        );
        assert_eq!(commands[0]["insert"]["out-identifier"], "applicant");
        assert_eq!(commands[1]["fire-all-rules"]["out-identifier"], "fired");
    }

    #[test]
    fn empty_fact_list_still_fires() {
        let body = batch_commands(&[]);
        let commands = body["commands"].as_array().unwrap();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].get("fire-all-rules").is_some());
    }

    #[test]
    fn parses_successful_execution_response() {
        let body = serde_json::json!({
            "type": "SUCCESS",
            "msg": "Container chase-auto-underwriting-rules successfully called.",
            "result": {
                "execution-results": {
                    "results": [
                        { "key": "fired", "value": 3 },
                        { "key": "applicant", "value": { "approved": true } }
                    ],
                    "facts": []
                }
            }
        });
        let outcome = parse_execution_response(&body).unwrap();
        assert_eq!(outcome.rules_fired, Some(3));
        assert_eq!(outcome.results["applicant"]["approved"], true);
    }

    #[test]
    fn failure_envelope_is_an_error() {
        let body = serde_json::json!({
            "type": "FAILURE",
            "msg": "Container not found",
        });
        let err = parse_execution_response(&body).unwrap_err();
        assert!(matches!(err, BackendError::RuleServer(_)));
        assert!(err.to_string().contains("Container not found"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_rule_server_error() {
        let client = RuleServerClient::new("http://127.0.0.1:1/rest/server", "u", "p");
        let err = client.server_info().await.unwrap_err();
        assert!(matches!(err, BackendError::RuleServer(_)));
    }
}
