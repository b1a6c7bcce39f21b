//! REST API handlers.
//!
//! Each handler goes through the registry, pipeline, or router and returns
//! a JSON `ApiResponse` envelope. Pipeline handlers always embed the full
//! step-by-step report, including on failure.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use rulegrid_artifacts::{ArtifactError, ArtifactStore};
use rulegrid_backend::Fact;
use rulegrid_core::{LifecycleStatus, RulesetIdentity};
use rulegrid_deploy::{DeployRequest, PipelineStatus};
use rulegrid_registry::InstanceFilter;
use rulegrid_router::RoutingError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Container names embed the ruleset id; recover the identity from one.
fn identity_from_name(name: &str) -> Option<RulesetIdentity> {
    let ruleset_id = name.strip_prefix("drools-").unwrap_or(name);
    RulesetIdentity::from_ruleset_id(ruleset_id)
}

// ── Instances ──────────────────────────────────────────────────

/// Query parameters for instance listing.
#[derive(serde::Deserialize, Default)]
pub struct ListQuery {
    pub tenant: Option<String>,
    pub policy_type: Option<String>,
    pub status: Option<LifecycleStatus>,
    #[serde(default)]
    pub active_only: bool,
}

/// GET /api/v1/instances
pub async fn list_instances(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let filter = InstanceFilter {
        tenant: query.tenant,
        policy_type: query.policy_type,
        status: query.status,
        active_only: query.active_only,
    };
    match state.store.list(&filter) {
        Ok(instances) => ApiResponse::ok(instances).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/instances/{name}
pub async fn get_instance(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.get_current(&name) {
        Ok(Some(instance)) => ApiResponse::ok(instance).into_response(),
        Ok(None) => error_response("instance not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/instances/{name}/history
pub async fn instance_history(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.history_for(&name, 100) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/instances/{name}
pub async fn teardown_instance(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(identity) = identity_from_name(&name) else {
        return error_response("unrecognized instance name", StatusCode::BAD_REQUEST)
            .into_response();
    };
    let report = state.pipeline.teardown(&identity, "api").await;
    pipeline_response(report).into_response()
}

// ── Deployments ────────────────────────────────────────────────

/// Deploy request body.
#[derive(serde::Deserialize)]
pub struct DeployBody {
    pub tenant: String,
    pub policy_type: String,
    pub rule_source: String,
    pub source_document: Option<String>,
    pub decision_table: Option<String>,
    pub description: Option<String>,
    pub actor: Option<String>,
}

impl DeployBody {
    fn into_request(self) -> DeployRequest {
        DeployRequest {
            identity: RulesetIdentity::new(&self.tenant, &self.policy_type),
            rule_source: self.rule_source,
            source_document: self.source_document,
            decision_table: self.decision_table,
            description: self.description,
            actor: self.actor.unwrap_or_else(|| "api".to_string()),
        }
    }
}

/// Redeploy body: the identity comes from the path.
#[derive(serde::Deserialize)]
pub struct RedeployBody {
    pub rule_source: String,
    pub source_document: Option<String>,
    pub decision_table: Option<String>,
    pub description: Option<String>,
    pub actor: Option<String>,
}

fn pipeline_response(report: rulegrid_deploy::PipelineReport) -> impl IntoResponse {
    let (success, status) = match report.status {
        PipelineStatus::Success => (true, StatusCode::OK),
        PipelineStatus::Partial => (false, StatusCode::OK),
        PipelineStatus::Failed => (false, StatusCode::UNPROCESSABLE_ENTITY),
    };
    (
        status,
        Json(ApiResponse {
            success,
            data: Some(report),
            error: None,
        }),
    )
}

/// POST /api/v1/deployments
pub async fn deploy(
    State(state): State<ApiState>,
    Json(body): Json<DeployBody>,
) -> impl IntoResponse {
    if body.rule_source.trim().is_empty() {
        return error_response("rule_source is empty", StatusCode::BAD_REQUEST).into_response();
    }
    let report = state.pipeline.deploy(&body.into_request()).await;
    pipeline_response(report).into_response()
}

/// POST /api/v1/deployments/{tenant}/{policy}/redeploy
pub async fn redeploy(
    State(state): State<ApiState>,
    Path((tenant, policy)): Path<(String, String)>,
    Json(body): Json<RedeployBody>,
) -> impl IntoResponse {
    if body.rule_source.trim().is_empty() {
        return error_response("rule_source is empty", StatusCode::BAD_REQUEST).into_response();
    }
    let request = DeployRequest {
        identity: RulesetIdentity::new(&tenant, &policy),
        rule_source: body.rule_source,
        source_document: body.source_document,
        decision_table: body.decision_table,
        description: body.description,
        actor: body.actor.unwrap_or_else(|| "api".to_string()),
    };
    let report = state.pipeline.redeploy(&request).await;
    pipeline_response(report).into_response()
}

// ── Artifacts ──────────────────────────────────────────────────

/// Presigned-download query parameters.
#[derive(serde::Deserialize)]
pub struct DownloadQuery {
    pub expires: u64,
    pub token: String,
}

/// GET /api/v1/artifacts/{key}
pub async fn download_artifact(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> impl IntoResponse {
    if !state.artifacts.verify(&key, query.expires, &query.token) {
        return error_response("invalid or expired token", StatusCode::FORBIDDEN).into_response();
    }
    match state.artifacts.get(&key).await {
        Ok(bytes) => (StatusCode::OK, bytes).into_response(),
        Err(ArtifactError::NotFound(_)) => {
            error_response("artifact not found", StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Evaluation ─────────────────────────────────────────────────

/// Evaluation request body.
#[derive(serde::Deserialize)]
pub struct EvaluateBody {
    pub facts: Vec<FactBody>,
}

#[derive(serde::Deserialize)]
pub struct FactBody {
    pub fact_type: String,
    pub out_identifier: String,
    pub fields: serde_json::Value,
}

/// POST /api/v1/evaluate/{tenant}/{policy}
pub async fn evaluate(
    State(state): State<ApiState>,
    Path((tenant, policy)): Path<(String, String)>,
    Json(body): Json<EvaluateBody>,
) -> impl IntoResponse {
    let identity = RulesetIdentity::new(&tenant, &policy);
    let facts: Vec<Fact> = body
        .facts
        .into_iter()
        .map(|f| Fact {
            fact_type: f.fact_type,
            out_identifier: f.out_identifier,
            fields: f.fields,
        })
        .collect();

    match state.router.evaluate(&identity, &facts).await {
        Ok(outcome) => ApiResponse::ok(serde_json::json!({
            "rules_fired": outcome.rules_fired,
            "results": outcome.results,
        }))
        .into_response(),
        Err(RoutingError::NotDeployed(id)) => {
            error_response(&format!("no deployment for '{id}'"), StatusCode::NOT_FOUND)
                .into_response()
        }
        Err(e @ RoutingError::Unavailable { .. }) => {
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e @ RoutingError::Evaluation(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response()
        }
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

// ── Liveness ───────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    use rulegrid_artifacts::FsArtifactStore;
    use rulegrid_backend::{
        BackendError, BackendResult, ProbeResult, Provisioned, ProvisionSpec, RuntimeBackend,
        TeardownReport,
    };
    use rulegrid_core::{
        ArtifactConfig, HealthConfig, OrchestratorConfig, Platform,
    };
    use rulegrid_deploy::DeploymentPipeline;
    use rulegrid_health::HealthMonitor;
    use rulegrid_registry::{NewInstance, RegistryStore};
    use rulegrid_router::RequestRouter;

    struct NullBackend;

    #[async_trait]
    impl RuntimeBackend for NullBackend {
        fn platform(&self) -> Platform {
            Platform::ContainerEngine
        }
        async fn provision(&self, spec: &ProvisionSpec) -> BackendResult<Provisioned> {
            Err(BackendError::Engine(format!(
                "no runtime in tests for {}",
                spec.container_name
            )))
        }
        async fn teardown(&self, _container_name: &str) -> TeardownReport {
            TeardownReport {
                removed: true,
                warnings: Vec::new(),
            }
        }
        async fn probe(
            &self,
            _container_name: &str,
            _endpoint: &str,
            _timeout: Duration,
        ) -> ProbeResult {
            ProbeResult::Failed {
                reason: "no runtime in tests".into(),
            }
        }
    }

    fn test_state(artifact_dir: &tempfile::TempDir) -> ApiState {
        let store = RegistryStore::open_in_memory().unwrap();
        let config = OrchestratorConfig {
            platform: Platform::ContainerEngine,
            dedicated_instances: true,
            engine: Default::default(),
            cluster: Default::default(),
            rule_server: Default::default(),
            // `false` exits non-zero, so deploys fail fast at the build.
            build: rulegrid_core::BuildConfig {
                command: "false".into(),
                timeout_secs: 5,
            },
            health: HealthConfig {
                probe_timeout_secs: 1,
                poll_interval_secs: 1,
                provision_timeout_secs: 1,
            },
            artifacts: ArtifactConfig {
                root: artifact_dir.path().to_string_lossy().into_owned(),
                endpoint: None,
                presign_secret: "s".into(),
                presign_expiry_secs: 60,
            },
        };
        let artifacts = Arc::new(FsArtifactStore::new(&config.artifacts));
        let backend = Arc::new(NullBackend);
        let pipeline = DeploymentPipeline::new(
            store.clone(),
            backend.clone(),
            artifacts.clone(),
            config.clone(),
        );
        let monitor = HealthMonitor::new(store.clone(), backend, config.health.clone());
        let router = RequestRouter::new(store.clone(), monitor, config.rule_server.clone());
        ApiState {
            store,
            pipeline: Arc::new(pipeline),
            router,
            artifacts,
        }
    }

    fn seed_instance(state: &ApiState) {
        let identity = RulesetIdentity::new("chase", "auto");
        state
            .store
            .register(NewInstance {
                container_name: identity.container_name(),
                identity,
                platform: Platform::ContainerEngine,
                endpoint: "http://127.0.0.1:1".into(),
                port: Some(8081),
                document_hash: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn list_instances_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let resp = list_instances(State(state), Query(ListQuery::default()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_instance_found_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        seed_instance(&state);

        let resp = get_instance(
            State(state.clone()),
            Path("drools-chase-auto-underwriting-rules".to_string()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_instance(State(state), Path("drools-ghost".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_of_unknown_instance_is_empty_ok() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let resp = instance_history(State(state), Path("drools-ghost".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn deploy_with_empty_source_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let resp = deploy(
            State(state),
            Json(DeployBody {
                tenant: "chase".into(),
                policy_type: "auto".into(),
                rule_source: "  ".into(),
                source_document: None,
                decision_table: None,
                description: None,
                actor: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_build_returns_unprocessable_with_report() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let resp = deploy(
            State(state),
            Json(DeployBody {
                tenant: "chase".into(),
                policy_type: "auto".into(),
                rule_source: "rule \"x\" when then end".into(),
                source_document: None,
                decision_table: None,
                description: None,
                actor: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn teardown_of_bad_name_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let resp = teardown_instance(State(state), Path("not-a-real-name".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn teardown_of_undeployed_identity_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let resp = teardown_instance(
            State(state),
            Path("drools-chase-auto-underwriting-rules".to_string()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn evaluate_of_undeployed_identity_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let resp = evaluate(
            State(state),
            Path(("chase".to_string(), "auto".to_string())),
            Json(EvaluateBody { facts: Vec::new() }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn identity_recovery_from_container_names() {
        let identity = identity_from_name("drools-chase-auto-underwriting-rules").unwrap();
        assert_eq!(identity.tenant_id(), "chase");
        assert!(identity_from_name("garbage").is_none());
    }

    #[tokio::test]
    async fn download_requires_a_valid_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let key = "chase/auto/v1/rules.drl";
        state
            .artifacts
            .put(key, b"rule \"x\" when then end")
            .await
            .unwrap();

        let url = state.artifacts.presign(key).unwrap();
        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut token = String::new();
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse().unwrap(),
                Some(("token", v)) => token = v.to_string(),
                _ => {}
            }
        }

        let resp = download_artifact(
            State(state.clone()),
            Path(key.to_string()),
            Query(DownloadQuery {
                expires,
                token: token.clone(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = download_artifact(
            State(state),
            Path(key.to_string()),
            Query(DownloadQuery {
                expires,
                token: "forged".into(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
