//! rulegrid-api — administrative REST surface.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/instances` | List runtime instances (filterable) |
//! | GET | `/api/v1/instances/{name}` | Get one instance |
//! | GET | `/api/v1/instances/{name}/history` | Deployment history |
//! | DELETE | `/api/v1/instances/{name}` | Tear a deployment down |
//! | POST | `/api/v1/deployments` | Deploy a ruleset |
//! | POST | `/api/v1/deployments/{tenant}/{policy}/redeploy` | Redeploy |
//! | POST | `/api/v1/evaluate/{tenant}/{policy}` | Fire rules |
//! | GET | `/api/v1/artifacts/{key}` | Presigned artifact download |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use rulegrid_artifacts::ArtifactStore;
use rulegrid_deploy::DeploymentPipeline;
use rulegrid_registry::RegistryStore;
use rulegrid_router::RequestRouter;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: RegistryStore,
    pub pipeline: Arc<DeploymentPipeline>,
    pub router: RequestRouter,
    pub artifacts: Arc<dyn ArtifactStore>,
}

/// Build the complete admin router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/instances", get(handlers::list_instances))
        .route(
            "/instances/{name}",
            get(handlers::get_instance).delete(handlers::teardown_instance),
        )
        .route("/instances/{name}/history", get(handlers::instance_history))
        .route("/deployments", post(handlers::deploy))
        .route(
            "/deployments/{tenant}/{policy}/redeploy",
            post(handlers::redeploy),
        )
        .route("/evaluate/{tenant}/{policy}", post(handlers::evaluate))
        .route("/artifacts/{*key}", get(handlers::download_artifact))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
