//! rulegridd — the RuleGrid orchestration daemon.
//!
//! Single binary that assembles all subsystems:
//! - Registry store (redb)
//! - Runtime backend (container engine or orchestrated cluster)
//! - Health monitor sweep
//! - Deployment pipeline
//! - Request router
//! - Admin REST API
//!
//! # Usage
//!
//! ```text
//! rulegridd serve --port 8090 --data-dir /var/lib/rulegrid
//! ```
//!
//! All orchestration knobs come from `RULEGRID_*` environment variables;
//! the CLI only carries process-level flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use rulegrid_api::ApiState;
use rulegrid_artifacts::{ArtifactStore, FsArtifactStore, GatewayArtifactStore};
use rulegrid_backend::{ClusterBackend, EngineBackend, RuntimeBackend};
use rulegrid_core::{OrchestratorConfig, Platform};
use rulegrid_deploy::DeploymentPipeline;
use rulegrid_health::HealthMonitor;
use rulegrid_registry::RegistryStore;
use rulegrid_router::RequestRouter;

#[derive(Parser)]
#[command(name = "rulegridd", about = "RuleGrid orchestration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8090")]
        port: u16,

        /// Data directory for the persistent registry.
        #[arg(long, default_value = "/var/lib/rulegrid")]
        data_dir: PathBuf,

        /// Legacy JSON registry file to import once at startup.
        #[arg(long)]
        import_registry: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rulegridd=debug,rulegrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            import_registry,
        } => run_serve(port, data_dir, import_registry).await,
    }
}

async fn run_serve(
    port: u16,
    data_dir: PathBuf,
    import_registry: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("RuleGrid daemon starting");

    let config = OrchestratorConfig::from_env()?;

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("rulegrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = RegistryStore::open(&db_path)?;
    info!(path = ?db_path, "registry store opened");

    if let Some(path) = import_registry {
        let imported = store.import_registry_file(&path)?;
        info!(?path, imported, "legacy registry imported");
    }

    let backend: Arc<dyn RuntimeBackend> = match config.platform {
        Platform::ContainerEngine => {
            info!(socket = %config.engine.socket, "container-engine backend selected");
            Arc::new(EngineBackend::new(config.engine.clone()))
        }
        Platform::OrchestratedCluster => {
            info!(
                api_url = %config.cluster.api_url,
                namespace = %config.cluster.namespace,
                "orchestrated-cluster backend selected"
            );
            Arc::new(ClusterBackend::new(config.cluster.clone())?)
        }
        Platform::Unmanaged => {
            anyhow::bail!("unmanaged is not a provisioning platform");
        }
    };

    let artifacts: Arc<dyn ArtifactStore> = match &config.artifacts.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "artifact gateway store selected");
            Arc::new(GatewayArtifactStore::new(&config.artifacts)?)
        }
        None => {
            info!(root = %config.artifacts.root, "filesystem artifact store selected");
            Arc::new(FsArtifactStore::new(&config.artifacts))
        }
    };

    let monitor = HealthMonitor::new(store.clone(), backend.clone(), config.health.clone());
    let pipeline = DeploymentPipeline::new(
        store.clone(),
        backend,
        artifacts.clone(),
        config.clone(),
    );
    let router = RequestRouter::new(store.clone(), monitor.clone(), config.rule_server.clone());
    info!(
        dedicated = config.dedicated_instances,
        shared_endpoint = %router.shared_endpoint(),
        "pipeline and router initialized"
    );

    // ── Background health sweep ────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_monitor = monitor.clone();
    let sweep_handle = tokio::spawn(async move {
        sweep_monitor.run(shutdown_rx).await;
    });

    // ── Admin API server ───────────────────────────────────────

    let api = rulegrid_api::build_router(ApiState {
        store,
        pipeline: Arc::new(pipeline),
        router,
        artifacts,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "admin API starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, api).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = sweep_handle.await;

    info!("RuleGrid daemon stopped");
    Ok(())
}
