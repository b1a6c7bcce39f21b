//! The deployment pipeline.
//!
//! Orchestrates one ruleset deployment end to end: workspace, project
//! assembly, external build, runtime provisioning, rule-server install,
//! artifact upload, registry + history bookkeeping. `deploy` never returns
//! `Err`; every outcome is a [`PipelineReport`] whose terminal status
//! distinguishes a failed build (`Failed`, nothing touched) from a
//! partially live deployment (`Partial`).

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use rulegrid_artifacts::{artifact_key, ArtifactStore};
use rulegrid_backend::{
    BackendError, Provisioned, ProvisionSpec, RuleServerClient, RuntimeBackend, SERVER_REST_PATH,
};
use rulegrid_core::{
    epoch_secs, OrchestratorConfig, Platform, ReleaseId, RulesetIdentity, RULESET_GROUP_ID,
};
use rulegrid_health::wait_until_healthy;
use rulegrid_registry::{
    ArtifactUris, DeploymentAction, DeploymentRecord, NewInstance, RegistryStore, RuntimeInstance,
};

use crate::build::run_build;
use crate::error::PipelineError;
use crate::project::parse_fact_types;
use crate::report::{PipelineReport, PipelineStatus, StepReport};
use crate::workspace::BuildWorkspace;

/// One deployment request: generated rule source for a ruleset identity.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub identity: RulesetIdentity,
    pub rule_source: String,
    /// The policy document the rules were generated from, when available.
    pub source_document: Option<String>,
    /// Pre-rendered decision-table representation, when the caller has one.
    pub decision_table: Option<String>,
    pub description: Option<String>,
    pub actor: String,
}

impl DeployRequest {
    /// SHA-256 over the source document (preferred) or the rule source.
    pub fn document_hash(&self) -> String {
        let content = self.source_document.as_deref().unwrap_or(&self.rule_source);
        hex::encode(Sha256::digest(content.as_bytes()))
    }
}

/// Build-and-deploy orchestrator. All collaborators are injected.
pub struct DeploymentPipeline {
    store: RegistryStore,
    backend: Arc<dyn RuntimeBackend>,
    artifacts: Arc<dyn ArtifactStore>,
    config: OrchestratorConfig,
}

impl DeploymentPipeline {
    pub fn new(
        store: RegistryStore,
        backend: Arc<dyn RuntimeBackend>,
        artifacts: Arc<dyn ArtifactStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            backend,
            artifacts,
            config,
        }
    }

    /// Deploy a ruleset. Never returns `Err`; inspect the report.
    pub async fn deploy(&self, request: &DeployRequest) -> PipelineReport {
        let identity = &request.identity;
        let container_name = identity.container_name();
        let mut report = PipelineReport::new(identity.ruleset_id());
        report.container_name = Some(container_name.clone());
        info!(%identity, container = %container_name, "deployment starting");

        // The release version must be known before the build so the built
        // archive's coordinates match what gets installed later.
        let expected_version = match self.store.get_active(identity) {
            Ok(prior) => prior.map(|i| i.version + 1).unwrap_or(1),
            Err(e) => {
                report.push(StepReport::failed("save_source", format!("registry: {e}")));
                return report;
            }
        };
        let release = ReleaseId {
            group_id: RULESET_GROUP_ID.to_string(),
            artifact_id: identity.ruleset_id(),
            version: format!("1.0.{expected_version}"),
        };

        // save_source
        let workspace = match BuildWorkspace::create() {
            Ok(ws) => {
                report.push(StepReport::ok("save_source"));
                ws
            }
            Err(e) => {
                report.push(StepReport::failed("save_source", e.to_string()));
                return report;
            }
        };

        // assemble_project
        let facts = parse_fact_types(&request.rule_source);
        if let Err(e) = workspace.assemble(&release, &request.rule_source, &facts) {
            report.push(StepReport::failed("assemble_project", e.to_string()));
            return report;
        }
        report.push(StepReport::ok_with(
            "assemble_project",
            format!("{} fact types generated", facts.len()),
        ));

        // build
        match run_build(&self.config.build, workspace.project_dir()).await {
            Ok(output) => report.push(StepReport::ok_with(
                "build",
                format!("built in {}ms", output.duration.as_millis()),
            )),
            Err(e) => {
                report.push(StepReport::failed("build", e.to_string()));
                report.status = PipelineStatus::Failed;
                return report;
            }
        }

        // stage_artifact — copy the archive out before the sandbox drops.
        let archive = match workspace.built_artifact() {
            Some(path) => match std::fs::read(&path) {
                Ok(bytes) => {
                    report.push(StepReport::ok_with(
                        "stage_artifact",
                        format!("{} bytes", bytes.len()),
                    ));
                    bytes
                }
                Err(e) => {
                    report.push(StepReport::failed("stage_artifact", e.to_string()));
                    report.status = PipelineStatus::Failed;
                    return report;
                }
            },
            None => {
                let err =
                    PipelineError::MissingArtifact(workspace.target_dir().display().to_string());
                report.push(StepReport::failed("stage_artifact", err.to_string()));
                report.status = PipelineStatus::Failed;
                return report;
            }
        };
        drop(workspace);

        // provision
        let mut instance: Option<RuntimeInstance> = None;
        let endpoint = if self.config.dedicated_instances {
            match self.provision_dedicated(request, &mut report).await {
                Some(registered) => {
                    let endpoint = registered.endpoint.clone();
                    instance = Some(registered);
                    endpoint
                }
                None => {
                    report.status = PipelineStatus::Partial;
                    return report;
                }
            }
        } else {
            report.push(StepReport::skipped("provision", "shared rule-server mode"));
            shared_endpoint_base(&self.config.rule_server.url)
        };
        report.endpoint = Some(endpoint.clone());
        report.version = instance.as_ref().map(|i| i.version);

        // install
        let client = RuleServerClient::for_instance(
            &endpoint,
            &self.config.rule_server.username,
            &self.config.rule_server.password,
        );
        let context_id = identity.ruleset_id();
        // Replace wholesale: a stale context of the same name must not
        // shadow the new release.
        if let Err(e) = client.dispose_context(&context_id).await {
            warn!(context = %context_id, error = %e, "disposing previous context failed");
        }
        if let Err(e) = client.deploy_context(&context_id, &release).await {
            report.push(StepReport::failed("install", e.to_string()));
            if let Some(inst) = &instance {
                self.record_history(inst, DeploymentAction::Failed, request);
            }
            report.status = PipelineStatus::Partial;
            return report;
        }
        report.push(StepReport::ok_with("install", release.to_string()));

        // upload_artifacts — degradation, never an abort.
        let version = instance.as_ref().map(|i| i.version).unwrap_or(expected_version);
        self.upload_artifacts(request, version, &archive, instance.as_ref(), &mut report)
            .await;

        if let Some(inst) = &instance {
            let action = if inst.version > 1 {
                DeploymentAction::Updated
            } else {
                DeploymentAction::Deployed
            };
            self.record_history(inst, action, request);
        }

        report.status = if report.has_failures() {
            PipelineStatus::Partial
        } else {
            PipelineStatus::Success
        };
        info!(
            %identity,
            status = ?report.status,
            version = report.version,
            "deployment finished"
        );
        report
    }

    /// Redeploy an already-deployed ruleset (new rule source, same
    /// identity). Refuses when nothing is deployed yet.
    pub async fn redeploy(&self, request: &DeployRequest) -> PipelineReport {
        match self.store.get_active(&request.identity) {
            Ok(Some(_)) => self.deploy(request).await,
            Ok(None) => {
                let mut report = PipelineReport::new(request.identity.ruleset_id());
                report.push(StepReport::failed(
                    "save_source",
                    "nothing deployed for this identity; use deploy",
                ));
                report
            }
            Err(e) => {
                let mut report = PipelineReport::new(request.identity.ruleset_id());
                report.push(StepReport::failed("save_source", format!("registry: {e}")));
                report
            }
        }
    }

    /// Best-effort teardown: stop the runtime, dispose the execution
    /// context, deactivate the registry row, record history.
    pub async fn teardown(&self, identity: &RulesetIdentity, actor: &str) -> PipelineReport {
        let mut report = PipelineReport::new(identity.ruleset_id());
        let container_name = identity.container_name();
        report.container_name = Some(container_name.clone());

        let instance = match self.store.get_active(identity) {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                report.push(StepReport::skipped("teardown_runtime", "nothing deployed"));
                report.status = PipelineStatus::Success;
                return report;
            }
            Err(e) => {
                report.push(StepReport::failed("teardown_runtime", format!("registry: {e}")));
                report.status = PipelineStatus::Partial;
                return report;
            }
        };

        let runtime = self.backend.teardown(&container_name).await;
        if runtime.warnings.is_empty() {
            report.push(StepReport::ok("teardown_runtime"));
        } else {
            report.push(StepReport::failed(
                "teardown_runtime",
                runtime.warnings.join("; "),
            ));
        }

        let client = RuleServerClient::for_instance(
            &instance.endpoint,
            &self.config.rule_server.username,
            &self.config.rule_server.password,
        );
        match client.dispose_context(&identity.ruleset_id()).await {
            Ok(()) => report.push(StepReport::ok("dispose_context")),
            Err(e) => report.push(StepReport::failed("dispose_context", e.to_string())),
        }

        match self.store.deactivate(identity) {
            Ok(_) => {
                if let Some(port) = instance.port {
                    if let Err(e) = self.store.release_port(port) {
                        warn!(port, error = %e, "releasing port failed");
                    }
                }
                report.push(StepReport::ok("deactivate"));
            }
            Err(e) => report.push(StepReport::failed("deactivate", e.to_string())),
        }

        let record = DeploymentRecord {
            container_name,
            identity: identity.clone(),
            action: DeploymentAction::Stopped,
            version: instance.version,
            platform: instance.platform,
            endpoint: instance.endpoint.clone(),
            document_hash: instance.document_hash.clone(),
            description: None,
            actor: actor.to_string(),
            created_at: epoch_secs(),
        };
        if let Err(e) = self.store.append_history(&record) {
            error!(error = %e, "recording teardown history failed");
        }

        report.status = if report.has_failures() {
            PipelineStatus::Partial
        } else {
            PipelineStatus::Success
        };
        report
    }

    /// The dedicated-mode provision stage: port, runtime resource,
    /// registry row, health gate. Returns the registered, healthy row or
    /// pushes a failed step and returns None.
    async fn provision_dedicated(
        &self,
        request: &DeployRequest,
        report: &mut PipelineReport,
    ) -> Option<RuntimeInstance> {
        let identity = &request.identity;
        let container_name = identity.container_name();

        let existing = match self.store.get_active(identity) {
            Ok(existing) => existing,
            Err(e) => {
                report.push(StepReport::failed("provision", format!("registry: {e}")));
                return None;
            }
        };

        let host_port = match self.backend.platform() {
            Platform::ContainerEngine => {
                let port = match existing.as_ref().and_then(|i| i.port) {
                    Some(port) => Ok(port),
                    None => self
                        .store
                        .allocate_port(self.config.engine.base_port, &container_name),
                };
                match port {
                    Ok(port) => Some(port),
                    Err(e) => {
                        report.push(StepReport::failed("provision", e.to_string()));
                        return None;
                    }
                }
            }
            _ => None,
        };

        let spec = ProvisionSpec {
            identity: identity.clone(),
            container_name: container_name.clone(),
            image: self.config.engine.image.clone(),
            host_port,
            known_endpoint: existing.as_ref().map(|i| i.endpoint.clone()),
            env: vec![
                ("KIE_SERVER_ID".into(), identity.ruleset_id()),
                // In-network location the server advertises about itself;
                // the container name doubles as its hostname / service name.
                (
                    "KIE_SERVER_LOCATION".into(),
                    format!("http://{container_name}:8080{SERVER_REST_PATH}"),
                ),
                (
                    "KIE_SERVER_USER".into(),
                    self.config.rule_server.username.clone(),
                ),
                (
                    "KIE_SERVER_PWD".into(),
                    self.config.rule_server.password.clone(),
                ),
                ("KIE_ADMIN_USER".into(), self.config.rule_server.username.clone()),
                ("KIE_ADMIN_PWD".into(), self.config.rule_server.password.clone()),
            ],
        };

        let provisioned = match self.backend.provision(&spec).await {
            Ok(p) => p,
            Err(e) => {
                if matches!(e, BackendError::ProvisionConflict { .. }) {
                    error!(container = %container_name, "provision conflict, aborting");
                }
                // An unused reservation must not leak.
                if existing.is_none() {
                    if let Some(port) = host_port {
                        let _ = self.store.release_port(port);
                    }
                }
                report.push(StepReport::failed("provision", e.to_string()));
                return None;
            }
        };
        let reused = matches!(provisioned, Provisioned::Exists { .. });

        let registered = match self.store.register(NewInstance {
            identity: identity.clone(),
            container_name: container_name.clone(),
            platform: self.backend.platform(),
            endpoint: provisioned.endpoint().to_string(),
            port: host_port,
            document_hash: Some(request.document_hash()),
        }) {
            Ok(instance) => instance,
            Err(e) => {
                report.push(StepReport::failed("provision", format!("register: {e}")));
                return None;
            }
        };

        match wait_until_healthy(
            &self.store,
            self.backend.as_ref(),
            &registered,
            &self.config.health,
        )
        .await
        {
            Ok(healthy) => {
                report.push(StepReport::ok_with(
                    "provision",
                    if reused {
                        format!("reused {}", healthy.endpoint)
                    } else {
                        format!("created {}", healthy.endpoint)
                    },
                ));
                Some(healthy)
            }
            Err(e) => {
                report.push(StepReport::failed("provision", e.to_string()));
                self.record_history(&registered, DeploymentAction::Failed, request);
                None
            }
        }
    }

    /// Upload rule source, archive, and source document; persist whatever
    /// URIs succeeded. Upload misses degrade the report only.
    async fn upload_artifacts(
        &self,
        request: &DeployRequest,
        version: u32,
        archive: &[u8],
        instance: Option<&RuntimeInstance>,
        report: &mut PipelineReport,
    ) {
        let identity = &request.identity;
        let mut uris = ArtifactUris::default();
        let mut misses = Vec::new();

        let uploads: [(&str, &[u8]); 2] = [
            ("rules.drl", request.rule_source.as_bytes()),
            ("rules.jar", archive),
        ];
        for (filename, bytes) in uploads {
            let key = artifact_key(identity, version, filename);
            match self.artifacts.put(&key, bytes).await {
                Ok(uri) => match filename {
                    "rules.drl" => uris.rule_source_uri = Some(uri),
                    _ => uris.artifact_uri = Some(uri),
                },
                Err(e) => misses.push(format!("{filename}: {e}")),
            }
        }
        if let Some(document) = &request.source_document {
            let key = artifact_key(identity, version, "source-document.md");
            match self.artifacts.put(&key, document.as_bytes()).await {
                Ok(uri) => uris.source_document_uri = Some(uri),
                Err(e) => misses.push(format!("source-document.md: {e}")),
            }
        }
        if let Some(table) = &request.decision_table {
            let key = artifact_key(identity, version, "decision-table.csv");
            match self.artifacts.put(&key, table.as_bytes()).await {
                Ok(uri) => uris.decision_table_uri = Some(uri),
                Err(e) => misses.push(format!("decision-table.csv: {e}")),
            }
        }

        if let Some(instance) = instance {
            if let Err(e) = self.store.update_artifacts(&instance.container_name, uris) {
                misses.push(format!("registry: {e}"));
            }
        }

        if misses.is_empty() {
            report.push(StepReport::ok("upload_artifacts"));
        } else {
            warn!(misses = ?misses, "artifact uploads incomplete");
            report.push(StepReport::failed("upload_artifacts", misses.join("; ")));
        }
    }

    fn record_history(
        &self,
        instance: &RuntimeInstance,
        action: DeploymentAction,
        request: &DeployRequest,
    ) {
        let record = DeploymentRecord {
            container_name: instance.container_name.clone(),
            identity: instance.identity.clone(),
            action,
            version: instance.version,
            platform: instance.platform,
            endpoint: instance.endpoint.clone(),
            document_hash: Some(request.document_hash()),
            description: request.description.clone(),
            actor: request.actor.clone(),
            created_at: epoch_secs(),
        };
        if let Err(e) = self.store.append_history(&record) {
            error!(error = %e, "recording deployment history failed");
        }
    }
}

/// Instance-style base URL of the shared rule server (its configured URL
/// minus the REST path, when present).
fn shared_endpoint_base(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    trimmed
        .strip_suffix(SERVER_REST_PATH)
        .unwrap_or(trimmed)
        .to_string()
}
