//! Scoped build workspace.
//!
//! Each pipeline invocation assembles its rule project inside a fresh
//! `tempfile::TempDir`. The directory is deleted when the workspace drops,
//! on success and on every error path alike; anything that must outlive
//! the build is copied out before then.

use std::path::{Path, PathBuf};

use tracing::debug;

use rulegrid_core::ReleaseId;

use crate::error::PipelineResult;
use crate::project::{self, FactType};

/// One per-invocation build sandbox holding an assembled rule project.
pub struct BuildWorkspace {
    _temp: tempfile::TempDir,
    project_dir: PathBuf,
}

impl BuildWorkspace {
    /// Create an empty workspace.
    pub fn create() -> PipelineResult<Self> {
        let temp = tempfile::Builder::new().prefix("rulegrid-build-").tempdir()?;
        let project_dir = temp.path().join("project");
        std::fs::create_dir_all(&project_dir)?;
        debug!(dir = %project_dir.display(), "build workspace created");
        Ok(Self {
            _temp: temp,
            project_dir,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Lay out the full rule project: build descriptor, module descriptor,
    /// rule source, and generated fact classes.
    pub fn assemble(
        &self,
        release: &ReleaseId,
        rule_source: &str,
        facts: &[FactType],
    ) -> PipelineResult<()> {
        std::fs::write(self.project_dir.join("pom.xml"), project::render_pom(release))?;

        let resources = self.project_dir.join("src/main/resources");
        std::fs::create_dir_all(resources.join("META-INF"))?;
        std::fs::write(
            resources.join("META-INF/kmodule.xml"),
            project::render_kmodule(),
        )?;

        let rules_dir = resources.join("rules");
        std::fs::create_dir_all(&rules_dir)?;
        std::fs::write(
            rules_dir.join(format!("{}.drl", release.artifact_id)),
            rule_source,
        )?;

        if !facts.is_empty() {
            let package_dir = self
                .project_dir
                .join("src/main/java")
                .join(rulegrid_core::RULESET_GROUP_ID.replace('.', "/"));
            std::fs::create_dir_all(&package_dir)?;
            for fact in facts {
                std::fs::write(
                    package_dir.join(format!("{}.java", fact.name)),
                    project::render_fact_class(fact),
                )?;
            }
        }

        debug!(
            project = %self.project_dir.display(),
            facts = facts.len(),
            "rule project assembled"
        );
        Ok(())
    }

    /// Path of the build output directory.
    pub fn target_dir(&self) -> PathBuf {
        self.project_dir.join("target")
    }

    /// Find the built rule archive under `target/`.
    pub fn built_artifact(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.target_dir()).ok()?;
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.extension().is_some_and(|ext| ext == "jar"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::parse_fact_types;

    fn release() -> ReleaseId {
        ReleaseId {
            group_id: "com.underwriting".into(),
            artifact_id: "chase-auto-underwriting-rules".into(),
            version: "1.0.1".into(),
        }
    }

    #[test]
    fn assemble_lays_out_full_project() {
        let source = "declare Applicant\n    creditScore : int\nend\n";
        let ws = BuildWorkspace::create().unwrap();
        ws.assemble(&release(), source, &parse_fact_types(source))
            .unwrap();

        let p = ws.project_dir();
        assert!(p.join("pom.xml").exists());
        assert!(p.join("src/main/resources/META-INF/kmodule.xml").exists());
        assert!(p
            .join("src/main/resources/rules/chase-auto-underwriting-rules.drl")
            .exists());
        assert!(p
            .join("src/main/java/com/underwriting/Applicant.java")
            .exists());
    }

    #[test]
    fn no_fact_blocks_means_no_java_tree() {
        let ws = BuildWorkspace::create().unwrap();
        ws.assemble(&release(), "rule \"x\" when then end", &[])
            .unwrap();
        assert!(!ws.project_dir().join("src/main/java").exists());
    }

    #[test]
    fn built_artifact_finds_jars_only() {
        let ws = BuildWorkspace::create().unwrap();
        assert!(ws.built_artifact().is_none());

        std::fs::create_dir_all(ws.target_dir()).unwrap();
        std::fs::write(ws.target_dir().join("classes.txt"), "x").unwrap();
        assert!(ws.built_artifact().is_none());

        std::fs::write(ws.target_dir().join("rules-1.0.1.jar"), "jar").unwrap();
        let found = ws.built_artifact().unwrap();
        assert_eq!(found.file_name().unwrap(), "rules-1.0.1.jar");
    }

    #[test]
    fn workspace_is_deleted_on_drop() {
        let path;
        {
            let ws = BuildWorkspace::create().unwrap();
            path = ws.project_dir().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
