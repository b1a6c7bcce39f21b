//! Step-by-step pipeline reporting.
//!
//! Callers (and the admin API) get the full stage trail, not just a
//! terminal error: which stages ran, which failed, and what each one said.

use serde::{Deserialize, Serialize};

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// One stage's entry in the report.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepReport {
    pub fn ok(name: &'static str) -> Self {
        Self {
            name,
            status: StepStatus::Succeeded,
            detail: None,
        }
    }

    pub fn ok_with(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Succeeded,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Skipped,
            detail: Some(detail.into()),
        }
    }
}

/// Terminal pipeline status.
///
/// `Partial` means the build succeeded but something after it did not: the
/// artifact exists and may be partially live, so the caller should inspect
/// the steps rather than retry blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    Partial,
    Failed,
}

/// Full result of one deploy/redeploy/teardown invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    pub ruleset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    pub fn new(ruleset_id: impl Into<String>) -> Self {
        Self {
            status: PipelineStatus::Failed,
            ruleset_id: ruleset_id.into(),
            container_name: None,
            endpoint: None,
            version: None,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Whether any recorded step failed.
    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_tracks_steps_by_name() {
        let mut report = PipelineReport::new("chase-auto-underwriting-rules");
        report.push(StepReport::ok("save_source"));
        report.push(StepReport::failed("build", "exit status 1"));

        assert!(report.has_failures());
        assert_eq!(report.step("build").unwrap().status, StepStatus::Failed);
        assert!(report.step("missing").is_none());
    }

    #[test]
    fn serializes_without_empty_fields() {
        let mut report = PipelineReport::new("x");
        report.status = PipelineStatus::Success;
        report.push(StepReport::ok("build"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert!(json.get("endpoint").is_none());
        assert!(json["steps"][0].get("detail").is_none());
    }
}
