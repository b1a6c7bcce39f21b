//! rulegrid-deploy — the build-and-deploy pipeline.
//!
//! One `deploy` call takes generated rule source for a ruleset identity all
//! the way to a live, registered, health-checked runtime instance: assemble
//! a buildable rule project in a scoped workspace, run the external build
//! tool, provision (or reuse) the runtime, install the compiled ruleset
//! into the rule server, and persist artifacts + audit history. Every stage
//! appends a step report; the terminal status distinguishes a failed build
//! (nothing touched) from a partial deployment (built but not fully live).

pub mod build;
pub mod error;
pub mod pipeline;
pub mod project;
pub mod report;
pub mod workspace;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{DeployRequest, DeploymentPipeline};
pub use report::{PipelineReport, PipelineStatus, StepReport, StepStatus};
