//! rulegrid-core — shared vocabulary for the RuleGrid control plane.
//!
//! Defines the ruleset identity (tenant + policy type), the platform and
//! lifecycle enums used across the registry, backends, and router, and the
//! environment-driven configuration loaded once at daemon startup.

pub mod config;
pub mod identity;
pub mod types;

pub use config::*;
pub use identity::{RulesetIdentity, RULESET_ARTIFACT_ID, RULESET_GROUP_ID};
pub use types::*;
