//! Ruleset identity — the (tenant, policy type) key.
//!
//! Every deployed ruleset is owned by exactly one tenant/policy-type pair.
//! The identity is normalized on construction so that the derived ruleset
//! and container names are stable regardless of how the caller spells the
//! inputs ("Chase Bank" and "chase-bank" name the same tenant).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maven-style group id baked into every generated rule project.
pub const RULESET_GROUP_ID: &str = "com.underwriting";

/// Artifact id suffix shared by all generated rule artifacts.
pub const RULESET_ARTIFACT_ID: &str = "underwriting-rules";

/// Prefix for runtime instance names.
const CONTAINER_PREFIX: &str = "drools";

/// Immutable key identifying one ruleset: tenant + policy type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RulesetIdentity {
    tenant_id: String,
    policy_type_id: String,
}

impl RulesetIdentity {
    /// Build an identity from raw tenant and policy-type strings.
    ///
    /// Both parts are normalized: lowercased, with runs of
    /// non-alphanumeric characters collapsed into single hyphens.
    pub fn new(tenant: &str, policy_type: &str) -> Self {
        Self {
            tenant_id: normalize(tenant),
            policy_type_id: normalize(policy_type),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn policy_type_id(&self) -> &str {
        &self.policy_type_id
    }

    /// Stable ruleset identifier, e.g. `chase-auto-underwriting-rules`.
    ///
    /// Doubles as the execution-context name inside a rule server.
    pub fn ruleset_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.tenant_id, self.policy_type_id, RULESET_ARTIFACT_ID
        )
    }

    /// Runtime instance name, e.g. `drools-chase-auto-underwriting-rules`.
    pub fn container_name(&self) -> String {
        format!("{CONTAINER_PREFIX}-{}", self.ruleset_id())
    }

    /// Registry index key, `{tenant}/{policy_type}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.tenant_id, self.policy_type_id)
    }

    /// Recover an identity from a ruleset identifier embedded in a request
    /// path (the inverse of [`ruleset_id`](Self::ruleset_id)).
    ///
    /// Returns `None` when the identifier does not follow the
    /// `{tenant}-{policy}-underwriting-rules` convention.
    pub fn from_ruleset_id(ruleset_id: &str) -> Option<Self> {
        let stem = ruleset_id.strip_suffix(&format!("-{RULESET_ARTIFACT_ID}"))?;
        let (tenant, policy) = stem.split_once('-')?;
        if tenant.is_empty() || policy.is_empty() {
            return None;
        }
        Some(Self::new(tenant, policy))
    }
}

impl fmt::Display for RulesetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.policy_type_id)
    }
}

/// Lowercase and collapse non-alphanumeric runs into single hyphens.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_hyphen = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_tenant_and_policy() {
        let id = RulesetIdentity::new("Chase Bank", "Auto_Loan");
        assert_eq!(id.tenant_id(), "chase-bank");
        assert_eq!(id.policy_type_id(), "auto-loan");
    }

    #[test]
    fn derives_stable_names() {
        let id = RulesetIdentity::new("chase", "auto");
        assert_eq!(id.ruleset_id(), "chase-auto-underwriting-rules");
        assert_eq!(id.container_name(), "drools-chase-auto-underwriting-rules");
        assert_eq!(id.table_key(), "chase/auto");
    }

    #[test]
    fn identical_inputs_give_identical_identities() {
        let a = RulesetIdentity::new("  CHASE ", "auto");
        let b = RulesetIdentity::new("chase", "Auto");
        assert_eq!(a, b);
    }

    #[test]
    fn collapses_repeated_separators() {
        let id = RulesetIdentity::new("first--national__bank", "home  equity");
        assert_eq!(id.tenant_id(), "first-national-bank");
        assert_eq!(id.policy_type_id(), "home-equity");
    }

    #[test]
    fn round_trips_through_ruleset_id() {
        let id = RulesetIdentity::new("chase", "auto");
        let parsed = RulesetIdentity::from_ruleset_id(&id.ruleset_id()).unwrap();
        assert_eq!(parsed.tenant_id(), "chase");
        assert_eq!(parsed.policy_type_id(), "auto");
    }

    #[test]
    fn multi_part_policy_ids_keep_remaining_segments() {
        // First segment is the tenant, everything else is the policy type.
        let parsed = RulesetIdentity::from_ruleset_id("chase-home-equity-underwriting-rules").unwrap();
        assert_eq!(parsed.tenant_id(), "chase");
        assert_eq!(parsed.policy_type_id(), "home-equity");
    }

    #[test]
    fn rejects_malformed_ruleset_ids() {
        assert!(RulesetIdentity::from_ruleset_id("no-suffix-here").is_none());
        assert!(RulesetIdentity::from_ruleset_id("underwriting-rules").is_none());
        assert!(RulesetIdentity::from_ruleset_id("chase-underwriting-rules").is_none());
    }
}
