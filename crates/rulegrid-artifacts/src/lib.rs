//! rulegrid-artifacts — durable storage for deployment artifacts.
//!
//! Every successful build leaves four artifacts behind: the source policy
//! document, the generated rule source, the decision table, and the built
//! rule archive. They are stored under a versioned key layout
//! (`{tenant}/{policy}/v{version}/{filename}`) in either a local
//! filesystem root or an HTTP object gateway, and downloads go through
//! presigned, expiring URLs.

pub mod error;
pub mod fs;
pub mod gateway;
pub mod presign;

use async_trait::async_trait;

use rulegrid_core::RulesetIdentity;

pub use error::{ArtifactError, ArtifactResult};
pub use fs::FsArtifactStore;
pub use gateway::GatewayArtifactStore;

/// Versioned object key for one deployment artifact.
pub fn artifact_key(identity: &RulesetIdentity, version: u32, filename: &str) -> String {
    format!(
        "{}/{}/v{version}/{filename}",
        identity.tenant_id(),
        identity.policy_type_id()
    )
}

/// A place deployment artifacts can be durably written to and later
/// fetched from via a presigned URL.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store one object; returns its stable URI (for the registry row).
    async fn put(&self, key: &str, bytes: &[u8]) -> ArtifactResult<String>;

    /// Fetch an object's bytes.
    async fn get(&self, key: &str) -> ArtifactResult<Vec<u8>>;

    /// Whether an object exists.
    async fn exists(&self, key: &str) -> ArtifactResult<bool>;

    /// Time-limited download URL for an object.
    fn presign(&self, key: &str) -> ArtifactResult<String>;

    /// Check a presigned download token for an object.
    fn verify(&self, key: &str, expires_at: u64, token: &str) -> bool;
}
