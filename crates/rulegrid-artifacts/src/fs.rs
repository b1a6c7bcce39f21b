//! Filesystem artifact store.
//!
//! Objects live under a local root directory, one file per key. Presigned
//! URLs point at the daemon's own download route; the signature scheme is
//! shared with the gateway store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use rulegrid_core::ArtifactConfig;

use crate::error::{ArtifactError, ArtifactResult};
use crate::{presign, ArtifactStore};

pub struct FsArtifactStore {
    root: PathBuf,
    presign_secret: String,
    presign_expiry_secs: u64,
}

impl FsArtifactStore {
    pub fn new(config: &ArtifactConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            presign_secret: config.presign_secret.clone(),
            presign_expiry_secs: config.presign_expiry_secs,
        }
    }

    /// Resolve a key to a path under the root, rejecting traversal.
    fn path_for(&self, key: &str) -> ArtifactResult<PathBuf> {
        let rel = Path::new(key);
        let traversal = rel.components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if key.is_empty() || traversal {
            return Err(ArtifactError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> ArtifactResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key, size = bytes.len(), "artifact stored");
        Ok(format!("store://{key}"))
    }

    async fn get(&self, key: &str) -> ArtifactResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> ArtifactResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn presign(&self, key: &str) -> ArtifactResult<String> {
        self.path_for(key)?;
        let (_, query) = presign::query_string(&self.presign_secret, key, self.presign_expiry_secs);
        Ok(format!("/api/v1/artifacts/{key}?{query}"))
    }

    fn verify(&self, key: &str, expires_at: u64, token: &str) -> bool {
        presign::verify(&self.presign_secret, key, expires_at, token)
    }
}
