//! HTTP object-gateway artifact store.
//!
//! Objects are PUT/GET against an S3-compatible HTTP gateway by key path.
//! Presigned URLs are absolute (gateway base + key + signature query), so
//! clients download without touching the daemon.

use async_trait::async_trait;
use tracing::debug;

use rulegrid_core::ArtifactConfig;

use crate::error::{ArtifactError, ArtifactResult};
use crate::{presign, ArtifactStore};

pub struct GatewayArtifactStore {
    http: reqwest::Client,
    endpoint: String,
    presign_secret: String,
    presign_expiry_secs: u64,
}

impl GatewayArtifactStore {
    /// Build a gateway store. The config must carry an endpoint.
    pub fn new(config: &ArtifactConfig) -> ArtifactResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| ArtifactError::Gateway("no gateway endpoint configured".into()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            presign_secret: config.presign_secret.clone(),
            presign_expiry_secs: config.presign_expiry_secs,
        })
    }

    fn url_for(&self, key: &str) -> ArtifactResult<String> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(ArtifactError::InvalidKey(key.to_string()));
        }
        Ok(format!("{}/{key}", self.endpoint))
    }
}

#[async_trait]
impl ArtifactStore for GatewayArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> ArtifactResult<String> {
        let url = self.url_for(key)?;
        let resp = self
            .http
            .put(&url)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ArtifactError::Gateway(format!("PUT {key}: {e}")))?;
        if !resp.status().is_success() {
            return Err(ArtifactError::Gateway(format!(
                "PUT {key}: HTTP {}",
                resp.status().as_u16()
            )));
        }
        debug!(key, size = bytes.len(), "artifact uploaded to gateway");
        Ok(format!("store://{key}"))
    }

    async fn get(&self, key: &str) -> ArtifactResult<Vec<u8>> {
        let url = self.url_for(key)?;
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ArtifactError::Gateway(format!("GET {key}: {e}")))?;
        match resp.status().as_u16() {
            404 => Err(ArtifactError::NotFound(key.to_string())),
            code if (200..300).contains(&code) => Ok(resp
                .bytes()
                .await
                .map_err(|e| ArtifactError::Gateway(e.to_string()))?
                .to_vec()),
            code => Err(ArtifactError::Gateway(format!("GET {key}: HTTP {code}"))),
        }
    }

    async fn exists(&self, key: &str) -> ArtifactResult<bool> {
        let url = self.url_for(key)?;
        let resp = self
            .http
            .head(&url)
            .send()
            .await
            .map_err(|e| ArtifactError::Gateway(format!("HEAD {key}: {e}")))?;
        Ok(resp.status().is_success())
    }

    fn presign(&self, key: &str) -> ArtifactResult<String> {
        let url = self.url_for(key)?;
        let (_, query) = presign::query_string(&self.presign_secret, key, self.presign_expiry_secs);
        Ok(format!("{url}?{query}"))
    }

    fn verify(&self, key: &str, expires_at: u64, token: &str) -> bool {
        presign::verify(&self.presign_secret, key, expires_at, token)
    }
}
