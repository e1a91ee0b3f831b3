//! Cluster orchestrator client.
//!
//! The orchestrator materializes volumes in the cluster. The ledger commits
//! first; these calls run after commit, and failures are retried by the
//! provisioning reconciler.

use crate::error::ClientResult;
use crate::response_error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Volume description sent to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeManifest {
    pub name: String,
    pub capacity: i64,
    pub storage: String,
    pub access_mode: String,
}

#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Materialize a volume in the cluster.
    async fn create_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()>;

    /// Apply new parameters to an existing cluster volume.
    async fn update_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()>;

    /// Remove a volume from the cluster.
    async fn delete_volume(&self, ns_id: &str, name: &str) -> ClientResult<()>;
}

/// Orchestrator client talking to the cluster API over HTTP.
pub struct OrchestratorHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl OrchestratorHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl OrchestratorClient for OrchestratorHttpClient {
    async fn create_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()> {
        tracing::debug!(ns_id, name = %manifest.name, "orchestrator create volume");

        let response = self
            .client
            .post(format!("{}/namespaces/{ns_id}/volumes", self.base_url))
            .json(manifest)
            .send()
            .await?;
        response_error("orchestrator", response).await?;
        Ok(())
    }

    async fn update_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()> {
        tracing::debug!(ns_id, name = %manifest.name, "orchestrator update volume");

        let response = self
            .client
            .put(format!(
                "{}/namespaces/{ns_id}/volumes/{}",
                self.base_url, manifest.name
            ))
            .json(manifest)
            .send()
            .await?;
        response_error("orchestrator", response).await?;
        Ok(())
    }

    async fn delete_volume(&self, ns_id: &str, name: &str) -> ClientResult<()> {
        tracing::debug!(ns_id, name, "orchestrator delete volume");

        let response = self
            .client
            .delete(format!("{}/namespaces/{ns_id}/volumes/{name}", self.base_url))
            .send()
            .await?;
        response_error("orchestrator", response).await?;
        Ok(())
    }
}

/// No-op orchestrator for deployments without a cluster API.
#[derive(Default)]
pub struct OrchestratorDummyClient;

#[async_trait]
impl OrchestratorClient for OrchestratorDummyClient {
    async fn create_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()> {
        tracing::debug!(ns_id, name = %manifest.name, "dummy orchestrator create volume");
        Ok(())
    }

    async fn update_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()> {
        tracing::debug!(ns_id, name = %manifest.name, "dummy orchestrator update volume");
        Ok(())
    }

    async fn delete_volume(&self, ns_id: &str, name: &str) -> ClientResult<()> {
        tracing::debug!(ns_id, name, "dummy orchestrator delete volume");
        Ok(())
    }
}
