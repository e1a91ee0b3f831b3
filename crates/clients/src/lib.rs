//! Clients for the external collaborators: billing and the cluster
//! orchestrator.
//!
//! Each collaborator has an HTTP implementation and a no-op dummy behind the
//! same trait. Which one runs is decided once at startup from configuration;
//! the rest of the codebase only sees the trait objects.

pub mod billing;
pub mod error;
pub mod orchestrator;

pub use billing::{
    BillingClient, BillingDummyClient, BillingHttpClient, SubscribeRequest, DUMMY_TARIFF_LARGE,
    DUMMY_TARIFF_SMALL, VOLUME_RESOURCE_TYPE,
};
pub use error::{ClientError, ClientResult};
pub use orchestrator::{
    OrchestratorClient, OrchestratorDummyClient, OrchestratorHttpClient, VolumeManifest,
};

use cistern_core::config::CollaboratorsConfig;
use std::sync::Arc;

/// Turn a non-success response into a `Service` error carrying the body.
pub(crate) async fn response_error(
    service: &'static str,
    response: reqwest::Response,
) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Service {
        service,
        status: status.as_u16(),
        message,
    })
}

/// Pick a billing client from configuration.
pub fn billing_from_config(config: &CollaboratorsConfig) -> Arc<dyn BillingClient> {
    match &config.billing_url {
        Some(url) => {
            tracing::info!(url = %url, "using HTTP billing client");
            Arc::new(BillingHttpClient::new(url.clone()))
        }
        None => {
            tracing::warn!("billing_url unset, using dummy billing client");
            Arc::new(BillingDummyClient)
        }
    }
}

/// Pick an orchestrator client from configuration.
pub fn orchestrator_from_config(config: &CollaboratorsConfig) -> Arc<dyn OrchestratorClient> {
    match &config.orchestrator_url {
        Some(url) => {
            tracing::info!(url = %url, "using HTTP orchestrator client");
            Arc::new(OrchestratorHttpClient::new(url.clone()))
        }
        None => {
            tracing::warn!("orchestrator_url unset, using dummy orchestrator client");
            Arc::new(OrchestratorDummyClient)
        }
    }
}
