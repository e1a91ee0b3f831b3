//! Billing service client.
//!
//! Volume lifecycle events are mirrored into billing as subscriptions; tariff
//! lookups gate creation and resizing. The caller's identity travels in the
//! `x-user-id` header, matching the billing API contract.

use crate::error::{ClientError, ClientResult};
use crate::response_error;
use async_trait::async_trait;
use cistern_core::tariff::{NamespaceTariff, VolumeTariff};
use reqwest::StatusCode;
use serde::Serialize;
use uuid::Uuid;

pub const VOLUME_RESOURCE_TYPE: &str = "volume";

/// Subscription payload for a newly provisioned resource.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub tariff_id: Uuid,
    pub resource_type: &'static str,
    pub resource_id: Uuid,
    pub resource_label: String,
}

#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Open a subscription for a resource.
    async fn subscribe(&self, user_id: Uuid, request: &SubscribeRequest) -> ClientResult<()>;

    /// Propagate a resource rename to billing.
    async fn rename(&self, user_id: Uuid, resource_id: Uuid, new_label: &str) -> ClientResult<()>;

    /// Close the subscription for one resource.
    async fn unsubscribe(&self, user_id: Uuid, resource_id: Uuid) -> ClientResult<()>;

    /// Close subscriptions for a batch of resources. An empty batch is a
    /// no-op and must not produce a request.
    async fn massive_unsubscribe(&self, user_id: Uuid, resource_ids: &[Uuid]) -> ClientResult<()>;

    /// Fetch a volume tariff by id.
    async fn volume_tariff(&self, user_id: Uuid, tariff_id: Uuid) -> ClientResult<VolumeTariff>;

    /// Fetch the tariff attached to a namespace.
    async fn namespace_tariff(&self, user_id: Uuid, ns_id: &str) -> ClientResult<NamespaceTariff>;
}

/// Billing client talking to a real billing service over HTTP.
pub struct BillingHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl BillingHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BillingClient for BillingHttpClient {
    async fn subscribe(&self, user_id: Uuid, request: &SubscribeRequest) -> ClientResult<()> {
        tracing::debug!(user_id = %user_id, resource_id = %request.resource_id, "billing subscribe");

        let response = self
            .client
            .post(format!("{}/isp/subscription", self.base_url))
            .header("x-user-id", user_id.to_string())
            .json(request)
            .send()
            .await?;
        response_error("billing", response).await?;
        Ok(())
    }

    async fn rename(&self, user_id: Uuid, resource_id: Uuid, new_label: &str) -> ClientResult<()> {
        tracing::debug!(user_id = %user_id, resource_id = %resource_id, "billing rename");

        let response = self
            .client
            .put(format!("{}/resource/{resource_id}", self.base_url))
            .header("x-user-id", user_id.to_string())
            .json(&serde_json::json!({ "resource_label": new_label }))
            .send()
            .await?;
        response_error("billing", response).await?;
        Ok(())
    }

    async fn unsubscribe(&self, user_id: Uuid, resource_id: Uuid) -> ClientResult<()> {
        tracing::debug!(user_id = %user_id, resource_id = %resource_id, "billing unsubscribe");

        let response = self
            .client
            .delete(format!("{}/isp/subscription/{resource_id}", self.base_url))
            .header("x-user-id", user_id.to_string())
            .send()
            .await?;
        response_error("billing", response).await?;
        Ok(())
    }

    async fn massive_unsubscribe(&self, user_id: Uuid, resource_ids: &[Uuid]) -> ClientResult<()> {
        if resource_ids.is_empty() {
            return Ok(());
        }
        tracing::debug!(user_id = %user_id, count = resource_ids.len(), "billing massive unsubscribe");

        let response = self
            .client
            .delete(format!("{}/isp/subscription", self.base_url))
            .header("x-user-id", user_id.to_string())
            .json(&serde_json::json!({ "resources": resource_ids }))
            .send()
            .await?;
        response_error("billing", response).await?;
        Ok(())
    }

    async fn volume_tariff(&self, user_id: Uuid, tariff_id: Uuid) -> ClientResult<VolumeTariff> {
        let response = self
            .client
            .get(format!("{}/tariffs/volume/{tariff_id}", self.base_url))
            .header("x-user-id", user_id.to_string())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::TariffNotFound(tariff_id));
        }
        let response = response_error("billing", response).await?;
        Ok(response.json().await?)
    }

    async fn namespace_tariff(&self, user_id: Uuid, ns_id: &str) -> ClientResult<NamespaceTariff> {
        let response = self
            .client
            .get(format!("{}/namespaces/{ns_id}", self.base_url))
            .header("x-user-id", user_id.to_string())
            .send()
            .await?;
        let response = response_error("billing", response).await?;
        Ok(response.json().await?)
    }
}

/// Fixed tariff ids served by the dummy client.
pub const DUMMY_TARIFF_SMALL: Uuid = Uuid::from_u128(0x15348470_e98f_4da0_8d2e_8c65e15d6eeb);
pub const DUMMY_TARIFF_LARGE: Uuid = Uuid::from_u128(0x11a35f90_c343_4fc1_a966_381f75568036);
const DUMMY_NAMESPACE_TARIFF: Uuid = Uuid::from_u128(0x4563e8c2_b3b5_47cb_83bc_b0d93a3e0bf6);

/// No-op billing client for deployments without a billing service.
///
/// Mutations only log; tariff lookups answer from a small fixed table so the
/// tariff-gated code paths stay exercisable.
#[derive(Default)]
pub struct BillingDummyClient;

#[async_trait]
impl BillingClient for BillingDummyClient {
    async fn subscribe(&self, user_id: Uuid, request: &SubscribeRequest) -> ClientResult<()> {
        tracing::debug!(user_id = %user_id, resource_id = %request.resource_id, "dummy billing subscribe");
        Ok(())
    }

    async fn rename(&self, user_id: Uuid, resource_id: Uuid, new_label: &str) -> ClientResult<()> {
        tracing::debug!(user_id = %user_id, resource_id = %resource_id, new_label, "dummy billing rename");
        Ok(())
    }

    async fn unsubscribe(&self, user_id: Uuid, resource_id: Uuid) -> ClientResult<()> {
        tracing::debug!(user_id = %user_id, resource_id = %resource_id, "dummy billing unsubscribe");
        Ok(())
    }

    async fn massive_unsubscribe(&self, user_id: Uuid, resource_ids: &[Uuid]) -> ClientResult<()> {
        tracing::debug!(user_id = %user_id, count = resource_ids.len(), "dummy billing massive unsubscribe");
        Ok(())
    }

    async fn volume_tariff(&self, _user_id: Uuid, tariff_id: Uuid) -> ClientResult<VolumeTariff> {
        let storage_limit = match tariff_id {
            id if id == DUMMY_TARIFF_SMALL => 1,
            id if id == DUMMY_TARIFF_LARGE => 2,
            _ => return Err(ClientError::TariffNotFound(tariff_id)),
        };
        Ok(VolumeTariff {
            id: tariff_id,
            active: true,
            public: true,
            storage_limit,
            price: 0.0,
        })
    }

    async fn namespace_tariff(&self, _user_id: Uuid, ns_id: &str) -> ClientResult<NamespaceTariff> {
        tracing::debug!(ns_id, "dummy billing namespace tariff");
        Ok(NamespaceTariff {
            id: DUMMY_NAMESPACE_TARIFF,
            active: true,
            public: true,
            volume_size: 10,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dummy_serves_fixed_tariffs() {
        let billing = BillingDummyClient;
        let user = Uuid::new_v4();

        let small = billing.volume_tariff(user, DUMMY_TARIFF_SMALL).await.unwrap();
        assert_eq!(small.storage_limit, 1);
        assert!(small.active && small.public);

        let large = billing.volume_tariff(user, DUMMY_TARIFF_LARGE).await.unwrap();
        assert_eq!(large.storage_limit, 2);

        let missing = billing.volume_tariff(user, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(ClientError::TariffNotFound(_))));
    }

    #[tokio::test]
    async fn dummy_namespace_tariff_has_quota() {
        let billing = BillingDummyClient;
        let tariff = billing
            .namespace_tariff(Uuid::new_v4(), "ns-1")
            .await
            .unwrap();
        assert_eq!(tariff.volume_size, 10);
    }
}
