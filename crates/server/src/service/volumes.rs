//! Volume lifecycle service.
//!
//! Ledger changes commit first; the orchestrator and billing calls run after
//! the commit. A create whose external calls fail leaves the volume row in
//! the `pending` state, where the reconciler picks it up. Deletes release
//! ledger capacity immediately and then propagate outward.

use crate::error::{ApiError, ApiResult};
use crate::service::tariffs::check_tariff;
use cistern_clients::{
    BillingClient, OrchestratorClient, SubscribeRequest, VolumeManifest, VOLUME_RESOURCE_TYPE,
};
use cistern_core::access::AccessMode;
use cistern_ledger::repos::{NewVolume, ProvisionState, StorageRepo, VolumeRepo};
use cistern_ledger::{VolumeFilter, VolumeRow, VolumeStore};
use std::sync::Arc;
use uuid::Uuid;

/// Parameters for importing a volume that already exists in the cluster.
#[derive(Debug, Clone)]
pub struct ImportParams {
    pub name: String,
    pub capacity: i64,
    pub storage: String,
    pub owner: Option<Uuid>,
    pub access_mode: Option<String>,
}

pub struct VolumeService {
    store: Arc<dyn VolumeStore>,
    billing: Arc<dyn BillingClient>,
    orchestrator: Arc<dyn OrchestratorClient>,
}

impl VolumeService {
    pub fn new(
        store: Arc<dyn VolumeStore>,
        billing: Arc<dyn BillingClient>,
        orchestrator: Arc<dyn OrchestratorClient>,
    ) -> Self {
        Self {
            store,
            billing,
            orchestrator,
        }
    }

    /// Create a tariffed volume, or a quota volume when `tariff_id` is nil.
    ///
    /// The row commits as `pending` before the external calls; a failure
    /// there surfaces to the caller while the reconciler retries in the
    /// background.
    pub async fn create_volume(
        &self,
        user_id: Uuid,
        admin: bool,
        ns_id: &str,
        label: &str,
        tariff_id: Uuid,
    ) -> ApiResult<VolumeRow> {
        let (capacity, tariff) = if tariff_id.is_nil() {
            let ns_tariff = self.billing.namespace_tariff(user_id, ns_id).await?;
            if ns_tariff.volume_size <= 0 {
                return Err(ApiError::QuotaExceeded(format!(
                    "namespace {ns_id} has no volume quota"
                )));
            }
            (ns_tariff.volume_size, None)
        } else {
            let tariff = self.billing.volume_tariff(user_id, tariff_id).await?;
            check_tariff(&tariff, admin)?;
            (tariff.storage_limit, Some(tariff_id))
        };

        let storage = self.store.least_used_storage(capacity).await?;

        let row = self
            .store
            .create_volume(&NewVolume {
                namespace_id: ns_id.to_string(),
                label: label.to_string(),
                owner_user_id: user_id,
                capacity,
                tariff_id: tariff,
                storage_name: storage.name,
                access_mode: AccessMode::default().as_str().to_string(),
                provision_state: ProvisionState::Pending,
            })
            .await?;

        self.finish_provisioning(&row).await?;
        Ok(row)
    }

    /// Create a volume with an explicit capacity, bypassing tariffs.
    pub async fn admin_create_volume(
        &self,
        user_id: Uuid,
        ns_id: &str,
        label: &str,
        capacity: i64,
        storage: Option<String>,
    ) -> ApiResult<VolumeRow> {
        if capacity <= 0 {
            return Err(ApiError::BadRequest(
                "capacity must be positive".to_string(),
            ));
        }

        let storage_name = match storage {
            Some(name) => self.store.storage_by_name(&name).await?.name,
            None => self.store.least_used_storage(capacity).await?.name,
        };

        let row = self
            .store
            .create_volume(&NewVolume {
                namespace_id: ns_id.to_string(),
                label: label.to_string(),
                owner_user_id: user_id,
                capacity,
                tariff_id: None,
                storage_name,
                access_mode: AccessMode::default().as_str().to_string(),
                provision_state: ProvisionState::Pending,
            })
            .await?;

        self.finish_provisioning(&row).await?;
        Ok(row)
    }

    /// Register a volume that already exists in the cluster. No external
    /// calls; the row starts out provisioned.
    pub async fn import_volume(&self, ns_id: &str, params: ImportParams) -> ApiResult<VolumeRow> {
        if params.capacity <= 0 {
            return Err(ApiError::BadRequest(
                "capacity must be positive".to_string(),
            ));
        }

        let storage = self.store.storage_by_name(&params.storage).await?;
        let access_mode = params
            .access_mode
            .as_deref()
            .map(AccessMode::parse_or_default)
            .unwrap_or_default();

        let row = self
            .store
            .create_volume(&NewVolume {
                namespace_id: ns_id.to_string(),
                label: params.name,
                owner_user_id: params.owner.unwrap_or_else(Uuid::nil),
                capacity: params.capacity,
                tariff_id: None,
                storage_name: storage.name,
                access_mode: access_mode.as_str().to_string(),
                provision_state: ProvisionState::Provisioned,
            })
            .await?;
        Ok(row)
    }

    /// Move a volume to a different tariff; capacity follows the tariff and
    /// may only grow.
    pub async fn resize_volume(
        &self,
        user_id: Uuid,
        admin: bool,
        ns_id: &str,
        label: &str,
        tariff_id: Uuid,
    ) -> ApiResult<VolumeRow> {
        let tariff = self.billing.volume_tariff(user_id, tariff_id).await?;
        check_tariff(&tariff, admin)?;

        let row = self
            .store
            .update_volume(ns_id, label, tariff.storage_limit, Some(tariff_id))
            .await?;
        self.orchestrator
            .update_volume(ns_id, &manifest(&row))
            .await?;
        Ok(row)
    }

    /// Set an explicit capacity, detaching the volume from any tariff.
    pub async fn admin_resize_volume(
        &self,
        ns_id: &str,
        label: &str,
        capacity: i64,
    ) -> ApiResult<VolumeRow> {
        if capacity <= 0 {
            return Err(ApiError::BadRequest(
                "capacity must be positive".to_string(),
            ));
        }

        let row = self.store.update_volume(ns_id, label, capacity, None).await?;
        self.orchestrator
            .update_volume(ns_id, &manifest(&row))
            .await?;
        Ok(row)
    }

    /// Relabel a volume; tariffed volumes propagate the new label to billing.
    pub async fn rename_volume(
        &self,
        user_id: Uuid,
        ns_id: &str,
        label: &str,
        new_label: &str,
    ) -> ApiResult<VolumeRow> {
        let row = self.store.rename_volume(ns_id, label, new_label).await?;
        if row.is_tariffed() {
            self.billing
                .rename(user_id, row.volume_id, new_label)
                .await?;
        }
        Ok(row)
    }

    pub async fn get_volume(&self, ns_id: &str, label: &str) -> ApiResult<VolumeRow> {
        Ok(self.store.volume_by_label(ns_id, label).await?)
    }

    pub async fn namespace_volumes(&self, ns_id: &str) -> ApiResult<Vec<VolumeRow>> {
        Ok(self.store.volumes_by_namespace(ns_id).await?)
    }

    pub async fn user_volumes(&self, user_id: Uuid) -> ApiResult<Vec<VolumeRow>> {
        Ok(self.store.volumes_by_owner(user_id).await?)
    }

    /// Admin listing across namespaces with explicit filters.
    pub async fn all_volumes(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
        filters: Option<&str>,
    ) -> ApiResult<Vec<VolumeRow>> {
        let filter = match filters {
            Some(raw) if !raw.is_empty() => VolumeFilter::parse(raw.split(',')),
            _ => VolumeFilter::standard(),
        };
        let filter = filter.paged(
            i64::from(page.unwrap_or(1)),
            i64::from(per_page.unwrap_or(0)),
        );
        Ok(self.store.all_volumes(&filter).await?)
    }

    /// Soft-delete a volume, release its capacity, then tear down the
    /// cluster volume and the subscription.
    pub async fn delete_volume(
        &self,
        user_id: Uuid,
        ns_id: &str,
        label: &str,
    ) -> ApiResult<VolumeRow> {
        let row = self.store.delete_volume(ns_id, label).await?;
        self.orchestrator.delete_volume(ns_id, label).await?;
        if row.is_tariffed() {
            self.billing.unsubscribe(user_id, row.volume_id).await?;
        }
        Ok(row)
    }

    /// Soft-delete every volume a user owns, across namespaces.
    pub async fn delete_all_user_volumes(&self, user_id: Uuid) -> ApiResult<Vec<VolumeRow>> {
        let rows = self.store.delete_volumes_by_owner(user_id).await?;
        self.deprovision_batch(user_id, &rows).await?;
        Ok(rows)
    }

    /// Soft-delete every volume in a namespace.
    pub async fn delete_all_namespace_volumes(
        &self,
        user_id: Uuid,
        ns_id: &str,
    ) -> ApiResult<Vec<VolumeRow>> {
        let rows = self.store.delete_volumes_by_namespace(ns_id).await?;
        self.deprovision_batch(user_id, &rows).await?;
        Ok(rows)
    }

    async fn deprovision_batch(&self, user_id: Uuid, rows: &[VolumeRow]) -> ApiResult<()> {
        for row in rows {
            self.orchestrator
                .delete_volume(&row.namespace_id, &row.label)
                .await?;
        }
        let tariffed: Vec<Uuid> = rows
            .iter()
            .filter(|row| row.is_tariffed())
            .map(|row| row.volume_id)
            .collect();
        self.billing.massive_unsubscribe(user_id, &tariffed).await?;
        Ok(())
    }

    /// Run the external side of a create and record the outcome. On failure
    /// the attempt counter is bumped and the row stays pending.
    pub(crate) async fn finish_provisioning(&self, row: &VolumeRow) -> ApiResult<()> {
        match self.provision(row).await {
            Ok(()) => {
                self.store
                    .set_provision_state(row.volume_id, ProvisionState::Provisioned)
                    .await?;
                Ok(())
            }
            Err(err) => {
                self.store.record_provision_attempt(row.volume_id).await?;
                tracing::warn!(
                    volume_id = %row.volume_id,
                    error = %err,
                    "provisioning failed, volume left pending"
                );
                Err(err)
            }
        }
    }

    pub(crate) async fn provision(&self, row: &VolumeRow) -> ApiResult<()> {
        self.orchestrator
            .create_volume(&row.namespace_id, &manifest(row))
            .await?;
        if let Some(tariff_id) = row.tariff_id.filter(|id| !id.is_nil()) {
            self.billing
                .subscribe(
                    row.owner_user_id,
                    &SubscribeRequest {
                        tariff_id,
                        resource_type: VOLUME_RESOURCE_TYPE,
                        resource_id: row.volume_id,
                        resource_label: row.label.clone(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Undo a volume whose provisioning never succeeded: soft-delete the
    /// row to release capacity, then best-effort external cleanup.
    pub(crate) async fn compensate(&self, row: &VolumeRow) -> ApiResult<()> {
        self.store
            .delete_volume(&row.namespace_id, &row.label)
            .await?;
        if let Err(err) = self
            .orchestrator
            .delete_volume(&row.namespace_id, &row.label)
            .await
        {
            tracing::warn!(
                volume_id = %row.volume_id,
                error = %err,
                "orchestrator cleanup failed during compensation"
            );
        }
        if row.is_tariffed() {
            if let Err(err) = self
                .billing
                .unsubscribe(row.owner_user_id, row.volume_id)
                .await
            {
                tracing::warn!(
                    volume_id = %row.volume_id,
                    error = %err,
                    "billing cleanup failed during compensation"
                );
            }
        }
        Ok(())
    }
}

fn manifest(row: &VolumeRow) -> VolumeManifest {
    VolumeManifest {
        name: row.label.clone(),
        capacity: row.capacity,
        storage: row.storage_name.clone(),
        access_mode: row.access_mode.clone(),
    }
}
