//! Volume repository trait.
//!
//! Every operation that changes which storage a volume consumes space from,
//! or how much, runs inside one transaction that mutates both the volume row
//! and the storage `used` counter. Counter updates are single conditional
//! statements evaluated server-side, so concurrent transactions cannot
//! overbook a storage or lose updates.

use crate::error::LedgerResult;
use crate::filter::VolumeFilter;
use crate::models::VolumeRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Provisioning lifecycle of a volume row.
///
/// Rows are committed `Pending` before the orchestrator call and flipped to
/// `Provisioned` once the external systems confirmed; compensation for rows
/// stuck in `Pending` is a soft-delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Pending,
    Provisioned,
}

impl ProvisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioned => "provisioned",
        }
    }
}

/// Fields for registering a new volume.
#[derive(Debug, Clone)]
pub struct NewVolume {
    pub namespace_id: String,
    pub label: String,
    pub owner_user_id: Uuid,
    pub capacity: i64,
    pub tariff_id: Option<Uuid>,
    pub storage_name: String,
    pub access_mode: String,
    pub provision_state: ProvisionState,
}

/// Repository for volume rows and their capacity accounting.
#[async_trait]
pub trait VolumeRepo: Send + Sync {
    /// Get a live volume by its natural key. `NotFound` if absent or
    /// soft-deleted.
    async fn volume_by_label(&self, ns_id: &str, label: &str) -> LedgerResult<VolumeRow>;

    /// List a user's live volumes in creation order.
    async fn volumes_by_owner(&self, owner: Uuid) -> LedgerResult<Vec<VolumeRow>>;

    /// List a namespace's live volumes in creation order.
    async fn volumes_by_namespace(&self, ns_id: &str) -> LedgerResult<Vec<VolumeRow>>;

    /// List volumes matching `filter`, in creation order.
    async fn all_volumes(&self, filter: &VolumeFilter) -> LedgerResult<Vec<VolumeRow>>;

    /// Insert a volume and reserve its capacity on the assigned storage, in
    /// one transaction. `AlreadyExists` if a live row holds the same
    /// (namespace, label); `NoCapacity` if the reservation would drive
    /// `used` past `size`; `NotFound` if the storage is absent or deleted.
    async fn create_volume(&self, volume: &NewVolume) -> LedgerResult<VolumeRow>;

    /// Resize a volume and apply the capacity delta to its current storage,
    /// in one transaction. Shrinking is rejected with `InvalidResize`. The
    /// volume never moves to a different storage on resize.
    async fn update_volume(
        &self,
        ns_id: &str,
        label: &str,
        new_capacity: i64,
        new_tariff: Option<Uuid>,
    ) -> LedgerResult<VolumeRow>;

    /// Change a volume's label. `AlreadyExists` if the new label is taken by
    /// a live row in the namespace.
    async fn rename_volume(
        &self,
        ns_id: &str,
        label: &str,
        new_label: &str,
    ) -> LedgerResult<VolumeRow>;

    /// Soft-delete a volume and release its capacity, in one transaction.
    /// `NotFound` if absent or already deleted, which also guards against
    /// double-decrementing the counter.
    async fn delete_volume(&self, ns_id: &str, label: &str) -> LedgerResult<VolumeRow>;

    /// Soft-delete all of a user's live volumes. Empty set is a no-op.
    async fn delete_volumes_by_owner(&self, owner: Uuid) -> LedgerResult<Vec<VolumeRow>>;

    /// Soft-delete all of a namespace's live volumes. Empty set is a no-op.
    async fn delete_volumes_by_namespace(&self, ns_id: &str) -> LedgerResult<Vec<VolumeRow>>;

    /// Record the outcome of external provisioning.
    async fn set_provision_state(
        &self,
        volume_id: Uuid,
        state: ProvisionState,
    ) -> LedgerResult<()>;

    /// Bump the provisioning attempt counter; returns the new value.
    async fn record_provision_attempt(&self, volume_id: Uuid) -> LedgerResult<i32>;

    /// Live volumes still awaiting provisioning, oldest first.
    async fn pending_volumes(&self, limit: i64) -> LedgerResult<Vec<VolumeRow>>;
}
