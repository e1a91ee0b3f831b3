//! Storage ledger repository trait.

use crate::error::LedgerResult;
use crate::models::StorageRow;
use async_trait::async_trait;

/// Fields for registering a new storage backend.
#[derive(Debug, Clone)]
pub struct NewStorage {
    pub name: String,
    pub size: i64,
    pub replicas: i32,
}

/// Fields updatable on an existing storage. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct StorageUpdate {
    pub name: Option<String>,
    pub size: Option<i64>,
    pub replicas: Option<i32>,
}

/// Repository for storage backends and their capacity counters.
#[async_trait]
pub trait StorageRepo: Send + Sync {
    /// Register a storage backend with `used = 0`.
    /// Fails with `AlreadyExists` if the name is taken.
    async fn create_storage(&self, storage: &NewStorage) -> LedgerResult<StorageRow>;

    /// Get a storage by name. Fails with `NotFound` if absent or soft-deleted.
    async fn storage_by_name(&self, name: &str) -> LedgerResult<StorageRow>;

    /// List all non-deleted storages in creation order.
    async fn all_storages(&self) -> LedgerResult<Vec<StorageRow>>;

    /// Rename/resize a storage. Renames cascade to volume rows through the
    /// foreign key. Fails with `AlreadyExists` when renaming onto a name
    /// already in use, `NotFound` when the target is absent, and
    /// `InvalidResize` when shrinking below the allocated capacity.
    async fn update_storage(&self, name: &str, update: &StorageUpdate) -> LedgerResult<StorageRow>;

    /// Soft-delete a storage. Fails with `NotFound` if absent or already
    /// deleted. Volume rows referencing it are untouched.
    async fn delete_storage(&self, name: &str) -> LedgerResult<()>;

    /// Placement policy: among non-deleted storages with at least `min_free`
    /// free units, the one with the smallest `used` (ties by creation
    /// order). Fails with `NoCapacity` when none qualifies.
    ///
    /// Greedy load-spreading, deliberately not best-fit.
    async fn least_used_storage(&self, min_free: i64) -> LedgerResult<StorageRow>;
}
