//! Database models mapping to the ledger schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Storage backend record.
///
/// `used` is the capacity currently allocated to non-deleted volumes on this
/// storage. Only the accounting logic inside the store implementations
/// writes it, always as a server-side `used = used + delta` update.
#[derive(Debug, Clone, FromRow)]
pub struct StorageRow {
    pub storage_id: Uuid,
    pub name: String,
    pub size: i64,
    pub used: i64,
    pub replicas: i32,
    pub deleted: bool,
    pub delete_time: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl StorageRow {
    /// Remaining unallocated capacity.
    pub fn free(&self) -> i64 {
        self.size - self.used
    }
}

/// Volume record.
///
/// Rows are soft-deleted: `deleted` flips to true and `delete_time` is
/// stamped, but the row is retained for audit. A nil or absent `tariff_id`
/// marks an untariffed (direct/admin) volume.
#[derive(Debug, Clone, FromRow)]
pub struct VolumeRow {
    pub volume_id: Uuid,
    pub namespace_id: String,
    pub label: String,
    pub owner_user_id: Uuid,
    pub capacity: i64,
    pub tariff_id: Option<Uuid>,
    pub storage_name: String,
    pub access_mode: String,
    pub provision_state: String,
    pub provision_attempts: i32,
    pub deleted: bool,
    pub delete_time: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl VolumeRow {
    /// Whether this volume has a billing subscription attached.
    pub fn is_tariffed(&self) -> bool {
        self.tariff_id.is_some_and(|id| !id.is_nil())
    }
}
