//! Volume store trait and the SQLite implementation.
//!
//! The accounting rules live in the store implementations: capacity is
//! reserved and released with single conditional `used = used + delta`
//! statements inside the same transaction that mutates the volume row, so
//! the cross-entity invariant (`used` equals the live capacity sum) holds
//! after every commit without application-level locks.

use crate::error::{map_unique_violation, LedgerError, LedgerResult};
use crate::filter::VolumeFilter;
use crate::models::{StorageRow, VolumeRow};
use crate::repos::{
    NewStorage, NewVolume, ProvisionState, StorageRepo, StorageUpdate, VolumeRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined ledger store trait.
#[async_trait]
pub trait VolumeStore: StorageRepo + VolumeRepo + Send + Sync + std::fmt::Debug {
    /// Apply the embedded schema.
    async fn migrate(&self) -> LedgerResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> LedgerResult<()>;
}

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");

/// Split an embedded schema into executable statements, dropping comment-only
/// fragments. Both backends reject multi-statement prepared queries.
pub(crate) fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// SQLite-based ledger store.
#[derive(Debug)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Config(format!("creating database directory: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Renames cascade from storages.name to volumes.storage_name.
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // serializes transactions and avoids persistent lock failures.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// Reserve `delta` units on a storage with a single conditional update.
/// Zero rows matched means either no such live storage or not enough free
/// space; the follow-up probe distinguishes the two.
async fn reserve_capacity(
    tx: &mut Transaction<'_, Sqlite>,
    storage_name: &str,
    delta: i64,
) -> LedgerResult<()> {
    let reserved = sqlx::query(
        "UPDATE storages SET used = used + ? WHERE name = ? AND NOT deleted AND used + ? <= size",
    )
    .bind(delta)
    .bind(storage_name)
    .bind(delta)
    .execute(&mut **tx)
    .await?;
    if reserved.rows_affected() > 0 {
        return Ok(());
    }

    let exists: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM storages WHERE name = ? AND NOT deleted")
            .bind(storage_name)
            .fetch_optional(&mut **tx)
            .await?;
    if exists.is_some() {
        Err(LedgerError::NoCapacity { requested: delta })
    } else {
        Err(LedgerError::NotFound(format!("storage {storage_name}")))
    }
}

/// Release the capacity of already-deleted volume rows, grouped per storage.
/// A decrement that would drive `used` negative means the counter drifted
/// from the row data, which is a bug, not a recoverable condition.
async fn release_capacity(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[VolumeRow],
) -> LedgerResult<()> {
    let mut per_storage: BTreeMap<String, i64> = BTreeMap::new();
    for row in rows {
        *per_storage.entry(row.storage_name.clone()).or_default() += row.capacity;
    }

    for (storage, total) in per_storage {
        let released = sqlx::query("UPDATE storages SET used = used - ? WHERE name = ? AND used >= ?")
            .bind(total)
            .bind(&storage)
            .bind(total)
            .execute(&mut **tx)
            .await?;
        if released.rows_affected() == 0 {
            return Err(LedgerError::Internal(format!(
                "used counter for storage {storage} would underflow"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl VolumeStore for SqliteStore {
    async fn migrate(&self) -> LedgerResult<()> {
        for statement in schema_statements(SQLITE_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageRepo for SqliteStore {
    async fn create_storage(&self, storage: &NewStorage) -> LedgerResult<StorageRow> {
        tracing::debug!(name = %storage.name, size = storage.size, "create storage");

        let row = StorageRow {
            storage_id: Uuid::new_v4(),
            name: storage.name.clone(),
            size: storage.size,
            used: 0,
            replicas: storage.replicas,
            deleted: false,
            delete_time: None,
            created_at: OffsetDateTime::now_utc(),
        };

        sqlx::query(
            "INSERT INTO storages (storage_id, name, size, used, replicas, deleted, delete_time, created_at) \
             VALUES (?, ?, ?, 0, ?, FALSE, NULL, ?)",
        )
        .bind(row.storage_id)
        .bind(&row.name)
        .bind(row.size)
        .bind(row.replicas)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, || format!("storage {}", storage.name)))?;

        Ok(row)
    }

    async fn storage_by_name(&self, name: &str) -> LedgerResult<StorageRow> {
        let row: Option<StorageRow> =
            sqlx::query_as("SELECT * FROM storages WHERE name = ? AND NOT deleted")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or_else(|| LedgerError::NotFound(format!("storage {name}")))
    }

    async fn all_storages(&self) -> LedgerResult<Vec<StorageRow>> {
        let rows = sqlx::query_as("SELECT * FROM storages WHERE NOT deleted ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_storage(&self, name: &str, update: &StorageUpdate) -> LedgerResult<StorageRow> {
        tracing::debug!(name, update = ?update, "update storage");

        let mut tx = self.pool.begin().await?;

        let current: Option<StorageRow> =
            sqlx::query_as("SELECT * FROM storages WHERE name = ? AND NOT deleted")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Err(LedgerError::NotFound(format!("storage {name}")));
        };

        let new_name = update.name.clone().unwrap_or_else(|| current.name.clone());
        let new_size = update.size.unwrap_or(current.size);
        let new_replicas = update.replicas.unwrap_or(current.replicas);

        if new_name != current.name {
            let clash: Option<(i64,)> =
                sqlx::query_as("SELECT 1 FROM storages WHERE name = ? AND NOT deleted")
                    .bind(&new_name)
                    .fetch_optional(&mut *tx)
                    .await?;
            if clash.is_some() {
                return Err(LedgerError::AlreadyExists(format!("storage {new_name}")));
            }
        }
        if new_size < current.used {
            return Err(LedgerError::InvalidResize {
                current: current.used,
                requested: new_size,
            });
        }

        sqlx::query("UPDATE storages SET name = ?, size = ?, replicas = ? WHERE storage_id = ?")
            .bind(&new_name)
            .bind(new_size)
            .bind(new_replicas)
            .bind(current.storage_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, || format!("storage {new_name}")))?;

        tx.commit().await?;

        Ok(StorageRow {
            name: new_name,
            size: new_size,
            replicas: new_replicas,
            ..current
        })
    }

    async fn delete_storage(&self, name: &str) -> LedgerResult<()> {
        tracing::debug!(name, "delete storage");

        let result =
            sqlx::query("UPDATE storages SET deleted = TRUE, delete_time = ? WHERE name = ? AND NOT deleted")
                .bind(OffsetDateTime::now_utc())
                .bind(name)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("storage {name}")));
        }
        Ok(())
    }

    async fn least_used_storage(&self, min_free: i64) -> LedgerResult<StorageRow> {
        let row: Option<StorageRow> = sqlx::query_as(
            "SELECT * FROM storages WHERE NOT deleted AND size - used >= ? \
             ORDER BY used ASC, created_at ASC LIMIT 1",
        )
        .bind(min_free)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(LedgerError::NoCapacity {
            requested: min_free,
        })
    }
}

#[async_trait]
impl VolumeRepo for SqliteStore {
    async fn volume_by_label(&self, ns_id: &str, label: &str) -> LedgerResult<VolumeRow> {
        let row: Option<VolumeRow> = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = ? AND label = ? AND NOT deleted",
        )
        .bind(ns_id)
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| LedgerError::NotFound(format!("volume {label} in namespace {ns_id}")))
    }

    async fn volumes_by_owner(&self, owner: Uuid) -> LedgerResult<Vec<VolumeRow>> {
        let rows = sqlx::query_as(
            "SELECT * FROM volumes WHERE owner_user_id = ? AND NOT deleted ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn volumes_by_namespace(&self, ns_id: &str) -> LedgerResult<Vec<VolumeRow>> {
        let rows = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = ? AND NOT deleted ORDER BY created_at",
        )
        .bind(ns_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn all_volumes(&self, filter: &VolumeFilter) -> LedgerResult<Vec<VolumeRow>> {
        let mut sql = String::from("SELECT * FROM volumes WHERE 1 = 1");
        sql.push_str(filter.conditions());
        sql.push_str(" ORDER BY created_at");

        let rows = if let Some((limit, offset)) = filter.limit_offset() {
            sql.push_str(" LIMIT ? OFFSET ?");
            sqlx::query_as(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as(&sql).fetch_all(&self.pool).await?
        };
        Ok(rows)
    }

    async fn create_volume(&self, volume: &NewVolume) -> LedgerResult<VolumeRow> {
        tracing::debug!(
            ns_id = %volume.namespace_id,
            label = %volume.label,
            capacity = volume.capacity,
            storage = %volume.storage_name,
            "create volume"
        );

        let mut tx = self.pool.begin().await?;

        let clash: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM volumes WHERE namespace_id = ? AND label = ? AND NOT deleted",
        )
        .bind(&volume.namespace_id)
        .bind(&volume.label)
        .fetch_optional(&mut *tx)
        .await?;
        if clash.is_some() {
            return Err(LedgerError::AlreadyExists(format!(
                "volume {} in namespace {}",
                volume.label, volume.namespace_id
            )));
        }

        reserve_capacity(&mut tx, &volume.storage_name, volume.capacity).await?;

        let row = VolumeRow {
            volume_id: Uuid::new_v4(),
            namespace_id: volume.namespace_id.clone(),
            label: volume.label.clone(),
            owner_user_id: volume.owner_user_id,
            capacity: volume.capacity,
            tariff_id: volume.tariff_id,
            storage_name: volume.storage_name.clone(),
            access_mode: volume.access_mode.clone(),
            provision_state: volume.provision_state.as_str().to_string(),
            provision_attempts: 0,
            deleted: false,
            delete_time: None,
            created_at: OffsetDateTime::now_utc(),
        };

        sqlx::query(
            "INSERT INTO volumes (volume_id, namespace_id, label, owner_user_id, capacity, \
             tariff_id, storage_name, access_mode, provision_state, provision_attempts, \
             deleted, delete_time, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, FALSE, NULL, ?)",
        )
        .bind(row.volume_id)
        .bind(&row.namespace_id)
        .bind(&row.label)
        .bind(row.owner_user_id)
        .bind(row.capacity)
        .bind(row.tariff_id)
        .bind(&row.storage_name)
        .bind(&row.access_mode)
        .bind(&row.provision_state)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, || {
                format!("volume {} in namespace {}", volume.label, volume.namespace_id)
            })
        })?;

        tx.commit().await?;
        Ok(row)
    }

    async fn update_volume(
        &self,
        ns_id: &str,
        label: &str,
        new_capacity: i64,
        new_tariff: Option<Uuid>,
    ) -> LedgerResult<VolumeRow> {
        tracing::debug!(ns_id, label, new_capacity, "resize volume");

        let mut tx = self.pool.begin().await?;

        let current: Option<VolumeRow> = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = ? AND label = ? AND NOT deleted",
        )
        .bind(ns_id)
        .bind(label)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Err(LedgerError::NotFound(format!(
                "volume {label} in namespace {ns_id}"
            )));
        };

        if new_capacity < current.capacity {
            return Err(LedgerError::InvalidResize {
                current: current.capacity,
                requested: new_capacity,
            });
        }

        let delta = new_capacity - current.capacity;
        if delta > 0 {
            reserve_capacity(&mut tx, &current.storage_name, delta).await?;
        }

        sqlx::query("UPDATE volumes SET capacity = ?, tariff_id = ? WHERE volume_id = ?")
            .bind(new_capacity)
            .bind(new_tariff)
            .bind(current.volume_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(VolumeRow {
            capacity: new_capacity,
            tariff_id: new_tariff,
            ..current
        })
    }

    async fn rename_volume(
        &self,
        ns_id: &str,
        label: &str,
        new_label: &str,
    ) -> LedgerResult<VolumeRow> {
        tracing::debug!(ns_id, label, new_label, "rename volume");

        let mut tx = self.pool.begin().await?;

        let current: Option<VolumeRow> = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = ? AND label = ? AND NOT deleted",
        )
        .bind(ns_id)
        .bind(label)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Err(LedgerError::NotFound(format!(
                "volume {label} in namespace {ns_id}"
            )));
        };

        let clash: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM volumes WHERE namespace_id = ? AND label = ? AND NOT deleted",
        )
        .bind(ns_id)
        .bind(new_label)
        .fetch_optional(&mut *tx)
        .await?;
        if clash.is_some() {
            return Err(LedgerError::AlreadyExists(format!(
                "volume {new_label} in namespace {ns_id}"
            )));
        }

        sqlx::query("UPDATE volumes SET label = ? WHERE volume_id = ?")
            .bind(new_label)
            .bind(current.volume_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                map_unique_violation(e, || format!("volume {new_label} in namespace {ns_id}"))
            })?;

        tx.commit().await?;

        Ok(VolumeRow {
            label: new_label.to_string(),
            ..current
        })
    }

    async fn delete_volume(&self, ns_id: &str, label: &str) -> LedgerResult<VolumeRow> {
        tracing::debug!(ns_id, label, "delete volume");

        let mut tx = self.pool.begin().await?;

        let current: Option<VolumeRow> = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = ? AND label = ? AND NOT deleted",
        )
        .bind(ns_id)
        .bind(label)
        .fetch_optional(&mut *tx)
        .await?;
        // Missing or already soft-deleted both read as NotFound; this is the
        // guard against double-decrementing the counter.
        let Some(mut current) = current else {
            return Err(LedgerError::NotFound(format!(
                "volume {label} in namespace {ns_id}"
            )));
        };

        let now = OffsetDateTime::now_utc();
        sqlx::query("UPDATE volumes SET deleted = TRUE, delete_time = ? WHERE volume_id = ?")
            .bind(now)
            .bind(current.volume_id)
            .execute(&mut *tx)
            .await?;

        release_capacity(&mut tx, std::slice::from_ref(&current)).await?;

        tx.commit().await?;

        current.deleted = true;
        current.delete_time = Some(now);
        Ok(current)
    }

    async fn delete_volumes_by_owner(&self, owner: Uuid) -> LedgerResult<Vec<VolumeRow>> {
        tracing::debug!(owner = %owner, "delete all volumes of owner");

        let mut tx = self.pool.begin().await?;

        let mut rows: Vec<VolumeRow> = sqlx::query_as(
            "SELECT * FROM volumes WHERE owner_user_id = ? AND NOT deleted ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Ok(rows);
        }

        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "UPDATE volumes SET deleted = TRUE, delete_time = ? WHERE owner_user_id = ? AND NOT deleted",
        )
        .bind(now)
        .bind(owner)
        .execute(&mut *tx)
        .await?;

        release_capacity(&mut tx, &rows).await?;
        tx.commit().await?;

        for row in &mut rows {
            row.deleted = true;
            row.delete_time = Some(now);
        }
        Ok(rows)
    }

    async fn delete_volumes_by_namespace(&self, ns_id: &str) -> LedgerResult<Vec<VolumeRow>> {
        tracing::debug!(ns_id, "delete all volumes of namespace");

        let mut tx = self.pool.begin().await?;

        let mut rows: Vec<VolumeRow> = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = ? AND NOT deleted ORDER BY created_at",
        )
        .bind(ns_id)
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Ok(rows);
        }

        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "UPDATE volumes SET deleted = TRUE, delete_time = ? WHERE namespace_id = ? AND NOT deleted",
        )
        .bind(now)
        .bind(ns_id)
        .execute(&mut *tx)
        .await?;

        release_capacity(&mut tx, &rows).await?;
        tx.commit().await?;

        for row in &mut rows {
            row.deleted = true;
            row.delete_time = Some(now);
        }
        Ok(rows)
    }

    async fn set_provision_state(
        &self,
        volume_id: Uuid,
        state: ProvisionState,
    ) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE volumes SET provision_state = ? WHERE volume_id = ?")
            .bind(state.as_str())
            .bind(volume_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("volume {volume_id}")));
        }
        Ok(())
    }

    async fn record_provision_attempt(&self, volume_id: Uuid) -> LedgerResult<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE volumes SET provision_attempts = provision_attempts + 1 \
             WHERE volume_id = ? RETURNING provision_attempts",
        )
        .bind(volume_id)
        .fetch_optional(&self.pool)
        .await?;
        attempts.ok_or_else(|| LedgerError::NotFound(format!("volume {volume_id}")))
    }

    async fn pending_volumes(&self, limit: i64) -> LedgerResult<Vec<VolumeRow>> {
        let rows = sqlx::query_as(
            "SELECT * FROM volumes WHERE provision_state = 'pending' AND NOT deleted \
             ORDER BY created_at LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
