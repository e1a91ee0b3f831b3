//! PostgreSQL implementation of the volume store.
//!
//! Mirrors the SQLite store; the accounting semantics are identical, only
//! placeholders and a few column types differ.

use crate::error::{map_unique_violation, LedgerError, LedgerResult};
use crate::filter::VolumeFilter;
use crate::models::{StorageRow, VolumeRow};
use crate::repos::{
    NewStorage, NewVolume, ProvisionState, StorageRepo, StorageUpdate, VolumeRepo,
};
use crate::store::{schema_statements, VolumeStore};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres, Transaction};
use std::collections::BTreeMap;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// PostgreSQL-based ledger store.
#[derive(Debug)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a connection URL and run migrations.
    pub async fn from_url(url: &str, max_connections: u32) -> LedgerResult<Self> {
        let opts = PgConnectOptions::from_str(url)
            .map_err(|e| LedgerError::Config(format!("invalid postgres url: {e}")))?;
        Self::connect(opts, max_connections, None).await
    }

    /// Connect using discrete parameters and run migrations.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        database: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> LedgerResult<Self> {
        let opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(username)
            .password(password)
            .database(database);
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> LedgerResult<Self> {
        if let Some(timeout) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", timeout.to_string())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

async fn reserve_capacity(
    tx: &mut Transaction<'_, Postgres>,
    storage_name: &str,
    delta: i64,
) -> LedgerResult<()> {
    let reserved = sqlx::query(
        "UPDATE storages SET used = used + $1 WHERE name = $2 AND NOT deleted AND used + $1 <= size",
    )
    .bind(delta)
    .bind(storage_name)
    .execute(&mut **tx)
    .await?;
    if reserved.rows_affected() > 0 {
        return Ok(());
    }

    let exists: Option<(i32,)> =
        sqlx::query_as("SELECT 1 FROM storages WHERE name = $1 AND NOT deleted")
            .bind(storage_name)
            .fetch_optional(&mut **tx)
            .await?;
    if exists.is_some() {
        Err(LedgerError::NoCapacity { requested: delta })
    } else {
        Err(LedgerError::NotFound(format!("storage {storage_name}")))
    }
}

async fn release_capacity(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[VolumeRow],
) -> LedgerResult<()> {
    let mut per_storage: BTreeMap<String, i64> = BTreeMap::new();
    for row in rows {
        *per_storage.entry(row.storage_name.clone()).or_default() += row.capacity;
    }

    for (storage, total) in per_storage {
        let released =
            sqlx::query("UPDATE storages SET used = used - $1 WHERE name = $2 AND used >= $1")
                .bind(total)
                .bind(&storage)
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
impl VolumeStore for PostgresStore {
    async fn migrate(&self) -> LedgerResult<()> {
        for statement in schema_statements(POSTGRES_SCHEMA) {
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
impl StorageRepo for PostgresStore {
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
             VALUES ($1, $2, $3, 0, $4, FALSE, NULL, $5)",
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
            sqlx::query_as("SELECT * FROM storages WHERE name = $1 AND NOT deleted")
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
            sqlx::query_as("SELECT * FROM storages WHERE name = $1 AND NOT deleted FOR UPDATE")
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
            let clash: Option<(i32,)> =
                sqlx::query_as("SELECT 1 FROM storages WHERE name = $1 AND NOT deleted")
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

        sqlx::query("UPDATE storages SET name = $1, size = $2, replicas = $3 WHERE storage_id = $4")
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

        let result = sqlx::query(
            "UPDATE storages SET deleted = TRUE, delete_time = $1 WHERE name = $2 AND NOT deleted",
        )
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
            "SELECT * FROM storages WHERE NOT deleted AND size - used >= $1 \
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
impl VolumeRepo for PostgresStore {
    async fn volume_by_label(&self, ns_id: &str, label: &str) -> LedgerResult<VolumeRow> {
        let row: Option<VolumeRow> = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = $1 AND label = $2 AND NOT deleted",
        )
        .bind(ns_id)
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| LedgerError::NotFound(format!("volume {label} in namespace {ns_id}")))
    }

    async fn volumes_by_owner(&self, owner: Uuid) -> LedgerResult<Vec<VolumeRow>> {
        let rows = sqlx::query_as(
            "SELECT * FROM volumes WHERE owner_user_id = $1 AND NOT deleted ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn volumes_by_namespace(&self, ns_id: &str) -> LedgerResult<Vec<VolumeRow>> {
        let rows = sqlx::query_as(
            "SELECT * FROM volumes WHERE namespace_id = $1 AND NOT deleted ORDER BY created_at",
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
            sql.push_str(" LIMIT $1 OFFSET $2");
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

        let clash: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM volumes WHERE namespace_id = $1 AND label = $2 AND NOT deleted",
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
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, FALSE, NULL, $10)",
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
            "SELECT * FROM volumes WHERE namespace_id = $1 AND label = $2 AND NOT deleted FOR UPDATE",
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

        sqlx::query("UPDATE volumes SET capacity = $1, tariff_id = $2 WHERE volume_id = $3")
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
            "SELECT * FROM volumes WHERE namespace_id = $1 AND label = $2 AND NOT deleted FOR UPDATE",
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

        let clash: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM volumes WHERE namespace_id = $1 AND label = $2 AND NOT deleted",
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

        sqlx::query("UPDATE volumes SET label = $1 WHERE volume_id = $2")
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
            "SELECT * FROM volumes WHERE namespace_id = $1 AND label = $2 AND NOT deleted FOR UPDATE",
        )
        .bind(ns_id)
        .bind(label)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(mut current) = current else {
            return Err(LedgerError::NotFound(format!(
                "volume {label} in namespace {ns_id}"
            )));
        };

        let now = OffsetDateTime::now_utc();
        sqlx::query("UPDATE volumes SET deleted = TRUE, delete_time = $1 WHERE volume_id = $2")
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
            "SELECT * FROM volumes WHERE owner_user_id = $1 AND NOT deleted \
             ORDER BY created_at FOR UPDATE",
        )
        .bind(owner)
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Ok(rows);
        }

        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "UPDATE volumes SET deleted = TRUE, delete_time = $1 \
             WHERE owner_user_id = $2 AND NOT deleted",
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
            "SELECT * FROM volumes WHERE namespace_id = $1 AND NOT deleted \
             ORDER BY created_at FOR UPDATE",
        )
        .bind(ns_id)
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Ok(rows);
        }

        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "UPDATE volumes SET deleted = TRUE, delete_time = $1 \
             WHERE namespace_id = $2 AND NOT deleted",
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
        let result = sqlx::query("UPDATE volumes SET provision_state = $1 WHERE volume_id = $2")
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
             WHERE volume_id = $1 RETURNING provision_attempts",
        )
        .bind(volume_id)
        .fetch_optional(&self.pool)
        .await?;
        attempts.ok_or_else(|| LedgerError::NotFound(format!("volume {volume_id}")))
    }

    async fn pending_volumes(&self, limit: i64) -> LedgerResult<Vec<VolumeRow>> {
        let rows = sqlx::query_as(
            "SELECT * FROM volumes WHERE provision_state = 'pending' AND NOT deleted \
             ORDER BY created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
