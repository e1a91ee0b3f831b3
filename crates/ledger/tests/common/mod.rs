//! Shared test harness for ledger integration tests.

#![allow(dead_code)]

use cistern_ledger::repos::{NewStorage, NewVolume, ProvisionState, StorageRepo};
use cistern_ledger::{SqliteStore, StorageRow};
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestLedger {
    _dir: TempDir,
    pub store: SqliteStore,
}

impl TestLedger {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let store = SqliteStore::new(dir.path().join("ledger.db"))
            .await
            .expect("failed to open sqlite store");
        Self { _dir: dir, store }
    }

    pub async fn add_storage(&self, name: &str, size: i64) -> StorageRow {
        self.store
            .create_storage(&NewStorage {
                name: name.to_string(),
                size,
                replicas: 1,
            })
            .await
            .expect("failed to create storage")
    }

    /// Read the `used` counter straight from the table.
    pub async fn used(&self, name: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT used FROM storages WHERE name = ?")
            .bind(name)
            .fetch_one(self.store.pool())
            .await
            .expect("failed to read used counter")
    }
}

pub fn new_volume(ns_id: &str, label: &str, capacity: i64, storage: &str) -> NewVolume {
    NewVolume {
        namespace_id: ns_id.to_string(),
        label: label.to_string(),
        owner_user_id: Uuid::new_v4(),
        capacity,
        tariff_id: None,
        storage_name: storage.to_string(),
        access_mode: "ReadWriteOnce".to_string(),
        provision_state: ProvisionState::Pending,
    }
}
