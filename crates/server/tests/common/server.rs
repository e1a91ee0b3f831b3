//! Full application harness over a throwaway SQLite ledger.

use super::mocks::{MockBilling, MockOrchestrator};
use axum::Router;
use cistern_core::config::AppConfig;
use cistern_ledger::repos::{NewStorage, StorageRepo};
use cistern_ledger::{SqliteStore, VolumeStore};
use cistern_server::service::VolumeService;
use cistern_server::{create_router, AppState};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    _dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub billing: Arc<MockBilling>,
    pub orchestrator: Arc<MockOrchestrator>,
    pub service: Arc<VolumeService>,
    pub router: Router,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let store = Arc::new(
            SqliteStore::new(dir.path().join("ledger.db"))
                .await
                .expect("failed to open sqlite store"),
        );
        let billing = Arc::new(MockBilling::new());
        let orchestrator = Arc::new(MockOrchestrator::new());

        let dyn_store: Arc<dyn VolumeStore> = store.clone();
        let state = AppState::new(
            Arc::new(AppConfig::for_testing()),
            dyn_store,
            billing.clone(),
            orchestrator.clone(),
        );
        let service = state.service.clone();
        let router = create_router(state);

        Self {
            _dir: dir,
            store,
            billing,
            orchestrator,
            service,
            router,
        }
    }

    pub async fn add_storage(&self, name: &str, size: i64) {
        self.store
            .create_storage(&NewStorage {
                name: name.to_string(),
                size,
                replicas: 1,
            })
            .await
            .expect("failed to create storage");
    }

    pub async fn used(&self, name: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT used FROM storages WHERE name = ?")
            .bind(name)
            .fetch_one(self.store.pool())
            .await
            .expect("failed to read used counter")
    }
}
