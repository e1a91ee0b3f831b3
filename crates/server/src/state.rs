//! Shared application state.

use crate::service::VolumeService;
use cistern_clients::{BillingClient, OrchestratorClient};
use cistern_core::config::AppConfig;
use cistern_ledger::VolumeStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn VolumeStore>,
    pub service: Arc<VolumeService>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn VolumeStore>,
        billing: Arc<dyn BillingClient>,
        orchestrator: Arc<dyn OrchestratorClient>,
    ) -> Self {
        let service = Arc::new(VolumeService::new(store.clone(), billing, orchestrator));
        Self {
            config,
            store,
            service,
        }
    }
}
