//! In-memory collaborator mocks.

use async_trait::async_trait;
use cistern_clients::{
    BillingClient, ClientError, ClientResult, OrchestratorClient, SubscribeRequest, VolumeManifest,
};
use cistern_core::tariff::{NamespaceTariff, VolumeTariff};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

fn refused(service: &'static str) -> ClientError {
    ClientError::Service {
        service,
        status: 503,
        message: "mock failure".to_string(),
    }
}

/// Billing mock: tariffs are registered per test, mutations are recorded.
pub struct MockBilling {
    pub tariffs: Mutex<HashMap<Uuid, VolumeTariff>>,
    pub namespace_quota: AtomicI64,
    pub fail_subscribe: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl MockBilling {
    pub fn new() -> Self {
        Self {
            tariffs: Mutex::new(HashMap::new()),
            namespace_quota: AtomicI64::new(10),
            fail_subscribe: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn add_tariff(&self, storage_limit: i64, active: bool, public: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.tariffs.lock().unwrap().insert(
            id,
            VolumeTariff {
                id,
                active,
                public,
                storage_limit,
                price: 0.0,
            },
        );
        id
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BillingClient for MockBilling {
    async fn subscribe(&self, _user_id: Uuid, request: &SubscribeRequest) -> ClientResult<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(refused("billing"));
        }
        self.record(format!("subscribe {}", request.resource_id));
        Ok(())
    }

    async fn rename(&self, _user_id: Uuid, resource_id: Uuid, new_label: &str) -> ClientResult<()> {
        self.record(format!("rename {resource_id} {new_label}"));
        Ok(())
    }

    async fn unsubscribe(&self, _user_id: Uuid, resource_id: Uuid) -> ClientResult<()> {
        self.record(format!("unsubscribe {resource_id}"));
        Ok(())
    }

    async fn massive_unsubscribe(&self, _user_id: Uuid, resource_ids: &[Uuid]) -> ClientResult<()> {
        if resource_ids.is_empty() {
            return Ok(());
        }
        self.record(format!("massive_unsubscribe {}", resource_ids.len()));
        Ok(())
    }

    async fn volume_tariff(&self, _user_id: Uuid, tariff_id: Uuid) -> ClientResult<VolumeTariff> {
        self.tariffs
            .lock()
            .unwrap()
            .get(&tariff_id)
            .cloned()
            .ok_or(ClientError::TariffNotFound(tariff_id))
    }

    async fn namespace_tariff(&self, _user_id: Uuid, _ns_id: &str) -> ClientResult<NamespaceTariff> {
        Ok(NamespaceTariff {
            id: Uuid::new_v4(),
            active: true,
            public: true,
            volume_size: self.namespace_quota.load(Ordering::SeqCst),
        })
    }
}

/// Orchestrator mock with switchable create failures.
pub struct MockOrchestrator {
    pub fail_create: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl MockOrchestrator {
    pub fn new() -> Self {
        Self {
            fail_create: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl OrchestratorClient for MockOrchestrator {
    async fn create_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(refused("orchestrator"));
        }
        self.record(format!("create {ns_id}/{}", manifest.name));
        Ok(())
    }

    async fn update_volume(&self, ns_id: &str, manifest: &VolumeManifest) -> ClientResult<()> {
        self.record(format!("update {ns_id}/{}", manifest.name));
        Ok(())
    }

    async fn delete_volume(&self, ns_id: &str, name: &str) -> ClientResult<()> {
        self.record(format!("delete {ns_id}/{name}"));
        Ok(())
    }
}
