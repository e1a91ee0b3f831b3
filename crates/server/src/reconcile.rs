//! Background provisioning reconciler.
//!
//! Volume rows commit before the orchestrator and billing calls, so a
//! crash or an outage can leave rows in the `pending` state. The reconciler
//! sweeps those rows periodically: it retries provisioning, and after
//! `max_attempts` failures it compensates by soft-deleting the row, which
//! releases the reserved capacity.

use crate::service::VolumeService;
use cistern_core::config::ReconcileConfig;
use cistern_ledger::repos::{ProvisionState, VolumeRepo};
use cistern_ledger::VolumeStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Reconciler {
    service: Arc<VolumeService>,
    store: Arc<dyn VolumeStore>,
    config: ReconcileConfig,
}

/// Outcome counts of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub provisioned: usize,
    pub retried: usize,
    pub compensated: usize,
}

impl Reconciler {
    pub fn new(
        service: Arc<VolumeService>,
        store: Arc<dyn VolumeStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            service,
            store,
            config,
        }
    }

    /// Spawn the sweep loop.
    pub fn spawn(self) -> JoinHandle<()> {
        let interval = self.config.interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(stats) if stats.scanned > 0 => {
                        tracing::info!(
                            scanned = stats.scanned,
                            provisioned = stats.provisioned,
                            retried = stats.retried,
                            compensated = stats.compensated,
                            "reconcile sweep done"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "reconcile sweep failed"),
                }
            }
        })
    }

    /// Process one batch of pending volumes.
    pub async fn sweep(&self) -> Result<SweepStats, cistern_ledger::LedgerError> {
        let mut stats = SweepStats::default();

        for row in self.store.pending_volumes(self.config.batch_limit).await? {
            stats.scanned += 1;
            match self.service.provision(&row).await {
                Ok(()) => {
                    self.store
                        .set_provision_state(row.volume_id, ProvisionState::Provisioned)
                        .await?;
                    stats.provisioned += 1;
                }
                Err(err) => {
                    let attempts = self.store.record_provision_attempt(row.volume_id).await?;
                    if attempts >= self.config.max_attempts {
                        tracing::warn!(
                            volume_id = %row.volume_id,
                            attempts,
                            error = %err,
                            "provisioning given up, compensating"
                        );
                        if let Err(err) = self.service.compensate(&row).await {
                            tracing::error!(
                                volume_id = %row.volume_id,
                                error = %err,
                                "compensation failed"
                            );
                        } else {
                            stats.compensated += 1;
                        }
                    } else {
                        tracing::debug!(
                            volume_id = %row.volume_id,
                            attempts,
                            error = %err,
                            "provisioning retry failed"
                        );
                        stats.retried += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}
