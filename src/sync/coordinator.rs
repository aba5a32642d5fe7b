//! Background sync coordinator for scheduled reconciliation passes

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::store::ContactStore;
use crate::sync::engine::Synchronizer;
use crate::sync::state::SyncPhase;

/// Configuration for the sync coordinator
#[derive(Debug, Clone)]
pub struct SyncCoordinatorConfig {
    /// Time between scheduled passes (in seconds)
    pub interval_secs: u64,
    /// Delay before the first pass once the store has data (in seconds)
    pub initial_delay_secs: u64,
}

impl Default for SyncCoordinatorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1800,
            initial_delay_secs: 5,
        }
    }
}

impl From<&SyncConfig> for SyncCoordinatorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval_secs: config.interval_secs,
            initial_delay_secs: config.initial_delay_secs,
        }
    }
}

/// Background sync coordinator
#[derive(Clone)]
pub struct SyncCoordinator {
    synchronizer: Arc<Synchronizer>,
    store: ContactStore,
    config: SyncCoordinatorConfig,
}

impl SyncCoordinator {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        store: ContactStore,
        config: SyncCoordinatorConfig,
    ) -> Self {
        Self {
            synchronizer,
            store,
            config,
        }
    }

    /// Run forever: one pass shortly after the store has data, then one per interval.
    pub async fn start(self: Arc<Self>) {
        info!(
            "Starting sync coordinator with interval {} seconds",
            self.config.interval_secs
        );

        self.wait_for_data().await;
        self.run_sync_cycle().await;

        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.run_sync_cycle().await;
        }
    }

    /// Poll every initial delay until the store is non-empty, for at most one interval.
    async fn wait_for_data(&self) {
        let delay = Duration::from_secs(self.config.initial_delay_secs.max(1));
        let give_up = time::Instant::now() + Duration::from_secs(self.config.interval_secs);
        loop {
            time::sleep(delay).await;
            if !self.store.is_empty() {
                return;
            }
            if time::Instant::now() >= give_up {
                debug!("Store still empty, running first pass anyway");
                return;
            }
        }
    }

    /// Reconcile every source whose settings allow scheduled passes.
    pub async fn run_sync_cycle(&self) {
        debug!("Starting sync cycle");

        let mut eligible = Vec::new();
        for state in self.synchronizer.states() {
            let Some(settings) = self.synchronizer.settings(&state.source_id) else {
                continue;
            };
            if !settings.enabled || !settings.auto_sync || state.phase == SyncPhase::Disabled {
                debug!("Skipping {}: automatic sync is off", state.source_id);
                continue;
            }
            eligible.push(state.source_id);
        }

        if eligible.is_empty() {
            debug!("No sources eligible for sync");
            return;
        }

        let passes = eligible.iter().map(|source_id| {
            let synchronizer = Arc::clone(&self.synchronizer);
            async move {
                match synchronizer.reconcile(source_id).await {
                    Ok(result) => {
                        info!("Synced {}: {}", source_id, result.summary());
                    }
                    Err(e) => {
                        warn!("Failed to sync {}: {}", source_id, e);
                    }
                }
            }
        });
        futures::future::join_all(passes).await;

        debug!("Sync cycle completed");
    }
}

/// Start the sync coordinator as a background task
pub fn start_sync_coordinator(
    synchronizer: Arc<Synchronizer>,
    store: ContactStore,
    config: SyncCoordinatorConfig,
) -> tokio::task::JoinHandle<()> {
    let coordinator = Arc::new(SyncCoordinator::new(synchronizer, store, config));

    tokio::spawn(async move {
        coordinator.start().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_half_hour_schedule() {
        let config = SyncCoordinatorConfig::default();
        assert_eq!(config.interval_secs, 1800);
        assert_eq!(config.initial_delay_secs, 5);
    }

    #[test]
    fn built_from_sync_config() {
        let sync = SyncConfig {
            interval_secs: 60,
            initial_delay_secs: 1,
            ..SyncConfig::default()
        };
        let config = SyncCoordinatorConfig::from(&sync);
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.initial_delay_secs, 1);
    }
}
