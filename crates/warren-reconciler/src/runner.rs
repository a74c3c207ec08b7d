//! The reconciler's tick loop.

use std::time::Duration;

use tokio::sync::watch;
use warren_store::{Store, StoreError};
use warren_types::Timestamp;

use crate::plan::{Thresholds, plan};

/// Loop timing and pass thresholds.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub tick_interval: Duration,
    pub thresholds: Thresholds,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            thresholds: Thresholds::default(),
        }
    }
}

/// Runs the reconciler until `shutdown` flips to true. Leader-only,
/// like the scheduler.
pub async fn run(store: Store, config: ReconcilerConfig, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(component = "reconciler", period = ?config.tick_interval, "started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !store.is_leader() {
                    continue;
                }
                tick(&store, &config.thresholds).await;
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!(component = "reconciler", "stopped");
}

async fn tick(store: &Store, thresholds: &Thresholds) {
    let snapshot = store.read_snapshot();
    let commands = plan(&snapshot, Timestamp::now(), thresholds);
    if commands.is_empty() {
        return;
    }
    tracing::debug!(component = "reconciler", count = commands.len(), "submitting corrections");

    for command in commands {
        let kind = command.kind();
        match store.submit(command).await {
            Ok(()) => {}
            Err(StoreError::NotLeader { .. } | StoreError::Timeout | StoreError::Superseded) => {
                tracing::debug!(component = "reconciler", kind, "leadership moved, skipping tick");
                return;
            }
            Err(e) => {
                // Level-triggered: a rejected correction (stale
                // observation) is re-derived from fresh state next tick.
                tracing::warn!(component = "reconciler", kind, error = %e, "command rejected");
            }
        }
    }
}
