//! The scheduler's tick loop.

use std::time::Duration;

use tokio::sync::watch;
use warren_store::{Store, StoreError};
use warren_types::Timestamp;

use crate::plan::plan;

/// Loop timing for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
        }
    }
}

/// Runs the scheduler until `shutdown` flips to true.
///
/// Non-leaders idle: only the leader plans, and a leadership change
/// mid-tick simply wastes the remaining submissions of that tick.
pub async fn run(store: Store, config: SchedulerConfig, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(component = "scheduler", period = ?config.tick_interval, "started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !store.is_leader() {
                    continue;
                }
                tick(&store).await;
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!(component = "scheduler", "stopped");
}

async fn tick(store: &Store) {
    let snapshot = store.read_snapshot();
    let commands = plan(&snapshot, Timestamp::now());
    if commands.is_empty() {
        return;
    }
    tracing::debug!(component = "scheduler", count = commands.len(), "submitting plan");

    for command in commands {
        let kind = command.kind();
        match store.submit(command).await {
            Ok(()) => {}
            Err(StoreError::NotLeader { .. } | StoreError::Timeout | StoreError::Superseded) => {
                // Soft: the rest of this plan is stale; replan next tick.
                tracing::debug!(component = "scheduler", kind, "leadership moved, skipping tick");
                return;
            }
            Err(e) => {
                // Apply-time rejection (e.g. a raced instance); the plan
                // converges on the next tick.
                tracing::warn!(component = "scheduler", kind, error = %e, "command rejected");
            }
        }
    }
}
