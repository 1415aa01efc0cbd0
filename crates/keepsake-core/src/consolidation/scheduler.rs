//! Periodic consolidation
//!
//! Runs consolidation and retention pruning on an interval. A tick is
//! skipped when the consolidation history shows a run within the last
//! interval, so restarting a process does not re-run maintenance early.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::ConsolidationEngine;
use crate::memory::{MaintenanceReport, now};

/// Interval-driven maintenance loop
pub struct ConsolidationScheduler {
    engine: Arc<ConsolidationEngine>,
    interval: Duration,
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for it (an in-flight run finishes first)
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Consolidation scheduler task ended abnormally: {}", e);
        }
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ConsolidationScheduler {
    /// Create a scheduler; the interval is clamped to at least one millisecond
    pub fn new(engine: Arc<ConsolidationEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Interval between checks
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether enough time has passed since the last recorded run
    pub async fn should_run(&self) -> bool {
        let store = self.engine.long_term().persistent();
        match store.last_consolidation().await {
            Ok(Some(last)) => {
                let interval = chrono::Duration::from_std(self.interval)
                    .unwrap_or(chrono::Duration::MAX);
                let stale = now() - last >= interval;
                if !stale {
                    tracing::info!(
                        last_consolidation = %last,
                        "Skipping consolidation (last run was less than {:?} ago)",
                        self.interval
                    );
                }
                stale
            }
            Ok(None) => {
                tracing::info!("No previous consolidation found, running first consolidation");
                true
            }
            Err(e) => {
                tracing::warn!("Could not read consolidation history: {}, running anyway", e);
                true
            }
        }
    }

    /// One scheduler tick: maintenance if due; failures are logged
    pub async fn tick(&self) -> Option<MaintenanceReport> {
        if !self.should_run().await {
            return None;
        }
        match self.engine.run_maintenance(now()).await {
            Ok(report) => {
                tracing::info!(
                    memories_merged = report.consolidation.memories_merged,
                    pruned = report.pruned.len(),
                    duration_ms = report.consolidation.duration_ms,
                    "Periodic maintenance complete"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!("Periodic maintenance failed: {}", e);
                None
            }
        }
    }

    /// Run the loop on the tokio runtime until shut down.
    ///
    /// The first tick fires immediately.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
            tracing::debug!("Consolidation scheduler stopped");
        });
        SchedulerHandle { shutdown, task }
    }
}
