//! Periodic persistence loop over every tracker.
//!
//! Trackers save on a shared ticker and once more on shutdown. The final
//! flush runs under its own time budget so cancellation cannot preempt it,
//! and individual save failures never stop the sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::tracker::Tracker;

/// Persistence loop tuning knobs.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Cadence of the periodic save sweep.
    pub upload_interval: Duration,
    /// Independent time budget for the final flush on shutdown.
    pub shutdown_budget: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            upload_interval: Duration::from_secs(300),
            shutdown_budget: Duration::from_secs(30),
        }
    }
}

/// Drives periodic and on-shutdown saves for a set of trackers.
pub struct PersistenceLoop {
    config: PersistenceConfig,
    trackers: Vec<Arc<dyn Tracker>>,
}

impl PersistenceLoop {
    #[must_use]
    pub fn new(config: PersistenceConfig, trackers: Vec<Arc<dyn Tracker>>) -> Self {
        Self { config, trackers }
    }

    /// Run until `shutdown` flips, then flush once under the budget.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.upload_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.save_all().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Persistence loop stopping, running final save");
        if tokio::time::timeout(self.config.shutdown_budget, self.save_all())
            .await
            .is_err()
        {
            warn!(
                budget_secs = self.config.shutdown_budget.as_secs(),
                "Final save exceeded its budget"
            );
        }
    }

    /// Save every tracker once; failures are logged and skipped.
    pub async fn save_all(&self) {
        for tracker in &self.trackers {
            match tracker.save().await {
                Ok(()) => debug!(tracker = tracker.name(), "Saved"),
                Err(e) => warn!(tracker = tracker.name(), error = %e, "Save failed"),
            }
        }
    }
}
