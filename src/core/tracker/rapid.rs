//! Per-wallet sliding window of recent trade notionals.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Tracker, TrackerStats};
use crate::error::Result;

/// Rapid-trade window tuning knobs.
#[derive(Debug, Clone)]
pub struct RapidConfig {
    /// Sliding window length.
    pub window: Duration,
    /// Minimum trades inside the window.
    pub min_count: usize,
    /// Minimum combined notional inside the window.
    pub min_total: Decimal,
    /// How often the background pruner sweeps idle wallets.
    pub prune_interval: Duration,
}

impl Default for RapidConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            min_count: 3,
            min_total: Decimal::from(5000),
            prune_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of one window update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RapidSignal {
    pub count: usize,
    pub total: Decimal,
    pub rapid: bool,
}

/// Sliding window of `(timestamp, notional)` per wallet.
pub struct RapidTradeWindow {
    config: RapidConfig,
    recent: DashMap<String, Vec<(DateTime<Utc>, Decimal)>>,
}

impl RapidTradeWindow {
    #[must_use]
    pub fn new(config: RapidConfig) -> Self {
        Self {
            config,
            recent: DashMap::new(),
        }
    }

    /// Record a trade and report whether the wallet is trading rapidly.
    ///
    /// Entries older than the window are dropped on every insert, so after
    /// any call every stored trade is inside the window.
    pub fn observe(&self, wallet: &str, at: DateTime<Utc>, notional: Decimal) -> RapidSignal {
        let cutoff = at
            - chrono::Duration::from_std(self.config.window)
                .unwrap_or_else(|_| chrono::Duration::zero());

        let mut entry = self.recent.entry(wallet.to_lowercase()).or_default();
        entry.retain(|(ts, _)| *ts > cutoff);
        entry.push((at, notional));

        let count = entry.len();
        let total: Decimal = entry.iter().map(|(_, n)| *n).sum();
        RapidSignal {
            count,
            total,
            rapid: count >= self.config.min_count && total >= self.config.min_total,
        }
    }

    /// Drop wallets whose entries have all aged out of the window.
    pub fn prune(&self) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.window)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let before = self.recent.len();
        self.recent.retain(|_, entries| {
            entries.retain(|(ts, _)| *ts > cutoff);
            !entries.is_empty()
        });
        if self.recent.len() < before {
            debug!(pruned = before - self.recent.len(), "Pruned idle rapid-trade wallets");
        }
    }

    /// Wallets currently holding window entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    /// Whether no wallet has window entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

#[async_trait]
impl Tracker for RapidTradeWindow {
    fn name(&self) -> &'static str {
        "rapid_trade"
    }

    async fn load(&self) -> Result<()> {
        Ok(())
    }

    fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let interval = self.config.prune_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.prune(),
                    _ = shutdown.changed() => {
                        info!("Rapid-trade pruner stopped");
                        return;
                    }
                }
            }
        }))
    }

    async fn save(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> TrackerStats {
        TrackerStats {
            name: "rapid_trade",
            entries: self.len(),
            pending: 0,
        }
    }
}
