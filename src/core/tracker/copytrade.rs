//! Leader ledger and follower-side copy-trade correlation.
//!
//! Wallets with a strong suspicious win rate (or a verified contrarian
//! record) are leaders; their trades are recorded per
//! `(market, token, side)` key. A wallet repeatedly trading the same keys
//! shortly after leaders is flagged as a copy trader.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ContrarianTracker, Tracker, TrackerStats};
use crate::core::cache::WalletStatsCache;
use crate::core::domain::Side;
use crate::error::Result;

/// Copy-trade tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct CopyTradeConfig {
    /// How long after a leader trade a follower trade correlates.
    pub window: Duration,
    /// Distinct leaders required on the same key for a copy match.
    pub min_copy_count: usize,
    /// Correlated events required before the follower alerts.
    pub min_follower_events: usize,
    /// Suspicious wins required to qualify as a leader.
    pub leader_min_resolved: u32,
    /// Suspicious win rate required to qualify as a leader.
    pub leader_min_win_rate: f64,
    /// Horizon over which follower events accumulate.
    pub follower_horizon: Duration,
}

impl Default for CopyTradeConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(600),
            min_copy_count: 2,
            min_follower_events: 3,
            leader_min_resolved: 5,
            leader_min_win_rate: 0.7,
            follower_horizon: Duration::from_secs(6 * 3600),
        }
    }
}

/// Outcome of a copy check for one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopySignal {
    /// The trade matched enough distinct leaders to count as a copy.
    pub is_copy: bool,
    /// The follower has repeated the pattern often enough to alert.
    pub should_alert: bool,
}

type CopyKey = (String, String, Side);

struct LeaderEntry {
    wallet: String,
    at: DateTime<Utc>,
}

/// Leader ledger plus follower correlation state.
pub struct CopyTradeTracker {
    config: CopyTradeConfig,
    /// Read-only stats capability; never mutated from here.
    cache: Arc<WalletStatsCache>,
    contrarian: Arc<ContrarianTracker>,
    leader_trades: Mutex<HashMap<CopyKey, Vec<LeaderEntry>>>,
    follower_history: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl CopyTradeTracker {
    #[must_use]
    pub fn new(
        config: CopyTradeConfig,
        cache: Arc<WalletStatsCache>,
        contrarian: Arc<ContrarianTracker>,
    ) -> Self {
        Self {
            config,
            cache,
            contrarian,
            leader_trades: Mutex::new(HashMap::new()),
            follower_history: Mutex::new(HashMap::new()),
        }
    }

    /// Classify one trade: leaders extend the ledger, everyone else is
    /// checked against it.
    pub async fn observe_trade(
        &self,
        wallet: &str,
        condition_id: &str,
        token_id: &str,
        side: Side,
        at: DateTime<Utc>,
    ) -> CopySignal {
        let wallet = wallet.to_lowercase();

        if self.is_leader(&wallet).await {
            self.record_leader_trade(&wallet, condition_id, token_id, side, at);
            return CopySignal::default();
        }
        self.check_for_copy(&wallet, condition_id, token_id, side, at)
    }

    async fn is_leader(&self, wallet: &str) -> bool {
        if self.contrarian.should_alert(wallet) {
            return true;
        }
        // Stats come from the shared cache; normally a fresh hit since the
        // evaluator fetched them for this trade already.
        match self.cache.get(wallet).await {
            Ok(stats) => {
                stats.suspicious_wins >= self.config.leader_min_resolved
                    && stats.suspicious_win_rate >= self.config.leader_min_win_rate
            }
            Err(_) => false,
        }
    }

    fn record_leader_trade(
        &self,
        wallet: &str,
        condition_id: &str,
        token_id: &str,
        side: Side,
        at: DateTime<Utc>,
    ) {
        let key = (condition_id.to_string(), token_id.to_string(), side);
        let mut ledger = self.leader_trades.lock();
        ledger.entry(key).or_default().push(LeaderEntry {
            wallet: wallet.to_string(),
            at,
        });
    }

    fn check_for_copy(
        &self,
        follower: &str,
        condition_id: &str,
        token_id: &str,
        side: Side,
        at: DateTime<Utc>,
    ) -> CopySignal {
        let window = chrono::Duration::from_std(self.config.window)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let key = (condition_id.to_string(), token_id.to_string(), side);

        let distinct_leaders = {
            let ledger = self.leader_trades.lock();
            let Some(entries) = ledger.get(&key) else {
                return CopySignal::default();
            };
            let mut leaders: Vec<&str> = entries
                .iter()
                .filter(|e| e.wallet != follower && at - e.at <= window && e.at <= at)
                .map(|e| e.wallet.as_str())
                .collect();
            leaders.sort_unstable();
            leaders.dedup();
            leaders.len()
        };

        if distinct_leaders < self.config.min_copy_count {
            return CopySignal::default();
        }

        let horizon = chrono::Duration::from_std(self.config.follower_horizon)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let mut history = self.follower_history.lock();
        let events = history.entry(follower.to_string()).or_default();
        events.retain(|ts| at - *ts <= horizon);
        events.push(at);

        debug!(
            follower = %follower,
            leaders = distinct_leaders,
            events = events.len(),
            "Copy-trade correlation"
        );
        CopySignal {
            is_copy: true,
            should_alert: events.len() >= self.config.min_follower_events,
        }
    }

    /// Drop leader entries and follower events outside their horizons.
    pub fn prune(&self) {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.config.window)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let horizon = chrono::Duration::from_std(self.config.follower_horizon)
            .unwrap_or_else(|_| chrono::Duration::zero());

        let mut ledger = self.leader_trades.lock();
        ledger.retain(|_, entries| {
            entries.retain(|e| now - e.at <= window);
            !entries.is_empty()
        });
        drop(ledger);

        let mut history = self.follower_history.lock();
        history.retain(|_, events| {
            events.retain(|ts| now - *ts <= horizon);
            !events.is_empty()
        });
    }

    /// Leader ledger keys currently held.
    #[must_use]
    pub fn leader_keys(&self) -> usize {
        self.leader_trades.lock().len()
    }
}

#[async_trait]
impl Tracker for CopyTradeTracker {
    fn name(&self) -> &'static str {
        "copy_trade"
    }

    async fn load(&self) -> Result<()> {
        Ok(())
    }

    fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let interval = self.config.window;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.prune(),
                    _ = shutdown.changed() => {
                        info!("Copy-trade pruner stopped");
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
            name: "copy_trade",
            entries: self.follower_history.lock().len(),
            pending: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheConfig;
    use crate::core::tracker::ContrarianConfig;
    use crate::testkit::api::ScriptedDataApi;
    use crate::testkit::domain::closed_position;
    use rust_decimal_macros::dec;

    fn fixture() -> (CopyTradeTracker, Arc<ContrarianTracker>, Arc<WalletStatsCache>) {
        let contrarian = Arc::new(ContrarianTracker::new(ContrarianConfig::default(), None));
        let api = Arc::new(ScriptedDataApi::new());
        // The leader's history: six suspicious wins out of six.
        api.push_activity(
            (0..6)
                .map(|i| crate::testkit::domain::activity(&format!("c{i}"), dec!(0.4)))
                .collect(),
        );
        api.push_closed(
            (0..6)
                .map(|i| closed_position(&format!("c{i}"), dec!(0.40), dec!(60)))
                .collect(),
        );
        let cache = Arc::new(WalletStatsCache::new(
            api,
            CacheConfig::default(),
            None,
            None,
        ));
        let tracker = CopyTradeTracker::new(
            CopyTradeConfig {
                min_copy_count: 1,
                min_follower_events: 2,
                ..CopyTradeConfig::default()
            },
            cache.clone(),
            contrarian.clone(),
        );
        (tracker, contrarian, cache)
    }

    #[tokio::test]
    async fn leader_trades_extend_the_ledger() {
        let (tracker, _, _) = fixture();
        let signal = tracker
            .observe_trade("0xLEAD", "c1", "c1-yes", Side::Buy, Utc::now())
            .await;
        assert!(!signal.is_copy);
        assert_eq!(tracker.leader_keys(), 1);
    }

    #[tokio::test]
    async fn follower_matches_leader_within_window() {
        let (tracker, _, _) = fixture();
        let t0 = Utc::now();
        tracker
            .observe_trade("0xlead", "c1", "c1-yes", Side::Buy, t0)
            .await;

        let first = tracker
            .observe_trade("0xcopy", "c1", "c1-yes", Side::Buy, t0 + chrono::Duration::seconds(30))
            .await;
        assert!(first.is_copy);
        assert!(!first.should_alert);

        let second = tracker
            .observe_trade("0xcopy", "c1", "c1-yes", Side::Buy, t0 + chrono::Duration::seconds(60))
            .await;
        assert!(second.is_copy);
        assert!(second.should_alert);
    }

    #[tokio::test]
    async fn different_side_does_not_match() {
        let (tracker, _, _) = fixture();
        let t0 = Utc::now();
        tracker
            .observe_trade("0xlead", "c1", "c1-yes", Side::Buy, t0)
            .await;

        let signal = tracker
            .observe_trade("0xcopy", "c1", "c1-yes", Side::Sell, t0 + chrono::Duration::seconds(30))
            .await;
        assert!(!signal.is_copy);
    }

    #[tokio::test]
    async fn stale_leader_trades_do_not_match() {
        let (tracker, _, _) = fixture();
        let t0 = Utc::now();
        tracker
            .observe_trade("0xlead", "c1", "c1-yes", Side::Buy, t0)
            .await;

        let late = t0 + chrono::Duration::minutes(30);
        let signal = tracker
            .observe_trade("0xcopy", "c1", "c1-yes", Side::Buy, late)
            .await;
        assert!(!signal.is_copy);
    }

    #[tokio::test]
    async fn contrarian_winner_counts_as_leader() {
        let (tracker, contrarian, _) = fixture();
        for _ in 0..5 {
            contrarian.record_result("0xcw", true);
        }
        contrarian.drain_pending();

        let signal = tracker
            .observe_trade("0xcw", "c9", "c9-yes", Side::Buy, Utc::now())
            .await;
        assert!(!signal.is_copy);
        assert_eq!(tracker.leader_keys(), 1);
    }
}
