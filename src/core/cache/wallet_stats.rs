//! TTL-bounded cache of per-wallet historical statistics.
//!
//! The cache is the only component that talks to the upstream history
//! endpoints on the hot path. Entries refresh lazily on access; a failed
//! refresh falls back to the stale entry when one exists, so a flaky
//! upstream degrades alert enrichment instead of killing the evaluator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::domain::{is_contrarian_price, WalletStats};
use crate::core::exchange::DataApi;
use crate::core::store::{self, BlobStore};
use crate::core::tracker::{ContrarianPublisher, Tracker, TrackerStats};
use crate::error::Result;

/// Persisted filename.
const FILE_NAME: &str = "wallet_cache.json";

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched entry stays fresh.
    pub ttl: Duration,
    /// Activity rows fetched to derive market/trade counts.
    pub activity_limit: usize,
    /// Page size for the closed-positions fetch (two pages are read).
    pub positions_page: usize,
    /// Entries above this average entry price do not count as suspicious.
    pub win_rate_max_entry_price: Decimal,
    /// Contrarian price band threshold.
    pub contrarian_threshold: Decimal,
    /// Serialized-snapshot size bound in bytes.
    pub max_snapshot_bytes: usize,
    /// Hard cap on exported entries, keeping the most recently fetched.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(900),
            activity_limit: 500,
            positions_page: 50,
            win_rate_max_entry_price: dec!(0.85),
            contrarian_threshold: dec!(0.20),
            max_snapshot_bytes: 512 * 1024,
            max_entries: 2000,
        }
    }
}

/// Serializable snapshot of the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub wallets: HashMap<String, WalletStats>,
}

/// TTL cache over upstream user-activity and closed-positions history.
pub struct WalletStatsCache {
    api: Arc<dyn DataApi>,
    config: CacheConfig,
    entries: RwLock<HashMap<String, WalletStats>>,
    /// Write-only capability into the contrarian tracker.
    contrarian: Option<ContrarianPublisher>,
    dirty: AtomicBool,
    store: Option<Arc<dyn BlobStore>>,
}

impl WalletStatsCache {
    #[must_use]
    pub fn new(
        api: Arc<dyn DataApi>,
        config: CacheConfig,
        contrarian: Option<ContrarianPublisher>,
        store: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self {
            api,
            config,
            entries: RwLock::new(HashMap::new()),
            contrarian,
            dirty: AtomicBool::new(false),
            store,
        }
    }

    /// Get statistics for a wallet, refreshing from upstream when stale.
    ///
    /// On refresh failure a stale cached entry is returned with a warning;
    /// the error only surfaces for wallets never seen before.
    pub async fn get(&self, wallet: &str) -> Result<WalletStats> {
        let key = wallet.to_lowercase();

        if let Some(cached) = self.fresh_entry(&key) {
            return Ok(cached);
        }

        match self.fetch(&key).await {
            Ok(stats) => {
                self.insert(key, stats.clone());
                Ok(stats)
            }
            Err(e) => {
                if let Some(stale) = self.entries.read().get(&key).cloned() {
                    warn!(
                        wallet = %key,
                        error = %e,
                        "Stats refresh failed, serving stale entry"
                    );
                    Ok(stale)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn fresh_entry(&self, key: &str) -> Option<WalletStats> {
        let entries = self.entries.read();
        let stats = entries.get(key)?;
        let age = Utc::now().signed_duration_since(stats.fetched_at);
        (age.to_std().unwrap_or_default() < self.config.ttl).then(|| stats.clone())
    }

    fn insert(&self, key: String, stats: WalletStats) {
        self.entries.write().insert(key, stats);
        self.dirty.store(true, Ordering::SeqCst);
    }

    async fn fetch(&self, wallet: &str) -> Result<WalletStats> {
        let activity = self
            .api
            .user_activity(wallet, self.config.activity_limit)
            .await?;

        let total_trades = activity.len() as u64;
        let unique_markets = {
            let mut markets: Vec<&str> = activity
                .iter()
                .map(|a| a.condition_id.as_str())
                .filter(|c| !c.is_empty())
                .collect();
            markets.sort_unstable();
            markets.dedup();
            markets.len()
        };

        // Two pages of resolved positions; a failure here degrades to an
        // empty history rather than failing the whole lookup.
        let page = self.config.positions_page;
        let mut closed = Vec::new();
        for offset in [0, page] {
            match self.api.closed_positions(wallet, page, offset).await {
                Ok(mut positions) => {
                    let got = positions.len();
                    closed.append(&mut positions);
                    if got < page {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        wallet = %wallet,
                        error = %e,
                        "Closed positions fetch failed, proceeding without"
                    );
                    break;
                }
            }
        }

        if let Some(publisher) = &self.contrarian {
            for position in &closed {
                if is_contrarian_price(position.avg_price, self.config.contrarian_threshold) {
                    publisher.record(wallet, position.is_win());
                }
            }
        }

        Ok(WalletStats::compute(
            wallet,
            unique_markets,
            total_trades,
            &closed,
            self.config.win_rate_max_entry_price,
        ))
    }

    /// Export the current snapshot.
    #[must_use]
    pub fn export(&self) -> CacheSnapshot {
        CacheSnapshot {
            version: 1,
            timestamp: Utc::now(),
            wallets: self.entries.read().clone(),
        }
    }

    /// Replace the cache contents with a snapshot.
    pub fn import(&self, snapshot: CacheSnapshot) {
        let mut entries = self.entries.write();
        *entries = snapshot.wallets;
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Number of cached wallets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop entries not refreshed within twice the TTL.
    pub fn prune_stale(&self) {
        let ttl2 = chrono::Duration::from_std(self.config.ttl * 2)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - ttl2;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, stats| stats.fetched_at > cutoff);
        if entries.len() < before {
            debug!(pruned = before - entries.len(), "Pruned stale cache entries");
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Evict oldest-fetched entries until the serialized snapshot fits
    /// within `max_bytes`.
    pub fn trim_to_max_size(&self, max_bytes: usize) {
        let mut entries = self.entries.write();

        // Oldest fetched_at first, so eviction pops from the front.
        let mut order: Vec<(String, DateTime<Utc>)> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.fetched_at))
            .collect();
        order.sort_by_key(|(_, fetched_at)| *fetched_at);
        let mut next_evict = 0;

        loop {
            let snapshot = CacheSnapshot {
                version: 1,
                timestamp: Utc::now(),
                wallets: entries.clone(),
            };
            let serialized = match serde_json::to_string(&snapshot) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "Cache snapshot serialization failed during trim");
                    return;
                }
            };
            if serialized.len() <= max_bytes || entries.is_empty() {
                return;
            }
            let Some((wallet, _)) = order.get(next_evict) else {
                return;
            };
            entries.remove(wallet);
            next_evict += 1;
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Snapshot bounded for persistence: size-trimmed, then entry-capped
    /// keeping the most recently fetched wallets.
    fn bounded_snapshot(&self) -> CacheSnapshot {
        self.trim_to_max_size(self.config.max_snapshot_bytes);

        let mut snapshot = self.export();
        if snapshot.wallets.len() > self.config.max_entries {
            let mut order: Vec<(String, DateTime<Utc>)> = snapshot
                .wallets
                .iter()
                .map(|(k, v)| (k.clone(), v.fetched_at))
                .collect();
            order.sort_by_key(|(_, fetched_at)| std::cmp::Reverse(*fetched_at));
            let keep: std::collections::HashSet<String> = order
                .into_iter()
                .take(self.config.max_entries)
                .map(|(k, _)| k)
                .collect();
            snapshot.wallets.retain(|k, _| keep.contains(k));
        }
        snapshot
    }
}

#[async_trait]
impl Tracker for WalletStatsCache {
    fn name(&self) -> &'static str {
        "wallet_cache"
    }

    async fn load(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(snapshot) = store::load_json::<CacheSnapshot>(store.as_ref(), FILE_NAME).await?
        {
            info!(wallets = snapshot.wallets.len(), "Loaded wallet cache");
            self.import(snapshot);
        }
        Ok(())
    }

    fn start(self: Arc<Self>, _shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        None
    }

    async fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if !self.dirty.load(Ordering::SeqCst) || self.is_empty() {
            return Ok(());
        }

        let snapshot = self.bounded_snapshot();
        store::save_json(store.as_ref(), FILE_NAME, &snapshot).await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> TrackerStats {
        TrackerStats {
            name: "wallet_cache",
            entries: self.len(),
            pending: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::testkit::api::ScriptedDataApi;
    use crate::testkit::domain::{activity, closed_position};

    fn cache_with(api: ScriptedDataApi, config: CacheConfig) -> WalletStatsCache {
        WalletStatsCache::new(Arc::new(api), config, None, None)
    }

    #[tokio::test]
    async fn get_computes_stats_from_upstream() {
        let api = ScriptedDataApi::new();
        api.push_activity(vec![
            activity("c1", dec!(0.5)),
            activity("c1", dec!(0.6)),
            activity("c2", dec!(0.3)),
        ]);
        api.push_closed(vec![
            closed_position("c1", dec!(0.30), dec!(70)),
            closed_position("c2", dec!(0.40), dec!(-40)),
        ]);

        let cache = cache_with(api, CacheConfig::default());
        let stats = cache.get("0xW").await.unwrap();

        assert_eq!(stats.unique_markets, 2);
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.win_count, 1);
        assert_eq!(stats.loss_count, 1);
    }

    #[tokio::test]
    async fn fresh_entry_skips_upstream() {
        let api = ScriptedDataApi::new();
        api.push_activity(vec![activity("c1", dec!(0.5))]);
        let counters = api.counters();

        let cache = cache_with(api, CacheConfig::default());
        let first = cache.get("0xw").await.unwrap();
        let second = cache.get("0xw").await.unwrap();

        assert_eq!(counters.activity_calls(), 1);
        assert_eq!(second, first);
        assert!(second.fetched_at <= Utc::now());
    }

    #[tokio::test]
    async fn stale_entry_served_on_refresh_failure() {
        let api = ScriptedDataApi::new();
        api.push_activity(vec![activity("c1", dec!(0.5))]);
        // Every later fetch fails with an upstream error.
        api.fail_activity_after(1);

        let cache = cache_with(
            api,
            CacheConfig {
                ttl: Duration::from_millis(1),
                ..CacheConfig::default()
            },
        );

        let first = cache.get("0xw").await.unwrap();
        assert_eq!(first.unique_markets, 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.get("0xw").await.unwrap();
        assert_eq!(second.unique_markets, 1);
        assert_eq!(second.fetched_at, first.fetched_at);
    }

    #[tokio::test]
    async fn unknown_wallet_surfaces_fetch_error() {
        let api = ScriptedDataApi::new();
        api.fail_activity_after(0);
        let cache = cache_with(api, CacheConfig::default());
        assert!(cache.get("0xnew").await.is_err());
    }

    #[tokio::test]
    async fn positions_failure_degrades_to_empty_history() {
        let api = ScriptedDataApi::new();
        api.push_activity(vec![activity("c1", dec!(0.5))]);
        api.fail_closed_after(0);

        let cache = cache_with(api, CacheConfig::default());
        let stats = cache.get("0xw").await.unwrap();
        assert_eq!(stats.resolved(), 0);
        assert_eq!(stats.win_rate, 0.0);
    }

    #[tokio::test]
    async fn trim_to_max_size_fits_or_empties() {
        let api = ScriptedDataApi::new();
        for i in 0..20 {
            api.push_activity(vec![activity(&format!("c{i}"), dec!(0.5))]);
        }
        let cache = cache_with(api, CacheConfig::default());
        for i in 0..20 {
            cache.get(&format!("0xwallet{i:02}")).await.unwrap();
        }

        let bound = 2_000;
        cache.trim_to_max_size(bound);
        let serialized = serde_json::to_string(&cache.export()).unwrap();
        assert!(serialized.len() <= bound || cache.is_empty());
    }

    #[tokio::test]
    async fn export_import_round_trips() {
        let api = ScriptedDataApi::new();
        api.push_activity(vec![activity("c1", dec!(0.5))]);
        let cache = cache_with(api, CacheConfig::default());
        cache.get("0xw").await.unwrap();

        let snapshot = cache.export();
        let other = cache_with(ScriptedDataApi::new(), CacheConfig::default());
        other.import(snapshot.clone());

        assert_eq!(other.len(), 1);
        assert_eq!(
            other.export().wallets.get("0xw"),
            snapshot.wallets.get("0xw")
        );
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedDataApi::new();
        api.push_activity(vec![activity("c1", dec!(0.5))]);
        let cache = WalletStatsCache::new(
            Arc::new(api),
            CacheConfig::default(),
            None,
            Some(store.clone()),
        );
        cache.get("0xw").await.unwrap();
        Tracker::save(&cache).await.unwrap();

        let restored = WalletStatsCache::new(
            Arc::new(ScriptedDataApi::new()),
            CacheConfig::default(),
            None,
            Some(store),
        );
        restored.load().await.unwrap();
        assert_eq!(restored.len(), 1);
    }
}
