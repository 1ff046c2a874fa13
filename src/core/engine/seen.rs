//! Bounded dedup set of `(transaction_hash, asset_id)` keys.
//!
//! Duplicate suppression is best-effort within a bounded memory window:
//! when the set grows past its cap it is cleared wholesale rather than
//! evicted entry by entry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::store::{self, BlobStore};
use crate::core::tracker::{Tracker, TrackerStats};
use crate::error::Result;

/// Persisted filename.
const FILE_NAME: &str = "seen_trades.json";

/// Seen-trade set tuning knobs.
#[derive(Debug, Clone)]
pub struct SeenTradesConfig {
    /// Clear-all threshold (default 10 000).
    pub max_entries: usize,
    /// Keys kept (newest) when exporting a snapshot.
    pub max_export: usize,
}

impl Default for SeenTradesConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_export: 5_000,
        }
    }
}

#[derive(Default)]
struct SeenState {
    /// Insertion order, for the tail-trimmed export.
    order: Vec<String>,
    keys: HashSet<String>,
}

/// Serializable snapshot of the seen set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenTradesSnapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub trades: Vec<String>,
}

/// Capped set of already-processed trade keys.
pub struct SeenTrades {
    config: SeenTradesConfig,
    state: Mutex<SeenState>,
    dirty: AtomicBool,
    store: Option<Arc<dyn BlobStore>>,
}

impl SeenTrades {
    #[must_use]
    pub fn new(config: SeenTradesConfig, store: Option<Arc<dyn BlobStore>>) -> Self {
        Self {
            config,
            state: Mutex::new(SeenState::default()),
            dirty: AtomicBool::new(false),
            store,
        }
    }

    /// Record a key; returns `true` the first time it is seen.
    ///
    /// Crossing the cap clears the whole set, duplicates included.
    pub fn observe(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if !state.keys.insert(key.to_string()) {
            return false;
        }
        state.order.push(key.to_string());
        self.dirty.store(true, Ordering::SeqCst);
        drop(state);

        self.prune();
        true
    }

    /// Reset the set when it exceeds the cap.
    pub fn prune(&self) {
        let mut state = self.state.lock();
        if state.keys.len() > self.config.max_entries {
            debug!(entries = state.keys.len(), "Seen-trade set overflow, resetting");
            *state = SeenState::default();
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// Whether no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().keys.is_empty()
    }

    /// Export the newest keys, bounded by `max_export`.
    #[must_use]
    pub fn export(&self) -> SeenTradesSnapshot {
        let state = self.state.lock();
        let skip = state.order.len().saturating_sub(self.config.max_export);
        SeenTradesSnapshot {
            version: 1,
            timestamp: Utc::now(),
            trades: state.order[skip..].to_vec(),
        }
    }

    /// Rebuild the set from a snapshot.
    pub fn import(&self, snapshot: SeenTradesSnapshot) {
        let mut state = self.state.lock();
        state.keys = snapshot.trades.iter().cloned().collect();
        state.order = snapshot.trades;
        self.dirty.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Tracker for SeenTrades {
    fn name(&self) -> &'static str {
        "seen_trades"
    }

    async fn load(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(snapshot) =
            store::load_json::<SeenTradesSnapshot>(store.as_ref(), FILE_NAME).await?
        {
            info!(trades = snapshot.trades.len(), "Loaded seen-trade set");
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
        let snapshot = self.export();
        store::save_json(store.as_ref(), FILE_NAME, &snapshot).await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> TrackerStats {
        TrackerStats {
            name: "seen_trades",
            entries: self.len(),
            pending: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen() -> SeenTrades {
        SeenTrades::new(SeenTradesConfig::default(), None)
    }

    #[test]
    fn first_observation_is_new_second_is_not() {
        let s = seen();
        assert!(s.observe("0xhash:a1"));
        assert!(!s.observe("0xhash:a1"));
        assert!(s.observe("0xhash:a2"));
    }

    #[test]
    fn overflow_resets_to_empty() {
        let s = seen();
        for i in 0..=10_000 {
            s.observe(&format!("0x{i}:a"));
        }
        // The 10 001st insert pushed the set over the cap.
        assert!(s.is_empty());
    }

    #[test]
    fn prune_below_cap_keeps_everything() {
        let s = seen();
        for i in 0..100 {
            s.observe(&format!("0x{i}:a"));
        }
        s.prune();
        assert_eq!(s.len(), 100);
    }

    #[test]
    fn export_import_reconstructs_the_set() {
        let s = seen();
        for i in 0..50 {
            s.observe(&format!("0x{i}:a"));
        }

        let snapshot = s.export();
        let restored = seen();
        restored.import(snapshot);

        assert_eq!(restored.len(), 50);
        assert!(!restored.observe("0x0:a"));
        assert!(restored.observe("0xnew:a"));
    }

    #[test]
    fn export_keeps_the_newest_tail() {
        let s = SeenTrades::new(
            SeenTradesConfig {
                max_entries: 10_000,
                max_export: 10,
            },
            None,
        );
        for i in 0..25 {
            s.observe(&format!("0x{i}:a"));
        }

        let snapshot = s.export();
        assert_eq!(snapshot.trades.len(), 10);
        assert_eq!(snapshot.trades[0], "0x15:a");
        assert_eq!(snapshot.trades[9], "0x24:a");
    }
}
