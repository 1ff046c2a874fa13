//! Per-wallet history of contrarian outcomes.
//!
//! Counts wins and losses for positions entered at extreme prices. Updates
//! arrive over a bounded channel and are applied serially by a dedicated
//! worker, so callers never touch the map and never block; an update
//! dropped on overflow is acceptable, the signal is statistical.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Tracker, TrackerStats};
use crate::core::store::BlobStore;
use crate::error::Result;

/// Persisted filename.
const FILE_NAME: &str = "contrarian.txt";

/// Contrarian tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct ContrarianConfig {
    /// Minimum wins before the wallet can alert.
    pub min_wins: u32,
    /// Minimum win rate before the wallet can alert.
    pub min_rate: f64,
    /// Capacity of the update channel (default 1000).
    pub update_buffer: usize,
    /// Serialized-file size bound; pruning kicks in above this.
    pub max_file_bytes: usize,
    /// How often the worker saves when dirty.
    pub save_interval: Duration,
}

impl Default for ContrarianConfig {
    fn default() -> Self {
        Self {
            min_wins: 3,
            min_rate: 0.7,
            update_buffer: 1000,
            max_file_bytes: 256 * 1024,
            save_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Record {
    wins: u16,
    losses: u16,
}

impl Record {
    const fn total(self) -> u32 {
        self.wins as u32 + self.losses as u32
    }
}

#[derive(Debug)]
struct Update {
    wallet: String,
    win: bool,
}

/// Write-only capability handed to the wallet stats cache.
///
/// Publishing is a non-blocking send; when the channel is full the update
/// is dropped with a warning.
#[derive(Clone)]
pub struct ContrarianPublisher {
    tx: mpsc::Sender<Update>,
}

impl ContrarianPublisher {
    /// Record the outcome of a contrarian entry for `wallet`.
    pub fn record(&self, wallet: &str, win: bool) {
        let update = Update {
            wallet: wallet.to_lowercase(),
            win,
        };
        if self.tx.try_send(update).is_err() {
            warn!(wallet = %wallet, "Contrarian update channel full, dropping update");
        }
    }
}

/// Bounded-counter history of contrarian outcomes per wallet.
pub struct ContrarianTracker {
    config: ContrarianConfig,
    entries: Mutex<HashMap<String, Record>>,
    tx: mpsc::Sender<Update>,
    rx: Mutex<Option<mpsc::Receiver<Update>>>,
    dirty: AtomicBool,
    store: Option<Arc<dyn BlobStore>>,
}

impl ContrarianTracker {
    #[must_use]
    pub fn new(config: ContrarianConfig, store: Option<Arc<dyn BlobStore>>) -> Self {
        let (tx, rx) = mpsc::channel(config.update_buffer.max(1));
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            tx,
            rx: Mutex::new(Some(rx)),
            dirty: AtomicBool::new(false),
            store,
        }
    }

    /// Write-only publishing capability for collaborators.
    #[must_use]
    pub fn publisher(&self) -> ContrarianPublisher {
        ContrarianPublisher {
            tx: self.tx.clone(),
        }
    }

    /// Queue a contrarian outcome; non-blocking, drops on overflow.
    pub fn record_result(&self, wallet: &str, win: bool) {
        self.publisher().record(wallet, win);
    }

    /// Whether this wallet's contrarian record crosses the alert bar.
    pub fn should_alert(&self, wallet: &str) -> bool {
        let key = wallet.to_lowercase();
        let entries = self.entries.lock();
        let Some(record) = entries.get(&key) else {
            return false;
        };
        let total = record.total();
        if total == 0 || u32::from(record.wins) < self.config.min_wins {
            return false;
        }
        f64::from(record.wins) / f64::from(total) >= self.config.min_rate
    }

    /// Current counters for a wallet, if tracked.
    pub fn counters(&self, wallet: &str) -> Option<(u16, u16)> {
        self.entries
            .lock()
            .get(&wallet.to_lowercase())
            .map(|r| (r.wins, r.losses))
    }

    /// Apply all queued updates without a worker task. Test hook.
    pub fn drain_pending(&self) {
        let mut guard = self.rx.lock();
        if let Some(rx) = guard.as_mut() {
            while let Ok(update) = rx.try_recv() {
                self.apply(update);
            }
        }
    }

    fn apply(&self, update: Update) {
        let mut entries = self.entries.lock();
        let record = entries.entry(update.wallet).or_default();
        if update.win {
            record.wins = record.wins.saturating_add(1);
        } else {
            record.losses = record.losses.saturating_add(1);
        }
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// One record per line: `addr:wins:losses`, sorted for stable output.
    fn serialize(entries: &HashMap<String, Record>) -> String {
        let mut wallets: Vec<_> = entries.iter().collect();
        wallets.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        for (wallet, record) in wallets {
            out.push_str(wallet);
            out.push(':');
            out.push_str(&record.wins.to_string());
            out.push(':');
            out.push_str(&record.losses.to_string());
            out.push('\n');
        }
        out
    }

    /// Tolerant line parser: blank lines, wrong arity, and non-numeric
    /// counters are skipped.
    fn parse(text: &str) -> HashMap<String, Record> {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() != 3 {
                continue;
            }
            let (Ok(wins), Ok(losses)) = (parts[1].parse::<u16>(), parts[2].parse::<u16>()) else {
                continue;
            };
            entries.insert(parts[0].to_lowercase(), Record { wins, losses });
        }
        entries
    }

    /// Serialize under the size bound, pruning low-activity wallets in
    /// escalating passes when necessary.
    fn serialize_bounded(&self) -> String {
        let mut entries = self.entries.lock();
        let mut text = Self::serialize(&entries);
        let mut floor = 2u32;

        while text.len() > self.config.max_file_bytes && !entries.is_empty() {
            let before = entries.len();
            entries.retain(|_, record| record.total() >= floor);
            debug!(
                floor,
                pruned = before - entries.len(),
                "Pruning contrarian history to fit size bound"
            );
            floor += 1;
            text = Self::serialize(&entries);
        }
        text
    }

    async fn run_worker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let Some(mut rx) = self.rx.lock().take() else {
            warn!("Contrarian worker already running");
            return;
        };
        let mut save_ticker = tokio::time::interval(self.config.save_interval);
        save_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it.
        save_ticker.tick().await;

        loop {
            tokio::select! {
                update = rx.recv() => {
                    match update {
                        Some(update) => self.apply(update),
                        None => break,
                    }
                }
                _ = save_ticker.tick() => {
                    if let Err(e) = Tracker::save(self.as_ref()).await {
                        warn!(error = %e, "Periodic contrarian save failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        // Apply whatever is already queued before standing down.
        while let Ok(update) = rx.try_recv() {
            self.apply(update);
        }
        info!("Contrarian worker stopped");
    }
}

#[async_trait]
impl Tracker for ContrarianTracker {
    fn name(&self) -> &'static str {
        "contrarian"
    }

    async fn load(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let Some(text) = store.load_text(FILE_NAME).await? else {
            return Ok(());
        };

        let parsed = Self::parse(&text);
        info!(wallets = parsed.len(), "Loaded contrarian history");
        *self.entries.lock() = parsed;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        Some(tokio::spawn(self.run_worker(shutdown)))
    }

    async fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.entries.lock().is_empty() {
            return Ok(());
        }

        let text = self.serialize_bounded();
        store.save_text(FILE_NAME, &text).await?;
        // Only a successful save clears the dirty flag.
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> TrackerStats {
        TrackerStats {
            name: "contrarian",
            entries: self.entries.lock().len(),
            pending: self.config.update_buffer.saturating_sub(self.tx.capacity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ContrarianTracker {
        ContrarianTracker::new(ContrarianConfig::default(), None)
    }

    fn record_n(t: &ContrarianTracker, wallet: &str, wins: u32, losses: u32) {
        for _ in 0..wins {
            t.record_result(wallet, true);
        }
        for _ in 0..losses {
            t.record_result(wallet, false);
        }
        t.drain_pending();
    }

    #[test]
    fn win_rate_edge_alerts_at_exact_threshold() {
        let t = ContrarianTracker::new(
            ContrarianConfig {
                min_wins: 3,
                min_rate: 0.70,
                ..ContrarianConfig::default()
            },
            None,
        );
        record_n(&t, "0xEDGE", 7, 3);
        // rate is exactly 0.70
        assert!(t.should_alert("0xedge"));
    }

    #[test]
    fn below_min_wins_never_alerts() {
        let t = tracker();
        record_n(&t, "0xa", 2, 0);
        assert!(!t.should_alert("0xa"));
    }

    #[test]
    fn queries_are_lowercased() {
        let t = tracker();
        record_n(&t, "0xAbCd", 5, 0);
        assert!(t.should_alert("0xABCD"));
        assert_eq!(t.counters("0xabcd"), Some((5, 0)));
    }

    #[test]
    fn counters_saturate_at_u16_max() {
        let t = tracker();
        {
            let mut entries = t.entries.lock();
            entries.insert(
                "0xmax".into(),
                Record {
                    wins: u16::MAX,
                    losses: 0,
                },
            );
        }
        record_n(&t, "0xmax", 3, 0);
        assert_eq!(t.counters("0xmax"), Some((u16::MAX, 0)));
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let text = "0xa:3:1\n\nnot-a-record\n0xb:4\n0xc:x:2\n0xd:1:2:3\n0xE:2:2\n";
        let parsed = ContrarianTracker::parse(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["0xa"], Record { wins: 3, losses: 1 });
        assert_eq!(parsed["0xe"], Record { wins: 2, losses: 2 });
    }

    #[test]
    fn parse_then_serialize_round_trips() {
        let text = "0xa:3:1\n0xb:0:2\n0xc:65535:0\n";
        let parsed = ContrarianTracker::parse(text);
        let out = ContrarianTracker::serialize(&parsed);
        let mut in_lines: Vec<&str> = text.lines().collect();
        let mut out_lines: Vec<&str> = out.lines().collect();
        in_lines.sort_unstable();
        out_lines.sort_unstable();
        assert_eq!(in_lines, out_lines);
    }

    #[test]
    fn pruning_drops_low_activity_first() {
        let t = ContrarianTracker::new(
            ContrarianConfig {
                // Forces at least one pruning pass.
                max_file_bytes: 20,
                ..ContrarianConfig::default()
            },
            None,
        );
        record_n(&t, "0xquiet", 1, 0);
        record_n(&t, "0xbusy", 40, 10);

        let text = t.serialize_bounded();
        assert!(!text.contains("0xquiet"));
        assert!(text.contains("0xbusy"));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        use crate::core::store::MemoryStore;

        let store = Arc::new(MemoryStore::new());
        let t = ContrarianTracker::new(ContrarianConfig::default(), Some(store.clone()));
        record_n(&t, "0xa", 4, 2);
        Tracker::save(&t).await.unwrap();

        let restored = ContrarianTracker::new(ContrarianConfig::default(), Some(store));
        restored.load().await.unwrap();
        assert_eq!(restored.counters("0xa"), Some((4, 2)));
    }

    #[tokio::test]
    async fn save_without_changes_is_a_noop() {
        use crate::core::store::MemoryStore;

        let store = Arc::new(MemoryStore::new());
        let t = ContrarianTracker::new(ContrarianConfig::default(), Some(store.clone()));
        Tracker::save(&t).await.unwrap();
        assert!(store.is_empty());
    }
}
