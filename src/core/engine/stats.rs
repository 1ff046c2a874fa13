//! Counters, recent-alert ring, and dashboard-facing derivations.
//!
//! All accessors return snapshots; internal maps and rings never leak.
//! Counters are monotone over the life of the process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::domain::{AlertReason, TradeAlert};

/// How far back the alert history reaches.
const HISTORY_HORIZON: Duration = Duration::from_secs(24 * 3600);

/// Capacity of the recent-alert ring.
const RECENT_CAP: usize = 100;

/// Snapshot of the filter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub events_received: u64,
    pub trades_evaluated: u64,
    pub duplicates: u64,
    pub skipped_low_notional: u64,
    pub skipped_no_wallet: u64,
    pub skipped_not_allowed: u64,
    pub skipped_obvious: u64,
    pub skipped_high_activity: u64,
    pub skipped_poor_win_rate: u64,
    pub stats_errors: u64,
    pub unknown_market: u64,
    pub alerts_sent: u64,
}

/// Process-wide evaluator statistics.
///
/// One instance per evaluator, owned by the core struct; nothing here is
/// module-scoped.
#[derive(Default)]
pub struct StatsBoard {
    events_received: AtomicU64,
    trades_evaluated: AtomicU64,
    duplicates: AtomicU64,
    skipped_low_notional: AtomicU64,
    skipped_no_wallet: AtomicU64,
    skipped_not_allowed: AtomicU64,
    skipped_obvious: AtomicU64,
    skipped_high_activity: AtomicU64,
    skipped_poor_win_rate: AtomicU64,
    stats_errors: AtomicU64,
    unknown_market: AtomicU64,
    alerts_sent: AtomicU64,
    event_types: Mutex<HashMap<String, u64>>,
    reason_counts: Mutex<HashMap<AlertReason, u64>>,
    recent: Mutex<VecDeque<TradeAlert>>,
    history: Mutex<VecDeque<DateTime<Utc>>>,
    by_wallet: Mutex<HashMap<String, u64>>,
    by_market: Mutex<HashMap<String, u64>>,
}

impl StatsBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_type(&self, label: &str) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        *self.event_types.lock().entry(label.to_string()).or_insert(0) += 1;
    }

    pub fn record_evaluated(&self) {
        self.trades_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_low_notional(&self) {
        self.skipped_low_notional.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_wallet(&self) {
        self.skipped_no_wallet.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_allowed(&self) {
        self.skipped_not_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_obvious(&self) {
        self.skipped_obvious.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_high_activity(&self) {
        self.skipped_high_activity.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poor_win_rate(&self) {
        self.skipped_poor_win_rate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stats_error(&self) {
        self.stats_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_market(&self) {
        self.unknown_market.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered alert: counters, ring, history, and top maps.
    pub fn record_alert(&self, alert: &TradeAlert) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);

        {
            let mut reasons = self.reason_counts.lock();
            for reason in &alert.reasons {
                *reasons.entry(*reason).or_insert(0) += 1;
            }
        }
        {
            let mut recent = self.recent.lock();
            if recent.len() == RECENT_CAP {
                recent.pop_front();
            }
            recent.push_back(alert.clone());
        }
        {
            let mut history = self.history.lock();
            history.push_back(alert.timestamp);
            Self::prune_history(&mut history);
        }
        *self
            .by_wallet
            .lock()
            .entry(alert.wallet.clone())
            .or_insert(0) += 1;
        *self
            .by_market
            .lock()
            .entry(alert.market.condition_id.clone())
            .or_insert(0) += 1;
    }

    fn prune_history(history: &mut VecDeque<DateTime<Utc>>) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(HISTORY_HORIZON)
                .unwrap_or_else(|_| chrono::Duration::zero());
        while history.front().is_some_and(|ts| *ts < cutoff) {
            history.pop_front();
        }
    }

    /// Snapshot of the filter counters.
    #[must_use]
    pub fn filter_stats(&self) -> FilterStats {
        FilterStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            trades_evaluated: self.trades_evaluated.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped_low_notional: self.skipped_low_notional.load(Ordering::Relaxed),
            skipped_no_wallet: self.skipped_no_wallet.load(Ordering::Relaxed),
            skipped_not_allowed: self.skipped_not_allowed.load(Ordering::Relaxed),
            skipped_obvious: self.skipped_obvious.load(Ordering::Relaxed),
            skipped_high_activity: self.skipped_high_activity.load(Ordering::Relaxed),
            skipped_poor_win_rate: self.skipped_poor_win_rate.load(Ordering::Relaxed),
            stats_errors: self.stats_errors.load(Ordering::Relaxed),
            unknown_market: self.unknown_market.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
        }
    }

    /// Per-reason alert counts.
    #[must_use]
    pub fn reason_counts(&self) -> HashMap<AlertReason, u64> {
        self.reason_counts.lock().clone()
    }

    /// Per-event-type ingest counts.
    #[must_use]
    pub fn event_type_counts(&self) -> HashMap<String, u64> {
        self.event_types.lock().clone()
    }

    /// The most recent alerts, oldest first.
    #[must_use]
    pub fn recent_alerts(&self) -> Vec<TradeAlert> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Bin the alert history into `buckets` equal windows over `duration`;
    /// bucket 0 is the oldest.
    #[must_use]
    pub fn alert_history_buckets(&self, duration: Duration, buckets: usize) -> Vec<u64> {
        if buckets == 0 {
            return Vec::new();
        }
        let mut counts = vec![0u64; buckets];
        let now = Utc::now();
        let span = chrono::Duration::from_std(duration)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let start = now - span;
        let bucket_span = span / buckets as i32;
        if bucket_span.is_zero() {
            return counts;
        }

        let history = self.history.lock();
        for ts in history.iter() {
            if *ts < start || *ts > now {
                continue;
            }
            let offset = *ts - start;
            let index = (offset.num_milliseconds() / bucket_span.num_milliseconds().max(1))
                as usize;
            counts[index.min(buckets - 1)] += 1;
        }
        counts
    }

    /// Wallets with the most alerts, descending.
    #[must_use]
    pub fn top_alerting_wallets(&self, limit: usize) -> Vec<(String, u64)> {
        Self::top_n(&self.by_wallet.lock(), limit)
    }

    /// Markets with the most alerts, descending.
    #[must_use]
    pub fn top_alerting_markets(&self, limit: usize) -> Vec<(String, u64)> {
        Self::top_n(&self.by_market.lock(), limit)
    }

    fn top_n(map: &HashMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> =
            map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }
}
