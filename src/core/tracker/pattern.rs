//! Behavioural pattern tracking: conviction doubling, stealth
//! accumulation, and perfect exit timing.
//!
//! The tracker maintains its own per-wallet position view from the trade
//! stream, so the synchronous checks need no upstream fetch. Full exits
//! schedule a deferred recheck that verifies the position stayed closed
//! and scores the exit against the price observed after the delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Tracker, TrackerStats};
use crate::core::domain::{ConvictionDetail, ExitTimingDetail, Side, StealthDetail, TradeEvent};
use crate::core::exchange::DataApi;
use crate::core::store::{self, BlobStore};
use crate::error::Result;

/// Persisted filename.
const FILE_NAME: &str = "pattern_tracker.json";

/// Pattern tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Mark-to-market loss fraction before an add counts as doubling down.
    pub conviction_min_loss_pct: f64,
    /// Minimum added shares for conviction doubling.
    pub conviction_min_add_size: Decimal,
    /// Minimum added notional for conviction doubling.
    pub conviction_min_add_value: Decimal,
    /// Stealth accumulation observation window.
    pub stealth_window: Duration,
    /// Same-direction trades required inside the window.
    pub stealth_min_trades: usize,
    /// Combined shares required inside the window.
    pub stealth_min_total_size: Decimal,
    /// Combined notional required inside the window.
    pub stealth_min_total_value: Decimal,
    /// Individual trades above this size are not stealthy and are ignored.
    pub stealth_max_single_trade: Decimal,
    /// Minimum wall-clock spread of the accumulation, in minutes.
    pub stealth_min_spread_minutes: f64,
    /// Verified exits required before the timing heuristic can fire.
    pub exit_min_exits: u32,
    /// Minimum rolling average timing score.
    pub exit_min_score: f64,
    /// Delay before an exit's verification recheck.
    pub initial_delay: Duration,
    /// Spacing between repeated rechecks of the same job.
    pub recheck_spacing: Duration,
    /// Rechecks after which a job is discarded.
    pub max_position_checks: u32,
    /// Worker scan cadence for due jobs.
    pub check_tick: Duration,
    /// Periodic save cadence when dirty.
    pub save_interval: Duration,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            conviction_min_loss_pct: 0.20,
            conviction_min_add_size: Decimal::from(100),
            conviction_min_add_value: Decimal::from(50),
            stealth_window: Duration::from_secs(1800),
            stealth_min_trades: 4,
            stealth_min_total_size: Decimal::from(500),
            stealth_min_total_value: Decimal::from(250),
            stealth_max_single_trade: Decimal::from(200),
            stealth_min_spread_minutes: 10.0,
            exit_min_exits: 3,
            exit_min_score: 0.5,
            initial_delay: Duration::from_secs(300),
            recheck_spacing: Duration::from_secs(300),
            max_position_checks: 5,
            check_tick: Duration::from_secs(5),
            save_interval: Duration::from_secs(300),
        }
    }
}

/// Findings returned to the evaluator for one trade.
#[derive(Debug, Clone, Default)]
pub struct PatternFindings {
    pub conviction: Option<ConvictionDetail>,
    pub stealth: Option<StealthDetail>,
    pub exit_timing: Option<ExitTimingDetail>,
}

/// Position view built from observed trades.
#[derive(Debug, Clone, Copy, Default)]
struct TrackedPosition {
    size: Decimal,
    avg_price: Decimal,
}

/// Deferred exit verification.
#[derive(Debug, Clone)]
struct ExitJob {
    wallet: String,
    condition_id: String,
    asset_id: String,
    outcome: String,
    exit_price: Decimal,
    check_after: DateTime<Utc>,
    checks_remaining: u32,
}

/// Rolling exit-timing score per wallet, the durable part of this tracker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct ExitScore {
    verified_exits: u32,
    total_score: f64,
}

impl ExitScore {
    fn average(self) -> f64 {
        if self.verified_exits == 0 {
            0.0
        } else {
            self.total_score / f64::from(self.verified_exits)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PatternSnapshot {
    version: u32,
    timestamp: DateTime<Utc>,
    exit_scores: HashMap<String, ExitScore>,
}

type PositionKey = (String, String, String);
type StealthKey = (String, String, String, Side);

/// Conviction, stealth, and exit-timing tracker.
pub struct PatternTracker {
    config: PatternConfig,
    api: Arc<dyn DataApi>,
    positions: Mutex<HashMap<PositionKey, TrackedPosition>>,
    stealth: Mutex<HashMap<StealthKey, Vec<(DateTime<Utc>, Decimal, Decimal)>>>,
    last_price: Mutex<HashMap<String, Decimal>>,
    pending: Mutex<Vec<ExitJob>>,
    exit_scores: Mutex<HashMap<String, ExitScore>>,
    dirty: AtomicBool,
    store: Option<Arc<dyn BlobStore>>,
}

impl PatternTracker {
    #[must_use]
    pub fn new(
        config: PatternConfig,
        api: Arc<dyn DataApi>,
        store: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self {
            config,
            api,
            positions: Mutex::new(HashMap::new()),
            stealth: Mutex::new(HashMap::new()),
            last_price: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            exit_scores: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            store,
        }
    }

    /// Record a price mark for an asset. Fed by every stream event,
    /// including wallet-less `last_trade_price` summaries.
    pub fn observe_price(&self, asset_id: &str, price: Decimal) {
        self.last_price.lock().insert(asset_id.to_string(), price);
    }

    /// Evaluate one trade against the tracked state and update it.
    pub fn on_trade(&self, trade: &TradeEvent, condition_id: &str, outcome: &str) -> PatternFindings {
        let Some(wallet) = trade.trader() else {
            return PatternFindings::default();
        };
        let wallet = wallet.to_lowercase();

        let conviction = if trade.side == Side::Buy {
            self.check_conviction(&wallet, condition_id, outcome, trade)
        } else {
            None
        };

        self.update_position(&wallet, condition_id, outcome, trade);
        let stealth = self.check_stealth(&wallet, condition_id, outcome, trade);
        let exit_timing = self.exit_timing(&wallet);

        PatternFindings {
            conviction,
            stealth,
            exit_timing,
        }
    }

    fn check_conviction(
        &self,
        wallet: &str,
        condition_id: &str,
        outcome: &str,
        trade: &TradeEvent,
    ) -> Option<ConvictionDetail> {
        let key = (wallet.to_string(), condition_id.to_string(), outcome.to_string());
        let positions = self.positions.lock();
        let held = positions.get(&key)?;
        if held.size <= Decimal::ZERO || held.avg_price <= Decimal::ZERO {
            return None;
        }

        let loss_pct = ((held.avg_price - trade.price) / held.avg_price)
            .to_f64()
            .unwrap_or(0.0);
        if loss_pct < self.config.conviction_min_loss_pct {
            return None;
        }
        if trade.size < self.config.conviction_min_add_size
            || trade.notional() < self.config.conviction_min_add_value
        {
            return None;
        }

        Some(ConvictionDetail {
            avg_entry_price: held.avg_price,
            current_price: trade.price,
            loss_pct,
            added_size: trade.size,
            added_value: trade.notional(),
        })
    }

    fn update_position(&self, wallet: &str, condition_id: &str, outcome: &str, trade: &TradeEvent) {
        let key = (wallet.to_string(), condition_id.to_string(), outcome.to_string());
        let mut positions = self.positions.lock();
        let held = positions.entry(key.clone()).or_default();

        match trade.side {
            Side::Buy => {
                let new_size = held.size + trade.size;
                if new_size > Decimal::ZERO {
                    held.avg_price =
                        (held.size * held.avg_price + trade.notional()) / new_size;
                }
                held.size = new_size;
            }
            Side::Sell => {
                let had_position = held.size > Decimal::ZERO;
                held.size -= trade.size;
                if held.size <= Decimal::ZERO {
                    positions.remove(&key);
                    drop(positions);
                    // Only a tracked entry becoming empty is an exit worth
                    // verifying; a bare sell says nothing about timing.
                    if had_position {
                        self.enqueue_exit(wallet, condition_id, outcome, trade);
                    }
                }
            }
        }
    }

    fn enqueue_exit(&self, wallet: &str, condition_id: &str, outcome: &str, trade: &TradeEvent) {
        let job = ExitJob {
            wallet: wallet.to_string(),
            condition_id: condition_id.to_string(),
            asset_id: trade.asset_id.clone(),
            outcome: outcome.to_string(),
            exit_price: trade.price,
            check_after: Utc::now()
                + chrono::Duration::from_std(self.config.initial_delay)
                    .unwrap_or_else(|_| chrono::Duration::zero()),
            checks_remaining: self.config.max_position_checks,
        };
        debug!(wallet = %job.wallet, asset = %job.asset_id, "Scheduled exit verification");
        self.pending.lock().push(job);
    }

    fn check_stealth(
        &self,
        wallet: &str,
        condition_id: &str,
        outcome: &str,
        trade: &TradeEvent,
    ) -> Option<StealthDetail> {
        // Oversized trades are not stealthy and do not count toward the
        // accumulation, but they do not reset it either.
        if trade.size > self.config.stealth_max_single_trade {
            return None;
        }

        let window = chrono::Duration::from_std(self.config.stealth_window)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let key = (
            wallet.to_string(),
            condition_id.to_string(),
            outcome.to_string(),
            trade.side,
        );

        let mut ledgers = self.stealth.lock();
        let ledger = ledgers.entry(key).or_default();
        ledger.retain(|(ts, _, _)| trade.timestamp - *ts <= window);
        ledger.push((trade.timestamp, trade.size, trade.notional()));

        if ledger.len() < self.config.stealth_min_trades {
            return None;
        }
        let total_size: Decimal = ledger.iter().map(|(_, s, _)| *s).sum();
        let total_value: Decimal = ledger.iter().map(|(_, _, v)| *v).sum();
        if total_size < self.config.stealth_min_total_size
            || total_value < self.config.stealth_min_total_value
        {
            return None;
        }

        let first = ledger.iter().map(|(ts, _, _)| *ts).min()?;
        let last = ledger.iter().map(|(ts, _, _)| *ts).max()?;
        let spread_minutes = (last - first).num_seconds() as f64 / 60.0;
        if spread_minutes < self.config.stealth_min_spread_minutes {
            return None;
        }

        Some(StealthDetail {
            trades: ledger.len() as u32,
            total_size,
            total_value,
            spread_minutes,
        })
    }

    fn exit_timing(&self, wallet: &str) -> Option<ExitTimingDetail> {
        let scores = self.exit_scores.lock();
        let score = scores.get(wallet)?;
        if score.verified_exits < self.config.exit_min_exits {
            return None;
        }
        let avg = score.average();
        (avg >= self.config.exit_min_score).then_some(ExitTimingDetail {
            verified_exits: score.verified_exits,
            avg_score: avg,
        })
    }

    /// Run every due exit verification once. Returns the number processed.
    pub async fn process_due_jobs(&self) -> usize {
        let now = Utc::now();
        let due: Vec<ExitJob> = {
            let mut pending = self.pending.lock();
            let (ready, later): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|j| j.check_after <= now);
            *pending = later;
            ready
        };

        let count = due.len();
        for job in due {
            self.run_check(job).await;
        }
        count
    }

    async fn run_check(&self, job: ExitJob) {
        // The exit only verifies if the position stayed closed.
        let reopened = match self
            .api
            .positions(&job.wallet, &job.condition_id, 10)
            .await
        {
            Ok(positions) => positions
                .iter()
                .any(|p| p.outcome == job.outcome && p.size > Decimal::ZERO),
            Err(e) => {
                warn!(
                    wallet = %job.wallet,
                    market = %job.condition_id,
                    error = %e,
                    "Exit verification fetch failed"
                );
                self.requeue(job);
                return;
            }
        };
        if reopened {
            debug!(wallet = %job.wallet, asset = %job.asset_id, "Position reopened, exit not verified");
            return;
        }

        let Some(later_price) = self.last_price.lock().get(&job.asset_id).copied() else {
            // No post-exit mark yet; try again later.
            self.requeue(job);
            return;
        };

        let score = exit_score(job.exit_price, later_price);
        let mut scores = self.exit_scores.lock();
        let entry = scores.entry(job.wallet.clone()).or_default();
        entry.verified_exits += 1;
        entry.total_score += score;
        self.dirty.store(true, Ordering::SeqCst);
        info!(
            wallet = %job.wallet,
            asset = %job.asset_id,
            score,
            verified = entry.verified_exits,
            "Exit verified"
        );
    }

    fn requeue(&self, mut job: ExitJob) {
        if job.checks_remaining <= 1 {
            debug!(wallet = %job.wallet, asset = %job.asset_id, "Exit verification budget exhausted");
            return;
        }
        job.checks_remaining -= 1;
        job.check_after = Utc::now()
            + chrono::Duration::from_std(self.config.recheck_spacing)
                .unwrap_or_else(|_| chrono::Duration::zero());
        self.pending.lock().push(job);
    }

    async fn run_worker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.check_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut save_ticker = tokio::time::interval(self.config.save_interval);
        save_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        save_ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_due_jobs().await;
                }
                _ = save_ticker.tick() => {
                    if let Err(e) = Tracker::save(self.as_ref()).await {
                        warn!(error = %e, "Periodic pattern save failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Pattern recheck worker stopped");
                    return;
                }
            }
        }
    }

    /// Pending verification jobs. Test and stats hook.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Fraction of the exit price preserved by selling before the drop,
/// clamped to [0, 1].
fn exit_score(exit_price: Decimal, later_price: Decimal) -> f64 {
    if exit_price <= Decimal::ZERO {
        return 0.0;
    }
    let raw = ((exit_price - later_price) / exit_price)
        .to_f64()
        .unwrap_or(0.0);
    raw.clamp(0.0, 1.0)
}

#[async_trait]
impl Tracker for PatternTracker {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn load(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(snapshot) =
            store::load_json::<PatternSnapshot>(store.as_ref(), FILE_NAME).await?
        {
            info!(wallets = snapshot.exit_scores.len(), "Loaded exit-timing scores");
            *self.exit_scores.lock() = snapshot.exit_scores;
            self.dirty.store(false, Ordering::SeqCst);
        }
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
        let snapshot = PatternSnapshot {
            version: 1,
            timestamp: Utc::now(),
            exit_scores: self.exit_scores.lock().clone(),
        };
        if snapshot.exit_scores.is_empty() {
            return Ok(());
        }
        store::save_json(store.as_ref(), FILE_NAME, &snapshot).await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> TrackerStats {
        TrackerStats {
            name: "pattern",
            entries: self.positions.lock().len(),
            pending: self.pending_jobs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::api::ScriptedDataApi;
    use crate::testkit::domain::{trade, trade_at};
    use rust_decimal_macros::dec;

    fn tracker() -> PatternTracker {
        PatternTracker::new(
            PatternConfig {
                initial_delay: Duration::from_millis(0),
                ..PatternConfig::default()
            },
            Arc::new(ScriptedDataApi::new()),
            None,
        )
    }

    #[test]
    fn conviction_fires_on_large_add_to_losing_position() {
        let t = tracker();
        // Entry at 0.50.
        t.on_trade(&trade("c1-yes", "0xw", Side::Buy, dec!(0.50), dec!(200)), "c1", "Yes");
        // Price collapsed to 0.30: 40% mark-to-market loss, big add.
        let findings = t.on_trade(
            &trade("c1-yes", "0xw", Side::Buy, dec!(0.30), dec!(200)),
            "c1",
            "Yes",
        );
        let detail = findings.conviction.expect("conviction finding");
        assert_eq!(detail.avg_entry_price, dec!(0.50));
        assert!((detail.loss_pct - 0.4).abs() < 1e-9);
    }

    #[test]
    fn conviction_needs_meaningful_add() {
        let t = tracker();
        t.on_trade(&trade("c1-yes", "0xw", Side::Buy, dec!(0.50), dec!(200)), "c1", "Yes");
        // Loss is there but the add is tiny.
        let findings = t.on_trade(
            &trade("c1-yes", "0xw", Side::Buy, dec!(0.30), dec!(10)),
            "c1",
            "Yes",
        );
        assert!(findings.conviction.is_none());
    }

    #[test]
    fn conviction_ignores_winning_positions() {
        let t = tracker();
        t.on_trade(&trade("c1-yes", "0xw", Side::Buy, dec!(0.30), dec!(200)), "c1", "Yes");
        let findings = t.on_trade(
            &trade("c1-yes", "0xw", Side::Buy, dec!(0.50), dec!(200)),
            "c1",
            "Yes",
        );
        assert!(findings.conviction.is_none());
    }

    #[test]
    fn stealth_fires_after_spread_out_accumulation() {
        let t = tracker();
        let t0 = Utc::now();
        let mut last = PatternFindings::default();
        for i in 0..5 {
            last = t.on_trade(
                &trade_at(
                    "c1-yes",
                    "0xw",
                    Side::Buy,
                    dec!(0.50),
                    dec!(150),
                    t0 + chrono::Duration::minutes(i * 4),
                ),
                "c1",
                "Yes",
            );
        }
        let detail = last.stealth.expect("stealth finding");
        assert_eq!(detail.trades, 5);
        assert_eq!(detail.total_size, dec!(750));
        assert!(detail.spread_minutes >= 10.0);
    }

    #[test]
    fn stealth_ignores_oversized_trades() {
        let t = tracker();
        let t0 = Utc::now();
        for i in 0..5 {
            let findings = t.on_trade(
                &trade_at(
                    "c1-yes",
                    "0xw",
                    Side::Buy,
                    dec!(0.50),
                    dec!(500),
                    t0 + chrono::Duration::minutes(i * 4),
                ),
                "c1",
                "Yes",
            );
            assert!(findings.stealth.is_none());
        }
    }

    #[test]
    fn stealth_requires_wall_clock_spread() {
        let t = tracker();
        let t0 = Utc::now();
        let mut last = PatternFindings::default();
        // Five qualifying trades within two minutes: too compressed.
        for i in 0..5 {
            last = t.on_trade(
                &trade_at(
                    "c1-yes",
                    "0xw",
                    Side::Buy,
                    dec!(0.50),
                    dec!(150),
                    t0 + chrono::Duration::seconds(i * 20),
                ),
                "c1",
                "Yes",
            );
        }
        assert!(last.stealth.is_none());
    }

    #[tokio::test]
    async fn verified_exits_accumulate_timing_score() {
        let api = Arc::new(ScriptedDataApi::new());
        let t = PatternTracker::new(
            PatternConfig {
                initial_delay: Duration::from_millis(0),
                exit_min_exits: 2,
                ..PatternConfig::default()
            },
            api.clone(),
            None,
        );

        for round in 0..2 {
            let asset = format!("c{round}-yes");
            let cond = format!("c{round}");
            t.on_trade(&trade(&asset, "0xw", Side::Buy, dec!(0.50), dec!(100)), &cond, "Yes");
            t.on_trade(&trade(&asset, "0xw", Side::Sell, dec!(0.80), dec!(100)), &cond, "Yes");
            // Price collapsed after the exit: near-perfect timing.
            t.observe_price(&asset, dec!(0.20));
        }

        assert_eq!(t.process_due_jobs().await, 2);

        let findings = t.on_trade(
            &trade("c9-yes", "0xw", Side::Buy, dec!(0.50), dec!(10)),
            "c9",
            "Yes",
        );
        let detail = findings.exit_timing.expect("exit timing finding");
        assert_eq!(detail.verified_exits, 2);
        assert!(detail.avg_score >= 0.5);
    }

    #[tokio::test]
    async fn reopened_position_is_not_a_verified_exit() {
        let api = Arc::new(ScriptedDataApi::new());
        api.push_positions(vec![crate::testkit::domain::position(
            "c1",
            "Yes",
            dec!(50),
            dec!(0.40),
        )]);
        let t = PatternTracker::new(
            PatternConfig {
                initial_delay: Duration::from_millis(0),
                ..PatternConfig::default()
            },
            api,
            None,
        );

        t.on_trade(&trade("c1-yes", "0xw", Side::Buy, dec!(0.50), dec!(100)), "c1", "Yes");
        t.on_trade(&trade("c1-yes", "0xw", Side::Sell, dec!(0.80), dec!(100)), "c1", "Yes");
        t.observe_price("c1-yes", dec!(0.20));

        assert_eq!(t.process_due_jobs().await, 1);
        assert!(t.exit_scores.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_price_mark_requeues_until_budget() {
        let api = Arc::new(ScriptedDataApi::new());
        let t = PatternTracker::new(
            PatternConfig {
                initial_delay: Duration::from_millis(0),
                recheck_spacing: Duration::from_millis(0),
                max_position_checks: 2,
                ..PatternConfig::default()
            },
            api,
            None,
        );

        t.on_trade(&trade("c1-yes", "0xw", Side::Buy, dec!(0.50), dec!(100)), "c1", "Yes");
        t.on_trade(&trade("c1-yes", "0xw", Side::Sell, dec!(0.80), dec!(100)), "c1", "Yes");

        assert_eq!(t.process_due_jobs().await, 1);
        assert_eq!(t.pending_jobs(), 1);
        assert_eq!(t.process_due_jobs().await, 1);
        assert_eq!(t.pending_jobs(), 0);
    }

    #[test]
    fn exit_score_clamps_to_unit_range() {
        assert!((exit_score(dec!(0.80), dec!(0.20)) - 0.75).abs() < 1e-9);
        assert_eq!(exit_score(dec!(0.50), dec!(0.90)), 0.0);
        assert_eq!(exit_score(dec!(0.50), dec!(-0.50)), 1.0);
        assert_eq!(exit_score(Decimal::ZERO, dec!(0.10)), 0.0);
    }
}
