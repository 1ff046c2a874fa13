//! Dual-side position tracking: hedge removal and asymmetric exits.
//!
//! The tracker keeps a per-(wallet, market) snapshot of both outcome sides.
//! A significant SELL against a known dual-side position schedules a
//! deferred position recheck; once the upstream confirms one side was
//! dumped while the other remains, the finding is recorded and surfaces on
//! the wallet's next evaluated trade. Fully exited sides feed the
//! asymmetric-exit ledger (how long wins are held versus losses).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Tracker, TrackerStats};
use crate::core::domain::{
    AsymmetricExitDetail, HedgeRemovalDetail, Position, Side, TradeEvent,
};
use crate::core::exchange::DataApi;
use crate::core::store::{self, BlobStore};
use crate::error::Result;

/// Persisted filename.
const FILE_NAME: &str = "hedge_tracker.json";

/// Hedge tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct HedgeConfig {
    /// Minimum shares on each side for a position to count as a hedge.
    pub min_hedge_size: Decimal,
    /// Minimum value on each side for a position to count as a hedge.
    pub min_hedge_value: Decimal,
    /// Fraction of one side that must disappear to flag a removal.
    pub significant_sell_pct: f64,
    /// Exits required before the asymmetric heuristic can fire.
    pub min_exits_for_asymmetric: u32,
    /// Required ratio of average win hold to average loss hold.
    pub asymmetric_threshold: f64,
    /// Delay before the first deferred recheck.
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

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            min_hedge_size: Decimal::from(100),
            min_hedge_value: Decimal::from(50),
            significant_sell_pct: 0.5,
            min_exits_for_asymmetric: 5,
            asymmetric_threshold: 3.0,
            initial_delay: Duration::from_secs(120),
            recheck_spacing: Duration::from_secs(120),
            max_position_checks: 5,
            check_tick: Duration::from_secs(5),
            save_interval: Duration::from_secs(300),
        }
    }
}

/// Findings returned to the evaluator for one trade.
#[derive(Debug, Clone, Default)]
pub struct HedgeFindings {
    pub hedge_removal: Option<HedgeRemovalDetail>,
    pub asymmetric_exit: Option<AsymmetricExitDetail>,
}

/// One outcome side of a tracked position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SideState {
    size: Decimal,
    avg_price: Decimal,
}

impl SideState {
    fn value(&self) -> Decimal {
        self.size * self.avg_price
    }
}

/// Both sides of a wallet's position in one market.
#[derive(Debug, Clone, Default)]
struct DualSide {
    yes: SideState,
    no: SideState,
    outcomes: (String, String),
    first_seen: DateTime<Utc>,
}

/// Deferred position recheck.
#[derive(Debug, Clone)]
struct RecheckJob {
    wallet: String,
    condition_id: String,
    check_after: DateTime<Utc>,
    checks_remaining: u32,
    pre: DualSide,
    /// Price of the SELL that triggered the job; decides win vs loss when
    /// a side exits entirely.
    trigger_price: Decimal,
}

/// Exit-hold ledger per wallet, the durable part of this tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ExitLedger {
    win_holds_secs: Vec<f64>,
    loss_holds_secs: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HedgeSnapshot {
    version: u32,
    timestamp: DateTime<Utc>,
    exits: HashMap<String, ExitLedger>,
}

/// Hedge-removal and asymmetric-exit tracker.
pub struct HedgeTracker {
    config: HedgeConfig,
    api: Arc<dyn DataApi>,
    snapshots: Mutex<HashMap<(String, String), DualSide>>,
    pending: Mutex<Vec<RecheckJob>>,
    confirmed: Mutex<HashMap<String, HedgeRemovalDetail>>,
    exits: Mutex<HashMap<String, ExitLedger>>,
    dirty: AtomicBool,
    store: Option<Arc<dyn BlobStore>>,
}

impl HedgeTracker {
    #[must_use]
    pub fn new(
        config: HedgeConfig,
        api: Arc<dyn DataApi>,
        store: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self {
            config,
            api,
            snapshots: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            confirmed: Mutex::new(HashMap::new()),
            exits: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            store,
        }
    }

    /// Record fetched inventory as the wallet's pre-trade snapshot.
    pub fn record_positions(&self, wallet: &str, condition_id: &str, positions: &[Position]) {
        let key = (wallet.to_lowercase(), condition_id.to_string());
        let mut snapshots = self.snapshots.lock();
        let entry = snapshots.entry(key).or_insert_with(|| DualSide {
            first_seen: Utc::now(),
            ..DualSide::default()
        });

        for position in positions {
            let side = SideState {
                size: position.size,
                avg_price: position.avg_price,
            };
            // First outcome name seen on each slot sticks; sides are keyed
            // by outcome, not by the Yes/No literal.
            if entry.outcomes.0.is_empty() || entry.outcomes.0 == position.outcome {
                entry.outcomes.0 = position.outcome.clone();
                entry.yes = side;
            } else {
                entry.outcomes.1 = position.outcome.clone();
                entry.no = side;
            }
        }
    }

    /// Evaluate one trade against the tracked state.
    ///
    /// SELLs against a known dual-side position schedule a deferred
    /// recheck; previously confirmed removals surface here exactly once.
    pub fn on_trade(&self, trade: &TradeEvent, condition_id: &str) -> HedgeFindings {
        let Some(wallet) = trade.trader() else {
            return HedgeFindings::default();
        };
        let wallet = wallet.to_lowercase();

        let findings = HedgeFindings {
            hedge_removal: self.confirmed.lock().remove(&wallet),
            asymmetric_exit: self.asymmetric_exit(&wallet),
        };

        if trade.side == Side::Sell {
            if let Some(pre) = self.hedged_snapshot(&wallet, condition_id) {
                self.enqueue(RecheckJob {
                    wallet: wallet.clone(),
                    condition_id: condition_id.to_string(),
                    check_after: Utc::now()
                        + chrono::Duration::from_std(self.config.initial_delay)
                            .unwrap_or_else(|_| chrono::Duration::zero()),
                    checks_remaining: self.config.max_position_checks,
                    pre,
                    trigger_price: trade.price,
                });
            }
        }

        findings
    }

    fn hedged_snapshot(&self, wallet: &str, condition_id: &str) -> Option<DualSide> {
        let snapshots = self.snapshots.lock();
        let entry = snapshots.get(&(wallet.to_string(), condition_id.to_string()))?;
        let hedged = entry.yes.size >= self.config.min_hedge_size
            && entry.no.size >= self.config.min_hedge_size
            && entry.yes.value() >= self.config.min_hedge_value
            && entry.no.value() >= self.config.min_hedge_value;
        hedged.then(|| entry.clone())
    }

    fn enqueue(&self, job: RecheckJob) {
        let mut pending = self.pending.lock();
        // One live job per wallet/market pair; a newer SELL refreshes it.
        pending.retain(|j| !(j.wallet == job.wallet && j.condition_id == job.condition_id));
        debug!(
            wallet = %job.wallet,
            market = %job.condition_id,
            "Scheduled hedge recheck"
        );
        pending.push(job);
    }

    fn asymmetric_exit(&self, wallet: &str) -> Option<AsymmetricExitDetail> {
        let exits = self.exits.lock();
        let ledger = exits.get(wallet)?;

        let win_exits = ledger.win_holds_secs.len() as u32;
        let loss_exits = ledger.loss_holds_secs.len() as u32;
        if win_exits < self.config.min_exits_for_asymmetric || loss_exits == 0 {
            return None;
        }

        let avg_win = mean(&ledger.win_holds_secs);
        let avg_loss = mean(&ledger.loss_holds_secs);
        if avg_loss <= 0.0 || avg_win / avg_loss < self.config.asymmetric_threshold {
            return None;
        }

        Some(AsymmetricExitDetail {
            win_exits,
            loss_exits,
            avg_win_hold_secs: avg_win,
            avg_loss_hold_secs: avg_loss,
        })
    }

    /// Run every due recheck once. Returns the number processed.
    pub async fn process_due_jobs(&self) -> usize {
        let now = Utc::now();
        let due: Vec<RecheckJob> = {
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

    async fn run_check(&self, job: RecheckJob) {
        let positions = match self
            .api
            .positions(&job.wallet, &job.condition_id, 10)
            .await
        {
            Ok(positions) => positions,
            Err(e) => {
                warn!(
                    wallet = %job.wallet,
                    market = %job.condition_id,
                    error = %e,
                    "Hedge recheck fetch failed"
                );
                self.requeue(job);
                return;
            }
        };

        let now_size = |outcome: &str| -> Decimal {
            positions
                .iter()
                .filter(|p| p.outcome == outcome)
                .map(|p| p.size)
                .sum()
        };

        let (first, second) = (&job.pre.outcomes.0, &job.pre.outcomes.1);
        let sides = [
            (first.as_str(), job.pre.yes, second.as_str(), job.pre.no),
            (second.as_str(), job.pre.no, first.as_str(), job.pre.yes),
        ];

        let mut confirmed = false;
        let mut exited = false;
        for (outcome, pre_side, other_outcome, pre_other) in sides {
            if outcome.is_empty() || pre_side.size <= Decimal::ZERO {
                continue;
            }
            let after = now_size(outcome);
            let reduced = (pre_side.size - after)
                .to_f64()
                .unwrap_or(0.0)
                / pre_side.size.to_f64().unwrap_or(1.0);
            let other_after = now_size(other_outcome);

            if reduced >= self.config.significant_sell_pct
                && pre_other.size > Decimal::ZERO
                && other_after > Decimal::ZERO
            {
                info!(
                    wallet = %job.wallet,
                    market = %job.condition_id,
                    outcome = %outcome,
                    "Hedge removal confirmed"
                );
                self.confirmed.lock().insert(
                    job.wallet.clone(),
                    HedgeRemovalDetail {
                        reduced_outcome: outcome.to_string(),
                        remaining_outcome: other_outcome.to_string(),
                        size_before: pre_side.size,
                        size_after: after,
                    },
                );
                confirmed = true;
            }

            if after <= Decimal::ZERO {
                let hold_secs = (Utc::now() - job.pre.first_seen).num_seconds().max(0) as f64;
                let win = job.trigger_price > pre_side.avg_price;
                self.record_exit(&job.wallet, win, hold_secs);
                exited = true;
            }
        }

        if confirmed || exited {
            // Conclusive: snapshot reflects what the recheck just observed.
            self.record_positions(&job.wallet, &job.condition_id, &positions);
        } else {
            self.requeue(job);
        }
    }

    fn requeue(&self, mut job: RecheckJob) {
        if job.checks_remaining <= 1 {
            debug!(
                wallet = %job.wallet,
                market = %job.condition_id,
                "Hedge recheck budget exhausted, discarding job"
            );
            return;
        }
        job.checks_remaining -= 1;
        job.check_after = Utc::now()
            + chrono::Duration::from_std(self.config.recheck_spacing)
                .unwrap_or_else(|_| chrono::Duration::zero());
        self.pending.lock().push(job);
    }

    fn record_exit(&self, wallet: &str, win: bool, hold_secs: f64) {
        let mut exits = self.exits.lock();
        let ledger = exits.entry(wallet.to_string()).or_default();
        if win {
            ledger.win_holds_secs.push(hold_secs);
        } else {
            ledger.loss_holds_secs.push(hold_secs);
        }
        self.dirty.store(true, Ordering::SeqCst);
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
                        warn!(error = %e, "Periodic hedge save failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Hedge recheck worker stopped");
                    return;
                }
            }
        }
    }

    #[cfg(any(test, feature = "testkit"))]
    pub fn force_exit(&self, wallet: &str, win: bool, hold_secs: f64) {
        self.record_exit(&wallet.to_lowercase(), win, hold_secs);
    }

    /// Pending recheck jobs. Test and stats hook.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.pending.lock().len()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[async_trait]
impl Tracker for HedgeTracker {
    fn name(&self) -> &'static str {
        "hedge"
    }

    async fn load(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(snapshot) = store::load_json::<HedgeSnapshot>(store.as_ref(), FILE_NAME).await?
        {
            info!(wallets = snapshot.exits.len(), "Loaded hedge exit ledger");
            *self.exits.lock() = snapshot.exits;
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
        let snapshot = HedgeSnapshot {
            version: 1,
            timestamp: Utc::now(),
            exits: self.exits.lock().clone(),
        };
        if snapshot.exits.is_empty() {
            return Ok(());
        }
        store::save_json(store.as_ref(), FILE_NAME, &snapshot).await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> TrackerStats {
        TrackerStats {
            name: "hedge",
            entries: self.snapshots.lock().len(),
            pending: self.pending_jobs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::api::ScriptedDataApi;
    use crate::testkit::domain::{position, trade};
    use rust_decimal_macros::dec;

    fn config() -> HedgeConfig {
        HedgeConfig {
            initial_delay: Duration::from_millis(0),
            ..HedgeConfig::default()
        }
    }

    fn dual_positions() -> Vec<Position> {
        vec![
            position("c1", "Yes", dec!(200), dec!(0.40)),
            position("c1", "No", dec!(200), dec!(0.55)),
        ]
    }

    #[tokio::test]
    async fn sell_against_hedge_schedules_recheck() {
        let api = Arc::new(ScriptedDataApi::new());
        let tracker = HedgeTracker::new(config(), api, None);
        tracker.record_positions("0xw", "c1", &dual_positions());

        let sell = trade("c1-yes", "0xw", Side::Sell, dec!(0.45), dec!(150));
        let findings = tracker.on_trade(&sell, "c1");
        assert!(findings.hedge_removal.is_none());
        assert_eq!(tracker.pending_jobs(), 1);
    }

    #[tokio::test]
    async fn small_position_does_not_schedule() {
        let api = Arc::new(ScriptedDataApi::new());
        let tracker = HedgeTracker::new(config(), api, None);
        tracker.record_positions(
            "0xw",
            "c1",
            &[
                position("c1", "Yes", dec!(10), dec!(0.40)),
                position("c1", "No", dec!(10), dec!(0.55)),
            ],
        );

        let sell = trade("c1-yes", "0xw", Side::Sell, dec!(0.45), dec!(5));
        tracker.on_trade(&sell, "c1");
        assert_eq!(tracker.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn recheck_confirms_removal_and_surfaces_on_next_trade() {
        let api = Arc::new(ScriptedDataApi::new());
        // After the delay the Yes side is nearly gone, the No side remains.
        api.push_positions(vec![
            position("c1", "Yes", dec!(20), dec!(0.40)),
            position("c1", "No", dec!(200), dec!(0.55)),
        ]);

        let tracker = HedgeTracker::new(config(), api, None);
        tracker.record_positions("0xw", "c1", &dual_positions());

        let sell = trade("c1-yes", "0xw", Side::Sell, dec!(0.45), dec!(180));
        tracker.on_trade(&sell, "c1");
        assert_eq!(tracker.process_due_jobs().await, 1);

        let next = trade("c1-yes", "0xw", Side::Buy, dec!(0.44), dec!(10));
        let findings = tracker.on_trade(&next, "c1");
        let removal = findings.hedge_removal.expect("removal finding");
        assert_eq!(removal.reduced_outcome, "Yes");
        assert_eq!(removal.remaining_outcome, "No");
        assert_eq!(removal.size_before, dec!(200));
        assert_eq!(removal.size_after, dec!(20));

        // Consumed once; the following trade is clean.
        let later = trade("c1-yes", "0xw", Side::Buy, dec!(0.44), dec!(10));
        assert!(tracker.on_trade(&later, "c1").hedge_removal.is_none());
    }

    #[tokio::test]
    async fn inconclusive_recheck_requeues_until_budget_exhausted() {
        let api = Arc::new(ScriptedDataApi::new());
        let tracker = HedgeTracker::new(
            HedgeConfig {
                max_position_checks: 2,
                recheck_spacing: Duration::from_millis(0),
                ..config()
            },
            api.clone(),
            None,
        );
        tracker.record_positions("0xw", "c1", &dual_positions());

        // Both rechecks see the position unchanged.
        api.push_positions(dual_positions());
        api.push_positions(dual_positions());

        let sell = trade("c1-yes", "0xw", Side::Sell, dec!(0.45), dec!(150));
        tracker.on_trade(&sell, "c1");

        assert_eq!(tracker.process_due_jobs().await, 1);
        assert_eq!(tracker.pending_jobs(), 1);
        assert_eq!(tracker.process_due_jobs().await, 1);
        // Budget exhausted, job discarded.
        assert_eq!(tracker.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn asymmetric_exit_requires_contrast() {
        let api = Arc::new(ScriptedDataApi::new());
        let tracker = HedgeTracker::new(config(), api, None);

        for _ in 0..6 {
            tracker.force_exit("0xw", true, 86_400.0);
        }
        // No loss exits yet: the ratio is undefined, no finding.
        let probe = trade("c1-yes", "0xw", Side::Buy, dec!(0.50), dec!(10));
        assert!(tracker.on_trade(&probe, "c1").asymmetric_exit.is_none());

        tracker.force_exit("0xw", false, 3_600.0);
        let findings = tracker.on_trade(&probe, "c1");
        let detail = findings.asymmetric_exit.expect("asymmetric finding");
        assert_eq!(detail.win_exits, 6);
        assert_eq!(detail.loss_exits, 1);
        assert!(detail.avg_win_hold_secs / detail.avg_loss_hold_secs >= 3.0);
    }

    #[tokio::test]
    async fn save_and_load_round_trip_exit_ledger() {
        use crate::core::store::MemoryStore;

        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(ScriptedDataApi::new());
        let tracker = HedgeTracker::new(config(), api.clone(), Some(store.clone()));
        tracker.force_exit("0xw", true, 1000.0);
        Tracker::save(&tracker).await.unwrap();

        let restored = HedgeTracker::new(config(), api, Some(store));
        restored.load().await.unwrap();
        let probe = trade("c1-yes", "0xw", Side::Buy, dec!(0.50), dec!(10));
        // One win exit restored (not enough to alert, but present).
        assert!(restored.on_trade(&probe, "c1").asymmetric_exit.is_none());
        assert_eq!(restored.exits.lock().get("0xw").unwrap().win_holds_secs.len(), 1);
    }
}
