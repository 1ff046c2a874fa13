//! The streaming trade evaluator.
//!
//! Consumes raw frames from the event channel, demultiplexes them into
//! trades, enriches each trade with per-wallet history, applies the
//! behavioural heuristics independently, and assembles one alert per
//! accepted trade. Everything else lands in the filter counters.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{MarketRegistry, SeenTrades, StatsBoard};
use crate::core::cache::WalletStatsCache;
use crate::core::domain::{
    AlertReason, MarketInfo, Position, Side, TradeAlert, TradeEvent, WalletStats,
};
use crate::core::exchange::polymarket::parse_frames;
use crate::core::exchange::DataApi;
use crate::core::notify::Notifier;
use crate::core::tracker::{
    ContrarianTracker, CopyTradeTracker, HedgeTracker, PatternTracker, RapidTradeWindow,
};

/// Heuristic thresholds and global gates.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Trades below this notional are not evaluated at all.
    pub min_notional: Decimal,
    /// Global gate: trades at or above this price are near-certain.
    pub obvious_price: Decimal,
    /// Price from which an individual trade is too obvious to count
    /// toward the high-win-rate heuristic.
    pub obvious_trade_price: Decimal,
    /// Optional allow-list; lowercased at construction.
    pub allowed_wallets: Option<HashSet<String>>,
    /// `low_activity` fires strictly below this market count.
    pub max_markets_for_low: usize,
    /// Resolved suspicious positions required for `high_win_rate`.
    pub high_win_min_resolved: u32,
    /// Suspicious win rate required for `high_win_rate`.
    pub high_win_rate_threshold: f64,
    /// `extreme_bet` price ceiling.
    pub extreme_low_price: Decimal,
    /// `extreme_bet` notional floor.
    pub extreme_min_notional: Decimal,
    /// `new_wallet` market-count ceiling (inclusive).
    pub new_wallet_max_markets: usize,
    /// `new_wallet` notional floor.
    pub new_wallet_min_notional: Decimal,
    /// `contrarian_bet` price ceiling.
    pub contrarian_max_price: Decimal,
    /// `contrarian_bet` notional floor.
    pub contrarian_min_notional: Decimal,
    /// `massive_trade` notional floor.
    pub massive_min_notional: Decimal,
    /// `massive_trade` (and `contrarian_winner`) price ceiling.
    pub massive_max_price: Decimal,
    /// Row limit for the inventory enrichment fetch.
    pub position_fetch_limit: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            min_notional: dec!(500),
            obvious_price: dec!(0.85),
            obvious_trade_price: dec!(0.95),
            allowed_wallets: None,
            max_markets_for_low: 5,
            high_win_min_resolved: 5,
            high_win_rate_threshold: 0.75,
            extreme_low_price: dec!(0.10),
            extreme_min_notional: dec!(1000),
            new_wallet_max_markets: 1,
            new_wallet_min_notional: dec!(1000),
            contrarian_max_price: dec!(0.30),
            contrarian_min_notional: dec!(1000),
            massive_min_notional: dec!(10000),
            massive_max_price: dec!(0.90),
            position_fetch_limit: 10,
        }
    }
}

impl EvaluatorConfig {
    /// Build an allow-list from config values, lowercasing each entry.
    /// An empty list disables the filter.
    pub fn with_allowed_wallets(mut self, wallets: &[String]) -> Self {
        if wallets.is_empty() {
            self.allowed_wallets = None;
        } else {
            self.allowed_wallets =
                Some(wallets.iter().map(|w| w.to_lowercase()).collect());
        }
        self
    }
}

/// Outcome of the global gates for a heuristically flagged trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Pass,
    NoReasons,
    Obvious,
    PoorWinRate,
}

/// The streaming trade evaluator.
pub struct TradeEvaluator {
    config: EvaluatorConfig,
    api: Arc<dyn DataApi>,
    registry: Arc<MarketRegistry>,
    cache: Arc<WalletStatsCache>,
    contrarian: Arc<ContrarianTracker>,
    copy: Arc<CopyTradeTracker>,
    rapid: Arc<RapidTradeWindow>,
    hedge: Arc<HedgeTracker>,
    pattern: Arc<PatternTracker>,
    seen: Arc<SeenTrades>,
    stats: Arc<StatsBoard>,
    notifier: Arc<dyn Notifier>,
}

#[allow(clippy::too_many_arguments)]
impl TradeEvaluator {
    #[must_use]
    pub fn new(
        config: EvaluatorConfig,
        api: Arc<dyn DataApi>,
        registry: Arc<MarketRegistry>,
        cache: Arc<WalletStatsCache>,
        contrarian: Arc<ContrarianTracker>,
        copy: Arc<CopyTradeTracker>,
        rapid: Arc<RapidTradeWindow>,
        hedge: Arc<HedgeTracker>,
        pattern: Arc<PatternTracker>,
        seen: Arc<SeenTrades>,
        stats: Arc<StatsBoard>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            api,
            registry,
            cache,
            contrarian,
            copy,
            rapid,
            hedge,
            pattern,
            seen,
            stats,
            notifier,
        }
    }

    /// Consume frames until the channel closes or shutdown flips.
    pub async fn run(&self, mut frames: mpsc::Receiver<String>, mut shutdown: watch::Receiver<bool>) {
        info!("Trade evaluator started");
        loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        Some(text) => self.process_frame(&text).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Trade evaluator stopped");
    }

    /// Parse one wire frame and evaluate every trade in it.
    pub async fn process_frame(&self, text: &str) {
        let Some(events) = parse_frames(text) else {
            self.stats.record_event_type("unknown");
            return;
        };
        if events.is_empty() {
            debug!("Empty event batch");
            self.stats.record_event_type("empty");
            return;
        }

        for raw in events {
            self.stats.record_event_type(raw.type_label());
            if let Some(trade) = raw.into_trade() {
                self.evaluate_trade(trade).await;
            }
        }
    }

    /// Run the full pipeline for one trade.
    pub async fn evaluate_trade(&self, trade: TradeEvent) {
        // Price marks feed the pattern tracker for every consumable event,
        // including wallet-less last-trade summaries.
        self.pattern.observe_price(&trade.asset_id, trade.price);

        // 1. Deduplicate. Wallet-less summaries carry no hash and are
        // exempt; they fall out at wallet resolution instead.
        if !trade.transaction_hash.is_empty() && !self.seen.observe(&trade.dedup_key()) {
            self.stats.record_duplicate();
            return;
        }

        // 2. Notional floor, before any upstream traffic.
        let notional = trade.notional();
        if notional < self.config.min_notional {
            self.stats.record_low_notional();
            return;
        }

        // 3. Resolve the trading wallet.
        let Some(wallet) = trade.trader().map(str::to_lowercase) else {
            self.stats.record_no_wallet();
            return;
        };

        // 4. Allow-list.
        if let Some(allowed) = &self.config.allowed_wallets {
            if !allowed.contains(&wallet) {
                self.stats.record_not_allowed();
                return;
            }
        }

        self.stats.record_evaluated();

        // 5. Wallet history, stale-on-error.
        let stats = match self.cache.get(&wallet).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "Wallet stats unavailable, skipping trade");
                self.stats.record_stats_error();
                return;
            }
        };

        let Some(market) = self.registry.market_for_token(&trade.asset_id) else {
            self.stats.record_unknown_market();
            return;
        };
        let outcome = market.outcome_for_token(&trade.asset_id).to_string();

        // 6. Heuristics, each evaluated independently.
        let mut reasons = Vec::new();

        if stats.is_low_activity(self.config.max_markets_for_low) {
            reasons.push(AlertReason::LowActivity);
        }

        if stats.suspicious_resolved() >= self.config.high_win_min_resolved
            && stats.suspicious_win_rate >= self.config.high_win_rate_threshold
            && trade.price < self.config.obvious_trade_price
        {
            reasons.push(AlertReason::HighWinRate);
        }

        if trade.price <= self.config.extreme_low_price
            && notional >= self.config.extreme_min_notional
        {
            reasons.push(AlertReason::ExtremeBet);
        }

        if self
            .rapid
            .observe(&wallet, trade.timestamp, notional)
            .rapid
        {
            reasons.push(AlertReason::RapidTrading);
        }

        if stats.unique_markets <= self.config.new_wallet_max_markets
            && notional >= self.config.new_wallet_min_notional
        {
            reasons.push(AlertReason::NewWallet);
        }

        if trade.side == Side::Buy
            && trade.price <= self.config.contrarian_max_price
            && notional >= self.config.contrarian_min_notional
        {
            reasons.push(AlertReason::ContrarianBet);
        }

        if notional >= self.config.massive_min_notional
            && trade.price <= self.config.massive_max_price
        {
            reasons.push(AlertReason::MassiveTrade);
        }

        if self.contrarian.should_alert(&wallet) && trade.price <= self.config.massive_max_price {
            reasons.push(AlertReason::ContrarianWinner);
        }

        if self
            .copy
            .observe_trade(
                &wallet,
                &market.condition_id,
                &trade.asset_id,
                trade.side,
                trade.timestamp,
            )
            .await
            .should_alert
        {
            reasons.push(AlertReason::CopyTrader);
        }

        let hedge_findings = self.hedge.on_trade(&trade, &market.condition_id);
        if hedge_findings.hedge_removal.is_some() {
            reasons.push(AlertReason::HedgeRemoval);
        }
        if hedge_findings.asymmetric_exit.is_some() {
            reasons.push(AlertReason::AsymmetricExit);
        }

        let pattern_findings = self.pattern.on_trade(&trade, &market.condition_id, &outcome);
        if pattern_findings.conviction.is_some() {
            reasons.push(AlertReason::ConvictionDoubling);
        }
        if pattern_findings.stealth.is_some() {
            reasons.push(AlertReason::StealthAccumulation);
        }
        if pattern_findings.exit_timing.is_some() {
            reasons.push(AlertReason::PerfectExitTiming);
        }

        // 7. Global gates, one function for every ingest path.
        match Self::gate(&self.config, &reasons, &stats, trade.price) {
            Gate::Pass => {}
            Gate::NoReasons => {
                self.stats.record_high_activity();
                return;
            }
            Gate::Obvious => {
                self.stats.record_obvious();
                return;
            }
            Gate::PoorWinRate => {
                self.stats.record_poor_win_rate();
                return;
            }
        }

        // 8. Enrichment: current inventory, and exit economics for sells
        // with nothing left.
        let positions = match self
            .api
            .positions(&wallet, &market.condition_id, self.config.position_fetch_limit)
            .await
        {
            Ok(positions) => positions,
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "Inventory fetch failed, alerting without it");
                Vec::new()
            }
        };
        self.hedge
            .record_positions(&wallet, &market.condition_id, &positions);

        let current_position = positions
            .iter()
            .find(|p| p.outcome == outcome && p.size > Decimal::ZERO)
            .cloned();

        let (closed_cost_basis, closed_realized_pnl) =
            if current_position.is_none() && trade.side == Side::Sell {
                self.closed_position_economics(&wallet, &market.condition_id, &outcome)
                    .await
            } else {
                (None, None)
            };

        // 9. Assemble and hand off.
        let alert = self.assemble_alert(
            &trade,
            &wallet,
            market,
            outcome,
            stats,
            reasons,
            current_position,
            closed_cost_basis,
            closed_realized_pnl,
            hedge_findings,
            pattern_findings,
        );

        self.stats.record_alert(&alert);
        self.notifier.send_trade_alert(&alert);
    }

    fn gate(
        config: &EvaluatorConfig,
        reasons: &[AlertReason],
        stats: &WalletStats,
        price: Decimal,
    ) -> Gate {
        if reasons.is_empty() {
            return Gate::NoReasons;
        }
        if price >= config.obvious_price {
            return Gate::Obvious;
        }
        let has_special = reasons.iter().any(|r| r.is_special());
        if !has_special && (stats.resolved() == 0 || stats.win_rate <= 0.5) {
            return Gate::PoorWinRate;
        }
        Gate::Pass
    }

    async fn closed_position_economics(
        &self,
        wallet: &str,
        condition_id: &str,
        outcome: &str,
    ) -> (Option<Decimal>, Option<Decimal>) {
        match self.api.closed_positions(wallet, 50, 0).await {
            Ok(closed) => closed
                .iter()
                .find(|p| p.condition_id == condition_id && p.outcome == outcome)
                .map_or((None, None), |p| {
                    (Some(p.avg_price * p.size), Some(p.realized_pnl))
                }),
            Err(e) => {
                debug!(wallet = %wallet, error = %e, "Closed position lookup failed");
                (None, None)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_alert(
        &self,
        trade: &TradeEvent,
        wallet: &str,
        market: MarketInfo,
        outcome: String,
        stats: WalletStats,
        reasons: Vec<AlertReason>,
        current_position: Option<Position>,
        closed_cost_basis: Option<Decimal>,
        closed_realized_pnl: Option<Decimal>,
        hedge_findings: crate::core::tracker::HedgeFindings,
        pattern_findings: crate::core::tracker::PatternFindings,
    ) -> TradeAlert {
        TradeAlert {
            id: Uuid::new_v4(),
            wallet: wallet.to_string(),
            market,
            outcome,
            side: trade.side,
            price: trade.price,
            size: trade.size,
            notional: trade.notional(),
            transaction_hash: trade.transaction_hash.clone(),
            timestamp: trade.timestamp,
            stats,
            current_position,
            closed_cost_basis,
            closed_realized_pnl,
            hedge: hedge_findings.hedge_removal,
            asymmetric_exit: hedge_findings.asymmetric_exit,
            conviction: pattern_findings.conviction,
            stealth: pattern_findings.stealth,
            exit_timing: pattern_findings.exit_timing,
            reasons,
        }
    }

    /// Filter-counter snapshot. Convenience passthrough for callers that
    /// only hold the evaluator.
    #[must_use]
    pub fn filter_stats(&self) -> super::FilterStats {
        self.stats.filter_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::WalletStats;
    use crate::testkit::domain::stats;

    fn flagged(reasons: &[AlertReason]) -> Vec<AlertReason> {
        reasons.to_vec()
    }

    fn poor_stats() -> WalletStats {
        // Resolved but mediocre.
        let mut s = stats("0xw", 10, 2, 3);
        s.win_rate = 0.4;
        s
    }

    fn strong_stats() -> WalletStats {
        stats("0xw", 10, 8, 2)
    }

    #[test]
    fn gate_rejects_empty_reasons() {
        let config = EvaluatorConfig::default();
        assert_eq!(
            TradeEvaluator::gate(&config, &[], &strong_stats(), dec!(0.50)),
            Gate::NoReasons
        );
    }

    #[test]
    fn gate_rejects_obvious_price() {
        let config = EvaluatorConfig::default();
        assert_eq!(
            TradeEvaluator::gate(
                &config,
                &flagged(&[AlertReason::MassiveTrade]),
                &strong_stats(),
                dec!(0.85)
            ),
            Gate::Obvious
        );
    }

    #[test]
    fn gate_rejects_weak_reasons_with_poor_record() {
        let config = EvaluatorConfig::default();
        assert_eq!(
            TradeEvaluator::gate(
                &config,
                &flagged(&[AlertReason::LowActivity]),
                &poor_stats(),
                dec!(0.50)
            ),
            Gate::PoorWinRate
        );

        let unresolved = stats("0xw", 1, 0, 0);
        assert_eq!(
            TradeEvaluator::gate(
                &config,
                &flagged(&[AlertReason::RapidTrading]),
                &unresolved,
                dec!(0.50)
            ),
            Gate::PoorWinRate
        );
    }

    #[test]
    fn gate_admits_special_reasons_despite_poor_record() {
        let config = EvaluatorConfig::default();
        for reason in [
            AlertReason::NewWallet,
            AlertReason::ContrarianBet,
            AlertReason::MassiveTrade,
            AlertReason::ConvictionDoubling,
            AlertReason::PerfectExitTiming,
            AlertReason::StealthAccumulation,
        ] {
            assert_eq!(
                TradeEvaluator::gate(&config, &flagged(&[reason]), &poor_stats(), dec!(0.50)),
                Gate::Pass,
                "{reason} should pass the poor-win-rate gate"
            );
        }
    }

    #[test]
    fn gate_admits_weak_reasons_with_good_record() {
        let config = EvaluatorConfig::default();
        assert_eq!(
            TradeEvaluator::gate(
                &config,
                &flagged(&[AlertReason::LowActivity]),
                &strong_stats(),
                dec!(0.50)
            ),
            Gate::Pass
        );
    }

    #[test]
    fn allow_list_lowercases_entries() {
        let config = EvaluatorConfig::default()
            .with_allowed_wallets(&["0xABC".to_string(), "0xDef".to_string()]);
        let allowed = config.allowed_wallets.unwrap();
        assert!(allowed.contains("0xabc"));
        assert!(allowed.contains("0xdef"));

        let disabled = EvaluatorConfig::default().with_allowed_wallets(&[]);
        assert!(disabled.allowed_wallets.is_none());
    }
}
