//! End-to-end evaluator pipeline tests over scripted upstreams.

use std::sync::Arc;

use rust_decimal_macros::dec;

use polywatch::core::cache::{CacheConfig, WalletStatsCache};
use polywatch::core::domain::{AlertReason, Side};
use polywatch::core::engine::{
    EvaluatorConfig, MarketRegistry, SeenTrades, SeenTradesConfig, StatsBoard, TradeEvaluator,
};
use polywatch::core::tracker::{
    ContrarianConfig, ContrarianTracker, CopyTradeConfig, CopyTradeTracker, HedgeConfig,
    HedgeTracker, PatternConfig, PatternTracker, RapidConfig, RapidTradeWindow,
};
use polywatch::testkit::api::ScriptedDataApi;
use polywatch::testkit::domain::{activity, closed_position, market, trade};
use polywatch::testkit::notify::RecordingNotifier;

struct Fixture {
    api: Arc<ScriptedDataApi>,
    evaluator: TradeEvaluator,
    stats: Arc<StatsBoard>,
    notifier: RecordingNotifier,
    contrarian: Arc<ContrarianTracker>,
}

fn fixture_with(config: EvaluatorConfig) -> Fixture {
    let api = Arc::new(ScriptedDataApi::new());
    let contrarian = Arc::new(ContrarianTracker::new(ContrarianConfig::default(), None));
    let cache = Arc::new(WalletStatsCache::new(
        api.clone(),
        CacheConfig::default(),
        Some(contrarian.publisher()),
        None,
    ));
    let copy = Arc::new(CopyTradeTracker::new(
        CopyTradeConfig::default(),
        cache.clone(),
        contrarian.clone(),
    ));
    let rapid = Arc::new(RapidTradeWindow::new(RapidConfig::default()));
    let hedge = Arc::new(HedgeTracker::new(HedgeConfig::default(), api.clone(), None));
    let pattern = Arc::new(PatternTracker::new(
        PatternConfig::default(),
        api.clone(),
        None,
    ));
    let seen = Arc::new(SeenTrades::new(SeenTradesConfig::default(), None));
    let stats = Arc::new(StatsBoard::new());
    let notifier = RecordingNotifier::new();

    let registry = Arc::new(MarketRegistry::new());
    registry.update_markets(vec![market("c1"), market("c2")]);

    let evaluator = TradeEvaluator::new(
        config,
        api.clone(),
        registry,
        cache,
        contrarian.clone(),
        copy,
        rapid,
        hedge,
        pattern,
        seen,
        stats.clone(),
        Arc::new(notifier.clone()),
    );

    Fixture {
        api,
        evaluator,
        stats,
        notifier,
        contrarian,
    }
}

fn fixture() -> Fixture {
    fixture_with(EvaluatorConfig::default())
}

/// A wallet with two markets of history and a solid resolved record, so
/// the low-activity heuristic fires and the win-rate gate passes.
fn push_low_activity_wallet(api: &ScriptedDataApi) {
    api.push_activity(vec![activity("c1", dec!(0.5)), activity("c2", dec!(0.4))]);
    api.push_closed(vec![
        closed_position("c1", dec!(0.40), dec!(60)),
        closed_position("c2", dec!(0.35), dec!(65)),
        closed_position("c2", dec!(0.45), dec!(-45)),
    ]);
}

#[tokio::test]
async fn qualifying_trade_produces_one_alert() {
    let f = fixture();
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xwallet", Side::Buy, dec!(0.50), dec!(2000)))
        .await;

    assert_eq!(f.notifier.len(), 1);
    let alert = f.notifier.last().unwrap();
    assert!(alert.reasons.contains(&AlertReason::LowActivity));
    assert!(!alert.reasons.is_empty());
    assert_eq!(alert.market.condition_id, "c1");
    assert_eq!(alert.outcome, "Yes");
    assert_eq!(alert.wallet, "0xwallet");
    assert_eq!(f.stats.filter_stats().alerts_sent, 1);
}

#[tokio::test]
async fn low_notional_skips_before_any_wallet_fetch() {
    let f = fixture_with(EvaluatorConfig {
        min_notional: dec!(1000),
        ..EvaluatorConfig::default()
    });
    let counters = f.api.counters();

    // price 0.5 * size 10 = notional 5, far below the floor
    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xwallet", Side::Buy, dec!(0.5), dec!(10)))
        .await;

    let filter = f.stats.filter_stats();
    assert_eq!(filter.skipped_low_notional, 1);
    assert_eq!(filter.alerts_sent, 0);
    assert_eq!(counters.activity_calls(), 0);
    assert!(f.notifier.is_empty());
}

#[tokio::test]
async fn duplicate_event_is_evaluated_once() {
    let f = fixture();
    push_low_activity_wallet(&f.api);

    let mut first = trade("c1-yes", "0xwallet", Side::Buy, dec!(0.50), dec!(2000));
    first.transaction_hash = "0xhash".into();
    let second = first.clone();

    f.evaluator.evaluate_trade(first).await;
    let after_first = f.stats.filter_stats();
    let reasons_after_first = f.stats.reason_counts();

    f.evaluator.evaluate_trade(second).await;
    let after_second = f.stats.filter_stats();

    assert_eq!(after_first.alerts_sent, 1);
    assert_eq!(after_second.alerts_sent, 1);
    assert_eq!(after_second.duplicates, 1);
    assert_eq!(after_second.trades_evaluated, after_first.trades_evaluated);
    assert_eq!(f.stats.reason_counts(), reasons_after_first);
    assert_eq!(f.notifier.len(), 1);
}

#[tokio::test]
async fn wallet_less_event_counts_skipped_no_wallet() {
    let f = fixture();

    let mut event = trade("c1-yes", "ignored", Side::Sell, dec!(0.60), dec!(2000));
    event.taker_address = None;
    event.maker_address = None;
    event.transaction_hash = String::new();

    f.evaluator.evaluate_trade(event).await;
    assert_eq!(f.stats.filter_stats().skipped_no_wallet, 1);
    assert!(f.notifier.is_empty());
}

#[tokio::test]
async fn allow_list_rejects_other_wallets() {
    let f = fixture_with(
        EvaluatorConfig::default().with_allowed_wallets(&["0xFRIEND".to_string()]),
    );
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xstranger", Side::Buy, dec!(0.50), dec!(2000)))
        .await;
    assert_eq!(f.stats.filter_stats().skipped_not_allowed, 1);
    assert!(f.notifier.is_empty());
}

#[tokio::test]
async fn obvious_price_is_gated_after_heuristics() {
    let f = fixture();
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xwallet", Side::Buy, dec!(0.90), dec!(2000)))
        .await;
    assert_eq!(f.stats.filter_stats().skipped_obvious, 1);
    assert!(f.notifier.is_empty());
}

#[tokio::test]
async fn weak_reason_with_unresolved_history_is_silently_rejected() {
    let f = fixture();
    // One market, no resolved positions: low_activity fires, nothing else.
    f.api.push_activity(vec![activity("c1", dec!(0.5))]);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xfresh", Side::Buy, dec!(0.50), dec!(1500)))
        .await;

    let filter = f.stats.filter_stats();
    assert_eq!(filter.skipped_poor_win_rate, 1);
    assert_eq!(filter.alerts_sent, 0);
}

#[tokio::test]
async fn new_wallet_special_reason_overrides_poor_record() {
    let f = fixture();
    // Single market, no history at all, but a big entry.
    f.api.push_activity(vec![activity("c1", dec!(0.5))]);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xfresh", Side::Buy, dec!(0.50), dec!(3000)))
        .await;

    let alert = f.notifier.last().expect("alert for new wallet");
    assert!(alert.reasons.contains(&AlertReason::NewWallet));
    assert_eq!(f.stats.filter_stats().alerts_sent, 1);
}

#[tokio::test]
async fn contrarian_buy_reason_fires_on_cheap_big_entry() {
    let f = fixture();
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xwallet", Side::Buy, dec!(0.20), dec!(6000)))
        .await;

    let alert = f.notifier.last().unwrap();
    assert!(alert.reasons.contains(&AlertReason::ContrarianBet));
    // Same entry is also an extreme-notional low-price trade? No: 0.20 is
    // above the extreme ceiling of 0.10.
    assert!(!alert.reasons.contains(&AlertReason::ExtremeBet));
}

#[tokio::test]
async fn massive_trade_reason_fires_on_size() {
    let f = fixture();
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xwallet", Side::Buy, dec!(0.50), dec!(30000)))
        .await;

    let alert = f.notifier.last().unwrap();
    assert!(alert.reasons.contains(&AlertReason::MassiveTrade));
}

#[tokio::test]
async fn contrarian_winner_reason_uses_tracker_state() {
    let f = fixture();
    for _ in 0..5 {
        f.contrarian.record_result("0xwallet", true);
    }
    f.contrarian.drain_pending();
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xWALLET", Side::Buy, dec!(0.50), dec!(2000)))
        .await;

    let alert = f.notifier.last().unwrap();
    assert!(alert.reasons.contains(&AlertReason::ContrarianWinner));
}

#[tokio::test]
async fn unknown_token_is_counted_and_skipped() {
    let f = fixture();
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("unlisted-token", "0xwallet", Side::Buy, dec!(0.50), dec!(2000)))
        .await;
    assert_eq!(f.stats.filter_stats().unknown_market, 1);
    assert!(f.notifier.is_empty());
}

#[tokio::test]
async fn stats_fetch_failure_skips_without_killing_the_evaluator() {
    let f = fixture();
    f.api.fail_activity_after(0);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xwallet", Side::Buy, dec!(0.50), dec!(2000)))
        .await;
    assert_eq!(f.stats.filter_stats().stats_errors, 1);

    // The evaluator keeps serving subsequent trades.
    f.api.fail_activity_after(usize::MAX);
    push_low_activity_wallet(&f.api);
    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xother", Side::Buy, dec!(0.50), dec!(2000)))
        .await;
    assert_eq!(f.stats.filter_stats().alerts_sent, 1);
}

#[tokio::test]
async fn frames_demultiplex_and_count_event_types() {
    let f = fixture();
    push_low_activity_wallet(&f.api);

    let trade_frame = r#"{
        "event_type": "trade",
        "asset_id": "c1-yes",
        "price": "0.50",
        "size": "4000",
        "side": "BUY",
        "taker_address": "0xwallet",
        "timestamp": "1700000000",
        "transaction_hash": "0xabc"
    }"#;
    let batch = format!(
        r#"[{trade_frame}, {{"event_type": "last_trade_price", "asset_id": "c1-yes", "price": "0.52", "size": "1", "side": "SELL", "timestamp": "1700000001"}}]"#
    );

    f.evaluator.process_frame(&batch).await;
    f.evaluator.process_frame("   ").await;
    f.evaluator.process_frame("not json at all").await;

    let types = f.stats.event_type_counts();
    assert_eq!(types.get("trade"), Some(&1));
    assert_eq!(types.get("last_trade_price"), Some(&1));
    assert_eq!(types.get("empty"), Some(&1));
    assert_eq!(types.get("unknown"), Some(&1));

    // The batch's trade alerted; the price summary fell out at the
    // notional floor (size 1).
    assert_eq!(f.stats.filter_stats().alerts_sent, 1);
}

#[tokio::test]
async fn alert_updates_dashboard_derivations() {
    let f = fixture();
    push_low_activity_wallet(&f.api);
    push_low_activity_wallet(&f.api);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xhot", Side::Buy, dec!(0.50), dec!(2000)))
        .await;
    f.evaluator
        .evaluate_trade(trade("c2-no", "0xhot", Side::Buy, dec!(0.40), dec!(2500)))
        .await;

    assert_eq!(f.stats.recent_alerts().len(), 2);
    let top = f.stats.top_alerting_wallets(3);
    assert_eq!(top[0].0, "0xhot");
    assert_eq!(top[0].1, 2);

    let buckets = f
        .stats
        .alert_history_buckets(std::time::Duration::from_secs(3600), 4);
    assert_eq!(buckets.iter().sum::<u64>(), 2);
    // Fresh alerts land in the newest bucket.
    assert_eq!(buckets[3], 2);
}

#[tokio::test]
async fn sell_with_no_inventory_carries_closed_economics() {
    let f = fixture();
    push_low_activity_wallet(&f.api);
    // Enrichment: no open positions, then a closed row for c1/Yes.
    f.api.push_positions(vec![]);
    f.api.push_closed(vec![closed_position("c1", dec!(0.30), dec!(70))]);

    f.evaluator
        .evaluate_trade(trade("c1-yes", "0xwallet", Side::Sell, dec!(0.20), dec!(6000)))
        .await;

    let alert = f.notifier.last().expect("sell alert");
    assert!(alert.current_position.is_none());
    assert_eq!(alert.closed_cost_basis, Some(dec!(30.00)));
    assert_eq!(alert.closed_realized_pnl, Some(dec!(70)));
}
