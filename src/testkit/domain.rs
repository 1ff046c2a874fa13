//! Builders for domain primitives used across tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::domain::{
    ActivityEntry, ClosedPosition, MarketInfo, Position, Side, TradeEvent, WalletStats,
};

/// An activity row in `condition_id` at `price`.
pub fn activity(condition_id: &str, price: Decimal) -> ActivityEntry {
    ActivityEntry {
        condition_id: condition_id.to_string(),
        asset_id: format!("{condition_id}-tok"),
        side: Some("BUY".into()),
        size: dec!(10),
        price,
        timestamp: Utc::now(),
    }
}

/// A resolved position entered at `avg_price` with the given realised PnL.
pub fn closed_position(condition_id: &str, avg_price: Decimal, pnl: Decimal) -> ClosedPosition {
    ClosedPosition {
        condition_id: condition_id.to_string(),
        outcome: "Yes".into(),
        avg_price,
        size: dec!(100),
        realized_pnl: pnl,
    }
}

/// An open position of `size` shares at `avg_price`.
pub fn position(condition_id: &str, outcome: &str, size: Decimal, avg_price: Decimal) -> Position {
    Position {
        condition_id: condition_id.to_string(),
        outcome: outcome.to_string(),
        size,
        avg_price,
        current_value: size * avg_price,
    }
}

/// A two-outcome market `cond` with tokens `{cond}-yes` / `{cond}-no`.
pub fn market(cond: &str) -> MarketInfo {
    MarketInfo::new(
        cond,
        format!("Market {cond}"),
        format!("market-{cond}"),
        "",
        vec!["Yes".into(), "No".into()],
        vec![format!("{cond}-yes"), format!("{cond}-no")],
    )
}

/// A taker trade by `wallet` on `asset`.
pub fn trade(asset: &str, wallet: &str, side: Side, price: Decimal, size: Decimal) -> TradeEvent {
    trade_at(asset, wallet, side, price, size, Utc::now())
}

/// A taker trade with an explicit timestamp.
pub fn trade_at(
    asset: &str,
    wallet: &str,
    side: Side,
    price: Decimal,
    size: Decimal,
    timestamp: DateTime<Utc>,
) -> TradeEvent {
    TradeEvent {
        asset_id: asset.to_string(),
        price,
        size,
        side,
        maker_address: None,
        taker_address: Some(wallet.to_string()),
        transaction_hash: format!("0x{}", uuid::Uuid::new_v4().simple()),
        timestamp,
    }
}

/// Wallet stats with explicit suspicious counters and sane derived rates.
pub fn stats(wallet: &str, unique_markets: usize, sus_wins: u32, sus_losses: u32) -> WalletStats {
    let resolved = sus_wins + sus_losses;
    let rate = if resolved == 0 {
        0.0
    } else {
        f64::from(sus_wins) / f64::from(resolved)
    };
    WalletStats {
        wallet: wallet.to_string(),
        unique_markets,
        total_trades: u64::from(resolved) * 2,
        win_count: sus_wins,
        loss_count: sus_losses,
        win_rate: rate,
        suspicious_wins: sus_wins,
        suspicious_losses: sus_losses,
        suspicious_win_rate: rate,
        fetched_at: Utc::now(),
    }
}
