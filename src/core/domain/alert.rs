//! Alert record and the behavioural reasons that compose it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MarketInfo, Position, Side, WalletStats};

/// Why a trade was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertReason {
    LowActivity,
    HighWinRate,
    ExtremeBet,
    RapidTrading,
    NewWallet,
    ContrarianBet,
    MassiveTrade,
    ContrarianWinner,
    CopyTrader,
    HedgeRemoval,
    AsymmetricExit,
    ConvictionDoubling,
    StealthAccumulation,
    PerfectExitTiming,
}

impl AlertReason {
    /// Stable snake_case label used in counters and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LowActivity => "low_activity",
            Self::HighWinRate => "high_win_rate",
            Self::ExtremeBet => "extreme_bet",
            Self::RapidTrading => "rapid_trading",
            Self::NewWallet => "new_wallet",
            Self::ContrarianBet => "contrarian_bet",
            Self::MassiveTrade => "massive_trade",
            Self::ContrarianWinner => "contrarian_winner",
            Self::CopyTrader => "copy_trader",
            Self::HedgeRemoval => "hedge_removal",
            Self::AsymmetricExit => "asymmetric_exit",
            Self::ConvictionDoubling => "conviction_doubling",
            Self::StealthAccumulation => "stealth_accumulation",
            Self::PerfectExitTiming => "perfect_exit_timing",
        }
    }

    /// Reasons strong enough to alert even when the wallet's historical
    /// win rate is poor or unresolved.
    #[must_use]
    pub const fn is_special(self) -> bool {
        !matches!(
            self,
            Self::LowActivity | Self::HighWinRate | Self::ExtremeBet | Self::RapidTrading
        )
    }

    /// All reasons, in counter display order.
    #[must_use]
    pub const fn all() -> [Self; 14] {
        [
            Self::LowActivity,
            Self::HighWinRate,
            Self::ExtremeBet,
            Self::RapidTrading,
            Self::NewWallet,
            Self::ContrarianBet,
            Self::MassiveTrade,
            Self::ContrarianWinner,
            Self::CopyTrader,
            Self::HedgeRemoval,
            Self::AsymmetricExit,
            Self::ConvictionDoubling,
            Self::StealthAccumulation,
            Self::PerfectExitTiming,
        ]
    }
}

impl std::fmt::Display for AlertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hedge-removal add-on: one side of a dual-side position was dumped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeRemovalDetail {
    pub reduced_outcome: String,
    pub remaining_outcome: String,
    pub size_before: Decimal,
    pub size_after: Decimal,
}

/// Asymmetric-exit add-on: wins are held much longer than losses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsymmetricExitDetail {
    pub win_exits: u32,
    pub loss_exits: u32,
    pub avg_win_hold_secs: f64,
    pub avg_loss_hold_secs: f64,
}

/// Conviction-doubling add-on: adding to a losing position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvictionDetail {
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    pub loss_pct: f64,
    pub added_size: Decimal,
    pub added_value: Decimal,
}

/// Stealth-accumulation add-on: many small same-direction trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StealthDetail {
    pub trades: u32,
    pub total_size: Decimal,
    pub total_value: Decimal,
    pub spread_minutes: f64,
}

/// Perfect-exit-timing add-on: verified exits near local tops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitTimingDetail {
    pub verified_exits: u32,
    pub avg_score: f64,
}

/// A fully populated surveillance alert.
///
/// `reasons` is non-empty by construction: the evaluator only assembles an
/// alert once at least one heuristic has fired and the global gates passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAlert {
    pub id: Uuid,
    pub wallet: String,
    pub market: MarketInfo,
    pub outcome: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub notional: Decimal,
    pub transaction_hash: String,
    pub timestamp: DateTime<Utc>,
    pub stats: WalletStats,
    /// Current inventory in this market outcome, when any.
    pub current_position: Option<Position>,
    /// Cost basis and realised PnL, populated for sells with no inventory.
    pub closed_cost_basis: Option<Decimal>,
    pub closed_realized_pnl: Option<Decimal>,
    pub hedge: Option<HedgeRemovalDetail>,
    pub asymmetric_exit: Option<AsymmetricExitDetail>,
    pub conviction: Option<ConvictionDetail>,
    pub stealth: Option<StealthDetail>,
    pub exit_timing: Option<ExitTimingDetail>,
    pub reasons: Vec<AlertReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_reasons_exclude_weak_heuristics() {
        assert!(!AlertReason::LowActivity.is_special());
        assert!(!AlertReason::HighWinRate.is_special());
        assert!(!AlertReason::ExtremeBet.is_special());
        assert!(!AlertReason::RapidTrading.is_special());

        assert!(AlertReason::NewWallet.is_special());
        assert!(AlertReason::ContrarianBet.is_special());
        assert!(AlertReason::MassiveTrade.is_special());
        assert!(AlertReason::ContrarianWinner.is_special());
        assert!(AlertReason::CopyTrader.is_special());
        assert!(AlertReason::HedgeRemoval.is_special());
        assert!(AlertReason::AsymmetricExit.is_special());
        assert!(AlertReason::ConvictionDoubling.is_special());
        assert!(AlertReason::StealthAccumulation.is_special());
        assert!(AlertReason::PerfectExitTiming.is_special());
    }

    #[test]
    fn labels_are_snake_case() {
        for reason in AlertReason::all() {
            let label = reason.as_str();
            assert!(!label.is_empty());
            assert!(label.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
