//! Per-wallet historical statistics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ClosedPosition;

/// Aggregated trading history for one wallet.
///
/// "Suspicious" counters cover only resolved positions entered at or below
/// the configured maximum entry price, so that the win rate is not inflated
/// by near-certain bets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletStats {
    pub wallet: String,
    pub unique_markets: usize,
    pub total_trades: u64,
    pub win_count: u32,
    pub loss_count: u32,
    pub win_rate: f64,
    pub suspicious_wins: u32,
    pub suspicious_losses: u32,
    pub suspicious_win_rate: f64,
    pub fetched_at: DateTime<Utc>,
}

impl WalletStats {
    /// Build stats from an activity summary and resolved positions.
    ///
    /// `max_entry_price` bounds which entries count toward the suspicious
    /// subset.
    #[must_use]
    pub fn compute(
        wallet: &str,
        unique_markets: usize,
        total_trades: u64,
        closed: &[ClosedPosition],
        max_entry_price: Decimal,
    ) -> Self {
        let mut win_count = 0u32;
        let mut loss_count = 0u32;
        let mut suspicious_wins = 0u32;
        let mut suspicious_losses = 0u32;

        for position in closed {
            let suspicious = position.avg_price <= max_entry_price;
            if position.is_win() {
                win_count += 1;
                if suspicious {
                    suspicious_wins += 1;
                }
            } else {
                loss_count += 1;
                if suspicious {
                    suspicious_losses += 1;
                }
            }
        }

        Self {
            wallet: wallet.to_string(),
            unique_markets,
            total_trades,
            win_count,
            loss_count,
            win_rate: ratio(win_count, loss_count),
            suspicious_wins,
            suspicious_losses,
            suspicious_win_rate: ratio(suspicious_wins, suspicious_losses),
            fetched_at: Utc::now(),
        }
    }

    /// Total resolved positions.
    #[must_use]
    pub const fn resolved(&self) -> u32 {
        self.win_count + self.loss_count
    }

    /// Resolved positions within the suspicious subset.
    #[must_use]
    pub const fn suspicious_resolved(&self) -> u32 {
        self.suspicious_wins + self.suspicious_losses
    }

    /// Whether the wallet has traded fewer markets than `max_markets`.
    #[must_use]
    pub fn is_low_activity(&self, max_markets: usize) -> bool {
        self.unique_markets < max_markets
    }
}

fn ratio(wins: u32, losses: u32) -> f64 {
    let total = wins + losses;
    if total == 0 {
        0.0
    } else {
        f64::from(wins) / f64::from(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn closed(avg_price: Decimal, pnl: Decimal) -> ClosedPosition {
        ClosedPosition {
            condition_id: "c".into(),
            outcome: "Yes".into(),
            avg_price,
            size: dec!(100),
            realized_pnl: pnl,
        }
    }

    #[test]
    fn compute_splits_wins_and_losses() {
        let positions = vec![
            closed(dec!(0.30), dec!(70)),
            closed(dec!(0.40), dec!(-40)),
            closed(dec!(0.90), dec!(10)),
        ];
        let stats = WalletStats::compute("0xw", 5, 12, &positions, dec!(0.85));

        assert_eq!(stats.win_count, 2);
        assert_eq!(stats.loss_count, 1);
        assert_eq!(stats.resolved(), 3);
        assert!((stats.win_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn suspicious_subset_excludes_obvious_entries() {
        let positions = vec![
            closed(dec!(0.30), dec!(70)),
            // entered above the max entry price; excluded from suspicious
            closed(dec!(0.90), dec!(10)),
            closed(dec!(0.50), dec!(-50)),
        ];
        let stats = WalletStats::compute("0xw", 5, 12, &positions, dec!(0.85));

        assert_eq!(stats.suspicious_wins, 1);
        assert_eq!(stats.suspicious_losses, 1);
        assert_eq!(stats.suspicious_resolved(), 2);
        assert!((stats.suspicious_win_rate - 0.5).abs() < 1e-9);
        assert!(stats.suspicious_resolved() <= stats.resolved());
    }

    #[test]
    fn zero_resolved_yields_zero_rates() {
        let stats = WalletStats::compute("0xw", 1, 2, &[], dec!(0.85));
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.suspicious_win_rate, 0.0);
    }

    #[test]
    fn low_activity_is_strictly_below_max() {
        let stats = WalletStats::compute("0xw", 3, 10, &[], dec!(0.85));
        assert!(stats.is_low_activity(4));
        assert!(!stats.is_low_activity(3));
    }
}
