//! Trade event domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse a wire-format side string, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Wire-format name of this side.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trade observed on the exchange feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    /// Outcome token the trade occurred on.
    pub asset_id: String,
    /// Price in the [0, 1] probability range.
    pub price: Decimal,
    /// Number of shares traded.
    pub size: Decimal,
    pub side: Side,
    pub maker_address: Option<String>,
    pub taker_address: Option<String>,
    pub transaction_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl TradeEvent {
    /// Trade value in the quote currency.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    /// Resolve the trading wallet: taker if present, otherwise maker.
    ///
    /// Returns `None` when the event carries no wallet at all
    /// (e.g. `last_trade_price` summaries).
    #[must_use]
    pub fn trader(&self) -> Option<&str> {
        self.taker_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .or(self.maker_address.as_deref().filter(|a| !a.is_empty()))
    }

    /// Deduplication key: `"{transaction_hash}:{asset_id}"`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.transaction_hash, self.asset_id)
    }
}

/// Check whether a price sits in the contrarian band.
///
/// A contrarian entry is priced strictly below `threshold` or strictly
/// above `1 - threshold`; the boundaries themselves do not qualify.
#[must_use]
pub fn is_contrarian_price(price: Decimal, threshold: Decimal) -> bool {
    price < threshold || price > Decimal::ONE - threshold
}
