//! Polymarket REST API response types.
//!
//! Upstream sends most numerics as strings; fields here stay close to the
//! wire and are converted to domain types in `client.rs`.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::core::domain::MarketInfo;

/// A market row from the markets endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarket {
    #[serde(default, alias = "conditionId")]
    pub condition_id: String,
    #[serde(default, alias = "question")]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, alias = "image")]
    pub image_url: String,
    #[serde(default)]
    pub outcomes: Vec<String>,
    #[serde(default, alias = "clobTokenIds")]
    pub token_ids: Vec<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
}

impl RawMarket {
    /// Convert to domain metadata, applying the monitored-market filter.
    ///
    /// Rejected: missing condition id, inactive or closed markets, and
    /// markets without outcome tokens. Empty outcome lists default to
    /// Yes/No downstream.
    #[must_use]
    pub fn into_market_info(self) -> Option<MarketInfo> {
        if self.condition_id.is_empty() || !self.active || self.closed {
            return None;
        }
        if self.token_ids.is_empty() {
            return None;
        }
        Some(MarketInfo::new(
            self.condition_id,
            self.title,
            self.slug,
            self.image_url,
            self.outcomes,
            self.token_ids,
        ))
    }
}

/// One activity row for a wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct RawActivity {
    #[serde(default, alias = "conditionId")]
    pub condition_id: String,
    #[serde(default, alias = "asset")]
    pub asset_id: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub price: Decimal,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
}

/// One position row (open or resolved) for a wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    #[serde(default, alias = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default, alias = "avgPrice")]
    pub avg_price: Decimal,
    #[serde(default, alias = "currentValue")]
    pub current_value: Decimal,
    #[serde(default, alias = "realizedPnl")]
    pub realized_pnl: Decimal,
}
