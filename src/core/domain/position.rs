//! Upstream position and activity record types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of a wallet's activity history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub condition_id: String,
    pub asset_id: String,
    #[serde(default)]
    pub side: Option<String>,
    pub size: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A resolved (closed) position with realised outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub condition_id: String,
    pub outcome: String,
    /// Average entry price over the life of the position.
    pub avg_price: Decimal,
    pub size: Decimal,
    pub realized_pnl: Decimal,
}

impl ClosedPosition {
    /// A closed position counts as a win when it realised a profit.
    #[must_use]
    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }
}

/// A currently open position for a wallet in one market outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub condition_id: String,
    pub outcome: String,
    pub size: Decimal,
    pub avg_price: Decimal,
    #[serde(default)]
    pub current_value: Decimal,
}

impl Position {
    /// Entry cost of the position.
    #[must_use]
    pub fn cost_basis(&self) -> Decimal {
        self.size * self.avg_price
    }
}
