//! Upstream exchange plumbing: REST data port and WebSocket event feed.

pub mod polymarket;
pub mod watchdog;

use async_trait::async_trait;

use crate::core::domain::{ActivityEntry, ClosedPosition, MarketInfo, Position};
use crate::error::Result;

/// Read-only port over the exchange's data REST API.
///
/// The evaluator and trackers depend on this trait rather than a concrete
/// client so tests can script responses deterministically.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Most recent activity rows for a wallet, newest first.
    async fn user_activity(&self, wallet: &str, limit: usize) -> Result<Vec<ActivityEntry>>;

    /// One page of a wallet's resolved positions.
    async fn closed_positions(
        &self,
        wallet: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ClosedPosition>>;

    /// Current open positions for a wallet in one market.
    async fn positions(
        &self,
        wallet: &str,
        condition_id: &str,
        limit: usize,
    ) -> Result<Vec<Position>>;

    /// Highest-volume active markets, optionally filtered by category.
    async fn top_markets_by_volume(
        &self,
        limit: usize,
        categories: &[String],
    ) -> Result<Vec<MarketInfo>>;

    /// Look up one market by its condition id.
    async fn market_by_condition_id(&self, condition_id: &str) -> Result<Option<MarketInfo>>;
}
