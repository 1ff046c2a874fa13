//! Polymarket data REST client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{RawActivity, RawMarket, RawPosition};
use crate::core::domain::{ActivityEntry, ClosedPosition, MarketInfo, Position};
use crate::core::exchange::DataApi;
use crate::error::{Error, Result};

/// HTTP client for the Polymarket data API.
pub struct Client {
    http: HttpClient,
    base_url: String,
}

impl Client {
    /// Create a new client for the given base URL
    /// (e.g. `https://data-api.polymarket.com`).
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(url = %url, "Fetching");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                endpoint: path_and_query.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

fn seconds_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

#[async_trait]
impl DataApi for Client {
    async fn user_activity(&self, wallet: &str, limit: usize) -> Result<Vec<ActivityEntry>> {
        let rows: Vec<RawActivity> = self
            .get_json(&format!("/activity?user={wallet}&limit={limit}"))
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ActivityEntry {
                condition_id: r.condition_id,
                asset_id: r.asset_id,
                side: r.side,
                size: r.size,
                price: r.price,
                timestamp: seconds_to_datetime(r.timestamp),
            })
            .collect())
    }

    async fn closed_positions(
        &self,
        wallet: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ClosedPosition>> {
        let rows: Vec<RawPosition> = self
            .get_json(&format!(
                "/positions?user={wallet}&closed=true&limit={limit}&offset={offset}"
            ))
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ClosedPosition {
                condition_id: r.condition_id,
                outcome: r.outcome,
                avg_price: r.avg_price,
                size: r.size,
                realized_pnl: r.realized_pnl,
            })
            .collect())
    }

    async fn positions(
        &self,
        wallet: &str,
        condition_id: &str,
        limit: usize,
    ) -> Result<Vec<Position>> {
        let rows: Vec<RawPosition> = self
            .get_json(&format!(
                "/positions?user={wallet}&market={condition_id}&limit={limit}"
            ))
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| Position {
                condition_id: r.condition_id,
                outcome: r.outcome,
                size: r.size,
                avg_price: r.avg_price,
                current_value: r.current_value,
            })
            .collect())
    }

    async fn top_markets_by_volume(
        &self,
        limit: usize,
        categories: &[String],
    ) -> Result<Vec<MarketInfo>> {
        let mut query = format!("/markets?order=volume&ascending=false&limit={limit}");
        if !categories.is_empty() {
            query.push_str("&categories=");
            query.push_str(&categories.join(","));
        }

        let rows: Vec<RawMarket> = self.get_json(&query).await?;
        let markets: Vec<MarketInfo> = rows
            .into_iter()
            .filter_map(RawMarket::into_market_info)
            .collect();

        debug!(count = markets.len(), "Fetched monitored markets");
        Ok(markets)
    }

    async fn market_by_condition_id(&self, condition_id: &str) -> Result<Option<MarketInfo>> {
        let rows: Vec<RawMarket> = self
            .get_json(&format!("/markets?condition_ids={condition_id}"))
            .await?;
        Ok(rows.into_iter().find_map(RawMarket::into_market_info))
    }
}
