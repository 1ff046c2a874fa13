//! Polymarket WebSocket message types and frame parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::{Side, TradeEvent};

/// Initial subscription request for the market channel.
#[derive(Debug, Serialize)]
pub struct MarketSubscription {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub assets_ids: Vec<String>,
    pub custom_feature_enabled: bool,
}

impl MarketSubscription {
    #[must_use]
    pub fn new(asset_ids: Vec<String>) -> Self {
        Self {
            msg_type: "market".into(),
            assets_ids: asset_ids,
            custom_feature_enabled: true,
        }
    }
}

/// Incremental subscribe/unsubscribe operation on an open connection.
#[derive(Debug, Serialize)]
pub struct IncrementalOp {
    pub operation: &'static str,
    pub assets_ids: Vec<String>,
}

impl IncrementalOp {
    #[must_use]
    pub fn subscribe(asset_ids: Vec<String>) -> Self {
        Self {
            operation: "subscribe",
            assets_ids: asset_ids,
        }
    }

    #[must_use]
    pub fn unsubscribe(asset_ids: Vec<String>) -> Self {
        Self {
            operation: "unsubscribe",
            assets_ids: asset_ids,
        }
    }
}

/// An event as received on the market channel.
///
/// Numerics arrive as strings; only `trade` and `last_trade_price` events
/// carry the fields we read. Everything else is kept just far enough to be
/// counted by event type.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarketEvent {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub maker_address: Option<String>,
    #[serde(default)]
    pub taker_address: Option<String>,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

impl RawMarketEvent {
    /// Counter label for this event's type.
    #[must_use]
    pub fn type_label(&self) -> &str {
        self.event_type.as_deref().unwrap_or("unknown")
    }

    /// Whether this event type is consumed by the evaluator.
    #[must_use]
    pub fn is_of_interest(&self) -> bool {
        matches!(
            self.event_type.as_deref(),
            Some("trade") | Some("last_trade_price")
        )
    }

    /// Convert to a domain trade event.
    ///
    /// Returns `None` for event types we do not consume or when a numeric
    /// field fails to parse. `last_trade_price` events convert too; they are
    /// dropped later at wallet resolution since they carry no addresses.
    #[must_use]
    pub fn into_trade(self) -> Option<TradeEvent> {
        if !self.is_of_interest() {
            return None;
        }

        let asset_id = self.asset_id.filter(|a| !a.is_empty())?;
        let price = self.price.as_deref()?.trim().parse().ok()?;
        let size = self.size.as_deref()?.trim().parse().ok()?;
        let side = Side::parse(self.side.as_deref().unwrap_or(""))?;
        let timestamp = parse_timestamp(self.timestamp.as_deref())?;

        Some(TradeEvent {
            asset_id,
            price,
            size,
            side,
            maker_address: self.maker_address.filter(|a| !a.is_empty()),
            taker_address: self.taker_address.filter(|a| !a.is_empty()),
            transaction_hash: self.transaction_hash.unwrap_or_default(),
            timestamp,
        })
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let secs: i64 = raw?.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Parse one text frame into events.
///
/// Frames are whitespace-trimmed and may be a single JSON object or a JSON
/// array batch. Returns `None` when the frame is not valid JSON of either
/// shape; an empty batch parses to an empty vector.
#[must_use]
pub fn parse_frames(text: &str) -> Option<Vec<RawMarketEvent>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }

    if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<RawMarketEvent>>(trimmed).ok()
    } else {
        serde_json::from_str::<RawMarketEvent>(trimmed)
            .map(|e| vec![e])
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TRADE: &str = r#"{
        "event_type": "trade",
        "asset_id": "a1",
        "price": "0.42",
        "size": "100",
        "side": "BUY",
        "maker_address": "0xmaker",
        "taker_address": "0xtaker",
        "timestamp": "1700000000",
        "transaction_hash": "0xhash"
    }"#;

    #[test]
    fn subscription_frame_shape() {
        let msg = MarketSubscription::new(vec!["a1".into()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"market""#));
        assert!(json.contains(r#""assets_ids":["a1"]"#));
        assert!(json.contains(r#""custom_feature_enabled":true"#));
    }

    #[test]
    fn incremental_op_shape() {
        let json = serde_json::to_string(&IncrementalOp::unsubscribe(vec!["a1".into()])).unwrap();
        assert!(json.contains(r#""operation":"unsubscribe""#));
    }

    #[test]
    fn single_object_frame_parses() {
        let events = parse_frames(TRADE).unwrap();
        assert_eq!(events.len(), 1);

        let trade = events.into_iter().next().unwrap().into_trade().unwrap();
        assert_eq!(trade.asset_id, "a1");
        assert_eq!(trade.price, dec!(0.42));
        assert_eq!(trade.size, dec!(100));
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.trader(), Some("0xtaker"));
        assert_eq!(trade.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn array_frame_parses_as_batch() {
        let batch = format!("  [{TRADE},{TRADE}]  ");
        let events = parse_frames(&batch).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn empty_frame_parses_to_empty_batch() {
        assert!(parse_frames("   ").unwrap().is_empty());
        assert!(parse_frames("[]").unwrap().is_empty());
    }

    #[test]
    fn garbage_frame_is_none() {
        assert!(parse_frames("not json").is_none());
        assert!(parse_frames("{broken").is_none());
    }

    #[test]
    fn last_trade_price_converts_without_wallets() {
        let frame = r#"{
            "event_type": "last_trade_price",
            "asset_id": "a1",
            "price": "0.55",
            "size": "10",
            "side": "SELL",
            "timestamp": "1700000000"
        }"#;
        let trade = parse_frames(frame)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .into_trade()
            .unwrap();
        assert_eq!(trade.trader(), None);
    }

    #[test]
    fn uninteresting_event_types_do_not_convert() {
        let frame = r#"{"event_type": "book", "asset_id": "a1"}"#;
        let raw = parse_frames(frame).unwrap().into_iter().next().unwrap();
        assert_eq!(raw.type_label(), "book");
        assert!(raw.into_trade().is_none());
    }

    #[test]
    fn missing_event_type_labels_unknown() {
        let frame = r#"{"asset_id": "a1"}"#;
        let raw = parse_frames(frame).unwrap().into_iter().next().unwrap();
        assert_eq!(raw.type_label(), "unknown");
    }

    #[test]
    fn unparsable_price_drops_event() {
        let frame = r#"{
            "event_type": "trade",
            "asset_id": "a1",
            "price": "abc",
            "size": "10",
            "side": "BUY",
            "timestamp": "1700000000"
        }"#;
        assert!(parse_frames(frame)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .into_trade()
            .is_none());
    }
}
