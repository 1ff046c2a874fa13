//! Polymarket-specific REST and WebSocket bindings.

mod client;
mod messages;
mod types;
mod websocket;

pub use client::Client;
pub use messages::{parse_frames, IncrementalOp, MarketSubscription, RawMarketEvent};
pub use websocket::{EventChannels, EventClient, EventClientConfig};
