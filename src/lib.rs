//! Polywatch - real-time trade surveillance for prediction markets.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── core/             # Reusable library components
//! │   ├── domain/       # Pure domain types
//! │   ├── exchange/     # Upstream REST + WebSocket plumbing
//! │   ├── cache/        # Wallet statistics cache
//! │   ├── tracker/      # Behavioural state trackers
//! │   ├── engine/       # Trade evaluator and its collaborators
//! │   ├── store/        # Blob persistence port + backends
//! │   └── service/      # Cross-cutting services
//! └── app/              # Application orchestration
//! ```
//!
//! The evaluator consumes raw frames from the exchange feed, demultiplexes
//! them into trades, enriches each trade with per-wallet history, and emits
//! a structured alert when one or more behavioural heuristics fire.

pub mod app;
pub mod core;
pub mod error;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
