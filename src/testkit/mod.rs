//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`api`] — Scripted [`DataApi`](crate::core::exchange::DataApi) double
//!   with per-endpoint queues, failure injection, and call counters.
//! - [`domain`] — Builders for domain primitives: trades, markets, stats.
//! - [`notify`] — `RecordingNotifier` for alert assertions.

pub mod api;
pub mod domain;
pub mod notify;
