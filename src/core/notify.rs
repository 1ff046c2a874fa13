//! Notification port for alert dispatch.
//!
//! The core is agnostic to transport: chat targets, webhooks, and the
//! dashboard all sit behind this one capability. Dispatch is
//! fire-and-forget; slow transports should spawn their own tasks and
//! log failures rather than propagate them.

use tracing::info;

use crate::core::domain::TradeAlert;

/// Handler for assembled surveillance alerts.
pub trait Notifier: Send + Sync {
    /// Deliver one alert. Must return quickly.
    fn send_trade_alert(&self, alert: &TradeAlert);
}

/// No-op notifier that discards all alerts.
///
/// Useful for testing or when notifications are disabled.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send_trade_alert(&self, _alert: &TradeAlert) {}
}

/// Notifier that logs alerts using the `tracing` framework.
///
/// The default transport, and a fallback when no external channel is
/// configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_trade_alert(&self, alert: &TradeAlert) {
        let reasons: Vec<&str> = alert.reasons.iter().map(|r| r.as_str()).collect();
        info!(
            wallet = %alert.wallet,
            market = %alert.market.title,
            outcome = %alert.outcome,
            side = %alert.side,
            price = %alert.price,
            notional = %alert.notional,
            reasons = ?reasons,
            "Trade alert"
        );
    }
}
