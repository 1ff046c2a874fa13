//! Recording notifier for alert assertions.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::domain::TradeAlert;
use crate::core::notify::Notifier;

/// Thread-safe alert collector for notification assertions in tests.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    alerts: Arc<Mutex<Vec<TradeAlert>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }

    /// Snapshot of every alert received so far.
    pub fn alerts(&self) -> Vec<TradeAlert> {
        self.alerts.lock().clone()
    }

    /// The most recent alert, if any.
    pub fn last(&self) -> Option<TradeAlert> {
        self.alerts.lock().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn send_trade_alert(&self, alert: &TradeAlert) {
        self.alerts.lock().push(alert.clone());
    }
}
