//! Reconnection watchdog for the event channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::polymarket::EventClient;

/// Watchdog tuning knobs.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How often to check feed liveness (default 30 s).
    pub check_interval: Duration,
    /// Gap after which the connection is considered dead (default 2 min).
    pub stale_after: Duration,
    /// Pause between closing the dead connection and redialing (default 5 s).
    pub redial_delay: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(120),
            redial_delay: Duration::from_secs(5),
        }
    }
}

/// Watch the feed and redial when it goes quiet.
///
/// A connection that never received a message is left alone; the initial
/// subscribe path owns that case. Once messages have flowed, a gap longer
/// than `stale_after` closes the connection, waits `redial_delay`, redials
/// and resubscribes the current token vector from `tokens`.
pub async fn run(
    client: Arc<EventClient>,
    config: WatchdogConfig,
    tokens: impl Fn() -> Vec<String> + Send + Sync,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("Reconnection watchdog stopped");
                return;
            }
        }

        if !client.ever_received() {
            continue;
        }
        let Some(age) = client.last_message_age() else {
            continue;
        };
        if age < config.stale_after {
            continue;
        }

        warn!(
            silent_secs = age.as_secs(),
            "Feed silent past threshold, forcing reconnect"
        );
        if let Err(e) = Arc::clone(&client)
            .reconnect(tokens(), config.redial_delay)
            .await
        {
            warn!(error = %e, "Watchdog reconnect failed, will retry next check");
        }
    }
}
