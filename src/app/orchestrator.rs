//! App orchestration module.
//!
//! Wires the trackers, cache, registry, event client, and evaluator
//! together, spawns the long-running tasks, and coordinates shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::config::Config;
use crate::core::cache::WalletStatsCache;
use crate::core::engine::{MarketRegistry, SeenTrades, StatsBoard, TradeEvaluator};
use crate::core::exchange::polymarket::{Client, EventClient};
use crate::core::exchange::{watchdog, DataApi};
use crate::core::notify::{LogNotifier, Notifier};
use crate::core::service::PersistenceLoop;
use crate::core::store::{BlobStore, FsStore};
use crate::core::tracker::{
    ContrarianTracker, CopyTradeTracker, HedgeTracker, PatternTracker, RapidTradeWindow, Tracker,
};
use crate::error::{Error, Result};

/// Budget for startup-time loads and the initial market fetch.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Main application struct.
pub struct App;

impl App {
    /// Run the surveillance service until interrupted.
    pub async fn run(config: Config) -> Result<()> {
        let store: Option<Arc<dyn BlobStore>> = config
            .store
            .path
            .as_ref()
            .map(|path| {
                Arc::new(FsStore::new(path.clone(), &config.store.store_id)) as Arc<dyn BlobStore>
            });
        if store.is_none() {
            info!("No store path configured, persistence disabled");
        }

        let api: Arc<dyn DataApi> = Arc::new(Client::new(config.network.api_url.clone()));
        let save_interval = Duration::from_secs(config.store.upload_interval_secs);

        // Trackers. The cache publishes contrarian outcomes through a
        // write-only capability; the copy tracker reads stats back through
        // the shared cache. No back-references.
        let contrarian = Arc::new(ContrarianTracker::new(
            config.contrarian.contrarian_config(save_interval),
            store.clone(),
        ));
        let cache = Arc::new(WalletStatsCache::new(
            api.clone(),
            config.cache.cache_config(),
            Some(contrarian.publisher()),
            store.clone(),
        ));
        let copy = Arc::new(CopyTradeTracker::new(
            config.copy_trade.copy_config(),
            cache.clone(),
            contrarian.clone(),
        ));
        let rapid = Arc::new(RapidTradeWindow::new(config.rapid.rapid_config()));
        let hedge = Arc::new(HedgeTracker::new(
            config.hedge.hedge_config(save_interval),
            api.clone(),
            store.clone(),
        ));
        let pattern = Arc::new(PatternTracker::new(
            config.pattern.pattern_config(save_interval),
            api.clone(),
            store.clone(),
        ));
        let seen = Arc::new(SeenTrades::new(
            config.store.seen_trades_config(),
            store.clone(),
        ));

        let trackers: Vec<Arc<dyn Tracker>> = vec![
            contrarian.clone(),
            cache.clone(),
            copy.clone(),
            rapid.clone(),
            hedge.clone(),
            pattern.clone(),
            seen.clone(),
        ];

        // Restore persisted state; missing or corrupt state starts clean.
        for tracker in &trackers {
            match tokio::time::timeout(STARTUP_TIMEOUT, tracker.load()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(tracker = tracker.name(), error = %e, "State load failed"),
                Err(_) => warn!(tracker = tracker.name(), "State load timed out"),
            }
        }

        // Initial market set; an empty exchange is a fatal startup error.
        let registry = Arc::new(MarketRegistry::new());
        let markets = tokio::time::timeout(
            STARTUP_TIMEOUT,
            api.top_markets_by_volume(config.markets.top_limit, &config.markets.categories),
        )
        .await
        .map_err(|_| Error::Startup("initial market fetch timed out".into()))??;
        if markets.is_empty() {
            return Err(Error::Startup("no markets available".into()));
        }
        registry.update_markets(markets);
        info!(
            markets = registry.len(),
            tokens = registry.token_ids().len(),
            "Markets loaded"
        );

        // Event channel.
        let (client, channels) = EventClient::new(
            config
                .events
                .client_config(config.network.ws_url.clone()),
        );
        client.clone().connect().await?;
        client.subscribe(registry.token_ids()).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        // Tracker workers.
        for tracker in &trackers {
            if let Some(handle) = tracker.clone().start(shutdown_rx.clone()) {
                handles.push(handle);
            }
        }

        // Evaluator consumer.
        let stats = Arc::new(StatsBoard::new());
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let evaluator = Arc::new(TradeEvaluator::new(
            config.evaluator.evaluator_config(),
            api.clone(),
            registry.clone(),
            cache.clone(),
            contrarian.clone(),
            copy.clone(),
            rapid.clone(),
            hedge.clone(),
            pattern.clone(),
            seen.clone(),
            stats.clone(),
            notifier,
        ));
        {
            let evaluator = evaluator.clone();
            let shutdown = shutdown_rx.clone();
            let frames = channels.frames;
            handles.push(tokio::spawn(async move {
                evaluator.run(frames, shutdown).await;
            }));
        }

        // Connection error drain.
        {
            let mut errors = channels.errors;
            let mut shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        error = errors.recv() => match error {
                            Some(description) => {
                                warn!(error = %description, "Event channel reported an error");
                            }
                            None => return,
                        },
                        _ = shutdown.changed() => return,
                    }
                }
            }));
        }

        // Market refresher.
        {
            let api = api.clone();
            let registry = registry.clone();
            let client = client.clone();
            let section = config.markets.clone();
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                refresh_markets_loop(api, registry, client, section, shutdown).await;
            }));
        }

        // Reconnection watchdog.
        {
            let client = client.clone();
            let registry = registry.clone();
            let watchdog_config = config.watchdog.watchdog_config();
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                watchdog::run(client, watchdog_config, move || registry.token_ids(), shutdown)
                    .await;
            }));
        }

        // Persistence loop.
        let persistence = Arc::new(PersistenceLoop::new(
            config.store.persistence_config(),
            trackers.clone(),
        ));
        let persistence_handle = {
            let persistence = persistence.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { persistence.run(shutdown).await })
        };

        info!("polywatch running");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");

        let _ = shutdown_tx.send(true);
        client.close().await;

        // The persistence loop's final flush runs under its own budget.
        if let Err(e) = persistence_handle.await {
            warn!(error = %e, "Persistence loop panicked during shutdown");
        }
        for handle in handles {
            handle.abort();
        }

        let filter = evaluator.filter_stats();
        info!(
            events = filter.events_received,
            evaluated = filter.trades_evaluated,
            alerts = filter.alerts_sent,
            "polywatch stopped"
        );
        Ok(())
    }
}

/// Periodically re-fetch the monitored market set and apply the
/// subscription diff while connected. After a reconnect the full vector is
/// resubscribed, so skipped diffs are safe.
async fn refresh_markets_loop(
    api: Arc<dyn DataApi>,
    registry: Arc<MarketRegistry>,
    client: Arc<EventClient>,
    section: crate::app::config::MarketsSection,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker =
        tokio::time::interval(Duration::from_secs(section.refresh_interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("Market refresher stopped");
                return;
            }
        }

        let markets = match api
            .top_markets_by_volume(section.top_limit, &section.categories)
            .await
        {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, "Market refresh failed");
                continue;
            }
        };
        if markets.is_empty() {
            warn!("Market refresh returned no markets, keeping current set");
            continue;
        }

        let diff = registry.update_markets(markets);
        if diff.is_empty() || !client.is_connected() {
            continue;
        }
        if let Err(e) = client.subscribe_assets(diff.subscribe).await {
            warn!(error = %e, "Incremental subscribe failed");
        }
        if let Err(e) = client.unsubscribe_assets(diff.unsubscribe).await {
            warn!(error = %e, "Incremental unsubscribe failed");
        }
    }
}
