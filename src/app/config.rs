//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file; every section has sane
//! defaults so a minimal file only needs the network endpoints.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::cache::CacheConfig;
use crate::core::engine::{EvaluatorConfig, SeenTradesConfig};
use crate::core::exchange::polymarket::EventClientConfig;
use crate::core::exchange::watchdog::WatchdogConfig;
use crate::core::service::PersistenceConfig;
use crate::core::tracker::{
    ContrarianConfig, CopyTradeConfig, HedgeConfig, PatternConfig, RapidConfig,
};
use crate::error::{Error, Result};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber with this logging configuration.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

/// Upstream endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Market event channel, e.g. `wss://ws-subscriptions-clob.polymarket.com/ws/market`.
    pub ws_url: String,
    /// Data REST API, e.g. `https://data-api.polymarket.com`.
    pub api_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            api_url: String::new(),
        }
    }
}

/// Monitored market selection.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsSection {
    /// Markets fetched per refresh, by volume.
    #[serde(default = "default_market_limit")]
    pub top_limit: usize,
    /// Optional category filter passed upstream.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Refresh cadence in seconds.
    #[serde(default = "default_market_refresh_secs")]
    pub refresh_interval_secs: u64,
}

const fn default_market_limit() -> usize {
    50
}

const fn default_market_refresh_secs() -> u64 {
    600
}

impl Default for MarketsSection {
    fn default() -> Self {
        Self {
            top_limit: default_market_limit(),
            categories: Vec::new(),
            refresh_interval_secs: default_market_refresh_secs(),
        }
    }
}

/// Persistence store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    /// Root directory for the blob store; persistence is disabled when
    /// unset.
    #[serde(default)]
    pub path: Option<String>,
    /// Opaque id scoping this deployment's files.
    #[serde(default = "default_store_id")]
    pub store_id: String,
    /// Periodic save cadence in seconds.
    #[serde(default = "default_upload_interval_secs")]
    pub upload_interval_secs: u64,
    /// Final-flush budget on shutdown, in seconds.
    #[serde(default = "default_shutdown_budget_secs")]
    pub shutdown_budget_secs: u64,
    /// Seen-trade keys kept in a snapshot.
    #[serde(default = "default_max_seen_trades")]
    pub max_seen_trades: usize,
}

fn default_store_id() -> String {
    "polywatch".into()
}

const fn default_upload_interval_secs() -> u64 {
    300
}

const fn default_shutdown_budget_secs() -> u64 {
    30
}

const fn default_max_seen_trades() -> usize {
    5000
}

impl StoreSection {
    pub fn persistence_config(&self) -> PersistenceConfig {
        PersistenceConfig {
            upload_interval: Duration::from_secs(self.upload_interval_secs),
            shutdown_budget: Duration::from_secs(self.shutdown_budget_secs),
        }
    }

    pub fn seen_trades_config(&self) -> SeenTradesConfig {
        SeenTradesConfig {
            max_export: self.max_seen_trades,
            ..SeenTradesConfig::default()
        }
    }
}

/// Event channel settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsSection {
    /// Keep-alive ping cadence in seconds.
    #[serde(default = "default_ping_secs")]
    pub ping_interval_secs: u64,
    /// In-bound frame channel capacity.
    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
    /// Error channel capacity.
    #[serde(default = "default_error_buffer")]
    pub error_buffer: usize,
}

const fn default_ping_secs() -> u64 {
    10
}

const fn default_frame_buffer() -> usize {
    1024
}

const fn default_error_buffer() -> usize {
    64
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_secs(),
            frame_buffer: default_frame_buffer(),
            error_buffer: default_error_buffer(),
        }
    }
}

impl EventsSection {
    pub fn client_config(&self, ws_url: String) -> EventClientConfig {
        EventClientConfig {
            url: ws_url,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            frame_buffer: self.frame_buffer,
            error_buffer: self.error_buffer,
        }
    }
}

/// Reconnection watchdog settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
    #[serde(default = "default_watchdog_check_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_watchdog_stale_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_watchdog_redial_secs")]
    pub redial_delay_secs: u64,
}

const fn default_watchdog_check_secs() -> u64 {
    30
}

const fn default_watchdog_stale_secs() -> u64 {
    120
}

const fn default_watchdog_redial_secs() -> u64 {
    5
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            check_interval_secs: default_watchdog_check_secs(),
            stale_after_secs: default_watchdog_stale_secs(),
            redial_delay_secs: default_watchdog_redial_secs(),
        }
    }
}

impl WatchdogSection {
    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            check_interval: Duration::from_secs(self.check_interval_secs),
            stale_after: Duration::from_secs(self.stale_after_secs),
            redial_delay: Duration::from_secs(self.redial_delay_secs),
        }
    }
}

/// Wallet statistics cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_win_rate_max_entry_price")]
    pub win_rate_max_entry_price: Decimal,
    #[serde(default = "default_contrarian_threshold")]
    pub contrarian_threshold: Decimal,
    #[serde(default = "default_cache_max_bytes")]
    pub max_snapshot_bytes: usize,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

const fn default_cache_ttl_secs() -> u64 {
    900
}

fn default_win_rate_max_entry_price() -> Decimal {
    dec!(0.85)
}

fn default_contrarian_threshold() -> Decimal {
    dec!(0.20)
}

const fn default_cache_max_bytes() -> usize {
    512 * 1024
}

const fn default_cache_max_entries() -> usize {
    2000
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            win_rate_max_entry_price: default_win_rate_max_entry_price(),
            contrarian_threshold: default_contrarian_threshold(),
            max_snapshot_bytes: default_cache_max_bytes(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheSection {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.ttl_secs),
            win_rate_max_entry_price: self.win_rate_max_entry_price,
            contrarian_threshold: self.contrarian_threshold,
            max_snapshot_bytes: self.max_snapshot_bytes,
            max_entries: self.max_entries,
            ..CacheConfig::default()
        }
    }
}

/// Contrarian history settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ContrarianSection {
    #[serde(default = "default_contrarian_min_wins")]
    pub min_wins: u32,
    #[serde(default = "default_contrarian_min_rate")]
    pub min_rate: f64,
    #[serde(default = "default_contrarian_max_bytes")]
    pub max_file_bytes: usize,
}

const fn default_contrarian_min_wins() -> u32 {
    3
}

const fn default_contrarian_min_rate() -> f64 {
    0.7
}

const fn default_contrarian_max_bytes() -> usize {
    256 * 1024
}

impl Default for ContrarianSection {
    fn default() -> Self {
        Self {
            min_wins: default_contrarian_min_wins(),
            min_rate: default_contrarian_min_rate(),
            max_file_bytes: default_contrarian_max_bytes(),
        }
    }
}

impl ContrarianSection {
    pub fn contrarian_config(&self, save_interval: Duration) -> ContrarianConfig {
        ContrarianConfig {
            min_wins: self.min_wins,
            min_rate: self.min_rate,
            max_file_bytes: self.max_file_bytes,
            save_interval,
            ..ContrarianConfig::default()
        }
    }
}

/// Rapid-trade window settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RapidSection {
    #[serde(default = "default_rapid_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_rapid_min_count")]
    pub min_count: usize,
    #[serde(default = "default_rapid_min_total")]
    pub min_total: Decimal,
}

const fn default_rapid_window_secs() -> u64 {
    300
}

const fn default_rapid_min_count() -> usize {
    3
}

fn default_rapid_min_total() -> Decimal {
    dec!(5000)
}

impl Default for RapidSection {
    fn default() -> Self {
        Self {
            window_secs: default_rapid_window_secs(),
            min_count: default_rapid_min_count(),
            min_total: default_rapid_min_total(),
        }
    }
}

impl RapidSection {
    pub fn rapid_config(&self) -> RapidConfig {
        RapidConfig {
            window: Duration::from_secs(self.window_secs),
            min_count: self.min_count,
            min_total: self.min_total,
            ..RapidConfig::default()
        }
    }
}

/// Copy-trade settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CopySection {
    #[serde(default = "default_copy_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_copy_min_count")]
    pub min_copy_count: usize,
    #[serde(default = "default_copy_min_follower_events")]
    pub min_follower_events: usize,
    #[serde(default = "default_leader_min_resolved")]
    pub leader_min_resolved: u32,
    #[serde(default = "default_leader_min_win_rate")]
    pub leader_min_win_rate: f64,
}

const fn default_copy_window_secs() -> u64 {
    600
}

const fn default_copy_min_count() -> usize {
    2
}

const fn default_copy_min_follower_events() -> usize {
    3
}

const fn default_leader_min_resolved() -> u32 {
    5
}

const fn default_leader_min_win_rate() -> f64 {
    0.7
}

impl Default for CopySection {
    fn default() -> Self {
        Self {
            window_secs: default_copy_window_secs(),
            min_copy_count: default_copy_min_count(),
            min_follower_events: default_copy_min_follower_events(),
            leader_min_resolved: default_leader_min_resolved(),
            leader_min_win_rate: default_leader_min_win_rate(),
        }
    }
}

impl CopySection {
    pub fn copy_config(&self) -> CopyTradeConfig {
        CopyTradeConfig {
            window: Duration::from_secs(self.window_secs),
            min_copy_count: self.min_copy_count,
            min_follower_events: self.min_follower_events,
            leader_min_resolved: self.leader_min_resolved,
            leader_min_win_rate: self.leader_min_win_rate,
            ..CopyTradeConfig::default()
        }
    }
}

/// Hedge tracker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HedgeSection {
    #[serde(default = "default_min_hedge_size")]
    pub min_hedge_size: Decimal,
    #[serde(default = "default_min_hedge_value")]
    pub min_hedge_value: Decimal,
    #[serde(default = "default_significant_sell_pct")]
    pub significant_sell_pct: f64,
    #[serde(default = "default_min_exits_for_asymmetric")]
    pub min_exits_for_asymmetric: u32,
    #[serde(default = "default_asymmetric_threshold")]
    pub asymmetric_threshold: f64,
    #[serde(default = "default_recheck_delay_secs")]
    pub recheck_delay_secs: u64,
    #[serde(default = "default_max_position_checks")]
    pub max_position_checks: u32,
}

fn default_min_hedge_size() -> Decimal {
    dec!(100)
}

fn default_min_hedge_value() -> Decimal {
    dec!(50)
}

const fn default_significant_sell_pct() -> f64 {
    0.5
}

const fn default_min_exits_for_asymmetric() -> u32 {
    5
}

const fn default_asymmetric_threshold() -> f64 {
    3.0
}

const fn default_recheck_delay_secs() -> u64 {
    120
}

const fn default_max_position_checks() -> u32 {
    5
}

impl Default for HedgeSection {
    fn default() -> Self {
        Self {
            min_hedge_size: default_min_hedge_size(),
            min_hedge_value: default_min_hedge_value(),
            significant_sell_pct: default_significant_sell_pct(),
            min_exits_for_asymmetric: default_min_exits_for_asymmetric(),
            asymmetric_threshold: default_asymmetric_threshold(),
            recheck_delay_secs: default_recheck_delay_secs(),
            max_position_checks: default_max_position_checks(),
        }
    }
}

impl HedgeSection {
    pub fn hedge_config(&self, save_interval: Duration) -> HedgeConfig {
        HedgeConfig {
            min_hedge_size: self.min_hedge_size,
            min_hedge_value: self.min_hedge_value,
            significant_sell_pct: self.significant_sell_pct,
            min_exits_for_asymmetric: self.min_exits_for_asymmetric,
            asymmetric_threshold: self.asymmetric_threshold,
            initial_delay: Duration::from_secs(self.recheck_delay_secs),
            recheck_spacing: Duration::from_secs(self.recheck_delay_secs),
            max_position_checks: self.max_position_checks,
            save_interval,
            ..HedgeConfig::default()
        }
    }
}

/// Pattern tracker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternSection {
    #[serde(default = "default_conviction_min_loss_pct")]
    pub conviction_min_loss_pct: f64,
    #[serde(default = "default_conviction_min_add_size")]
    pub conviction_min_add_size: Decimal,
    #[serde(default = "default_conviction_min_add_value")]
    pub conviction_min_add_value: Decimal,
    #[serde(default = "default_stealth_window_secs")]
    pub stealth_window_secs: u64,
    #[serde(default = "default_stealth_min_trades")]
    pub stealth_min_trades: usize,
    #[serde(default = "default_stealth_min_total_size")]
    pub stealth_min_total_size: Decimal,
    #[serde(default = "default_stealth_min_total_value")]
    pub stealth_min_total_value: Decimal,
    #[serde(default = "default_stealth_max_single_trade")]
    pub stealth_max_single_trade: Decimal,
    #[serde(default = "default_stealth_min_spread_minutes")]
    pub stealth_min_spread_minutes: f64,
    #[serde(default = "default_exit_min_exits")]
    pub exit_min_exits: u32,
    #[serde(default = "default_exit_min_score")]
    pub exit_min_score: f64,
    #[serde(default = "default_pattern_recheck_delay_secs")]
    pub recheck_delay_secs: u64,
    #[serde(default = "default_max_position_checks")]
    pub max_position_checks: u32,
}

const fn default_conviction_min_loss_pct() -> f64 {
    0.20
}

fn default_conviction_min_add_size() -> Decimal {
    dec!(100)
}

fn default_conviction_min_add_value() -> Decimal {
    dec!(50)
}

const fn default_stealth_window_secs() -> u64 {
    1800
}

const fn default_stealth_min_trades() -> usize {
    4
}

fn default_stealth_min_total_size() -> Decimal {
    dec!(500)
}

fn default_stealth_min_total_value() -> Decimal {
    dec!(250)
}

fn default_stealth_max_single_trade() -> Decimal {
    dec!(200)
}

const fn default_stealth_min_spread_minutes() -> f64 {
    10.0
}

const fn default_exit_min_exits() -> u32 {
    3
}

const fn default_exit_min_score() -> f64 {
    0.5
}

const fn default_pattern_recheck_delay_secs() -> u64 {
    300
}

impl Default for PatternSection {
    fn default() -> Self {
        Self {
            conviction_min_loss_pct: default_conviction_min_loss_pct(),
            conviction_min_add_size: default_conviction_min_add_size(),
            conviction_min_add_value: default_conviction_min_add_value(),
            stealth_window_secs: default_stealth_window_secs(),
            stealth_min_trades: default_stealth_min_trades(),
            stealth_min_total_size: default_stealth_min_total_size(),
            stealth_min_total_value: default_stealth_min_total_value(),
            stealth_max_single_trade: default_stealth_max_single_trade(),
            stealth_min_spread_minutes: default_stealth_min_spread_minutes(),
            exit_min_exits: default_exit_min_exits(),
            exit_min_score: default_exit_min_score(),
            recheck_delay_secs: default_pattern_recheck_delay_secs(),
            max_position_checks: default_max_position_checks(),
        }
    }
}

impl PatternSection {
    pub fn pattern_config(&self, save_interval: Duration) -> PatternConfig {
        PatternConfig {
            conviction_min_loss_pct: self.conviction_min_loss_pct,
            conviction_min_add_size: self.conviction_min_add_size,
            conviction_min_add_value: self.conviction_min_add_value,
            stealth_window: Duration::from_secs(self.stealth_window_secs),
            stealth_min_trades: self.stealth_min_trades,
            stealth_min_total_size: self.stealth_min_total_size,
            stealth_min_total_value: self.stealth_min_total_value,
            stealth_max_single_trade: self.stealth_max_single_trade,
            stealth_min_spread_minutes: self.stealth_min_spread_minutes,
            exit_min_exits: self.exit_min_exits,
            exit_min_score: self.exit_min_score,
            initial_delay: Duration::from_secs(self.recheck_delay_secs),
            recheck_spacing: Duration::from_secs(self.recheck_delay_secs),
            max_position_checks: self.max_position_checks,
            save_interval,
            ..PatternConfig::default()
        }
    }
}

/// Evaluator thresholds and gates.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorSection {
    #[serde(default = "default_min_notional")]
    pub min_notional: Decimal,
    #[serde(default = "default_obvious_price")]
    pub obvious_price: Decimal,
    #[serde(default = "default_obvious_trade_price")]
    pub obvious_trade_price: Decimal,
    /// Optional allow-list; empty means every wallet is evaluated.
    #[serde(default)]
    pub allowed_wallets: Vec<String>,
    #[serde(default = "default_max_markets_for_low")]
    pub max_markets_for_low: usize,
    #[serde(default = "default_high_win_min_resolved")]
    pub high_win_min_resolved: u32,
    #[serde(default = "default_high_win_rate_threshold")]
    pub high_win_rate_threshold: f64,
    #[serde(default = "default_extreme_low_price")]
    pub extreme_low_price: Decimal,
    #[serde(default = "default_extreme_min_notional")]
    pub extreme_min_notional: Decimal,
    #[serde(default = "default_new_wallet_max_markets")]
    pub new_wallet_max_markets: usize,
    #[serde(default = "default_new_wallet_min_notional")]
    pub new_wallet_min_notional: Decimal,
    #[serde(default = "default_contrarian_max_price")]
    pub contrarian_max_price: Decimal,
    #[serde(default = "default_contrarian_min_notional")]
    pub contrarian_min_notional: Decimal,
    #[serde(default = "default_massive_min_notional")]
    pub massive_min_notional: Decimal,
    #[serde(default = "default_massive_max_price")]
    pub massive_max_price: Decimal,
}

fn default_min_notional() -> Decimal {
    dec!(500)
}

fn default_obvious_price() -> Decimal {
    dec!(0.85)
}

fn default_obvious_trade_price() -> Decimal {
    dec!(0.95)
}

const fn default_max_markets_for_low() -> usize {
    5
}

const fn default_high_win_min_resolved() -> u32 {
    5
}

const fn default_high_win_rate_threshold() -> f64 {
    0.75
}

fn default_extreme_low_price() -> Decimal {
    dec!(0.10)
}

fn default_extreme_min_notional() -> Decimal {
    dec!(1000)
}

const fn default_new_wallet_max_markets() -> usize {
    1
}

fn default_new_wallet_min_notional() -> Decimal {
    dec!(1000)
}

fn default_contrarian_max_price() -> Decimal {
    dec!(0.30)
}

fn default_contrarian_min_notional() -> Decimal {
    dec!(1000)
}

fn default_massive_min_notional() -> Decimal {
    dec!(10000)
}

fn default_massive_max_price() -> Decimal {
    dec!(0.90)
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            min_notional: default_min_notional(),
            obvious_price: default_obvious_price(),
            obvious_trade_price: default_obvious_trade_price(),
            allowed_wallets: Vec::new(),
            max_markets_for_low: default_max_markets_for_low(),
            high_win_min_resolved: default_high_win_min_resolved(),
            high_win_rate_threshold: default_high_win_rate_threshold(),
            extreme_low_price: default_extreme_low_price(),
            extreme_min_notional: default_extreme_min_notional(),
            new_wallet_max_markets: default_new_wallet_max_markets(),
            new_wallet_min_notional: default_new_wallet_min_notional(),
            contrarian_max_price: default_contrarian_max_price(),
            contrarian_min_notional: default_contrarian_min_notional(),
            massive_min_notional: default_massive_min_notional(),
            massive_max_price: default_massive_max_price(),
        }
    }
}

impl EvaluatorSection {
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        let allowed: Option<HashSet<String>> = if self.allowed_wallets.is_empty() {
            None
        } else {
            Some(
                self.allowed_wallets
                    .iter()
                    .map(|w| w.to_lowercase())
                    .collect(),
            )
        };
        EvaluatorConfig {
            min_notional: self.min_notional,
            obvious_price: self.obvious_price,
            obvious_trade_price: self.obvious_trade_price,
            allowed_wallets: allowed,
            max_markets_for_low: self.max_markets_for_low,
            high_win_min_resolved: self.high_win_min_resolved,
            high_win_rate_threshold: self.high_win_rate_threshold,
            extreme_low_price: self.extreme_low_price,
            extreme_min_notional: self.extreme_min_notional,
            new_wallet_max_markets: self.new_wallet_max_markets,
            new_wallet_min_notional: self.new_wallet_min_notional,
            contrarian_max_price: self.contrarian_max_price,
            contrarian_min_notional: self.contrarian_min_notional,
            massive_min_notional: self.massive_min_notional,
            massive_max_price: self.massive_max_price,
            ..EvaluatorConfig::default()
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub markets: MarketsSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub watchdog: WatchdogSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub contrarian: ContrarianSection,
    #[serde(default)]
    pub rapid: RapidSection,
    #[serde(default, alias = "copy")]
    pub copy_trade: CopySection,
    #[serde(default)]
    pub hedge: HedgeSection,
    #[serde(default)]
    pub pattern: PatternSection,
    #[serde(default)]
    pub evaluator: EvaluatorSection,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Initialize logging from the `[logging]` section.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    fn validate(&self) -> Result<()> {
        if self.network.ws_url.is_empty() {
            return Err(Error::Config("network.ws_url is required".into()));
        }
        if self.network.api_url.is_empty() {
            return Err(Error::Config("network.api_url is required".into()));
        }
        if self.evaluator.obvious_price <= Decimal::ZERO
            || self.evaluator.obvious_price > Decimal::ONE
        {
            return Err(Error::Config(
                "evaluator.obvious_price must be in (0, 1]".into(),
            ));
        }
        if self.cache.contrarian_threshold <= Decimal::ZERO
            || self.cache.contrarian_threshold >= dec!(0.5)
        {
            return Err(Error::Config(
                "cache.contrarian_threshold must be in (0, 0.5)".into(),
            ));
        }
        if self.markets.top_limit == 0 {
            return Err(Error::Config("markets.top_limit must be positive".into()));
        }
        Ok(())
    }
}
