//! Caches over upstream wallet history.

mod wallet_stats;

pub use wallet_stats::{CacheConfig, CacheSnapshot, WalletStatsCache};
