//! Application orchestration.

mod config;
mod orchestrator;

pub use config::{
    CacheSection, Config, ContrarianSection, CopySection, EvaluatorSection, EventsSection,
    HedgeSection, LoggingConfig, MarketsSection, NetworkConfig, PatternSection, RapidSection,
    StoreSection, WatchdogSection,
};
pub use orchestrator::App;
