//! Behavioural state trackers and their shared capability set.

mod contrarian;
mod copytrade;
mod hedge;
mod pattern;
mod rapid;

pub use contrarian::{ContrarianConfig, ContrarianPublisher, ContrarianTracker};
pub use copytrade::{CopySignal, CopyTradeConfig, CopyTradeTracker};
pub use hedge::{HedgeConfig, HedgeFindings, HedgeTracker};
pub use pattern::{PatternConfig, PatternFindings, PatternTracker};
pub use rapid::{RapidConfig, RapidSignal, RapidTradeWindow};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Point-in-time summary of a tracker, for the dashboard source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStats {
    pub name: &'static str,
    /// Wallets (or keys) currently tracked.
    pub entries: usize,
    /// Deferred jobs or queued updates awaiting the worker.
    pub pending: usize,
}

/// Common lifecycle capability shared by every tracker.
///
/// The orchestrator iterates trackers uniformly: load persisted state on
/// startup, start the worker (if the tracker owns one), save periodically
/// and on shutdown. Each tracker remains a distinct concrete type; this
/// trait is only the lifecycle seam.
#[async_trait]
pub trait Tracker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Restore persisted state. Missing or corrupt state is not an error.
    async fn load(&self) -> Result<()>;

    /// Start the tracker's worker task, when it owns one.
    ///
    /// The worker runs until `shutdown` flips; its join handle doubles as
    /// the done signal.
    fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>>;

    /// Persist current state. A no-op when nothing changed or no store is
    /// configured.
    async fn save(&self) -> Result<()>;

    /// Snapshot of the tracker's size, never a live reference.
    fn stats(&self) -> TrackerStats;
}
