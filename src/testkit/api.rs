//! Scripted [`DataApi`] double.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::domain::{ActivityEntry, ClosedPosition, MarketInfo, Position};
use crate::core::exchange::DataApi;
use crate::error::{Error, Result};

/// Call counters shared out of a [`ScriptedDataApi`].
#[derive(Debug, Default)]
pub struct CallCounters {
    activity: AtomicUsize,
    closed: AtomicUsize,
    positions: AtomicUsize,
    markets: AtomicUsize,
}

impl CallCounters {
    pub fn activity_calls(&self) -> usize {
        self.activity.load(Ordering::SeqCst)
    }

    pub fn closed_calls(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn positions_calls(&self) -> usize {
        self.positions.load(Ordering::SeqCst)
    }

    pub fn markets_calls(&self) -> usize {
        self.markets.load(Ordering::SeqCst)
    }
}

fn upstream_error(endpoint: &str) -> Error {
    Error::UpstreamStatus {
        status: 500,
        endpoint: endpoint.to_string(),
    }
}

/// Deterministic test double for the upstream data API.
///
/// Each endpoint pops from its own queue of scripted batches, returning an
/// empty batch once exhausted. `fail_*_after(n)` makes every call after the
/// n-th fail with a 500.
#[derive(Default)]
pub struct ScriptedDataApi {
    activity: Mutex<VecDeque<Vec<ActivityEntry>>>,
    closed: Mutex<VecDeque<Vec<ClosedPosition>>>,
    positions: Mutex<VecDeque<Vec<Position>>>,
    markets: Mutex<VecDeque<Vec<MarketInfo>>>,
    by_condition: Mutex<HashMap<String, MarketInfo>>,
    fail_activity_after: AtomicUsize,
    fail_closed_after: AtomicUsize,
    fail_positions_after: AtomicUsize,
    fail_markets_after: AtomicUsize,
    counters: Arc<CallCounters>,
}

impl ScriptedDataApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.fail_activity_after.store(usize::MAX, Ordering::SeqCst);
        api.fail_closed_after.store(usize::MAX, Ordering::SeqCst);
        api.fail_positions_after.store(usize::MAX, Ordering::SeqCst);
        api.fail_markets_after.store(usize::MAX, Ordering::SeqCst);
        api
    }

    pub fn counters(&self) -> Arc<CallCounters> {
        self.counters.clone()
    }

    pub fn push_activity(&self, batch: Vec<ActivityEntry>) {
        self.activity.lock().push_back(batch);
    }

    pub fn push_closed(&self, batch: Vec<ClosedPosition>) {
        self.closed.lock().push_back(batch);
    }

    pub fn push_positions(&self, batch: Vec<Position>) {
        self.positions.lock().push_back(batch);
    }

    pub fn push_markets(&self, batch: Vec<MarketInfo>) {
        self.markets.lock().push_back(batch);
    }

    pub fn set_market(&self, market: MarketInfo) {
        self.by_condition
            .lock()
            .insert(market.condition_id.clone(), market);
    }

    pub fn fail_activity_after(&self, calls: usize) {
        self.fail_activity_after.store(calls, Ordering::SeqCst);
    }

    pub fn fail_closed_after(&self, calls: usize) {
        self.fail_closed_after.store(calls, Ordering::SeqCst);
    }

    pub fn fail_positions_after(&self, calls: usize) {
        self.fail_positions_after.store(calls, Ordering::SeqCst);
    }

    pub fn fail_markets_after(&self, calls: usize) {
        self.fail_markets_after.store(calls, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataApi for ScriptedDataApi {
    async fn user_activity(&self, _wallet: &str, _limit: usize) -> Result<Vec<ActivityEntry>> {
        let call = self.counters.activity.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_activity_after.load(Ordering::SeqCst) {
            return Err(upstream_error("/activity"));
        }
        Ok(self.activity.lock().pop_front().unwrap_or_default())
    }

    async fn closed_positions(
        &self,
        _wallet: &str,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<ClosedPosition>> {
        let call = self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_closed_after.load(Ordering::SeqCst) {
            return Err(upstream_error("/positions?closed=true"));
        }
        Ok(self.closed.lock().pop_front().unwrap_or_default())
    }

    async fn positions(
        &self,
        _wallet: &str,
        _condition_id: &str,
        _limit: usize,
    ) -> Result<Vec<Position>> {
        let call = self.counters.positions.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_positions_after.load(Ordering::SeqCst) {
            return Err(upstream_error("/positions"));
        }
        Ok(self.positions.lock().pop_front().unwrap_or_default())
    }

    async fn top_markets_by_volume(
        &self,
        _limit: usize,
        _categories: &[String],
    ) -> Result<Vec<MarketInfo>> {
        let call = self.counters.markets.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_markets_after.load(Ordering::SeqCst) {
            return Err(upstream_error("/markets"));
        }
        Ok(self.markets.lock().pop_front().unwrap_or_default())
    }

    async fn market_by_condition_id(&self, condition_id: &str) -> Result<Option<MarketInfo>> {
        Ok(self.by_condition.lock().get(condition_id).cloned())
    }
}
