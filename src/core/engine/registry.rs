//! Active market set and token-to-market resolution.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use crate::core::domain::MarketInfo;

/// Subscription operations implied by a market-set update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    pub subscribe: Vec<String>,
    pub unsubscribe: Vec<String>,
}

impl SubscriptionDiff {
    /// No tokens changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

#[derive(Default)]
struct RegistryState {
    by_token: HashMap<String, MarketInfo>,
    condition_ids: Vec<String>,
    token_ids: Vec<String>,
}

/// Token → market map over the currently monitored market set.
#[derive(Default)]
pub struct MarketRegistry {
    state: RwLock<RegistryState>,
}

impl MarketRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the monitored set and report the token-set difference.
    ///
    /// The caller applies the diff to the event client while connected;
    /// after a reconnect the full `token_ids` vector is resubscribed from
    /// scratch, so an unapplied diff is never lost.
    pub fn update_markets(&self, markets: Vec<MarketInfo>) -> SubscriptionDiff {
        let mut by_token = HashMap::new();
        let mut condition_ids = Vec::new();
        let mut token_ids = Vec::new();

        for market in markets {
            if market.token_ids.is_empty() {
                continue;
            }
            if !condition_ids.contains(&market.condition_id) {
                condition_ids.push(market.condition_id.clone());
            }
            for token in &market.token_ids {
                if by_token.insert(token.clone(), market.clone()).is_none() {
                    token_ids.push(token.clone());
                }
            }
        }

        let mut state = self.state.write();
        let old: HashSet<&String> = state.token_ids.iter().collect();
        let new: HashSet<&String> = token_ids.iter().collect();

        let diff = SubscriptionDiff {
            subscribe: token_ids
                .iter()
                .filter(|t| !old.contains(t))
                .cloned()
                .collect(),
            unsubscribe: state
                .token_ids
                .iter()
                .filter(|t| !new.contains(t))
                .cloned()
                .collect(),
        };

        debug!(
            markets = condition_ids.len(),
            tokens = token_ids.len(),
            subscribe = diff.subscribe.len(),
            unsubscribe = diff.unsubscribe.len(),
            "Market registry updated"
        );

        *state = RegistryState {
            by_token,
            condition_ids,
            token_ids,
        };
        diff
    }

    /// Market metadata for an outcome token.
    #[must_use]
    pub fn market_for_token(&self, asset_id: &str) -> Option<MarketInfo> {
        self.state.read().by_token.get(asset_id).cloned()
    }

    /// The full token vector, in first-seen order.
    #[must_use]
    pub fn token_ids(&self) -> Vec<String> {
        self.state.read().token_ids.clone()
    }

    /// Deduplicated condition ids of the monitored markets.
    #[must_use]
    pub fn condition_ids(&self) -> Vec<String> {
        self.state.read().condition_ids.clone()
    }

    /// Number of monitored markets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().condition_ids.len()
    }

    /// Whether no markets are monitored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().condition_ids.is_empty()
    }
}
