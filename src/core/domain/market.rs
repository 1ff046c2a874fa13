//! Market metadata domain types.

use serde::{Deserialize, Serialize};

/// Metadata for a monitored market.
///
/// Many outcome tokens map to one market; `outcomes[i]` names the outcome
/// traded as `token_ids[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub condition_id: String,
    pub title: String,
    pub slug: String,
    pub image_url: String,
    pub outcomes: Vec<String>,
    pub token_ids: Vec<String>,
}

impl MarketInfo {
    /// Create a market, defaulting empty outcome lists to `["Yes", "No"]`.
    pub fn new(
        condition_id: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
        image_url: impl Into<String>,
        outcomes: Vec<String>,
        token_ids: Vec<String>,
    ) -> Self {
        let outcomes = if outcomes.is_empty() {
            vec!["Yes".to_string(), "No".to_string()]
        } else {
            outcomes
        };
        Self {
            condition_id: condition_id.into(),
            title: title.into(),
            slug: slug.into(),
            image_url: image_url.into(),
            outcomes,
            token_ids,
        }
    }

    /// Resolve the outcome name for an asset by its index in `token_ids`.
    ///
    /// Falls back to `"Unknown"` when the asset is not part of this market
    /// or the outcome list is shorter than the token list.
    #[must_use]
    pub fn outcome_for_token(&self, asset_id: &str) -> &str {
        self.token_ids
            .iter()
            .position(|t| t == asset_id)
            .and_then(|i| self.outcomes.get(i))
            .map_or("Unknown", String::as_str)
    }
}
