//! Subscription tiers and their monthly issuance limits.
//!
//! The policy is a plain lookup table loaded from configuration. Adding a
//! tier means adding one entry to the `tiers` section; nothing else in the
//! crate enumerates tier names.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Tier assigned to accounts that are created implicitly on first issuance.
pub const DEFAULT_TIER: &str = "free";

/// Mapping from tier name to the number of links an account may issue per
/// quota period.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TierPolicy {
    limits: BTreeMap<String, u32>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::new([("free", 10), ("basic", 15), ("premium", 20)])
    }
}

impl TierPolicy {
    /// Build a policy from `(tier, limit)` pairs.
    pub fn new<I, S>(limits: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            limits: limits
                .into_iter()
                .map(|(tier, limit)| (tier.into(), limit))
                .collect(),
        }
    }

    /// Monthly limit for `tier`.
    ///
    /// Unknown tiers get a limit of 0, so issuance for them is always denied.
    pub fn limit(&self, tier: &str) -> u32 {
        self.limits.get(tier).copied().unwrap_or(0)
    }

    /// Whether `tier` is present in the table.
    pub fn is_known(&self, tier: &str) -> bool {
        self.limits.contains_key(tier)
    }

    /// Iterate over `(tier, limit)` pairs in name order.
    pub fn tiers(&self) -> impl Iterator<Item = (&str, u32)> {
        self.limits.iter().map(|(tier, limit)| (tier.as_str(), *limit))
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}
