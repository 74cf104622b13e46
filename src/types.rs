//! Core types used throughout p2prate
//!
//! Defines market sides, captured price observations and the deduplicated
//! sample set every pipeline stage hands to the next.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Direction of a marketplace quote relative to the base asset (USDT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Counter-party offers to give up the base asset
    Sell,
    /// Counter-party offers to acquire the base asset
    Buy,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Sell, Side::Buy];

    /// Value of the `tradeType` field in marketplace search requests
    pub fn trade_type(&self) -> &'static str {
        match self {
            Side::Sell => "SELL",
            Side::Buy => "BUY",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SELL" => Some(Side::Sell),
            "BUY" => Some(Side::Buy),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trade_type())
    }
}

/// One quote captured from the marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Quoted price, always inside the configured plausible range
    pub price: Decimal,
    pub side: Side,
    /// Advertisement id; empty when the listing did not carry one
    pub identity: String,
    /// Page the quote was seen on (diagnostic only)
    pub origin_page: u32,
    /// Sampling run the quote was seen in (diagnostic only)
    pub origin_run: u32,
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(price: Decimal, side: Side, identity: impl Into<String>, origin_page: u32) -> Self {
        Self {
            price,
            side,
            identity: identity.into(),
            origin_page,
            origin_run: 1,
            observed_at: Utc::now(),
        }
    }

    pub fn with_run(mut self, run: u32) -> Self {
        self.origin_run = run;
        self
    }

    pub fn price_f64(&self) -> f64 {
        self.price.to_f64().unwrap_or(0.0)
    }

    /// True when the advertisement id was missing
    pub fn is_anonymous(&self) -> bool {
        self.identity.is_empty()
    }
}

/// How observations are keyed when deduplicating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Key by `(price, identity)`. Anonymous ads with equal prices collapse.
    #[default]
    PriceAndIdentity,
    /// Same as above, but anonymous ads are additionally keyed by the
    /// `(run, page)` they were seen on.
    PageScopedAnonymous,
}

impl DedupPolicy {
    pub fn key(&self, obs: &PriceObservation) -> DedupKey {
        let scope = match self {
            DedupPolicy::PageScopedAnonymous if obs.is_anonymous() => {
                Some((obs.origin_run, obs.origin_page))
            }
            _ => None,
        };
        DedupKey {
            price: obs.price.normalize(),
            identity: obs.identity.clone(),
            scope,
        }
    }
}

/// Deduplication key of an observation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    price: Decimal,
    identity: String,
    scope: Option<(u32, u32)>,
}

/// Insertion-ordered observations for one side, unique by dedup key
#[derive(Debug, Clone)]
pub struct SampleSet {
    side: Side,
    policy: DedupPolicy,
    items: Vec<PriceObservation>,
    keys: HashSet<DedupKey>,
}

impl SampleSet {
    pub fn new(side: Side) -> Self {
        Self::with_policy(side, DedupPolicy::default())
    }

    pub fn with_policy(side: Side, policy: DedupPolicy) -> Self {
        Self {
            side,
            policy,
            items: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Build a set from observations, keeping the first of each duplicate
    pub fn from_observations(
        side: Side,
        policy: DedupPolicy,
        observations: impl IntoIterator<Item = PriceObservation>,
    ) -> Self {
        let mut set = Self::with_policy(side, policy);
        set.extend(observations);
        set
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Append an observation. Returns false if its key was already present.
    pub fn push(&mut self, obs: PriceObservation) -> bool {
        debug_assert_eq!(obs.side, self.side, "observation pushed into the wrong side");
        if self.keys.insert(self.policy.key(&obs)) {
            self.items.push(obs);
            true
        } else {
            false
        }
    }

    /// Append many observations, returning how many were new
    pub fn extend(&mut self, observations: impl IntoIterator<Item = PriceObservation>) -> usize {
        let mut added = 0;
        for obs in observations {
            if self.push(obs) {
                added += 1;
            }
        }
        added
    }

    /// Merge another set into this one, preserving first-seen order
    pub fn merge(&mut self, other: &SampleSet) -> usize {
        self.extend(other.items.iter().cloned())
    }

    pub fn contains(&self, obs: &PriceObservation) -> bool {
        self.keys.contains(&self.policy.key(obs))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PriceObservation> {
        self.items.iter()
    }

    pub fn observations(&self) -> &[PriceObservation] {
        &self.items
    }

    pub fn into_observations(self) -> Vec<PriceObservation> {
        self.items
    }

    pub fn prices(&self) -> Vec<f64> {
        self.items.iter().map(PriceObservation::price_f64).collect()
    }

    pub fn decimal_prices(&self) -> Vec<Decimal> {
        self.items.iter().map(|obs| obs.price).collect()
    }

    /// Observations sorted ascending by price (stable)
    pub fn sorted_by_price(&self) -> Vec<PriceObservation> {
        let mut sorted = self.items.clone();
        sorted.sort_by(|a, b| a.price.cmp(&b.price));
        sorted
    }
}

impl PartialEq for SampleSet {
    fn eq(&self, other: &Self) -> bool {
        self.side == other.side && self.items == other.items
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a PriceObservation;
    type IntoIter = std::slice::Iter<'a, PriceObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn obs(price: Decimal, id: &str, page: u32) -> PriceObservation {
        PriceObservation::new(price, Side::Sell, id, page)
    }

    #[test]
    fn test_side_trade_type_roundtrip() {
        for side in Side::ALL {
            assert_eq!(Side::from_str(side.trade_type()), Some(side));
        }
        assert_eq!(Side::from_str("sell"), Some(Side::Sell));
        assert_eq!(Side::from_str("hold"), None);
    }

    #[test]
    fn test_push_rejects_duplicate_key() {
        let mut set = SampleSet::new(Side::Sell);
        assert!(set.push(obs(dec!(36.50), "a1", 1)));
        assert!(!set.push(obs(dec!(36.5), "a1", 2)));
        assert!(set.push(obs(dec!(36.50), "a2", 1)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.observations()[0].origin_page, 1);
    }

    #[test]
    fn test_merge_with_self_is_idempotent() {
        let mut set = SampleSet::new(Side::Sell);
        set.extend(vec![
            obs(dec!(36.1), "a", 1),
            obs(dec!(36.2), "b", 1),
            obs(dec!(36.2), "", 2),
        ]);
        let before = set.clone();
        let added = set.merge(&before);
        assert_eq!(added, 0);
        assert_eq!(set, before);
    }

    #[test]
    fn test_anonymous_ads_collapse_by_default() {
        let mut set = SampleSet::new(Side::Sell);
        set.push(obs(dec!(40), "", 1));
        set.push(obs(dec!(40), "", 3));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_page_scoped_policy_keeps_anonymous_ads_from_other_pages() {
        let mut set = SampleSet::with_policy(Side::Sell, DedupPolicy::PageScopedAnonymous);
        set.push(obs(dec!(40), "", 1));
        set.push(obs(dec!(40), "", 3));
        set.push(obs(dec!(40), "", 3));
        // identified ads still dedup across pages
        set.push(obs(dec!(41), "x", 1));
        set.push(obs(dec!(41), "x", 2));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_sorted_by_price_is_stable() {
        let set = SampleSet::from_observations(
            Side::Sell,
            DedupPolicy::default(),
            vec![obs(dec!(3), "c", 1), obs(dec!(1), "a", 1), obs(dec!(3), "b", 2)],
        );
        let sorted = set.sorted_by_price();
        let ids: Vec<&str> = sorted.iter().map(|o| o.identity.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        // source set is untouched
        assert_eq!(set.observations()[0].identity, "c");
    }
}
