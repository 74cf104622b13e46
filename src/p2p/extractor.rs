//! Offer extraction
//!
//! Turns one untrusted advertisement into a [`PriceObservation`], or
//! nothing. Malformed entries are expected noise and never an error.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use super::types::RawOffer;
use crate::config::FilterConfig;
use crate::types::{PriceObservation, Side};

/// Inclusive plausible price band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceRange {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn from_f64(min: f64, max: f64) -> Option<Self> {
        Some(Self::new(Decimal::from_f64(min)?, Decimal::from_f64(max)?))
    }

    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.min && price <= self.max
    }
}

#[derive(Debug, Clone)]
pub struct OfferExtractor {
    range: PriceRange,
}

impl OfferExtractor {
    pub fn new(range: PriceRange) -> Self {
        Self { range }
    }

    pub fn from_config(filter: &FilterConfig) -> Result<Self> {
        let range = PriceRange::from_f64(filter.price_min, filter.price_max)
            .context("Price range is not representable as a decimal")?;
        Ok(Self::new(range))
    }

    pub fn range(&self) -> PriceRange {
        self.range
    }

    /// Accepts a quote only if its price parses as a positive decimal
    /// inside the plausible range.
    pub fn extract(&self, raw: &RawOffer, side: Side, page: u32) -> Option<PriceObservation> {
        let adv = raw.adv.as_ref()?;
        let price = adv.price.as_ref().and_then(parse_price)?;
        if price <= Decimal::ZERO || !self.range.contains(price) {
            return None;
        }
        let identity = adv.adv_no.as_ref().map(identity_of).unwrap_or_default();
        Some(PriceObservation::new(price, side, identity, page))
    }

    /// Extract a whole page, tagging each observation with its run
    pub fn extract_page(
        &self,
        offers: &[RawOffer],
        side: Side,
        page: u32,
        run: u32,
    ) -> Vec<PriceObservation> {
        offers
            .iter()
            .filter_map(|raw| self.extract(raw, side, page))
            .map(|obs| obs.with_run(run))
            .collect()
    }
}

fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        _ => None,
    }
}

fn identity_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}
