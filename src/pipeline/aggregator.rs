//! Per-side and cross-side statistics
//!
//! An empty side is reported with flat fallback values and contributes
//! nothing to overall bounds or spreads. Both sides empty is the one
//! condition that degrades the run.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;

use super::quality::QualityScorer;
use crate::config::FallbackRates;
use crate::report::{cents, round2, AggregateResult, FallbackResult, RateOutcome, SideStats, Spreads};
use crate::types::SampleSet;

pub const NO_DATA_REASON: &str = "Could not get valid P2P prices";

#[derive(Debug, Clone)]
pub struct Aggregator {
    scorer: QualityScorer,
    fallback: FallbackRates,
}

impl Aggregator {
    pub fn new(scorer: QualityScorer, fallback: FallbackRates) -> Self {
        Self { scorer, fallback }
    }

    pub fn aggregate(&self, sell: &SampleSet, buy: &SampleSet) -> RateOutcome {
        let sell_prices = sell.decimal_prices();
        let buy_prices = buy.decimal_prices();

        let (sell_stats, buy_stats) = match (
            SideStats::from_prices(&sell_prices),
            SideStats::from_prices(&buy_prices),
        ) {
            (None, None) => {
                return RateOutcome::Degraded(FallbackResult::new(
                    self.fallback.clone(),
                    NO_DATA_REASON,
                ))
            }
            (sell_stats, buy_stats) => (
                sell_stats.unwrap_or_else(|| SideStats::placeholder(self.fallback.sell_avg)),
                buy_stats.unwrap_or_else(|| SideStats::placeholder(self.fallback.buy_avg)),
            ),
        };

        let both = sell_stats.has_data() && buy_stats.has_data();

        let general_average = match (sell_stats.has_data(), buy_stats.has_data()) {
            (true, true) => (sell_stats.mean + buy_stats.mean) / 2.0,
            (true, false) => sell_stats.mean,
            _ => buy_stats.mean,
        };

        let mut all = sell_prices;
        all.extend_from_slice(&buy_prices);
        let overall_min = all.iter().copied().min().map(cents).unwrap_or_default();
        let overall_max = all.iter().copied().max().map(cents).unwrap_or_default();
        let scored: Vec<f64> = all.iter().filter_map(|p| p.to_f64()).collect();

        let spreads = if both {
            Spreads {
                min: round2((sell_stats.min - buy_stats.max).abs()),
                avg: round2((sell_stats.mean - buy_stats.mean).abs()),
                max: round2((sell_stats.max - buy_stats.min).abs()),
            }
        } else {
            Spreads::default()
        };

        RateOutcome::Live(AggregateResult {
            sell: sell_stats,
            buy: buy_stats,
            overall_min,
            overall_max,
            general_average,
            spreads,
            quality_score: self.scorer.score(&scored),
            sample_size: all.len(),
            timestamp: Utc::now(),
        })
    }
}
