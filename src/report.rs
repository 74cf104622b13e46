//! Pipeline results and the JSON record printed by the binary

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{FallbackRates, Profile};
use crate::pipeline::SamplingStats;

/// Round to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round an exact price to cents (half to even) and widen to f64
pub fn cents(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or(0.0)
}

/// Price statistics of one side
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SideStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    /// Observations behind the numbers; 0 means placeholder values
    pub count: usize,
}

impl SideStats {
    /// `None` for an empty slice. All three figures are taken on the exact
    /// prices and rounded with the same rule, so `min <= mean <= max` holds
    /// after rounding.
    pub fn from_prices(prices: &[Decimal]) -> Option<Self> {
        let min = prices.iter().copied().min()?;
        let max = prices.iter().copied().max()?;
        let sum: Decimal = prices.iter().sum();
        let mean = (sum / Decimal::from(prices.len())).clamp(min, max);
        Some(Self {
            min: cents(min),
            mean: cents(mean),
            max: cents(max),
            count: prices.len(),
        })
    }

    /// Flat stand-in for a side without data
    pub fn placeholder(value: f64) -> Self {
        Self {
            min: value,
            mean: value,
            max: value,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Spreads {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Live aggregation over the filtered samples
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub sell: SideStats,
    pub buy: SideStats,
    pub overall_min: f64,
    pub overall_max: f64,
    pub general_average: f64,
    pub spreads: Spreads,
    pub quality_score: f64,
    pub sample_size: usize,
    pub timestamp: DateTime<Utc>,
}

/// Conservative constants served when no side produced data
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResult {
    pub rates: FallbackRates,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl FallbackResult {
    pub fn new(rates: FallbackRates, reason: impl Into<String>) -> Self {
        Self {
            rates,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Terminal state of a run. `Degraded` is a value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RateOutcome {
    Live(AggregateResult),
    Degraded(FallbackResult),
}

impl RateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RateOutcome::Live(_))
    }

    pub fn quality_score(&self) -> f64 {
        match self {
            RateOutcome::Live(result) => result.quality_score,
            RateOutcome::Degraded(_) => 0.0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RateOutcome::Live(_) => None,
            RateOutcome::Degraded(fallback) => Some(&fallback.reason),
        }
    }
}

/// Everything known about one pipeline run
#[derive(Debug, Clone)]
pub struct RateReport {
    pub run_id: Uuid,
    pub profile: Profile,
    pub outcome: RateOutcome,
    pub stats: SamplingStats,
    pub elapsed: Duration,
    pub sampling_runs: u32,
    pub preserve_extremes_fraction: f64,
    pub request_timeout: Duration,
    pub source: String,
    pub fallback_source: String,
}

impl RateReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn record(&self) -> RateRecord {
        let debug = DebugInfo {
            pages_scraped: self.stats.pages_fetched,
            requests_made: self.stats.requests,
            offers_seen: self.stats.offers_seen,
            offers_rejected: self.stats.offers_rejected,
            timeout_used: self.request_timeout.as_secs_f64(),
            extreme_preservation_percent: round2(self.preserve_extremes_fraction * 100.0),
            budget_exhausted: self.stats.budget_exhausted,
        };
        let execution_time = round2(self.elapsed.as_secs_f64());

        match &self.outcome {
            RateOutcome::Live(result) => {
                RateRecord::live(result, self, execution_time, debug)
            }
            RateOutcome::Degraded(fallback) => RateRecord::fallback(
                &fallback.rates,
                &self.fallback_source,
                &fallback.reason,
                fallback.timestamp,
                execution_time,
                Some(debug),
            ),
        }
    }
}

/// The JSON document written to stdout
#[derive(Debug, Clone, Serialize)]
pub struct RateRecord {
    pub success: bool,
    pub data: RateData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateData {
    pub usd_ves: f64,
    pub usdt_ves: f64,
    pub sell_rate: f64,
    pub buy_rate: f64,
    pub sell_min: f64,
    pub sell_avg: f64,
    pub sell_max: f64,
    pub buy_min: f64,
    pub buy_avg: f64,
    pub buy_max: f64,
    pub overall_min: f64,
    pub overall_max: f64,
    pub spread: f64,
    pub spread_min: f64,
    pub spread_avg: f64,
    pub spread_max: f64,
    pub prices_used: usize,
    pub sell_prices_used: usize,
    pub buy_prices_used: usize,
    pub price_range: PriceRangeBlock,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
    pub source: String,
    pub quality_score: f64,
    pub execution_time: f64,
    pub sampling_runs: u32,
    pub optimization_level: String,
    pub extreme_preservation_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRangeBlock {
    pub sell_min: f64,
    pub sell_max: f64,
    pub buy_min: f64,
    pub buy_max: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DebugInfo {
    pub pages_scraped: u32,
    pub requests_made: u32,
    pub offers_seen: usize,
    pub offers_rejected: usize,
    /// Per-request timeout in seconds
    pub timeout_used: f64,
    pub extreme_preservation_percent: f64,
    pub budget_exhausted: bool,
}

impl RateRecord {
    fn live(
        result: &AggregateResult,
        report: &RateReport,
        execution_time: f64,
        debug: DebugInfo,
    ) -> Self {
        let usd_ves = round2(result.general_average);
        Self {
            success: true,
            data: RateData {
                usd_ves,
                usdt_ves: usd_ves,
                sell_rate: result.sell.mean,
                buy_rate: result.buy.mean,
                sell_min: result.sell.min,
                sell_avg: result.sell.mean,
                sell_max: result.sell.max,
                buy_min: result.buy.min,
                buy_avg: result.buy.mean,
                buy_max: result.buy.max,
                overall_min: result.overall_min,
                overall_max: result.overall_max,
                spread: result.spreads.avg,
                spread_min: result.spreads.min,
                spread_avg: result.spreads.avg,
                spread_max: result.spreads.max,
                prices_used: result.sample_size,
                sell_prices_used: result.sell.count,
                buy_prices_used: result.buy.count,
                price_range: PriceRangeBlock {
                    sell_min: result.sell.min,
                    sell_max: result.sell.max,
                    buy_min: result.buy.min,
                    buy_max: result.buy.max,
                    min: result.overall_min,
                    max: result.overall_max,
                },
                last_updated: iso8601(result.timestamp),
                source: report.source.clone(),
                quality_score: result.quality_score,
                execution_time,
                sampling_runs: report.sampling_runs,
                optimization_level: report.profile.name().to_string(),
                extreme_preservation_percent: debug.extreme_preservation_percent,
                debug: Some(debug),
            },
            error: None,
        }
    }

    /// Record carrying the fallback constants. Also used by the binary
    /// when the pipeline could not even be constructed.
    pub fn fallback(
        rates: &FallbackRates,
        source: &str,
        error: &str,
        timestamp: DateTime<Utc>,
        execution_time: f64,
        debug: Option<DebugInfo>,
    ) -> Self {
        Self {
            success: false,
            data: RateData {
                usd_ves: rates.usd_ves,
                usdt_ves: rates.usd_ves,
                sell_rate: rates.sell_avg,
                buy_rate: rates.buy_avg,
                sell_min: rates.sell_min,
                sell_avg: rates.sell_avg,
                sell_max: rates.sell_max,
                buy_min: rates.buy_min,
                buy_avg: rates.buy_avg,
                buy_max: rates.buy_max,
                overall_min: rates.overall_min(),
                overall_max: rates.overall_max(),
                spread: rates.spread_avg,
                spread_min: rates.spread_min,
                spread_avg: rates.spread_avg,
                spread_max: rates.spread_max,
                prices_used: 0,
                sell_prices_used: 0,
                buy_prices_used: 0,
                price_range: PriceRangeBlock {
                    sell_min: rates.sell_min,
                    sell_max: rates.sell_max,
                    buy_min: rates.buy_min,
                    buy_max: rates.buy_max,
                    min: rates.overall_min(),
                    max: rates.overall_max(),
                },
                last_updated: iso8601(timestamp),
                source: source.to_string(),
                quality_score: 0.0,
                execution_time,
                sampling_runs: 0,
                optimization_level: "fallback".to_string(),
                extreme_preservation_percent: 0.0,
                debug,
            },
            error: Some(error.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn live_report() -> RateReport {
        let sell = SideStats::from_prices(&[dec!(250), dec!(252)]).unwrap();
        let buy = SideStats::from_prices(&[dec!(248), dec!(249)]).unwrap();
        RateReport {
            run_id: Uuid::new_v4(),
            profile: Profile::Enhanced,
            outcome: RateOutcome::Live(AggregateResult {
                sell,
                buy,
                overall_min: 248.0,
                overall_max: 252.0,
                general_average: 249.75,
                spreads: Spreads {
                    min: 1.0,
                    avg: 2.5,
                    max: 4.0,
                },
                quality_score: 35.1,
                sample_size: 4,
                timestamp: Utc::now(),
            }),
            stats: SamplingStats {
                pages_fetched: 2,
                requests: 3,
                offers_seen: 4,
                offers_rejected: 0,
                budget_exhausted: false,
            },
            elapsed: Duration::from_millis(1_234),
            sampling_runs: 3,
            preserve_extremes_fraction: 0.05,
            request_timeout: Duration::from_secs(15),
            source: "Binance P2P (Enhanced)".into(),
            fallback_source: "Fallback Data (Enhanced)".into(),
        }
    }

    #[test]
    fn test_side_stats_bounds() {
        let stats = SideStats::from_prices(&[dec!(301.333), dec!(299.999), dec!(305)]).unwrap();
        assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        assert_eq!(stats.min, 300.0);
        assert_eq!(stats.mean, 302.11);
        assert_eq!(stats.count, 3);
        assert!(SideStats::from_prices(&[]).is_none());
    }

    #[test]
    fn test_cents_rounds_half_to_even() {
        assert_eq!(cents(dec!(150.015)), 150.02);
        assert_eq!(cents(dec!(150.005)), 150.0);
        assert_eq!(cents(dec!(150.0051)), 150.01);
    }

    #[test]
    fn test_live_record_fields() {
        let json = serde_json::to_value(live_report().record()).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
        let data = &json["data"];
        assert_eq!(data["usd_ves"], 249.75);
        assert_eq!(data["sell_avg"], 251.0);
        assert_eq!(data["spread_avg"], 2.5);
        assert_eq!(data["spread"], 2.5);
        assert_eq!(data["prices_used"], 4);
        assert_eq!(data["price_range"]["max"], 252.0);
        assert_eq!(data["source"], "Binance P2P (Enhanced)");
        assert_eq!(data["optimization_level"], "enhanced");
        assert_eq!(data["execution_time"], 1.23);
        assert_eq!(data["extreme_preservation_percent"], 5.0);
        assert_eq!(data["debug"]["requests_made"], 3);
        assert!(data["lastUpdated"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_fallback_record_fields() {
        let mut report = live_report();
        report.outcome = RateOutcome::Degraded(FallbackResult::new(
            FallbackRates::default(),
            "Could not get valid P2P prices",
        ));
        assert!(!report.is_success());

        let json = serde_json::to_value(report.record()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Could not get valid P2P prices");
        let data = &json["data"];
        assert_eq!(data["usd_ves"], 228.25);
        assert_eq!(data["overall_min"], 227.5);
        assert_eq!(data["overall_max"], 229.0);
        assert_eq!(data["quality_score"], 0.0);
        assert_eq!(data["source"], "Fallback Data (Enhanced)");
        assert_eq!(data["optimization_level"], "fallback");
        assert_eq!(data["prices_used"], 0);
    }
}
