//! Outlier removal that spares the tails
//!
//! The bottom `k` and top `k` observations by price are never removed.
//! Only the middle is checked against IQR fences. Small samples pass
//! through untouched.

use crate::config::FilterConfig;
use crate::types::{PriceObservation, SampleSet};

/// What a filter pass did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutcome {
    pub before: usize,
    pub after: usize,
    /// Observations exempt from fencing (both tails together)
    pub protected: usize,
    /// `(lower, upper)` when the middle had defined quartiles
    pub fences: Option<(f64, f64)>,
}

impl FilterOutcome {
    fn untouched(len: usize, protected: usize) -> Self {
        Self {
            before: len,
            after: len,
            protected,
            fences: None,
        }
    }

    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

#[derive(Debug, Clone)]
pub struct RobustFilter {
    preserve_fraction: f64,
    min_protected: usize,
    iqr_multiplier: f64,
    min_data_points: usize,
}

impl RobustFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            preserve_fraction: config.preserve_extremes_fraction,
            min_protected: config.min_protected_extremes,
            iqr_multiplier: config.iqr_multiplier,
            min_data_points: config.min_data_points,
        }
    }

    /// Protected observations per tail for a sample of `len`
    pub fn protected_per_tail(&self, len: usize) -> usize {
        let k = (len as f64 * self.preserve_fraction).round() as usize;
        k.max(self.min_protected)
    }

    pub fn filter(&self, samples: SampleSet) -> SampleSet {
        self.filter_detailed(samples).0
    }

    pub fn filter_detailed(&self, samples: SampleSet) -> (SampleSet, FilterOutcome) {
        let len = samples.len();
        if len < self.min_data_points {
            return (samples, FilterOutcome::untouched(len, 0));
        }

        let k = self.protected_per_tail(len);
        if 2 * k >= len {
            return (samples, FilterOutcome::untouched(len, len));
        }

        let sorted = samples.sorted_by_price();
        let (low, rest) = sorted.split_at(k);
        let (middle, high) = rest.split_at(rest.len() - k);

        let middle_prices: Vec<f64> = middle.iter().map(PriceObservation::price_f64).collect();
        let fences = quartiles(&middle_prices).map(|(q1, q3)| {
            let iqr = q3 - q1;
            (q1 - self.iqr_multiplier * iqr, q3 + self.iqr_multiplier * iqr)
        });

        let kept_middle = middle.iter().filter(|obs| match fences {
            Some((lower, upper)) => {
                let price = obs.price_f64();
                price >= lower && price <= upper
            }
            None => true,
        });

        let filtered = SampleSet::from_observations(
            samples.side(),
            samples.policy(),
            low.iter().chain(kept_middle).chain(high.iter()).cloned(),
        );

        let outcome = FilterOutcome {
            before: len,
            after: filtered.len(),
            protected: 2 * k,
            fences,
        };
        (filtered, outcome)
    }
}

/// First and third quartile of ascending `sorted` ("exclusive" method,
/// interpolation indices clamped to the data). `None` below 2 values.
pub fn quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    let len = sorted.len();
    if len < 2 {
        return None;
    }
    let m = len + 1;
    let cut = |i: usize| {
        let j = (i * m / 4).clamp(1, len - 1);
        let delta = (i * m) as f64 - (j * 4) as f64;
        (sorted[j - 1] * (4.0 - delta) + sorted[j] * delta) / 4.0
    };
    Some((cut(1), cut(3)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DedupPolicy, Side};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn config(fraction: f64, min_protected: usize, m: f64, min_points: usize) -> FilterConfig {
        FilterConfig {
            price_min: 100.0,
            price_max: 2_000.0,
            preserve_extremes_fraction: fraction,
            min_protected_extremes: min_protected,
            iqr_multiplier: m,
            min_data_points: min_points,
            dedup: DedupPolicy::default(),
        }
    }

    fn set(prices: &[Decimal]) -> SampleSet {
        SampleSet::from_observations(
            Side::Sell,
            DedupPolicy::default(),
            prices
                .iter()
                .enumerate()
                .map(|(i, p)| PriceObservation::new(*p, Side::Sell, format!("ad{}", i), 1)),
        )
    }

    #[test]
    fn test_quartiles_exclusive_method() {
        // statistics.quantiles([1..=8], n=4) -> [2.25, 4.5, 6.75]
        let data: Vec<f64> = (1..=8).map(f64::from).collect();
        assert_eq!(quartiles(&data), Some((2.25, 6.75)));

        // clamped indices extrapolate on tiny inputs
        assert_eq!(quartiles(&[10.0, 20.0]), Some((7.5, 22.5)));
        assert_eq!(quartiles(&[5.0]), None);
        assert_eq!(quartiles(&[]), None);
    }

    #[test]
    fn test_small_sample_is_untouched() {
        let filter = RobustFilter::new(&config(0.0, 0, 1.5, 10));
        let input = set(&[dec!(200), dec!(201), dec!(1900)]);
        let (out, outcome) = filter.filter_detailed(input.clone());
        assert_eq!(out, input);
        assert_eq!(outcome.removed(), 0);
    }

    #[test]
    fn test_unprotected_outlier_is_removed() {
        let mut prices = vec![dec!(300), dec!(302), dec!(305), dec!(1000)];
        for i in 0..20 {
            prices.push(Decimal::from(301) + Decimal::new(i, 1));
        }
        let filter = RobustFilter::new(&config(0.0, 0, 2.5, 3));
        let (out, outcome) = filter.filter_detailed(set(&prices));

        assert_eq!(outcome.removed(), 1);
        assert!(out.iter().all(|o| o.price != dec!(1000)));
        let max = out.iter().map(|o| o.price).max().unwrap();
        assert_eq!(max, dec!(305));
    }

    #[test]
    fn test_protected_tail_survives() {
        let mut prices: Vec<Decimal> = (0..20).map(|i| Decimal::from(300 + i)).collect();
        prices.push(dec!(1000));
        let filter = RobustFilter::new(&config(0.05, 1, 2.5, 3));
        let out = filter.filter(set(&prices));
        assert_eq!(out.len(), prices.len());
        assert!(out.iter().any(|o| o.price == dec!(1000)));
    }

    #[test]
    fn test_protection_covering_everything_returns_input() {
        let filter = RobustFilter::new(&config(0.5, 2, 1.5, 1));
        let input = set(&[dec!(200), dec!(201), dec!(900), dec!(1900)]);
        let (out, outcome) = filter.filter_detailed(input.clone());
        assert_eq!(out, input);
        assert_eq!(outcome.protected, 4);
    }

    #[test]
    fn test_degenerate_middle_is_kept() {
        // k = 2 leaves one middle value: no quartiles, nothing removed
        let filter = RobustFilter::new(&config(0.0, 2, 0.0, 1));
        let (out, outcome) =
            filter.filter_detailed(set(&[dec!(200), dec!(210), dec!(1500), dec!(220), dec!(230)]));
        assert_eq!(out.len(), 5);
        assert_eq!(outcome.fences, None);
    }

    #[test]
    fn test_removed_only_outside_fences_and_never_grows() {
        let prices: Vec<Decimal> = vec![
            dec!(180), dec!(240), dec!(241), dec!(242), dec!(243), dec!(244),
            dec!(245), dec!(246), dec!(247), dec!(320), dec!(480), dec!(490),
        ];
        let filter = RobustFilter::new(&config(0.1, 1, 1.5, 3));
        let input = set(&prices);
        let (out, outcome) = filter.filter_detailed(input.clone());
        assert!(out.len() <= input.len());

        let k = filter.protected_per_tail(input.len());
        let sorted = input.sorted_by_price();
        let (lower, upper) = outcome.fences.unwrap();
        for (idx, obs) in sorted.iter().enumerate() {
            if !out.contains(obs) {
                assert!(idx >= k && idx < sorted.len() - k, "protected value removed");
                let p = obs.price_f64();
                assert!(p < lower || p > upper, "value inside fences removed");
            }
        }
    }
}
