//! Heuristic 0-100 quality score of a filtered sample
//!
//! quantity  = min(count_weight, n * points_per_sample)
//! consistency = max(0, consistency_weight - cv * dispersion_penalty)
//! coverage  = min(coverage_weight, range / expected_range * coverage_weight)

use crate::config::QualityConfig;

#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Score the retained prices of both sides, rounded to one decimal.
    /// An empty input scores 0.
    pub fn score(&self, prices: &[f64]) -> f64 {
        if prices.is_empty() {
            return 0.0;
        }
        let cfg = &self.config;
        let n = prices.len() as f64;

        let quantity = (n * cfg.points_per_sample).min(cfg.count_weight);

        let consistency = if prices.len() > 1 {
            let mean = prices.iter().sum::<f64>() / n;
            let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
            if mean > 0.0 {
                (cfg.consistency_weight - variance.sqrt() / mean * cfg.dispersion_penalty).max(0.0)
            } else {
                0.0
            }
        } else {
            cfg.consistency_weight / 2.0
        };

        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let coverage =
            ((max - min) / cfg.expected_range * cfg.coverage_weight).min(cfg.coverage_weight);

        let total = quantity + consistency + coverage;
        if !total.is_finite() {
            return 0.0;
        }
        (total.clamp(0.0, 100.0) * 10.0).round() / 10.0
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(QualityScorer::default().score(&[]), 0.0);
    }

    #[test]
    fn test_single_price() {
        // 0.5 + 15 + 0
        assert_eq!(QualityScorer::default().score(&[228.0]), 15.5);
    }

    #[test]
    fn test_large_tight_sample_saturates_quantity() {
        let prices: Vec<f64> = (0..100).map(|i| 300.0 + (i % 2) as f64).collect();
        let score = QualityScorer::default().score(&prices);
        // 30 quantity, ~29.9 consistency, 0.8 coverage
        assert!((score - 60.7).abs() < 0.2, "{}", score);
    }

    #[test]
    fn test_always_within_bounds() {
        let scorer = QualityScorer::default();
        let cases: Vec<Vec<f64>> = vec![
            vec![0.0, 0.0],
            vec![1.0, 1e9],
            vec![150.0; 500],
            (0..400).map(|i| 150.0 + i as f64).collect(),
        ];
        for prices in cases {
            let s = scorer.score(&prices);
            assert!((0.0..=100.0).contains(&s), "{} for {:?}", s, prices.len());
        }
    }
}
