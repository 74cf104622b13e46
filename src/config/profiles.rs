//! Named tuning presets
//!
//! Each profile trades coverage against latency. They all drive the same
//! pipeline; only the numbers differ.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{FilterConfig, RetryConfig, SamplingConfig, SearchVariant};
use crate::types::DedupPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Multi-run sampling tuned to catch tail quotes
    #[default]
    Enhanced,
    /// Single pass over many pages with very lenient filtering
    Production,
    /// Slow, wide search across many pages, runs and search variants
    Exhaustive,
    /// Fewer pages and runs, for API handlers
    Fast,
    /// A handful of pages with aggressive timeouts
    UltraFast,
}

/// Everything a profile decides
#[derive(Debug, Clone)]
pub struct ProfilePreset {
    pub request_timeout_ms: u64,
    pub sampling: SamplingConfig,
    pub retry: RetryConfig,
    pub filter: FilterConfig,
}

impl Profile {
    pub const ALL: [Profile; 5] = [
        Profile::Enhanced,
        Profile::Production,
        Profile::Exhaustive,
        Profile::Fast,
        Profile::UltraFast,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Enhanced => "enhanced",
            Profile::Production => "production",
            Profile::Exhaustive => "exhaustive",
            Profile::Fast => "fast",
            Profile::UltraFast => "ultra_fast",
        }
    }

    /// Human label used in the `source` field of result records
    pub fn label(&self) -> &'static str {
        match self {
            Profile::Enhanced => "Enhanced",
            Profile::Production => "Production",
            Profile::Exhaustive => "Exhaustive",
            Profile::Fast => "Fast",
            Profile::UltraFast => "Ultra Fast",
        }
    }

    /// Parse from string (accepts `ultra-fast` as well)
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Profile::ALL.into_iter().find(|p| p.name() == normalized)
    }

    pub fn preset(&self) -> ProfilePreset {
        match self {
            Profile::Enhanced => ProfilePreset {
                request_timeout_ms: 15_000,
                sampling: SamplingConfig {
                    max_pages: 30,
                    rows_per_page: 20,
                    sampling_runs: 3,
                    inter_page_delay_ms: 300,
                    delay_every_pages: 3,
                    inter_run_delay_ms: 1_000,
                    budget_ms: 60_000,
                    search_variants: vec![SearchVariant::regular()],
                },
                retry: RetryConfig {
                    max_retries: 3,
                    base_delay_ms: 1_000,
                    rate_limit_delay_ms: 2_000,
                    max_delay_ms: 30_000,
                    jitter_ratio: 0.1,
                },
                filter: FilterConfig {
                    price_min: 150.0,
                    price_max: 500.0,
                    preserve_extremes_fraction: 0.05,
                    min_protected_extremes: 1,
                    iqr_multiplier: 2.5,
                    min_data_points: 50,
                    dedup: DedupPolicy::PriceAndIdentity,
                },
            },
            Profile::Production => ProfilePreset {
                request_timeout_ms: 15_000,
                sampling: SamplingConfig {
                    max_pages: 30,
                    rows_per_page: 20,
                    sampling_runs: 1,
                    inter_page_delay_ms: 300,
                    delay_every_pages: 1,
                    inter_run_delay_ms: 1_000,
                    budget_ms: 30_000,
                    search_variants: vec![SearchVariant::regular()],
                },
                retry: RetryConfig {
                    max_retries: 3,
                    base_delay_ms: 1_000,
                    rate_limit_delay_ms: 2_000,
                    max_delay_ms: 30_000,
                    jitter_ratio: 0.1,
                },
                filter: FilterConfig {
                    price_min: 100.0,
                    price_max: 2_000.0,
                    preserve_extremes_fraction: 0.15,
                    min_protected_extremes: 2,
                    iqr_multiplier: 6.0,
                    min_data_points: 1,
                    dedup: DedupPolicy::PriceAndIdentity,
                },
            },
            Profile::Exhaustive => ProfilePreset {
                request_timeout_ms: 12_000,
                sampling: SamplingConfig {
                    max_pages: 25,
                    rows_per_page: 20,
                    sampling_runs: 3,
                    inter_page_delay_ms: 800,
                    delay_every_pages: 3,
                    inter_run_delay_ms: 1_600,
                    budget_ms: 90_000,
                    search_variants: SearchVariant::exhaustive_sweep(),
                },
                retry: RetryConfig {
                    max_retries: 3,
                    base_delay_ms: 1_500,
                    rate_limit_delay_ms: 3_000,
                    max_delay_ms: 30_000,
                    jitter_ratio: 0.1,
                },
                filter: FilterConfig {
                    price_min: 150.0,
                    price_max: 800.0,
                    preserve_extremes_fraction: 0.08,
                    min_protected_extremes: 2,
                    iqr_multiplier: 3.0,
                    min_data_points: 3,
                    dedup: DedupPolicy::PriceAndIdentity,
                },
            },
            Profile::Fast => ProfilePreset {
                request_timeout_ms: 10_000,
                sampling: SamplingConfig {
                    max_pages: 20,
                    rows_per_page: 20,
                    sampling_runs: 2,
                    inter_page_delay_ms: 200,
                    delay_every_pages: 3,
                    inter_run_delay_ms: 500,
                    budget_ms: 30_000,
                    search_variants: vec![SearchVariant::regular()],
                },
                retry: RetryConfig {
                    max_retries: 2,
                    base_delay_ms: 500,
                    rate_limit_delay_ms: 1_000,
                    max_delay_ms: 10_000,
                    jitter_ratio: 0.1,
                },
                filter: FilterConfig {
                    price_min: 150.0,
                    price_max: 500.0,
                    preserve_extremes_fraction: 0.05,
                    min_protected_extremes: 1,
                    iqr_multiplier: 2.5,
                    min_data_points: 20,
                    dedup: DedupPolicy::PriceAndIdentity,
                },
            },
            Profile::UltraFast => ProfilePreset {
                request_timeout_ms: 3_000,
                sampling: SamplingConfig {
                    max_pages: 8,
                    rows_per_page: 20,
                    sampling_runs: 1,
                    inter_page_delay_ms: 100,
                    delay_every_pages: 1,
                    inter_run_delay_ms: 0,
                    budget_ms: 15_000,
                    search_variants: vec![SearchVariant::regular()],
                },
                retry: RetryConfig {
                    max_retries: 1,
                    base_delay_ms: 500,
                    rate_limit_delay_ms: 1_000,
                    max_delay_ms: 5_000,
                    jitter_ratio: 0.1,
                },
                filter: FilterConfig {
                    price_min: 150.0,
                    price_max: 500.0,
                    preserve_extremes_fraction: 0.10,
                    min_protected_extremes: 1,
                    iqr_multiplier: 2.5,
                    min_data_points: 10,
                    dedup: DedupPolicy::PriceAndIdentity,
                },
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names_roundtrip() {
        for profile in Profile::ALL {
            assert_eq!(Profile::from_str(profile.name()), Some(profile));
        }
        assert_eq!(Profile::from_str("Ultra-Fast"), Some(Profile::UltraFast));
        assert_eq!(Profile::from_str("turbo"), None);
    }

    #[test]
    fn test_every_preset_is_valid() {
        for profile in Profile::ALL {
            let preset = profile.preset();
            assert!(preset.sampling.validate().is_ok(), "{} sampling", profile);
            assert!(preset.retry.validate().is_ok(), "{} retry", profile);
            assert!(preset.filter.validate().is_ok(), "{} filter", profile);
        }
    }

    #[test]
    fn test_rate_limit_backoff_is_longer_than_transient() {
        for profile in Profile::ALL {
            let retry = profile.preset().retry;
            assert!(retry.rate_limit_delay_ms > retry.base_delay_ms);
        }
    }
}
