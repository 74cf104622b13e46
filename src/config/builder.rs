//! Pipeline configuration and its builder

use anyhow::Result;
use std::time::Duration;

use super::{
    FallbackRates, FilterConfig, Profile, QualityConfig, RetryConfig, SamplingConfig, SearchVariant,
};
use crate::types::DedupPolicy;

/// Every tunable the sampling pipeline reads
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub profile: Profile,
    pub sampling: SamplingConfig,
    pub retry: RetryConfig,
    pub filter: FilterConfig,
    pub quality: QualityConfig,
    pub fallback: FallbackRates,
    /// Data source name reported in result records
    pub source: String,
    /// Per-request timeout, reported in the debug block
    pub request_timeout_ms: u64,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new(Profile::default())
    }

    pub fn validate(&self) -> Result<()> {
        self.sampling.validate()?;
        self.retry.validate()?;
        self.filter.validate()?;
        self.quality.validate()?;
        Ok(())
    }

    /// `"Binance P2P (Enhanced)"`
    pub fn source_label(&self) -> String {
        format!("{} ({})", self.source, self.profile.label())
    }

    pub fn fallback_source_label(&self) -> String {
        format!("Fallback Data ({})", self.profile.label())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfigBuilder::new(Profile::default()).into_config()
    }
}

/// Starts from a profile preset; every setter overrides one field
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new(profile: Profile) -> Self {
        let preset = profile.preset();
        Self {
            config: PipelineConfig {
                profile,
                sampling: preset.sampling,
                retry: preset.retry,
                filter: preset.filter,
                quality: QualityConfig::default(),
                fallback: FallbackRates::default(),
                source: "Binance P2P".to_string(),
                request_timeout_ms: preset.request_timeout_ms,
            },
        }
    }

    pub fn max_pages(mut self, pages: u32) -> Self {
        self.config.sampling.max_pages = pages;
        self
    }

    pub fn rows_per_page(mut self, rows: u32) -> Self {
        self.config.sampling.rows_per_page = rows;
        self
    }

    pub fn sampling_runs(mut self, runs: u32) -> Self {
        self.config.sampling.sampling_runs = runs;
        self
    }

    pub fn inter_page_delay(mut self, delay: Duration, every_pages: u32) -> Self {
        self.config.sampling.inter_page_delay_ms = delay.as_millis() as u64;
        self.config.sampling.delay_every_pages = every_pages;
        self
    }

    pub fn inter_run_delay(mut self, delay: Duration) -> Self {
        self.config.sampling.inter_run_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn search_variants(mut self, variants: Vec<SearchVariant>) -> Self {
        self.config.sampling.search_variants = variants;
        self
    }

    pub fn budget(mut self, budget: Duration) -> Self {
        self.config.sampling.budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn backoff(mut self, base: Duration, rate_limited: Duration, max: Duration) -> Self {
        self.config.retry.base_delay_ms = base.as_millis() as u64;
        self.config.retry.rate_limit_delay_ms = rate_limited.as_millis() as u64;
        self.config.retry.max_delay_ms = max.as_millis() as u64;
        self
    }

    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.config.retry.jitter_ratio = ratio;
        self
    }

    /// Zero every deliberate pause (inter-page, inter-run, backoff, jitter)
    pub fn without_delays(mut self) -> Self {
        self.config.sampling.inter_page_delay_ms = 0;
        self.config.sampling.inter_run_delay_ms = 0;
        self.config.retry.base_delay_ms = 0;
        self.config.retry.rate_limit_delay_ms = 0;
        self.config.retry.jitter_ratio = 0.0;
        self
    }

    pub fn price_range(mut self, min: f64, max: f64) -> Self {
        self.config.filter.price_min = min;
        self.config.filter.price_max = max;
        self
    }

    pub fn preserve_extremes(mut self, fraction: f64, min_protected: usize) -> Self {
        self.config.filter.preserve_extremes_fraction = fraction;
        self.config.filter.min_protected_extremes = min_protected;
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.config.filter.iqr_multiplier = multiplier;
        self
    }

    pub fn min_data_points(mut self, points: usize) -> Self {
        self.config.filter.min_data_points = points;
        self
    }

    pub fn dedup(mut self, policy: DedupPolicy) -> Self {
        self.config.filter.dedup = policy;
        self
    }

    pub fn quality(mut self, quality: QualityConfig) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn fallback(mut self, fallback: FallbackRates) -> Self {
        self.config.fallback = fallback;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = source.into();
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    fn into_config(self) -> PipelineConfig {
        self.config
    }
}
