//! Configuration management for p2prate
//!
//! Layers, lowest priority first: profile preset, `config/default`,
//! `config/local`, then `P2PRATE__SECTION__FIELD` environment variables
//! (a `.env` file is loaded first).

mod builder;
mod profiles;

pub use builder::{PipelineConfig, PipelineConfigBuilder};
pub use profiles::{Profile, ProfilePreset};

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, Map, Value};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::DedupPolicy;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub profile: Profile,
    pub marketplace: MarketplaceConfig,
    pub sampling: SamplingConfig,
    pub retry: RetryConfig,
    pub filter: FilterConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub fallback: FallbackRates,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
    /// P2P advertisement search endpoint
    pub url: String,
    /// Base asset being quoted
    pub asset: String,
    /// Fiat currency the price is expressed in
    pub fiat: String,
    pub user_agent: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Payment method filter (empty = all)
    #[serde(default)]
    pub pay_types: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub publisher_type: Option<String>,
    /// Restrict the search to pro-merchant advertisements
    pub pro_merchant_ads: bool,
}

impl MarketplaceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// One search configuration swept per run. Unset fields fall back to the
/// marketplace section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchVariant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pro_merchant_ads: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_types: Option<Vec<String>>,
}

impl SearchVariant {
    /// The marketplace section as configured
    pub fn regular() -> Self {
        Self {
            name: "regular".to_string(),
            ..Self::default()
        }
    }

    pub fn pro_merchant() -> Self {
        Self {
            name: "pro_merchant".to_string(),
            pro_merchant_ads: Some(true),
            pay_types: Some(Vec::new()),
        }
    }

    /// Regular advertisements restricted to `pay_types` (empty = all)
    pub fn pay_types(name: impl Into<String>, pay_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            pro_merchant_ads: Some(false),
            pay_types: Some(pay_types.iter().map(|p| p.to_string()).collect()),
        }
    }

    /// Regular and pro-merchant listings, then one pass per payment method
    pub fn exhaustive_sweep() -> Vec<Self> {
        vec![
            Self::regular(),
            Self::pro_merchant(),
            Self::pay_types("all_pay_types", &[]),
            Self::pay_types("bank_transfer", &["BANK_TRANSFER"]),
            Self::pay_types("cash", &["CASH"]),
            Self::pay_types("credit_card", &["CREDIT_CARD"]),
        ]
    }

    fn to_value(&self) -> Value {
        let mut table = Map::<String, Value>::new();
        table.insert("name".to_string(), self.name.clone().into());
        if let Some(pro) = self.pro_merchant_ads {
            table.insert("pro_merchant_ads".to_string(), pro.into());
        }
        if let Some(pay_types) = &self.pay_types {
            table.insert("pay_types".to_string(), pay_types.clone().into());
        }
        table.into()
    }
}

fn default_search_variants() -> Vec<SearchVariant> {
    vec![SearchVariant::regular()]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplingConfig {
    /// Page budget per run and side
    pub max_pages: u32,
    /// Rows requested per page; a shorter page means the listing ended
    pub rows_per_page: u32,
    /// Independent passes over the listing per side
    pub sampling_runs: u32,
    /// Pause inserted every `delay_every_pages` pages
    pub inter_page_delay_ms: u64,
    pub delay_every_pages: u32,
    /// Pause between runs
    pub inter_run_delay_ms: u64,
    /// Wall-clock budget for the whole sampling phase
    pub budget_ms: u64,
    /// Search configurations walked in order within every run
    #[serde(default = "default_search_variants")]
    pub search_variants: Vec<SearchVariant>,
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            bail!("sampling.max_pages must be at least 1");
        }
        if self.rows_per_page == 0 {
            bail!("sampling.rows_per_page must be at least 1");
        }
        if self.sampling_runs == 0 {
            bail!("sampling.sampling_runs must be at least 1");
        }
        if self.budget_ms == 0 {
            bail!("sampling.budget_ms must be positive");
        }
        if self.search_variants.is_empty() {
            bail!("sampling.search_variants must name at least one variant");
        }
        Ok(())
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }

    pub fn inter_run_delay(&self) -> Duration {
        Duration::from_millis(self.inter_run_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts per page after the first one
    pub max_retries: u32,
    /// Backoff base for transient failures
    pub base_delay_ms: u64,
    /// Backoff base for HTTP 429
    pub rate_limit_delay_ms: u64,
    /// Upper bound of any single backoff
    pub max_delay_ms: u64,
    /// Random spread applied to each backoff (0.1 = ±10%)
    pub jitter_ratio: f64,
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            bail!("retry.jitter_ratio must be in [0, 1)");
        }
        if self.max_delay_ms < self.base_delay_ms {
            bail!("retry.max_delay_ms must not be below retry.base_delay_ms");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterConfig {
    /// Plausible price range; quotes outside are dropped at extraction
    pub price_min: f64,
    pub price_max: f64,
    /// Share of each tail exempt from outlier removal (0.05 = 5%)
    pub preserve_extremes_fraction: f64,
    /// Floor on the number of protected observations per tail
    pub min_protected_extremes: usize,
    /// IQR fence multiplier
    pub iqr_multiplier: f64,
    /// Below this many observations the sample is left untouched
    pub min_data_points: usize,
    #[serde(default)]
    pub dedup: DedupPolicy,
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.price_min.is_finite() && self.price_max.is_finite()) {
            bail!("filter price range must be finite");
        }
        if self.price_min <= 0.0 || self.price_min >= self.price_max {
            bail!(
                "filter price range [{}, {}] is empty or non-positive",
                self.price_min,
                self.price_max
            );
        }
        if !(0.0..=0.5).contains(&self.preserve_extremes_fraction) {
            bail!("filter.preserve_extremes_fraction must be in [0, 0.5]");
        }
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier < 0.0 {
            bail!("filter.iqr_multiplier must be a non-negative number");
        }
        Ok(())
    }
}

/// Weights of the 0-100 quality score
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Maximum points for sample size
    pub count_weight: f64,
    /// Points earned per retained observation until `count_weight`
    pub points_per_sample: f64,
    /// Maximum points for low dispersion
    pub consistency_weight: f64,
    /// Points lost per unit of coefficient of variation
    pub dispersion_penalty: f64,
    /// Maximum points for covering the expected price range
    pub coverage_weight: f64,
    /// Price range a healthy sample is expected to span
    pub expected_range: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            count_weight: 30.0,
            points_per_sample: 0.5,
            consistency_weight: 30.0,
            dispersion_penalty: 50.0,
            coverage_weight: 40.0,
            expected_range: 50.0,
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            self.count_weight,
            self.points_per_sample,
            self.consistency_weight,
            self.dispersion_penalty,
            self.coverage_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            bail!("quality weights must be non-negative numbers");
        }
        if self.count_weight + self.consistency_weight + self.coverage_weight > 100.0 + f64::EPSILON {
            bail!("quality weights must not add up to more than 100");
        }
        if !self.expected_range.is_finite() || self.expected_range <= 0.0 {
            bail!("quality.expected_range must be positive");
        }
        Ok(())
    }
}

/// Conservative placeholder rates served when no live data exists
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FallbackRates {
    pub usd_ves: f64,
    pub sell_min: f64,
    pub sell_avg: f64,
    pub sell_max: f64,
    pub buy_min: f64,
    pub buy_avg: f64,
    pub buy_max: f64,
    pub spread_min: f64,
    pub spread_avg: f64,
    pub spread_max: f64,
}

impl Default for FallbackRates {
    fn default() -> Self {
        Self {
            usd_ves: 228.25,
            sell_min: 228.00,
            sell_avg: 228.50,
            sell_max: 229.00,
            buy_min: 227.50,
            buy_avg: 228.00,
            buy_max: 228.50,
            spread_min: 0.00,
            spread_avg: 0.50,
            spread_max: 1.00,
        }
    }
}

impl FallbackRates {
    pub fn overall_min(&self) -> f64 {
        self.sell_min.min(self.buy_min)
    }

    pub fn overall_max(&self) -> f64 {
        self.sell_max.max(self.buy_max)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Name of the data source reported in result records
    pub source: String,
}

impl AppConfig {
    /// Load configuration from files and environment on top of a profile
    pub fn load(profile: Profile) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults(profile)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (P2PRATE__*)
            .add_source(
                Environment::with_prefix("P2PRATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Profile defaults only, without files or environment
    pub fn from_profile(profile: Profile) -> Result<Self> {
        let app_config: AppConfig = Self::defaults(profile)?
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        Ok(app_config)
    }

    fn defaults(profile: Profile) -> Result<ConfigBuilder<DefaultState>> {
        let preset = profile.preset();
        let sampling = preset.sampling;
        let retry = preset.retry;
        let filter = preset.filter;

        let builder = Config::builder()
            .set_default("profile", profile.name())?
            // Marketplace defaults
            .set_default(
                "marketplace.url",
                "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search",
            )?
            .set_default("marketplace.asset", "USDT")?
            .set_default("marketplace.fiat", "VES")?
            .set_default(
                "marketplace.user_agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            )?
            .set_default("marketplace.request_timeout_ms", preset.request_timeout_ms as i64)?
            .set_default("marketplace.pay_types", Vec::<String>::new())?
            .set_default("marketplace.countries", Vec::<String>::new())?
            .set_default("marketplace.pro_merchant_ads", false)?
            // Sampling defaults
            .set_default("sampling.max_pages", sampling.max_pages as i64)?
            .set_default("sampling.rows_per_page", sampling.rows_per_page as i64)?
            .set_default("sampling.sampling_runs", sampling.sampling_runs as i64)?
            .set_default("sampling.inter_page_delay_ms", sampling.inter_page_delay_ms as i64)?
            .set_default("sampling.delay_every_pages", sampling.delay_every_pages as i64)?
            .set_default("sampling.inter_run_delay_ms", sampling.inter_run_delay_ms as i64)?
            .set_default("sampling.budget_ms", sampling.budget_ms as i64)?
            .set_default(
                "sampling.search_variants",
                sampling
                    .search_variants
                    .iter()
                    .map(SearchVariant::to_value)
                    .collect::<Vec<_>>(),
            )?
            // Retry defaults
            .set_default("retry.max_retries", retry.max_retries as i64)?
            .set_default("retry.base_delay_ms", retry.base_delay_ms as i64)?
            .set_default("retry.rate_limit_delay_ms", retry.rate_limit_delay_ms as i64)?
            .set_default("retry.max_delay_ms", retry.max_delay_ms as i64)?
            .set_default("retry.jitter_ratio", retry.jitter_ratio)?
            // Filter defaults
            .set_default("filter.price_min", filter.price_min)?
            .set_default("filter.price_max", filter.price_max)?
            .set_default(
                "filter.preserve_extremes_fraction",
                filter.preserve_extremes_fraction,
            )?
            .set_default(
                "filter.min_protected_extremes",
                filter.min_protected_extremes as i64,
            )?
            .set_default("filter.iqr_multiplier", filter.iqr_multiplier)?
            .set_default("filter.min_data_points", filter.min_data_points as i64)?
            .set_default("filter.dedup", "price_and_identity")?
            // Output defaults
            .set_default("output.source", "Binance P2P")?;

        Ok(builder)
    }

    pub fn validate(&self) -> Result<()> {
        if self.marketplace.url.trim().is_empty() {
            bail!("marketplace.url must be set");
        }
        if self.marketplace.request_timeout_ms == 0 {
            bail!("marketplace.request_timeout_ms must be positive");
        }
        self.sampling.validate()?;
        self.retry.validate()?;
        self.filter.validate()?;
        self.quality.validate()?;
        Ok(())
    }

    /// The subset of settings the pipeline runs on
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            profile: self.profile,
            sampling: self.sampling.clone(),
            retry: self.retry.clone(),
            filter: self.filter.clone(),
            quality: self.quality.clone(),
            fallback: self.fallback.clone(),
            source: self.output.source.clone(),
            request_timeout_ms: self.marketplace.request_timeout_ms,
        }
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "profile={} pages={} runs={} variants={} range=[{}, {}] preserve={:.0}% iqr_m={} budget={}ms",
            self.profile,
            self.sampling.max_pages,
            self.sampling.sampling_runs,
            self.sampling.search_variants.len(),
            self.filter.price_min,
            self.filter.price_max,
            self.filter.preserve_extremes_fraction * 100.0,
            self.filter.iqr_multiplier,
            self.sampling.budget_ms
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
