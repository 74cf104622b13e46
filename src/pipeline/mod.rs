//! Sampling and aggregation pipeline
//!
//! Sampler (both sides concurrently) → RobustFilter → Aggregator.
//! A run always ends in a [`RateReport`]; running out of data yields the
//! degraded outcome rather than an error.

pub mod aggregator;
pub mod filter;
pub mod quality;
pub mod sampler;

pub use aggregator::{Aggregator, NO_DATA_REASON};
pub use filter::{quartiles, FilterOutcome, RobustFilter};
pub use quality::QualityScorer;
pub use sampler::{Sampler, SamplingStats};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::p2p::{OfferExtractor, PageFetcher, PageSource};
use crate::report::{RateOutcome, RateReport};
use crate::telemetry::{EventSink, PipelineEvent};
use crate::types::{SampleSet, Side};

pub struct RatePipeline {
    config: PipelineConfig,
    sampler: Sampler,
    filter: RobustFilter,
    aggregator: Aggregator,
    sink: Arc<dyn EventSink>,
}

impl RatePipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn PageSource>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let fetcher = PageFetcher::new(source, config.retry.clone(), sink.clone());
        let extractor = OfferExtractor::from_config(&config.filter)?;
        let sampler = Sampler::new(
            fetcher,
            extractor,
            config.sampling.clone(),
            config.filter.dedup,
            sink.clone(),
        );
        let filter = RobustFilter::new(&config.filter);
        let aggregator = Aggregator::new(
            QualityScorer::new(config.quality.clone()),
            config.fallback.clone(),
        );

        Ok(Self {
            config,
            sampler,
            filter,
            aggregator,
            sink,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Sample both sides, filter, aggregate
    pub async fn run(&self) -> RateReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = started + self.config.sampling.budget();
        let pages = self.config.sampling.max_pages;
        let runs = self.config.sampling.sampling_runs;

        self.sink.emit(PipelineEvent::RunStarted {
            run_id,
            profile: self.config.profile.name().to_string(),
        });

        let ((sell, sell_stats), (buy, buy_stats)) = tokio::join!(
            self.sampler.collect_until(Side::Sell, pages, runs, deadline),
            self.sampler.collect_until(Side::Buy, pages, runs, deadline),
        );

        let sell = self.filter_side(sell);
        let buy = self.filter_side(buy);

        let outcome = self.aggregator.aggregate(&sell, &buy);
        if let RateOutcome::Degraded(fallback) = &outcome {
            self.sink.emit(PipelineEvent::Degraded {
                run_id,
                reason: fallback.reason.clone(),
            });
        }

        let elapsed = started.elapsed();
        self.sink.emit(PipelineEvent::RunCompleted {
            run_id,
            success: outcome.is_success(),
            quality_score: outcome.quality_score(),
            elapsed_ms: elapsed.as_millis() as u64,
        });

        RateReport {
            run_id,
            profile: self.config.profile,
            outcome,
            stats: sell_stats.combined(buy_stats),
            elapsed,
            sampling_runs: runs,
            preserve_extremes_fraction: self.config.filter.preserve_extremes_fraction,
            request_timeout: Duration::from_millis(self.config.request_timeout_ms),
            source: self.config.source_label(),
            fallback_source: self.config.fallback_source_label(),
        }
    }

    fn filter_side(&self, samples: SampleSet) -> SampleSet {
        let side = samples.side();
        let (filtered, outcome) = self.filter.filter_detailed(samples);
        self.sink.emit(PipelineEvent::Filtered {
            side,
            before: outcome.before,
            after: outcome.after,
            protected: outcome.protected,
        });
        filtered
    }
}
