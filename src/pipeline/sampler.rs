//! Multi-run, multi-page sampling of one side of the marketplace
//!
//! Each run walks every configured search variant in turn, and each variant
//! walks pages `1..=max_pages` until its listing is exhausted (fetch error,
//! empty page or short page). Variants and runs are merged with first-seen
//! order preserved. The shared deadline is checked before every request
//! and every in-flight request is raced against it.

use serde::Serialize;
use std::sync::Arc;
use tokio::time::{sleep_until, timeout_at, Duration, Instant};

use crate::config::{SamplingConfig, SearchVariant};
use crate::p2p::{OfferExtractor, PageFetcher};
use crate::telemetry::{EventSink, PipelineEvent};
use crate::types::{DedupPolicy, SampleSet, Side};

/// Counters gathered while sampling, reported in the record's debug block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplingStats {
    pub pages_fetched: u32,
    pub requests: u32,
    pub offers_seen: usize,
    pub offers_rejected: usize,
    pub budget_exhausted: bool,
}

impl SamplingStats {
    pub fn combined(self, other: SamplingStats) -> SamplingStats {
        SamplingStats {
            pages_fetched: self.pages_fetched + other.pages_fetched,
            requests: self.requests + other.requests,
            offers_seen: self.offers_seen + other.offers_seen,
            offers_rejected: self.offers_rejected + other.offers_rejected,
            budget_exhausted: self.budget_exhausted || other.budget_exhausted,
        }
    }
}

struct RunSample {
    set: SampleSet,
    pages: u32,
    collected: usize,
    stats: SamplingStats,
    out_of_time: bool,
}

pub struct Sampler {
    fetcher: PageFetcher,
    extractor: OfferExtractor,
    config: SamplingConfig,
    dedup: DedupPolicy,
    sink: Arc<dyn EventSink>,
}

impl Sampler {
    pub fn new(
        fetcher: PageFetcher,
        extractor: OfferExtractor,
        config: SamplingConfig,
        dedup: DedupPolicy,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            config,
            dedup,
            sink,
        }
    }

    /// Collect one side within this sampler's own budget
    pub async fn collect(&self, side: Side, max_pages: u32, run_count: u32) -> SampleSet {
        let deadline = Instant::now() + self.config.budget();
        self.collect_until(side, max_pages, run_count, deadline)
            .await
            .0
    }

    /// Collect one side, stopping at `deadline` with whatever was gathered
    pub async fn collect_until(
        &self,
        side: Side,
        max_pages: u32,
        run_count: u32,
        deadline: Instant,
    ) -> (SampleSet, SamplingStats) {
        let mut merged = SampleSet::with_policy(side, self.dedup);
        let mut stats = SamplingStats::default();
        let mut collected = 0;

        for run in 1..=run_count {
            let sample = self.collect_run(side, run, max_pages, deadline).await;

            self.sink.emit(PipelineEvent::RunExhausted {
                side,
                run,
                pages: sample.pages,
                observations: sample.set.len(),
            });
            collected += sample.collected;
            stats = stats.combined(sample.stats);
            merged.merge(&sample.set);

            if sample.out_of_time {
                stats.budget_exhausted = true;
                break;
            }
            if run < run_count {
                pause(self.config.inter_run_delay(), deadline).await;
            }
        }

        self.sink.emit(PipelineEvent::SamplingFinished {
            side,
            collected,
            unique: merged.len(),
        });
        (merged, stats)
    }

    /// One run: every search variant in order, into a single set
    async fn collect_run(
        &self,
        side: Side,
        run: u32,
        max_pages: u32,
        deadline: Instant,
    ) -> RunSample {
        let mut sample = RunSample {
            set: SampleSet::with_policy(side, self.dedup),
            pages: 0,
            collected: 0,
            stats: SamplingStats::default(),
            out_of_time: false,
        };

        for (index, variant) in self.config.search_variants.iter().enumerate() {
            if index > 0 {
                pause(self.config.inter_page_delay(), deadline).await;
            }
            let (pages, collected) = (sample.pages, sample.collected);
            self.collect_variant(side, run, variant, max_pages, deadline, &mut sample).await;

            self.sink.emit(PipelineEvent::VariantFinished {
                side,
                run,
                variant: variant.name.clone(),
                pages: sample.pages - pages,
                accepted: sample.collected - collected,
            });
            if sample.out_of_time {
                break;
            }
        }

        sample
    }

    async fn collect_variant(
        &self,
        side: Side,
        run: u32,
        variant: &SearchVariant,
        max_pages: u32,
        deadline: Instant,
        sample: &mut RunSample,
    ) {
        let rows = self.config.rows_per_page;
        let every = self.config.delay_every_pages;

        for page in 1..=max_pages {
            if Instant::now() >= deadline {
                self.out_of_time(side, run, page, sample);
                break;
            }

            let request = self.fetcher.fetch_page(side, page, rows, variant);
            let (requests, result) = match timeout_at(deadline, request).await {
                Ok(fetched) => fetched,
                Err(_) => {
                    // the in-flight request was abandoned
                    sample.stats.requests += 1;
                    self.out_of_time(side, run, page, sample);
                    break;
                }
            };
            sample.stats.requests += requests;

            let offers = match result {
                Ok(offers) => offers,
                Err(error) => {
                    self.sink.emit(PipelineEvent::PageFailed { side, run, page, error });
                    break;
                }
            };
            sample.stats.pages_fetched += 1;
            sample.pages += 1;

            if offers.is_empty() {
                break;
            }

            let observations = self.extractor.extract_page(&offers, side, page, run);
            sample.stats.offers_seen += offers.len();
            sample.stats.offers_rejected += offers.len() - observations.len();
            sample.collected += observations.len();

            self.sink.emit(PipelineEvent::PageFetched {
                side,
                run,
                page,
                offers: offers.len(),
                accepted: observations.len(),
            });
            sample.set.extend(observations);

            // a short page is the last one
            if (offers.len() as u64) < u64::from(rows) {
                break;
            }

            if page < max_pages && every > 0 && page % every == 0 {
                pause(self.config.inter_page_delay(), deadline).await;
            }
        }
    }

    fn out_of_time(&self, side: Side, run: u32, page: u32, sample: &mut RunSample) {
        sample.out_of_time = true;
        self.sink.emit(PipelineEvent::BudgetExhausted { side, run, page });
    }
}

/// Sleep for `delay`, but never past `deadline`
async fn pause(delay: Duration, deadline: Instant) {
    if delay.is_zero() {
        return;
    }
    let wake = (Instant::now() + delay).min(deadline);
    sleep_until(wake).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::FetchError;
    use crate::p2p::{MockPageSource, PriceRange, RawOffer};
    use crate::telemetry::MemorySink;
    use rust_decimal_macros::dec;

    fn sampling(rows: u32) -> SamplingConfig {
        SamplingConfig {
            max_pages: 10,
            rows_per_page: rows,
            sampling_runs: 1,
            inter_page_delay_ms: 300,
            delay_every_pages: 2,
            inter_run_delay_ms: 1_000,
            budget_ms: 60_000,
            search_variants: vec![SearchVariant::regular()],
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            base_delay_ms: 0,
            rate_limit_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ratio: 0.0,
        }
    }

    fn sampler(mock: MockPageSource, config: SamplingConfig, sink: Arc<MemorySink>) -> Sampler {
        let fetcher = PageFetcher::new(Arc::new(mock), retry(), sink.clone());
        let extractor = OfferExtractor::new(PriceRange::new(dec!(150), dec!(500)));
        Sampler::new(fetcher, extractor, config, DedupPolicy::default(), sink)
    }

    fn page_of(prices: &[(&str, &str)]) -> Vec<RawOffer> {
        prices
            .iter()
            .map(|(price, id)| RawOffer::with_price(*price, *id))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_page_ends_the_run() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page().times(2).returning(|_, page, _, _| {
            Ok(match page {
                1 => page_of(&[("200", "a"), ("201", "b")]),
                _ => page_of(&[("202", "c")]),
            })
        });

        let sink = MemorySink::new();
        let (set, stats) = sampler(mock, sampling(2), sink.clone())
            .collect_until(Side::Sell, 10, 1, Instant::now() + Duration::from_secs(60))
            .await;

        assert_eq!(set.len(), 3);
        assert_eq!(stats.pages_fetched, 2);
        assert_eq!(stats.requests, 2);
        assert!(!stats.budget_exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_and_empty_page_stop_quietly() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page().returning(|side, page, _, _| match (side, page) {
            (Side::Sell, 1) => Ok(page_of(&[("210", "a"), ("211", "b")])),
            (Side::Sell, _) => Err(FetchError::Http(403)),
            (Side::Buy, _) => Ok(vec![]),
        });

        let sink = MemorySink::new();
        let s = sampler(mock, sampling(2), sink.clone());
        let sell = s.collect(Side::Sell, 10, 1).await;
        let buy = s.collect(Side::Buy, 10, 1).await;

        assert_eq!(sell.len(), 2);
        assert!(buy.is_empty());
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::PageFailed { side: Side::Sell, page: 2, .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_are_merged_without_duplicates() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page().times(3).returning(|_, _, _, _| {
            Ok(page_of(&[("220", "a"), ("221", "b"), ("220", "a")]))
        });

        let sink = MemorySink::new();
        let set = sampler(mock, sampling(20), sink.clone())
            .collect(Side::Buy, 5, 3)
            .await;

        assert_eq!(set.len(), 2);
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::RunExhausted { .. })),
            3
        );
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::SamplingFinished { collected: 9, unique: 2, .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_budget_is_respected() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page()
            .times(4)
            .returning(|_, page, _, _| Ok(page_of(&[("300", page.to_string().as_str())])));

        let set = sampler(mock, sampling(1), MemorySink::new())
            .collect(Side::Sell, 4, 1)
            .await;
        assert_eq!(set.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_quotes_are_counted_as_rejected() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page()
            .times(1)
            .returning(|_, _, _, _| Ok(page_of(&[("200", "a"), ("9000", "b"), ("x", "c")])));

        let (set, stats) = sampler(mock, sampling(20), MemorySink::new())
            .collect_until(Side::Sell, 3, 1, Instant::now() + Duration::from_secs(10))
            .await;
        assert_eq!(set.len(), 1);
        assert_eq!(stats.offers_seen, 3);
        assert_eq!(stats.offers_rejected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_partial_sample() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page()
            .returning(|_, page, _, _| Ok(page_of(&[("250", page.to_string().as_str())])));

        // one page per 300ms pause, 1s budget
        let config = SamplingConfig {
            delay_every_pages: 1,
            budget_ms: 1_000,
            ..sampling(1)
        };
        let sink = MemorySink::new();
        let start = Instant::now();
        let (set, stats) = sampler(mock, config, sink.clone())
            .collect_until(Side::Sell, 30, 1, start + Duration::from_millis(1_000))
            .await;

        assert!(stats.budget_exhausted);
        assert!(!set.is_empty());
        assert!(set.len() < 30);
        assert!(start.elapsed() <= Duration::from_millis(1_000));
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::BudgetExhausted { .. })),
            1
        );
    }

    fn two_variants() -> SamplingConfig {
        SamplingConfig {
            search_variants: vec![
                SearchVariant::regular(),
                SearchVariant::pay_types("cash", &["CASH"]),
            ],
            ..sampling(20)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_run_walks_every_variant() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page()
            .times(4)
            .returning(|_, _, _, variant| {
                Ok(match variant.name.as_str() {
                    "cash" => page_of(&[("201", "b"), ("205", "c")]),
                    _ => page_of(&[("200", "a"), ("201", "b")]),
                })
            });

        let sink = MemorySink::new();
        let (set, stats) = sampler(mock, two_variants(), sink.clone())
            .collect_until(Side::Sell, 5, 2, Instant::now() + Duration::from_secs(60))
            .await;

        let ids: Vec<&str> = set.iter().map(|o| o.identity.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(stats.requests, 4);
        assert_eq!(stats.pages_fetched, 4);
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::VariantFinished { .. })),
            4
        );
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::SamplingFinished { collected: 8, unique: 3, .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_variant_does_not_end_the_run() {
        let mut mock = MockPageSource::new();
        mock.expect_fetch_page()
            .times(2)
            .returning(|_, _, _, variant| match variant.name.as_str() {
                "cash" => Ok(page_of(&[("240", "z")])),
                _ => Err(FetchError::Http(403)),
            });

        let sink = MemorySink::new();
        let set = sampler(mock, two_variants(), sink.clone())
            .collect(Side::Buy, 5, 1)
            .await;

        assert_eq!(set.len(), 1);
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::PageFailed { side: Side::Buy, page: 1, .. })),
            1
        );
        assert_eq!(
            sink.count(|e| matches!(
                e,
                PipelineEvent::VariantFinished { accepted: 1, pages: 1, .. }
            )),
            1
        );
    }
}
