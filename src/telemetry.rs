//! Telemetry - structured pipeline events and logging setup
//!
//! The pipeline never writes diagnostics on its own. It emits
//! [`PipelineEvent`]s into an injected [`EventSink`]; the binary wires a
//! [`TracingSink`], tests use a [`MemorySink`].

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::error::FetchError;
use crate::types::Side;

/// Things worth knowing about while a run is in progress
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        profile: String,
    },
    PageFetched {
        side: Side,
        run: u32,
        page: u32,
        offers: usize,
        accepted: usize,
    },
    RetryScheduled {
        side: Side,
        page: u32,
        attempt: u32,
        delay_ms: u64,
        error: FetchError,
    },
    PageFailed {
        side: Side,
        run: u32,
        page: u32,
        error: FetchError,
    },
    /// One search variant of a run reached the end of its listing
    VariantFinished {
        side: Side,
        run: u32,
        variant: String,
        pages: u32,
        accepted: usize,
    },
    /// Pagination ended for a run (empty page, short page or failure)
    RunExhausted {
        side: Side,
        run: u32,
        pages: u32,
        observations: usize,
    },
    BudgetExhausted {
        side: Side,
        run: u32,
        page: u32,
    },
    SamplingFinished {
        side: Side,
        collected: usize,
        unique: usize,
    },
    Filtered {
        side: Side,
        before: usize,
        after: usize,
        protected: usize,
    },
    RunCompleted {
        run_id: Uuid,
        success: bool,
        quality_score: f64,
        elapsed_ms: u64,
    },
    Degraded {
        run_id: Uuid,
        reason: String,
    },
}

/// Receiver of pipeline events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { run_id, profile } => {
                tracing::info!(run_id = %run_id, profile = %profile, "Starting P2P sampling run");
            }
            PipelineEvent::PageFetched {
                side,
                run,
                page,
                offers,
                accepted,
            } => {
                tracing::debug!(side = %side, run, page, offers, accepted, "Page fetched");
            }
            PipelineEvent::RetryScheduled {
                side,
                page,
                attempt,
                delay_ms,
                error,
            } => {
                if error.is_rate_limited() {
                    tracing::warn!(side = %side, page, attempt, delay_ms, "Rate limited, backing off");
                } else {
                    tracing::warn!(
                        side = %side,
                        page,
                        attempt,
                        delay_ms,
                        error = %error,
                        "Page request failed, retrying"
                    );
                }
            }
            PipelineEvent::PageFailed {
                side,
                run,
                page,
                error,
            } => {
                tracing::error!(
                    side = %side,
                    run,
                    page,
                    kind = error.kind(),
                    error = %error,
                    "Giving up on page, treating as end of listing"
                );
            }
            PipelineEvent::VariantFinished {
                side,
                run,
                variant,
                pages,
                accepted,
            } => {
                tracing::debug!(
                    side = %side,
                    run,
                    variant = %variant,
                    pages,
                    accepted,
                    "Search variant done"
                );
            }
            PipelineEvent::RunExhausted {
                side,
                run,
                pages,
                observations,
            } => {
                tracing::info!(side = %side, run, pages, observations, "Sampling run finished");
            }
            PipelineEvent::BudgetExhausted { side, run, page } => {
                tracing::warn!(side = %side, run, page, "Time budget exhausted, keeping partial sample");
            }
            PipelineEvent::SamplingFinished {
                side,
                collected,
                unique,
            } => {
                tracing::info!(side = %side, collected, unique, "Sampling complete");
            }
            PipelineEvent::Filtered {
                side,
                before,
                after,
                protected,
            } => {
                tracing::info!(side = %side, before, after, protected, "Outlier filtering applied");
            }
            PipelineEvent::RunCompleted {
                run_id,
                success,
                quality_score,
                elapsed_ms,
            } => {
                tracing::info!(run_id = %run_id, success, quality_score, elapsed_ms, "Run completed");
            }
            PipelineEvent::Degraded { run_id, reason } => {
                tracing::error!(run_id = %run_id, reason = %reason, "Serving fallback rates");
            }
        }
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Keeps events in memory, for tests and diagnostics dumps
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| pred(ev)).count())
            .unwrap_or(0)
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Log output format for the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// reserved for the JSON record; `silent` turns them off entirely.
pub fn init_logging(format: LogFormat, silent: bool) -> Result<()> {
    let filter = if silent {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("p2prate=info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(PipelineEvent::SamplingFinished {
            side: Side::Sell,
            collected: 10,
            unique: 8,
        });
        sink.emit(PipelineEvent::SamplingFinished {
            side: Side::Buy,
            collected: 4,
            unique: 4,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            PipelineEvent::SamplingFinished { side: Side::Sell, .. }
        ));
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::SamplingFinished { unique: 4, .. })),
            1
        );
    }

    #[test]
    fn test_tracing_sink_accepts_every_event_without_subscriber() {
        let sink = TracingSink;
        sink.emit(PipelineEvent::Degraded {
            run_id: Uuid::new_v4(),
            reason: "no data".into(),
        });
        sink.emit(PipelineEvent::RetryScheduled {
            side: Side::Buy,
            page: 2,
            attempt: 1,
            delay_ms: 500,
            error: FetchError::RateLimited,
        });
    }
}
