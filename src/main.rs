//! p2prate - sample the P2P marketplace and print one JSON rate record
//!
//! Usage:
//!   p2prate [--profile <NAME>] [--silent] [--log-format pretty|json]
//!
//! The record goes to stdout, diagnostics to stderr. The exit code is 0
//! whether or not live data was found; check `success` in the record.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::sync::Arc;

use p2prate::config::{AppConfig, FallbackRates, Profile};
use p2prate::p2p::P2pRestClient;
use p2prate::pipeline::RatePipeline;
use p2prate::report::RateRecord;
use p2prate::telemetry::{init_logging, LogFormat, TracingSink};

#[derive(Parser)]
#[command(name = "p2prate")]
#[command(about = "Robust USDT/VES rate from the Binance P2P marketplace")]
struct Cli {
    /// Tuning preset: enhanced, production, exhaustive, fast, ultra_fast
    #[arg(short, long, default_value = "enhanced")]
    profile: String,

    /// Suppress all diagnostics; only the JSON record is printed
    #[arg(short, long)]
    silent: bool,

    /// Diagnostic log format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatArg,

    /// Pretty-print the JSON record
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format.into(), cli.silent) {
        if !cli.silent {
            eprintln!("{:#}", e);
        }
    }

    let record = match run(&cli).await {
        Ok(record) => record,
        Err(e) => {
            let reason = format!("{:#}", e);
            tracing::error!(error = %reason, "Pipeline could not start");
            RateRecord::fallback(
                &FallbackRates::default(),
                "Fallback Data",
                &reason,
                Utc::now(),
                0.0,
                None,
            )
        }
    };

    let output = if cli.pretty {
        record.to_json_pretty()
    } else {
        record.to_json()
    };
    match output {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to serialize rate record"),
    }
}

async fn run(cli: &Cli) -> Result<RateRecord> {
    let profile = Profile::from_str(&cli.profile).unwrap_or_else(|| {
        tracing::warn!(profile = %cli.profile, "Unknown profile, using enhanced");
        Profile::Enhanced
    });

    let config = match AppConfig::load(profile) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = ?e, "Config load failed, using profile defaults");
            AppConfig::from_profile(profile)?
        }
    };
    tracing::info!(config = %config, "Configuration loaded");

    let client = P2pRestClient::new(&config.marketplace)?;
    let pipeline = RatePipeline::new(config.pipeline(), Arc::new(client), Arc::new(TracingSink))?;

    let report = pipeline.run().await;
    Ok(report.record())
}
