//! Daily gold forecast runner.
//!
//! Reads the market-data artifact, forecasts the next days and refreshes the
//! JSON artifacts in the output directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use gold_forecast::{
    render_brief, render_markdown_summary, ForecastPipeline, ForecastRecord, ForecastSummary,
    JsonMarketDataSource, PerformanceLog, PipelineConfig, PriceHistorySource, WebData,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LATEST_FORECAST: &str = "latest_forecast.json";
const FORECAST_SUMMARY: &str = "forecast_summary.json";
const PERFORMANCE_LOG: &str = "performance_log.json";
const WEB_DATA: &str = "web_data.json";

#[derive(Parser)]
#[command(name = "forecast")]
#[command(about = "Forecast gold prices from daily market data")]
struct Cli {
    /// Market data JSON written by the acquisition job
    #[arg(long, default_value = "data/market_data.json")]
    market_data: PathBuf,

    /// Directory holding the forecast artifacts
    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    /// Optional TOML pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for reproducible paths
    #[arg(long)]
    seed: Option<u64>,

    /// Write the markdown run report to this path (`-` for stdout)
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let retention_days = config.performance_retention_days;
    let pipeline = ForecastPipeline::new(config)?;

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;
    let latest_path = cli.out_dir.join(LATEST_FORECAST);
    let previous = read_previous(&latest_path);

    let source = JsonMarketDataSource::new(&cli.market_data);
    let snapshot = source
        .load()
        .with_context(|| format!("loading market data from {}", source.path().display()))?;

    let now = Utc::now();
    let record = match cli.seed {
        Some(seed) => pipeline.forecast_with_seed(&snapshot, previous.as_ref(), now, seed)?,
        None => {
            let mut rng = StdRng::from_entropy();
            pipeline.forecast(&snapshot, previous.as_ref(), now, &mut rng)?
        }
    };

    write_json(&latest_path, &record)?;
    match ForecastSummary::from_record(&record) {
        Some(summary) => write_json(&cli.out_dir.join(FORECAST_SUMMARY), &summary)?,
        None => warn!("no ensemble path, forecast summary not written"),
    }
    write_json(
        &cli.out_dir.join(WEB_DATA),
        &WebData::from_record(&record, &snapshot.history),
    )?;

    let log_path = cli.out_dir.join(PERFORMANCE_LOG);
    let mut log = PerformanceLog::load(&log_path)?;
    log.record(&record, now, retention_days);
    log.save(&log_path)?;
    info!(entries = log.len(), "performance log updated");

    match cli.summary.as_deref() {
        Some(path) if path == Path::new("-") => print!("{}", render_markdown_summary(&record)),
        Some(path) => std::fs::write(path, render_markdown_summary(&record))
            .with_context(|| format!("writing {}", path.display()))?,
        None => {}
    }

    print!("{}", render_brief(&record));
    Ok(())
}

/// The previous run's record, if one exists and still parses.
fn read_previous(path: &Path) -> Option<ForecastRecord> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable previous forecast");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
