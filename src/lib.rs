//! Entry point for the gold forecasting crate.
//! Consumers should import exported types via the crate root.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use gold_forecast::{ForecastPipeline, JsonMarketDataSource, PipelineConfig, PriceHistorySource};
//!
//! fn main() -> Result<(), gold_forecast::PredictionError> {
//!     let pipeline = ForecastPipeline::new(PipelineConfig::default())?;
//!     let snapshot = JsonMarketDataSource::new("data/market_data.json").load()?;
//!
//!     let record = pipeline.forecast_with_seed(&snapshot, None, Utc::now(), 42)?;
//!
//!     println!("{}", gold_forecast::render_brief(&record));
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod dto;
pub mod evaluation;
pub mod generators;
pub mod handler;
pub(crate) mod helpers;
pub mod insights;
pub mod performance;
pub mod source;
pub mod summary;
pub mod implementation {
    include!("impl.rs");
}

pub use config::PipelineConfig;
pub use dto::*;
pub use generators::PathGenerator;
pub use handler::{run_forecast_handler, run_forecast_handler_json, ForecastRequest};
pub use implementation::ForecastPipeline;
pub use performance::{PerformanceEntry, PerformanceLog};
pub use source::{JsonMarketDataSource, PriceHistorySource, StaticSource};
pub use summary::{render_brief, render_markdown_summary, ForecastSummary, WebData};
