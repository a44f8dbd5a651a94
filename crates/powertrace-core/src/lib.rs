//! # powertrace-core
//!
//! **GPU/CPU power telemetry for machine-learning runs.**
//!
//! `powertrace-core` reads the JSON-lines logs written by a power sampler,
//! summarizes them, and estimates how much energy a run consumed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use powertrace_core::{load_series, summarize};
//!
//! let series = load_series("logs/power_log.jsonl".as_ref(), Some(0)).unwrap();
//! let report = summarize(&series);
//! println!(
//!     "{:.3} Wh integrated, {:.3} Wh from the device counter",
//!     report.energy_wh_integrated, report.energy_wh_nvml
//! );
//! ```
//!
//! ## Architecture
//!
//! Log text → decode → records → series (filter, sort, elapsed) → summary
//!
//! Energy is estimated two independent ways:
//! - **Counter**: delta of the device's cumulative `energy_mJ` counter.
//! - **Integrated**: trapezoidal integral of `power_watts` over time.
//!
//! Around the summarizer sit the CSV/SVG/archive writers used by the
//! `analyze` command and the [`sampler`] that produces the logs.

pub mod analysis;
pub mod archive;
pub mod decode;
pub mod error;
pub mod export;
pub mod plot;
pub mod record;
pub mod sampler;
pub mod series;
pub mod summary;

pub use analysis::{AnalysisConfig, AnalysisManifest, SUMMARY_JSON, load_series, run_analysis};
pub use decode::{DecodeMode, decode_records, decode_records_with_mode};
pub use error::{Error, Result};
pub use export::{TIMESERIES_CSV, write_series_csv, write_series_csv_to};
pub use plot::{LineChart, OVERVIEW_PLOT, XAxis, plot_timeseries, render_line_chart};
pub use record::{Metric, TelemetryRecord, parse_timestamp, records_from_objects};
pub use sampler::{HostProbe, Probe, SamplerConfig, run_sampler};
pub use series::{TelemetrySeries, derive_elapsed, filter_by_gpu, sort_by_time};
pub use summary::{
    MetricStats, SUMMARY_METRICS, SummaryReport, compute_average, compute_max,
    energy_wh_from_counter, energy_wh_from_power, summarize,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
