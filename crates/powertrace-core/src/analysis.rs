//! End-to-end analysis of a telemetry log.
//!
//! read → decode → series → summary → CSV / JSON / plots / archive.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::archive;
use crate::decode::decode_records;
use crate::error::Result;
use crate::export::{TIMESERIES_CSV, write_series_csv};
use crate::plot::{XAxis, write_standard_plots};
use crate::record::records_from_objects;
use crate::series::TelemetrySeries;
use crate::summary::{SummaryReport, summarize};

/// File name of the JSON summary report.
pub const SUMMARY_JSON: &str = "telemetry_summary.json";

/// Options for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Telemetry log to read.
    pub src: PathBuf,
    /// Keep only this device's records (ignored if the log has no `gpu_index`).
    pub gpu_index: Option<u32>,
    /// Output directory; defaults to `plots/` next to `src`.
    pub out_dir: Option<PathBuf>,
    /// Also bundle all outputs into an archive.
    pub archive: bool,
    /// Archive file name; defaults to `<src stem>-telemetry-plots.tar.gz`.
    pub archive_name: Option<String>,
    pub x_axis: XAxis,
}

impl AnalysisConfig {
    pub fn new(src: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            gpu_index: None,
            out_dir: None,
            archive: false,
            archive_name: None,
            x_axis: XAxis::Elapsed,
        }
    }
}

/// What an analysis run wrote, printed as JSON by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisManifest {
    pub out_dir: PathBuf,
    pub summary_json: PathBuf,
    pub csv: PathBuf,
    pub x_axis: String,
    pub plots: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<PathBuf>,
    #[serde(skip)]
    pub summary: SummaryReport,
}

/// Read and decode a telemetry log into a series.
pub fn load_series(src: &Path, gpu_index: Option<u32>) -> Result<TelemetrySeries> {
    let text = fs::read_to_string(src)?;
    let objects = decode_records(&text)?;
    let records = records_from_objects(&objects)?;
    TelemetrySeries::new(records, gpu_index)
}

fn default_out_dir(src: &Path) -> PathBuf {
    let resolved = src.canonicalize().unwrap_or_else(|_| src.to_path_buf());
    resolved
        .parent()
        .map_or_else(|| PathBuf::from("plots"), |p| p.join("plots"))
}

/// Run the full pipeline for `config`.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisManifest> {
    let series = load_series(&config.src, config.gpu_index)?;
    log::info!(
        "loaded {} record(s) from {}",
        series.len(),
        config.src.display()
    );

    let out_dir = config
        .out_dir
        .clone()
        .unwrap_or_else(|| default_out_dir(&config.src));
    fs::create_dir_all(&out_dir)?;

    let csv_path = out_dir.join(TIMESERIES_CSV);
    if let Err(e) = write_series_csv(&series, &csv_path) {
        log::warn!("could not write {}: {e}", csv_path.display());
    }

    let summary = summarize(&series);
    let summary_path = out_dir.join(SUMMARY_JSON);
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

    let plots = write_standard_plots(&series, config.x_axis, &out_dir)?;

    let zip = if config.archive {
        let name = config
            .archive_name
            .clone()
            .unwrap_or_else(|| archive::default_archive_name(&config.src));
        let mut files = vec![summary_path.clone(), csv_path.clone()];
        files.extend(plots.iter().cloned());
        Some(archive::bundle(&out_dir, &files, &name)?)
    } else {
        None
    };

    Ok(AnalysisManifest {
        out_dir,
        summary_json: summary_path,
        csv: csv_path,
        x_axis: config.x_axis.as_str().to_string(),
        plots,
        zip,
        summary,
    })
}
