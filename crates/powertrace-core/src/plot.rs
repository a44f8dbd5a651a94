//! SVG time-series plots.
//!
//! Charts are plain SVG strings: no fonts to bundle, viewable in any browser,
//! and small enough to ship inside the output archive.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::DateTime;

use crate::record::Metric;
use crate::series::TelemetrySeries;

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 400.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICKS: usize = 5;
const PALETTE: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

/// Which quantity goes on the x-axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XAxis {
    /// Seconds since the first sample.
    #[default]
    Elapsed,
    /// Wall-clock time, UTC.
    Time,
}

impl XAxis {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "elapsed" => Some(Self::Elapsed),
            "time" => Some(Self::Time),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elapsed => "elapsed",
            Self::Time => "time",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Elapsed => "Elapsed seconds",
            Self::Time => "Time (UTC)",
        }
    }
}

impl std::fmt::Display for XAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Chart model
// ---------------------------------------------------------------------------

/// One line on a chart.
#[derive(Debug, Clone)]
pub struct ChartLine {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// A line chart ready to render.
#[derive(Debug, Clone)]
pub struct LineChart {
    pub title: String,
    pub x_axis: XAxis,
    pub y_label: Option<String>,
    pub lines: Vec<ChartLine>,
}

impl LineChart {
    /// Chart of the given metrics from a series. Lines for metrics absent
    /// from the series are left out.
    pub fn from_series(
        series: &TelemetrySeries,
        x_axis: XAxis,
        metrics: &[(Metric, &str)],
        title: impl Into<String>,
        y_label: Option<&str>,
    ) -> Self {
        let xs = x_values(series, x_axis);
        let lines = metrics
            .iter()
            .filter(|(m, _)| series.has_metric(*m))
            .map(|&(metric, label)| ChartLine {
                label: label.to_string(),
                points: series
                    .records()
                    .iter()
                    .zip(&xs)
                    .filter_map(|(r, &x)| r.metric(metric).map(|y| (x, y)))
                    .collect(),
            })
            .collect();
        Self {
            title: title.into(),
            x_axis,
            y_label: y_label.map(str::to_string),
            lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.points.is_empty())
    }
}

fn x_values(series: &TelemetrySeries, x_axis: XAxis) -> Vec<f64> {
    match x_axis {
        XAxis::Elapsed => series.elapsed_s().to_vec(),
        XAxis::Time => series
            .records()
            .iter()
            .map(|r| r.timestamp.timestamp() as f64 + f64::from(r.timestamp.timestamp_subsec_nanos()) / 1e9)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        let pad = if lo.abs() > 1.0 { lo.abs() * 0.05 } else { 0.5 };
        return (lo - pad, hi + pad);
    }
    (lo, hi)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn format_number(v: f64) -> String {
    let a = v.abs();
    if a >= 100.0 {
        format!("{v:.0}")
    } else if a >= 1.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.2}")
    }
}

fn format_tick(v: f64, x_axis: XAxis) -> String {
    match x_axis {
        XAxis::Elapsed => format_number(v),
        XAxis::Time => DateTime::from_timestamp(v.floor() as i64, 0)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| format_number(v)),
    }
}

/// Render a chart as a standalone SVG document.
pub fn render_line_chart(chart: &LineChart) -> String {
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let all_points = || chart.lines.iter().flat_map(|l| l.points.iter());
    let (x_min, x_max) = extent(all_points().map(|p| p.0));
    let (y_min, y_max) = extent(all_points().map(|p| p.1));
    let sx = |x: f64| MARGIN_LEFT + (x - x_min) / (x_max - x_min) * plot_w;
    let sy = |y: f64| MARGIN_TOP + plot_h - (y - y_min) / (y_max - y_min) * plot_h;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="24" text-anchor="middle" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        escape_xml(&chart.title)
    );

    // Grid and ticks.
    for i in 0..=TICKS {
        let f = i as f64 / TICKS as f64;
        let xv = x_min + f * (x_max - x_min);
        let yv = y_min + f * (y_max - y_min);
        let (px, py) = (sx(xv), sy(yv));
        let _ = writeln!(
            svg,
            r##"<line x1="{px:.1}" y1="{MARGIN_TOP}" x2="{px:.1}" y2="{:.1}" stroke="#e0e0e0"/>"##,
            MARGIN_TOP + plot_h
        );
        let _ = writeln!(
            svg,
            r#"<text x="{px:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            MARGIN_TOP + plot_h + 18.0,
            escape_xml(&format_tick(xv, chart.x_axis))
        );
        let _ = writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{py:.1}" x2="{:.1}" y2="{py:.1}" stroke="#e0e0e0"/>"##,
            MARGIN_LEFT + plot_w
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 6.0,
            py + 4.0,
            format_number(yv)
        );
    }

    // Axes.
    let _ = writeln!(
        svg,
        r#"<rect x="{MARGIN_LEFT}" y="{MARGIN_TOP}" width="{plot_w}" height="{plot_h}" fill="none" stroke="black"/>"#
    );
    let _ = writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        HEIGHT - 14.0,
        chart.x_axis.label()
    );
    if let Some(ref label) = chart.y_label {
        let _ = writeln!(
            svg,
            r#"<text x="18" y="{0:.1}" text-anchor="middle" transform="rotate(-90 18 {0:.1})">{1}</text>"#,
            MARGIN_TOP + plot_h / 2.0,
            escape_xml(label)
        );
    }

    for (i, line) in chart.lines.iter().enumerate() {
        if line.points.is_empty() {
            continue;
        }
        let color = PALETTE[i % PALETTE.len()];
        let coords: Vec<String> = line
            .points
            .iter()
            .map(|&(x, y)| format!("{:.2},{:.2}", sx(x), sy(y)))
            .collect();
        let _ = writeln!(
            svg,
            r#"<polyline fill="none" stroke="{color}" stroke-width="1.5" points="{}"/>"#,
            coords.join(" ")
        );
    }

    if chart.lines.len() > 1 {
        for (i, line) in chart.lines.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            let y = MARGIN_TOP + 14.0 + i as f64 * 16.0;
            let x = MARGIN_LEFT + 10.0;
            let _ = writeln!(
                svg,
                r#"<line x1="{x}" y1="{y}" x2="{}" y2="{y}" stroke="{color}" stroke-width="2"/>"#,
                x + 20.0
            );
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}">{}</text>"#,
                x + 26.0,
                y + 4.0,
                escape_xml(&line.label)
            );
        }
    }

    svg.push_str("</svg>\n");
    svg
}

// ---------------------------------------------------------------------------
// Plot files
// ---------------------------------------------------------------------------

/// Plot one metric to `path`. Returns `Ok(false)` without writing anything
/// when the metric never appears in the series.
pub fn plot_timeseries(
    series: &TelemetrySeries,
    x_axis: XAxis,
    metric: Metric,
    title: &str,
    path: &Path,
    y_label: Option<&str>,
) -> std::io::Result<bool> {
    let chart = LineChart::from_series(series, x_axis, &[(metric, metric.key())], title, y_label);
    if chart.is_empty() {
        log::debug!("skipping {} plot: no {metric} data", path.display());
        return Ok(false);
    }
    std::fs::write(path, render_line_chart(&chart))?;
    Ok(true)
}

/// One entry of the standard per-metric plot set.
struct PlotSpec {
    metric: Metric,
    file: &'static str,
    title: &'static str,
    y_label: &'static str,
    /// Host metrics are not prefixed with the device label.
    host: bool,
}

const STANDARD_PLOTS: [PlotSpec; 4] = [
    PlotSpec {
        metric: Metric::PowerWatts,
        file: "power_watts.svg",
        title: "Power (W)",
        y_label: "Watts",
        host: false,
    },
    PlotSpec {
        metric: Metric::GpuUtilization,
        file: "gpu_utilization.svg",
        title: "GPU Utilization (%)",
        y_label: "Percent",
        host: false,
    },
    PlotSpec {
        metric: Metric::MemoryUsedMb,
        file: "gpu_memory_used.svg",
        title: "GPU Memory Used (MB)",
        y_label: "MB",
        host: false,
    },
    PlotSpec {
        metric: Metric::CpuUtilization,
        file: "cpu_utilization.svg",
        title: "Host CPU Utilization (%)",
        y_label: "Percent",
        host: true,
    },
];

/// File name of the combined power/CPU/GPU chart.
pub const OVERVIEW_PLOT: &str = "system_metrics.svg";

/// Device label used in plot titles, e.g. `NVIDIA A100 (index 0)`.
pub fn device_label(series: &TelemetrySeries) -> String {
    let name = series.gpu_name().unwrap_or("GPU");
    match series.gpu_index() {
        Some(i) => format!("{name} (index {i})"),
        None => format!("{name} (index NA)"),
    }
}

/// Write the per-metric plots plus the overview chart into `out_dir`.
/// Returns the paths actually written.
pub fn write_standard_plots(
    series: &TelemetrySeries,
    x_axis: XAxis,
    out_dir: &Path,
) -> std::io::Result<Vec<PathBuf>> {
    let base = device_label(series);
    let mut written = Vec::new();

    for spec in &STANDARD_PLOTS {
        let title = if spec.host {
            spec.title.to_string()
        } else {
            format!("{base} {}", spec.title)
        };
        let path = out_dir.join(spec.file);
        if plot_timeseries(series, x_axis, spec.metric, &title, &path, Some(spec.y_label))? {
            written.push(path);
        }
    }

    let overview = LineChart::from_series(
        series,
        x_axis,
        &[
            (Metric::PowerWatts, "GPU Power (W)"),
            (Metric::CpuUtilization, "CPU Utilization (%)"),
            (Metric::GpuUtilization, "GPU Utilization (%)"),
        ],
        "System Metrics Over Time",
        Some("Metrics Values"),
    );
    if !overview.is_empty() {
        let path = out_dir.join(OVERVIEW_PLOT);
        std::fs::write(&path, render_line_chart(&overview))?;
        written.push(path);
    }

    Ok(written)
}
