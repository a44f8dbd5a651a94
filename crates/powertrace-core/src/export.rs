//! CSV export of a telemetry series.
//!
//! One row per record, sorted, with the derived `elapsed_s` column last.
//! Only fields present somewhere in the series get a column.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::SecondsFormat;

use crate::record::{Metric, TelemetryRecord};
use crate::series::TelemetrySeries;

/// File name used by the analysis pipeline.
pub const TIMESERIES_CSV: &str = "telemetry_timeseries.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    GpuIndex,
    GpuName,
    Metric(Metric),
}

impl Column {
    fn header(self) -> &'static str {
        match self {
            Column::GpuIndex => "gpu_index",
            Column::GpuName => "gpu_name",
            Column::Metric(m) => m.key(),
        }
    }

    fn cell(self, record: &TelemetryRecord) -> String {
        match self {
            Column::GpuIndex => record.gpu_index.map(|v| v.to_string()).unwrap_or_default(),
            Column::GpuName => record.gpu_name.as_deref().map(escape).unwrap_or_default(),
            Column::Metric(m) => record.metric(m).map(|v| v.to_string()).unwrap_or_default(),
        }
    }

    fn present_in(self, series: &TelemetrySeries) -> bool {
        match self {
            Column::GpuIndex => series.records().iter().any(|r| r.gpu_index.is_some()),
            Column::GpuName => series.records().iter().any(|r| r.gpu_name.is_some()),
            Column::Metric(m) => series.has_metric(m),
        }
    }
}

fn columns(series: &TelemetrySeries) -> Vec<Column> {
    let mut all = vec![Column::GpuIndex, Column::GpuName];
    all.extend(Metric::ALL.into_iter().map(Column::Metric));
    all.into_iter().filter(|c| c.present_in(series)).collect()
}

/// Quote a cell if it contains a delimiter, quote or line break.
fn escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write the series as CSV to any writer.
pub fn write_series_csv_to<W: Write>(series: &TelemetrySeries, mut out: W) -> std::io::Result<()> {
    let cols = columns(series);

    let mut header = vec!["timestamp"];
    header.extend(cols.iter().map(|c| c.header()));
    header.push("elapsed_s");
    writeln!(out, "{}", header.join(","))?;

    for (record, elapsed) in series.records().iter().zip(series.elapsed_s()) {
        let mut row = Vec::with_capacity(cols.len() + 2);
        row.push(record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true));
        row.extend(cols.iter().map(|c| c.cell(record)));
        row.push(elapsed.to_string());
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()
}

/// Write the series as CSV to `path`.
pub fn write_series_csv(series: &TelemetrySeries, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    write_series_csv_to(series, BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_timestamp;

    fn rec(ts: &str) -> TelemetryRecord {
        TelemetryRecord::new(parse_timestamp(ts).unwrap())
    }

    fn render(series: &TelemetrySeries) -> String {
        let mut buf = Vec::new();
        write_series_csv_to(series, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn only_present_columns_are_written() {
        let mut a = rec("2025-07-30T00:00:10Z");
        a.power_watts = Some(150.5);
        let mut b = rec("2025-07-30T00:00:00Z");
        b.cpu_utilization_percent = Some(12.0);
        let series = TelemetrySeries::new(vec![a, b], None).unwrap();

        let csv = render(&series);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,power_watts,cpu_utilization_percent,elapsed_s");
        assert_eq!(lines[1], "2025-07-30T00:00:00.000000Z,,12,0");
        assert_eq!(lines[2], "2025-07-30T00:00:10.000000Z,150.5,,10");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn gpu_name_is_quoted_when_needed() {
        let mut a = rec("2025-07-30T00:00:00Z");
        a.gpu_index = Some(0);
        a.gpu_name = Some("Tesla \"V100\", 32GB".to_string());
        let series = TelemetrySeries::new(vec![a], None).unwrap();

        let csv = render(&series);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,gpu_index,gpu_name,elapsed_s");
        assert_eq!(
            lines[1],
            "2025-07-30T00:00:00.000000Z,0,\"Tesla \"\"V100\"\", 32GB\",0"
        );
    }

    #[test]
    fn writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(TIMESERIES_CSV);
        let series = TelemetrySeries::new(vec![rec("2025-07-30T00:00:00Z")], None).unwrap();
        write_series_csv(&series, &path).unwrap();
        let csv = std::fs::read_to_string(path).unwrap();
        assert!(csv.starts_with("timestamp,elapsed_s\n"));
    }
}
