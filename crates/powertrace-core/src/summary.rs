//! Summary statistics and energy estimates for a telemetry series.
//!
//! Two independent energy figures are reported:
//! - **counter**: `max - min` of the device's cumulative `energy_mJ` counter;
//! - **integrated**: trapezoidal integral of `power_watts` over time.
//!
//! Neither is ever negative. A counter that went backwards (reset or
//! rollover) reports 0.0, and inverted time pairs contribute nothing.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::record::Metric;
use crate::series::{TelemetrySeries, seconds_between};

const SECONDS_PER_HOUR: f64 = 3600.0;
const MJ_PER_J: f64 = 1000.0;
const KJ_PER_WH: f64 = 3.6;

/// Metrics that get `_avg` / `_max` entries, in report order.
pub const SUMMARY_METRICS: [Metric; 4] = [
    Metric::PowerWatts,
    Metric::GpuUtilization,
    Metric::MemoryUsedMb,
    Metric::CpuUtilization,
];

/// Average and maximum of one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub metric: Metric,
    pub avg: f64,
    pub max: f64,
}

/// Flat summary of one series.
///
/// Serializes to a flat JSON object of numbers; metrics absent from the
/// series have no keys at all.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub metrics: Vec<MetricStats>,
    pub energy_wh_nvml: f64,
    pub energy_wh_integrated: f64,
    pub energy_kj_integrated: f64,
    pub num_samples: usize,
    pub duration_seconds: Option<f64>,
}

impl SummaryReport {
    /// Look up a value by its report key, e.g. `"power_watts_avg"`.
    pub fn get(&self, key: &str) -> Option<f64> {
        for s in &self.metrics {
            if let Some(suffix) = key.strip_prefix(s.metric.key()) {
                match suffix {
                    "_avg" => return Some(s.avg),
                    "_max" => return Some(s.max),
                    _ => {}
                }
            }
        }
        match key {
            "energy_Wh_nvml" => Some(self.energy_wh_nvml),
            "energy_Wh_integrated" => Some(self.energy_wh_integrated),
            "energy_kJ_integrated" => Some(self.energy_kj_integrated),
            "num_samples" => Some(self.num_samples as f64),
            "duration_seconds" => self.duration_seconds,
            _ => None,
        }
    }

    /// All report keys, in serialization order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.metrics.len() * 2 + 5);
        for s in &self.metrics {
            keys.push(format!("{}_avg", s.metric.key()));
            keys.push(format!("{}_max", s.metric.key()));
        }
        keys.extend(
            ["energy_Wh_nvml", "energy_Wh_integrated", "energy_kJ_integrated", "num_samples"]
                .map(str::to_string),
        );
        if self.duration_seconds.is_some() {
            keys.push("duration_seconds".to_string());
        }
        keys
    }
}

impl Serialize for SummaryReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for s in &self.metrics {
            map.serialize_entry(&format!("{}_avg", s.metric.key()), &s.avg)?;
            map.serialize_entry(&format!("{}_max", s.metric.key()), &s.max)?;
        }
        map.serialize_entry("energy_Wh_nvml", &self.energy_wh_nvml)?;
        map.serialize_entry("energy_Wh_integrated", &self.energy_wh_integrated)?;
        map.serialize_entry("energy_kJ_integrated", &self.energy_kj_integrated)?;
        map.serialize_entry("num_samples", &self.num_samples)?;
        if let Some(d) = self.duration_seconds {
            map.serialize_entry("duration_seconds", &d)?;
        }
        map.end()
    }
}

/// Mean of `metric` over records that carry it.
pub fn compute_average(series: &TelemetrySeries, metric: Metric) -> Option<f64> {
    let (sum, n) = series
        .values(metric)
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Maximum of `metric` over records that carry it.
pub fn compute_max(series: &TelemetrySeries, metric: Metric) -> Option<f64> {
    series.values(metric).reduce(f64::max)
}

/// Energy in Wh from the cumulative `energy_mJ` counter.
pub fn energy_wh_from_counter(series: &TelemetrySeries) -> f64 {
    let mut values = series.values(Metric::EnergyMj);
    let Some(first) = values.next() else {
        return 0.0;
    };
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let delta_mj = (max - min).max(0.0);
    delta_mj / MJ_PER_J / SECONDS_PER_HOUR
}

/// Energy in Wh by trapezoidal integration of `power_watts` over time.
///
/// Records without a power reading are skipped; the trapezoid spans the
/// neighbouring records that have one.
pub fn energy_wh_from_power(series: &TelemetrySeries) -> f64 {
    let mut points = series
        .records()
        .iter()
        .filter_map(|r| r.power_watts.map(|p| (r.timestamp, p)));
    let Some(mut prev) = points.next() else {
        return 0.0;
    };

    let mut area_ws = 0.0;
    for (t, p) in points {
        let dt = seconds_between(prev.0, t).max(0.0);
        area_ws += 0.5 * (p + prev.1) * dt;
        prev = (t, p);
    }
    area_ws / SECONDS_PER_HOUR
}

/// Compute the full summary report for a series.
pub fn summarize(series: &TelemetrySeries) -> SummaryReport {
    let metrics = SUMMARY_METRICS
        .iter()
        .filter_map(|&metric| {
            let avg = compute_average(series, metric)?;
            let max = compute_max(series, metric)?;
            Some(MetricStats { metric, avg, max })
        })
        .collect();

    let energy_wh_integrated = energy_wh_from_power(series);
    let elapsed = series.elapsed_s();
    let duration_seconds = elapsed
        .iter()
        .copied()
        .reduce(f64::max)
        .zip(elapsed.iter().copied().reduce(f64::min))
        .map(|(max, min)| max - min);

    SummaryReport {
        metrics,
        energy_wh_nvml: energy_wh_from_counter(series),
        energy_wh_integrated,
        energy_kj_integrated: energy_wh_integrated * KJ_PER_WH,
        num_samples: series.len(),
        duration_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TelemetryRecord, parse_timestamp};

    fn at(secs: i64) -> TelemetryRecord {
        let base = parse_timestamp("2025-07-30T00:00:00Z").unwrap();
        TelemetryRecord::new(base + chrono::Duration::seconds(secs))
    }

    fn powered(secs: i64, watts: f64) -> TelemetryRecord {
        let mut r = at(secs);
        r.power_watts = Some(watts);
        r
    }

    fn series(records: Vec<TelemetryRecord>) -> TelemetrySeries {
        TelemetrySeries::new(records, None).unwrap()
    }

    #[test]
    fn trapezoid_three_samples() {
        let s = series(vec![powered(0, 100.0), powered(10, 200.0), powered(20, 100.0)]);
        let wh = energy_wh_from_power(&s);
        assert!((wh - 3000.0 / 3600.0).abs() < 1e-12);
        let report = summarize(&s);
        assert!((report.energy_kj_integrated - 3.0).abs() < 1e-12);
    }

    #[test]
    fn counter_delta() {
        let mut records = Vec::new();
        for (i, mj) in [1000.0, 5000.0, 9000.0].into_iter().enumerate() {
            let mut r = at(i as i64);
            r.energy_mj = Some(mj);
            records.push(r);
        }
        let wh = energy_wh_from_counter(&series(records));
        assert!((wh - 8.0 / 3600.0).abs() < 1e-15);
    }

    #[test]
    fn counter_uses_extremes_not_endpoints() {
        let mut records = Vec::new();
        for (i, mj) in [5000.0, 1000.0, 3000.0].into_iter().enumerate() {
            let mut r = at(i as i64);
            r.energy_mj = Some(mj);
            records.push(r);
        }
        let wh = energy_wh_from_counter(&series(records));
        assert!((wh - 4.0 / 3600.0).abs() < 1e-15);
    }

    #[test]
    fn counter_absent_is_zero() {
        let s = series(vec![powered(0, 1.0), powered(1, 1.0)]);
        assert_eq!(energy_wh_from_counter(&s), 0.0);
    }

    #[test]
    fn single_sample() {
        let report = summarize(&series(vec![powered(0, 250.0)]));
        assert_eq!(report.energy_wh_integrated, 0.0);
        assert_eq!(report.duration_seconds, Some(0.0));
        assert_eq!(report.num_samples, 1);
        assert_eq!(report.get("power_watts_avg"), Some(250.0));
        assert_eq!(report.get("power_watts_max"), Some(250.0));
    }

    #[test]
    fn missing_power_readings_are_bridged() {
        let s = series(vec![powered(0, 100.0), at(5), powered(10, 100.0)]);
        let wh = energy_wh_from_power(&s);
        assert!((wh - 1000.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn duplicate_timestamps_contribute_nothing() {
        let s = series(vec![powered(0, 100.0), powered(0, 300.0)]);
        assert_eq!(energy_wh_from_power(&s), 0.0);
    }

    #[test]
    fn tied_timestamps_integrate_the_same_in_any_order() {
        let a = summarize(&series(vec![powered(0, 100.0), powered(0, 300.0), powered(10, 100.0)]));
        let b = summarize(&series(vec![powered(0, 300.0), powered(0, 100.0), powered(10, 100.0)]));
        assert_eq!(a, b);
        assert!((a.energy_wh_integrated - 2000.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn average_and_max_skip_missing() {
        let mut a = at(0);
        a.cpu_utilization_percent = Some(10.0);
        let b = at(1);
        let mut c = at(2);
        c.cpu_utilization_percent = Some(30.0);
        let s = series(vec![a, b, c]);
        assert_eq!(compute_average(&s, Metric::CpuUtilization), Some(20.0));
        assert_eq!(compute_max(&s, Metric::CpuUtilization), Some(30.0));
        assert_eq!(compute_average(&s, Metric::PowerWatts), None);
        assert_eq!(compute_max(&s, Metric::PowerWatts), None);
    }

    #[test]
    fn absent_metric_has_no_keys() {
        let report = summarize(&series(vec![powered(0, 1.0), powered(1, 2.0)]));
        let json = serde_json::to_value(&report).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("memory_used_MB_avg"));
        assert!(!obj.contains_key("memory_used_MB_max"));
        assert!(obj.contains_key("power_watts_avg"));
        assert_eq!(report.get("memory_used_MB_avg"), None);
    }

    #[test]
    fn memory_utilization_is_not_summarized() {
        let mut r = at(0);
        r.memory_utilization_percent = Some(50.0);
        let report = summarize(&series(vec![r]));
        assert!(report.metrics.is_empty());
    }

    #[test]
    fn serialized_report_is_flat_numbers() {
        let report = summarize(&series(vec![powered(0, 100.0), powered(10, 200.0)]));
        let json = serde_json::to_value(&report).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.values().all(serde_json::Value::is_number));
        assert_eq!(obj["num_samples"], serde_json::json!(2));
        assert_eq!(obj["duration_seconds"], serde_json::json!(10.0));
        let keys: Vec<String> = obj.keys().cloned().collect();
        let mut expected = report.keys();
        expected.sort();
        let mut keys_sorted = keys;
        keys_sorted.sort();
        assert_eq!(keys_sorted, expected);
    }
}
