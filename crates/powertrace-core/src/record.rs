//! Telemetry record model.
//!
//! One [`TelemetryRecord`] per log line. Every metric is optional: a field
//! missing from the input stays `None` and never turns into a zero.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Numeric metric carried by a telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    PowerWatts,
    EnergyMj,
    GpuUtilization,
    MemoryUtilization,
    MemoryUsedMb,
    CpuUtilization,
}

impl Metric {
    /// All metrics, in export column order.
    pub const ALL: [Metric; 6] = [
        Metric::PowerWatts,
        Metric::EnergyMj,
        Metric::GpuUtilization,
        Metric::MemoryUtilization,
        Metric::MemoryUsedMb,
        Metric::CpuUtilization,
    ];

    /// Field name as written in the telemetry log.
    pub fn key(self) -> &'static str {
        match self {
            Metric::PowerWatts => "power_watts",
            Metric::EnergyMj => "energy_mJ",
            Metric::GpuUtilization => "gpu_utilization_percent",
            Metric::MemoryUtilization => "memory_utilization_percent",
            Metric::MemoryUsedMb => "memory_used_MB",
            Metric::CpuUtilization => "cpu_utilization_percent",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One timestamped hardware sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_watts: Option<f64>,
    #[serde(rename = "energy_mJ", skip_serializing_if = "Option::is_none")]
    pub energy_mj: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_utilization_percent: Option<f64>,
    #[serde(rename = "memory_used_MB", skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_utilization_percent: Option<f64>,
}

impl TelemetryRecord {
    /// A record with only a timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            gpu_index: None,
            gpu_name: None,
            power_watts: None,
            energy_mj: None,
            gpu_utilization_percent: None,
            memory_utilization_percent: None,
            memory_used_mb: None,
            cpu_utilization_percent: None,
        }
    }

    /// Value of `metric`, if this record carries it.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::PowerWatts => self.power_watts,
            Metric::EnergyMj => self.energy_mj,
            Metric::GpuUtilization => self.gpu_utilization_percent,
            Metric::MemoryUtilization => self.memory_utilization_percent,
            Metric::MemoryUsedMb => self.memory_used_mb,
            Metric::CpuUtilization => self.cpu_utilization_percent,
        }
    }

    fn metric_mut(&mut self, metric: Metric) -> &mut Option<f64> {
        match metric {
            Metric::PowerWatts => &mut self.power_watts,
            Metric::EnergyMj => &mut self.energy_mj,
            Metric::GpuUtilization => &mut self.gpu_utilization_percent,
            Metric::MemoryUtilization => &mut self.memory_utilization_percent,
            Metric::MemoryUsedMb => &mut self.memory_used_mb,
            Metric::CpuUtilization => &mut self.cpu_utilization_percent,
        }
    }

    /// Build a record from a decoded JSON object.
    ///
    /// Returns `Ok(None)` when the object has no usable `timestamp` (missing
    /// or `null`); the caller decides whether that is fatal.
    pub fn from_object(index: usize, obj: &Map<String, Value>) -> Result<Option<Self>> {
        let timestamp = match obj.get("timestamp") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) => {
                parse_timestamp(s).ok_or_else(|| Error::InvalidTimestamp {
                    index,
                    value: s.clone(),
                })?
            }
            Some(Value::Number(n)) => n
                .as_f64()
                .and_then(timestamp_from_unix_secs)
                .ok_or_else(|| Error::InvalidTimestamp {
                    index,
                    value: n.to_string(),
                })?,
            Some(other) => {
                return Err(Error::InvalidTimestamp {
                    index,
                    value: other.to_string(),
                });
            }
        };

        let mut record = Self::new(timestamp);
        record.gpu_index = obj.get("gpu_index").and_then(device_index);
        record.gpu_name = obj.get("gpu_name").and_then(Value::as_str).map(str::to_string);

        for metric in Metric::ALL {
            let value = match obj.get(metric.key()) {
                None | Some(Value::Null) => None,
                Some(Value::Number(n)) => n.as_f64(),
                Some(other) => {
                    log::debug!("record {index}: ignoring non-numeric {metric} = {other}");
                    None
                }
            };
            *record.metric_mut(metric) = value;
        }

        Ok(Some(record))
    }
}

/// Device index from an integer or an integral float such as `0.0`.
fn device_index(value: &Value) -> Option<u32> {
    if let Some(i) = value.as_u64() {
        return u32::try_from(i).ok();
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&f)).then_some(f as u32)
}

/// Convert decoded objects into records.
///
/// Fails with [`Error::MissingTimestamp`] when no object has a `timestamp`
/// key at all. Objects without a usable timestamp are dropped.
pub fn records_from_objects(objects: &[Map<String, Value>]) -> Result<Vec<TelemetryRecord>> {
    if !objects.iter().any(|o| o.contains_key("timestamp")) {
        return Err(Error::MissingTimestamp);
    }

    let mut records = Vec::with_capacity(objects.len());
    let mut dropped = 0usize;
    for (index, obj) in objects.iter().enumerate() {
        match TelemetryRecord::from_object(index, obj)? {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        log::warn!("dropped {dropped} record(s) without a timestamp");
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Parse a textual timestamp into a UTC instant.
///
/// Offsets are honoured; timestamps without one are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn timestamp_from_unix_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
