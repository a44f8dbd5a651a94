//! Time-ordered telemetry series.
//!
//! A [`TelemetrySeries`] is built once from decoded records: filter by
//! device, sort by timestamp, then derive elapsed seconds. It is
//! never empty and never mutated afterwards.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::record::{Metric, TelemetryRecord};

/// Filtered, sorted records with their elapsed-time column.
#[derive(Debug, Clone)]
pub struct TelemetrySeries {
    records: Vec<TelemetryRecord>,
    elapsed_s: Vec<f64>,
}

impl TelemetrySeries {
    /// Build a series, keeping only `gpu_index` matches when a filter is
    /// given and the field appears anywhere in the data.
    pub fn new(records: Vec<TelemetryRecord>, gpu_index: Option<u32>) -> Result<Self> {
        let mut records = filter_by_gpu(records, gpu_index);
        if records.is_empty() {
            return Err(Error::EmptyAfterFilter { gpu_index });
        }
        sort_by_time(&mut records);
        let elapsed_s = derive_elapsed(&records)?;
        Ok(Self { records, elapsed_s })
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    /// Seconds since the first record, aligned with [`Self::records`].
    pub fn elapsed_s(&self) -> &[f64] {
        &self.elapsed_s
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether at least one record carries `metric`.
    pub fn has_metric(&self, metric: Metric) -> bool {
        self.records.iter().any(|r| r.metric(metric).is_some())
    }

    /// Present values of `metric`, in time order.
    pub fn values(&self, metric: Metric) -> impl Iterator<Item = f64> + '_ {
        self.records.iter().filter_map(move |r| r.metric(metric))
    }

    /// First `gpu_name` in the series, if any record has one.
    pub fn gpu_name(&self) -> Option<&str> {
        self.records.iter().find_map(|r| r.gpu_name.as_deref())
    }

    /// First `gpu_index` in the series, if any record has one.
    pub fn gpu_index(&self) -> Option<u32> {
        self.records.iter().find_map(|r| r.gpu_index)
    }
}

/// Keep records for one device. A no-op when no record has `gpu_index`.
pub fn filter_by_gpu(records: Vec<TelemetryRecord>, gpu_index: Option<u32>) -> Vec<TelemetryRecord> {
    let Some(wanted) = gpu_index else {
        return records;
    };
    if !records.iter().any(|r| r.gpu_index.is_some()) {
        log::debug!("gpu_index filter {wanted} ignored: field absent from input");
        return records;
    }
    let before = records.len();
    let kept: Vec<_> = records
        .into_iter()
        .filter(|r| r.gpu_index == Some(wanted))
        .collect();
    log::debug!("gpu_index filter {wanted}: kept {}/{before}", kept.len());
    kept
}

/// Ascending sort by timestamp.
///
/// Records sharing a timestamp are ordered by their readings, so the result
/// does not depend on input order. Only identical records stay tied.
pub fn sort_by_time(records: &mut [TelemetryRecord]) {
    records.sort_by(cmp_records);
}

fn cmp_records(a: &TelemetryRecord, b: &TelemetryRecord) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.gpu_index.cmp(&b.gpu_index))
        .then_with(|| {
            Metric::ALL
                .iter()
                .map(|&m| cmp_reading(a.metric(m), b.metric(m)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.gpu_name.cmp(&b.gpu_name))
}

// Absent sorts before present.
fn cmp_reading(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// Seconds since the first record, for each record.
///
/// Expects `records` already sorted.
pub fn derive_elapsed(records: &[TelemetryRecord]) -> Result<Vec<f64>> {
    let first = records.first().ok_or(Error::EmptySeries)?.timestamp;
    Ok(records
        .iter()
        .map(|r| seconds_between(first, r.timestamp))
        .collect())
}

pub(crate) fn seconds_between(
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
) -> f64 {
    let delta = to - from;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
