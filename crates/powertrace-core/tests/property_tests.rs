//! Property-based tests for the summarizer.
//!
//! - Summaries do not depend on input order, even with repeated timestamps.
//! - Energy estimates are never negative, whatever the counters and clocks do.
//! - A device filter on logs without `gpu_index` drops nothing.

use chrono::{DateTime, Duration, Utc};
use powertrace_core::{TelemetryRecord, TelemetrySeries, summarize};
use proptest::prelude::*;

fn base() -> DateTime<Utc> {
    DateTime::from_timestamp(1_753_893_581, 0).unwrap()
}

fn build(offsets_ms: &[i64], powers: &[Option<f64>], energies: &[Option<f64>]) -> Vec<TelemetryRecord> {
    offsets_ms
        .iter()
        .zip(powers)
        .zip(energies)
        .map(|((&ms, &power), &energy)| {
            let mut r = TelemetryRecord::new(base() + Duration::milliseconds(ms));
            r.power_watts = power;
            r.energy_mj = energy;
            r.cpu_utilization_percent = power.map(|p| p / 10.0);
            r
        })
        .collect()
}

/// Records with arbitrary (possibly repeated, unordered) timestamps.
fn arb_any_records() -> impl Strategy<Value = Vec<TelemetryRecord>> {
    (1usize..40).prop_flat_map(|n| {
        (
            // Narrow range so timestamps repeat often.
            proptest::collection::vec(-20i64..20, n)
                .prop_map(|v| v.into_iter().map(|s| s * 500).collect::<Vec<i64>>()),
            proptest::collection::vec(proptest::option::of(0.0f64..700.0), n),
            proptest::collection::vec(proptest::option::of(0.0f64..1e9), n),
        )
            .prop_map(|(o, p, e)| build(&o, &p, &e))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: any permutation of the input gives the same report
    #[test]
    fn prop_summary_is_order_independent(
        (records, shuffled) in arb_any_records()
            .prop_flat_map(|r| (Just(r.clone()), Just(r).prop_shuffle()))
    ) {
        let a = summarize(&TelemetrySeries::new(records, None).unwrap());
        let b = summarize(&TelemetrySeries::new(shuffled, None).unwrap());
        prop_assert_eq!(a, b);
    }

    /// Property: both energy estimates are non-negative
    #[test]
    fn prop_energy_is_non_negative(records in arb_any_records()) {
        let report = summarize(&TelemetrySeries::new(records, None).unwrap());
        prop_assert!(report.energy_wh_nvml >= 0.0);
        prop_assert!(report.energy_wh_integrated >= 0.0);
        prop_assert!(report.energy_kj_integrated >= 0.0);
        prop_assert!(report.duration_seconds.unwrap() >= 0.0);
    }

    /// Property: filtering logs that carry no gpu_index is a no-op
    #[test]
    fn prop_filter_without_field_keeps_all(
        records in arb_any_records(),
        gpu in 0u32..8,
    ) {
        let n = records.len();
        let series = TelemetrySeries::new(records, Some(gpu)).unwrap();
        prop_assert_eq!(series.len(), n);
    }

    /// Property: num_samples equals the number of records kept
    #[test]
    fn prop_num_samples_matches_len(records in arb_any_records()) {
        let n = records.len();
        let report = summarize(&TelemetrySeries::new(records, None).unwrap());
        prop_assert_eq!(report.num_samples, n);
    }
}
