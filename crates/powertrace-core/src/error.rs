//! Error types for powertrace-core.
//!
//! Absent metrics and negative counter/time deltas are not errors: the
//! summarizer omits or clamps them. Everything here stops an analysis run.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// powertrace error types
#[derive(Error, Debug)]
pub enum Error {
    /// Neither line-mode nor stream decoding recovered a single record
    #[error("no telemetry records could be decoded: {reason}")]
    ParseFailure {
        /// What the decoder saw
        reason: String,
    },

    /// No decoded record carries a `timestamp` field
    #[error("no 'timestamp' field in telemetry input")]
    MissingTimestamp,

    /// A `timestamp` value could not be interpreted as an instant
    #[error("record {index}: unparseable timestamp {value:?}")]
    InvalidTimestamp {
        /// Position of the record in decode order
        index: usize,
        /// Raw value as it appeared in the input
        value: String,
    },

    /// Records decoded, but none survived device filtering
    #[error("no rows after parsing/filtering{}", filter_suffix(.gpu_index))]
    EmptyAfterFilter {
        /// Device filter that was applied, if any
        gpu_index: Option<u32>,
    },

    /// Elapsed time requested for a series with no records
    #[error("cannot derive elapsed time from an empty series")]
    EmptySeries,

    /// Live sampler could not read hardware counters
    #[error("probe failed: {0}")]
    Probe(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn filter_suffix(gpu_index: &Option<u32>) -> String {
    gpu_index
        .map(|i| format!(" (gpu_index = {i})"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_after_filter_mentions_device() {
        let e = Error::EmptyAfterFilter { gpu_index: Some(3) };
        assert_eq!(e.to_string(), "no rows after parsing/filtering (gpu_index = 3)");

        let e = Error::EmptyAfterFilter { gpu_index: None };
        assert_eq!(e.to_string(), "no rows after parsing/filtering");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("gone"));
    }
}
