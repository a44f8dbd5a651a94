//! Tolerant decoding of telemetry logs.
//!
//! Logs are nominally one JSON object per line, but hand-edited or
//! pretty-printed files show up too. Decoding runs in two stages:
//!
//! 1. **Line mode**: every non-blank line must decode to a JSON object.
//! 2. **Stream mode**, only if line mode failed: consecutive JSON values are
//!    decoded from the raw text regardless of layout, whitespace between
//!    them skipped, until the text ends or the remainder cannot be decoded.

use serde_json::{Deserializer, Map, Value};

use crate::error::{Error, Result};

/// Which stage produced the decoded objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Lines,
    Stream,
}

/// Decode raw telemetry text into generic JSON objects.
///
/// Fails with [`Error::ParseFailure`] if neither stage yields an object.
pub fn decode_records(text: &str) -> Result<Vec<Map<String, Value>>> {
    decode_records_with_mode(text).map(|(objects, _)| objects)
}

/// Like [`decode_records`], also reporting which stage succeeded.
pub fn decode_records_with_mode(text: &str) -> Result<(Vec<Map<String, Value>>, DecodeMode)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let (objects, mode) = match decode_lines(text) {
        Ok(objects) => (objects, DecodeMode::Lines),
        Err(line_no) => {
            log::info!("line {line_no} is not a JSON object; falling back to stream decoding");
            (decode_stream(text), DecodeMode::Stream)
        }
    };

    if objects.is_empty() {
        return Err(Error::ParseFailure {
            reason: if text.trim().is_empty() {
                "input is empty".to_string()
            } else {
                "no JSON objects found".to_string()
            },
        });
    }
    log::debug!("decoded {} object(s) in {mode:?} mode", objects.len());
    Ok((objects, mode))
}

/// Stage 1. Returns the 1-based number of the first line that did not decode.
fn decode_lines(text: &str) -> std::result::Result<Vec<Map<String, Value>>, usize> {
    let mut objects = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) => objects.push(obj),
            _ => return Err(i + 1),
        }
    }
    Ok(objects)
}

/// Stage 2. Decodes values back to back; stops at the first undecodable byte.
fn decode_stream(text: &str) -> Vec<Map<String, Value>> {
    let mut objects = Vec::new();
    let mut stream = Deserializer::from_str(text).into_iter::<Value>();
    loop {
        match stream.next() {
            Some(Ok(Value::Object(obj))) => objects.push(obj),
            Some(Ok(other)) => {
                log::debug!("skipping non-object JSON value: {other}");
            }
            Some(Err(e)) => {
                let offset = stream.byte_offset();
                log::warn!(
                    "stopped decoding at byte {offset} of {}: {e}",
                    text.len()
                );
                break;
            }
            None => break,
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_mode_skips_blank_lines() {
        let text = "{\"timestamp\": \"a\"}\n\n   \n{\"timestamp\": \"b\"}\n";
        let (objects, mode) = decode_records_with_mode(text).unwrap();
        assert_eq!(mode, DecodeMode::Lines);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1]["timestamp"], "b");
    }

    #[test]
    fn pretty_printed_object_falls_back_to_stream() {
        let text = "{\n  \"timestamp\": \"2025-07-30T16:39:41\",\n  \"power_watts\": 100.0\n}";
        let (objects, mode) = decode_records_with_mode(text).unwrap();
        assert_eq!(mode, DecodeMode::Stream);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["power_watts"], 100.0);
    }

    #[test]
    fn concatenated_objects_without_newlines() {
        let text = "{\"timestamp\":\"a\"}{\"timestamp\":\"b\"}  {\"timestamp\":\"c\"}";
        let objects = decode_records(text).unwrap();
        assert_eq!(objects.len(), 3);
    }

    #[test]
    fn stream_mode_keeps_values_before_garbage() {
        let text = "{\n\"timestamp\": \"a\"\n}\n{\"timestamp\": \"b\"}\n#### truncated";
        let objects = decode_records(text).unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn stream_mode_skips_non_objects() {
        let text = "[1, 2]\n{\n\"timestamp\": \"a\"\n}";
        let objects = decode_records(text).unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn empty_input_is_parse_failure() {
        assert!(matches!(
            decode_records(""),
            Err(Error::ParseFailure { .. })
        ));
        assert!(matches!(
            decode_records("\n \n"),
            Err(Error::ParseFailure { .. })
        ));
    }

    #[test]
    fn undecodable_input_is_parse_failure() {
        let err = decode_records("this is not json").unwrap_err();
        assert!(matches!(err, Error::ParseFailure { .. }));
    }

    #[test]
    fn leading_bom_is_ignored() {
        let text = "\u{feff}{\"timestamp\": \"a\"}\n";
        let (objects, mode) = decode_records_with_mode(text).unwrap();
        assert_eq!(mode, DecodeMode::Lines);
        assert_eq!(objects.len(), 1);
    }
}
