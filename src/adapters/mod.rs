//! Stream payload adapters
//!
//! This module provides adapters that parse recorded activity payloads and map
//! them to per-channel columns ready for stream preparation.

mod columns;
mod samples;

pub use columns::ColumnAdapter;
pub use samples::SampleAdapter;

use crate::error::ComputeError;
use crate::types::StreamColumns;

/// Trait for stream payload adapters
pub trait StreamPayloadAdapter {
    /// Parse raw JSON into stream columns
    fn parse(&self, raw_json: &str) -> Result<StreamColumns, ComputeError>;
}

/// Detect the payload shape and parse with the matching adapter.
///
/// A top-level array of objects carrying `time` is treated as rows, anything
/// else as columns.
pub fn parse_stream_payload(raw_json: &str) -> Result<StreamColumns, ComputeError> {
    parse_stream_value(serde_json::from_str(raw_json)?)
}

/// Same as [`parse_stream_payload`] for an already-decoded value
pub fn parse_stream_value(value: serde_json::Value) -> Result<StreamColumns, ComputeError> {
    let is_rows = value
        .as_array()
        .and_then(|rows| rows.first())
        .and_then(|first| first.as_object())
        .is_some_and(|obj| obj.contains_key("time") || obj.contains_key("offset_seconds"));

    if is_rows {
        SampleAdapter.parse_value(value)
    } else {
        ColumnAdapter.parse_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_rows() {
        let json = r#"[{"time": 0, "watts": 100}, {"time": 1, "watts": 120}]"#;
        let columns = parse_stream_payload(json).unwrap();
        assert_eq!(columns.power, Some(vec![100.0, 120.0]));
    }

    #[test]
    fn test_detects_columns() {
        let json = r#"{"time": [0, 1], "heartrate": [120, 121]}"#;
        let columns = parse_stream_payload(json).unwrap();
        assert_eq!(columns.heart_rate, Some(vec![120.0, 121.0]));
    }

    #[test]
    fn test_recorded_stops_reach_prepared_stream() {
        let json = r#"{"time": [0, 1, 2, 3], "moving": [true, false, false, true]}"#;
        let columns = parse_stream_payload(json).unwrap();
        let stream = crate::prepare::StreamPreparer::prepare(&columns, 2.0).unwrap();
        assert_eq!(stream.moving_mask(), vec![true, false, false, true]);
    }

    #[test]
    fn test_detects_typed_stream_list() {
        let json = r#"[{"type": "time", "data": [0, 1]}, {"type": "watts", "data": [90, 95]}]"#;
        let columns = parse_stream_payload(json).unwrap();
        assert_eq!(columns.time, vec![0.0, 1.0]);
        assert_eq!(columns.power, Some(vec![90.0, 95.0]));
    }
}
