//! Column-oriented stream adapter
//!
//! Accepts one array per channel, either as an object keyed by stream name
//! (`{"time": [...], "watts": [...]}`), with optional `{"data": [...]}`
//! wrappers, or as a list of typed streams (`[{"type": "watts", "data": [...]}]`).

use crate::error::ComputeError;
use crate::types::StreamColumns;
use serde_json::{Map, Value};

use super::StreamPayloadAdapter;

/// Accepted stream names per channel, in priority order
pub(crate) const TIME_KEYS: &[&str] = &["time", "offset_seconds"];
pub(crate) const POWER_KEYS: &[&str] = &["watts", "power"];
pub(crate) const HEART_RATE_KEYS: &[&str] = &["heartrate", "heart_rate"];
pub(crate) const CADENCE_KEYS: &[&str] = &["cadence"];
pub(crate) const SPEED_KEYS: &[&str] = &["velocity_smooth", "velocity", "speed"];
pub(crate) const ALTITUDE_KEYS: &[&str] = &["altitude"];
pub(crate) const DISTANCE_KEYS: &[&str] = &["distance"];
pub(crate) const GRADE_KEYS: &[&str] = &["grade_smooth", "grade"];
pub(crate) const MOVING_KEYS: &[&str] = &["moving"];

/// Column payload adapter
pub struct ColumnAdapter;

impl StreamPayloadAdapter for ColumnAdapter {
    fn parse(&self, raw_json: &str) -> Result<StreamColumns, ComputeError> {
        let value: Value = serde_json::from_str(raw_json)?;
        self.parse_value(value)
    }
}

impl ColumnAdapter {
    pub fn parse_value(&self, value: Value) -> Result<StreamColumns, ComputeError> {
        let streams = match value {
            Value::Object(map) => map,
            Value::Array(list) => typed_list_to_map(list)?,
            _ => {
                return Err(ComputeError::ParseError(
                    "stream payload must be an object or a list of typed streams".to_string(),
                ))
            }
        };

        let time = match find_column(&streams, TIME_KEYS)? {
            Some(column) => column
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    v.ok_or_else(|| ComputeError::InvalidStream(format!("time[{i}] is null")))
                })
                .collect::<Result<Vec<f64>, _>>()?,
            None => return Err(ComputeError::MissingColumn("time".to_string())),
        };

        let channel = |keys: &[&str]| -> Result<Option<Vec<f64>>, ComputeError> {
            Ok(find_column(&streams, keys)?
                .map(|column| column.into_iter().map(|v| v.unwrap_or(0.0)).collect()))
        };

        Ok(StreamColumns {
            time,
            power: channel(POWER_KEYS)?,
            heart_rate: channel(HEART_RATE_KEYS)?,
            cadence: channel(CADENCE_KEYS)?,
            speed: channel(SPEED_KEYS)?,
            altitude: channel(ALTITUDE_KEYS)?,
            distance: channel(DISTANCE_KEYS)?,
            grade: channel(GRADE_KEYS)?,
            // Unknown flags defer to gap detection
            moving: find_column(&streams, MOVING_KEYS)?.map(|column| {
                column
                    .into_iter()
                    .map(|v| v.map_or(true, |flag| flag != 0.0))
                    .collect()
            }),
        })
    }
}

fn typed_list_to_map(list: Vec<Value>) -> Result<Map<String, Value>, ComputeError> {
    let mut map = Map::new();
    for entry in list {
        let Value::Object(mut obj) = entry else {
            return Err(ComputeError::ParseError(
                "typed stream entries must be objects".to_string(),
            ));
        };
        let name = match obj.remove("type") {
            Some(Value::String(name)) => name,
            _ => {
                return Err(ComputeError::ParseError(
                    "typed stream entry without a string `type`".to_string(),
                ))
            }
        };
        let data = obj.remove("data").unwrap_or(Value::Null);
        map.insert(name, data);
    }
    Ok(map)
}

/// First present key wins; null entries come back as None
fn find_column(
    streams: &Map<String, Value>,
    keys: &[&str],
) -> Result<Option<Vec<Option<f64>>>, ComputeError> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|k| streams.get(*k).map(|v| (*k, v)))
    else {
        return Ok(None);
    };

    let array = match value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ComputeError::ParseError(format!(
                    "stream `{key}` has no data array"
                )))
            }
        },
        Value::Null => return Ok(None),
        _ => {
            return Err(ComputeError::ParseError(format!(
                "stream `{key}` must be an array"
            )))
        }
    };

    array
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Null => Ok(None),
            Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| {
                ComputeError::ParseError(format!("{key}[{i}] is not representable as f64"))
            }),
            Value::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
            other => Err(ComputeError::ParseError(format!(
                "{key}[{i}] must be numeric, got {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
