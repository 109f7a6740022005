//! Row-oriented stream adapter
//!
//! Accepts an array of sample objects, one per timestamp. Any channel present
//! on at least one row becomes a column; rows missing it read as 0.

use crate::error::ComputeError;
use crate::types::StreamColumns;
use serde_json::Value;

use super::columns::{
    ALTITUDE_KEYS, CADENCE_KEYS, DISTANCE_KEYS, GRADE_KEYS, HEART_RATE_KEYS, MOVING_KEYS,
    POWER_KEYS, SPEED_KEYS, TIME_KEYS,
};
use super::StreamPayloadAdapter;

/// Row payload adapter
pub struct SampleAdapter;

impl StreamPayloadAdapter for SampleAdapter {
    fn parse(&self, raw_json: &str) -> Result<StreamColumns, ComputeError> {
        let value: Value = serde_json::from_str(raw_json)?;
        self.parse_value(value)
    }
}

impl SampleAdapter {
    pub fn parse_value(&self, value: Value) -> Result<StreamColumns, ComputeError> {
        let Value::Array(rows) = value else {
            return Err(ComputeError::ParseError(
                "sample payload must be an array of rows".to_string(),
            ));
        };

        let mut time = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            match read_field(row, TIME_KEYS, i)? {
                Some(t) => time.push(t),
                None => return Err(ComputeError::MissingColumn(format!("time (row {i})"))),
            }
        }

        let channel = |keys: &[&str]| -> Result<Option<Vec<f64>>, ComputeError> {
            let mut values = Vec::with_capacity(rows.len());
            let mut seen = false;
            for (i, row) in rows.iter().enumerate() {
                let v = read_field(row, keys, i)?;
                seen |= v.is_some();
                values.push(v.unwrap_or(0.0));
            }
            Ok(seen.then_some(values))
        };

        let mut moving = Vec::with_capacity(rows.len());
        let mut has_moving = false;
        for (i, row) in rows.iter().enumerate() {
            let flag = read_flag(row, MOVING_KEYS, i)?;
            has_moving |= flag.is_some();
            moving.push(flag.unwrap_or(true));
        }

        Ok(StreamColumns {
            time,
            power: channel(POWER_KEYS)?,
            heart_rate: channel(HEART_RATE_KEYS)?,
            cadence: channel(CADENCE_KEYS)?,
            speed: channel(SPEED_KEYS)?,
            altitude: channel(ALTITUDE_KEYS)?,
            distance: channel(DISTANCE_KEYS)?,
            grade: channel(GRADE_KEYS)?,
            moving: has_moving.then_some(moving),
        })
    }
}

fn read_field(row: &Value, keys: &[&str], index: usize) -> Result<Option<f64>, ComputeError> {
    let Value::Object(obj) = row else {
        return Err(ComputeError::ParseError(format!("row {index} is not an object")));
    };
    for key in keys {
        match obj.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Number(n)) => return Ok(n.as_f64()),
            Some(other) => {
                return Err(ComputeError::ParseError(format!(
                    "row {index}: `{key}` must be numeric, got {other}"
                )))
            }
        }
    }
    Ok(None)
}

fn read_flag(row: &Value, keys: &[&str], index: usize) -> Result<Option<bool>, ComputeError> {
    let Value::Object(obj) = row else {
        return Err(ComputeError::ParseError(format!("row {index} is not an object")));
    };
    for key in keys {
        match obj.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Bool(b)) => return Ok(Some(*b)),
            Some(Value::Number(n)) => return Ok(n.as_f64().map(|v| v != 0.0)),
            Some(other) => {
                return Err(ComputeError::ParseError(format!(
                    "row {index}: `{key}` must be a boolean, got {other}"
                )))
            }
        }
    }
    Ok(None)
}
