//! Stream preparation
//!
//! Turns adapter columns into time-ordered samples:
//! - Forward time deltas per sample (the last delta is 0)
//! - Gap detection: a sample whose preceding delta exceeds the threshold is non-moving,
//!   as is any sample the device recorded as stopped
//! - Boundary validation of offsets and column lengths

use crate::error::ComputeError;
use crate::types::{Channel, Sample, Stream, StreamColumns};
use tracing::debug;

/// Stream preparer for computing deltas and moving flags
pub struct StreamPreparer;

impl StreamPreparer {
    /// Prepare columns into a stream using the given gap threshold (seconds)
    pub fn prepare(columns: &StreamColumns, gap_threshold: f64) -> Result<Stream, ComputeError> {
        validate_columns(columns)?;

        let offsets = &columns.time;
        let deltas = compute_deltas(offsets);
        let mut moving = compute_moving(&deltas, gap_threshold);
        if let Some(recorded) = &columns.moving {
            for (flag, &was_moving) in moving.iter_mut().zip(recorded) {
                *flag &= was_moving;
            }
        }

        let value_at = |channel: Channel, i: usize| columns.column(channel).map(|c| c[i]);

        let samples: Vec<Sample> = offsets
            .iter()
            .enumerate()
            .map(|(i, &offset)| Sample {
                offset_seconds: offset,
                power: value_at(Channel::Power, i),
                heart_rate: value_at(Channel::HeartRate, i),
                cadence: value_at(Channel::Cadence, i),
                speed: value_at(Channel::Speed, i),
                altitude: value_at(Channel::Altitude, i),
                distance: value_at(Channel::Distance, i),
                grade: value_at(Channel::Grade, i),
                moving: moving[i],
            })
            .collect();

        let stream = Stream {
            samples,
            deltas,
            gap_threshold,
        };

        debug!(
            samples = stream.len(),
            gaps = stream.gap_count(),
            "prepared stream"
        );

        Ok(stream)
    }
}

/// `Δt[i] = offset[i+1] - offset[i]`, last element 0
pub fn compute_deltas(offsets: &[f64]) -> Vec<f64> {
    let mut deltas: Vec<f64> = offsets.windows(2).map(|w| w[1] - w[0]).collect();
    if !offsets.is_empty() {
        deltas.push(0.0);
    }
    deltas
}

/// First sample is moving; every later sample is moving iff the preceding delta is within threshold
pub fn compute_moving(deltas: &[f64], gap_threshold: f64) -> Vec<bool> {
    let mut moving = Vec::with_capacity(deltas.len());
    for i in 0..deltas.len() {
        if i == 0 {
            moving.push(true);
        } else {
            moving.push(deltas[i - 1] <= gap_threshold);
        }
    }
    moving
}

fn validate_columns(columns: &StreamColumns) -> Result<(), ComputeError> {
    let n = columns.time.len();

    if let Some(bad) = columns.time.iter().position(|t| !t.is_finite()) {
        return Err(ComputeError::InvalidStream(format!(
            "non-finite time offset at index {bad}"
        )));
    }
    if let Some(bad) = columns.time.windows(2).position(|w| w[1] < w[0]) {
        return Err(ComputeError::InvalidStream(format!(
            "time offsets decrease at index {}",
            bad + 1
        )));
    }

    let channels = [
        (Channel::Power, "power"),
        (Channel::HeartRate, "heart_rate"),
        (Channel::Cadence, "cadence"),
        (Channel::Speed, "speed"),
        (Channel::Altitude, "altitude"),
        (Channel::Distance, "distance"),
        (Channel::Grade, "grade"),
    ];
    if let Some(recorded) = &columns.moving {
        if recorded.len() != n {
            return Err(ComputeError::InvalidStream(format!(
                "column moving has {} values, time has {n}",
                recorded.len()
            )));
        }
    }

    for (channel, name) in channels {
        if let Some(column) = columns.column(channel) {
            if column.len() != n {
                return Err(ComputeError::InvalidStream(format!(
                    "column {name} has {} values, time has {n}",
                    column.len()
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_columns(time: Vec<f64>, power: Vec<f64>) -> StreamColumns {
        StreamColumns {
            time,
            power: Some(power),
            ..Default::default()
        }
    }

    #[test]
    fn test_deltas_and_gap_marking() {
        let columns = make_columns(
            vec![0.0, 1.0, 2.0, 13.0, 14.0],
            vec![100.0, 200.0, 0.0, 300.0, 300.0],
        );
        let stream = StreamPreparer::prepare(&columns, 2.0).unwrap();

        assert_eq!(stream.deltas, vec![1.0, 1.0, 11.0, 1.0, 0.0]);
        assert_eq!(stream.moving_mask(), vec![true, true, true, false, true]);
        assert_eq!(stream.gap_count(), 1);
    }

    #[test]
    fn test_recorded_stops_combine_with_gaps() {
        let mut columns = make_columns(vec![0.0, 1.0, 2.0, 3.0], vec![100.0; 4]);
        columns.moving = Some(vec![true, false, false, true]);
        let stream = StreamPreparer::prepare(&columns, 2.0).unwrap();
        assert_eq!(stream.moving_mask(), vec![true, false, false, true]);

        let mut gapped = make_columns(vec![0.0, 1.0, 10.0, 11.0], vec![100.0; 4]);
        gapped.moving = Some(vec![true, false, true, true]);
        let stream = StreamPreparer::prepare(&gapped, 2.0).unwrap();
        assert_eq!(stream.moving_mask(), vec![true, false, false, true]);
    }

    #[test]
    fn test_recorded_moving_length_mismatch_rejected() {
        let mut columns = make_columns(vec![0.0, 1.0], vec![1.0, 1.0]);
        columns.moving = Some(vec![true]);
        let err = StreamPreparer::prepare(&columns, 2.0).unwrap_err();
        assert!(matches!(err, ComputeError::InvalidStream(_)));
    }

    #[test]
    fn test_delta_equal_to_threshold_is_moving() {
        let stream =
            StreamPreparer::prepare(&make_columns(vec![0.0, 2.0, 4.0], vec![1.0; 3]), 2.0).unwrap();
        assert!(stream.samples.iter().all(|s| s.moving));
    }

    #[test]
    fn test_sum_of_deltas_is_span() {
        let time = vec![0.0, 0.5, 3.0, 3.25, 10.0, 11.0];
        let stream = StreamPreparer::prepare(&make_columns(time, vec![1.0; 6]), 2.0).unwrap();
        let total: f64 = stream.deltas.iter().sum();
        assert!((total - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_lengths() {
        let empty = StreamPreparer::prepare(&StreamColumns::default(), 2.0).unwrap();
        assert!(empty.is_empty());
        assert!(empty.deltas.is_empty());

        let single = StreamPreparer::prepare(&make_columns(vec![5.0], vec![250.0]), 2.0).unwrap();
        assert_eq!(single.deltas, vec![0.0]);
        assert!(single.samples[0].moving);
    }

    #[test]
    fn test_decreasing_offsets_rejected() {
        let err = StreamPreparer::prepare(&make_columns(vec![0.0, 2.0, 1.0], vec![1.0; 3]), 2.0)
            .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidStream(_)));
    }

    #[test]
    fn test_column_length_mismatch_rejected() {
        let err = StreamPreparer::prepare(&make_columns(vec![0.0, 1.0], vec![1.0]), 2.0)
            .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidStream(_)));
    }

    #[test]
    fn test_absent_channels_stay_absent() {
        let stream =
            StreamPreparer::prepare(&make_columns(vec![0.0, 1.0], vec![100.0, 110.0]), 2.0).unwrap();
        assert_eq!(stream.samples[0].heart_rate, None);
        assert_eq!(stream.samples[1].power, Some(110.0));
    }
}
