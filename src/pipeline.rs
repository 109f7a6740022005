//! Pipeline orchestration
//!
//! This module provides the public API for the engine:
//! - Per-activity analysis: payload → stream → flat metric record
//! - Batch analysis, parallel with the `parallel` feature
//! - `AthleteTimeline`: one athlete's date-ordered history with training load,
//!   rolling best efforts, critical power and zone backpropagation

use crate::adapters::parse_stream_value;
use crate::config::{AthleteConfig, FTP_ESTIMATE_WINDOW_DAYS};
use crate::error::ComputeError;
use crate::features::MetricDeriver;
use crate::power_curve::{interval_name, CpFitter, RollingPowerCurve};
use crate::prepare::StreamPreparer;
use crate::training_load::{AcwrStatus, FormStatus, LoadTimeline};
use crate::types::{
    ActivityMeta, ActivityRecord, CriticalPowerModel, PowerCurvePoint, StreamColumns,
    TrainingLoadState, ZoneBins, ZoneConfiguration,
};
use crate::zone_history::{BackpropagationOutcome, ZoneBoundaryHistoryManager, ZoneTarget};
use crate::zones::ThreeZoneDistribution;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One activity as supplied to the engine: metadata plus its raw stream payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityInput {
    #[serde(flatten)]
    pub meta: ActivityMeta,
    /// Column object, typed stream list or row array
    pub streams: serde_json::Value,
}

/// Analyze already-parsed columns into a record.
///
/// Pipeline stages:
/// 1. StreamPreparer - deltas and moving flags
/// 2. MetricDeriver - raw and moving metric sets
///
/// Zone bins stay unset; `AthleteTimeline::apply_zone_configuration` assigns them.
pub fn analyze_stream(
    meta: &ActivityMeta,
    columns: &StreamColumns,
    config: &AthleteConfig,
) -> Result<ActivityRecord, ComputeError> {
    let stream = StreamPreparer::prepare(columns, config.gap_threshold_seconds)?;

    let mut record = ActivityRecord::new(meta.id, meta.start_date, meta.sport_type);
    record.metrics = MetricDeriver::derive(&stream, config, meta.sport_type);
    Ok(record)
}

/// Analyze one activity; a malformed payload yields a record with no metrics
pub fn analyze_activity(input: &ActivityInput, config: &AthleteConfig) -> ActivityRecord {
    let result = parse_stream_value(input.streams.clone())
        .and_then(|columns| analyze_stream(&input.meta, &columns, config));

    match result {
        Ok(record) => record,
        Err(e) => {
            warn!(
                activity_id = input.meta.id,
                sport = input.meta.sport_type.as_str(),
                error = %e,
                "activity analysis failed"
            );
            ActivityRecord::new(input.meta.id, input.meta.start_date, input.meta.sport_type)
        }
    }
}

/// Analyze many activities independently, preserving input order
pub fn analyze_batch(inputs: &[ActivityInput], config: &AthleteConfig) -> Vec<ActivityRecord> {
    #[cfg(feature = "parallel")]
    let records: Vec<ActivityRecord> = {
        use rayon::prelude::*;
        debug!(count = inputs.len(), "analyzing batch in parallel");
        inputs
            .par_iter()
            .map(|input| analyze_activity(input, config))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let records: Vec<ActivityRecord> = {
        debug!(count = inputs.len(), "analyzing batch sequentially");
        inputs
            .iter()
            .map(|input| analyze_activity(input, config))
            .collect()
    };

    records
}

/// Load input of one record: power TSS, falling back to hrTSS
pub fn training_load_input(record: &ActivityRecord) -> f64 {
    [
        "moving_training_stress_score",
        "raw_training_stress_score",
        "moving_hr_training_stress",
        "raw_hr_training_stress",
    ]
    .iter()
    .filter_map(|k| record.metric(k))
    .find(|v| *v > 0.0)
    .unwrap_or(0.0)
}

/// Moving-mode best efforts stored on a record
pub fn record_curve(record: &ActivityRecord, durations: &[u32]) -> Vec<PowerCurvePoint> {
    durations
        .iter()
        .filter_map(|&d| {
            record
                .metric(&format!("moving_power_curve_{}", interval_name(d)))
                .map(|v| PowerCurvePoint {
                    duration_seconds: d,
                    best_mean_value: v,
                })
        })
        .collect()
}

/// Duration-weighted three-zone distribution of one calendar week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTid {
    /// Monday of the week
    pub week_start: NaiveDate,
    pub activity_count: usize,
    pub distribution: ThreeZoneDistribution,
    pub polarization_index: Option<f64>,
    pub distribution_ratio: Option<f64>,
    pub classification: String,
}

/// Snapshot of an athlete's longitudinal state as of a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalSummary {
    pub as_of: NaiveDate,
    pub activity_count: usize,
    pub training_load: Option<TrainingLoadState>,
    pub acwr_status: Option<AcwrStatus>,
    pub form_status: Option<FormStatus>,
    pub power_curve: Vec<PowerCurvePoint>,
    pub critical_power: Option<CriticalPowerModel>,
    pub estimated_ftp: Option<f64>,
    /// Threshold heart rate from the ride behind `estimated_ftp`
    #[serde(default)]
    pub estimated_fthr: Option<f64>,
}

/// One athlete's date-ordered activity history.
///
/// Each athlete gets an independent timeline; nothing is shared between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteTimeline {
    config: AthleteConfig,
    /// Ascending by start time, then id
    records: Vec<ActivityRecord>,
    load: LoadTimeline,
}

impl AthleteTimeline {
    /// Create an empty timeline; the configuration is validated first
    pub fn new(config: AthleteConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let load = LoadTimeline::new(config.acute_window_days, config.chronic_window_days);
        Ok(Self {
            config,
            records: Vec::new(),
            load,
        })
    }

    pub fn config(&self) -> &AthleteConfig {
        &self.config
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub fn record(&self, id: u64) -> Option<&ActivityRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn load_states(&self) -> &[TrainingLoadState] {
        self.load.states()
    }

    /// Analyze and insert one activity
    pub fn add_activity(&mut self, input: &ActivityInput) -> &ActivityRecord {
        let record = analyze_activity(input, &self.config);
        self.insert_record(record)
    }

    /// Analyze a batch, then insert every record
    pub fn add_activities(&mut self, inputs: &[ActivityInput]) -> usize {
        let records = analyze_batch(inputs, &self.config);
        let count = records.len();
        for record in records {
            self.insert_record(record);
        }
        count
    }

    /// Insert or replace a record by id and re-fold the load from the affected dates
    pub fn insert_record(&mut self, record: ActivityRecord) -> &ActivityRecord {
        let previous_date = self.take_record(record.id).map(|r| r.date());

        let idx = self
            .records
            .partition_point(|r| (r.start_date, r.id) < (record.start_date, record.id));
        let date = record.date();
        self.records.insert(idx, record);

        if let Some(old) = previous_date.filter(|d| *d != date) {
            self.refresh_day(old);
        }
        self.refresh_day(date);
        &self.records[idx]
    }

    /// Remove a record by id
    pub fn remove_activity(&mut self, id: u64) -> Option<ActivityRecord> {
        let removed = self.take_record(id)?;
        self.refresh_day(removed.date());
        Some(removed)
    }

    fn take_record(&mut self, id: u64) -> Option<ActivityRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    /// Recompute the daily load total of `date` and re-fold from there
    fn refresh_day(&mut self, date: NaiveDate) {
        let day: Vec<&ActivityRecord> = self.records.iter().filter(|r| r.date() == date).collect();
        if day.is_empty() {
            self.load.remove_day(date);
        } else {
            let total: f64 = day.iter().map(|r| training_load_input(r)).sum();
            self.load.set_load(date, total);
        }
    }

    /// Training load on `date`, decayed forward from the last activity day
    pub fn load_on(&self, date: NaiveDate) -> Option<TrainingLoadState> {
        self.load.state_on(date)
    }

    /// Rolling best efforts of rides over the window ending at `as_of`
    pub fn power_curve_as_of(&self, as_of: NaiveDate) -> RollingPowerCurve {
        let durations = &self.config.power_curve_durations;
        let mut curve = RollingPowerCurve::new(self.config.rolling_window_days, durations);
        for record in self.records.iter().take_while(|r| r.date() <= as_of) {
            if record.sport_type.is_cycling() {
                curve.push(record.date(), &record_curve(record, durations));
            }
        }
        curve.advance_to(as_of);
        curve
    }

    pub fn critical_power_as_of(&self, as_of: NaiveDate) -> Option<CriticalPowerModel> {
        CpFitter::default().fit(&self.power_curve_as_of(as_of).points())
    }

    /// Highest per-activity FTP estimate from rides in the trailing window
    pub fn estimated_ftp_as_of(&self, as_of: NaiveDate) -> Option<f64> {
        self.best_ftp_record(as_of).map(|(ftp, _)| ftp)
    }

    /// FTHR measured on the ride with the best FTP estimate in the trailing window
    pub fn estimated_fthr_as_of(&self, as_of: NaiveDate) -> Option<f64> {
        self.best_ftp_record(as_of)
            .and_then(|(_, record)| record.metric("moving_estimated_fthr"))
            .filter(|fthr| *fthr > 0.0)
    }

    /// Ties go to the latest ride
    fn best_ftp_record(&self, as_of: NaiveDate) -> Option<(f64, &ActivityRecord)> {
        self.records
            .iter()
            .filter(|r| r.sport_type.is_cycling())
            .filter(|r| {
                let age = (as_of - r.date()).num_days();
                (0..FTP_ESTIMATE_WINDOW_DAYS).contains(&age)
            })
            .filter_map(|r| r.metric("moving_estimated_ftp").filter(|v| *v > 0.0).map(|v| (v, r)))
            .fold(None, |best, (v, r)| match best {
                Some((b, _)) if b > v => best,
                _ => Some((v, r)),
            })
    }

    /// Weekly intensity distribution for `"power"` or `"hr"` zones, weighted by moving time
    pub fn weekly_tid(&self, metric: &str) -> Vec<WeeklyTid> {
        let mut weeks: Vec<(NaiveDate, Vec<(ThreeZoneDistribution, f64)>)> = Vec::new();
        for record in &self.records {
            let get = |z: u8| record.metric(&format!("moving_{metric}_tid_z{z}_percentage"));
            let (Some(z1), Some(z2), Some(z3)) = (get(1), get(2), get(3)) else {
                continue;
            };
            let weight = record.metric("moving_moving_time").unwrap_or(0.0);
            let date = record.date();
            let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
            let dist = ThreeZoneDistribution {
                z1_percent: z1,
                z2_percent: z2,
                z3_percent: z3,
            };
            match weeks.last_mut() {
                Some((week, parts)) if *week == monday => parts.push((dist, weight)),
                _ => weeks.push((monday, vec![(dist, weight)])),
            }
        }

        weeks
            .into_iter()
            .filter_map(|(week_start, parts)| {
                let distribution = ThreeZoneDistribution::combine(&parts)?;
                Some(WeeklyTid {
                    week_start,
                    activity_count: parts.len(),
                    polarization_index: distribution.polarization_index(),
                    distribution_ratio: distribution.distribution_ratio(),
                    classification: distribution.classification().as_str().to_string(),
                    distribution,
                })
            })
            .collect()
    }

    /// Make `zones` the active configuration and propagate it into older history
    pub fn apply_zone_configuration(
        &mut self,
        zones: ZoneConfiguration,
        target: ZoneTarget,
    ) -> BackpropagationOutcome {
        let outcome = ZoneBoundaryHistoryManager::backpropagate(&mut self.records, &zones, target);
        self.records.sort_by(|a, b| (a.start_date, a.id).cmp(&(b.start_date, b.id)));

        match target {
            ZoneTarget::Power => self.config.power_zones = Some(zones),
            ZoneTarget::HeartRate => self.config.hr_zones = Some(zones),
        }
        outcome
    }

    pub fn summary(&self, as_of: NaiveDate) -> LongitudinalSummary {
        let training_load = self.load_on(as_of);
        let curve = self.power_curve_as_of(as_of);
        let power_curve = curve.points();
        let critical_power = CpFitter::default().fit(&power_curve);

        info!(
            %as_of,
            activities = self.records.len(),
            curve_points = power_curve.len(),
            has_cp = critical_power.is_some(),
            "built longitudinal summary"
        );

        LongitudinalSummary {
            as_of,
            activity_count: self.records.iter().filter(|r| r.date() <= as_of).count(),
            acwr_status: training_load.map(|s| AcwrStatus::from_ratio(s.acute_chronic_ratio)),
            form_status: training_load.map(|s| FormStatus::from_balance(s.balance)),
            training_load,
            power_curve,
            critical_power,
            estimated_ftp: self.estimated_ftp_as_of(as_of),
            estimated_fthr: self.estimated_fthr_as_of(as_of),
        }
    }

    /// Load timeline state from JSON
    pub fn load_state(json: &str) -> Result<Self, ComputeError> {
        let timeline: Self =
            serde_json::from_str(json).map_err(|e| ComputeError::ParseError(e.to_string()))?;
        timeline.config.validate()?;
        Ok(timeline)
    }

    /// Save timeline state to JSON
    pub fn save_state(&self) -> Result<String, ComputeError> {
        serde_json::to_string(self).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training_load::TrainingLoadTracker;
    use crate::types::SportType;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 7, 30, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Steady 1 Hz ride: `minutes` at `watts` and `bpm`
    fn make_ride(id: u64, start: DateTime<Utc>, minutes: usize, watts: f64, bpm: f64) -> ActivityInput {
        let n = minutes * 60 + 1;
        ActivityInput {
            meta: ActivityMeta {
                id,
                start_date: start,
                sport_type: SportType::Ride,
            },
            streams: json!({
                "time": (0..n).collect::<Vec<usize>>(),
                "watts": vec![watts; n],
                "heartrate": vec![bpm; n],
            }),
        }
    }

    fn make_config() -> AthleteConfig {
        AthleteConfig {
            ftp: 250.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_analyze_activity_hour_at_threshold() {
        let record = analyze_activity(&make_ride(1, at(2025, 3, 3), 60, 250.0, 150.0), &make_config());

        assert!((record.metric("moving_training_stress_score").unwrap() - 100.0).abs() < 1e-9);
        assert!((record.metric("moving_power_curve_20min").unwrap() - 250.0).abs() < 1e-9);
        assert!((record.metric("moving_estimated_ftp").unwrap() - 237.5).abs() < 1e-9);
        assert!((training_load_input(&record) - 100.0).abs() < 1e-9);
        assert_eq!(record.zone_bins, None);
        assert_eq!(record.hr_zone_bins, None);
    }

    #[test]
    fn test_bad_payload_isolated() {
        let bad = ActivityInput {
            meta: ActivityMeta {
                id: 9,
                start_date: at(2025, 3, 4),
                sport_type: SportType::Run,
            },
            streams: json!({"watts": [1, 2, 3]}),
        };
        let inputs = vec![make_ride(1, at(2025, 3, 3), 10, 200.0, 140.0), bad];
        let records = analyze_batch(&inputs, &make_config());

        assert_eq!(records.len(), 2);
        assert!(!records[0].metrics.is_empty());
        assert_eq!(records[1].id, 9);
        assert!(records[1].metrics.is_empty());
    }

    #[test]
    fn test_timeline_load_matches_tracker_regardless_of_insert_order() {
        let config = make_config();
        let rides = vec![
            make_ride(3, at(2025, 3, 10), 45, 230.0, 145.0),
            make_ride(1, at(2025, 3, 3), 60, 250.0, 150.0),
            make_ride(2, at(2025, 3, 5), 30, 280.0, 160.0),
            make_ride(4, at(2025, 3, 5), 20, 150.0, 120.0),
        ];

        let mut timeline = AthleteTimeline::new(config).unwrap();
        for ride in &rides {
            timeline.add_activity(ride);
        }

        let ids: Vec<u64> = timeline.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);

        let inputs: Vec<(NaiveDate, f64)> = timeline
            .records()
            .iter()
            .map(|r| (r.date(), training_load_input(r)))
            .collect();
        let expected = TrainingLoadTracker::new().calculate_history(&inputs);
        assert_eq!(timeline.load_states(), expected.as_slice());
        assert_eq!(timeline.load_states().len(), 3);
    }

    #[test]
    fn test_replace_and_remove_refold() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        timeline.add_activity(&make_ride(1, at(2025, 3, 3), 60, 250.0, 150.0));
        timeline.add_activity(&make_ride(2, at(2025, 3, 6), 60, 200.0, 140.0));
        let before = timeline.load_states().to_vec();

        // Same id moved to a different day
        timeline.add_activity(&make_ride(1, at(2025, 3, 4), 60, 250.0, 150.0));
        assert_eq!(timeline.records().len(), 2);
        assert_eq!(timeline.load_states()[0].date, day(2025, 3, 4));
        assert_ne!(timeline.load_states(), before.as_slice());

        timeline.remove_activity(1);
        assert_eq!(timeline.load_states().len(), 1);
        assert_eq!(timeline.load_states()[0].date, day(2025, 3, 6));
        assert!(timeline.remove_activity(1).is_none());
    }

    #[test]
    fn test_rolling_curve_and_cp() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        timeline.add_activity(&make_ride(1, at(2025, 1, 2), 70, 240.0, 150.0));
        timeline.add_activity(&make_ride(2, at(2025, 3, 20), 10, 300.0, 165.0));

        let curve = timeline.power_curve_as_of(day(2025, 3, 25));
        assert_eq!(curve.best(60), Some(300.0));
        assert_eq!(curve.best(3600), Some(240.0));

        // The January ride leaves the 90-day window
        let later = timeline.power_curve_as_of(day(2025, 4, 5));
        assert_eq!(later.best(3600), None);
        assert_eq!(later.best(60), Some(300.0));

        // Constant efforts give a flat curve: not enough spread for a physical fit is fine,
        // but a fit must never report negative W'
        if let Some(cp) = timeline.critical_power_as_of(day(2025, 3, 25)) {
            assert!(cp.w_prime >= 0.0);
            assert!((0.0..=1.0).contains(&cp.r_squared));
        }
    }

    #[test]
    fn test_estimated_ftp_window() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        timeline.add_activity(&make_ride(1, at(2025, 3, 1), 25, 300.0, 160.0));
        timeline.add_activity(&make_ride(2, at(2025, 3, 20), 25, 260.0, 155.0));

        assert!((timeline.estimated_ftp_as_of(day(2025, 3, 25)).unwrap() - 285.0).abs() < 1e-9);
        assert!((timeline.estimated_ftp_as_of(day(2025, 4, 20)).unwrap() - 247.0).abs() < 1e-9);
        assert_eq!(timeline.estimated_ftp_as_of(day(2025, 2, 1)), None);
    }

    #[test]
    fn test_estimated_fthr_follows_best_ftp_ride() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        timeline.add_activity(&make_ride(1, at(2025, 3, 1), 25, 300.0, 160.0));
        timeline.add_activity(&make_ride(2, at(2025, 3, 20), 25, 260.0, 155.0));
        // Too short for a 20-minute effort: FTP stays 0 and is ignored
        timeline.add_activity(&make_ride(3, at(2025, 3, 22), 10, 400.0, 180.0));

        assert!((timeline.estimated_fthr_as_of(day(2025, 3, 25)).unwrap() - 160.0).abs() < 1e-9);
        assert!((timeline.estimated_fthr_as_of(day(2025, 4, 20)).unwrap() - 155.0).abs() < 1e-9);
        assert!((timeline.estimated_ftp_as_of(day(2025, 3, 25)).unwrap() - 285.0).abs() < 1e-9);
        assert_eq!(timeline.estimated_fthr_as_of(day(2025, 2, 1)), None);

        let summary = timeline.summary(day(2025, 3, 25));
        assert!((summary.estimated_fthr.unwrap() - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekly_tid_groups_by_week() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        // Monday and Wednesday of one week, then the next Monday
        timeline.add_activity(&make_ride(1, at(2025, 3, 3), 60, 120.0, 120.0));
        timeline.add_activity(&make_ride(2, at(2025, 3, 5), 60, 120.0, 120.0));
        timeline.add_activity(&make_ride(3, at(2025, 3, 10), 30, 300.0, 175.0));

        let weeks = timeline.weekly_tid("power");
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].week_start, day(2025, 3, 3));
        assert_eq!(weeks[0].activity_count, 2);
        assert!((weeks[0].distribution.z1_percent - 100.0).abs() < 1e-9);
        assert_eq!(weeks[0].classification, "polarized");
        assert!((weeks[1].distribution.z3_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zone_configuration_backpropagates_into_history() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        for (id, d) in [(1, 10), (2, 15), (3, 20), (4, 25)] {
            let mut record = ActivityRecord::new(id, at(2025, 11, d), SportType::Ride);
            record.metrics.insert("moving_training_stress_score".to_string(), 50.0);
            timeline.insert_record(record);
        }
        let mut newer = ActivityRecord::new(5, at(2025, 12, 1), SportType::Ride);
        newer.zone_bins = Some(ZoneBins(vec![170.0, 230.0]));
        timeline.insert_record(newer);

        let zones = ZoneConfiguration::new(
            vec![157.0, 214.0, 256.0, 300.0, 342.0],
            Utc.with_ymd_and_hms(2025, 11, 25, 12, 0, 0).unwrap(),
        );
        let outcome = timeline.apply_zone_configuration(zones.clone(), ZoneTarget::Power);

        assert_eq!(outcome.anchor_id, Some(4));
        assert_eq!(outcome.assigned, 4);
        let ids: Vec<u64> = timeline.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(timeline.record(1).unwrap().zone_bins, Some(zones.bins()));
        assert_eq!(
            timeline.record(5).unwrap().zone_bins,
            Some(ZoneBins(vec![170.0, 230.0]))
        );
        assert_eq!(timeline.config().power_zones, Some(zones));
    }

    #[test]
    fn test_analyzed_history_receives_zone_configuration() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        for (id, (m, d)) in [(11, 25), (11, 20), (11, 15), (11, 10), (12, 1)].into_iter().enumerate() {
            timeline.add_activity(&make_ride(id as u64 + 1, at(2025, m, d), 10, 200.0, 140.0));
        }

        let zones = ZoneConfiguration::new(
            vec![157.0, 214.0, 256.0, 300.0, 342.0],
            Utc.with_ymd_and_hms(2025, 11, 25, 12, 0, 0).unwrap(),
        );
        let outcome = timeline.apply_zone_configuration(zones.clone(), ZoneTarget::Power);

        assert_eq!(outcome.anchor_id, Some(1));
        assert_eq!(outcome.assigned, 4);
        for id in 1..=4 {
            assert_eq!(timeline.record(id).unwrap().zone_bins, Some(zones.bins()));
        }
        assert_eq!(timeline.record(5).unwrap().zone_bins, None);
        assert_eq!(timeline.record(5).unwrap().hr_zone_bins, None);
    }

    #[test]
    fn test_summary_and_state_roundtrip() {
        let mut timeline = AthleteTimeline::new(make_config()).unwrap();
        timeline.add_activity(&make_ride(1, at(2025, 3, 3), 60, 250.0, 150.0));
        timeline.add_activity(&make_ride(2, at(2025, 3, 4), 30, 200.0, 140.0));

        let summary = timeline.summary(day(2025, 3, 10));
        assert_eq!(summary.activity_count, 2);
        let load = summary.training_load.unwrap();
        let last = timeline.load_states().last().copied().unwrap();
        assert!(load.acute_load < last.acute_load);
        assert_eq!(summary.acwr_status, Some(AcwrStatus::from_ratio(load.acute_chronic_ratio)));

        let restored = AthleteTimeline::load_state(&timeline.save_state().unwrap()).unwrap();
        assert_eq!(restored.config(), timeline.config());
        assert_eq!(restored.records().len(), 2);
        assert_eq!(restored.load_states().len(), timeline.load_states().len());
        for (a, b) in restored.load_states().iter().zip(timeline.load_states()) {
            assert_eq!(a.date, b.date);
            assert!((a.chronic_load - b.chronic_load).abs() < 1e-9);
            assert!((a.acute_load - b.acute_load).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AthleteConfig {
            weight_kg: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            AthleteTimeline::new(config),
            Err(ComputeError::InvalidConfig(_))
        ));
    }
}
