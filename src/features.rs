//! Per-activity metric derivation
//!
//! This module derives the flat metric map for one prepared stream:
//! - Power: average/max, per kg, normalized power, intensity factor, TSS, variability index,
//!   time above 90 % FTP and in the sweet spot
//! - Heart rate: average/max, hrTSS, efficiency factor, estimated FTHR
//! - Cadence, speed, distance, elevation and climbing; normalized graded pace for runs
//! - Zone percentages and the three-zone intensity distribution
//! - Fatigue and durability, W' balance, best efforts per duration
//!
//! Every metric is computed once over all samples (`raw_`) and once over
//! moving samples only (`moving_`). A missing or all-zero column still
//! yields its metric keys, set to 0. Zone and power-curve keys are the
//! exception: they only appear when the column has data.

use crate::aggregate::{TimeWeightedAggregator, TimeWeights};
use crate::config::AthleteConfig;
use crate::fatigue::FatigueAnalyzer;
use crate::power_curve::{interval_name, PowerCurveEngine};
use crate::types::{Channel, MetricMode, SportType, Stream};
use crate::zones::{ThreeZoneDistribution, ZoneClassifier, ZoneCollapse};
use std::collections::BTreeMap;

/// Rolling window for normalized power, in samples
pub const NP_ROLLING_WINDOW: usize = 30;

/// Minimum valid power samples before normalized power is reported
pub const MIN_NP_SAMPLES: usize = 30;

/// Grade (%) above which power counts as climbing power
pub const CLIMBING_GRADE_THRESHOLD: f64 = 4.0;

/// Fraction of FTP above which time counts toward `time_above_90_ftp`
pub const THRESHOLD_FRACTION: f64 = 0.90;

/// Sweet-spot band as fractions of FTP, inclusive
pub const SWEET_SPOT_FRACTIONS: (f64, f64) = (0.88, 0.94);

/// Speed gain per unit of grade for normalized graded pace
pub const GRADE_ADJUSTMENT_FACTOR: f64 = 0.5;

const POWER_KEYS: [&str; 10] = [
    "average_power",
    "max_power",
    "power_per_kg",
    "normalized_power",
    "intensity_factor",
    "training_stress_score",
    "variability_index",
    "time_above_90_ftp",
    "time_sweet_spot",
    "estimated_ftp",
];

const HR_KEYS: [&str; 3] = ["average_hr", "max_hr", "hr_training_stress"];

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Metric deriver for one activity stream
pub struct MetricDeriver;

impl MetricDeriver {
    /// Both metric sets, keys prefixed with `raw_` / `moving_`
    pub fn derive(stream: &Stream, config: &AthleteConfig, sport: SportType) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        let moving_time =
            TimeWeightedAggregator::total_duration(&TimeWeights::from_stream(stream, MetricMode::Moving));

        for mode in MetricMode::all() {
            let weights = TimeWeights::from_stream(stream, mode);
            for (name, value) in Self::derive_mode(stream, config, sport, &weights) {
                metrics.insert(format!("{}{}", mode.prefix(), name), value);
            }
            metrics.insert(format!("{}moving_time", mode.prefix()), moving_time);
        }
        metrics
    }

    /// One metric set over the samples selected by `weights`, unprefixed
    pub fn derive_mode(
        stream: &Stream,
        config: &AthleteConfig,
        sport: SportType,
        weights: &TimeWeights,
    ) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = Vec::new();
        let duration = TimeWeightedAggregator::total_duration(weights);
        out.push(("total_time".to_string(), duration));

        let power = positive_channel(stream, Channel::Power);
        let heart_rate = positive_channel(stream, Channel::HeartRate);
        let grade = stream.channel(Channel::Grade);

        match &power {
            Some(power) => {
                out.extend(compute_power_metrics(power, weights, config, duration));
                out.extend(compute_zone_metrics(
                    "power",
                    power,
                    weights,
                    &config.power_zone_edges(),
                    ZoneCollapse::POWER,
                ));
                for point in PowerCurveEngine::activity_curve(power, weights, &config.power_curve_durations) {
                    out.push((
                        format!("power_curve_{}", interval_name(point.duration_seconds)),
                        point.best_mean_value,
                    ));
                }
            }
            None => out.extend(zeroed(&POWER_KEYS)),
        }

        match &heart_rate {
            Some(hr) => {
                out.extend(compute_hr_metrics(hr, weights, config, duration));
                out.extend(compute_zone_metrics(
                    "hr",
                    hr,
                    weights,
                    &config.hr_zone_edges(),
                    ZoneCollapse::HEART_RATE,
                ));
            }
            None => out.extend(zeroed(&HR_KEYS)),
        }

        let (ef, fthr) = match (&power, &heart_rate) {
            (Some(power), Some(hr)) => {
                let np = normalized_power(power, weights);
                let avg_hr = TimeWeightedAggregator::weighted_mean(hr, weights);
                let ef = if np > 0.0 && avg_hr > 0.0 { np / avg_hr } else { 0.0 };
                (ef, PowerCurveEngine::estimated_fthr(power, hr, weights).unwrap_or(0.0))
            }
            _ => (0.0, 0.0),
        };
        out.push(("efficiency_factor".to_string(), ef));
        out.push(("estimated_fthr".to_string(), fthr));

        let report = FatigueAnalyzer::analyze(
            power.as_deref(),
            heart_rate.as_deref(),
            weights,
            config.cp_model(),
        );
        out.extend(report.entries().into_iter().map(|(k, v)| (k.to_string(), v)));

        let speed = stream.channel(Channel::Speed);
        for (name, values) in [("cadence", stream.channel(Channel::Cadence)), ("speed", speed.clone())] {
            match values {
                Some(values) => out.extend(compute_average_and_max(name, &values, weights)),
                None => {
                    out.push((format!("average_{name}"), 0.0));
                    out.push((format!("max_{name}"), 0.0));
                }
            }
        }

        if sport.is_running() {
            let ngp = speed
                .as_deref()
                .map_or(0.0, |v| normalized_graded_pace(v, grade.as_deref(), weights));
            out.push(("normalized_graded_pace".to_string(), ngp));
        }

        let distance = stream.channel(Channel::Distance).and_then(|distance| {
            weights.indices().last().and_then(|i| distance.get(i).copied())
        });
        out.push(("distance".to_string(), distance.unwrap_or(0.0)));

        match stream.channel(Channel::Altitude) {
            Some(altitude) => {
                out.push((
                    "elevation_gain".to_string(),
                    TimeWeightedAggregator::positive_gain(&altitude, weights),
                ));
                out.extend(compute_climbing_metrics(
                    &altitude,
                    grade.as_deref(),
                    power.as_deref(),
                    weights,
                    config.weight_kg,
                ));
            }
            None => out.extend(zeroed(&[
                "elevation_gain",
                "vam",
                "climbing_time",
                "climbing_power",
                "climbing_power_per_kg",
            ])),
        }

        out
    }
}

fn zeroed(keys: &[&str]) -> Vec<(String, f64)> {
    keys.iter().map(|k| (k.to_string(), 0.0)).collect()
}

/// Channel values when at least one sample is above zero
fn positive_channel(stream: &Stream, channel: Channel) -> Option<Vec<f64>> {
    stream
        .channel(channel)
        .filter(|values| values.iter().any(|v| *v > 0.0))
}

/// Normalized power over included samples.
///
/// Samples with power above zero feed a 30-sample rolling mean; the fourth
/// powers of the rolled values are time-weighted and the fourth root taken.
/// Returns 0 with fewer than 30 valid samples.
pub fn normalized_power(power: &[f64], weights: &TimeWeights) -> f64 {
    let valid: Vec<(f64, f64)> = weights
        .indices()
        .filter_map(|i| power.get(i).map(|&p| (p, weights.weights[i])))
        .filter(|(p, _)| *p > 0.0)
        .collect();
    if valid.len() < MIN_NP_SAMPLES {
        return 0.0;
    }

    let mut window_sum = 0.0;
    let mut weighted_fourth = 0.0;
    let mut total_weight = 0.0;
    let mut plain_fourth = 0.0;
    for (i, &(p, w)) in valid.iter().enumerate() {
        window_sum += p;
        if i >= NP_ROLLING_WINDOW {
            window_sum -= valid[i - NP_ROLLING_WINDOW].0;
        }
        let rolled = window_sum / (i + 1).min(NP_ROLLING_WINDOW) as f64;
        let fourth = rolled * rolled * rolled * rolled;
        plain_fourth += fourth;
        if w > 0.0 {
            weighted_fourth += fourth * w;
            total_weight += w;
        }
    }

    let mean_fourth = if total_weight > 0.0 {
        weighted_fourth / total_weight
    } else {
        plain_fourth / valid.len() as f64
    };
    let np = mean_fourth.sqrt().sqrt();
    if np.is_finite() {
        np
    } else {
        0.0
    }
}

fn compute_power_metrics(
    power: &[f64],
    weights: &TimeWeights,
    config: &AthleteConfig,
    duration: f64,
) -> Vec<(String, f64)> {
    let average = TimeWeightedAggregator::weighted_mean(power, weights);
    let np = normalized_power(power, weights);

    let (intensity_factor, tss) = if np > 0.0 && config.ftp > 0.0 {
        let intensity = np / config.ftp;
        (
            intensity,
            np * intensity * duration / (config.ftp * SECONDS_PER_HOUR) * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    let variability_index = if np > 0.0 && average > 0.0 { np / average } else { 0.0 };

    let (time_above_threshold, time_sweet_spot) = if config.ftp > 0.0 {
        let (low, high) = (SWEET_SPOT_FRACTIONS.0 * config.ftp, SWEET_SPOT_FRACTIONS.1 * config.ftp);
        (
            time_where(power, weights, |p| p > THRESHOLD_FRACTION * config.ftp),
            time_where(power, weights, |p| p >= low && p <= high),
        )
    } else {
        (0.0, 0.0)
    };

    vec![
        ("average_power".to_string(), average),
        (
            "max_power".to_string(),
            TimeWeightedAggregator::weighted_max_excluding_zero(power, weights),
        ),
        ("power_per_kg".to_string(), average / config.weight_kg),
        ("normalized_power".to_string(), np),
        ("intensity_factor".to_string(), intensity_factor),
        ("training_stress_score".to_string(), tss),
        ("variability_index".to_string(), variability_index),
        ("time_above_90_ftp".to_string(), time_above_threshold),
        ("time_sweet_spot".to_string(), time_sweet_spot),
        (
            "estimated_ftp".to_string(),
            PowerCurveEngine::estimated_ftp(power, weights).unwrap_or(0.0),
        ),
    ]
}

/// Included seconds whose value satisfies `keep`
fn time_where<F>(values: &[f64], weights: &TimeWeights, keep: F) -> f64
where
    F: Fn(f64) -> bool,
{
    weights
        .indices()
        .filter(|&i| values.get(i).is_some_and(|&v| keep(v)))
        .map(|i| weights.weights[i])
        .sum()
}

/// Time-weighted mean of grade-adjusted speed over moving samples.
///
/// Grade is in percent; each sample's speed is scaled by
/// `1 + GRADE_ADJUSTMENT_FACTOR * grade / 100`. Missing grade counts as flat.
pub fn normalized_graded_pace(speed: &[f64], grade: Option<&[f64]>, weights: &TimeWeights) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for i in weights.indices() {
        let Some(&v) = speed.get(i) else { continue };
        if v <= 0.0 {
            continue;
        }
        let g = grade.and_then(|g| g.get(i).copied()).unwrap_or(0.0);
        let adjusted = (v * (1.0 + GRADE_ADJUSTMENT_FACTOR * g / 100.0)).max(0.0);
        weighted += adjusted * weights.weights[i];
        total += weights.weights[i];
    }
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

fn compute_hr_metrics(
    hr: &[f64],
    weights: &TimeWeights,
    config: &AthleteConfig,
    duration: f64,
) -> Vec<(String, f64)> {
    let average = TimeWeightedAggregator::weighted_mean(hr, weights);
    let hr_tss = if config.fthr > 0.0 && average > 0.0 {
        let intensity = average / config.fthr;
        intensity * intensity * duration / SECONDS_PER_HOUR * 100.0
    } else {
        0.0
    };

    vec![
        ("average_hr".to_string(), average),
        (
            "max_hr".to_string(),
            TimeWeightedAggregator::weighted_max_excluding_zero(hr, weights),
        ),
        ("hr_training_stress".to_string(), hr_tss),
    ]
}

/// `{metric}_z{n}_percentage` per fine zone plus the three-zone view
fn compute_zone_metrics(
    metric: &str,
    values: &[f64],
    weights: &TimeWeights,
    edges: &[f64],
    collapse: ZoneCollapse,
) -> Vec<(String, f64)> {
    if edges.is_empty() || edges.iter().all(|e| *e <= 0.0) {
        return Vec::new();
    }

    let classifier = ZoneClassifier::new(edges);
    let fine = classifier.distribution(values, weights);
    let mut out: Vec<(String, f64)> = fine
        .percentages
        .iter()
        .enumerate()
        .map(|(i, pct)| (format!("{metric}_z{}_percentage", i + 1), *pct))
        .collect();

    let tid = ThreeZoneDistribution::from_fine(&fine, collapse);
    out.push((format!("{metric}_tid_z1_percentage"), tid.z1_percent));
    out.push((format!("{metric}_tid_z2_percentage"), tid.z2_percent));
    out.push((format!("{metric}_tid_z3_percentage"), tid.z3_percent));
    if let Some(pi) = tid.polarization_index() {
        out.push((format!("{metric}_polarization_index"), pi));
    }
    if let Some(tdr) = tid.distribution_ratio() {
        out.push((format!("{metric}_tdr"), tdr));
    }
    out.push((format!("{metric}_tid_classification"), tid.classification().code()));
    out
}

/// Time-weighted average over the whole series and max excluding zeros; both 0 without valid data
fn compute_average_and_max(name: &str, values: &[f64], weights: &TimeWeights) -> Vec<(String, f64)> {
    let max = TimeWeightedAggregator::weighted_max_excluding_zero(values, weights);
    let average = if max > 0.0 {
        TimeWeightedAggregator::weighted_mean(values, weights)
    } else {
        0.0
    };
    vec![
        (format!("average_{name}"), average),
        (format!("max_{name}"), max),
    ]
}

/// VAM and climbing time from ascending segments, climbing power above the grade threshold
fn compute_climbing_metrics(
    altitude: &[f64],
    grade: Option<&[f64]>,
    power: Option<&[f64]>,
    weights: &TimeWeights,
    weight_kg: f64,
) -> Vec<(String, f64)> {
    let mut gain = 0.0;
    let mut climbing_time = 0.0;
    let mut prev: Option<usize> = None;
    for i in weights.indices() {
        if let Some(p) = prev {
            let diff = altitude[i] - altitude[p];
            if diff > 0.0 {
                gain += diff;
                climbing_time += weights.weights[p];
            }
        }
        prev = Some(i);
    }

    let vam = if climbing_time > 0.0 {
        gain / climbing_time * SECONDS_PER_HOUR
    } else {
        0.0
    };
    let climbing_power = match (grade, power) {
        (Some(grade), Some(power)) => {
            let on_climbs =
                weights.restricted(|i| grade.get(i).is_some_and(|g| *g > CLIMBING_GRADE_THRESHOLD));
            TimeWeightedAggregator::weighted_mean_where(power, &on_climbs, |p| p > 0.0)
        }
        _ => 0.0,
    };

    vec![
        ("vam".to_string(), vam),
        ("climbing_time".to_string(), climbing_time),
        ("climbing_power".to_string(), climbing_power),
        ("climbing_power_per_kg".to_string(), climbing_power / weight_kg),
    ]
}
