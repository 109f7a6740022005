//! Fatigue and durability analysis
//!
//! - Power:HR decoupling across the duration midpoint (activities of an hour or more)
//! - First/second half power comparison
//! - Fatigue index from the first and last five minutes of valid power
//! - Sustainability index from the coefficient of variation
//! - Interval decay over consecutive 5-minute blocks
//! - Negative split (second-half over first-half normalized power) and cardiac drift
//! - W' balance (Skiba recovery) with match burn counting

use crate::aggregate::{TimeWeightedAggregator, TimeWeights};
use crate::features::normalized_power;
use crate::power_curve::linear_regression;
use serde::{Deserialize, Serialize};

/// Minimum activity duration for decoupling (seconds)
pub const MIN_DECOUPLING_DURATION: f64 = 3600.0;

/// Power at or below this is treated as coasting / dropout
pub const MIN_VALID_POWER: f64 = 0.0;

/// Heart rate at or below this is treated as dropout
pub const MIN_VALID_HR: f64 = 30.0;

/// Target window for initial/final power (seconds)
pub const FATIGUE_WINDOW: f64 = 300.0;

/// Shortest acceptable initial/final window (seconds)
pub const MIN_FATIGUE_WINDOW: f64 = 60.0;

/// Minimum valid samples for the sustainability index
pub const MIN_SUSTAINABILITY_SAMPLES: usize = 30;

/// Interval length for interval decay (seconds)
pub const INTERVAL_DURATION: f64 = 300.0;

/// Minimum activity duration for the negative split index (seconds)
pub const MIN_SPLIT_DURATION: f64 = 60.0;

/// Minimum activity duration for cardiac drift (seconds)
pub const MIN_CARDIAC_DRIFT_DURATION: f64 = 600.0;

/// W' fraction below which a match is burned
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Recovery above `MATCH_THRESHOLD` needed before another match counts
pub const MATCH_HYSTERESIS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decoupling {
    pub first_half_ef: f64,
    pub second_half_ef: f64,
    /// `(ef2 - ef1) / ef1 * 100`; negative means output dropped relative to HR
    pub decoupling_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfComparison {
    pub first_half_power: f64,
    pub second_half_power: f64,
    pub power_drop_pct: f64,
    pub half_power_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatigueIndex {
    pub initial_power: f64,
    pub final_power: f64,
    /// `(initial - final) / initial * 100`
    pub fatigue_index: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sustainability {
    pub coefficient_of_variation: f64,
    /// `max(0, 100 - cv)`
    pub sustainability_index: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalFatigue {
    pub first_interval_power: f64,
    pub last_interval_power: f64,
    pub decay_rate: f64,
    /// Least-squares slope of interval means, as percent of their mean per interval
    pub power_trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WPrimeBalance {
    /// Lowest remaining W' (J)
    pub min_balance: f64,
    pub match_burns: usize,
}

/// Everything the analyzer could compute for one stream and mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueReport {
    pub decoupling: Option<Decoupling>,
    pub halves: Option<HalfComparison>,
    pub fatigue: Option<FatigueIndex>,
    pub sustainability: Option<Sustainability>,
    pub intervals: Option<IntervalFatigue>,
    /// NP second half / NP first half
    pub negative_split: Option<f64>,
    /// Percent change of efficiency factor from first to second half
    pub cardiac_drift: Option<f64>,
    pub w_prime_balance: Option<WPrimeBalance>,
}

impl FatigueReport {
    /// Flat `(name, value)` pairs for the metric map.
    ///
    /// Split, drift and W' entries are always present: even pacing (1), no drift
    /// and an untouched W' (0) stand in when they could not be computed.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![
            ("negative_split_index", self.negative_split.unwrap_or(1.0)),
            ("cardiac_drift", self.cardiac_drift.unwrap_or(0.0)),
            (
                "w_prime_balance_min",
                self.w_prime_balance.map_or(0.0, |w| w.min_balance),
            ),
            (
                "match_burn_count",
                self.w_prime_balance.map_or(0.0, |w| w.match_burns as f64),
            ),
        ];
        if let Some(d) = &self.decoupling {
            out.push(("first_half_ef", d.first_half_ef));
            out.push(("second_half_ef", d.second_half_ef));
            out.push(("power_hr_decoupling", d.decoupling_pct));
        }
        if let Some(h) = &self.halves {
            out.push(("first_half_power", h.first_half_power));
            out.push(("second_half_power", h.second_half_power));
            out.push(("power_drop_percentage", h.power_drop_pct));
            out.push(("half_power_ratio", h.half_power_ratio));
        }
        if let Some(f) = &self.fatigue {
            out.push(("initial_5min_power", f.initial_power));
            out.push(("final_5min_power", f.final_power));
            out.push(("fatigue_index", f.fatigue_index));
        }
        if let Some(s) = &self.sustainability {
            out.push(("power_coefficient_variation", s.coefficient_of_variation));
            out.push(("power_sustainability_index", s.sustainability_index));
        }
        if let Some(i) = &self.intervals {
            out.push(("interval_300s_first_power", i.first_interval_power));
            out.push(("interval_300s_last_power", i.last_interval_power));
            out.push(("interval_300s_decay_rate", i.decay_rate));
            out.push(("interval_300s_power_trend", i.power_trend));
        }
        out
    }
}

/// Fatigue analyzer over one stream's power and heart-rate columns
pub struct FatigueAnalyzer;

impl FatigueAnalyzer {
    /// `cp_model` is `(cp, w_prime)`; W' balance is skipped without it
    pub fn analyze(
        power: Option<&[f64]>,
        heart_rate: Option<&[f64]>,
        weights: &TimeWeights,
        cp_model: Option<(f64, f64)>,
    ) -> FatigueReport {
        let Some(power) = power else {
            return FatigueReport::default();
        };

        FatigueReport {
            decoupling: heart_rate.and_then(|hr| Self::decoupling(power, hr, weights)),
            halves: Self::half_comparison(power, weights),
            fatigue: Self::fatigue_index(power, weights),
            sustainability: Self::sustainability(power, weights),
            intervals: Self::interval_fatigue(power, weights),
            negative_split: Self::negative_split(power, weights),
            cardiac_drift: heart_rate.and_then(|hr| Self::cardiac_drift(power, hr, weights)),
            w_prime_balance: cp_model
                .and_then(|(cp, w_prime)| Self::w_prime_balance(power, weights, cp, w_prime)),
        }
    }

    /// Efficiency factor (NP / mean HR) per half; None below one hour or with no first-half EF
    pub fn decoupling(power: &[f64], heart_rate: &[f64], weights: &TimeWeights) -> Option<Decoupling> {
        let total = TimeWeightedAggregator::total_duration(weights);
        if total < MIN_DECOUPLING_DURATION {
            return None;
        }

        let (first_half_ef, second_half_ef) = half_efficiency(power, heart_rate, weights, total)?;
        Some(Decoupling {
            first_half_ef,
            second_half_ef,
            decoupling_pct: (second_half_ef - first_half_ef) / first_half_ef * 100.0,
        })
    }

    /// Efficiency factor change between halves for activities of ten minutes or more
    pub fn cardiac_drift(power: &[f64], heart_rate: &[f64], weights: &TimeWeights) -> Option<f64> {
        let total = TimeWeightedAggregator::total_duration(weights);
        if total < MIN_CARDIAC_DRIFT_DURATION {
            return None;
        }
        let (first, second) = half_efficiency(power, heart_rate, weights, total)?;
        Some((second - first) / first * 100.0)
    }

    /// Normalized power of the second half over the first; above 1 means a stronger finish
    pub fn negative_split(power: &[f64], weights: &TimeWeights) -> Option<f64> {
        let total = TimeWeightedAggregator::total_duration(weights);
        if total < MIN_SPLIT_DURATION {
            return None;
        }
        let (first, second) = split_halves(weights, total);
        let np_first = normalized_power(power, &first);
        if np_first <= 0.0 {
            return None;
        }
        Some(normalized_power(power, &second) / np_first)
    }

    /// Remaining W' through the activity.
    ///
    /// Above CP the balance drains by `(p - cp) * dt`; at or below CP it recovers
    /// exponentially toward `w_prime` with `tau = 546 * exp(-0.01 * (cp - p)) + 316`.
    /// A match is burned each time the balance falls below half of W', re-armed
    /// once it climbs back above 60 %.
    pub fn w_prime_balance(
        power: &[f64],
        weights: &TimeWeights,
        cp: f64,
        w_prime: f64,
    ) -> Option<WPrimeBalance> {
        if !(cp > 0.0 && w_prime > 0.0) {
            return None;
        }

        let mut balance = w_prime;
        let mut min_balance = w_prime;
        let mut match_burns = 0;
        let mut in_match = false;

        for i in weights.indices() {
            let dt = weights.weights[i];
            if dt <= 0.0 {
                continue;
            }
            let p = power.get(i).copied().unwrap_or(0.0);
            if p > cp {
                balance -= (p - cp) * dt;
            } else {
                let tau = 546.0 * (-0.01 * (cp - p)).exp() + 316.0;
                balance += (w_prime - balance) * (1.0 - (-dt / tau).exp());
            }
            balance = balance.clamp(0.0, w_prime);
            min_balance = min_balance.min(balance);

            let fraction = balance / w_prime;
            if fraction < MATCH_THRESHOLD && !in_match {
                match_burns += 1;
                in_match = true;
            } else if fraction > MATCH_THRESHOLD + MATCH_HYSTERESIS {
                in_match = false;
            }
        }

        Some(WPrimeBalance {
            min_balance,
            match_burns,
        })
    }

    /// Mean valid power per half of the duration
    pub fn half_comparison(power: &[f64], weights: &TimeWeights) -> Option<HalfComparison> {
        let total = TimeWeightedAggregator::total_duration(weights);
        if total < 2.0 * MIN_FATIGUE_WINDOW {
            return None;
        }

        let (first, second) = split_halves(weights, total);
        let first_half_power = valid_power_mean(power, &first)?;
        let second_half_power = valid_power_mean(power, &second)?;

        Some(HalfComparison {
            first_half_power,
            second_half_power,
            power_drop_pct: (first_half_power - second_half_power) / first_half_power * 100.0,
            half_power_ratio: second_half_power / first_half_power,
        })
    }

    /// Initial vs final window of valid power, window = min(300 s, valid duration / 4)
    pub fn fatigue_index(power: &[f64], weights: &TimeWeights) -> Option<FatigueIndex> {
        let valid: Vec<usize> = weights
            .indices()
            .filter(|&i| power.get(i).is_some_and(|&p| p > MIN_VALID_POWER))
            .collect();

        let valid_duration: f64 = valid.iter().map(|&i| weights.weights[i]).sum();
        let window = FATIGUE_WINDOW.min(valid_duration / 4.0);
        if window < MIN_FATIGUE_WINDOW {
            return None;
        }

        let initial_power = window_mean(power, weights, valid.iter().copied(), window)?;
        let final_power = window_mean(power, weights, valid.iter().rev().copied(), window)?;
        if initial_power <= 0.0 {
            return None;
        }

        Some(FatigueIndex {
            initial_power,
            final_power,
            fatigue_index: (initial_power - final_power) / initial_power * 100.0,
        })
    }

    /// CV of valid instantaneous power and `max(0, 100 - cv)`
    pub fn sustainability(power: &[f64], weights: &TimeWeights) -> Option<Sustainability> {
        let valid: Vec<f64> = weights
            .indices()
            .filter_map(|i| power.get(i).copied())
            .filter(|&p| p > MIN_VALID_POWER)
            .collect();
        if valid.len() < MIN_SUSTAINABILITY_SAMPLES {
            return None;
        }

        let n = valid.len() as f64;
        let mean = valid.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return None;
        }
        let variance = valid.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        let cv = variance.sqrt() / mean * 100.0;

        Some(Sustainability {
            coefficient_of_variation: cv,
            sustainability_index: (100.0 - cv).max(0.0),
        })
    }

    /// Decay across consecutive 5-minute blocks of elapsed time; needs two full blocks
    pub fn interval_fatigue(power: &[f64], weights: &TimeWeights) -> Option<IntervalFatigue> {
        let total = TimeWeightedAggregator::total_duration(weights);
        let blocks = (total / INTERVAL_DURATION).floor() as usize;
        if blocks < 2 {
            return None;
        }

        let elapsed = weights.elapsed_before();
        let means: Vec<f64> = (0..blocks)
            .filter_map(|b| {
                let start = b as f64 * INTERVAL_DURATION;
                let end = start + INTERVAL_DURATION;
                let block = weights.restricted(|i| elapsed[i] >= start && elapsed[i] < end);
                valid_power_mean(power, &block)
            })
            .collect();
        if means.len() < 2 {
            return None;
        }

        let first = means[0];
        let last = means[means.len() - 1];
        let decay_rate = if first > 0.0 {
            (first - last) / first * 100.0
        } else {
            0.0
        };

        let xs: Vec<f64> = (0..means.len()).map(|i| i as f64).collect();
        let mean_power = means.iter().sum::<f64>() / means.len() as f64;
        let power_trend = match linear_regression(&xs, &means) {
            Some((slope, _, _)) if mean_power > 0.0 => slope / mean_power * 100.0,
            _ => 0.0,
        };

        Some(IntervalFatigue {
            first_interval_power: first,
            last_interval_power: last,
            decay_rate,
            power_trend,
        })
    }
}

/// Efficiency factor (NP / mean valid HR) of each half; None when the first half has none
fn half_efficiency(
    power: &[f64],
    heart_rate: &[f64],
    weights: &TimeWeights,
    total: f64,
) -> Option<(f64, f64)> {
    let (first, second) = split_halves(weights, total);
    let ef = |w: &TimeWeights| {
        let np = normalized_power(power, w);
        let hr = TimeWeightedAggregator::weighted_mean_where(heart_rate, w, |v| v > MIN_VALID_HR);
        if np > 0.0 && hr > 0.0 {
            np / hr
        } else {
            0.0
        }
    };

    let first_ef = ef(&first);
    (first_ef > 0.0).then(|| (first_ef, ef(&second)))
}

/// Split included samples at the duration midpoint
fn split_halves(weights: &TimeWeights, total: f64) -> (TimeWeights, TimeWeights) {
    let midpoint = total / 2.0;
    let elapsed = weights.elapsed_before();
    let first = weights.restricted(|i| elapsed[i] < midpoint);
    let second = weights.restricted(|i| elapsed[i] >= midpoint);
    (first, second)
}

fn valid_power_mean(power: &[f64], weights: &TimeWeights) -> Option<f64> {
    let any_valid = weights
        .indices()
        .any(|i| power.get(i).is_some_and(|&p| p > MIN_VALID_POWER));
    if !any_valid {
        return None;
    }
    Some(TimeWeightedAggregator::weighted_mean_where(power, weights, |p| {
        p > MIN_VALID_POWER
    }))
}

/// Weighted mean of samples taken in `order` until `window` seconds are covered
fn window_mean<I>(power: &[f64], weights: &TimeWeights, order: I, window: f64) -> Option<f64>
where
    I: Iterator<Item = usize>,
{
    let mut covered = 0.0;
    let mut sum = 0.0;
    for i in order {
        if covered >= window {
            break;
        }
        let w = weights.weights[i].min(window - covered);
        sum += power[i] * w;
        covered += w;
    }
    (covered > 0.0).then(|| sum / covered)
}
