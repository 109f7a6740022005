//! Gap-aware time-weighted aggregation
//!
//! Every sample carries the forward delta to its successor as its weight.
//! In moving-only mode, non-moving samples are excluded and any delta that
//! spans into a non-moving sample is clipped to the gap threshold.

use crate::types::{MetricMode, Stream};

/// Per-sample weights and inclusion mask for one aggregation mode
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWeights {
    pub weights: Vec<f64>,
    pub included: Vec<bool>,
}

impl TimeWeights {
    pub fn from_stream(stream: &Stream, mode: MetricMode) -> Self {
        Self::from_parts(
            &stream.deltas,
            &stream.moving_mask(),
            stream.gap_threshold,
            mode,
        )
    }

    pub fn from_parts(deltas: &[f64], moving: &[bool], gap_threshold: f64, mode: MetricMode) -> Self {
        let n = deltas.len();
        if !mode.moving_only() {
            return Self {
                weights: deltas.to_vec(),
                included: vec![true; n],
            };
        }

        let mut weights = Vec::with_capacity(n);
        let mut included = Vec::with_capacity(n);
        for i in 0..n {
            let is_moving = moving.get(i).copied().unwrap_or(true);
            let next_moving = moving.get(i + 1).copied().unwrap_or(true);
            let delta = if next_moving {
                deltas[i]
            } else {
                deltas[i].min(gap_threshold)
            };
            included.push(is_moving);
            weights.push(if is_moving { delta } else { 0.0 });
        }
        Self { weights, included }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Indices of included samples
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.included
            .iter()
            .enumerate()
            .filter_map(|(i, &inc)| inc.then_some(i))
    }

    /// Copy with only the samples accepted by `keep` still included
    pub fn restricted<F>(&self, keep: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        Self {
            weights: self.weights.clone(),
            included: self
                .included
                .iter()
                .enumerate()
                .map(|(i, &inc)| inc && keep(i))
                .collect(),
        }
    }

    /// Included time elapsed before each sample
    pub fn elapsed_before(&self) -> Vec<f64> {
        let mut elapsed = Vec::with_capacity(self.len());
        let mut acc = 0.0;
        for (w, &inc) in self.weights.iter().zip(&self.included) {
            elapsed.push(acc);
            if inc {
                acc += w;
            }
        }
        elapsed
    }
}

/// Aggregation primitives over `(values, weights)`
pub struct TimeWeightedAggregator;

impl TimeWeightedAggregator {
    /// `Σ(v·Δt) / Σ(Δt)` over included samples with `Δt > 0`.
    ///
    /// Falls back to the unweighted mean of included values when no weight is
    /// positive, and to 0 when nothing is included.
    pub fn weighted_mean(values: &[f64], weights: &TimeWeights) -> f64 {
        Self::weighted_mean_where(values, weights, |_| true)
    }

    /// Weighted mean restricted to values accepted by `keep`
    pub fn weighted_mean_where<F>(values: &[f64], weights: &TimeWeights, keep: F) -> f64
    where
        F: Fn(f64) -> bool,
    {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut plain_sum = 0.0;
        let mut count = 0usize;

        for i in weights.indices() {
            let Some(&v) = values.get(i) else { continue };
            if !keep(v) {
                continue;
            }
            plain_sum += v;
            count += 1;
            let w = weights.weights[i];
            if w > 0.0 {
                weighted_sum += v * w;
                total_weight += w;
            }
        }

        if total_weight > 0.0 {
            weighted_sum / total_weight
        } else if count > 0 {
            plain_sum / count as f64
        } else {
            0.0
        }
    }

    /// Maximum of included values strictly above zero, else 0
    pub fn weighted_max_excluding_zero(values: &[f64], weights: &TimeWeights) -> f64 {
        weights
            .indices()
            .filter_map(|i| values.get(i).copied())
            .filter(|v| *v > 0.0)
            .fold(0.0, f64::max)
    }

    /// `Σ Δt` over included samples
    pub fn total_duration(weights: &TimeWeights) -> f64 {
        weights.indices().map(|i| weights.weights[i]).sum()
    }

    /// Sum of positive consecutive differences among included samples
    pub fn positive_gain(values: &[f64], weights: &TimeWeights) -> f64 {
        let mut gain = 0.0;
        let mut prev: Option<f64> = None;
        for i in weights.indices() {
            let Some(&v) = values.get(i) else { continue };
            if let Some(p) = prev {
                if v > p {
                    gain += v - p;
                }
            }
            prev = Some(v);
        }
        gain
    }
}
