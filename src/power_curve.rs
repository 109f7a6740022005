//! Power-duration curve and critical power model
//!
//! - Per-activity best mean value for exact window durations (O(n) per duration)
//! - Rolling calendar-window curve across activities (monotonic deque per duration)
//! - Two-parameter hyperbolic CP / W' fit by least squares on `1/t`

use crate::aggregate::TimeWeights;
use crate::types::{CriticalPowerModel, PowerCurvePoint};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Estimated FTP as a fraction of the best 20-minute power
pub const FTP_FROM_20MIN: f64 = 0.95;

/// Duration used for the FTP estimate (seconds)
pub const FTP_ESTIMATION_DURATION: u32 = 1200;

/// Minimum distinct durations for a CP fit
pub const MIN_CP_POINTS: usize = 3;

/// Short-duration cutoff for the CP fit; sprint efforts distort the hyperbola
pub const DEFAULT_CP_MIN_DURATION: u32 = 120;

/// Human label for a curve duration ("5sec", "1min", "1hr", "90min", ...)
pub fn interval_name(seconds: u32) -> String {
    match seconds {
        s if s < 60 => format!("{s}sec"),
        5400 => "90min".to_string(),
        s if s % 3600 == 0 => format!("{}hr", s / 3600),
        s if s % 60 == 0 && s < 3600 => format!("{}min", s / 60),
        s => format!("{s}sec"),
    }
}

/// Constant-value segment of the signal on the compressed time axis
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: f64,
    len: f64,
    value: f64,
}

/// Prefix integral of a piecewise-constant signal, evaluated with a forward-only cursor
struct PrefixIntegral<'a> {
    segments: &'a [Segment],
    /// Integral up to the start of each segment
    before: &'a [f64],
    total_time: f64,
    cursor: usize,
}

impl<'a> PrefixIntegral<'a> {
    fn new(segments: &'a [Segment], before: &'a [f64], total_time: f64) -> Self {
        Self {
            segments,
            before,
            total_time,
            cursor: 0,
        }
    }

    /// Integral over `[0, x]`; successive calls must use non-decreasing `x`
    fn at(&mut self, x: f64) -> f64 {
        let x = x.clamp(0.0, self.total_time);
        while self.cursor + 1 < self.segments.len() && self.segments[self.cursor + 1].start <= x {
            self.cursor += 1;
        }
        let seg = self.segments[self.cursor];
        self.before[self.cursor] + seg.value * (x - seg.start).clamp(0.0, seg.len)
    }
}

/// Piecewise-constant signal on the compressed time axis of included samples
struct Signal {
    segments: Vec<Segment>,
    /// Integral up to the start of each segment
    before: Vec<f64>,
    total_time: f64,
}

impl Signal {
    fn new(values: &[f64], weights: &TimeWeights) -> Self {
        let mut segments = Vec::new();
        let mut before = Vec::new();
        let mut t = 0.0;
        let mut integral = 0.0;
        for i in weights.indices() {
            let w = weights.weights[i];
            if w <= 0.0 {
                continue;
            }
            let value = values.get(i).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
            segments.push(Segment { start: t, len: w, value });
            before.push(integral);
            t += w;
            integral += value * w;
        }
        Self {
            segments,
            before,
            total_time: t,
        }
    }

    fn covers(&self, duration: f64) -> bool {
        !self.segments.is_empty() && self.total_time + 1e-9 >= duration
    }

    fn integral(&self) -> PrefixIntegral<'_> {
        PrefixIntegral::new(&self.segments, &self.before, self.total_time)
    }
}

/// Location and mean of the best window for one duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestWindow {
    /// Window start in seconds of included time
    pub start: f64,
    pub mean: f64,
}

/// Per-activity curve extraction
pub struct PowerCurveEngine;

impl PowerCurveEngine {
    /// Maximum mean value over any window of exactly `duration` seconds of included time.
    ///
    /// The signal holds each sample's value for its weight. The optimum of a
    /// sliding integral over a piecewise-constant signal lies where the window
    /// start or end meets a segment boundary, so both families of candidates
    /// are scanned with forward-only cursors. None when the activity is shorter
    /// than `duration`.
    pub fn best_mean(values: &[f64], weights: &TimeWeights, duration: f64) -> Option<f64> {
        Self::best_window(values, weights, duration).map(|w| w.mean)
    }

    /// Same scan as [`Self::best_mean`], keeping the earliest best window
    pub fn best_window(values: &[f64], weights: &TimeWeights, duration: f64) -> Option<BestWindow> {
        if duration <= 0.0 {
            return None;
        }
        let signal = Signal::new(values, weights);
        if !signal.covers(duration) {
            return None;
        }

        let mut best_area = f64::NEG_INFINITY;
        let mut best_start = 0.0;
        let latest_start = signal.total_time - duration;

        // Windows starting on a boundary
        let mut start_at = signal.integral();
        let mut end_at = signal.integral();
        for seg in &signal.segments {
            if seg.start > latest_start + 1e-9 {
                break;
            }
            let area = end_at.at(seg.start + duration) - start_at.at(seg.start);
            if area > best_area {
                best_area = area;
                best_start = seg.start;
            }
        }

        // Windows ending on a boundary
        let mut start_at = signal.integral();
        let mut end_at = signal.integral();
        for seg in &signal.segments {
            let end = seg.start + seg.len;
            if end + 1e-9 < duration {
                continue;
            }
            let area = end_at.at(end) - start_at.at(end - duration);
            if area > best_area {
                best_area = area;
                best_start = end - duration;
            }
        }

        best_area.is_finite().then(|| BestWindow {
            start: best_start.max(0.0),
            mean: best_area / duration,
        })
    }

    /// Mean of `values` over `[start, start + duration)` of included time
    pub fn window_mean(values: &[f64], weights: &TimeWeights, start: f64, duration: f64) -> Option<f64> {
        if duration <= 0.0 {
            return None;
        }
        let signal = Signal::new(values, weights);
        if !signal.covers(start + duration) {
            return None;
        }
        let mut at = signal.integral();
        let before = at.at(start);
        Some((at.at(start + duration) - before) / duration)
    }

    /// Curve points for every requested duration the activity is long enough to cover
    pub fn activity_curve(values: &[f64], weights: &TimeWeights, durations: &[u32]) -> Vec<PowerCurvePoint> {
        durations
            .iter()
            .filter_map(|&d| {
                Self::best_mean(values, weights, d as f64).map(|best| PowerCurvePoint {
                    duration_seconds: d,
                    best_mean_value: best,
                })
            })
            .collect()
    }

    /// 95 % of the best 20-minute mean, None for rides shorter than 20 minutes
    pub fn estimated_ftp(values: &[f64], weights: &TimeWeights) -> Option<f64> {
        Self::best_mean(values, weights, FTP_ESTIMATION_DURATION as f64).map(|p| p * FTP_FROM_20MIN)
    }

    /// Mean heart rate over the best 20-minute power window
    pub fn estimated_fthr(power: &[f64], heart_rate: &[f64], weights: &TimeWeights) -> Option<f64> {
        let duration = FTP_ESTIMATION_DURATION as f64;
        let best = Self::best_window(power, weights, duration)?;
        Self::window_mean(heart_rate, weights, best.start, duration).filter(|hr| *hr > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct WindowEntry {
    date: NaiveDate,
    value: f64,
}

/// Best value per duration across activities inside a trailing calendar window.
///
/// Activities must be pushed in non-decreasing date order. Each duration keeps a
/// deque of entries with strictly decreasing values, so the front is the window max.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingPowerCurve {
    window_days: i64,
    durations: Vec<u32>,
    queues: Vec<VecDeque<WindowEntry>>,
    latest: Option<NaiveDate>,
}

impl RollingPowerCurve {
    pub fn new(window_days: i64, durations: &[u32]) -> Self {
        Self {
            window_days,
            durations: durations.to_vec(),
            queues: vec![VecDeque::new(); durations.len()],
            latest: None,
        }
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    /// Add one activity's curve dated `date`, then evict entries older than the window.
    ///
    /// A date before the latest push is treated as the latest date so the deques stay ordered.
    pub fn push(&mut self, date: NaiveDate, points: &[PowerCurvePoint]) {
        let date = match self.latest {
            Some(latest) if latest > date => {
                debug!(%date, %latest, "out-of-order curve push clamped to the latest date");
                latest
            }
            _ => date,
        };
        for point in points {
            let Some(slot) = self.durations.iter().position(|&d| d == point.duration_seconds) else {
                continue;
            };
            let queue = &mut self.queues[slot];
            while queue.back().is_some_and(|e| e.value <= point.best_mean_value) {
                queue.pop_back();
            }
            queue.push_back(WindowEntry {
                date,
                value: point.best_mean_value,
            });
        }
        self.advance_to(date);
    }

    /// Move the window end to `as_of`, dropping entries that fell out
    pub fn advance_to(&mut self, as_of: NaiveDate) {
        let as_of = match self.latest {
            Some(latest) if latest > as_of => latest,
            _ => as_of,
        };
        self.latest = Some(as_of);
        let window_days = self.window_days;
        for queue in &mut self.queues {
            while queue
                .front()
                .is_some_and(|e| (as_of - e.date).num_days() >= window_days)
            {
                queue.pop_front();
            }
        }
    }

    /// Best value per duration currently inside the window
    pub fn points(&self) -> Vec<PowerCurvePoint> {
        self.durations
            .iter()
            .zip(&self.queues)
            .filter_map(|(&d, q)| {
                q.front().map(|e| PowerCurvePoint {
                    duration_seconds: d,
                    best_mean_value: e.value,
                })
            })
            .collect()
    }

    pub fn best(&self, duration_seconds: u32) -> Option<f64> {
        let slot = self.durations.iter().position(|&d| d == duration_seconds)?;
        self.queues[slot].front().map(|e| e.value)
    }
}

/// CP model fitter over curve points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpFitter {
    min_duration: u32,
    max_duration: u32,
}

impl Default for CpFitter {
    fn default() -> Self {
        Self::new()
    }
}

impl CpFitter {
    /// Fit over every duration of at least two minutes
    pub fn new() -> Self {
        Self {
            min_duration: DEFAULT_CP_MIN_DURATION,
            max_duration: u32::MAX,
        }
    }

    /// Fit over durations in `[min_secs, max_secs]`
    pub fn with_range(min_secs: u32, max_secs: u32) -> Self {
        Self {
            min_duration: min_secs,
            max_duration: max_secs,
        }
    }

    /// Least-squares fit of `P = cp + w_prime / t`.
    ///
    /// The model is linear in `1/t`, so ordinary regression of power on `1/t`
    /// is the exact least-squares solution in power space. Returns None with
    /// fewer than three distinct durations in range. Fit quality is not
    /// filtered; only the physiological lower bounds `cp > 0` and `w_prime >= 0`
    /// are enforced, so a curve that rises with duration yields None.
    pub fn fit(&self, points: &[PowerCurvePoint]) -> Option<CriticalPowerModel> {
        let mut in_range: Vec<&PowerCurvePoint> = points
            .iter()
            .filter(|p| p.duration_seconds >= self.min_duration && p.duration_seconds <= self.max_duration)
            .filter(|p| p.best_mean_value.is_finite() && p.best_mean_value > 0.0)
            .collect();
        in_range.sort_by_key(|p| p.duration_seconds);
        in_range.dedup_by_key(|p| p.duration_seconds);

        if in_range.len() < MIN_CP_POINTS {
            debug!(points = in_range.len(), "not enough durations for CP fit");
            return None;
        }

        let xs: Vec<f64> = in_range.iter().map(|p| 1.0 / p.duration_seconds as f64).collect();
        let ys: Vec<f64> = in_range.iter().map(|p| p.best_mean_value).collect();
        let (slope, intercept, r_squared) = linear_regression(&xs, &ys)?;

        if intercept <= 0.0 || slope < 0.0 {
            debug!(cp = intercept, w_prime = slope, "rejected non-physical CP fit");
            return None;
        }

        Some(CriticalPowerModel {
            cp: intercept,
            w_prime: slope,
            r_squared: r_squared.clamp(0.0, 1.0),
        })
    }
}

impl CriticalPowerModel {
    /// Seconds until W' is exhausted at `power`; None at or below CP
    pub fn time_to_exhaustion(&self, power: f64) -> Option<f64> {
        (power > self.cp).then(|| self.w_prime / (power - self.cp))
    }

    /// Predicted sustainable power for `seconds`
    pub fn power_at_duration(&self, seconds: f64) -> Option<f64> {
        (seconds > 0.0).then(|| self.cp + self.w_prime / seconds)
    }
}

/// Ordinary least squares `y = slope * x + intercept`; returns `(slope, intercept, r_squared)`.
///
/// r² is 1 when every `y` is equal and the fit is exact.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64, f64)> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = xs[..n].iter().sum::<f64>() / nf;
    let mean_y = ys[..n].iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        sxx += dx * dx;
        sxy += dx * (ys[i] - mean_y);
    }
    if sxx.abs() < f64::EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..n {
        let predicted = slope * xs[i] + intercept;
        ss_res += (ys[i] - predicted).powi(2);
        ss_tot += (ys[i] - mean_y).powi(2);
    }
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        1.0
    };

    Some((slope, intercept, r_squared))
}
