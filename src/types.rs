//! Core types for the trainload engine
//!
//! This module defines the data structures that flow through the engine:
//! raw stream columns, prepared samples, activity records, zone configurations,
//! training-load states and power-curve points.

use crate::error::ComputeError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sport classification of an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SportType {
    Ride,
    VirtualRide,
    GravelRide,
    MountainBikeRide,
    Run,
    TrailRun,
    Walk,
    Hike,
    Swim,
    #[serde(other)]
    Other,
}

impl SportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SportType::Ride => "Ride",
            SportType::VirtualRide => "VirtualRide",
            SportType::GravelRide => "GravelRide",
            SportType::MountainBikeRide => "MountainBikeRide",
            SportType::Run => "Run",
            SportType::TrailRun => "TrailRun",
            SportType::Walk => "Walk",
            SportType::Hike => "Hike",
            SportType::Swim => "Swim",
            SportType::Other => "Other",
        }
    }

    /// Whether power-based analysis (curve, CP) applies to this sport
    pub fn is_cycling(&self) -> bool {
        matches!(
            self,
            SportType::Ride
                | SportType::VirtualRide
                | SportType::GravelRide
                | SportType::MountainBikeRide
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SportType::Run | SportType::TrailRun)
    }
}

/// Sample channel carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Power,
    HeartRate,
    Cadence,
    Speed,
    Altitude,
    Distance,
    Grade,
}

/// Column-oriented stream as delivered by a payload adapter, before preparation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamColumns {
    /// Elapsed seconds since activity start
    pub time: Vec<f64>,
    pub power: Option<Vec<f64>>,
    pub heart_rate: Option<Vec<f64>>,
    pub cadence: Option<Vec<f64>>,
    /// Speed in m/s, already resolved from the column priority list
    pub speed: Option<Vec<f64>>,
    pub altitude: Option<Vec<f64>>,
    /// Cumulative distance in meters
    pub distance: Option<Vec<f64>>,
    /// Grade in percent
    pub grade: Option<Vec<f64>>,
    /// Moving flags recorded by the device
    #[serde(default)]
    pub moving: Option<Vec<bool>>,
}

impl StreamColumns {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn column(&self, channel: Channel) -> Option<&[f64]> {
        let column = match channel {
            Channel::Power => &self.power,
            Channel::HeartRate => &self.heart_rate,
            Channel::Cadence => &self.cadence,
            Channel::Speed => &self.speed,
            Channel::Altitude => &self.altitude,
            Channel::Distance => &self.distance,
            Channel::Grade => &self.grade,
        };
        column.as_deref()
    }
}

/// A single timestamped observation with its moving flag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub offset_seconds: f64,
    pub power: Option<f64>,
    pub heart_rate: Option<f64>,
    pub cadence: Option<f64>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
    pub distance: Option<f64>,
    pub grade: Option<f64>,
    /// False when this sample follows a recording gap
    pub moving: bool,
}

impl Sample {
    pub fn value(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Power => self.power,
            Channel::HeartRate => self.heart_rate,
            Channel::Cadence => self.cadence,
            Channel::Speed => self.speed,
            Channel::Altitude => self.altitude,
            Channel::Distance => self.distance,
            Channel::Grade => self.grade,
        }
    }
}

/// Prepared stream: samples in time order plus the forward time delta of each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub samples: Vec<Sample>,
    /// `deltas[i] = offset[i+1] - offset[i]`; the last delta is 0
    pub deltas: Vec<f64>,
    /// Gap threshold used when the moving flags were computed
    pub gap_threshold: f64,
}

impl Stream {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether any sample carries the channel
    pub fn has_channel(&self, channel: Channel) -> bool {
        self.samples.iter().any(|s| s.value(channel).is_some())
    }

    /// Channel values with per-sample holes filled by 0.0, or None when the channel is absent
    pub fn channel(&self, channel: Channel) -> Option<Vec<f64>> {
        if !self.has_channel(channel) {
            return None;
        }
        Some(
            self.samples
                .iter()
                .map(|s| s.value(channel).unwrap_or(0.0))
                .collect(),
        )
    }

    pub fn moving_mask(&self) -> Vec<bool> {
        self.samples.iter().map(|s| s.moving).collect()
    }

    pub fn gap_count(&self) -> usize {
        self.samples.iter().filter(|s| !s.moving).count()
    }
}

/// Which subset of samples a metric was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricMode {
    /// Every sample, gaps included
    Raw,
    /// Moving samples only, boundary deltas clipped to the gap threshold
    Moving,
}

impl MetricMode {
    pub fn prefix(&self) -> &'static str {
        match self {
            MetricMode::Raw => "raw_",
            MetricMode::Moving => "moving_",
        }
    }

    pub fn moving_only(&self) -> bool {
        matches!(self, MetricMode::Moving)
    }

    pub fn all() -> [MetricMode; 2] {
        [MetricMode::Raw, MetricMode::Moving]
    }
}

/// Ordered zone right edges, serialized as `"[157, 214, 256, 300, 342]"`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneBins(pub Vec<f64>);

impl ZoneBins {
    pub fn new(edges: Vec<f64>) -> Self {
        Self(edges)
    }

    pub fn edges(&self) -> &[f64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ZoneBins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, edge) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{edge}")?;
        }
        write!(f, "]")
    }
}

impl FromStr for ZoneBins {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| ComputeError::InvalidZoneBins(format!("expected [..], got {s:?}")))?;

        if inner.trim().is_empty() {
            return Ok(Self(Vec::new()));
        }

        let edges = inner
            .split(',')
            .map(|part| {
                let part = part.trim();
                match part.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(ComputeError::InvalidZoneBins(format!(
                        "invalid edge {part:?} in {s:?}"
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(edges))
    }
}

impl Serialize for ZoneBins {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZoneBins {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-activity record accumulated by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    pub start_date: DateTime<Utc>,
    pub sport_type: SportType,
    /// Flat metric map, names carry `raw_` / `moving_` prefixes
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Power zone edges in effect for this activity
    #[serde(default)]
    pub zone_bins: Option<ZoneBins>,
    /// Heart-rate zone edges in effect for this activity
    #[serde(default)]
    pub hr_zone_bins: Option<ZoneBins>,
}

impl ActivityRecord {
    pub fn new(id: u64, start_date: DateTime<Utc>, sport_type: SportType) -> Self {
        Self {
            id,
            start_date,
            sport_type,
            metrics: BTreeMap::new(),
            zone_bins: None,
            hr_zone_bins: None,
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn date(&self) -> NaiveDate {
        self.start_date.date_naive()
    }
}

/// Activity metadata supplied alongside a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMeta {
    pub id: u64,
    pub start_date: DateTime<Utc>,
    pub sport_type: SportType,
}

/// Zone right edges tagged with the moment they became active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfiguration {
    pub edges: Vec<f64>,
    pub active_since: DateTime<Utc>,
}

impl ZoneConfiguration {
    pub fn new(edges: Vec<f64>, active_since: DateTime<Utc>) -> Self {
        Self {
            edges,
            active_since,
        }
    }

    pub fn bins(&self) -> ZoneBins {
        ZoneBins(self.edges.clone())
    }
}

/// Fitness/fatigue state after folding one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoadState {
    pub date: NaiveDate,
    /// Long time-constant load (fitness)
    pub chronic_load: f64,
    /// Short time-constant load (fatigue)
    pub acute_load: f64,
    /// `chronic_load - acute_load` (form)
    pub balance: f64,
    /// `acute_load / chronic_load`, 0 when chronic is 0
    pub acute_chronic_ratio: f64,
}

/// Best mean value sustained for a duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerCurvePoint {
    pub duration_seconds: u32,
    pub best_mean_value: f64,
}

/// Two-parameter hyperbolic model `P(t) = cp + w_prime / t`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalPowerModel {
    /// Critical power (W)
    pub cp: f64,
    /// Anaerobic work capacity (J)
    pub w_prime: f64,
    /// Goodness of fit in [0, 1]
    pub r_squared: f64,
}
