//! Zone classification and intensity distribution
//!
//! - Fine zones from ordered right edges (inclusive upper bound, open final zone)
//! - Time-weighted percentage per zone
//! - Reduced 3-zone view with per-metric collapsing rule
//! - Polarization index, distribution ratio and TID classification

use crate::aggregate::TimeWeights;
use serde::{Deserialize, Serialize};

/// Zone index for a value: smallest `k` with `value <= edges[k]`, else the final open zone
pub fn zone_index(value: f64, edges: &[f64]) -> usize {
    edges
        .iter()
        .position(|&edge| value <= edge)
        .unwrap_or(edges.len())
}

/// Time spent per fine zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDistribution {
    /// Seconds per zone (uniform sample counts when every delta is 0)
    pub zone_seconds: Vec<f64>,
    /// Percentage per zone; sums to 100 when any sample is included
    pub percentages: Vec<f64>,
}

impl ZoneDistribution {
    pub fn zone_count(&self) -> usize {
        self.percentages.len()
    }

    /// Percentage for a 1-based zone number
    pub fn zone_percent(&self, zone: usize) -> f64 {
        zone.checked_sub(1)
            .and_then(|i| self.percentages.get(i))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Maps a fine zone set onto low / moderate / high intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneCollapse {
    /// Fine zones with index below this are low intensity
    pub moderate_from: usize,
    /// Fine zones with index at or above this are high intensity
    pub high_from: usize,
}

impl ZoneCollapse {
    /// Coggan 7-zone power: zones 1-2 / 3 / 4+
    pub const POWER: ZoneCollapse = ZoneCollapse {
        moderate_from: 2,
        high_from: 3,
    };

    /// 5-zone heart rate: zone 1 / 2-3 / 4+
    pub const HEART_RATE: ZoneCollapse = ZoneCollapse {
        moderate_from: 1,
        high_from: 3,
    };

    pub fn new(moderate_from: usize, high_from: usize) -> Self {
        Self {
            moderate_from,
            high_from: high_from.max(moderate_from),
        }
    }

    /// Coarse index 0..=2 for a fine zone index
    pub fn coarse_index(&self, fine: usize) -> usize {
        if fine < self.moderate_from {
            0
        } else if fine < self.high_from {
            1
        } else {
            2
        }
    }
}

/// Training intensity distribution pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TidClassification {
    Polarized,
    Pyramidal,
    Threshold,
}

impl TidClassification {
    pub fn classify(z1: f64, z2: f64, z3: f64) -> Self {
        if z1 > 75.0 && z2 < 10.0 {
            TidClassification::Polarized
        } else if z1 > z2 && z2 > z3 {
            TidClassification::Pyramidal
        } else {
            TidClassification::Threshold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TidClassification::Polarized => "polarized",
            TidClassification::Pyramidal => "pyramidal",
            TidClassification::Threshold => "threshold",
        }
    }

    /// Numeric code for flat metric maps
    pub fn code(&self) -> f64 {
        match self {
            TidClassification::Polarized => 1.0,
            TidClassification::Pyramidal => 2.0,
            TidClassification::Threshold => 3.0,
        }
    }
}

/// Low / moderate / high intensity view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreeZoneDistribution {
    pub z1_percent: f64,
    pub z2_percent: f64,
    pub z3_percent: f64,
}

impl ThreeZoneDistribution {
    pub fn from_fine(fine: &ZoneDistribution, collapse: ZoneCollapse) -> Self {
        let mut coarse = [0.0; 3];
        for (i, pct) in fine.percentages.iter().enumerate() {
            coarse[collapse.coarse_index(i)] += pct;
        }
        Self {
            z1_percent: coarse[0],
            z2_percent: coarse[1],
            z3_percent: coarse[2],
        }
    }

    /// `(z1 + z3) / z2`, None when z2 is 0
    pub fn polarization_index(&self) -> Option<f64> {
        (self.z2_percent > 0.0).then(|| (self.z1_percent + self.z3_percent) / self.z2_percent)
    }

    /// `z1 / z3`, None when z3 is 0
    pub fn distribution_ratio(&self) -> Option<f64> {
        (self.z3_percent > 0.0).then(|| self.z1_percent / self.z3_percent)
    }

    pub fn classification(&self) -> TidClassification {
        TidClassification::classify(self.z1_percent, self.z2_percent, self.z3_percent)
    }

    /// Duration-weighted combination of several distributions; None when total weight is 0
    pub fn combine(parts: &[(ThreeZoneDistribution, f64)]) -> Option<Self> {
        let total: f64 = parts.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let weighted = |f: fn(&ThreeZoneDistribution) -> f64| {
            parts.iter().map(|(d, w)| f(d) * w).sum::<f64>() / total
        };
        Some(Self {
            z1_percent: weighted(|d| d.z1_percent),
            z2_percent: weighted(|d| d.z2_percent),
            z3_percent: weighted(|d| d.z3_percent),
        })
    }
}

/// Zone classifier over a fixed set of right edges
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneClassifier {
    edges: Vec<f64>,
}

impl ZoneClassifier {
    pub fn new(edges: &[f64]) -> Self {
        Self {
            edges: edges.to_vec(),
        }
    }

    /// Number of zones, including the open final zone
    pub fn zone_count(&self) -> usize {
        self.edges.len() + 1
    }

    pub fn classify(&self, value: f64) -> usize {
        zone_index(value, &self.edges)
    }

    /// Time-weighted distribution of `values` over included samples.
    ///
    /// When every included weight is 0 each sample counts once.
    pub fn distribution(&self, values: &[f64], weights: &TimeWeights) -> ZoneDistribution {
        let zones = self.zone_count();
        let mut seconds = vec![0.0; zones];
        let mut counts = vec![0.0; zones];

        for i in weights.indices() {
            let Some(&v) = values.get(i) else { continue };
            if v.is_nan() {
                continue;
            }
            let z = self.classify(v);
            seconds[z] += weights.weights[i].max(0.0);
            counts[z] += 1.0;
        }

        let total: f64 = seconds.iter().sum();
        let basis = if total > 0.0 { &seconds } else { &counts };
        let basis_total: f64 = basis.iter().sum();

        let percentages = if basis_total > 0.0 {
            basis.iter().map(|s| s / basis_total * 100.0).collect()
        } else {
            vec![0.0; zones]
        };

        ZoneDistribution {
            zone_seconds: basis.clone(),
            percentages,
        }
    }

    pub fn three_zone(
        &self,
        values: &[f64],
        weights: &TimeWeights,
        collapse: ZoneCollapse,
    ) -> ThreeZoneDistribution {
        ThreeZoneDistribution::from_fine(&self.distribution(values, weights), collapse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricMode;

    fn make_weights(deltas: &[f64]) -> TimeWeights {
        TimeWeights::from_parts(deltas, &vec![true; deltas.len()], 2.0, MetricMode::Raw)
    }

    #[test]
    fn test_edge_value_goes_to_lower_zone() {
        let edges = [100.0, 200.0];
        assert_eq!(zone_index(100.0, &edges), 0);
        assert_eq!(zone_index(100.5, &edges), 1);
        assert_eq!(zone_index(200.0, &edges), 1);
        assert_eq!(zone_index(500.0, &edges), 2);
        assert_eq!(zone_index(0.0, &edges), 0);
    }

    #[test]
    fn test_no_edges_single_zone() {
        let classifier = ZoneClassifier::new(&[]);
        let dist = classifier.distribution(&[50.0, 500.0, 5000.0], &make_weights(&[1.0, 1.0, 0.0]));
        assert_eq!(dist.percentages, vec![100.0]);
    }

    #[test]
    fn test_time_weighted_percentages() {
        let classifier = ZoneClassifier::new(&[150.0, 250.0]);
        // 100 W for 3 s, 200 W for 1 s, 300 W carries the 0-weight tail
        let values = [100.0, 200.0, 300.0];
        let dist = classifier.distribution(&values, &make_weights(&[3.0, 1.0, 0.0]));
        assert!((dist.percentages[0] - 75.0).abs() < 1e-9);
        assert!((dist.percentages[1] - 25.0).abs() < 1e-9);
        assert_eq!(dist.percentages[2], 0.0);
    }

    #[test]
    fn test_percentages_sum_to_100() {
        let classifier = ZoneClassifier::new(&[110.0, 150.0, 180.0, 210.0, 240.0, 300.0]);
        let mut state = 12345u64;
        for len in [1usize, 2, 17, 300] {
            let mut values = Vec::with_capacity(len);
            let mut deltas = Vec::with_capacity(len);
            for _ in 0..len {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                values.push((state >> 33) as f64 % 400.0);
                deltas.push(((state >> 20) % 4) as f64 * 0.5);
            }
            let dist = classifier.distribution(&values, &make_weights(&deltas));
            let sum: f64 = dist.percentages.iter().sum();
            assert!((sum - 100.0).abs() < 1e-6, "len={len} sum={sum}");
        }
    }

    #[test]
    fn test_all_zero_deltas_use_counts() {
        let classifier = ZoneClassifier::new(&[100.0]);
        let dist = classifier.distribution(&[50.0, 150.0, 160.0, 170.0], &make_weights(&[0.0; 4]));
        assert!((dist.percentages[0] - 25.0).abs() < 1e-9);
        assert!((dist.percentages[1] - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_power_collapse() {
        let fine = ZoneDistribution {
            zone_seconds: vec![0.0; 7],
            percentages: vec![10.0, 40.0, 20.0, 15.0, 10.0, 3.0, 2.0],
        };
        let three = ThreeZoneDistribution::from_fine(&fine, ZoneCollapse::POWER);
        assert!((three.z1_percent - 50.0).abs() < 1e-9);
        assert!((three.z2_percent - 20.0).abs() < 1e-9);
        assert!((three.z3_percent - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_heart_rate_collapse() {
        let fine = ZoneDistribution {
            zone_seconds: vec![0.0; 5],
            percentages: vec![60.0, 10.0, 10.0, 15.0, 5.0],
        };
        let three = ThreeZoneDistribution::from_fine(&fine, ZoneCollapse::HEART_RATE);
        assert!((three.z1_percent - 60.0).abs() < 1e-9);
        assert!((three.z2_percent - 20.0).abs() < 1e-9);
        assert!((three.z3_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_polarization_guards() {
        let no_z2 = ThreeZoneDistribution {
            z1_percent: 80.0,
            z2_percent: 0.0,
            z3_percent: 20.0,
        };
        assert_eq!(no_z2.polarization_index(), None);
        assert_eq!(no_z2.distribution_ratio(), Some(4.0));

        let no_z3 = ThreeZoneDistribution {
            z1_percent: 70.0,
            z2_percent: 30.0,
            z3_percent: 0.0,
        };
        assert_eq!(no_z3.distribution_ratio(), None);
        assert!((no_z3.polarization_index().unwrap() - 70.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_tid_classification() {
        assert_eq!(TidClassification::classify(80.0, 5.0, 15.0), TidClassification::Polarized);
        assert_eq!(TidClassification::classify(60.0, 30.0, 10.0), TidClassification::Pyramidal);
        assert_eq!(TidClassification::classify(40.0, 40.0, 20.0), TidClassification::Threshold);
    }

    #[test]
    fn test_combine_weights_by_duration() {
        let a = ThreeZoneDistribution {
            z1_percent: 100.0,
            z2_percent: 0.0,
            z3_percent: 0.0,
        };
        let b = ThreeZoneDistribution {
            z1_percent: 0.0,
            z2_percent: 0.0,
            z3_percent: 100.0,
        };
        let combined = ThreeZoneDistribution::combine(&[(a, 3600.0), (b, 1200.0)]).unwrap();
        assert!((combined.z1_percent - 75.0).abs() < 1e-9);
        assert!((combined.z3_percent - 25.0).abs() < 1e-9);
        assert_eq!(ThreeZoneDistribution::combine(&[]), None);
    }
}
