//! Athlete configuration
//!
//! Thresholds, body weight, zone edges and engine windows for one athlete.
//! Loaded from JSON; every field has a default so partial documents are accepted.

use crate::error::ComputeError;
use crate::types::ZoneConfiguration;
use serde::{Deserialize, Serialize};

/// Gap threshold in seconds; a larger inter-sample delta marks a stop
pub const DEFAULT_GAP_THRESHOLD_SECONDS: f64 = 2.0;

/// Acute (fatigue) time constant in days
pub const DEFAULT_ACUTE_WINDOW_DAYS: f64 = 7.0;

/// Chronic (fitness) time constant in days
pub const DEFAULT_CHRONIC_WINDOW_DAYS: f64 = 42.0;

/// Calendar window for the rolling power curve and CP fit
pub const DEFAULT_ROLLING_WINDOW_DAYS: i64 = 90;

/// Calendar window for the best-effort FTP estimate
pub const FTP_ESTIMATE_WINDOW_DAYS: i64 = 42;

/// Power-curve target durations in seconds
pub const DEFAULT_POWER_CURVE_DURATIONS: [u32; 13] = [
    5, 10, 20, 30, 60, 120, 300, 600, 1200, 1800, 3600, 7200, 18000,
];

/// Coggan 7-zone power model, right edges as fractions of FTP
pub const POWER_ZONE_FRACTIONS: [f64; 6] = [0.55, 0.75, 0.90, 1.05, 1.20, 1.50];

/// 5-zone heart-rate model, right edges as fractions of FTHR
pub const HR_ZONE_FRACTIONS: [f64; 4] = [0.82, 0.89, 0.94, 1.00];

/// Per-athlete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AthleteConfig {
    /// Functional threshold power (W)
    #[serde(rename = "functional_threshold_power", alias = "ftp")]
    pub ftp: f64,
    /// Functional threshold heart rate (bpm)
    #[serde(rename = "functional_threshold_heart_rate", alias = "fthr")]
    pub fthr: f64,
    pub weight_kg: f64,
    /// Explicit power zone edges; derived from FTP when absent
    #[serde(rename = "zone_configuration", alias = "power_zones")]
    pub power_zones: Option<ZoneConfiguration>,
    /// Explicit heart-rate zone edges; derived from FTHR when absent
    pub hr_zones: Option<ZoneConfiguration>,
    pub acute_window_days: f64,
    pub chronic_window_days: f64,
    pub gap_threshold_seconds: f64,
    pub power_curve_durations: Vec<u32>,
    pub rolling_window_days: i64,
    /// Critical power for W' balance (W); 0 disables W' tracking
    pub critical_power: f64,
    /// Anaerobic work capacity above CP (J)
    pub w_prime: f64,
}

impl Default for AthleteConfig {
    fn default() -> Self {
        Self {
            ftp: 285.0,
            fthr: 170.0,
            weight_kg: 77.0,
            power_zones: None,
            hr_zones: None,
            acute_window_days: DEFAULT_ACUTE_WINDOW_DAYS,
            chronic_window_days: DEFAULT_CHRONIC_WINDOW_DAYS,
            gap_threshold_seconds: DEFAULT_GAP_THRESHOLD_SECONDS,
            power_curve_durations: DEFAULT_POWER_CURVE_DURATIONS.to_vec(),
            rolling_window_days: DEFAULT_ROLLING_WINDOW_DAYS,
            critical_power: 0.0,
            w_prime: 0.0,
        }
    }
}

impl AthleteConfig {
    /// Power zone right edges in watts
    pub fn power_zone_edges(&self) -> Vec<f64> {
        match &self.power_zones {
            Some(zones) => zones.edges.clone(),
            None => POWER_ZONE_FRACTIONS.iter().map(|f| f * self.ftp).collect(),
        }
    }

    /// Heart-rate zone right edges in bpm
    pub fn hr_zone_edges(&self) -> Vec<f64> {
        match &self.hr_zones {
            Some(zones) => zones.edges.clone(),
            None => HR_ZONE_FRACTIONS.iter().map(|f| f * self.fthr).collect(),
        }
    }

    /// `(cp, w_prime)` when both are configured
    pub fn cp_model(&self) -> Option<(f64, f64)> {
        (self.critical_power > 0.0 && self.w_prime > 0.0).then_some((self.critical_power, self.w_prime))
    }

    /// Check ranges and ordering; returns the first problem found
    pub fn validate(&self) -> Result<(), ComputeError> {
        if !(self.ftp.is_finite() && self.ftp >= 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "functional_threshold_power must be >= 0, got {}",
                self.ftp
            )));
        }
        if !(self.fthr.is_finite() && self.fthr >= 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "functional_threshold_heart_rate must be >= 0, got {}",
                self.fthr
            )));
        }
        if !(self.weight_kg.is_finite() && self.weight_kg > 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "weight_kg must be > 0, got {}",
                self.weight_kg
            )));
        }
        for (name, value) in [("critical_power", self.critical_power), ("w_prime", self.w_prime)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ComputeError::InvalidConfig(format!(
                    "{name} must be >= 0, got {value}"
                )));
            }
        }
        if !(self.acute_window_days > 0.0 && self.chronic_window_days > 0.0) {
            return Err(ComputeError::InvalidConfig(
                "acute and chronic windows must be > 0 days".to_string(),
            ));
        }
        if !(self.gap_threshold_seconds > 0.0) {
            return Err(ComputeError::InvalidConfig(
                "gap_threshold_seconds must be > 0".to_string(),
            ));
        }
        if self.rolling_window_days <= 0 {
            return Err(ComputeError::InvalidConfig(
                "rolling_window_days must be > 0".to_string(),
            ));
        }
        if self.power_curve_durations.iter().any(|&d| d == 0) {
            return Err(ComputeError::InvalidConfig(
                "power_curve_durations must be positive".to_string(),
            ));
        }
        for (name, zones) in [("zone_configuration", &self.power_zones), ("hr_zones", &self.hr_zones)] {
            if let Some(zones) = zones {
                check_edges(name, &zones.edges)?;
            }
        }
        Ok(())
    }

    /// Load configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }
}

fn check_edges(name: &str, edges: &[f64]) -> Result<(), ComputeError> {
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(ComputeError::InvalidConfig(format!(
            "{name}: edges must be finite"
        )));
    }
    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ComputeError::InvalidConfig(format!(
            "{name}: edges must be strictly increasing"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_default_is_valid() {
        assert!(AthleteConfig::default().validate().is_ok());
    }

    #[test]
    fn test_cp_model_needs_both_values() {
        let mut config = AthleteConfig::default();
        assert_eq!(config.cp_model(), None);
        config.critical_power = 250.0;
        assert_eq!(config.cp_model(), None);
        config.w_prime = 20_000.0;
        assert_eq!(config.cp_model(), Some((250.0, 20_000.0)));

        config.w_prime = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_power_edges() {
        let config = AthleteConfig {
            ftp: 200.0,
            ..Default::default()
        };
        let edges = config.power_zone_edges();
        assert_eq!(edges.len(), 6);
        assert!((edges[0] - 110.0).abs() < 1e-9);
        assert!((edges[5] - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_edges_win() {
        let config = AthleteConfig {
            power_zones: Some(ZoneConfiguration::new(
                vec![157.0, 214.0, 256.0, 300.0, 342.0],
                Utc.with_ymd_and_hms(2025, 11, 25, 12, 0, 0).unwrap(),
            )),
            ..Default::default()
        };
        assert_eq!(
            config.power_zone_edges(),
            vec![157.0, 214.0, 256.0, 300.0, 342.0]
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AthleteConfig::from_json(
            r#"{"functional_threshold_power": 250, "weight_kg": 70}"#,
        )
        .unwrap();
        assert_eq!(config.ftp, 250.0);
        assert_eq!(config.fthr, 170.0);
        assert_eq!(config.chronic_window_days, 42.0);
        assert_eq!(config.power_curve_durations.len(), 13);
    }

    #[test]
    fn test_short_aliases() {
        let config = AthleteConfig::from_json(r#"{"ftp": 240, "fthr": 165}"#).unwrap();
        assert_eq!(config.ftp, 240.0);
        assert_eq!(config.fthr, 165.0);
    }

    #[test]
    fn test_rejects_unsorted_edges() {
        let json = r#"{
            "zone_configuration": {
                "edges": [200, 150],
                "active_since": "2025-11-25T12:00:00Z"
            }
        }"#;
        let err = AthleteConfig::from_json(json).unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_non_positive_weight() {
        let config = AthleteConfig {
            weight_kg: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AthleteConfig::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("functional_threshold_power"));
        assert_eq!(AthleteConfig::from_json(&json).unwrap(), config);
    }
}
