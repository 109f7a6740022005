//! Summary encoding
//!
//! This module wraps a longitudinal summary into a JSON payload tagged with
//! producer metadata and the moment it was computed.

use crate::error::ComputeError;
use crate::pipeline::LongitudinalSummary;
use crate::training_load::AcwrStatus;
use crate::{PRODUCER_NAME, VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current summary payload schema version
pub const SUMMARY_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Encoded summary with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub schema_version: String,
    pub producer: SummaryProducer,
    pub computed_at_utc: String,
    pub athlete_id: Option<String>,
    /// Guidance text for the current acute:chronic band
    pub recommendation: Option<String>,
    pub summary: LongitudinalSummary,
}

/// Summary encoder for producing JSON payloads
pub struct SummaryEncoder {
    instance_id: String,
}

impl Default for SummaryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(
        &self,
        summary: &LongitudinalSummary,
        athlete_id: Option<&str>,
    ) -> Result<SummaryPayload, ComputeError> {
        if let Some(cp) = &summary.critical_power {
            if !(cp.cp.is_finite() && cp.w_prime.is_finite()) {
                return Err(ComputeError::EncodingError(
                    "critical power model is not finite".to_string(),
                ));
            }
        }

        Ok(SummaryPayload {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            producer: SummaryProducer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            athlete_id: athlete_id.map(str::to_string),
            recommendation: summary
                .acwr_status
                .as_ref()
                .map(AcwrStatus::recommendation)
                .map(str::to_string),
            summary: summary.clone(),
        })
    }

    /// Encode to pretty JSON string
    pub fn encode_to_json(
        &self,
        summary: &LongitudinalSummary,
        athlete_id: Option<&str>,
    ) -> Result<String, ComputeError> {
        let payload = self.encode(summary, athlete_id)?;
        serde_json::to_string_pretty(&payload).map_err(ComputeError::JsonError)
    }
}
