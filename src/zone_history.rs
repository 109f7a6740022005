//! Backward propagation of the active zone configuration through history
//!
//! A configuration change at time T applies to the activity closest to T and
//! to every older activity that has no zone edges yet. Activities newer than
//! that anchor keep whatever they were analysed with.

use crate::types::{ActivityRecord, ZoneBins, ZoneConfiguration};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which zone edges on a record a pass writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneTarget {
    Power,
    HeartRate,
}

impl ZoneTarget {
    fn slot<'a>(&self, record: &'a mut ActivityRecord) -> &'a mut Option<ZoneBins> {
        match self {
            ZoneTarget::Power => &mut record.zone_bins,
            ZoneTarget::HeartRate => &mut record.hr_zone_bins,
        }
    }

    fn is_set(&self, record: &ActivityRecord) -> bool {
        match self {
            ZoneTarget::Power => record.zone_bins.is_some(),
            ZoneTarget::HeartRate => record.hr_zone_bins.is_some(),
        }
    }
}

/// Result of one backpropagation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpropagationOutcome {
    /// Id of the anchor record, `None` when the pass was a no-op
    pub anchor_id: Option<u64>,
    /// Number of records whose edges were written
    pub assigned: usize,
}

pub struct ZoneBoundaryHistoryManager;

impl ZoneBoundaryHistoryManager {
    /// Apply `config` to `records` anchored at `config.active_since`.
    ///
    /// `records` is sorted in place, most recent first.
    pub fn backpropagate(
        records: &mut [ActivityRecord],
        config: &ZoneConfiguration,
        target: ZoneTarget,
    ) -> BackpropagationOutcome {
        records.sort_by(|a, b| b.start_date.cmp(&a.start_date));

        if records.iter().all(|r| target.is_set(r)) {
            debug!(?target, "all records carry zone edges, nothing to propagate");
            return BackpropagationOutcome::default();
        }

        let anchor_time = config.active_since;
        let mut anchor = 0usize;
        let mut best = i64::MAX;
        for (i, record) in records.iter().enumerate() {
            let distance = (record.start_date - anchor_time).num_seconds().abs();
            if distance < best {
                best = distance;
                anchor = i;
            }
        }

        let bins = config.bins();
        *target.slot(&mut records[anchor]) = Some(bins.clone());
        let mut assigned = 1;

        for record in records[anchor + 1..].iter_mut() {
            let slot = target.slot(record);
            if slot.is_none() {
                *slot = Some(bins.clone());
                assigned += 1;
            }
        }

        let anchor_record = &records[anchor];
        info!(
            anchor_id = anchor_record.id,
            anchor_date = %anchor_record.date(),
            assigned,
            edges = %bins,
            "propagated zone configuration"
        );

        BackpropagationOutcome {
            anchor_id: Some(anchor_record.id),
            assigned,
        }
    }
}
