//! Trainload - metrics and training-load engine for recorded endurance activities
//!
//! Trainload turns per-second activity recordings into derived training metrics
//! and tracks them across an athlete's history through a deterministic pipeline:
//! payload adaptation → stream preparation → metric derivation → chronological
//! fold (training load, rolling best efforts, critical power, zone history).
//!
//! ## Modules
//!
//! - **Per-activity**: `prepare`, `aggregate`, `zones`, `fatigue`, `power_curve`, `features`
//! - **Longitudinal**: `training_load`, `zone_history`, `pipeline`
//! - **Boundary**: `adapters`, `config`, `encoder`

pub mod adapters;
pub mod aggregate;
pub mod config;
pub mod encoder;
pub mod error;
pub mod fatigue;
pub mod features;
pub mod pipeline;
pub mod power_curve;
pub mod prepare;
pub mod training_load;
pub mod types;
pub mod zone_history;
pub mod zones;

pub use adapters::{parse_stream_payload, ColumnAdapter, SampleAdapter, StreamPayloadAdapter};
pub use aggregate::{TimeWeightedAggregator, TimeWeights};
pub use config::AthleteConfig;
pub use encoder::SummaryEncoder;
pub use error::ComputeError;
pub use features::MetricDeriver;
pub use pipeline::{
    analyze_activity, analyze_batch, analyze_stream, ActivityInput, AthleteTimeline,
    LongitudinalSummary,
};
pub use power_curve::{CpFitter, PowerCurveEngine, RollingPowerCurve};
pub use prepare::StreamPreparer;
pub use training_load::{AcwrStatus, FormStatus, LoadTimeline, TrainingLoadTracker};
pub use types::{
    ActivityMeta, ActivityRecord, CriticalPowerModel, MetricMode, PowerCurvePoint, SportType,
    Stream, StreamColumns, TrainingLoadState, ZoneBins, ZoneConfiguration,
};
pub use zone_history::{ZoneBoundaryHistoryManager, ZoneTarget};
pub use zones::{ThreeZoneDistribution, TidClassification, ZoneClassifier};

/// Engine version embedded in summary payloads
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for summary payloads
pub const PRODUCER_NAME: &str = "trainload";
