//! V2XView Core - Track/Telemetry Fusion for V2X Awareness
//!
//! Fuses a camera-style multi-object tracker with simulator ground truth and
//! produces V2X messages:
//! 1. **Identity**: pixel-space matching with sticky associations keeps a
//!    track bound to the same vehicle across steps
//! 2. **Motion**: a bounded per-track history feeds acceleration estimates
//!    and linear short-horizon prediction
//! 3. **Awareness**: CAM messages for every track, and observer-centric
//!    broadcasts optionally restricted to the V2X communication range
//!
//! [`FusionEngine`] owns all cross-step state; the component modules are
//! usable on their own.

pub mod config;
pub mod fusion_engine;
pub mod v2x_history;
pub mod v2x_kinematics;
pub mod v2x_mapping;
pub mod v2x_matching;
pub mod v2x_messages;
pub mod v2x_prediction;
pub mod v2x_relevance;

// Re-export key types for convenience
pub use config::FusionConfig;
pub use fusion_engine::{EngineStats, FusionEngine, FusionError};
pub use v2x_history::{HistoryEntry, HistoryLedger, Trajectory};
pub use v2x_kinematics::KinematicsEstimator;
pub use v2x_mapping::{CoordinateMapper, LazyMapper, MappingError, WorldBounds};
pub use v2x_matching::{FusedTrack, MatchKind, StickyMapping, TrackMatcher};
pub use v2x_messages::{
    BroadcastMessage, CamMessage, MessageAssembler, MessageSummary, MessageType, V2xType,
    VehicleRecord,
};
pub use v2x_prediction::{MotionPredictor, PredictedPosition};
pub use v2x_relevance::relevant_tracks;
