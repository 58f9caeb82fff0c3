//! V2XView Simulation Harness
//!
//! Reference collaborators for the fusion engine and the loop that drives
//! them:
//! - **Ground truth**: seeded synthetic traffic or a recorded JSON trace
//! - **Perception**: telemetry projected into detections, optionally noisy
//! - **Tracking**: a greedy IoU tracker with an explicit track lifecycle
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   StepFrame   ┌───────────────────┐  Detection  ┌──────────────────┐
//! │ TrafficOracle│──────────────►│ SyntheticDetector │────────────►│ GreedyIouTracker │
//! │ / TraceReplay│               └───────────────────┘             └────────┬─────────┘
//! └──────┬───────┘                                                          │ TrackRecord
//!        │ telemetry                                                        ▼
//!        │                      ┌──────────────────────────────────────────────────┐
//!        └─────────────────────►│ FusionEngine (v2x_core)                           │
//!                               └───────────────────────┬──────────────────────────┘
//!                                                       │ BroadcastMessage
//!                                                       ▼
//!                                                MessageExporter
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use v2x_sim::{PipelineRunner, RunnerConfig, TrafficOracle, OracleConfig};
//!
//! let mut runner = PipelineRunner::new(engine, Box::new(oracle), detector, tracker,
//!                                      RunnerConfig::default());
//! let report = runner.run(&mut exporter).await?;
//! ```

mod detector;
mod exporter;
mod oracle;
mod replay;
mod runner;
mod tracker;

pub use detector::{infer_class, BoxSizing, SyntheticDetector};
pub use exporter::{MessageExporter, RunSummary, MESSAGES_FILE, SUMMARY_FILE};
pub use oracle::{OracleConfig, SimVehicle, TrafficOracle};
pub use replay::{Trace, TraceReplay};
pub use runner::{PipelineRunner, RunReport, RunnerConfig, RunnerError};
pub use tracker::{GreedyIouTracker, TrackerConfig};
