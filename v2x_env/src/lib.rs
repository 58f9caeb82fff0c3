//! V2XView Environment Contracts
//!
//! This crate defines the boundary between the fusion engine and the
//! collaborators it consumes but does not implement:
//! - **Ground-truth stepper**: yields `(step, telemetry[])` once per step
//! - **Detection source**: turns a step into `[x1, y1, x2, y2, score, class]` rows
//! - **Multi-object tracker**: turns detections into per-step track records
//!
//! The engine in `v2x_core` only ever reads these values. Reference
//! implementations live in `v2x_sim`.
//!
//! # Example
//!
//! ```ignore
//! use v2x_env::{GroundTruthStepper, DetectionSource, MultiObjectTracker};
//!
//! async fn drive<S, D, T>(stepper: &mut S, source: &mut D, tracker: &mut T)
//! where
//!     S: GroundTruthStepper,
//!     D: DetectionSource,
//!     T: MultiObjectTracker,
//! {
//!     while let Ok(Some(frame)) = stepper.next_step().await {
//!         let detections = source.detect(&frame);
//!         let tracks = tracker.update(&detections, source.image_size());
//!         // hand `frame.vehicles` and `tracks` to the engine
//!     }
//! }
//! ```

mod collaborators;
mod error;
mod types;

pub use collaborators::{DetectionSource, GroundTruthStepper, MultiObjectTracker};
pub use error::EnvError;
pub use types::{Detection, ImageSize, PixelBox, StepFrame, TrackRecord, TrackState, VehicleTelemetry};
