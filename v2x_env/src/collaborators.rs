//! Traits for the collaborators the fusion engine consumes.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{Detection, ImageSize, StepFrame, TrackRecord};

/// Source of ground-truth telemetry, one pull per simulation step.
///
/// # Termination
///
/// * `Ok(Some(frame))` - the next step's telemetry
/// * `Ok(None)` - no more vehicles are expected; clean termination
/// * `Err(_)` - the underlying simulation failed
///
/// Awaiting `next_step` is the only suspension point of a pipeline run.
/// Callers that race it against an interrupt must tolerate the future being
/// dropped before completion.
#[async_trait]
pub trait GroundTruthStepper: Send {
    async fn next_step(&mut self) -> Result<Option<StepFrame>, EnvError>;

    /// Fixed simulated time between two steps, in seconds.
    fn step_length(&self) -> f64;
}

/// Produces detection rows for a step.
///
/// A simulation-grounded source emits score 1.0; a vision model or a noisy
/// source emits lower scores.
pub trait DetectionSource: Send {
    fn detect(&mut self, frame: &StepFrame) -> Vec<Detection>;

    /// Dimensions of the pixel space the detections live in.
    fn image_size(&self) -> ImageSize;

    /// Forgets state derived from earlier steps (e.g. frozen projection
    /// bounds), so the next frame is handled like the first one.
    fn reset(&mut self);
}

/// An opaque multi-object tracker.
///
/// Given the current step's detections it returns the tracks alive at this
/// step. Track ids must stay stable for the lifetime of a track.
pub trait MultiObjectTracker: Send {
    fn update(&mut self, detections: &[Detection], image: ImageSize) -> Vec<TrackRecord>;

    /// Drops all tracks and restarts id allocation.
    fn reset(&mut self);
}
