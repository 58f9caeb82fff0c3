//! Recorded telemetry replay.
//!
//! A trace is a JSON document holding the step length and the frames a
//! traffic simulator produced:
//!
//! ```json
//! { "step_length": 0.1,
//!   "frames": [ { "step": 0, "vehicles": [ { "id": "veh_0", "x": 1.0,
//!                 "y": 2.0, "speed": 3.0, "angle": 90.0,
//!                 "vehicle_class": "passenger" } ] } ] }
//! ```
//!
//! `vehicle_class` is optional; without it the detector guesses the class
//! from the vehicle id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use v2x_env::{EnvError, GroundTruthStepper, StepFrame};

fn default_step_length() -> f64 {
    0.1
}

/// On-disk trace layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default = "default_step_length")]
    pub step_length: f64,
    pub frames: Vec<StepFrame>,
}

/// Replays a [`Trace`] frame by frame.
#[derive(Debug)]
pub struct TraceReplay {
    step_length: f64,
    frames: VecDeque<StepFrame>,
}

impl TraceReplay {
    pub fn new(trace: Trace) -> Result<Self, EnvError> {
        if !(trace.step_length.is_finite() && trace.step_length > 0.0) {
            return Err(EnvError::unreadable(format!(
                "trace step_length must be positive, got {}",
                trace.step_length
            )));
        }
        Ok(Self {
            step_length: trace.step_length,
            frames: trace.frames.into(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, EnvError> {
        let trace: Trace =
            serde_json::from_str(json).map_err(|e| EnvError::Serialization(e.to_string()))?;
        Self::new(trace)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| EnvError::unreadable(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Frames not yet replayed.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl GroundTruthStepper for TraceReplay {
    async fn next_step(&mut self) -> Result<Option<StepFrame>, EnvError> {
        Ok(self.frames.pop_front())
    }

    fn step_length(&self) -> f64 {
        self.step_length
    }
}
