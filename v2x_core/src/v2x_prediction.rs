//! Short-horizon linear motion prediction.

use crate::v2x_history::HistoryLedger;
use serde::{Deserialize, Serialize};

/// Confidence attached to every prediction.
///
/// A fixed heuristic, not a calibrated estimate.
pub const PREDICTION_CONFIDENCE: f64 = 0.8;

/// Predicted world position of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictedPosition {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// Constant-velocity extrapolation from the latest fused state.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionPredictor;

impl MotionPredictor {
    /// Extrapolate `horizon` seconds ahead along the recorded heading.
    ///
    /// ```text
    /// x' = x + speed * horizon * cos(h)
    /// y' = y + speed * horizon * sin(h)
    /// ```
    ///
    /// `None` with fewer than two entries or when the latest entry carries
    /// no world position.
    pub fn predict(&self, ledger: &HistoryLedger, track_id: u64, horizon: f64) -> Option<PredictedPosition> {
        if ledger.len(track_id) < 2 {
            return None;
        }
        let latest = ledger.latest(track_id)?;
        let position = latest.world_position?;
        let heading = latest.heading_deg.to_radians();
        let travel = latest.speed * horizon;

        Some(PredictedPosition {
            x: position.x + travel * heading.cos(),
            y: position.y + travel * heading.sin(),
            confidence: PREDICTION_CONFIDENCE,
        })
    }
}
