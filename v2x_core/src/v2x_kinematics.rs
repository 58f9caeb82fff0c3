//! Kinematics derived from ground-truth telemetry and track history.

use crate::v2x_history::HistoryLedger;
use nalgebra::Vector2;

/// Finite-difference estimator over the fixed simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicsEstimator {
    /// Fixed step length in seconds; validated positive by the config
    step_length: f64,
}

impl KinematicsEstimator {
    pub fn new(step_length: f64) -> Self {
        Self { step_length }
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    /// `(current_speed - last_recorded_speed) / dt` for a track.
    ///
    /// Needs at least two recorded entries; returns 0.0 otherwise. Called
    /// before the current step's entry is appended, so the latest entry is
    /// the previous step.
    pub fn acceleration(&self, ledger: &HistoryLedger, track_id: u64, current_speed: f64) -> f64 {
        if ledger.len(track_id) < 2 {
            return 0.0;
        }
        match ledger.latest(track_id) {
            Some(previous) => (current_speed - previous.speed) / self.step_length,
            None => 0.0,
        }
    }
}

/// Unit heading vector `(cos h, sin h)` for a heading in degrees.
#[inline]
pub fn direction_vector(heading_deg: f64) -> Vector2<f64> {
    let rad = heading_deg.to_radians();
    Vector2::new(rad.cos(), rad.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v2x_history::HistoryEntry;
    use approx::assert_relative_eq;

    fn push_speed(ledger: &mut HistoryLedger, track_id: u64, step: u64, speed: f64) {
        ledger.append(
            track_id,
            HistoryEntry {
                step,
                pixel_center: Vector2::zeros(),
                speed,
                heading_deg: 0.0,
                world_position: None,
            },
        );
    }

    #[test]
    fn test_acceleration_from_zero_to_ten() {
        let mut ledger = HistoryLedger::with_defaults();
        push_speed(&mut ledger, 1, 0, 0.0);
        push_speed(&mut ledger, 1, 1, 0.0);

        let estimator = KinematicsEstimator::new(0.1);
        assert_relative_eq!(estimator.acceleration(&ledger, 1, 10.0), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_acceleration_uses_latest_entry() {
        let mut ledger = HistoryLedger::with_defaults();
        push_speed(&mut ledger, 1, 0, 4.0);
        push_speed(&mut ledger, 1, 1, 5.0);

        let estimator = KinematicsEstimator::new(0.5);
        assert_relative_eq!(estimator.acceleration(&ledger, 1, 4.0), -2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_acceleration_needs_two_entries() {
        let mut ledger = HistoryLedger::with_defaults();
        let estimator = KinematicsEstimator::new(0.1);
        assert_eq!(estimator.acceleration(&ledger, 1, 10.0), 0.0);

        push_speed(&mut ledger, 1, 0, 0.0);
        assert_eq!(estimator.acceleration(&ledger, 1, 10.0), 0.0);
    }

    #[test]
    fn test_direction_vector() {
        let east = direction_vector(0.0);
        assert_relative_eq!(east.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(east.y, 0.0, epsilon = 1e-12);

        let north = direction_vector(90.0);
        assert_relative_eq!(north.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(north.y, 1.0, epsilon = 1e-12);

        assert_relative_eq!(direction_vector(237.0).norm(), 1.0, epsilon = 1e-12);
    }
}
