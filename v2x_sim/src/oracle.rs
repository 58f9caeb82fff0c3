//! Synthetic ground-truth traffic.
//!
//! The TrafficOracle is a stand-in for a traffic simulator:
//! - Vehicles of mixed kinds spawn at seeded random positions
//! - Each drives a straight line at constant speed (heading in degrees,
//!   counter-clockwise from +x)
//! - Vehicles leaving the area are despawned
//!
//! Stepping ends after the configured duration or once no vehicle remains.

use async_trait::async_trait;
use nalgebra::Vector2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use v2x_env::{EnvError, GroundTruthStepper, StepFrame, VehicleTelemetry};

/// Kinds of road users the oracle spawns. The kind is reported as the
/// vehicle class and also encoded in the id prefix, the way simulator route
/// files usually name their flows.
const KINDS: [(&str, &str, f64, f64); 6] = [
    // (id prefix, vehicle class, min speed m/s, max speed m/s)
    ("veh", "passenger", 5.0, 20.0),
    ("truck", "truck", 4.0, 14.0),
    ("bus", "bus", 4.0, 12.0),
    ("bike", "motorcycle", 6.0, 22.0),
    ("bicycle", "bicycle", 2.0, 7.0),
    ("pedestrian", "pedestrian", 0.8, 1.8),
];

/// Oracle parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Master seed
    pub seed: u64,

    /// Vehicles present at step 0
    pub num_vehicles: usize,

    /// Simulated seconds before stepping ends
    pub duration_s: f64,

    /// Seconds per step
    pub step_length: f64,

    /// Area `[xmin, ymin, xmax, ymax]` in meters; vehicles leaving it despawn
    pub area: [f64; 4],
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_vehicles: 12,
            duration_s: 30.0,
            step_length: 0.1,
            area: [0.0, 0.0, 500.0, 300.0],
        }
    }
}

/// A simulated road user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimVehicle {
    pub id: String,
    pub vehicle_class: String,
    pub position: Vector2<f64>,
    pub speed: f64,
    pub heading_deg: f64,
}

impl SimVehicle {
    fn advance(&mut self, dt: f64) {
        let h = self.heading_deg.to_radians();
        self.position += Vector2::new(h.cos(), h.sin()) * (self.speed * dt);
    }

    fn telemetry(&self) -> VehicleTelemetry {
        VehicleTelemetry::new(
            self.id.clone(),
            self.position.x,
            self.position.y,
            self.speed,
            self.heading_deg,
        )
        .with_class(self.vehicle_class.clone())
    }
}

/// Seeded synthetic traffic implementing [`GroundTruthStepper`].
pub struct TrafficOracle {
    config: OracleConfig,
    vehicles: Vec<SimVehicle>,
    step: u64,
    started: bool,
}

impl TrafficOracle {
    pub fn new(config: OracleConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let vehicles = (0..config.num_vehicles)
            .map(|n| Self::spawn(&mut rng, &config.area, n))
            .collect();

        Self {
            config,
            vehicles,
            step: 0,
            started: false,
        }
    }

    /// The first vehicle is always a car so `veh_0` exists as an ego.
    fn spawn(rng: &mut ChaCha8Rng, area: &[f64; 4], n: usize) -> SimVehicle {
        let (prefix, class, min_speed, max_speed) = if n == 0 {
            KINDS[0]
        } else {
            *KINDS.choose(rng).unwrap_or(&KINDS[0])
        };

        // Keep spawns away from the edges so nobody despawns immediately
        let [xmin, ymin, xmax, ymax] = *area;
        let (mx, my) = ((xmax - xmin) * 0.1, (ymax - ymin) * 0.1);

        SimVehicle {
            id: format!("{prefix}_{n}"),
            vehicle_class: class.to_string(),
            position: Vector2::new(
                rng.gen_range(xmin + mx..xmax - mx),
                rng.gen_range(ymin + my..ymax - my),
            ),
            speed: rng.gen_range(min_speed..max_speed),
            heading_deg: rng.gen_range(0.0..360.0),
        }
    }

    /// Advance every vehicle by one step and despawn those outside the area.
    pub fn advance(&mut self) {
        let dt = self.config.step_length;
        let [xmin, ymin, xmax, ymax] = self.config.area;

        for vehicle in &mut self.vehicles {
            vehicle.advance(dt);
        }

        let before = self.vehicles.len();
        self.vehicles.retain(|v| {
            (xmin..=xmax).contains(&v.position.x) && (ymin..=ymax).contains(&v.position.y)
        });
        if self.vehicles.len() < before {
            debug!(
                "Step {}: {} vehicles left the area, {} remain",
                self.step,
                before - self.vehicles.len(),
                self.vehicles.len()
            );
        }
        self.step += 1;
    }

    pub fn time(&self) -> f64 {
        self.step as f64 * self.config.step_length
    }

    pub fn vehicles(&self) -> &[SimVehicle] {
        &self.vehicles
    }

    fn finished(&self) -> bool {
        self.vehicles.is_empty() || self.time() >= self.config.duration_s
    }
}

#[async_trait]
impl GroundTruthStepper for TrafficOracle {
    async fn next_step(&mut self) -> Result<Option<StepFrame>, EnvError> {
        // Step 0 reports spawn positions
        if self.started {
            self.advance();
        }
        self.started = true;
        if self.finished() {
            return Ok(None);
        }

        Ok(Some(StepFrame {
            step: self.step,
            vehicles: self.vehicles.iter().map(SimVehicle::telemetry).collect(),
        }))
    }

    fn step_length(&self) -> f64 {
        self.config.step_length
    }
}
