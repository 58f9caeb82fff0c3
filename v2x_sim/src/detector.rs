//! Telemetry → detection rows.
//!
//! Projects every vehicle into pixel space and draws a box around it. With
//! noise disabled every detection scores 1.0, like a simulator-grounded
//! detector. Gaussian center jitter simulates a vision model: the further a
//! box is pushed off its vehicle, the lower its score.
//!
//! A vehicle's class id comes from its simulator vehicle class through the
//! configured type table. Vehicles without a reported class fall back to
//! [`infer_class`] on their id.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use v2x_core::{FusionConfig, FusionError, LazyMapper};
use v2x_env::{Detection, DetectionSource, ImageSize, PixelBox, StepFrame, VehicleTelemetry};

/// Lowest score a noisy detection can get.
const MIN_NOISY_SCORE: f64 = 0.3;

/// Jitter (px) at which the score has dropped by one half.
const SCORE_HALF_DISTANCE_PX: f64 = 20.0;

/// How box extents are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxSizing {
    /// Per-class base half-size table
    #[default]
    PerClass,
    /// Configured vehicle length scaled by the map resolution
    VehicleLength,
}

/// Class id from a simulator vehicle id.
///
/// Keywords are checked in order; anything else is a car.
pub fn infer_class(vehicle_id: &str) -> u32 {
    let id = vehicle_id.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| id.contains(w));

    if has(&["truck", "freight"]) {
        2
    } else if has(&["bus"]) {
        3
    } else if has(&["bike", "motorcycle"]) {
        4
    } else if has(&["bicycle", "cycle"]) {
        5
    } else if has(&["pedestrian", "person"]) {
        0
    } else {
        1
    }
}

pub struct SyntheticDetector {
    config: FusionConfig,
    mapper: LazyMapper,
    sizing: BoxSizing,
    noise: Option<Normal<f64>>,
    rng: ChaCha8Rng,
}

impl SyntheticDetector {
    /// Noise-free detector sharing the engine's projection settings.
    pub fn new(config: &FusionConfig) -> Result<Self, FusionError> {
        Ok(Self {
            mapper: LazyMapper::new(config.bounds()?, config.image_size, config.bounds_margin_m)?,
            config: config.clone(),
            sizing: BoxSizing::default(),
            noise: None,
            rng: ChaCha8Rng::seed_from_u64(0),
        })
    }

    /// Enable Gaussian center jitter with standard deviation `std_px`.
    pub fn with_noise(mut self, std_px: f64, seed: u64) -> Result<Self, FusionError> {
        if std_px > 0.0 {
            let normal = Normal::new(0.0, std_px).map_err(|e| {
                FusionError::InvalidConfig(format!("detector noise {std_px}: {e}"))
            })?;
            self.noise = Some(normal);
            self.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        Ok(self)
    }

    pub fn with_sizing(mut self, sizing: BoxSizing) -> Self {
        self.sizing = sizing;
        self
    }

    /// Class id from the reported vehicle class, else guessed from the id.
    pub fn class_of(&self, vehicle: &VehicleTelemetry) -> u32 {
        match &vehicle.vehicle_class {
            Some(class) => self.config.vehicle_class_id(class),
            None => infer_class(&vehicle.id),
        }
    }

    /// Shift a box by a random offset and score it by the offset length.
    fn jitter(&mut self, bbox: PixelBox, normal: Normal<f64>) -> (PixelBox, f64) {
        let dx = normal.sample(&mut self.rng);
        let dy = normal.sample(&mut self.rng);
        let shifted = PixelBox::new(bbox.x1 + dx, bbox.y1 + dy, bbox.x2 + dx, bbox.y2 + dy);

        let offset = dx.hypot(dy);
        let score = (SCORE_HALF_DISTANCE_PX / (SCORE_HALF_DISTANCE_PX + offset))
            .clamp(MIN_NOISY_SCORE, 0.99);
        (shifted.clamped(self.config.image_size), score)
    }
}

impl DetectionSource for SyntheticDetector {
    fn detect(&mut self, frame: &StepFrame) -> Vec<Detection> {
        let Some(mapper) = self.mapper.ensure(&frame.vehicles).copied() else {
            return Vec::new();
        };

        let mut detections = Vec::with_capacity(frame.vehicles.len());
        for vehicle in &frame.vehicles {
            let class_id = self.class_of(vehicle);
            let bbox = match self.sizing {
                BoxSizing::PerClass => {
                    mapper.class_bbox(vehicle.x, vehicle.y, vehicle.speed, self.config.half_size(class_id))
                }
                BoxSizing::VehicleLength => {
                    mapper.vehicle_bbox(vehicle.x, vehicle.y, vehicle.speed, self.config.vehicle_length_m)
                }
            };

            let (bbox, score) = match self.noise {
                Some(normal) => self.jitter(bbox, normal),
                None => (bbox, 1.0),
            };
            detections.push(Detection::new(bbox, score, class_id));
        }
        detections
    }

    fn image_size(&self) -> ImageSize {
        self.config.image_size
    }

    fn reset(&mut self) {
        self.mapper.reset();
    }
}
