//! Fusion engine configuration.
//!
//! One structure carries every tunable of the engine. It deserializes from
//! JSON with missing fields falling back to [`FusionConfig::default`].

use crate::fusion_engine::FusionError;
use crate::v2x_mapping::{WorldBounds, AUTO_BOUNDS_MARGIN_M};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use v2x_env::ImageSize;

/// Class id used for pedestrians in the default class table.
pub const PEDESTRIAN_CLASS_ID: u32 = 0;

/// Class id for simulator vehicle classes missing from the type table.
pub const DEFAULT_VEHICLE_CLASS_ID: u32 = 1;

/// Half-size used for classes missing from the half-size table.
pub const FALLBACK_HALF_SIZE: (u32, u32) = (12, 6);

/// Configuration for the [`FusionEngine`](crate::FusionEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Class id → display name (default: 0=person … 5=bicycle)
    pub class_names: BTreeMap<u32, String>,

    /// Class id → base `(half_w, half_h)` box size in pixels
    pub class_half_sizes: BTreeMap<u32, (u32, u32)>,

    /// Simulator vehicle class → class id (default: passenger=1, truck=2,
    /// bus=3, motorcycle=4, bicycle=5, pedestrian=0)
    pub vehicle_types: BTreeMap<String, u32>,

    /// Class id classified as a Vulnerable Road User (default: 0)
    pub pedestrian_class_id: u32,

    /// V2X communication range in meters (default: 300)
    pub v2x_range_m: f64,

    /// Broadcast every N steps (default: 5)
    pub broadcast_interval: u32,

    /// Maximum pixel distance for a geometric match (default: 50)
    pub match_threshold_px: f64,

    /// Maximum history entries kept per track (default: 30)
    pub history_cap: usize,

    /// Fixed simulation step length in seconds (default: 0.1)
    pub step_length: f64,

    /// Real-world vehicle length used for box sizing (default: 2.0 m)
    pub vehicle_length_m: f64,

    /// Output pixel raster (default: 1200x800)
    pub image_size: ImageSize,

    /// Fixed world bounds `[xmin, ymin, xmax, ymax]`; `None` = auto from first batch
    pub world_bounds: Option<[f64; 4]>,

    /// Margin around auto-computed bounds (default: 10 m)
    pub bounds_margin_m: f64,

    /// Default prediction horizon in seconds (default: 1.0)
    pub prediction_horizon_s: f64,

    /// Drop a track's history once it has not been seen for this many steps.
    /// `None` keeps history for the lifetime of the engine.
    pub history_max_age: Option<u64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        let class_names = [
            (0, "person"),
            (1, "car"),
            (2, "truck"),
            (3, "bus"),
            (4, "motorcycle"),
            (5, "bicycle"),
        ]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();

        let class_half_sizes = BTreeMap::from([
            (0, (8, 8)),
            (1, (12, 6)),
            (2, (18, 8)),
            (3, (20, 10)),
            (4, (6, 4)),
            (5, (4, 4)),
        ]);

        let vehicle_types = [
            ("passenger", 1),
            ("truck", 2),
            ("bus", 3),
            ("motorcycle", 4),
            ("bicycle", 5),
            ("pedestrian", 0),
        ]
        .into_iter()
        .map(|(class, id)| (class.to_string(), id))
        .collect();

        Self {
            class_names,
            class_half_sizes,
            vehicle_types,
            pedestrian_class_id: PEDESTRIAN_CLASS_ID,
            v2x_range_m: 300.0,
            broadcast_interval: 5,
            match_threshold_px: 50.0,
            history_cap: 30,
            step_length: 0.1,
            vehicle_length_m: 2.0,
            image_size: ImageSize::default(),
            world_bounds: None,
            bounds_margin_m: AUTO_BOUNDS_MARGIN_M,
            prediction_horizon_s: 1.0,
            history_max_age: None,
        }
    }
}

impl FusionConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self, FusionError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FusionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), FusionError> {
        if !(self.step_length.is_finite() && self.step_length > 0.0) {
            return Err(FusionError::InvalidStepLength(self.step_length));
        }
        if self.history_cap == 0 {
            return Err(FusionError::InvalidConfig("history_cap must be at least 1".into()));
        }
        if self.broadcast_interval == 0 {
            return Err(FusionError::InvalidConfig("broadcast_interval must be at least 1".into()));
        }
        if !positive(self.match_threshold_px) {
            return Err(FusionError::InvalidConfig(format!(
                "match_threshold_px must be positive, got {}",
                self.match_threshold_px
            )));
        }
        if !positive(self.vehicle_length_m) {
            return Err(FusionError::InvalidConfig(format!(
                "vehicle_length_m must be positive, got {}",
                self.vehicle_length_m
            )));
        }
        if !matches!(
            self.v2x_range_m.partial_cmp(&0.0),
            Some(Ordering::Greater | Ordering::Equal)
        ) {
            return Err(FusionError::InvalidConfig(format!(
                "v2x_range_m must be non-negative, got {}",
                self.v2x_range_m
            )));
        }
        self.bounds()?;
        Ok(())
    }

    /// Validated world bounds, if configured.
    pub fn bounds(&self) -> Result<Option<WorldBounds>, FusionError> {
        self.world_bounds
            .map(WorldBounds::from_array)
            .transpose()
            .map_err(FusionError::from)
    }

    /// Display name for a class id, `"unknown"` when not in the table.
    pub fn class_name(&self, class_id: u32) -> &str {
        self.class_names
            .get(&class_id)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    /// Class id for a simulator vehicle class, the default car class when
    /// the type table has no entry for it.
    pub fn vehicle_class_id(&self, vehicle_class: &str) -> u32 {
        self.vehicle_types
            .get(vehicle_class)
            .copied()
            .unwrap_or(DEFAULT_VEHICLE_CLASS_ID)
    }

    /// Base box half-size for a class.
    pub fn half_size(&self, class_id: u32) -> (u32, u32) {
        self.class_half_sizes
            .get(&class_id)
            .copied()
            .unwrap_or(FALLBACK_HALF_SIZE)
    }
}

/// `x > 0`, false for NaN.
fn positive(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(Ordering::Greater)
}
