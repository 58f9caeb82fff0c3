//! The "MATCHING" Engine - Track ↔ Ground-Truth Association
//!
//! Associates each tracker track with zero or one simulated vehicle:
//! 1. **Sticky reuse**: a previous association is kept as long as its vehicle
//!    is still present, without any geometric recompute. This suppresses
//!    identity flicker when vehicles pass close to each other.
//! 2. **Nearest neighbor**: otherwise every vehicle is projected into pixel
//!    space and the closest one under the pixel threshold wins. Exact ties go
//!    to the vehicle listed first.
//!
//! One vehicle per live track is *not* enforced: two tracks may end up mapped
//! to the same vehicle.

use crate::v2x_mapping::CoordinateMapper;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use v2x_env::{PixelBox, TrackRecord, VehicleTelemetry};

/// Default maximum pixel distance for a geometric match.
pub const DEFAULT_MATCH_THRESHOLD_PX: f64 = 50.0;

// ============================================================================
// STICKY MAPPING
// ============================================================================

/// Persisted `track_id → vehicle_id` associations.
#[derive(Debug, Clone, Default)]
pub struct StickyMapping {
    links: BTreeMap<u64, String>,
}

impl StickyMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_id: u64) -> Option<&str> {
        self.links.get(&track_id).map(String::as_str)
    }

    /// Record (or overwrite) the vehicle for a track.
    pub fn link(&mut self, track_id: u64, vehicle_id: &str) {
        match self.links.get_mut(&track_id) {
            Some(existing) if existing == vehicle_id => {}
            Some(existing) => *existing = vehicle_id.to_string(),
            None => {
                self.links.insert(track_id, vehicle_id.to_string());
            }
        }
    }

    pub fn unlink(&mut self, track_id: u64) -> Option<String> {
        self.links.remove(&track_id)
    }

    /// Lowest track id linked to `vehicle_id`.
    pub fn track_for_vehicle(&self, vehicle_id: &str) -> Option<u64> {
        self.tracks_for_vehicle(vehicle_id).next()
    }

    /// Every track id linked to `vehicle_id`, ascending.
    pub fn tracks_for_vehicle<'a>(&'a self, vehicle_id: &'a str) -> impl Iterator<Item = u64> + 'a {
        self.links
            .iter()
            .filter(move |(_, v)| v.as_str() == vehicle_id)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }
}

// ============================================================================
// MATCH RESULT
// ============================================================================

/// How a track was associated with its vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    /// Reused from the sticky mapping
    Sticky,
    /// Nearest projected vehicle under the threshold
    Geometric { distance_px: f64 },
}

/// A vehicle chosen for a track.
#[derive(Debug, Clone, Copy)]
pub struct TrackMatch<'v> {
    pub vehicle: &'v VehicleTelemetry,
    pub kind: MatchKind,
}

// ============================================================================
// FUSED TRACK
// ============================================================================

/// A tracker record enriched with its matched ground truth.
///
/// Unmatched tracks carry `matched = false`, no telemetry, zero acceleration
/// and a zero direction vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedTrack {
    pub record: TrackRecord,
    pub telemetry: Option<VehicleTelemetry>,
    pub match_kind: Option<MatchKind>,
    pub acceleration: f64,
    pub direction_vector: Vector2<f64>,
    pub matched: bool,
}

impl FusedTrack {
    pub fn unmatched(record: TrackRecord) -> Self {
        Self {
            record,
            telemetry: None,
            match_kind: None,
            acceleration: 0.0,
            direction_vector: Vector2::zeros(),
            matched: false,
        }
    }

    pub fn matched(
        record: TrackRecord,
        telemetry: VehicleTelemetry,
        kind: MatchKind,
        acceleration: f64,
        direction_vector: Vector2<f64>,
    ) -> Self {
        Self {
            record,
            telemetry: Some(telemetry),
            match_kind: Some(kind),
            acceleration,
            direction_vector,
            matched: true,
        }
    }

    #[inline]
    pub fn track_id(&self) -> u64 {
        self.record.track_id
    }

    #[inline]
    pub fn bbox(&self) -> PixelBox {
        self.record.bbox
    }

    #[inline]
    pub fn class_id(&self) -> u32 {
        self.record.class_id
    }

    pub fn vehicle_id(&self) -> Option<&str> {
        self.telemetry.as_ref().map(|t| t.id.as_str())
    }

    pub fn speed(&self) -> Option<f64> {
        self.telemetry.as_ref().map(|t| t.speed)
    }

    pub fn heading_deg(&self) -> Option<f64> {
        self.telemetry.as_ref().map(|t| t.heading_deg)
    }

    pub fn world_position(&self) -> Option<Vector2<f64>> {
        self.telemetry.as_ref().map(|t| Vector2::new(t.x, t.y))
    }

    /// Bounding-box center in pixels.
    pub fn pixel_center(&self) -> Vector2<f64> {
        let (cx, cy) = self.record.center();
        Vector2::new(cx, cy)
    }
}

// ============================================================================
// MATCHER
// ============================================================================

/// Associates tracks with vehicles for one step.
#[derive(Debug, Clone, Copy)]
pub struct TrackMatcher {
    threshold_px: f64,
}

impl TrackMatcher {
    pub fn new(threshold_px: f64) -> Self {
        Self { threshold_px }
    }

    pub fn threshold_px(&self) -> f64 {
        self.threshold_px
    }

    /// Choose a vehicle for one track, or `None` when unmatched.
    ///
    /// Without a mapper (world bounds not yet known) only sticky reuse is
    /// possible.
    pub fn match_track<'v>(
        &self,
        track: &TrackRecord,
        vehicles: &'v [VehicleTelemetry],
        sticky: &StickyMapping,
        mapper: Option<&CoordinateMapper>,
    ) -> Option<TrackMatch<'v>> {
        if let Some(vehicle_id) = sticky.get(track.track_id) {
            if let Some(vehicle) = vehicles.iter().find(|v| v.id == vehicle_id) {
                return Some(TrackMatch {
                    vehicle,
                    kind: MatchKind::Sticky,
                });
            }
        }

        let (cx, cy) = track.center();
        let (vehicle, distance_px) = self.nearest_vehicle(Vector2::new(cx, cy), vehicles, mapper?)?;
        Some(TrackMatch {
            vehicle,
            kind: MatchKind::Geometric { distance_px },
        })
    }

    /// Closest vehicle to a pixel position strictly under the threshold.
    ///
    /// Strict comparison keeps the first-listed vehicle on exact ties.
    pub fn nearest_vehicle<'v>(
        &self,
        center: Vector2<f64>,
        vehicles: &'v [VehicleTelemetry],
        mapper: &CoordinateMapper,
    ) -> Option<(&'v VehicleTelemetry, f64)> {
        let mut best: Option<(&VehicleTelemetry, f64)> = None;

        for vehicle in vehicles {
            let distance = (mapper.project(vehicle.x, vehicle.y) - center).norm();
            if distance >= self.threshold_px {
                continue;
            }
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((vehicle, distance)),
            }
        }

        best
    }

    /// Match every track independently, preserving input order.
    pub fn match_all<'v>(
        &self,
        tracks: &[TrackRecord],
        vehicles: &'v [VehicleTelemetry],
        sticky: &StickyMapping,
        mapper: Option<&CoordinateMapper>,
    ) -> Vec<Option<TrackMatch<'v>>> {
        tracks
            .iter()
            .map(|track| self.match_track(track, vehicles, sticky, mapper))
            .collect()
    }
}

impl Default for TrackMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD_PX)
    }
}

// ============================================================================
// TESTS
// ============================================================================
