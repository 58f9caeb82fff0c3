//! The Fusion Engine - Per-Step Track/Telemetry Fusion
//!
//! Owns all cross-step state (history ledger, sticky mapping, frozen world
//! bounds) and runs one step at a time:
//!
//! ```text
//! tracks + telemetry → match → derive kinematics → fused set
//!                                      │
//!                                      └─→ commit (sticky links + history)
//! ```
//!
//! All reads during a step observe the state left by the previous step. The
//! step's mutations are committed together once every track has been fused.

use crate::config::FusionConfig;
use crate::v2x_history::{HistoryEntry, HistoryLedger, Trajectory};
use crate::v2x_kinematics::{direction_vector, KinematicsEstimator};
use crate::v2x_mapping::{CoordinateMapper, LazyMapper, MappingError};
use crate::v2x_matching::{FusedTrack, MatchKind, StickyMapping, TrackMatcher};
use crate::v2x_messages::{BroadcastMessage, CamMessage, MessageAssembler};
use crate::v2x_prediction::{MotionPredictor, PredictedPosition};
use crate::v2x_relevance::relevant_tracks;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, trace};
use v2x_env::{TrackRecord, VehicleTelemetry};

/// Errors raised while building an engine.
///
/// Per-step anomalies never surface here; they degrade to unmatched tracks
/// or `None` results.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Step length must be positive and finite, got {0}")]
    InvalidStepLength(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Running counters over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub steps: u64,
    pub tracks_fused: u64,
    pub sticky_matches: u64,
    pub geometric_matches: u64,
    pub unmatched: u64,
    pub retired_tracks: u64,
}

impl EngineStats {
    /// Fraction of fused tracks that found a vehicle.
    pub fn match_rate(&self) -> f64 {
        if self.tracks_fused == 0 {
            0.0
        } else {
            (self.sticky_matches + self.geometric_matches) as f64 / self.tracks_fused as f64
        }
    }
}

/// Mutations produced by one step, applied in [`FusionEngine::commit`].
struct PendingStep {
    links: Vec<(u64, String)>,
    entries: Vec<(u64, HistoryEntry)>,
}

pub struct FusionEngine {
    config: FusionConfig,
    mapper: LazyMapper,
    matcher: TrackMatcher,
    ledger: HistoryLedger,
    sticky: StickyMapping,
    /// Track ids emitted by the tracker at the latest step
    live: BTreeSet<u64>,
    kinematics: KinematicsEstimator,
    predictor: MotionPredictor,
    assembler: MessageAssembler,
    stats: EngineStats,
}

impl FusionEngine {
    /// Validates the configuration and builds an engine with empty state.
    pub fn new(config: FusionConfig) -> Result<Self, FusionError> {
        config.validate()?;
        let mapper = LazyMapper::new(config.bounds()?, config.image_size, config.bounds_margin_m)?;

        Ok(Self {
            mapper,
            matcher: TrackMatcher::new(config.match_threshold_px),
            ledger: HistoryLedger::new(config.history_cap),
            sticky: StickyMapping::new(),
            live: BTreeSet::new(),
            kinematics: KinematicsEstimator::new(config.step_length),
            predictor: MotionPredictor,
            assembler: MessageAssembler::from_config(&config),
            stats: EngineStats::default(),
            config,
        })
    }

    /// Engine over [`FusionConfig::default`] with auto-computed bounds.
    pub fn with_defaults() -> Self {
        Self::new(FusionConfig::default()).expect("default configuration is valid")
    }

    /// Fuse one step's tracker output with its ground truth.
    ///
    /// Returns one [`FusedTrack`] per input track, in input order. World
    /// bounds are frozen from `vehicles` on the first non-empty batch when
    /// none were configured.
    pub fn step(
        &mut self,
        step: u64,
        tracks: &[TrackRecord],
        vehicles: &[VehicleTelemetry],
    ) -> Vec<FusedTrack> {
        let mapper = self.mapper.ensure(vehicles);
        let matches = self.matcher.match_all(tracks, vehicles, &self.sticky, mapper);

        let mut pending = PendingStep {
            links: Vec::with_capacity(tracks.len()),
            entries: Vec::with_capacity(tracks.len()),
        };
        let mut fused = Vec::with_capacity(tracks.len());

        for (track, found) in tracks.iter().zip(matches) {
            let (cx, cy) = track.center();
            let pixel_center = Vector2::new(cx, cy);

            let Some(found) = found else {
                self.stats.unmatched += 1;
                pending.entries.push((
                    track.track_id,
                    HistoryEntry {
                        step,
                        pixel_center,
                        speed: 0.0,
                        heading_deg: 0.0,
                        world_position: None,
                    },
                ));
                fused.push(FusedTrack::unmatched(track.clone()));
                continue;
            };

            let vehicle = found.vehicle;
            match found.kind {
                MatchKind::Sticky => self.stats.sticky_matches += 1,
                MatchKind::Geometric { distance_px } => {
                    self.stats.geometric_matches += 1;
                    trace!(
                        "Track {} matched {} at {:.1}px",
                        track.track_id,
                        vehicle.id,
                        distance_px
                    );
                }
            }

            // Reads history as of the previous step
            let acceleration = self
                .kinematics
                .acceleration(&self.ledger, track.track_id, vehicle.speed);

            pending.links.push((track.track_id, vehicle.id.clone()));
            pending.entries.push((
                track.track_id,
                HistoryEntry {
                    step,
                    pixel_center,
                    speed: vehicle.speed,
                    heading_deg: vehicle.heading_deg,
                    world_position: Some(Vector2::new(vehicle.x, vehicle.y)),
                },
            ));
            fused.push(FusedTrack::matched(
                track.clone(),
                vehicle.clone(),
                found.kind,
                acceleration,
                direction_vector(vehicle.heading_deg),
            ));
        }

        self.live = tracks.iter().map(|t| t.track_id).collect();
        self.commit(step, pending);
        self.stats.steps += 1;
        self.stats.tracks_fused += tracks.len() as u64;

        debug!(
            "Step {}: {} tracks, {} vehicles, {} matched",
            step,
            tracks.len(),
            vehicles.len(),
            fused.iter().filter(|f| f.matched).count()
        );

        fused
    }

    fn commit(&mut self, step: u64, pending: PendingStep) {
        for (track_id, vehicle_id) in pending.links {
            self.sticky.link(track_id, &vehicle_id);
        }
        for (track_id, entry) in pending.entries {
            self.ledger.append(track_id, entry);
        }

        if let Some(max_age) = self.config.history_max_age {
            let retired = self.ledger.retire_stale(step, max_age);
            for track_id in &retired {
                self.sticky.unlink(*track_id);
            }
            if !retired.is_empty() {
                debug!("Retired {} stale tracks: {:?}", retired.len(), retired);
                self.stats.retired_tracks += retired.len() as u64;
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Last `n` recorded states of a track, oldest first.
    pub fn trajectory(&self, track_id: u64, n: usize) -> Trajectory<'_> {
        self.ledger.trajectory(track_id, n)
    }

    /// Acceleration a track would have if it moved at `current_speed` now.
    pub fn acceleration(&self, track_id: u64, current_speed: f64) -> f64 {
        self.kinematics.acceleration(&self.ledger, track_id, current_speed)
    }

    pub fn predict(&self, track_id: u64, horizon: f64) -> Option<PredictedPosition> {
        self.predictor.predict(&self.ledger, track_id, horizon)
    }

    /// [`predict`](Self::predict) at the configured horizon.
    pub fn predict_default(&self, track_id: u64) -> Option<PredictedPosition> {
        self.predict(track_id, self.config.prediction_horizon_s)
    }

    /// Tracks within `max_distance` meters of the observer track.
    pub fn relevant_tracks(&self, observer_id: u64, max_distance: f64) -> Vec<u64> {
        relevant_tracks(&self.ledger, observer_id, max_distance)
    }

    pub fn to_message(&self, fused: &[FusedTrack], timestamp: f64) -> CamMessage {
        self.assembler.to_message(fused, timestamp)
    }

    /// Broadcast whose `nearby` holds every track except the observer.
    pub fn create_broadcast(
        &self,
        fused: &[FusedTrack],
        observer_id: Option<u64>,
        timestamp: f64,
    ) -> BroadcastMessage {
        self.assembler.create_broadcast(fused, observer_id, timestamp)
    }

    /// Broadcast whose `nearby` is restricted to tracks within the configured
    /// V2X range of the observer.
    pub fn filtered_broadcast(
        &self,
        fused: &[FusedTrack],
        observer_id: u64,
        timestamp: f64,
    ) -> BroadcastMessage {
        let relevant: BTreeSet<u64> = self
            .relevant_tracks(observer_id, self.config.v2x_range_m)
            .into_iter()
            .collect();

        let mut msg = self.create_broadcast(fused, Some(observer_id), timestamp);
        msg.nearby.retain(|v| relevant.contains(&v.id));
        msg
    }

    /// Track linked to a simulation vehicle id among the tracks alive at the
    /// latest step (lowest id wins).
    ///
    /// Links of tracks the tracker has dropped stay in the sticky mapping
    /// but never resolve here.
    pub fn track_for_vehicle(&self, vehicle_id: &str) -> Option<u64> {
        self.sticky
            .tracks_for_vehicle(vehicle_id)
            .find(|id| self.live.contains(id))
    }

    /// Message timestamp for a step index.
    pub fn timestamp_for(&self, step: u64) -> f64 {
        step as f64 * self.config.step_length
    }

    pub fn should_broadcast(&self, step: u64) -> bool {
        step % u64::from(self.config.broadcast_interval) == 0
    }

    /// The frozen mapper, once world bounds are known.
    pub fn mapper(&self) -> Option<&CoordinateMapper> {
        self.mapper.get()
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn sticky(&self) -> &StickyMapping {
        &self.sticky
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Clear history, sticky links, auto bounds and counters.
    ///
    /// Only the engine's own projection is refrozen. A detector that froze
    /// its bounds from the same traffic must be reset alongside
    /// (`DetectionSource::reset`), or the two projections diverge.
    pub fn reset(&mut self) {
        self.ledger.clear();
        self.sticky.clear();
        self.live.clear();
        self.mapper.reset();
        self.stats = EngineStats::default();
    }
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("tracks", &self.ledger.track_count())
            .field("sticky_links", &self.sticky.len())
            .field("bounds", &self.mapper.get().map(|m| m.bounds()))
            .field("stats", &self.stats)
            .finish()
    }
}
