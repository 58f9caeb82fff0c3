//! V2X message assembly.
//!
//! Turns a step's fused tracks into Cooperative Awareness Messages (CAM) and
//! observer-centric broadcast envelopes. Both are fixed-shape `serde` records.
//!
//! A broadcast's `nearby` list is NOT range filtered: it holds every entry
//! except the observer. Range filtering is the job of
//! [`relevant_tracks`](crate::v2x_relevance::relevant_tracks); callers compose
//! the two explicitly (see `FusionEngine::filtered_broadcast`).

use crate::config::FusionConfig;
use crate::v2x_matching::FusedTrack;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Below this speed (m/s) a vehicle is stationary.
pub const STATIONARY_SPEED: f64 = 0.5;

/// Above this speed (m/s) a vehicle is high speed.
pub const HIGH_SPEED: f64 = 15.0;

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Per-vehicle V2X message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum V2xType {
    /// Vulnerable Road User (pedestrian)
    #[serde(rename = "VRU")]
    Vru,
    #[serde(rename = "CAM_STATIONARY")]
    CamStationary,
    #[serde(rename = "CAM_HIGH_SPEED")]
    CamHighSpeed,
    #[serde(rename = "CAM_NORMAL")]
    CamNormal,
}

impl V2xType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vru => "VRU",
            Self::CamStationary => "CAM_STATIONARY",
            Self::CamHighSpeed => "CAM_HIGH_SPEED",
            Self::CamNormal => "CAM_NORMAL",
        }
    }
}

/// First match wins: pedestrian, then stationary, then high speed.
pub fn classify(class_id: u32, speed: f64, pedestrian_class_id: u32) -> V2xType {
    if class_id == pedestrian_class_id {
        V2xType::Vru
    } else if speed < STATIONARY_SPEED {
        V2xType::CamStationary
    } else if speed > HIGH_SPEED {
        V2xType::CamHighSpeed
    } else {
        V2xType::CamNormal
    }
}

/// Envelope type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    /// Cooperative Awareness Message
    #[serde(rename = "CAM")]
    Cam,
    #[serde(rename = "V2X_BROADCAST")]
    V2xBroadcast,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cam => "CAM",
            Self::V2xBroadcast => "V2X_BROADCAST",
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// World position on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub x: f64,
    pub y: f64,
}

/// One vehicle entry of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Tracker id
    pub id: u64,
    /// `[x1, y1, x2, y2]` in integer pixels
    pub bbox: [i64; 4],
    #[serde(rename = "class")]
    pub class_name: String,
    pub class_id: u32,
    pub confidence: f64,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position: Option<WirePosition>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heading: Option<f64>,
    pub v2x_type: V2xType,
}

/// All tracks of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CamMessage {
    pub timestamp: f64,
    pub message_type: MessageType,
    pub vehicles: Vec<VehicleRecord>,
    pub total_vehicles: usize,
}

/// Broadcast envelope from one observer's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub message_id: Uuid,
    pub timestamp: f64,
    pub message_type: MessageType,
    /// Observer track id; `None` for an anonymous broadcast
    pub ego_vehicle: Option<u64>,
    /// Configured communication range in meters
    pub range_m: f64,
    pub vehicles: Vec<VehicleRecord>,
    pub total_vehicles: usize,
    /// Every entry except the observer (not range filtered)
    pub nearby: Vec<VehicleRecord>,
}

impl BroadcastMessage {
    /// Serialize to a pretty JSON string for transport or persistence.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Builds messages from fused tracks.
#[derive(Debug, Clone)]
pub struct MessageAssembler {
    config: FusionConfig,
}

impl MessageAssembler {
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn range_m(&self) -> f64 {
        self.config.v2x_range_m
    }

    /// Wire record for one track. Unmatched tracks classify at speed 0.
    pub fn vehicle_record(&self, track: &FusedTrack, timestamp: f64) -> VehicleRecord {
        let class_id = track.class_id();
        let speed = track.speed();
        VehicleRecord {
            id: track.track_id(),
            bbox: track.bbox().to_pixels(),
            class_name: self.config.class_name(class_id).to_string(),
            class_id,
            confidence: track.record.score,
            timestamp,
            position: track.world_position().map(|p| WirePosition { x: p.x, y: p.y }),
            speed,
            heading: track.heading_deg(),
            v2x_type: classify(class_id, speed.unwrap_or(0.0), self.config.pedestrian_class_id),
        }
    }

    /// CAM carrying every track of the step.
    pub fn to_message(&self, tracks: &[FusedTrack], timestamp: f64) -> CamMessage {
        let vehicles: Vec<VehicleRecord> = tracks
            .iter()
            .map(|t| self.vehicle_record(t, timestamp))
            .collect();
        CamMessage {
            timestamp,
            message_type: MessageType::Cam,
            total_vehicles: vehicles.len(),
            vehicles,
        }
    }

    /// Broadcast from `observer_id`'s perspective.
    ///
    /// `nearby` is every entry whose id differs from the observer; no distance
    /// check is made here.
    pub fn create_broadcast(
        &self,
        tracks: &[FusedTrack],
        observer_id: Option<u64>,
        timestamp: f64,
    ) -> BroadcastMessage {
        let cam = self.to_message(tracks, timestamp);
        let nearby = cam
            .vehicles
            .iter()
            .filter(|v| Some(v.id) != observer_id)
            .cloned()
            .collect();

        BroadcastMessage {
            message_id: Uuid::new_v4(),
            timestamp,
            message_type: MessageType::V2xBroadcast,
            ego_vehicle: observer_id,
            range_m: self.config.v2x_range_m,
            vehicles: cam.vehicles,
            total_vehicles: cam.total_vehicles,
            nearby,
        }
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Aggregate statistics over a run's broadcasts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub total_messages: usize,
    pub message_types: BTreeMap<MessageType, usize>,
    pub avg_vehicles_per_message: f64,
    pub total_unique_vehicles: usize,
}

impl MessageSummary {
    pub fn from_broadcasts(messages: &[BroadcastMessage]) -> Self {
        let mut message_types = BTreeMap::new();
        let mut unique = BTreeSet::new();
        let mut total_vehicles = 0usize;

        for msg in messages {
            *message_types.entry(msg.message_type).or_insert(0) += 1;
            total_vehicles += msg.vehicles.len();
            unique.extend(msg.vehicles.iter().map(|v| v.id));
        }

        let avg_vehicles_per_message = if messages.is_empty() {
            0.0
        } else {
            total_vehicles as f64 / messages.len() as f64
        };

        Self {
            total_messages: messages.len(),
            message_types,
            avg_vehicles_per_message,
            total_unique_vehicles: unique.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v2x_matching::MatchKind;
    use nalgebra::Vector2;
    use v2x_env::{PixelBox, TrackRecord, TrackState, VehicleTelemetry};

    fn record(track_id: u64, class_id: u32) -> TrackRecord {
        TrackRecord {
            track_id,
            bbox: PixelBox::new(10.4, 20.6, 30.0, 40.0),
            score: 0.9,
            class_id,
            state: TrackState::Confirmed,
            track_length: 3,
        }
    }

    fn fused(track_id: u64, class_id: u32, speed: f64) -> FusedTrack {
        FusedTrack::matched(
            record(track_id, class_id),
            VehicleTelemetry::new(format!("veh_{track_id}"), 1.0, 2.0, speed, 45.0),
            MatchKind::Sticky,
            0.0,
            Vector2::new(1.0, 0.0),
        )
    }

    fn assembler() -> MessageAssembler {
        MessageAssembler::from_config(&FusionConfig::default())
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(classify(0, 0.0, 0), V2xType::Vru);
        assert_eq!(classify(0, 30.0, 0), V2xType::Vru);
        assert_eq!(classify(1, 0.49, 0), V2xType::CamStationary);
        assert_eq!(classify(1, 0.5, 0), V2xType::CamNormal);
        assert_eq!(classify(1, 15.0, 0), V2xType::CamNormal);
        assert_eq!(classify(1, 15.01, 0), V2xType::CamHighSpeed);
    }

    #[test]
    fn test_pedestrian_short_circuits_speed() {
        let msg = assembler().to_message(&[fused(1, 0, 25.0), fused(2, 0, 0.0)], 1.5);
        assert!(msg.vehicles.iter().all(|v| v.v2x_type == V2xType::Vru));
    }

    #[test]
    fn test_vehicle_record_fields() {
        let msg = assembler().to_message(&[fused(7, 2, 20.0)], 3.0);
        assert_eq!(msg.message_type, MessageType::Cam);
        assert_eq!(msg.total_vehicles, 1);

        let v = &msg.vehicles[0];
        assert_eq!(v.id, 7);
        assert_eq!(v.bbox, [10, 20, 30, 40]);
        assert_eq!(v.class_name, "truck");
        assert_eq!(v.confidence, 0.9);
        assert_eq!(v.timestamp, 3.0);
        assert_eq!(v.position, Some(WirePosition { x: 1.0, y: 2.0 }));
        assert_eq!(v.speed, Some(20.0));
        assert_eq!(v.heading, Some(45.0));
        assert_eq!(v.v2x_type, V2xType::CamHighSpeed);
    }

    #[test]
    fn test_unmatched_track_omits_motion_fields() {
        let msg = assembler().to_message(&[FusedTrack::unmatched(record(4, 1))], 0.0);
        let v = &msg.vehicles[0];
        assert!(v.position.is_none() && v.speed.is_none() && v.heading.is_none());
        assert_eq!(v.v2x_type, V2xType::CamStationary);

        let json = serde_json::to_value(v).unwrap();
        assert!(json.get("speed").is_none());
        assert_eq!(json["class"], "car");
        assert_eq!(json["v2x_type"], "CAM_STATIONARY");
    }

    #[test]
    fn test_broadcast_excludes_only_observer() {
        let tracks = vec![fused(1, 1, 5.0), fused(2, 1, 5.0), fused(3, 1, 5.0)];
        let msg = assembler().create_broadcast(&tracks, Some(2), 0.5);

        assert_eq!(msg.message_type, MessageType::V2xBroadcast);
        assert_eq!(msg.ego_vehicle, Some(2));
        assert_eq!(msg.range_m, 300.0);
        assert_eq!(msg.total_vehicles, 3);
        let nearby: Vec<u64> = msg.nearby.iter().map(|v| v.id).collect();
        assert_eq!(nearby, vec![1, 3]);

        let anonymous = assembler().create_broadcast(&tracks, None, 0.5);
        assert_eq!(anonymous.nearby.len(), 3);
        assert_ne!(anonymous.message_id, msg.message_id);
    }

    #[test]
    fn test_broadcast_json_shape() {
        let msg = assembler().create_broadcast(&[fused(1, 1, 5.0)], Some(1), 0.0);
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["message_type"], "V2X_BROADCAST");
        assert_eq!(json["nearby"].as_array().unwrap().len(), 0);
        assert_eq!(json["vehicles"][0]["position"]["x"], 1.0);
    }

    #[test]
    fn test_summary() {
        let a = assembler();
        let messages = vec![
            a.create_broadcast(&[fused(1, 1, 5.0), fused(2, 1, 5.0)], None, 0.0),
            a.create_broadcast(&[fused(2, 1, 5.0), fused(3, 1, 5.0), fused(4, 1, 5.0)], None, 0.5),
        ];
        let summary = MessageSummary::from_broadcasts(&messages);
        assert_eq!(summary.total_messages, 2);
        assert_eq!(summary.message_types.get(&MessageType::V2xBroadcast), Some(&2));
        assert_eq!(summary.avg_vehicles_per_message, 2.5);
        assert_eq!(summary.total_unique_vehicles, 4);

        assert_eq!(MessageSummary::from_broadcasts(&[]).avg_vehicles_per_message, 0.0);
    }
}
