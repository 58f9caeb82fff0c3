//! Greedy IoU multi-object tracker.
//!
//! A minimal SORT-style tracker without motion model: each step, track/
//! detection pairs are assigned greedily by descending IoU.
//!
//! Lifecycle:
//! - new detections open `Tentative` tracks
//! - `min_hits` consecutive hits confirm a track
//! - a missed `Tentative` track is dropped at once
//! - a missed `Confirmed` track turns `Lost` and is kept for `max_lost` steps

use serde::{Deserialize, Serialize};
use tracing::trace;
use v2x_env::{Detection, ImageSize, MultiObjectTracker, PixelBox, TrackRecord, TrackState};

/// Tracker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a track/detection pair
    pub iou_threshold: f64,

    /// Detections scoring below this are ignored
    pub min_score: f64,

    /// Consecutive hits before a track is confirmed
    pub min_hits: u32,

    /// Steps a lost track survives without a detection
    pub max_lost: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            min_score: 0.25,
            min_hits: 3,
            max_lost: 30,
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    id: u64,
    bbox: PixelBox,
    score: f64,
    class_id: u32,
    state: TrackState,
    hits: u32,
    lost_for: u32,
    length: u32,
}

impl Track {
    fn record(&self) -> TrackRecord {
        TrackRecord {
            track_id: self.id,
            bbox: self.bbox,
            score: self.score,
            class_id: self.class_id,
            state: self.state,
            track_length: self.length,
        }
    }
}

pub struct GreedyIouTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl GreedyIouTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TrackerConfig::default())
    }

    /// Tracks currently alive, in any state.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Greedy assignment by descending IoU. Returns `(track_idx, det_idx)`.
    fn associate(&self, detections: &[&Detection]) -> Vec<(usize, usize)> {
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.config.iou_threshold {
                    candidates.push((iou, ti, di));
                }
            }
        }
        // Stable sort keeps older tracks first on equal IoU
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_used = vec![false; self.tracks.len()];
        let mut det_used = vec![false; detections.len()];
        let mut pairs = Vec::new();
        for (_, ti, di) in candidates {
            if track_used[ti] || det_used[di] {
                continue;
            }
            track_used[ti] = true;
            det_used[di] = true;
            pairs.push((ti, di));
        }
        pairs
    }
}

impl MultiObjectTracker for GreedyIouTracker {
    fn update(&mut self, detections: &[Detection], image: ImageSize) -> Vec<TrackRecord> {
        let detections: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.score >= self.config.min_score)
            .collect();

        let pairs = self.associate(&detections);
        let mut hit = vec![false; self.tracks.len()];
        let mut claimed = vec![false; detections.len()];

        for (ti, di) in pairs {
            let det = detections[di];
            let track = &mut self.tracks[ti];
            track.bbox = det.bbox.clamped(image);
            track.score = det.score;
            track.class_id = det.class_id;
            track.hits += 1;
            track.lost_for = 0;
            track.length += 1;
            if track.state == TrackState::Lost || track.hits >= self.config.min_hits {
                track.state = TrackState::Confirmed;
            }
            hit[ti] = true;
            claimed[di] = true;
        }

        let max_lost = self.config.max_lost;
        let mut idx = 0;
        self.tracks.retain_mut(|track| {
            let was_hit = hit[idx];
            idx += 1;
            if was_hit {
                return true;
            }
            track.hits = 0;
            track.length += 1;
            match track.state {
                TrackState::Tentative => false,
                TrackState::Confirmed => {
                    track.state = TrackState::Lost;
                    track.lost_for = 1;
                    true
                }
                TrackState::Lost => {
                    track.lost_for += 1;
                    track.lost_for <= max_lost
                }
            }
        });

        for (det, _) in detections.iter().zip(&claimed).filter(|(_, c)| !**c) {
            let id = self.next_id;
            self.next_id += 1;
            trace!("New track {} (class {})", id, det.class_id);
            self.tracks.push(Track {
                id,
                bbox: det.bbox.clamped(image),
                score: det.score,
                class_id: det.class_id,
                state: if self.config.min_hits <= 1 {
                    TrackState::Confirmed
                } else {
                    TrackState::Tentative
                },
                hits: 1,
                lost_for: 0,
                length: 1,
            });
        }

        self.tracks.iter().map(Track::record).collect()
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}
