//! Value types exchanged with the external collaborators.

use serde::{Deserialize, Serialize};

/// Ground-truth state of one simulated vehicle at one step.
///
/// Produced once per step by the stepper and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    /// Simulation-assigned vehicle id (e.g. `"veh_0"`)
    pub id: String,

    /// World x in meters
    pub x: f64,

    /// World y in meters
    pub y: f64,

    /// Speed in m/s
    pub speed: f64,

    /// Heading in degrees
    #[serde(alias = "angle")]
    pub heading_deg: f64,

    /// Simulator vehicle class (e.g. `"passenger"`, `"truck"`), when the
    /// source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_class: Option<String>,
}

impl VehicleTelemetry {
    pub fn new(id: impl Into<String>, x: f64, y: f64, speed: f64, heading_deg: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            speed,
            heading_deg,
            vehicle_class: None,
        }
    }

    pub fn with_class(mut self, vehicle_class: impl Into<String>) -> Self {
        self.vehicle_class = Some(vehicle_class.into());
        self
    }
}

/// One pull from the ground-truth stepper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepFrame {
    /// Monotonic step index, starting at 0
    pub step: u64,

    /// All vehicles present in the simulation at this step
    pub vehicles: Vec<VehicleTelemetry>,
}

/// Output image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Largest valid x pixel index.
    #[inline]
    pub fn max_x(&self) -> f64 {
        self.width.saturating_sub(1) as f64
    }

    /// Largest valid y pixel index.
    #[inline]
    pub fn max_y(&self) -> f64 {
        self.height.saturating_sub(1) as f64
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::new(1200, 800)
    }
}

/// Axis-aligned pixel rectangle `[x1, y1, x2, y2]` (top-left, bottom-right).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box centered on `(cx, cy)` with the given half extents.
    pub fn around(cx: f64, cy: f64, half_w: f64, half_h: f64) -> Self {
        Self::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    #[inline]
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    #[inline]
    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Clamp all corners into `[0, W-1] x [0, H-1]`.
    pub fn clamped(&self, image: ImageSize) -> Self {
        let (max_x, max_y) = (image.max_x(), image.max_y());
        Self {
            x1: self.x1.clamp(0.0, max_x),
            y1: self.y1.clamp(0.0, max_y),
            x2: self.x2.clamp(0.0, max_x),
            y2: self.y2.clamp(0.0, max_y),
        }
    }

    /// Intersection over union with another box (0 when disjoint).
    pub fn iou(&self, other: &PixelBox) -> f64 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer corners, as emitted on the wire.
    pub fn to_pixels(&self) -> [i64; 4] {
        [
            self.x1 as i64,
            self.y1 as i64,
            self.x2 as i64,
            self.y2 as i64,
        ]
    }
}

/// A single detection row `[x1, y1, x2, y2, score, class_id]`.
///
/// Scores are 1.0 for ground-truth synthetic detections and below 1.0 for
/// noisy or vision-model sources. Consumers must accept both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: PixelBox,
    pub score: f64,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: PixelBox, score: f64, class_id: u32) -> Self {
        Self { bbox, score, class_id }
    }
}

/// Lifecycle of a tracker track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Newly created, not yet confirmed by enough consecutive hits
    #[default]
    Tentative,
    /// Actively tracked
    Confirmed,
    /// Temporarily without a detection, still emitted
    Lost,
}

/// One track emitted by the multi-object tracker for the current step.
///
/// `track_id` is stable for as long as the tracker keeps the track alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: u64,
    pub bbox: PixelBox,
    pub score: f64,
    pub class_id: u32,
    pub state: TrackState,
    /// Number of steps this track has been alive
    pub track_length: u32,
}

impl TrackRecord {
    /// Center of the bounding box in pixels.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_box_center_and_clamp() {
        let b = PixelBox::new(-5.0, 10.0, 30.0, 900.0);
        assert_eq!(b.center(), (12.5, 455.0));

        let c = b.clamped(ImageSize::new(100, 100));
        assert_eq!(c, PixelBox::new(0.0, 10.0, 30.0, 99.0));
    }

    #[test]
    fn test_iou() {
        let a = PixelBox::new(0.0, 0.0, 10.0, 10.0);
        let b = PixelBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-12);

        let far = PixelBox::new(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_telemetry_accepts_sumo_angle_field() {
        let json = r#"{"id":"veh_0","x":1.0,"y":2.0,"speed":3.0,"angle":90.0}"#;
        let v: VehicleTelemetry = serde_json::from_str(json).unwrap();
        assert_eq!(v.id, "veh_0");
        assert_eq!(v.heading_deg, 90.0);
        assert!(v.vehicle_class.is_none());

        let json = r#"{"id":"f_3","x":0.0,"y":0.0,"speed":0.0,"angle":0.0,"vehicle_class":"truck"}"#;
        let v: VehicleTelemetry = serde_json::from_str(json).unwrap();
        assert_eq!(v.vehicle_class.as_deref(), Some("truck"));
    }

    #[test]
    fn test_track_state_serializes_lowercase() {
        let s = serde_json::to_string(&TrackState::Confirmed).unwrap();
        assert_eq!(s, "\"confirmed\"");
    }
}
