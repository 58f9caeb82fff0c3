//! The "MAPPING" Engine - World ↔ Pixel Projection
//!
//! Maps simulation world coordinates (meters) into a top-down pixel raster:
//!
//! ```text
//! nx = (x - xmin) / (xmax - xmin)       px = floor(nx * (W - 1))
//! ny = (y - ymin) / (ymax - ymin)       py = floor((1 - ny) * (H - 1))
//! ```
//!
//! The pixel origin is the top-left corner. The y axis is flipped: a larger
//! world y yields a *smaller* `py`, so northward motion renders upward.
//!
//! Also derives pixel bounding boxes from real-world vehicle length (or a
//! per-class base size), inflated by up to 30% with speed to mimic motion blur.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::info;
use v2x_env::{ImageSize, PixelBox, VehicleTelemetry};

/// Margin added around auto-computed world bounds, in meters.
pub const AUTO_BOUNDS_MARGIN_M: f64 = 10.0;

/// Half-height of a vehicle box relative to its half-width.
const HALF_HEIGHT_RATIO: f64 = 0.6;

/// Maximum speed inflation of a box (30%).
const MAX_SPEED_INFLATION: f64 = 0.3;

// ============================================================================
// WORLD BOUNDS
// ============================================================================

/// Axis-aligned world rectangle `(xmin, ymin, xmax, ymax)` in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl WorldBounds {
    /// Validate and build a bounding box.
    ///
    /// Fails when either extent is zero, negative or not finite, since the
    /// projection divides by `xmax - xmin` and `ymax - ymin`.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self, MappingError> {
        let finite = [xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite());
        if !finite || xmax <= xmin || ymax <= ymin {
            return Err(MappingError::InvalidBounds { xmin, ymin, xmax, ymax });
        }
        Ok(Self { xmin, ymin, xmax, ymax })
    }

    /// Build from a `[xmin, ymin, xmax, ymax]` array.
    pub fn from_array(b: [f64; 4]) -> Result<Self, MappingError> {
        Self::new(b[0], b[1], b[2], b[3])
    }

    /// Tight bounds around a telemetry batch, padded by `margin` meters.
    ///
    /// Returns `None` for an empty batch.
    pub fn from_vehicles(vehicles: &[VehicleTelemetry], margin: f64) -> Option<Self> {
        let first = vehicles.first()?;
        let (mut xmin, mut ymin, mut xmax, mut ymax) = (first.x, first.y, first.x, first.y);
        for v in &vehicles[1..] {
            xmin = xmin.min(v.x);
            ymin = ymin.min(v.y);
            xmax = xmax.max(v.x);
            ymax = ymax.max(v.y);
        }
        Self::new(xmin - margin, ymin - margin, xmax + margin, ymax + margin).ok()
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }
}

// ============================================================================
// COORDINATE MAPPER
// ============================================================================

/// Affine world → pixel transform over frozen bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    bounds: WorldBounds,
    image: ImageSize,
}

impl CoordinateMapper {
    pub fn new(bounds: WorldBounds, image: ImageSize) -> Result<Self, MappingError> {
        if image.width == 0 || image.height == 0 {
            return Err(MappingError::InvalidImageSize {
                width: image.width,
                height: image.height,
            });
        }
        Ok(Self { bounds, image })
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    pub fn image_size(&self) -> ImageSize {
        self.image
    }

    /// Project a world point to integer pixel coordinates.
    ///
    /// Points outside the bounds project outside the raster; use
    /// [`world_to_pixel_clamped`](Self::world_to_pixel_clamped) when a valid
    /// pixel index is required.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let nx = (x - self.bounds.xmin) / self.bounds.width();
        let ny = (y - self.bounds.ymin) / self.bounds.height();
        let px = (nx * self.image.max_x()).floor() as i64;
        let py = ((1.0 - ny) * self.image.max_y()).floor() as i64;
        (px, py)
    }

    /// Project and clamp into `[0, W-1] x [0, H-1]`.
    pub fn world_to_pixel_clamped(&self, x: f64, y: f64) -> (i64, i64) {
        let (px, py) = self.world_to_pixel(x, y);
        (
            px.clamp(0, self.image.max_x() as i64),
            py.clamp(0, self.image.max_y() as i64),
        )
    }

    /// Projected pixel position as a float vector (for distance math).
    pub fn project(&self, x: f64, y: f64) -> Vector2<f64> {
        let (px, py) = self.world_to_pixel(x, y);
        Vector2::new(px as f64, py as f64)
    }

    /// Horizontal scale factor `W / (xmax - xmin)` in pixels per meter.
    #[inline]
    pub fn pixels_per_meter(&self) -> f64 {
        self.image.width as f64 / self.bounds.width()
    }

    /// Box for a vehicle of `length_m` meters at world `(x, y)`.
    ///
    /// `half_w = trunc(length * scale / 2)`, `half_h = trunc(0.6 * half_w)`,
    /// each inflated by [`speed_inflation`] and clamped to the raster.
    pub fn vehicle_bbox(&self, x: f64, y: f64, speed: f64, length_m: f64) -> PixelBox {
        let half_w = (length_m * self.pixels_per_meter() / 2.0).trunc();
        let half_h = (half_w * HALF_HEIGHT_RATIO).trunc();
        self.inflated_box(x, y, speed, half_w, half_h)
    }

    /// Box from a per-class base half-size `(half_w, half_h)` in pixels.
    pub fn class_bbox(&self, x: f64, y: f64, speed: f64, base: (u32, u32)) -> PixelBox {
        self.inflated_box(x, y, speed, base.0 as f64, base.1 as f64)
    }

    fn inflated_box(&self, x: f64, y: f64, speed: f64, half_w: f64, half_h: f64) -> PixelBox {
        let (px, py) = self.world_to_pixel(x, y);
        let factor = speed_inflation(speed);
        PixelBox::around(
            px as f64,
            py as f64,
            (half_w * factor).trunc(),
            (half_h * factor).trunc(),
        )
        .clamped(self.image)
    }
}

/// Motion-blur factor `1 + min(speed * 0.01, 0.3)`.
#[inline]
pub fn speed_inflation(speed: f64) -> f64 {
    1.0 + (speed * 0.01).clamp(0.0, MAX_SPEED_INFLATION)
}

// ============================================================================
// LAZY MAPPER (auto bounds, frozen on first batch)
// ============================================================================

/// Holds either configured bounds or computes them once from the first
/// non-empty telemetry batch, then freezes them for the run.
#[derive(Debug, Clone)]
pub struct LazyMapper {
    configured: Option<WorldBounds>,
    image: ImageSize,
    margin: f64,
    mapper: Option<CoordinateMapper>,
}

impl LazyMapper {
    /// Configured bounds are projected immediately; `None` defers to the
    /// first telemetry batch.
    pub fn new(bounds: Option<WorldBounds>, image: ImageSize, margin: f64) -> Result<Self, MappingError> {
        let mapper = match bounds {
            Some(b) => Some(CoordinateMapper::new(b, image)?),
            None => {
                // Surface a bad image size now rather than on the first batch
                if image.width == 0 || image.height == 0 {
                    return Err(MappingError::InvalidImageSize {
                        width: image.width,
                        height: image.height,
                    });
                }
                None
            }
        };
        Ok(Self {
            configured: bounds,
            image,
            margin,
            mapper,
        })
    }

    /// Returns the mapper, computing auto bounds from `vehicles` if needed.
    pub fn ensure(&mut self, vehicles: &[VehicleTelemetry]) -> Option<&CoordinateMapper> {
        if self.mapper.is_none() {
            if let Some(bounds) = WorldBounds::from_vehicles(vehicles, self.margin) {
                info!(
                    "World bounds frozen at ({:.1}, {:.1}, {:.1}, {:.1}) from {} vehicles",
                    bounds.xmin,
                    bounds.ymin,
                    bounds.xmax,
                    bounds.ymax,
                    vehicles.len()
                );
                // Image size was validated in `new`
                self.mapper = CoordinateMapper::new(bounds, self.image).ok();
            }
        }
        self.mapper.as_ref()
    }

    pub fn get(&self) -> Option<&CoordinateMapper> {
        self.mapper.as_ref()
    }

    /// Forget auto-computed bounds. Configured bounds are kept.
    pub fn reset(&mut self) {
        if self.configured.is_none() {
            self.mapper = None;
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("Invalid world bounds ({xmin}, {ymin}, {xmax}, {ymax}): extents must be positive")]
    InvalidBounds { xmin: f64, ymin: f64, xmax: f64, ymax: f64 },

    #[error("Invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_mapper() -> CoordinateMapper {
        let bounds = WorldBounds::new(0.0, 0.0, 100.0, 100.0).unwrap();
        CoordinateMapper::new(bounds, ImageSize::new(100, 100)).unwrap()
    }

    #[test]
    fn test_world_center_maps_to_pixel_49() {
        let mapper = unit_mapper();
        assert_eq!(mapper.world_to_pixel(50.0, 50.0), (49, 49));
    }

    #[test]
    fn test_vertical_flip() {
        let mapper = unit_mapper();
        let (_, low) = mapper.world_to_pixel(50.0, 10.0);
        let (_, high) = mapper.world_to_pixel(50.0, 90.0);
        // Larger world y renders higher (smaller py)
        assert!(high < low);
        assert_eq!(mapper.world_to_pixel(0.0, 100.0), (0, 0));
        assert_eq!(mapper.world_to_pixel(100.0, 0.0), (99, 99));
    }

    #[test]
    fn test_degenerate_bounds_rejected() {
        assert!(matches!(
            WorldBounds::new(5.0, 0.0, 5.0, 10.0),
            Err(MappingError::InvalidBounds { .. })
        ));
        assert!(WorldBounds::new(0.0, 3.0, 10.0, 3.0).is_err());
        assert!(WorldBounds::new(0.0, 0.0, f64::NAN, 10.0).is_err());
    }

    #[test]
    fn test_zero_image_rejected() {
        let bounds = WorldBounds::new(0.0, 0.0, 10.0, 10.0).unwrap();
        assert!(CoordinateMapper::new(bounds, ImageSize::new(0, 10)).is_err());
        assert!(LazyMapper::new(None, ImageSize::new(10, 0), 10.0).is_err());
    }

    #[test]
    fn test_auto_bounds_margin() {
        let vehicles = vec![
            VehicleTelemetry::new("a", 10.0, 20.0, 0.0, 0.0),
            VehicleTelemetry::new("b", 50.0, -5.0, 0.0, 0.0),
        ];
        let b = WorldBounds::from_vehicles(&vehicles, AUTO_BOUNDS_MARGIN_M).unwrap();
        assert_eq!(b.as_array(), [0.0, -15.0, 60.0, 30.0]);
        assert!(WorldBounds::from_vehicles(&[], AUTO_BOUNDS_MARGIN_M).is_none());
    }

    #[test]
    fn test_lazy_mapper_freezes_on_first_batch() {
        let mut lazy = LazyMapper::new(None, ImageSize::new(100, 100), 10.0).unwrap();
        assert!(lazy.ensure(&[]).is_none());

        let first = vec![VehicleTelemetry::new("a", 0.0, 0.0, 0.0, 0.0)];
        let bounds = lazy.ensure(&first).unwrap().bounds();
        assert_eq!(bounds.as_array(), [-10.0, -10.0, 10.0, 10.0]);

        // A later batch far away does not move the frozen bounds
        let later = vec![VehicleTelemetry::new("b", 500.0, 500.0, 0.0, 0.0)];
        assert_eq!(lazy.ensure(&later).unwrap().bounds(), bounds);

        lazy.reset();
        assert!(lazy.get().is_none());
    }

    #[test]
    fn test_vehicle_bbox_sizing() {
        // 1000 px over 100 m -> 10 px/m; 2 m vehicle -> half_w 10, half_h 6
        let bounds = WorldBounds::new(0.0, 0.0, 100.0, 100.0).unwrap();
        let mapper = CoordinateMapper::new(bounds, ImageSize::new(1000, 1000)).unwrap();

        let still = mapper.vehicle_bbox(50.0, 50.0, 0.0, 2.0);
        let (px, py) = mapper.world_to_pixel(50.0, 50.0);
        assert_eq!(still.x1, px as f64 - 10.0);
        assert_eq!(still.y2, py as f64 + 6.0);

        // 40 m/s hits the 30% cap: trunc(10 * 1.3) = 13, trunc(6 * 1.3) = 7
        let fast = mapper.vehicle_bbox(50.0, 50.0, 40.0, 2.0);
        assert_eq!(fast.x2, px as f64 + 13.0);
        assert_eq!(fast.y1, py as f64 - 7.0);
    }

    #[test]
    fn test_bbox_clamped_at_edge() {
        let mapper = unit_mapper();
        let b = mapper.class_bbox(0.0, 0.0, 0.0, (12, 6));
        assert_eq!(b.x1, 0.0);
        assert_eq!(b.y2, 99.0);
    }

    #[test]
    fn test_speed_inflation() {
        assert_eq!(speed_inflation(0.0), 1.0);
        assert!((speed_inflation(10.0) - 1.1).abs() < 1e-12);
        assert!((speed_inflation(100.0) - 1.3).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_clamped_pixel_in_raster(x in -1e4f64..1e4, y in -1e4f64..1e4, w in 1u32..4000, h in 1u32..4000) {
            let bounds = WorldBounds::new(-100.0, -50.0, 300.0, 250.0).unwrap();
            let mapper = CoordinateMapper::new(bounds, ImageSize::new(w, h)).unwrap();
            let (px, py) = mapper.world_to_pixel_clamped(x, y);
            prop_assert!(px >= 0 && px <= (w - 1) as i64);
            prop_assert!(py >= 0 && py <= (h - 1) as i64);
        }

        #[test]
        fn prop_in_bounds_points_need_no_clamp(x in -100.0f64..=300.0, y in -50.0f64..=250.0) {
            let bounds = WorldBounds::new(-100.0, -50.0, 300.0, 250.0).unwrap();
            let mapper = CoordinateMapper::new(bounds, ImageSize::new(1200, 800)).unwrap();
            prop_assert_eq!(mapper.world_to_pixel(x, y), mapper.world_to_pixel_clamped(x, y));
        }

        #[test]
        fn prop_bbox_inside_raster(x in -500.0f64..500.0, y in -500.0f64..500.0, speed in 0.0f64..60.0) {
            let mapper = unit_mapper();
            let b = mapper.vehicle_bbox(x, y, speed, 4.5);
            prop_assert!(b.x1 >= 0.0 && b.x2 <= 99.0);
            prop_assert!(b.y1 >= 0.0 && b.y2 <= 99.0);
        }
    }
}
