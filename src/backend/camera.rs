//! Viewport state shared by the headless backends.
//!
//! Uses a linear degrees-per-pixel projection: enough to keep bounds, panning
//! and fitting consistent with each other without a real renderer.

use crate::domain::geo::{Bounds, LngLat};

const DEFAULT_WIDTH: f64 = 800.0;
const DEFAULT_HEIGHT: f64 = 600.0;
const MAX_PAN_LATITUDE: f64 = 85.0;

/// How a camera change was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// `set_zoom` or `set_center`.
    Jump,
    /// `zoom_to`.
    Zoom,
    /// `fit_bounds`.
    Fit,
    /// `pan_by` or `pan_to`.
    Pan,
    /// `fly_to`.
    Fly,
    /// `ease_to`.
    Ease,
}

/// One recorded camera change, in native zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMove {
    /// Which operation produced the move.
    pub kind: MoveKind,
    /// Native zoom after the move.
    pub zoom: f64,
    /// Whether the move was animated.
    pub animated: bool,
}

/// Center, zoom and viewport of a map, in native zoom units.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    center: LngLat,
    zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    width: f64,
    height: f64,
    tile_size: f64,
}

impl Camera {
    /// A camera at `[0, 0]` whose world is `tile_size` pixels wide at native
    /// zoom 0.
    pub fn new(tile_size: f64, min_zoom: f64, max_zoom: f64) -> Self {
        Self {
            center: LngLat::new(0.0, 0.0),
            zoom: min_zoom.max(0.0),
            min_zoom,
            max_zoom,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            tile_size,
        }
    }

    /// Current center.
    pub const fn center(&self) -> LngLat {
        self.center
    }

    /// Current native zoom.
    pub const fn zoom(&self) -> f64 {
        self.zoom
    }

    /// `(min, max)` native zoom.
    pub const fn zoom_range(&self) -> (f64, f64) {
        (self.min_zoom, self.max_zoom)
    }

    /// `(width, height)` in pixels.
    pub const fn viewport(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn degrees_per_pixel(&self) -> f64 {
        360.0 / (self.tile_size * self.zoom.exp2())
    }

    /// Sets the zoom, clamped to the allowed range. Returns whether it changed.
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        let zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        let changed = (zoom - self.zoom).abs() > f64::EPSILON;
        self.zoom = zoom;
        changed
    }

    /// Narrows the zoom range and re-clamps the current zoom.
    pub fn set_zoom_range(&mut self, min: Option<f64>, max: Option<f64>) {
        if let Some(min) = min {
            self.min_zoom = min;
        }
        if let Some(max) = max {
            self.max_zoom = max.max(self.min_zoom);
        }
        self.set_zoom(self.zoom);
    }

    /// Moves the center. Locations without usable geometry are ignored.
    pub fn set_center(&mut self, center: LngLat) -> bool {
        match center.normalized() {
            Some(center) if center != self.center => {
                self.center = center;
                true
            }
            _ => false,
        }
    }

    /// The visible area.
    pub fn bounds(&self) -> Bounds {
        let dpp = self.degrees_per_pixel();
        let half_lng = (self.width / 2.0 * dpp).min(180.0);
        let half_lat = self.height / 2.0 * dpp;
        Bounds::new(
            LngLat::new(
                self.center.lng - half_lng,
                (self.center.lat - half_lat).max(-90.0),
            ),
            LngLat::new(
                self.center.lng + half_lng,
                (self.center.lat + half_lat).min(90.0),
            ),
        )
    }

    /// Shifts the center by a pixel offset; positive `dy` moves south.
    pub fn pan_by(&mut self, dx: f64, dy: f64) -> bool {
        let dpp = self.degrees_per_pixel();
        let lat = (self.center.lat - dy * dpp).clamp(-MAX_PAN_LATITUDE, MAX_PAN_LATITUDE);
        self.set_center(LngLat::new(self.center.lng + dx * dpp, lat))
    }

    /// Centers on `bounds` at the largest zoom that shows all of it inside
    /// `padding` pixels.
    pub fn fit(&mut self, bounds: Bounds, padding: f64) {
        let usable_w = (self.width - 2.0 * padding).max(1.0);
        let usable_h = (self.height - 2.0 * padding).max(1.0);
        let lng_span = bounds.lng_span().max(f64::EPSILON);
        let lat_span = bounds.lat_span().max(f64::EPSILON);

        let zoom_w = (usable_w * 360.0 / (self.tile_size * lng_span)).log2();
        let zoom_h = (usable_h * 360.0 / (self.tile_size * lat_span)).log2();

        self.set_center(bounds.center());
        self.set_zoom(zoom_w.min(zoom_h));
    }

    /// Sets the viewport size in pixels.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(1.0);
        self.height = height.max(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_is_clamped_to_range() {
        let mut camera = Camera::new(512.0, 0.0, 22.0);
        camera.set_zoom(30.0);
        assert!((camera.zoom() - 22.0).abs() < f64::EPSILON);
        camera.set_zoom_range(Some(2.0), Some(10.0));
        assert!((camera.zoom() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fit_contains_the_requested_bounds() {
        let mut camera = Camera::new(512.0, 0.0, 22.0);
        let target = Bounds::new(LngLat::new(2.0, 48.0), LngLat::new(3.0, 49.0));
        camera.fit(target, 100.0);

        let visible = camera.bounds();
        assert!(visible.sw.lng <= 2.0 && visible.ne.lng >= 3.0);
        assert!(visible.sw.lat <= 48.0 && visible.ne.lat >= 49.0);
        assert_eq!(camera.center(), target.center());
    }

    #[test]
    fn pan_moves_east_and_south() {
        let mut camera = Camera::new(256.0, 0.0, 22.0);
        camera.set_zoom(4.0);
        assert!(camera.pan_by(100.0, 100.0));
        assert!(camera.center().lng > 0.0);
        assert!(camera.center().lat < 0.0);
    }
}
