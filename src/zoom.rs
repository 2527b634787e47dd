//! Conversion between user zoom and backend-native zoom.
//!
//! Application code always works with 1-based zoom levels. Each backend
//! declares the offset of its native scale in its [`Dialect`]; the normalizer
//! applies it on every way in and out, and floors the zoom target of animated
//! transitions so they never settle between two integral levels.

use crate::backend::{Dialect, Transition};

/// Native zoom values derived from user options.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NativeZoom {
    /// Initial native zoom.
    pub zoom: Option<f64>,
    /// Native lower bound.
    pub min_zoom: Option<f64>,
    /// Native upper bound.
    pub max_zoom: Option<f64>,
}

/// Applies one backend's zoom offset.
///
/// # Examples
///
/// ```
/// use mapweave::backend::Transition;
/// use mapweave::zoom::ZoomNormalizer;
///
/// let zoom = ZoomNormalizer::new(1);
/// assert_eq!(zoom.to_native(5.0), 4.0);
/// assert_eq!(zoom.to_user(4.2), 5.0);
///
/// let native = zoom.transition(Transition { zoom: Some(7.9), ..Transition::default() });
/// assert_eq!(native.zoom, Some(6.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomNormalizer {
    offset: f64,
}

impl ZoomNormalizer {
    /// A normalizer for native zoom = user zoom - `offset`.
    #[must_use]
    pub fn new(offset: i32) -> Self {
        Self {
            offset: f64::from(offset),
        }
    }

    /// The normalizer of `dialect`.
    #[must_use]
    pub fn for_dialect(dialect: &Dialect) -> Self {
        Self::new(dialect.zoom_offset)
    }

    /// Converts a user zoom to the native zoom.
    pub fn to_native(&self, user: f64) -> f64 {
        user - self.offset
    }

    /// Native zoom to the nearest user zoom level.
    pub fn to_user(&self, native: f64) -> f64 {
        (native + self.offset).round()
    }

    /// Translates constructor zoom options.
    pub fn options(&self, zoom: Option<f64>, min_zoom: Option<f64>, max_zoom: Option<f64>) -> NativeZoom {
        NativeZoom {
            zoom: zoom.map(|z| self.to_native(z)),
            min_zoom: min_zoom.map(|z| self.to_native(z)),
            max_zoom: max_zoom.map(|z| self.to_native(z)),
        }
    }

    /// Translates a user transition, flooring its zoom target.
    pub fn transition(&self, transition: Transition) -> Transition {
        Transition {
            zoom: transition.zoom.map(|z| self.to_native(z.floor())),
            ..transition
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::LngLat;

    #[test]
    fn round_trip_through_offset() {
        let zoom = ZoomNormalizer::new(1);
        assert!((zoom.to_native(5.0) - 4.0).abs() < f64::EPSILON);
        assert!((zoom.to_user(zoom.to_native(5.0)) - 5.0).abs() < f64::EPSILON);
        assert!((zoom.to_user(3.6) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn options_are_translated() {
        let native = ZoomNormalizer::new(1).options(Some(5.0), Some(2.0), None);
        assert_eq!(native.zoom, Some(4.0));
        assert_eq!(native.min_zoom, Some(1.0));
        assert_eq!(native.max_zoom, None);
    }

    #[test]
    fn transitions_end_on_integral_zoom() {
        let transition = ZoomNormalizer::new(1).transition(Transition {
            center: Some(LngLat::new(1.0, 2.0)),
            zoom: Some(7.8),
            duration_ms: Some(300),
        });
        assert_eq!(transition.zoom, Some(6.0));
        assert_eq!(transition.center, Some(LngLat::new(1.0, 2.0)));
    }
}
