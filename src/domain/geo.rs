//! Geographic primitives shared by every backend.
//!
//! Coordinates are always exchanged with application code in longitude/latitude
//! order ([`LngLat`]); backends convert to and from their native representation.

use serde::{Deserialize, Serialize};

/// Largest latitude a location may carry.
const MAX_LATITUDE: f64 = 90.0;

/// A geographic location in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    /// Longitude in degrees, east positive.
    pub lng: f64,
    /// Latitude in degrees, north positive.
    pub lat: f64,
}

impl LngLat {
    /// Creates a location from longitude and latitude.
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Returns the location in canonical form, or `None` if it has no usable
    /// geometry.
    ///
    /// Longitudes outside `[-180, 180]` are wrapped; non-finite components or a
    /// latitude beyond the poles yield `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::LngLat;
    ///
    /// assert_eq!(LngLat::new(190.0, 10.0).normalized(), Some(LngLat::new(-170.0, 10.0)));
    /// assert_eq!(LngLat::new(f64::NAN, 10.0).normalized(), None);
    /// ```
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        if !self.lng.is_finite() || !self.lat.is_finite() || self.lat.abs() > MAX_LATITUDE {
            return None;
        }
        let lng = if (-180.0..=180.0).contains(&self.lng) {
            self.lng
        } else {
            (self.lng + 180.0).rem_euclid(360.0) - 180.0
        };
        Some(Self { lng, lat: self.lat })
    }
}

/// A rectangular geographic area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// South-west corner.
    pub sw: LngLat,
    /// North-east corner.
    pub ne: LngLat,
}

impl Bounds {
    /// Creates bounds from the south-west and north-east corners.
    #[must_use]
    pub const fn new(sw: LngLat, ne: LngLat) -> Self {
        Self { sw, ne }
    }

    /// Returns the north-west corner.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::{Bounds, LngLat};
    ///
    /// let b = Bounds::new(LngLat::new(-10.0, 40.0), LngLat::new(10.0, 50.0));
    /// assert_eq!(b.north_west(), LngLat::new(-10.0, 50.0));
    /// assert_eq!(b.center(), LngLat::new(0.0, 45.0));
    /// ```
    #[must_use]
    pub const fn north_west(&self) -> LngLat {
        LngLat::new(self.sw.lng, self.ne.lat)
    }

    /// Returns the center of the bounds.
    #[must_use]
    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.sw.lng + self.ne.lng) / 2.0,
            (self.sw.lat + self.ne.lat) / 2.0,
        )
    }

    /// Longitude extent in degrees.
    #[must_use]
    pub fn lng_span(&self) -> f64 {
        (self.ne.lng - self.sw.lng).abs()
    }

    /// Latitude extent in degrees.
    #[must_use]
    pub fn lat_span(&self) -> f64 {
        (self.ne.lat - self.sw.lat).abs()
    }
}

/// A position in screen pixels relative to the map container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    /// Pixels from the left edge.
    pub x: f64,
    /// Pixels from the top edge.
    pub y: f64,
}

impl ScreenPoint {
    /// A point `x` pixels right and `y` pixels down.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}
