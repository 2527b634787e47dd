//! Domain layer: errors, geographic primitives and the map event object.
//!
//! These types carry no backend-specific behavior and are shared by every
//! other layer of the crate.
//!
//! # Organization
//!
//! - [`error`]: Error types and result aliases
//! - [`geo`]: Locations, bounds and screen points
//! - [`event`]: The shared, two-phase [`MapEvent`]

pub mod error;
pub mod event;
pub mod geo;

pub use error::{MapError, Result};
pub use event::{DataKind, DataPayload, FeatureHit, MapEvent};
pub use geo::{Bounds, LngLat, ScreenPoint};
