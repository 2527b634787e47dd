//! The two-phase map event object.
//!
//! A [`MapEvent`] is created by a backend for every physical occurrence (a click,
//! a camera move, a style or source load) and shared by reference count between
//! every handler that receives it. Handlers communicate through interior-mutable
//! flags on the event:
//!
//! - `claimed`: set by a feature-level handler to suppress the deferred
//!   background (whole-map) handler for the same physical event.
//! - `propagation_stopped`: mirrors the DOM `stopPropagation` call.
//! - `ll`: the normalized location attached before a located handler runs.

use crate::domain::geo::{LngLat, ScreenPoint};
use std::cell::{Cell, RefCell};

/// A rendered feature under the pointer, as reported by the backend hit test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureHit {
    /// Style layer the feature is rendered by.
    pub layer_id: String,
    /// Identifier of the feature within the layer.
    pub feature_id: String,
}

impl FeatureHit {
    /// A hit on feature `feature_id` of layer `layer_id`.
    pub fn new(layer_id: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            feature_id: feature_id.into(),
        }
    }
}

/// What a data event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// The style document finished (re)loading.
    Style,
    /// A source produced data.
    Source,
}

/// Payload of backend data-load events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload {
    /// Whether the style or a source produced data.
    pub kind: DataKind,
    /// Source the event refers to, for [`DataKind::Source`].
    pub source_id: Option<String>,
    /// Whether the data finished loading (a loaded tile for vector sources).
    pub loaded: bool,
}

impl DataPayload {
    /// A style-loaded payload.
    #[must_use]
    pub const fn style() -> Self {
        Self {
            kind: DataKind::Style,
            source_id: None,
            loaded: true,
        }
    }

    /// A source payload.
    pub fn source(source_id: impl Into<String>, loaded: bool) -> Self {
        Self {
            kind: DataKind::Source,
            source_id: Some(source_id.into()),
            loaded,
        }
    }
}

/// An event delivered by a map backend.
///
/// Built by the backend with the builder methods, then shared as
/// `Rc<MapEvent>` with every handler of the dispatch. The payload is fixed
/// once built; only the arbitration flags, the normalized location and the
/// attribution labels change afterwards.
///
/// # Examples
///
/// ```
/// use mapweave::{FeatureHit, LngLat, MapEvent, ScreenPoint};
///
/// let event = MapEvent::new("click")
///     .at(LngLat::new(13.4, 52.5))
///     .with_point(ScreenPoint::new(120.0, 80.0))
///     .with_feature(FeatureHit::new("pois", "cafe-7"));
///
/// assert_eq!(event.feature_in("pois").map(|h| h.feature_id.as_str()), Some("cafe-7"));
/// assert!(!event.is_claimed());
/// event.claim();
/// assert!(event.is_claimed());
/// ```
#[derive(Debug)]
pub struct MapEvent {
    name: String,
    lng_lat: Option<LngLat>,
    point: Option<ScreenPoint>,
    features: Vec<FeatureHit>,
    data: Option<DataPayload>,
    ll: Cell<Option<LngLat>>,
    claimed: Cell<bool>,
    propagation_stopped: Cell<bool>,
    attribution: RefCell<Option<Vec<String>>>,
}

impl MapEvent {
    /// Creates an event with the backend-native `name` and no payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lng_lat: None,
            point: None,
            features: Vec::new(),
            data: None,
            ll: Cell::new(None),
            claimed: Cell::new(false),
            propagation_stopped: Cell::new(false),
            attribution: RefCell::new(None),
        }
    }

    /// Attaches the raw geographic position reported by the backend.
    #[must_use]
    pub fn at(mut self, lng_lat: LngLat) -> Self {
        self.lng_lat = Some(lng_lat);
        self
    }

    /// Attaches the screen position of the pointer.
    #[must_use]
    pub fn with_point(mut self, point: ScreenPoint) -> Self {
        self.point = Some(point);
        self
    }

    /// Adds a feature hit; hits are ordered topmost first.
    #[must_use]
    pub fn with_feature(mut self, hit: FeatureHit) -> Self {
        self.features.push(hit);
        self
    }

    /// Attaches a data-load payload.
    #[must_use]
    pub fn with_data(mut self, data: DataPayload) -> Self {
        self.data = Some(data);
        self
    }

    /// Name the event was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw backend position, if the backend derived one.
    pub const fn lng_lat(&self) -> Option<LngLat> {
        self.lng_lat
    }

    /// Screen position, for pointer events.
    pub const fn point(&self) -> Option<ScreenPoint> {
        self.point
    }

    /// Features the event hit.
    pub fn features(&self) -> &[FeatureHit] {
        &self.features
    }

    /// Topmost feature hit rendered by `layer_id`.
    pub fn feature_in(&self, layer_id: &str) -> Option<&FeatureHit> {
        self.features.iter().find(|hit| hit.layer_id == layer_id)
    }

    /// Style or source load details, for data events.
    pub const fn data(&self) -> Option<&DataPayload> {
        self.data.as_ref()
    }

    /// Returns `true` for a source event whose data finished loading.
    pub fn is_source_loaded(&self) -> bool {
        self.data
            .as_ref()
            .is_some_and(|d| d.kind == DataKind::Source && d.loaded)
    }

    /// Normalized location, present once a located handler has tagged the event.
    ///
    /// Unlike [`MapEvent::lng_lat`], the longitude is wrapped into
    /// `[-180, 180]`.
    pub fn ll(&self) -> Option<LngLat> {
        self.ll.get()
    }

    pub(crate) fn set_ll(&self, ll: LngLat) {
        self.ll.set(Some(ll));
    }

    /// Marks the event as handled by a feature.
    ///
    /// A claim suppresses the deferred whole-map handlers that have not run
    /// yet. Claims are never cleared.
    pub fn claim(&self) {
        self.claimed.set(true);
    }

    /// Whether a feature handler claimed the event.
    pub fn is_claimed(&self) -> bool {
        self.claimed.get()
    }

    /// Marks the event as handled.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    /// Whether a handler stopped propagation.
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    /// Host labels of the attributions active when this source event fired.
    ///
    /// `None` until the map's attribution handler has processed the event,
    /// and for every event that is not a finished source load.
    pub fn attribution(&self) -> Option<Vec<String>> {
        self.attribution.borrow().clone()
    }

    pub(crate) fn set_attribution(&self, labels: Vec<String>) {
        *self.attribution.borrow_mut() = Some(labels);
    }
}
