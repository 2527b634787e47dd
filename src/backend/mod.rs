//! Backend abstraction.
//!
//! This module defines the [`MapBackend`] trait that every map-rendering
//! provider implements. Event arbitration, style synchronization and zoom
//! normalization are written once against this trait.
//!
//! # Design Philosophy
//!
//! The trait mirrors the operations the core actually needs (subscribe,
//! camera state, layer and source mutation) rather than a full SDK surface.
//! Each provider differs in three ways, all captured by its [`Dialect`]:
//!
//! - the native names of the canonical camera events,
//! - the offset between the 1-based user zoom and the native zoom,
//! - which native events report a finished style or source load.
//!
//! # Implementations
//!
//! - [`StyleBackend`]: style-document provider with layer-scoped events
//! - [`OverlayBackend`]: overlay provider with token-based listeners
//!
//! # Event delivery
//!
//! Backends never call handlers while borrowed. Physical events are either
//! delivered with [`dispatch`] or queued by the backend itself (camera
//! changes, style loads) and delivered by [`pump`].

mod camera;
mod stack;

/// Overlay provider with token-based listeners.
pub mod overlay;
/// Style-document provider with layer-scoped events.
pub mod style;

pub use camera::{Camera, CameraMove, MoveKind};
pub use overlay::OverlayBackend;
pub use stack::LayerStack;
pub use style::StyleBackend;

use crate::domain::error::Result;
use crate::domain::event::MapEvent;
use crate::domain::geo::{Bounds, LngLat, ScreenPoint};
use crate::style::document::{SourceSpec, StyleLayer};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a live backend map.
pub type BackendHandle = Rc<RefCell<dyn MapBackend>>;

/// A handler installed on the backend. It receives the shared event so that
/// it can keep it alive past the dispatch (deferred arbitration).
pub type BoundHandler = Rc<dyn Fn(&Rc<MapEvent>)>;

/// Identifies one backend-level subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Diagnostic view of one backend-level subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Id returned by [`MapBackend::subscribe`].
    pub id: SubscriptionId,
    /// Native event name.
    pub event: String,
    /// Style layer the subscription is scoped to, if any.
    pub layer: Option<String>,
}

/// Provider-specific naming and zoom conventions.
#[derive(Debug, PartialEq, Eq)]
pub struct Dialect {
    /// Provider name, used in log fields.
    pub name: &'static str,
    /// Canonical event name to native event name.
    pub aliases: &'static [(&'static str, &'static str)],
    /// Native zoom = user zoom - `zoom_offset`.
    pub zoom_offset: i32,
    /// Native event fired once the style finished loading.
    pub style_load_event: &'static str,
    /// Native event fired when source data changes.
    pub data_event: &'static str,
}

impl Dialect {
    /// Translates a canonical event name to the native one. Unknown names
    /// pass through unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::{overlay, style};
    ///
    /// assert_eq!(style::DIALECT.translate("zoom_changed"), "zoomend");
    /// assert_eq!(style::DIALECT.translate("click"), "click");
    /// assert_eq!(overlay::DIALECT.translate("zoom_changed"), "zoom_changed");
    /// ```
    pub fn translate<'a>(&self, event: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|&&(canonical, _)| canonical == event)
            .map_or(event, |&(_, native)| native)
    }
}

/// Options for [`MapBackend::fit_bounds`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Padding in pixels on every side.
    pub padding: f64,
    /// Whether the camera animates to the fitted view.
    pub animate: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            padding: 0.0,
            animate: false,
        }
    }
}

/// Target of an animated camera transition, in native zoom.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
///
/// [`Map::fly_to`](crate::Map::fly_to) and
/// [`Map::ease_to`](crate::Map::ease_to) take the same type in user zoom and
/// convert it before it reaches the backend.
pub struct Transition {
    /// Camera center to end on. `None` keeps the current center.
    pub center: Option<LngLat>,
    /// Zoom to end on. `None` keeps the current zoom.
    pub zoom: Option<f64>,
    /// Animation length. `None` uses the provider default.
    pub duration_ms: Option<u32>,
}

/// Capability interface of a map-rendering provider.
///
/// All zoom values are native. Layer and source operations must preserve the
/// definitions they are handed, so a removed layer can be re-added unchanged.
///
/// Camera methods apply at once and queue the provider's native camera
/// events; [`pump`] delivers them. Backends must not call handlers from
/// inside any trait method.
///
/// # Implementations
///
/// - [`StyleBackend`]: style-document provider, zoom offset 1
/// - [`OverlayBackend`]: overlay provider, zoom offset 0
///
/// # Examples
///
/// ```
/// use mapweave::backend::{self, BackendHandle, MapBackend, StyleBackend};
/// use mapweave::MapEvent;
/// use std::cell::{Cell, RefCell};
/// use std::rc::Rc;
///
/// let backend: BackendHandle = Rc::new(RefCell::new(StyleBackend::new()));
/// let zooms = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&zooms);
/// let native = backend.borrow().dialect().translate("zoom_changed");
/// backend.borrow_mut().subscribe(
///     native,
///     None,
///     Rc::new(move |_: &Rc<MapEvent>| counter.set(counter.get() + 1)),
/// );
///
/// backend.borrow_mut().zoom_to(3.0, false);
/// assert_eq!(backend::pump(&backend), 2);
/// assert_eq!(zooms.get(), 1);
/// ```
pub trait MapBackend {
    /// Naming and zoom conventions of this provider.
    fn dialect(&self) -> &'static Dialect;

    /// Subscribes `handler` to the native `event`, optionally scoped to the
    /// features of one style layer.
    fn subscribe(&mut self, event: &str, layer: Option<&str>, handler: BoundHandler)
        -> SubscriptionId;

    /// Removes a subscription. Returns `false` if it was not installed.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Handlers that should receive `event`, in subscription order.
    fn handlers_for(&self, event: &MapEvent) -> Vec<BoundHandler>;

    /// Every installed subscription, in subscription order.
    fn subscriptions(&self) -> Vec<Subscription>;

    /// Drains the events the backend queued for delivery.
    fn take_events(&mut self) -> Vec<MapEvent>;

    /// Whether a style has finished loading and has not been torn down.
    fn is_style_loaded(&self) -> bool;

    /// Current native zoom.
    fn zoom(&self) -> f64;

    /// Jumps to `zoom` without animation.
    fn set_zoom(&mut self, zoom: f64);

    /// Zooms to `zoom`, animated if `animate` is set.
    fn zoom_to(&mut self, zoom: f64, animate: bool);

    /// Limits the zoom range. `None` leaves that end unchanged.
    fn set_zoom_range(&mut self, min: Option<f64>, max: Option<f64>);

    /// Current camera center.
    fn center(&self) -> LngLat;

    /// Moves the camera center without animation.
    fn set_center(&mut self, center: LngLat);

    /// Geographic bounds of the viewport.
    fn bounds(&self) -> Bounds;

    /// Centers on `bounds` at the largest zoom that shows them whole.
    fn fit_bounds(&mut self, bounds: Bounds, options: FitOptions);

    /// Pans by a screen offset in pixels.
    fn pan_by(&mut self, dx: f64, dy: f64);

    /// Pans to `center`, animated.
    fn pan_to(&mut self, center: LngLat);

    /// Flies to `transition`, animated.
    fn fly_to(&mut self, transition: Transition);

    /// Eases to `transition`, animated.
    fn ease_to(&mut self, transition: Transition);

    /// Re-measures the container.
    fn resize(&mut self);

    /// Live style layers, bottom to top.
    fn style_layers(&self) -> Vec<StyleLayer>;

    /// Definition of the live layer `id`.
    fn layer(&self, id: &str) -> Option<StyleLayer>;

    /// Whether `id` is a live layer.
    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    /// Inserts `layer` below `before`, or on top when `before` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`](crate::MapError::Backend) if the id is
    /// taken or `before` is not a live layer.
    fn add_layer(&mut self, layer: StyleLayer, before: Option<&str>) -> Result<()>;

    /// Removes the live layer `id` and returns its definition.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`](crate::MapError::Backend) if no such
    /// layer is live.
    fn remove_layer(&mut self, id: &str) -> Result<StyleLayer>;

    /// Shows or hides the live layer `id`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`](crate::MapError::Backend) if no such
    /// layer is live.
    fn set_layer_visible(&mut self, id: &str, visible: bool) -> Result<()>;

    /// Definition of the source `id`.
    fn source(&self, id: &str) -> Option<SourceSpec>;

    /// Adds a source and queues its loaded data event.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`](crate::MapError::Backend) if the id is
    /// taken.
    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()>;

    /// Removes the source `id` and returns its definition.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`](crate::MapError::Backend) if no such
    /// source exists. Providers may also refuse while a live layer still
    /// draws from it.
    fn remove_source(&mut self, id: &str) -> Result<SourceSpec>;

    /// Attribution strings of the sources drawn by live layers.
    fn source_attributions(&self) -> Vec<String>;

    /// Properties of the features rendered around `point`, restricted to
    /// `layers`.
    fn query_rendered_features(&self, point: ScreenPoint, layers: &[String]) -> Vec<JsonValue>;

    /// Tears the map down, dropping every subscription.
    fn remove(&mut self);
}

/// Delivers one physical event to every matching handler.
///
/// The backend borrow is released before handlers run, so handlers may call
/// back into the backend.
pub fn dispatch(backend: &BackendHandle, event: MapEvent) -> Rc<MapEvent> {
    let event = Rc::new(event);
    let handlers = backend.borrow().handlers_for(&event);
    tracing::trace!(event = %event.name(), handlers = handlers.len(), "dispatching");
    for handler in handlers {
        handler(&event);
    }
    event
}

/// Delivers the events the backend queued itself. Events queued by the
/// handlers of this pass are left for the next call. Returns the number of
/// events delivered.
pub fn pump(backend: &BackendHandle) -> usize {
    let events = backend.borrow_mut().take_events();
    let count = events.len();
    for event in events {
        dispatch(backend, event);
    }
    count
}

/// Next id from a per-backend counter.
pub(crate) fn next_id(counter: &mut u64) -> SubscriptionId {
    *counter += 1;
    SubscriptionId(*counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_known_and_unknown_names() {
        let dialect = &style::DIALECT;
        assert_eq!(dialect.translate("zoom_changed"), "zoomend");
        assert_eq!(dialect.translate("bounds_changed"), "moveend");
        assert_eq!(dialect.translate("click"), "click");
        assert_eq!(overlay::DIALECT.translate("zoom_changed"), "zoom_changed");
    }

    #[test]
    fn dispatch_releases_the_backend_borrow() {
        let backend: BackendHandle = Rc::new(RefCell::new(StyleBackend::default()));
        let inner = Rc::clone(&backend);
        backend.borrow_mut().subscribe(
            "click",
            None,
            Rc::new(move |_: &Rc<MapEvent>| {
                inner.borrow_mut().set_zoom(3.0);
            }),
        );
        dispatch(&backend, MapEvent::new("click"));
        assert!((backend.borrow().zoom() - 3.0).abs() < f64::EPSILON);
    }
}
