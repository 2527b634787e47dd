//! The map entity.
//!
//! [`Map`] wraps one backend map. It is itself an [`Entity`] with
//! [`Scope::Map`], so whole-map listeners follow the same registration,
//! arbitration and replay rules as feature listeners. On top of that it owns
//! the per-map state:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Map                                          │
//! │  ├─ Entity (listener table, Scope::Map)      │
//! │  ├─ FeatureRouter (shared by every feature)  │
//! │  └─ MapCore                                  │
//! │      ├─ ZoomNormalizer                       │
//! │      ├─ StyleController (layer groups)       │
//! │      ├─ visibility flags and units           │
//! │      └─ AttributionAggregator                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The core reacts to two native events of the backend's dialect: the style
//! load event builds the layer groups once and applies the stored flags and
//! units; the data event recomputes attribution whenever a source finishes
//! loading. Nothing style-related happens before the first style load.

use crate::backend::{self, BackendHandle, FitOptions, SubscriptionId, Transition};
use crate::config::MapOptions;
use crate::domain::error::Result;
use crate::domain::event::MapEvent;
use crate::domain::geo::{Bounds, LngLat, ScreenPoint};
use crate::entity::{Attachment, Entity, FeatureRouter, Handler, Scope};
use crate::observability::{init_tracing, TraceConfig};
use crate::scheduler::Scheduler;
use crate::style::attribution::AttributionAggregator;
use crate::style::controller::{self, StyleController};
use crate::style::document::SourceSpec;
use crate::style::visibility::{Flags, Units};
use crate::zoom::ZoomNormalizer;
use serde_json::Value as JsonValue;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Padding of [`Map::fit_bounds`], in pixels.
const FIT_PADDING: f64 = 100.0;

type ReadyCallback = Box<dyn FnOnce()>;

/// State shared with the internal backend handlers.
struct MapCore {
    backend: BackendHandle,
    zoom: ZoomNormalizer,
    controller: RefCell<StyleController>,
    flags: RefCell<Flags>,
    units: Cell<Option<Units>>,
    attribution: RefCell<AttributionAggregator>,
    on_ready: RefCell<Option<ReadyCallback>>,
    ready: Cell<bool>,
}

impl MapCore {
    fn style_loaded(&self) {
        let _span = tracing::debug_span!("style_loaded").entered();

        let layers = self.backend.borrow().style_layers();
        self.controller.borrow_mut().init(&layers);
        self.sync_style();
        self.update_attribution(None);

        if !self.ready.replace(true) {
            tracing::debug!("map ready");
        }
        let callback = self.on_ready.borrow_mut().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Applies the stored units, then the stored flags.
    fn sync_style(&self) {
        let controller = self.controller.borrow();
        let mut backend = self.backend.borrow_mut();
        if let Some(units) = self.units.get() {
            controller.apply_units(&mut *backend, units);
        }
        controller.apply_visibility(&mut *backend, &self.flags.borrow());
    }

    fn update_attribution(&self, event: Option<&MapEvent>) {
        let _span = tracing::debug_span!("update_attribution").entered();

        let raw = self.backend.borrow().source_attributions();
        let (labels, callback) = {
            let mut aggregator = self.attribution.borrow_mut();
            (aggregator.update(&raw), aggregator.callback())
        };
        if let Some(event) = event {
            event.set_attribution(labels.clone());
        }
        if let Some(callback) = callback {
            callback(&labels);
        }
    }

    fn z_index_anchor(&self, z: i64) -> Option<String> {
        self.controller
            .borrow()
            .z_index_anchor(z, &*self.backend.borrow())
    }

    fn is_style_loaded(&self) -> bool {
        self.backend.borrow().is_style_loaded()
    }
}

/// A live map on one backend.
///
/// The map is the root entity: whole-map listeners are registered on it, and
/// features attach to it through [`Map::attachment`]. Camera calls take and
/// return 1-based user zoom levels whatever the backend's native convention.
///
/// All state is single-threaded. The backend handle is shared with every
/// attached feature, so callers must not hold a backend borrow across a call
/// into the map.
///
/// # Examples
///
/// ```
/// use mapweave::backend::OverlayBackend;
/// use mapweave::{Map, MapOptions};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let backend = Rc::new(RefCell::new(OverlayBackend::new()));
/// let map = Map::new(backend, MapOptions::default(), None)?;
/// map.set_zoom(4.0);
/// assert_eq!(map.zoom(), 4.0);
/// # Ok::<(), mapweave::MapError>(())
/// ```
pub struct Map {
    entity: Entity,
    core: Rc<MapCore>,
    router: FeatureRouter,
    scheduler: Option<Rc<dyn Scheduler>>,
    internal: Vec<SubscriptionId>,
    destroyed: bool,
}

impl Map {
    /// Wraps `backend`, applying the 1-based zoom `options` in native units.
    ///
    /// `scheduler` runs the deferred background-click checks; without one
    /// they run inline, so background handlers cannot be suppressed by
    /// feature handlers that fire later in the same dispatch.
    ///
    /// The map subscribes to the dialect's style load and data events. If
    /// the backend already has a style loaded, the layer groups are built
    /// before this returns and [`Map::is_ready`] is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Config`](crate::MapError::Config) if the options
    /// are inconsistent.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::StyleBackend;
    /// use mapweave::{Map, MapOptions, Scheduler, TickQueue};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let ticks = Rc::new(TickQueue::new());
    /// let scheduler: Rc<dyn Scheduler> = ticks.clone();
    ///
    /// let options = MapOptions::from_toml_str("zoom = 5\nmin_zoom = 2")?;
    /// let map = Map::new(backend, options, Some(scheduler))?;
    /// assert_eq!(map.zoom(), 5.0);
    /// assert!(!map.is_ready());
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn new(
        backend: BackendHandle,
        options: MapOptions,
        scheduler: Option<Rc<dyn Scheduler>>,
    ) -> Result<Self> {
        options.validate()?;
        if options.trace != TraceConfig::default() {
            init_tracing(&options.trace);
        }

        let dialect = backend.borrow().dialect();
        let zoom = ZoomNormalizer::for_dialect(dialect);
        let _span = tracing::debug_span!("map_new", dialect = dialect.name).entered();

        {
            let native = zoom.options(options.zoom, options.min_zoom, options.max_zoom);
            let mut map = backend.borrow_mut();
            if native.min_zoom.is_some() || native.max_zoom.is_some() {
                map.set_zoom_range(native.min_zoom, native.max_zoom);
            }
            if let Some(level) = native.zoom {
                map.set_zoom(level);
            }
            if let Some(center) = options.center {
                map.set_center(center);
            }
        }

        let core = Rc::new(MapCore {
            backend: Rc::clone(&backend),
            zoom,
            controller: RefCell::new(StyleController::new()),
            flags: RefCell::new(options.visibility),
            units: Cell::new(options.units),
            attribution: RefCell::new(AttributionAggregator::new(options.attribution_separator)),
            on_ready: RefCell::new(None),
            ready: Cell::new(false),
        });

        let load = backend.borrow_mut().subscribe(
            dialect.style_load_event,
            None,
            Rc::new({
                let core = Rc::downgrade(&core);
                move |_: &Rc<MapEvent>| {
                    if let Some(core) = core.upgrade() {
                        core.style_loaded();
                    }
                }
            }),
        );
        let data = backend.borrow_mut().subscribe(
            dialect.data_event,
            None,
            Rc::new({
                let core = Rc::downgrade(&core);
                move |e: &Rc<MapEvent>| {
                    if !e.is_source_loaded() {
                        return;
                    }
                    if let Some(core) = core.upgrade() {
                        core.update_attribution(Some(e));
                    }
                }
            }),
        );
        let internal = vec![load, data];

        let mut map = Self {
            entity: Entity::new(Scope::Map),
            router: FeatureRouter::new(Rc::clone(&backend)),
            core,
            scheduler,
            internal,
            destroyed: false,
        };
        let attachment = map.attachment();
        map.entity.add(attachment);

        if map.core.is_style_loaded() {
            map.core.style_loaded();
        }
        Ok(map)
    }

    /// What features need to attach to this map.
    ///
    /// Pass the result to [`Entity::add`]; feature wrappers such as
    /// [`Marker`](crate::Marker) call this themselves.
    pub fn attachment(&self) -> Attachment {
        let core: Weak<MapCore> = Rc::downgrade(&self.core);
        Attachment {
            backend: Rc::clone(&self.core.backend),
            router: self.router.clone(),
            scheduler: self.scheduler.clone(),
            anchors: Rc::new(move |z: i64| core.upgrade().and_then(|core| core.z_index_anchor(z))),
        }
    }

    /// The shared backend handle.
    pub fn backend(&self) -> &BackendHandle {
        &self.core.backend
    }

    /// The map's own entity, holding the whole-map listener table.
    pub const fn entity(&self) -> &Entity {
        &self.entity
    }

    /// The router that fans feature-scoped events out to attached features.
    pub const fn router(&self) -> &FeatureRouter {
        &self.router
    }

    /// Whether the first style load has been handled.
    pub fn is_ready(&self) -> bool {
        self.core.ready.get()
    }

    /// Runs `callback` once the style has loaded, immediately if it already
    /// has.
    ///
    /// Only the latest pending callback is kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::StyleBackend;
    /// use mapweave::style::StyleDocument;
    /// use mapweave::{Map, MapOptions};
    /// use std::cell::{Cell, RefCell};
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let map = Map::new(backend.clone(), MapOptions::default(), None)?;
    ///
    /// let ready = Rc::new(Cell::new(false));
    /// let flag = Rc::clone(&ready);
    /// map.on_ready(move || flag.set(true));
    /// assert!(!ready.get());
    ///
    /// backend.borrow_mut().load_style(StyleDocument::default());
    /// map.pump();
    /// assert!(ready.get());
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn on_ready(&self, callback: impl FnOnce() + 'static) {
        if self.is_ready() {
            callback();
        } else {
            *self.core.on_ready.borrow_mut() = Some(Box::new(callback));
        }
    }

    // Listeners

    /// Registers `handler` for the canonical `event`.
    ///
    /// The handler is bound on the backend under the dialect's native name.
    /// Located whole-map events (clicks, pointer moves) are deferred by one
    /// scheduler tick and skipped if a feature claimed them.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::StyleBackend;
    /// use mapweave::{Map, MapEvent, MapOptions};
    /// use std::cell::{Cell, RefCell};
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let mut map = Map::new(backend, MapOptions::default(), None)?;
    ///
    /// let zooms = Rc::new(Cell::new(0));
    /// let counter = Rc::clone(&zooms);
    /// map.on("zoom_changed", move |_: &MapEvent| counter.set(counter.get() + 1));
    ///
    /// map.zoom_in();
    /// map.pump();
    /// assert_eq!(zooms.get(), 1);
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn on(&mut self, event: &str, handler: impl Into<Handler>) -> &mut Self {
        self.entity.on(event, handler);
        self
    }

    /// Removes the oldest registration of `handler` for `event`.
    ///
    /// `event` may be the canonical name or the dialect's native name. See
    /// [`Entity::off`].
    pub fn off(&mut self, event: &str, handler: &Handler) -> &mut Self {
        self.entity.off(event, handler);
        self
    }

    /// Removes every listener for `event`.
    pub fn off_event(&mut self, event: &str) -> &mut Self {
        self.entity.off_event(event);
        self
    }

    /// Removes every whole-map listener. Internal style and attribution
    /// subscriptions stay in place.
    pub fn off_all(&mut self) -> &mut Self {
        self.entity.off_all();
        self
    }

    /// Calls the whole-map handlers registered for `event` directly, without
    /// going through the backend or the arbiter.
    pub fn fire(&self, event: &str, e: &MapEvent) {
        self.entity.fire(event, e);
    }

    /// Delivers a physical event through the backend.
    ///
    /// This is the entry point a host uses to forward user input. Handlers
    /// run synchronously; deferred background checks run when the map's
    /// scheduler drains.
    ///
    /// # Returns
    ///
    /// The shared event, so callers can inspect whether a feature claimed it
    /// or what attribution it carries.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::StyleBackend;
    /// use mapweave::{LngLat, Map, MapEvent, MapOptions, Scheduler, TickQueue};
    /// use std::cell::{Cell, RefCell};
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let ticks = Rc::new(TickQueue::new());
    /// let scheduler: Rc<dyn Scheduler> = ticks.clone();
    /// let mut map = Map::new(backend, MapOptions::default(), Some(scheduler))?;
    ///
    /// let clicks = Rc::new(Cell::new(0));
    /// let counter = Rc::clone(&clicks);
    /// map.on("click", move |_: &MapEvent| counter.set(counter.get() + 1));
    ///
    /// let event = map.dispatch(MapEvent::new("click").at(LngLat::new(190.0, 10.0)));
    /// assert_eq!(clicks.get(), 0);
    /// ticks.run_until_idle();
    /// assert_eq!(clicks.get(), 1);
    /// assert_eq!(event.ll(), Some(LngLat::new(-170.0, 10.0)));
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn dispatch(&self, event: MapEvent) -> Rc<MapEvent> {
        backend::dispatch(&self.core.backend, event)
    }

    /// Delivers the events the backend queued. Returns how many were
    /// delivered.
    ///
    /// Backends queue camera events and style or source loads instead of
    /// calling handlers while borrowed. Events queued by handlers during
    /// this call wait for the next one.
    pub fn pump(&self) -> usize {
        backend::pump(&self.core.backend)
    }

    // Camera

    /// Current user zoom.
    pub fn zoom(&self) -> f64 {
        self.core.zoom.to_user(self.core.backend.borrow().zoom())
    }

    /// Zooms to the user zoom `level`, animated once the style has loaded.
    ///
    /// # Parameters
    ///
    /// * `level` - 1-based zoom. The backend clamps it to its zoom range.
    pub fn set_zoom(&self, level: f64) {
        let native = self.core.zoom.to_native(level);
        let animate = self.core.is_style_loaded();
        self.core.backend.borrow_mut().zoom_to(native, animate);
    }

    /// Zooms in by one user level.
    pub fn zoom_in(&self) {
        self.set_zoom(self.zoom() + 1.0);
    }

    /// Zooms out by one user level.
    pub fn zoom_out(&self) {
        self.set_zoom(self.zoom() - 1.0);
    }

    /// Current camera center.
    pub fn center(&self) -> LngLat {
        self.core.backend.borrow().center()
    }

    /// Moves the camera center without animation.
    pub fn set_center(&self, center: LngLat) {
        self.core.backend.borrow_mut().set_center(center);
    }

    /// Geographic bounds of the visible viewport.
    pub fn bounds(&self) -> Bounds {
        self.core.backend.borrow().bounds()
    }

    /// Fits `bounds` with a fixed padding, animated once the style has
    /// loaded.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::StyleBackend;
    /// use mapweave::{Bounds, LngLat, Map, MapOptions};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let map = Map::new(backend, MapOptions::default(), None)?;
    ///
    /// let alps = Bounds::new(LngLat::new(5.0, 44.0), LngLat::new(16.0, 48.0));
    /// map.fit_bounds(alps);
    /// assert_eq!(map.center(), alps.center());
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn fit_bounds(&self, bounds: Bounds) {
        let options = FitOptions {
            padding: FIT_PADDING,
            animate: self.core.is_style_loaded(),
        };
        self.core.backend.borrow_mut().fit_bounds(bounds, options);
    }

    /// Pans by a screen offset in pixels.
    pub fn pan_by(&self, dx: f64, dy: f64) {
        self.core.backend.borrow_mut().pan_by(dx, dy);
    }

    /// Pans to the north-west corner of `bounds`.
    pub fn pan_to_bounds(&self, bounds: Bounds) {
        self.core.backend.borrow_mut().pan_to(bounds.north_west());
    }

    /// Flies to a user-zoom `transition`. The zoom target is floored.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::{StyleBackend, Transition};
    /// use mapweave::{LngLat, Map, MapOptions};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let map = Map::new(backend, MapOptions::default(), None)?;
    ///
    /// map.fly_to(Transition {
    ///     center: Some(LngLat::new(2.35, 48.85)),
    ///     zoom: Some(11.6),
    ///     ..Transition::default()
    /// });
    /// assert_eq!(map.zoom(), 11.0);
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn fly_to(&self, transition: Transition) {
        let native = self.core.zoom.transition(transition);
        self.core.backend.borrow_mut().fly_to(native);
    }

    /// Eases to a user-zoom `transition`. The zoom target is floored.
    pub fn ease_to(&self, transition: Transition) {
        let native = self.core.zoom.transition(transition);
        self.core.backend.borrow_mut().ease_to(native);
    }

    // Style

    /// Replaces a live source without reordering layers, or re-measures the
    /// container when `source` is `None`.
    ///
    /// The layers drawing from the source are removed, the source is
    /// replaced, and the layers are re-added at their original positions.
    ///
    /// # Errors
    ///
    /// Propagates the backend error that interrupted the refresh. Layers
    /// removed before the failure are not restored.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::style::SourceSpec;
    /// use mapweave::backend::{MapBackend, StyleBackend};
    /// use mapweave::style::StyleDocument;
    /// use mapweave::{Map, MapOptions};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let map = Map::new(backend.clone(), MapOptions::default(), None)?;
    /// let style = StyleDocument::from_json(
    ///     r#"{
    ///         "version": 8,
    ///         "sources": { "osm": { "type": "vector" } },
    ///         "layers": [
    ///             { "id": "roads-km", "type": "line", "source": "osm", "metadata": { "units": "metric" } },
    ///             { "id": "roads-mi", "type": "line", "source": "osm", "metadata": { "units": "imperial" } },
    ///             { "id": "trails", "type": "line", "source": "osm", "metadata": { "visibility": "beta" } }
    ///         ]
    ///     }"#,
    /// )?;
    /// backend.borrow_mut().load_style(style);
    /// map.pump();
    ///
    /// let before = backend.borrow().style_layers();
    /// map.refresh(Some(("osm", SourceSpec::new("vector").with_attribution("© OSM"))))?;
    /// assert_eq!(backend.borrow().style_layers(), before);
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn refresh(&self, source: Option<(&str, SourceSpec)>) -> Result<()> {
        let mut backend = self.core.backend.borrow_mut();
        match source {
            Some((id, spec)) => controller::refresh_source(&mut *backend, id, spec),
            None => {
                backend.resize();
                Ok(())
            }
        }
    }

    /// Shows or hides every flag-gated layer according to `flags`. The stored
    /// flags are left unchanged.
    ///
    /// Missing flags count as `false`. Does nothing before the first style
    /// load; the stored flags are applied then.
    pub fn apply_visibility(&self, flags: &Flags) {
        let controller = self.core.controller.borrow();
        controller.apply_visibility(&mut *self.core.backend.borrow_mut(), flags);
    }

    /// The stored visibility flags.
    pub fn visibility(&self) -> Flags {
        self.core.flags.borrow().clone()
    }

    /// Replaces the stored flags and applies them.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::{MapBackend, StyleBackend};
    /// use mapweave::style::StyleDocument;
    /// use mapweave::{Map, MapOptions};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let map = Map::new(backend.clone(), MapOptions::default(), None)?;
    /// let style = StyleDocument::from_json(
    ///     r#"{
    ///         "version": 8,
    ///         "sources": { "osm": { "type": "vector" } },
    ///         "layers": [
    ///             { "id": "roads-km", "type": "line", "source": "osm", "metadata": { "units": "metric" } },
    ///             { "id": "roads-mi", "type": "line", "source": "osm", "metadata": { "units": "imperial" } },
    ///             { "id": "trails", "type": "line", "source": "osm", "metadata": { "visibility": "beta" } }
    ///         ]
    ///     }"#,
    /// )?;
    /// backend.borrow_mut().load_style(style);
    /// map.pump();
    ///
    /// map.set_visibility([("beta".to_string(), true)].into());
    /// assert!(backend.borrow().layer("trails").is_some_and(|l| l.is_visible()));
    ///
    /// map.set_flag("beta", false);
    /// assert!(backend.borrow().layer("trails").is_some_and(|l| !l.is_visible()));
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn set_visibility(&self, flags: Flags) {
        *self.core.flags.borrow_mut() = flags;
        self.apply_visibility(&self.core.flags.borrow());
    }

    /// Updates one stored flag and re-applies visibility.
    pub fn set_flag(&self, key: &str, value: bool) {
        self.core.flags.borrow_mut().insert(key.to_string(), value);
        self.apply_visibility(&self.core.flags.borrow());
    }

    /// Switches the unit-tagged layers to `units` and re-applies the stored
    /// flags to the restored layers.
    ///
    /// Layers of the other system are removed from the style. Layers of the
    /// requested system that were removed earlier are re-added at their
    /// original position. The choice is remembered and applied again after
    /// the next style load.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::Units;
    /// use mapweave::backend::{MapBackend, StyleBackend};
    /// use mapweave::style::StyleDocument;
    /// use mapweave::{Map, MapOptions};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let map = Map::new(backend.clone(), MapOptions::default(), None)?;
    /// let style = StyleDocument::from_json(
    ///     r#"{
    ///         "version": 8,
    ///         "sources": { "osm": { "type": "vector" } },
    ///         "layers": [
    ///             { "id": "roads-km", "type": "line", "source": "osm", "metadata": { "units": "metric" } },
    ///             { "id": "roads-mi", "type": "line", "source": "osm", "metadata": { "units": "imperial" } },
    ///             { "id": "trails", "type": "line", "source": "osm", "metadata": { "visibility": "beta" } }
    ///         ]
    ///     }"#,
    /// )?;
    /// backend.borrow_mut().load_style(style);
    /// map.pump();
    ///
    /// map.apply_units(Units::Imperial);
    /// assert!(!backend.borrow().has_layer("roads-km"));
    ///
    /// map.apply_units(Units::Metric);
    /// let ids: Vec<String> = backend.borrow().style_layers().into_iter().map(|l| l.id).collect();
    /// assert_eq!(ids, ["roads-km", "trails"]);
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn apply_units(&self, units: Units) {
        self.core.units.set(Some(units));
        self.core.sync_style();
    }

    /// The unit system last applied, if any.
    pub fn units(&self) -> Option<Units> {
        self.core.units.get()
    }

    /// Properties of the features rendered around `point`. `layers` defaults
    /// to the point-of-interest layers.
    pub fn query_rendered_features(&self, point: ScreenPoint, layers: Option<&[String]>) -> Vec<JsonValue> {
        let poi;
        let layers = match layers {
            Some(layers) => layers,
            None => {
                poi = self.core.controller.borrow().poi_layers();
                &poi
            }
        };
        self.core.backend.borrow().query_rendered_features(point, layers)
    }

    /// First live layer of z-index bucket `z`.
    pub fn z_index_anchor(&self, z: i64) -> Option<String> {
        self.core.z_index_anchor(z)
    }

    // Attribution

    /// Deduplicated attributions of the sources in use.
    ///
    /// Recomputed on every style load and every finished source load. An
    /// attribution contained in a longer one is dropped.
    pub fn attribution(&self) -> Vec<String> {
        self.core.attribution.borrow().current().to_vec()
    }

    /// Attributions joined by the configured separator.
    pub fn attribution_text(&self) -> String {
        self.core.attribution.borrow().formatted()
    }

    /// Publishes future attribution updates as host labels to `callback`.
    ///
    /// Labels are the second-level domain names of the links in each
    /// attribution, such as `openstreetmap`. Attributions without links
    /// contribute no label.
    pub fn on_attribution(&self, callback: impl Fn(&[String]) + 'static) {
        self.core
            .attribution
            .borrow_mut()
            .set_callback(Rc::new(callback));
    }

    /// Unbinds every listener, drops the layer groups and removes the
    /// backend map. Calling it again does nothing.
    ///
    /// Features still attached keep their own listener tables but no longer
    /// receive events.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let _span = tracing::debug_span!("destroy", entity = %self.entity.id()).entered();

        self.entity.off_all().remove();
        {
            let mut backend = self.core.backend.borrow_mut();
            for id in self.internal.drain(..) {
                backend.unsubscribe(id);
            }
            backend.remove();
        }
        self.core.controller.borrow_mut().invalidate();
        self.core.ready.set(false);
        self.destroyed = true;
    }

    /// Whether [`Map::destroy`] has run.
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("entity", &self.entity)
            .field("router", &self.router)
            .field("ready", &self.is_ready())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MapBackend, OverlayBackend, StyleBackend};
    use crate::style::document::StyleDocument;
    use serde_json::json;
    use std::cell::RefCell;

    fn document() -> StyleDocument {
        serde_json::from_value(json!({
            "version": 8,
            "sources": {
                "osm": { "type": "vector", "attribution": "© <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a>" }
            },
            "layers": [
                { "id": "water", "type": "fill", "source": "osm" },
                { "id": "beta-roads", "type": "line", "source": "osm", "metadata": { "visibility": "beta" } },
                { "id": "labels", "type": "symbol", "source": "osm", "metadata": { "zindex": 10 } }
            ]
        }))
        .unwrap()
    }

    fn style_map(options: MapOptions) -> (Rc<RefCell<StyleBackend>>, Map) {
        let backend = Rc::new(RefCell::new(StyleBackend::new()));
        let map = Map::new(backend.clone(), options, None).unwrap();
        (backend, map)
    }

    #[test]
    fn construction_subscribes_to_load_and_data_events() {
        let backends: [BackendHandle; 2] = [
            Rc::new(RefCell::new(StyleBackend::new())),
            Rc::new(RefCell::new(OverlayBackend::new())),
        ];
        for backend in backends {
            let map = Map::new(Rc::clone(&backend), MapOptions::default(), None).unwrap();
            let dialect = backend.borrow().dialect();
            let events: Vec<String> = backend
                .borrow()
                .subscriptions()
                .into_iter()
                .map(|s| s.event)
                .collect();
            assert_eq!(events, vec![dialect.style_load_event, dialect.data_event]);
            assert!(!map.is_ready());
        }
    }

    #[test]
    fn zoom_options_are_native_on_the_backend() {
        let options = MapOptions {
            zoom: Some(5.0),
            ..MapOptions::default()
        };
        let (backend, map) = style_map(options);
        assert!((backend.borrow().zoom() - 4.0).abs() < f64::EPSILON);
        assert!((map.zoom() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn set_zoom_round_trips() {
        let (_backend, map) = style_map(MapOptions::default());
        map.set_zoom(5.0);
        assert!((map.zoom() - 5.0).abs() < f64::EPSILON);
        map.zoom_in();
        assert!((map.zoom() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn inconsistent_options_are_rejected() {
        let backend: BackendHandle = Rc::new(RefCell::new(StyleBackend::new()));
        let options = MapOptions {
            min_zoom: Some(9.0),
            max_zoom: Some(3.0),
            ..MapOptions::default()
        };
        assert!(Map::new(backend, options, None).is_err());
    }

    #[test]
    fn style_load_applies_stored_flags_and_runs_on_ready() {
        let (backend, map) = style_map(MapOptions::default());
        let ready = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ready);
        map.on_ready(move || flag.set(true));

        backend.borrow_mut().load_style(document());
        map.pump();

        assert!(ready.get());
        assert!(map.is_ready());
        let roads = backend.borrow().layer("beta-roads").unwrap();
        assert!(!roads.is_visible());

        map.set_flag("beta", true);
        assert!(backend.borrow().layer("beta-roads").unwrap().is_visible());
        assert_eq!(map.visibility().get("beta"), Some(&true));
    }

    #[test]
    fn attribution_follows_source_loads() {
        let (backend, map) = style_map(MapOptions::default());
        let labels = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&labels);
        map.on_attribution(move |l: &[String]| sink.borrow_mut().extend_from_slice(l));

        backend.borrow_mut().load_style(document());
        map.pump();

        assert_eq!(map.attribution().len(), 1);
        assert!(labels.borrow().contains(&"openstreetmap".to_string()));
    }

    #[test]
    fn z_index_anchor_reaches_features() {
        let (backend, map) = style_map(MapOptions::default());
        backend.borrow_mut().load_style(document());
        map.pump();
        assert_eq!(map.z_index_anchor(10).as_deref(), Some("labels"));
        assert_eq!((map.attachment().anchors)(10).as_deref(), Some("labels"));
        assert_eq!(map.z_index_anchor(3), None);
    }

    #[test]
    fn destroy_drops_every_subscription() {
        let (backend, mut map) = style_map(MapOptions::default());
        map.on("click", |_: &MapEvent| {});
        assert_eq!(backend.borrow().subscriptions().len(), 3);

        map.destroy();
        map.destroy();
        assert!(backend.borrow().subscriptions().is_empty());
        assert!(backend.borrow().is_removed());
        assert!(map.is_destroyed());
    }

    #[test]
    fn overlay_zoom_has_no_offset() {
        let backend = Rc::new(RefCell::new(OverlayBackend::new()));
        let options = MapOptions {
            zoom: Some(5.0),
            ..MapOptions::default()
        };
        let map = Map::new(backend.clone(), options, None).unwrap();
        assert!((backend.borrow().zoom() - 5.0).abs() < f64::EPSILON);
        assert!((map.zoom() - 5.0).abs() < f64::EPSILON);
    }
}
