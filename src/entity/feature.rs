//! Marker and shape entities.
//!
//! Each feature draws itself through a GeoJSON source and one style layer,
//! both named after the feature. The layer is added when the feature is
//! attached, inserted below the first layer of its z-index bucket, and
//! removed again when it is detached.

use crate::domain::event::MapEvent;
use crate::domain::geo::LngLat;
use crate::entity::{Attachment, Entity, FeatureKey, Handler, Hook, Scope};
use crate::map::Map;
use crate::style::document::{SourceSpec, StyleLayer};
use serde_json::{json, Value as JsonValue};
use std::cell::{Cell, RefCell};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FEATURE: AtomicU64 = AtomicU64::new(1);

/// A map object drawn from its own source and layer.
///
/// `Feature` carries the behavior shared by [`Marker`], [`Polyline`] and
/// [`Polygon`], which dereference to it. Listeners are feature-scoped: they
/// receive only the events whose hit names this feature's key, and a click
/// they receive is claimed so the map background does not see it.
///
/// # Examples
///
/// ```
/// use mapweave::backend::StyleBackend;
/// use mapweave::{FeatureHit, LngLat, Map, MapEvent, MapOptions, Marker};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let backend = Rc::new(RefCell::new(StyleBackend::new()));
/// let map = Map::new(backend, MapOptions::default(), None)?;
///
/// let mut marker = Marker::new(LngLat::new(13.4, 52.5));
/// marker.on("click", |_: &MapEvent| {}).add(&map);
///
/// let hit = FeatureHit::new(marker.key().layer_id.clone(), marker.key().feature_id.clone());
/// let event = map.dispatch(MapEvent::new("click").at(LngLat::new(13.4, 52.5)).with_feature(hit));
/// assert!(event.is_claimed());
/// # Ok::<(), mapweave::MapError>(())
/// ```
pub struct Feature {
    entity: Entity,
    key: FeatureKey,
    geometry: Rc<RefCell<JsonValue>>,
    z_index: Rc<Cell<i64>>,
}

impl Feature {
    fn build(kind: &str, layer_type: &'static str, geometry: JsonValue) -> Self {
        let id = format!("{kind}-{}", NEXT_FEATURE.fetch_add(1, Ordering::Relaxed));
        let key = FeatureKey::new(format!("mapweave-{id}"), id);
        let geometry = Rc::new(RefCell::new(geometry));
        let z_index = Rc::new(Cell::new(0));

        let on_add = Self::add_hook(&key, layer_type, Rc::clone(&geometry), Rc::clone(&z_index));
        let on_remove = Self::remove_hook(&key);
        let entity = Entity::new(Scope::Feature(key.clone())).with_hooks(Some(on_add), Some(on_remove));

        Self {
            entity,
            key,
            geometry,
            z_index,
        }
    }

    fn add_hook(
        key: &FeatureKey,
        layer_type: &'static str,
        geometry: Rc<RefCell<JsonValue>>,
        z_index: Rc<Cell<i64>>,
    ) -> Hook {
        let key = key.clone();
        Box::new(move |attachment: &Attachment| {
            let anchor = (attachment.anchors)(z_index.get());
            let data = json!({
                "type": "Feature",
                "id": key.feature_id,
                "properties": { "id": key.feature_id },
                "geometry": geometry.borrow().clone(),
            });
            let layer = StyleLayer::new(key.layer_id.clone(), layer_type).with_source(key.layer_id.clone());

            let mut backend = attachment.backend.borrow_mut();
            let added = backend
                .add_source(&key.layer_id, SourceSpec::geojson(data))
                .and_then(|()| backend.add_layer(layer, anchor.as_deref()));
            if let Err(e) = added {
                tracing::warn!(layer_id = %key.layer_id, error = %e, "failed to draw feature");
            }
        })
    }

    fn remove_hook(key: &FeatureKey) -> Hook {
        let layer_id = key.layer_id.clone();
        Box::new(move |attachment: &Attachment| {
            let mut backend = attachment.backend.borrow_mut();
            let removed = backend
                .remove_layer(&layer_id)
                .and_then(|_| backend.remove_source(&layer_id));
            if let Err(e) = removed {
                tracing::debug!(layer_id = %layer_id, error = %e, "feature already gone");
            }
        })
    }

    /// The `(layer, feature)` pair backend hits report for this feature.
    pub const fn key(&self) -> &FeatureKey {
        &self.key
    }

    /// The underlying entity and its listener table.
    pub const fn entity(&self) -> &Entity {
        &self.entity
    }

    /// GeoJSON geometry drawn on the next attach.
    pub fn geometry(&self) -> JsonValue {
        self.geometry.borrow().clone()
    }

    /// Bucket whose first layer this feature is drawn below. Takes effect on
    /// the next attach.
    ///
    /// Without a live layer in the bucket the feature is drawn on top.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::{MapBackend, StyleBackend};
    /// use mapweave::style::StyleDocument;
    /// use mapweave::{LngLat, Map, MapOptions, Marker};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let backend = Rc::new(RefCell::new(StyleBackend::new()));
    /// let map = Map::new(backend.clone(), MapOptions::default(), None)?;
    /// let style = StyleDocument::from_json(
    ///     r#"{ "version": 8, "layers": [
    ///         { "id": "water", "type": "fill" },
    ///         { "id": "labels", "type": "symbol", "metadata": { "zindex": 5 } }
    ///     ] }"#,
    /// )?;
    /// backend.borrow_mut().load_style(style);
    /// map.pump();
    ///
    /// let mut marker = Marker::new(LngLat::new(0.0, 0.0));
    /// marker.set_z_index(5).add(&map);
    ///
    /// let ids: Vec<String> = backend.borrow().style_layers().into_iter().map(|l| l.id).collect();
    /// assert_eq!(ids[1], marker.key().layer_id);
    /// assert_eq!(ids[2], "labels");
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn set_z_index(&mut self, z_index: i64) -> &mut Self {
        self.z_index.set(z_index);
        self
    }

    /// Registers a feature-scoped `handler` for `event`. See [`Entity::on`].
    pub fn on(&mut self, event: &str, handler: impl Into<Handler>) -> &mut Self {
        self.entity.on(event, handler);
        self
    }

    /// Removes the oldest registration of `handler` for `event`. See
    /// [`Entity::off`].
    pub fn off(&mut self, event: &str, handler: &Handler) -> &mut Self {
        self.entity.off(event, handler);
        self
    }

    /// Removes every listener registered for `event`.
    pub fn off_event(&mut self, event: &str) -> &mut Self {
        self.entity.off_event(event);
        self
    }

    /// Removes every listener.
    pub fn off_all(&mut self) -> &mut Self {
        self.entity.off_all();
        self
    }

    /// Calls this feature's handlers for `event` directly.
    pub fn fire(&self, event: &str, e: &MapEvent) {
        self.entity.fire(event, e);
    }

    /// Draws the feature on `map` and installs its listeners.
    ///
    /// Adding a feature that is already attached does nothing. Drawing
    /// failures are logged and the listeners are still installed.
    pub fn add(&mut self, map: &Map) -> &mut Self {
        self.entity.add(map.attachment());
        self
    }

    /// Uninstalls the listeners, then removes the feature's layer and source.
    pub fn remove(&mut self) -> &mut Self {
        self.entity.remove();
        self
    }

    /// Whether the feature is drawn on a map.
    pub const fn is_attached(&self) -> bool {
        self.entity.is_attached()
    }
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature")
            .field("key", &self.key)
            .field("z_index", &self.z_index.get())
            .field("entity", &self.entity)
            .finish()
    }
}

fn coordinates(path: &[LngLat]) -> Vec<[f64; 2]> {
    path.iter().map(|p| [p.lng, p.lat]).collect()
}

/// A point marker.
///
/// Drawn as a `symbol` layer over a single-point GeoJSON source. Markers are
/// the only features that can be dragged; see [`Marker::drag_to`].
#[derive(Debug)]
pub struct Marker {
    feature: Feature,
    position: LngLat,
}

impl Marker {
    /// Creates a detached marker at `position`.
    pub fn new(position: LngLat) -> Self {
        let geometry = json!({ "type": "Point", "coordinates": [position.lng, position.lat] });
        Self {
            feature: Feature::build("marker", "symbol", geometry),
            position,
        }
    }

    /// Current marker position.
    pub const fn position(&self) -> LngLat {
        self.position
    }

    /// Moves the marker as a user drag would, firing `dragstart`, `drag` and
    /// `dragend` on the marker's own listeners. The new position is drawn on
    /// the next attach.
    ///
    /// Drag events never reach the map's listeners.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::{LngLat, MapEvent, Marker};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let ends = Rc::new(RefCell::new(Vec::new()));
    /// let sink = Rc::clone(&ends);
    ///
    /// let mut marker = Marker::new(LngLat::new(0.0, 0.0));
    /// marker.on("dragend", move |e: &MapEvent| sink.borrow_mut().push(e.ll()));
    /// marker.drag_to(LngLat::new(5.0, 6.0));
    ///
    /// assert_eq!(*ends.borrow(), vec![Some(LngLat::new(5.0, 6.0))]);
    /// assert_eq!(marker.position(), LngLat::new(5.0, 6.0));
    /// ```
    pub fn drag_to(&mut self, position: LngLat) {
        self.feature.fire("dragstart", &MapEvent::new("dragstart").at(self.position));
        self.position = position;
        *self.feature.geometry.borrow_mut() =
            json!({ "type": "Point", "coordinates": [position.lng, position.lat] });
        self.feature.fire("drag", &MapEvent::new("drag").at(position));
        self.feature.fire("dragend", &MapEvent::new("dragend").at(position));
    }
}

/// An open line through `path`.
///
/// Drawn as a `line` layer over a `LineString` GeoJSON source.
#[derive(Debug)]
pub struct Polyline {
    feature: Feature,
}

impl Polyline {
    /// Creates a detached polyline.
    pub fn new(path: &[LngLat]) -> Self {
        let geometry = json!({ "type": "LineString", "coordinates": coordinates(path) });
        Self {
            feature: Feature::build("polyline", "line", geometry),
        }
    }
}

/// A filled area bounded by `ring`. The ring is closed if needed.
///
/// Drawn as a `fill` layer over a `Polygon` GeoJSON source.
///
/// # Examples
///
/// ```
/// use mapweave::{LngLat, Polygon};
///
/// let polygon = Polygon::new(&[
///     LngLat::new(0.0, 0.0),
///     LngLat::new(1.0, 0.0),
///     LngLat::new(1.0, 1.0),
/// ]);
/// let ring = &polygon.geometry()["coordinates"][0];
/// assert_eq!(ring[0], ring[3]);
/// ```
#[derive(Debug)]
pub struct Polygon {
    feature: Feature,
}

impl Polygon {
    /// Creates a detached polygon.
    pub fn new(ring: &[LngLat]) -> Self {
        let mut ring = coordinates(ring);
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }
        let geometry = json!({ "type": "Polygon", "coordinates": [ring] });
        Self {
            feature: Feature::build("polygon", "fill", geometry),
        }
    }
}

macro_rules! deref_feature {
    ($($ty:ty),*) => {$(
        impl Deref for $ty {
            type Target = Feature;

            fn deref(&self) -> &Feature {
                &self.feature
            }
        }

        impl DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut Feature {
                &mut self.feature
            }
        }
    )*};
}

deref_feature!(Marker, Polyline, Polygon);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_rings_are_closed() {
        let polygon = Polygon::new(&[
            LngLat::new(0.0, 0.0),
            LngLat::new(1.0, 0.0),
            LngLat::new(1.0, 1.0),
        ]);
        let ring = &polygon.geometry()["coordinates"][0];
        assert_eq!(ring.as_array().map(Vec::len), Some(4));
        assert_eq!(ring[0], ring[3]);
    }

    #[test]
    fn marker_drag_fires_locally_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut marker = Marker::new(LngLat::new(0.0, 0.0));
        for name in ["dragstart", "drag", "dragend"] {
            let log = Rc::clone(&log);
            marker.on(name, move |e: &MapEvent| log.borrow_mut().push((e.name().to_string(), e.ll())));
        }
        marker.drag_to(LngLat::new(5.0, 5.0));

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].1, Some(LngLat::new(0.0, 0.0)));
        assert_eq!(log[2], ("dragend".to_string(), Some(LngLat::new(5.0, 5.0))));
        assert_eq!(marker.position(), LngLat::new(5.0, 5.0));
    }

    #[test]
    fn keys_are_unique() {
        let a = Marker::new(LngLat::new(0.0, 0.0));
        let b = Marker::new(LngLat::new(0.0, 0.0));
        assert_ne!(a.key(), b.key());
        assert!(a.key().layer_id.starts_with("mapweave-marker-"));
    }
}
