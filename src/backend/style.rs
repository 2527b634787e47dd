//! Style-document backend.
//!
//! Models a vector-tile provider: the map is described by a [`StyleDocument`],
//! native zoom is 0-based, camera events are `moveend`/`zoomend`, and handlers
//! can be scoped to the rendered features of one style layer.

use super::camera::{Camera, CameraMove, MoveKind};
use super::stack::LayerStack;
use super::{
    next_id, BoundHandler, Dialect, FitOptions, MapBackend, Subscription, SubscriptionId,
    Transition,
};
use crate::domain::error::{MapError, Result};
use crate::domain::event::{DataPayload, MapEvent};
use crate::domain::geo::{Bounds, LngLat, ScreenPoint};
use crate::style::document::{SourceSpec, StyleDocument, StyleLayer};
use serde_json::Value as JsonValue;

/// Native names and zoom conventions of [`StyleBackend`].
pub static DIALECT: Dialect = Dialect {
    name: "style",
    aliases: &[
        ("bounds_changed", "moveend"),
        ("center_changed", "moveend"),
        ("zoom_changed", "zoomend"),
    ],
    zoom_offset: 1,
    style_load_event: "style.load",
    data_event: "sourcedata",
};

const TILE_SIZE: f64 = 512.0;
const MAX_ZOOM: f64 = 22.0;

struct Listener {
    id: SubscriptionId,
    event: String,
    layer: Option<String>,
    handler: BoundHandler,
}

/// Headless style-document map.
///
/// Starts with an empty style at native zoom 0. [`StyleBackend::load_style`]
/// stands in for the provider's network load; camera calls apply at once
/// and queue `zoomend`/`moveend` for [`pump`](super::pump). Subscriptions
/// scoped to a layer only see events whose hits include that layer.
pub struct StyleBackend {
    camera: Camera,
    stack: LayerStack,
    listeners: Vec<Listener>,
    last_id: u64,
    outbox: Vec<MapEvent>,
    style_loaded: bool,
    removed: bool,
    moves: Vec<CameraMove>,
}

impl Default for StyleBackend {
    fn default() -> Self {
        Self {
            camera: Camera::new(TILE_SIZE, 0.0, MAX_ZOOM),
            stack: LayerStack::default(),
            listeners: Vec::new(),
            last_id: 0,
            outbox: Vec::new(),
            style_loaded: false,
            removed: false,
            moves: Vec::new(),
        }
    }
}

impl StyleBackend {
    /// An empty map at native zoom 0 with no style loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the style and queues the style-load event followed by one
    /// loaded event per source.
    ///
    /// Every existing layer and source is dropped. Subscriptions stay.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::backend::{MapBackend, StyleBackend};
    /// use mapweave::style::StyleDocument;
    ///
    /// let mut backend = StyleBackend::new();
    /// let style = StyleDocument::from_json(
    ///     r#"{ "version": 8, "sources": { "osm": { "type": "vector" } }, "layers": [] }"#,
    /// )?;
    /// backend.load_style(style);
    ///
    /// let names: Vec<String> = backend.take_events().iter().map(|e| e.name().to_string()).collect();
    /// assert_eq!(names, ["style.load", "sourcedata"]);
    /// assert!(backend.is_style_loaded());
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn load_style(&mut self, document: StyleDocument) {
        let source_ids: Vec<String> = document.sources.keys().cloned().collect();
        self.stack = LayerStack::from_document(document);
        self.style_loaded = true;

        self.outbox
            .push(MapEvent::new(DIALECT.style_load_event).with_data(DataPayload::style()));
        for id in source_ids {
            self.mark_source_loaded(&id);
        }
        tracing::debug!(layers = self.stack.layers().len(), "style loaded");
    }

    /// Queues a loaded event for `source_id`.
    ///
    /// Stands in for the provider finishing a tile load, which is what
    /// triggers an attribution update.
    pub fn mark_source_loaded(&mut self, source_id: &str) {
        self.outbox.push(
            MapEvent::new(DIALECT.data_event).with_data(DataPayload::source(source_id, true)),
        );
    }

    /// Registers a feature rendered by `layer_id` for
    /// [`MapBackend::query_rendered_features`].
    pub fn render_feature(&mut self, layer_id: &str, point: ScreenPoint, properties: JsonValue) {
        self.stack.render_feature(layer_id, point, properties);
    }

    /// Camera changes applied so far, oldest first.
    pub fn moves(&self) -> &[CameraMove] {
        &self.moves
    }

    /// Sets the viewport size in pixels.
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.camera.resize(width, height);
    }

    /// Whether the map has been torn down.
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    fn record(&mut self, kind: MoveKind, animated: bool, zoomed: bool, moved: bool) {
        self.moves.push(CameraMove {
            kind,
            zoom: self.camera.zoom(),
            animated,
        });
        if zoomed {
            self.outbox.push(MapEvent::new("zoomend"));
        }
        if zoomed || moved {
            self.outbox.push(MapEvent::new("moveend"));
        }
    }

    fn transition(&mut self, kind: MoveKind, transition: Transition) {
        let moved = transition
            .center
            .is_some_and(|center| self.camera.set_center(center));
        let zoomed = transition
            .zoom
            .is_some_and(|zoom| self.camera.set_zoom(zoom));
        self.record(kind, true, zoomed, moved);
    }
}

impl MapBackend for StyleBackend {
    fn dialect(&self) -> &'static Dialect {
        &DIALECT
    }

    fn subscribe(
        &mut self,
        event: &str,
        layer: Option<&str>,
        handler: BoundHandler,
    ) -> SubscriptionId {
        let id = next_id(&mut self.last_id);
        self.listeners.push(Listener {
            id,
            event: event.to_string(),
            layer: layer.map(str::to_string),
            handler,
        });
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    fn handlers_for(&self, event: &MapEvent) -> Vec<BoundHandler> {
        if self.removed {
            return Vec::new();
        }
        self.listeners
            .iter()
            .filter(|l| l.event == event.name())
            .filter(|l| {
                l.layer
                    .as_deref()
                    .map_or(true, |layer| event.feature_in(layer).is_some())
            })
            .map(|l| l.handler.clone())
            .collect()
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        self.listeners
            .iter()
            .map(|l| Subscription {
                id: l.id,
                event: l.event.clone(),
                layer: l.layer.clone(),
            })
            .collect()
    }

    fn take_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn is_style_loaded(&self) -> bool {
        self.style_loaded && !self.removed
    }

    fn zoom(&self) -> f64 {
        self.camera.zoom()
    }

    fn set_zoom(&mut self, zoom: f64) {
        let zoomed = self.camera.set_zoom(zoom);
        self.record(MoveKind::Jump, false, zoomed, false);
    }

    fn zoom_to(&mut self, zoom: f64, animate: bool) {
        let zoomed = self.camera.set_zoom(zoom);
        self.record(MoveKind::Zoom, animate, zoomed, false);
    }

    fn set_zoom_range(&mut self, min: Option<f64>, max: Option<f64>) {
        self.camera.set_zoom_range(min, max);
    }

    fn center(&self) -> LngLat {
        self.camera.center()
    }

    fn set_center(&mut self, center: LngLat) {
        let moved = self.camera.set_center(center);
        self.record(MoveKind::Jump, false, false, moved);
    }

    fn bounds(&self) -> Bounds {
        self.camera.bounds()
    }

    fn fit_bounds(&mut self, bounds: Bounds, options: FitOptions) {
        let zoom = self.camera.zoom();
        self.camera.fit(bounds, options.padding);
        let zoomed = (self.camera.zoom() - zoom).abs() > f64::EPSILON;
        self.record(MoveKind::Fit, options.animate, zoomed, true);
    }

    fn pan_by(&mut self, dx: f64, dy: f64) {
        let moved = self.camera.pan_by(dx, dy);
        self.record(MoveKind::Pan, true, false, moved);
    }

    fn pan_to(&mut self, center: LngLat) {
        let moved = self.camera.set_center(center);
        self.record(MoveKind::Pan, true, false, moved);
    }

    fn fly_to(&mut self, transition: Transition) {
        self.transition(MoveKind::Fly, transition);
    }

    fn ease_to(&mut self, transition: Transition) {
        self.transition(MoveKind::Ease, transition);
    }

    fn resize(&mut self) {
        self.outbox.push(MapEvent::new("resize"));
    }

    fn style_layers(&self) -> Vec<StyleLayer> {
        self.stack.layers().to_vec()
    }

    fn layer(&self, id: &str) -> Option<StyleLayer> {
        self.stack.layer(id).cloned()
    }

    fn has_layer(&self, id: &str) -> bool {
        self.stack.layer(id).is_some()
    }

    fn add_layer(&mut self, layer: StyleLayer, before: Option<&str>) -> Result<()> {
        if let Some(source) = layer.source.as_deref() {
            if self.stack.source(source).is_none() {
                return Err(MapError::Backend(format!(
                    "layer {} reads unknown source {source}",
                    layer.id
                )));
            }
        }
        self.stack.add(layer, before)
    }

    fn remove_layer(&mut self, id: &str) -> Result<StyleLayer> {
        self.stack.remove(id)
    }

    fn set_layer_visible(&mut self, id: &str, visible: bool) -> Result<()> {
        self.stack.set_visible(id, visible)
    }

    fn source(&self, id: &str) -> Option<SourceSpec> {
        self.stack.source(id).cloned()
    }

    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()> {
        self.stack.add_source(id, source)?;
        self.mark_source_loaded(id);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<SourceSpec> {
        if let Some(user) = self
            .stack
            .layers()
            .iter()
            .find(|l| l.source.as_deref() == Some(id))
        {
            return Err(MapError::Backend(format!(
                "source {id} is still used by layer {}",
                user.id
            )));
        }
        self.stack.remove_source(id)
    }

    fn source_attributions(&self) -> Vec<String> {
        self.stack.attributions()
    }

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[String]) -> Vec<JsonValue> {
        if !self.is_style_loaded() {
            return Vec::new();
        }
        self.stack.query(point, layers)
    }

    fn remove(&mut self) {
        self.listeners.clear();
        self.outbox.clear();
        self.style_loaded = false;
        self.removed = true;
        tracing::debug!(backend = DIALECT.name, "map removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::FeatureHit;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn layer_scoped_handlers_need_a_hit_in_their_layer() {
        let mut backend = StyleBackend::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        backend.subscribe("click", Some("parks"), Rc::new(move |_: &Rc<MapEvent>| counter.set(counter.get() + 1)));

        let miss = MapEvent::new("click").with_feature(FeatureHit::new("roads", "1"));
        let hit = MapEvent::new("click").with_feature(FeatureHit::new("parks", "7"));
        assert!(backend.handlers_for(&miss).is_empty());
        assert_eq!(backend.handlers_for(&hit).len(), 1);
    }

    #[test]
    fn camera_changes_queue_native_events() {
        let mut backend = StyleBackend::new();
        backend.set_zoom(4.0);
        let names: Vec<String> = backend
            .take_events()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["zoomend", "moveend"]);

        backend.set_zoom(4.0);
        assert!(backend.take_events().is_empty());
    }

    #[test]
    fn load_style_queues_style_then_sources() {
        let mut backend = StyleBackend::new();
        let json = r#"{"version":8,"sources":{"osm":{"type":"vector"}},"layers":[]}"#;
        backend.load_style(StyleDocument::from_json(json).unwrap());

        let events = backend.take_events();
        assert_eq!(events[0].name(), "style.load");
        assert!(events[1].is_source_loaded());
        assert!(backend.is_style_loaded());
    }

    #[test]
    fn sources_in_use_cannot_be_removed() {
        let mut backend = StyleBackend::new();
        backend.add_source("osm", SourceSpec::new("vector")).unwrap();
        backend
            .add_layer(StyleLayer::new("roads", "line").with_source("osm"), None)
            .unwrap();
        assert!(backend.remove_source("osm").is_err());
        backend.remove_layer("roads").unwrap();
        assert!(backend.remove_source("osm").is_ok());
    }
}
