//! Overlay backend.
//!
//! Models a raster/overlay provider: listeners are addressed by opaque tokens,
//! the canonical event names (`zoom_changed`, `center_changed`,
//! `bounds_changed`) are native, every camera change ends with `idle`, and
//! native zoom levels are integral and already 1-based.

use super::camera::{Camera, CameraMove, MoveKind};
use super::stack::LayerStack;
use super::{
    next_id, BoundHandler, Dialect, FitOptions, MapBackend, Subscription, SubscriptionId,
    Transition,
};
use crate::domain::error::Result;
use crate::domain::event::{DataPayload, MapEvent};
use crate::domain::geo::{Bounds, LngLat, ScreenPoint};
use crate::style::document::{SourceSpec, StyleDocument, StyleLayer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Native names and zoom conventions of [`OverlayBackend`].
pub static DIALECT: Dialect = Dialect {
    name: "overlay",
    aliases: &[],
    zoom_offset: 0,
    style_load_event: "tilesloaded",
    data_event: "data_changed",
};

const TILE_SIZE: f64 = 256.0;
const MIN_ZOOM: f64 = 1.0;
const MAX_ZOOM: f64 = 21.0;

struct TokenListener {
    event: String,
    layer: Option<String>,
    handler: BoundHandler,
}

/// Headless overlay map.
///
/// Starts at zoom 1 with no overlays. Zoom requests are rounded to whole
/// levels, every camera change queues the matching `*_changed` events
/// followed by `idle`, and [`OverlayBackend::load_overlays`] queues
/// `tilesloaded`.
pub struct OverlayBackend {
    camera: Camera,
    overlays: LayerStack,
    tokens: BTreeMap<SubscriptionId, TokenListener>,
    last_token: u64,
    queued: Vec<MapEvent>,
    tiles_loaded: bool,
    detached: bool,
    moves: Vec<CameraMove>,
}

impl Default for OverlayBackend {
    fn default() -> Self {
        let mut camera = Camera::new(TILE_SIZE, MIN_ZOOM, MAX_ZOOM);
        camera.set_zoom(MIN_ZOOM);
        Self {
            camera,
            overlays: LayerStack::default(),
            tokens: BTreeMap::new(),
            last_token: 0,
            queued: Vec::new(),
            tiles_loaded: false,
            detached: false,
            moves: Vec::new(),
        }
    }
}

impl OverlayBackend {
    /// An overlay map at zoom 1 with nothing loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the overlay layers and sources of `document` and queues
    /// `tilesloaded`, followed by one `data_changed` per source.
    ///
    /// Every existing overlay is dropped. Listener tokens stay valid.
    pub fn load_overlays(&mut self, document: StyleDocument) {
        let source_ids: Vec<String> = document.sources.keys().cloned().collect();
        self.overlays = LayerStack::from_document(document);
        self.tiles_loaded = true;
        self.queued
            .push(MapEvent::new(DIALECT.style_load_event).with_data(DataPayload::style()));
        for id in source_ids {
            self.queued.push(
                MapEvent::new(DIALECT.data_event).with_data(DataPayload::source(id, true)),
            );
        }
    }

    /// Registers a feature rendered by `layer_id` for
    /// [`MapBackend::query_rendered_features`].
    pub fn render_feature(&mut self, layer_id: &str, point: ScreenPoint, properties: JsonValue) {
        self.overlays.render_feature(layer_id, point, properties);
    }

    /// Camera changes applied so far, oldest first.
    pub fn moves(&self) -> &[CameraMove] {
        &self.moves
    }

    /// Whether the map has been torn down.
    pub const fn is_detached(&self) -> bool {
        self.detached
    }

    fn changed(&mut self, kind: MoveKind, animated: bool, zoomed: bool, moved: bool) {
        self.moves.push(CameraMove {
            kind,
            zoom: self.camera.zoom(),
            animated,
        });
        if !(zoomed || moved) {
            return;
        }
        if zoomed {
            self.queued.push(MapEvent::new("zoom_changed"));
        }
        if moved {
            self.queued.push(MapEvent::new("center_changed"));
        }
        self.queued.push(MapEvent::new("bounds_changed"));
        self.queued.push(MapEvent::new("idle"));
    }

    fn set_integral_zoom(&mut self, zoom: f64) -> bool {
        self.camera.set_zoom(zoom.round())
    }
}

impl MapBackend for OverlayBackend {
    fn dialect(&self) -> &'static Dialect {
        &DIALECT
    }

    fn subscribe(
        &mut self,
        event: &str,
        layer: Option<&str>,
        handler: BoundHandler,
    ) -> SubscriptionId {
        let token = next_id(&mut self.last_token);
        self.tokens.insert(
            token,
            TokenListener {
                event: event.to_string(),
                layer: layer.map(str::to_string),
                handler,
            },
        );
        token
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.tokens.remove(&id).is_some()
    }

    fn handlers_for(&self, event: &MapEvent) -> Vec<BoundHandler> {
        if self.detached {
            return Vec::new();
        }
        self.tokens
            .values()
            .filter(|l| l.event == event.name())
            .filter(|l| match l.layer.as_deref() {
                Some(layer) => event.feature_in(layer).is_some(),
                None => true,
            })
            .map(|l| l.handler.clone())
            .collect()
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        self.tokens
            .iter()
            .map(|(token, l)| Subscription {
                id: *token,
                event: l.event.clone(),
                layer: l.layer.clone(),
            })
            .collect()
    }

    fn take_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.queued)
    }

    fn is_style_loaded(&self) -> bool {
        self.tiles_loaded && !self.detached
    }

    fn zoom(&self) -> f64 {
        self.camera.zoom()
    }

    fn set_zoom(&mut self, zoom: f64) {
        let zoomed = self.set_integral_zoom(zoom);
        self.changed(MoveKind::Jump, false, zoomed, false);
    }

    fn zoom_to(&mut self, zoom: f64, animate: bool) {
        let zoomed = self.set_integral_zoom(zoom);
        self.changed(MoveKind::Zoom, animate, zoomed, false);
    }

    fn set_zoom_range(&mut self, min: Option<f64>, max: Option<f64>) {
        self.camera.set_zoom_range(min, max);
    }

    fn center(&self) -> LngLat {
        self.camera.center()
    }

    fn set_center(&mut self, center: LngLat) {
        let moved = self.camera.set_center(center);
        self.changed(MoveKind::Jump, false, false, moved);
    }

    fn bounds(&self) -> Bounds {
        self.camera.bounds()
    }

    fn fit_bounds(&mut self, bounds: Bounds, options: FitOptions) {
        let zoom = self.camera.zoom();
        self.camera.fit(bounds, options.padding);
        self.camera.set_zoom(self.camera.zoom().floor());
        let zoomed = (self.camera.zoom() - zoom).abs() > f64::EPSILON;
        self.changed(MoveKind::Fit, options.animate, zoomed, true);
    }

    fn pan_by(&mut self, dx: f64, dy: f64) {
        let moved = self.camera.pan_by(dx, dy);
        self.changed(MoveKind::Pan, true, false, moved);
    }

    fn pan_to(&mut self, center: LngLat) {
        let moved = self.camera.set_center(center);
        self.changed(MoveKind::Pan, true, false, moved);
    }

    fn fly_to(&mut self, transition: Transition) {
        let moved = transition.center.is_some_and(|c| self.camera.set_center(c));
        let zoomed = transition.zoom.is_some_and(|z| self.set_integral_zoom(z));
        self.changed(MoveKind::Fly, true, zoomed, moved);
    }

    fn ease_to(&mut self, transition: Transition) {
        let moved = transition.center.is_some_and(|c| self.camera.set_center(c));
        let zoomed = transition.zoom.is_some_and(|z| self.set_integral_zoom(z));
        self.changed(MoveKind::Ease, true, zoomed, moved);
    }

    fn resize(&mut self) {
        self.queued.push(MapEvent::new("resize"));
    }

    fn style_layers(&self) -> Vec<StyleLayer> {
        self.overlays.layers().to_vec()
    }

    fn layer(&self, id: &str) -> Option<StyleLayer> {
        self.overlays.layer(id).cloned()
    }

    fn add_layer(&mut self, layer: StyleLayer, before: Option<&str>) -> Result<()> {
        self.overlays.add(layer, before)
    }

    fn remove_layer(&mut self, id: &str) -> Result<StyleLayer> {
        self.overlays.remove(id)
    }

    fn set_layer_visible(&mut self, id: &str, visible: bool) -> Result<()> {
        self.overlays.set_visible(id, visible)
    }

    fn source(&self, id: &str) -> Option<SourceSpec> {
        self.overlays.source(id).cloned()
    }

    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()> {
        self.overlays.add_source(id, source)?;
        self.queued
            .push(MapEvent::new(DIALECT.data_event).with_data(DataPayload::source(id, true)));
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<SourceSpec> {
        self.overlays.remove_source(id)
    }

    fn source_attributions(&self) -> Vec<String> {
        self.overlays.attributions()
    }

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[String]) -> Vec<JsonValue> {
        self.overlays.query(point, layers)
    }

    fn remove(&mut self) {
        self.tokens.clear();
        self.queued.clear();
        self.tiles_loaded = false;
        self.detached = true;
        tracing::debug!(backend = DIALECT.name, "map removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn tokens_unsubscribe_once() {
        let mut backend = OverlayBackend::new();
        let token = backend.subscribe("click", None, Rc::new(|_: &Rc<MapEvent>| {}));
        assert!(backend.unsubscribe(token));
        assert!(!backend.unsubscribe(token));
    }

    #[test]
    fn zoom_is_integral() {
        let mut backend = OverlayBackend::new();
        backend.set_zoom(4.6);
        assert!((backend.zoom() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn camera_changes_end_with_idle() {
        let mut backend = OverlayBackend::new();
        backend.set_center(LngLat::new(10.0, 10.0));
        let names: Vec<String> = backend
            .take_events()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["center_changed", "bounds_changed", "idle"]);
    }
}
