//! Ordered layer and source storage shared by the headless backends.

use crate::domain::error::{MapError, Result};
use crate::domain::geo::ScreenPoint;
use crate::style::document::{SourceSpec, StyleDocument, StyleLayer};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

/// Hit-test radius around a query point, in pixels.
const QUERY_RADIUS_PX: f64 = 10.0;

#[derive(Debug, Clone)]
struct RenderedFeature {
    point: ScreenPoint,
    properties: JsonValue,
}

/// Live layers (bottom to top) and the source cache.
///
/// Layer and source definitions are stored as given, so a removed layer
/// comes back unchanged. Rendered features registered for queries are kept
/// per layer id.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<StyleLayer>,
    sources: BTreeMap<String, SourceSpec>,
    rendered: BTreeMap<String, Vec<RenderedFeature>>,
}

impl LayerStack {
    /// Builds the stack from a style document, keeping its layer order.
    pub fn from_document(document: StyleDocument) -> Self {
        Self {
            layers: document.layers,
            sources: document.sources,
            rendered: BTreeMap::new(),
        }
    }

    /// Live layers, bottom to top.
    pub fn layers(&self) -> &[StyleLayer] {
        &self.layers
    }

    /// The live layer `id`.
    pub fn layer(&self, id: &str) -> Option<&StyleLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Inserts `layer` below `before`, or on top.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`] if the id is taken or `before` is not
    /// live.
    pub fn add(&mut self, layer: StyleLayer, before: Option<&str>) -> Result<()> {
        if self.position(&layer.id).is_some() {
            return Err(MapError::Backend(format!("layer already exists: {}", layer.id)));
        }
        let index = match before {
            Some(anchor) => self
                .position(anchor)
                .ok_or_else(|| MapError::Backend(format!("unknown anchor layer: {anchor}")))?,
            None => self.layers.len(),
        };
        self.layers.insert(index, layer);
        Ok(())
    }

    /// Removes the layer `id`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`] if no such layer is live.
    pub fn remove(&mut self, id: &str) -> Result<StyleLayer> {
        let index = self
            .position(id)
            .ok_or_else(|| MapError::Backend(format!("unknown layer: {id}")))?;
        Ok(self.layers.remove(index))
    }

    /// Shows or hides the layer `id`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Backend`] if no such layer is live.
    pub fn set_visible(&mut self, id: &str, visible: bool) -> Result<()> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| MapError::Backend(format!("unknown layer: {id}")))?;
        layer.set_visible(visible);
        Ok(())
    }

    /// The source `id`.
    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    /// # Errors
    ///
    /// Returns [`MapError::Backend`] if the id is taken.
    pub fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()> {
        if self.sources.contains_key(id) {
            return Err(MapError::Backend(format!("source already exists: {id}")));
        }
        self.sources.insert(id.to_string(), source);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`MapError::Backend`] if no such source exists.
    pub fn remove_source(&mut self, id: &str) -> Result<SourceSpec> {
        self.sources
            .remove(id)
            .ok_or_else(|| MapError::Backend(format!("unknown source: {id}")))
    }

    /// Attributions of the sources read by live layers, in source id order.
    pub fn attributions(&self) -> Vec<String> {
        let used: BTreeSet<&str> = self
            .layers
            .iter()
            .filter_map(|l| l.source.as_deref())
            .collect();
        used.into_iter()
            .filter_map(|id| self.sources.get(id))
            .filter_map(|s| s.attribution.clone())
            .collect()
    }

    /// Registers a feature drawn by `layer_id` at `point`, for hit testing.
    pub fn render_feature(&mut self, layer_id: &str, point: ScreenPoint, properties: JsonValue) {
        self.rendered
            .entry(layer_id.to_string())
            .or_default()
            .push(RenderedFeature { point, properties });
    }

    /// Properties of the features near `point`, top layer first.
    pub fn query(&self, point: ScreenPoint, layers: &[String]) -> Vec<JsonValue> {
        self.layers
            .iter()
            .rev()
            .filter(|l| layers.iter().any(|id| *id == l.id))
            .filter_map(|l| self.rendered.get(&l.id))
            .flatten()
            .filter(|f| f.point.distance(&point) <= QUERY_RADIUS_PX)
            .map(|f| f.properties.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack(ids: &[&str]) -> LayerStack {
        let mut stack = LayerStack::default();
        for id in ids {
            stack.add(StyleLayer::new(*id, "fill"), None).unwrap();
        }
        stack
    }

    fn ids(stack: &LayerStack) -> Vec<&str> {
        stack.layers().iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn add_before_anchor_and_reject_duplicates() {
        let mut stack = stack(&["a", "c"]);
        stack.add(StyleLayer::new("b", "line"), Some("c")).unwrap();
        assert_eq!(ids(&stack), vec!["a", "b", "c"]);
        assert!(stack.add(StyleLayer::new("a", "line"), None).is_err());
        assert!(stack.add(StyleLayer::new("d", "line"), Some("zz")).is_err());
    }

    #[test]
    fn attributions_only_cover_sources_in_use() {
        let mut stack = LayerStack::default();
        stack
            .add_source("used", SourceSpec::new("vector").with_attribution("© Used"))
            .unwrap();
        stack
            .add_source("idle", SourceSpec::new("vector").with_attribution("© Idle"))
            .unwrap();
        stack
            .add(StyleLayer::new("roads", "line").with_source("used"), None)
            .unwrap();
        assert_eq!(stack.attributions(), vec!["© Used".to_string()]);
    }

    #[test]
    fn query_filters_by_layer_and_radius() {
        let mut stack = stack(&["poi", "roads"]);
        stack.render_feature("poi", ScreenPoint::new(10.0, 10.0), json!({"name": "cafe"}));
        stack.render_feature("poi", ScreenPoint::new(200.0, 10.0), json!({"name": "far"}));
        stack.render_feature("roads", ScreenPoint::new(10.0, 10.0), json!({"name": "road"}));

        let hits = stack.query(ScreenPoint::new(12.0, 12.0), &["poi".to_string()]);
        assert_eq!(hits, vec![json!({"name": "cafe"})]);
    }
}
