//! Style document model.
//!
//! A style is a declarative description of sources and an ordered list of
//! layers. Layers may carry arbitrary `metadata`; the keys mapweave reads are:
//!
//! ```json
//! {
//!   "id": "hiking-trails",
//!   "type": "line",
//!   "source": "osm",
//!   "source-layer": "paths",
//!   "metadata": {
//!     "visibility": ["all", "hiking", "beta"],
//!     "units": "imperial",
//!     "zindex": 2
//!   }
//! }
//! ```
//!
//! Every field not modeled explicitly is preserved in `rest`, so removing and
//! re-adding a layer or source never loses content.

use crate::domain::error::{MapError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;

/// Layout property holding the displayed/hidden state of a layer.
pub const VISIBILITY_PROPERTY: &str = "visibility";

/// A single style layer definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleLayer {
    /// Unique layer id.
    pub id: String,

    /// Layer type, such as `fill`, `line` or `symbol`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Source the layer draws from. Background layers have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Layer of a vector source the style layer draws.
    #[serde(rename = "source-layer", default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,

    /// Implementer-defined metadata driving visibility, units and z-index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,

    /// Layout properties, including `visibility`.
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub layout: JsonMap<String, JsonValue>,

    /// Everything else (`paint`, `filter`, zoom ranges, ...).
    #[serde(flatten)]
    pub rest: JsonMap<String, JsonValue>,
}

impl StyleLayer {
    /// A visible layer of type `kind` with no source.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            source: None,
            source_layer: None,
            metadata: None,
            layout: JsonMap::new(),
            rest: JsonMap::new(),
        }
    }

    /// Sets the source the layer draws from.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the layer metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Looks up a metadata key.
    ///
    /// Returns `None` when the layer has no metadata object or the key is
    /// absent.
    pub fn meta(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    /// Whether the layer is displayed. Layers without a visibility layout
    /// property are visible.
    pub fn is_visible(&self) -> bool {
        self.layout
            .get(VISIBILITY_PROPERTY)
            .and_then(JsonValue::as_str)
            .map_or(true, |v| v != "none")
    }

    /// Sets the `visibility` layout property.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::style::StyleLayer;
    ///
    /// let mut layer = StyleLayer::new("roads", "line").with_source("osm");
    /// assert!(layer.is_visible());
    /// layer.set_visible(false);
    /// assert_eq!(layer.layout["visibility"], "none");
    /// assert!(!layer.is_visible());
    /// ```
    pub fn set_visible(&mut self, visible: bool) {
        let value = if visible { "visible" } else { "none" };
        self.layout
            .insert(VISIBILITY_PROPERTY.to_string(), JsonValue::from(value));
    }
}

/// A data source definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Source type, such as `vector`, `raster-dem` or `geojson`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Attribution HTML shown while the source is in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,

    /// Everything else (`url`, `tiles`, `data`, ...).
    #[serde(flatten)]
    pub rest: JsonMap<String, JsonValue>,
}

impl SourceSpec {
    /// A source of type `kind` with no data or attribution.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attribution: None,
            rest: JsonMap::new(),
        }
    }

    /// A GeoJSON source wrapping `data`.
    #[must_use]
    pub fn geojson(data: JsonValue) -> Self {
        let mut spec = Self::new("geojson");
        spec.rest.insert("data".to_string(), data);
        spec
    }

    /// Sets the attribution HTML.
    #[must_use]
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }
}

/// A complete style document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDocument {
    /// Style format version.
    pub version: u8,

    /// Sources by id.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSpec>,

    /// Layers, bottom to top.
    #[serde(default)]
    pub layers: Vec<StyleLayer>,
}

impl Default for StyleDocument {
    fn default() -> Self {
        Self {
            version: 8,
            sources: BTreeMap::new(),
            layers: Vec::new(),
        }
    }
}

impl StyleDocument {
    /// Parses a style document from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Style`] if the JSON does not describe a style, or a
    /// layer id appears twice.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::style::StyleDocument;
    ///
    /// let doc = StyleDocument::from_json(
    ///     r#"{ "version": 8, "layers": [{ "id": "bg", "type": "background" }] }"#,
    /// )?;
    /// assert_eq!(doc.layers[0].id, "bg");
    /// assert!(doc.sources.is_empty());
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: Self = serde_json::from_str(json)
            .map_err(|e| MapError::Style(format!("failed to parse style: {e}")))?;

        let mut seen = std::collections::BTreeSet::new();
        if let Some(dup) = doc.layers.iter().find(|l| !seen.insert(l.id.as_str())) {
            return Err(MapError::Style(format!("duplicate layer id: {}", dup.id)));
        }

        tracing::debug!(
            sources = doc.sources.len(),
            layers = doc.layers.len(),
            "parsed style document"
        );
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layer_round_trip_keeps_unmodeled_fields() {
        let raw = json!({
            "id": "water",
            "type": "fill",
            "source": "osm",
            "source-layer": "water",
            "paint": { "fill-color": "#a0c8f0" },
            "minzoom": 4
        });
        let layer: StyleLayer = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(layer.source_layer.as_deref(), Some("water"));
        assert_eq!(serde_json::to_value(&layer).unwrap(), raw);
    }

    #[test]
    fn visibility_defaults_to_visible() {
        let mut layer = StyleLayer::new("roads", "line");
        assert!(layer.is_visible());
        layer.set_visible(false);
        assert!(!layer.is_visible());
        assert_eq!(layer.layout["visibility"], "none");
    }

    #[test]
    fn duplicate_layer_ids_are_rejected() {
        let json = r#"{"version":8,"layers":[{"id":"a","type":"fill"},{"id":"a","type":"line"}]}"#;
        let err = StyleDocument::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate layer id: a"));
    }
}
