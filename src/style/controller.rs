//! Layer groups and their synchronization with the live backend style.
//!
//! # Metadata Keys
//!
//! | Key          | Group        | Value                                        |
//! |--------------|--------------|----------------------------------------------|
//! | `visibility` | visibility   | flag name, `["all", ...]` or `["any", ...]`  |
//! | `units`      | units        | `"metric"` or `"imperial"`                   |
//! | `zindex`     | z-index      | integer bucket                               |
//! | `poi`        | poi          | `true`; `source-layer: "poi"` also qualifies |
//!
//! A layer may belong to several groups. Metadata that fails to parse is
//! logged and the layer is left out of that group only.
//!
//! # Failure Handling
//!
//! Every synchronization step is best effort: a layer that is missing or
//! refused by the backend is logged at debug level and skipped, and the
//! remaining layers are still processed.

use crate::backend::MapBackend;
use crate::domain::error::Result;
use crate::style::document::StyleLayer;
use crate::style::visibility::{Flags, Units, VisibilityPredicate};
use std::collections::BTreeMap;

const VISIBILITY_KEY: &str = "visibility";
const UNITS_KEY: &str = "units";
const ZINDEX_KEY: &str = "zindex";
const POI_KEY: &str = "poi";
const POI_SOURCE_LAYER: &str = "poi";

/// Style layers partitioned by their metadata, built from the first loaded
/// style.
#[derive(Debug, Clone, Default)]
pub struct LayerGroups {
    /// Flag-gated layers with their predicates.
    pub visibility: Vec<(String, VisibilityPredicate)>,
    /// Unit-tagged layers with their original definitions.
    pub units: Vec<(Units, StyleLayer)>,
    /// Layer ids per z-index bucket, bottom to top.
    pub z_index: BTreeMap<i64, Vec<String>>,
    /// Point-of-interest layers, the default query filter.
    pub poi: Vec<String>,
    /// Layer ids in original draw order.
    pub order: Vec<String>,
}

impl LayerGroups {
    /// Classifies `layers` (bottom to top). Layers with malformed metadata
    /// are left out of the affected group.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::style::{LayerGroups, StyleLayer, Units};
    /// use serde_json::json;
    ///
    /// let layers = [
    ///     StyleLayer::new("roads-km", "line").with_metadata(json!({ "units": "metric", "zindex": 2 })),
    ///     StyleLayer::new("cafes", "symbol").with_metadata(json!({ "poi": true })),
    ///     StyleLayer::new("broken", "line").with_metadata(json!({ "units": "furlongs" })),
    /// ];
    /// let groups = LayerGroups::classify(&layers);
    ///
    /// assert_eq!(groups.units.len(), 1);
    /// assert_eq!(groups.units[0].0, Units::Metric);
    /// assert_eq!(groups.z_index[&2], vec!["roads-km".to_string()]);
    /// assert_eq!(groups.poi, vec!["cafes".to_string()]);
    /// assert_eq!(groups.order.len(), 3);
    /// ```
    pub fn classify(layers: &[StyleLayer]) -> Self {
        let mut groups = Self::default();
        for layer in layers {
            groups.order.push(layer.id.clone());

            if let Some(raw) = layer.meta(VISIBILITY_KEY) {
                match VisibilityPredicate::from_metadata(raw) {
                    Ok(predicate) => groups.visibility.push((layer.id.clone(), predicate)),
                    Err(e) => tracing::warn!(layer_id = %layer.id, error = %e, "ignoring visibility metadata"),
                }
            }

            if let Some(raw) = layer.meta(UNITS_KEY) {
                match serde_json::from_value::<Units>(raw.clone()) {
                    Ok(units) => groups.units.push((units, layer.clone())),
                    Err(e) => tracing::warn!(layer_id = %layer.id, error = %e, "ignoring units metadata"),
                }
            }

            if let Some(z) = layer.meta(ZINDEX_KEY).and_then(serde_json::Value::as_i64) {
                groups.z_index.entry(z).or_default().push(layer.id.clone());
            }

            let poi_flag = layer
                .meta(POI_KEY)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if poi_flag || layer.source_layer.as_deref() == Some(POI_SOURCE_LAYER) {
                groups.poi.push(layer.id.clone());
            }
        }
        groups
    }
}

/// Applies declarative visibility and unit state to a backend.
///
/// Groups are built once, the first time the style loads, and dropped by
/// [`StyleController::invalidate`]. Until then every operation is a no-op.
#[derive(Debug, Default)]
pub struct StyleController {
    groups: Option<LayerGroups>,
}

impl StyleController {
    /// A controller with no groups built.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the groups from `layers`. Returns `false` if they were already
    /// built.
    ///
    /// Later style loads do not rebuild the groups, so unit layers removed
    /// from the live style can still be restored from their first
    /// definition.
    pub fn init(&mut self, layers: &[StyleLayer]) -> bool {
        if self.groups.is_some() {
            return false;
        }
        let groups = LayerGroups::classify(layers);
        tracing::debug!(
            visibility = groups.visibility.len(),
            units = groups.units.len(),
            z_buckets = groups.z_index.len(),
            poi = groups.poi.len(),
            "layer groups built"
        );
        self.groups = Some(groups);
        true
    }

    /// Whether the groups have been built since the last invalidation.
    pub const fn is_initialized(&self) -> bool {
        self.groups.is_some()
    }

    /// The layer groups, once built.
    pub const fn groups(&self) -> Option<&LayerGroups> {
        self.groups.as_ref()
    }

    /// Drops the groups. The next style load rebuilds them.
    pub fn invalidate(&mut self) {
        self.groups = None;
    }

    /// Shows or hides every flag-gated layer. Absent layers are skipped.
    ///
    /// Layers without a visibility predicate are never touched.
    pub fn apply_visibility(&self, backend: &mut dyn MapBackend, flags: &Flags) {
        let Some(groups) = &self.groups else {
            return;
        };
        let _span = tracing::debug_span!("apply_visibility", flags = flags.len()).entered();

        for (layer_id, predicate) in &groups.visibility {
            if !backend.has_layer(layer_id) {
                tracing::trace!(layer_id = %layer_id, "skipping absent layer");
                continue;
            }
            let visible = predicate.evaluate(flags);
            if let Err(e) = backend.set_layer_visible(layer_id, visible) {
                tracing::debug!(layer_id = %layer_id, error = %e, "visibility not applied");
            }
        }
    }

    /// Leaves exactly the `units` layers of the unit group in the style.
    ///
    /// # Parameters
    ///
    /// * `backend` - The live map to mutate
    /// * `units` - The system to keep
    ///
    /// Removed layers of the other system are dropped; missing layers of the
    /// requested system are re-added from their original definition below
    /// the next live layer in original draw order.
    pub fn apply_units(&self, backend: &mut dyn MapBackend, units: Units) {
        let Some(groups) = &self.groups else {
            return;
        };
        let _span = tracing::debug_span!("apply_units", units = %units).entered();

        for (_, layer) in groups.units.iter().filter(|(u, _)| *u != units) {
            if backend.has_layer(&layer.id) {
                if let Err(e) = backend.remove_layer(&layer.id) {
                    tracing::debug!(layer_id = %layer.id, error = %e, "unit layer not removed");
                }
            }
        }

        for (_, layer) in groups.units.iter().filter(|(u, _)| *u == units) {
            if backend.has_layer(&layer.id) {
                continue;
            }
            let before = next_live_layer(&groups.order, &layer.id, backend);
            if let Err(e) = backend.add_layer(layer.clone(), before.as_deref()) {
                tracing::debug!(layer_id = %layer.id, error = %e, "unit layer not restored");
            }
        }
    }

    /// Point-of-interest layers, for rendered-feature queries.
    pub fn poi_layers(&self) -> Vec<String> {
        self.groups
            .as_ref()
            .map(|g| g.poi.clone())
            .unwrap_or_default()
    }

    /// First live layer of z-index bucket `z`.
    ///
    /// Features inserted below it draw under every layer of the bucket.
    /// Returns `None` before the groups are built or when no layer of the
    /// bucket is live.
    pub fn z_index_anchor(&self, z: i64, backend: &dyn MapBackend) -> Option<String> {
        self.groups
            .as_ref()?
            .z_index
            .get(&z)?
            .iter()
            .find(|id| backend.has_layer(id))
            .cloned()
    }
}

fn next_live_layer(order: &[String], layer_id: &str, backend: &dyn MapBackend) -> Option<String> {
    let index = order.iter().position(|id| id == layer_id)?;
    order[index + 1..]
        .iter()
        .find(|id| backend.has_layer(id))
        .cloned()
}

/// Swaps the definition of `source_id` without disturbing draw order.
///
/// Every live layer reading the source is removed together with the id of
/// the layer above it, the source is replaced, and the layers are re-added
/// top-down below their recorded neighbours.
///
/// # Errors
///
/// Propagates the first backend failure; layers removed before the failure
/// are not restored.
pub fn refresh_source(
    backend: &mut dyn MapBackend,
    source_id: &str,
    replacement: crate::style::document::SourceSpec,
) -> Result<()> {
    let _span = tracing::debug_span!("refresh_source", source = %source_id).entered();

    let layers = backend.style_layers();
    let captured: Vec<(StyleLayer, Option<String>)> = layers
        .iter()
        .enumerate()
        .filter(|(_, layer)| layer.source.as_deref() == Some(source_id))
        .map(|(i, layer)| (layer.clone(), layers.get(i + 1).map(|next| next.id.clone())))
        .collect();

    for (layer, _) in &captured {
        backend.remove_layer(&layer.id)?;
    }
    if backend.source(source_id).is_some() {
        backend.remove_source(source_id)?;
    }
    backend.add_source(source_id, replacement)?;
    for (layer, before) in captured.into_iter().rev() {
        backend.add_layer(layer, before.as_deref())?;
    }
    tracing::debug!("source refreshed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StyleBackend;
    use crate::style::document::{SourceSpec, StyleDocument};
    use serde_json::json;

    fn backend_with(layers: serde_json::Value) -> StyleBackend {
        let doc: StyleDocument = serde_json::from_value(json!({
            "version": 8,
            "sources": { "osm": { "type": "vector" }, "dem": { "type": "raster-dem" } },
            "layers": layers,
        }))
        .unwrap();
        let mut backend = StyleBackend::new();
        backend.load_style(doc);
        backend
    }

    fn ids(backend: &StyleBackend) -> Vec<String> {
        backend.style_layers().into_iter().map(|l| l.id).collect()
    }

    #[test]
    fn classify_reads_every_axis() {
        let groups = LayerGroups::classify(&[
            StyleLayer::new("a", "fill").with_metadata(json!({"visibility": "beta", "zindex": 2})),
            StyleLayer::new("b", "line").with_metadata(json!({"units": "imperial", "poi": true})),
            StyleLayer::new("c", "line").with_metadata(json!({"units": "furlongs"})),
        ]);
        assert_eq!(groups.visibility.len(), 1);
        assert_eq!(groups.units.len(), 1);
        assert_eq!(groups.z_index[&2], vec!["a".to_string()]);
        assert_eq!(groups.poi, vec!["b".to_string()]);
        assert_eq!(groups.order, vec!["a", "b", "c"]);
    }

    #[test]
    fn operations_before_init_are_no_ops() {
        let mut backend = backend_with(json!([
            {"id": "m", "type": "line", "metadata": {"units": "metric"}}
        ]));
        StyleController::new().apply_units(&mut backend, Units::Imperial);
        assert_eq!(ids(&backend), vec!["m"]);
    }

    #[test]
    fn units_restore_original_order() {
        let mut backend = backend_with(json!([
            {"id": "base", "type": "fill"},
            {"id": "m1", "type": "line", "metadata": {"units": "metric"}},
            {"id": "i1", "type": "line", "metadata": {"units": "imperial"}},
            {"id": "m2", "type": "line", "metadata": {"units": "metric"}},
            {"id": "labels", "type": "symbol"}
        ]));
        let mut controller = StyleController::new();
        controller.init(&backend.style_layers());

        controller.apply_units(&mut backend, Units::Imperial);
        assert_eq!(ids(&backend), vec!["base", "i1", "labels"]);

        controller.apply_units(&mut backend, Units::Metric);
        controller.apply_units(&mut backend, Units::Metric);
        assert_eq!(ids(&backend), vec!["base", "m1", "m2", "labels"]);
    }

    #[test]
    fn refresh_keeps_unrelated_layers_in_place() {
        let mut backend = backend_with(json!([
            {"id": "hillshade", "type": "hillshade", "source": "dem"},
            {"id": "water", "type": "fill", "source": "osm"},
            {"id": "roads", "type": "line", "source": "osm"},
            {"id": "contours", "type": "line", "source": "dem"},
            {"id": "labels", "type": "symbol", "source": "osm"}
        ]));
        let before = ids(&backend);
        refresh_source(
            &mut backend,
            "osm",
            SourceSpec::new("vector").with_attribution("© OSM"),
        )
        .unwrap();

        assert_eq!(ids(&backend), before);
        assert_eq!(
            backend.source("osm").and_then(|s| s.attribution),
            Some("© OSM".to_string())
        );
    }
}
