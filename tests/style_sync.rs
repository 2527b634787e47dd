use mapweave::backend::{MapBackend, StyleBackend};
use mapweave::domain::DataPayload;
use mapweave::style::{SourceSpec, StyleDocument};
use mapweave::{Flags, LngLat, Map, MapEvent, MapOptions, Marker, ScreenPoint, Units};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

const OSM: &str = "© <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";
const DEM: &str = "© <a href='https://www.mapzen.com/terrain'>Mapzen</a>";

fn document() -> StyleDocument {
    StyleDocument::from_json(
        &json!({
            "version": 8,
            "sources": {
                "osm": { "type": "vector", "attribution": OSM },
                "dem": { "type": "raster-dem", "attribution": DEM }
            },
            "layers": [
                { "id": "water", "type": "fill", "source": "osm" },
                { "id": "hillshade", "type": "hillshade", "source": "dem" },
                { "id": "roads-metric", "type": "line", "source": "osm", "metadata": { "units": "metric" } },
                { "id": "roads-imperial", "type": "line", "source": "osm", "metadata": { "units": "imperial" } },
                { "id": "contours", "type": "line", "source": "dem" },
                { "id": "scale-metric", "type": "symbol", "source": "osm", "metadata": { "units": "metric" } },
                { "id": "scale-imperial", "type": "symbol", "source": "osm", "metadata": { "units": "imperial" } },
                { "id": "trails-all", "type": "line", "source": "osm", "metadata": { "visibility": ["all", "beta", "gamma"] } },
                { "id": "trails-any", "type": "line", "source": "osm", "metadata": { "visibility": ["any", "beta", "gamma"] } },
                { "id": "pois", "type": "symbol", "source": "osm", "source-layer": "poi" },
                { "id": "labels", "type": "symbol", "source": "osm", "metadata": { "zindex": 5 } }
            ]
        })
        .to_string(),
    )
    .unwrap()
}

fn loaded_map(options: MapOptions) -> (Rc<RefCell<StyleBackend>>, Map) {
    let backend = Rc::new(RefCell::new(StyleBackend::new()));
    let map = Map::new(backend.clone(), options, None).unwrap();
    backend.borrow_mut().load_style(document());
    map.pump();
    (backend, map)
}

fn ids(backend: &Rc<RefCell<StyleBackend>>) -> Vec<String> {
    backend.borrow().style_layers().into_iter().map(|l| l.id).collect()
}

fn visible(backend: &Rc<RefCell<StyleBackend>>, id: &str) -> bool {
    backend.borrow().layer(id).is_some_and(|l| l.is_visible())
}

#[test]
fn all_of_and_any_of_predicates() {
    let (backend, map) = loaded_map(MapOptions::default());

    map.set_visibility(Flags::from([("beta".to_string(), true)]));
    assert!(!visible(&backend, "trails-all"));
    assert!(visible(&backend, "trails-any"));

    map.set_flag("gamma", true);
    assert!(visible(&backend, "trails-all"));
    assert!(visible(&backend, "trails-any"));

    map.apply_visibility(&Flags::new());
    assert!(!visible(&backend, "trails-all"));
    assert!(!visible(&backend, "trails-any"));
    assert_eq!(map.visibility().len(), 2);
}

#[test]
fn stored_flags_apply_on_style_load() {
    let options = MapOptions {
        visibility: Flags::from([("gamma".to_string(), true)]),
        ..MapOptions::default()
    };
    let (backend, _map) = loaded_map(options);
    assert!(!visible(&backend, "trails-all"));
    assert!(visible(&backend, "trails-any"));
}

#[test]
fn unit_toggling_keeps_only_the_requested_system() {
    let (backend, map) = loaded_map(MapOptions::default());
    assert_eq!(ids(&backend).len(), 11);

    for units in [Units::Imperial, Units::Metric, Units::Metric, Units::Imperial, Units::Metric] {
        map.apply_units(units);
    }

    assert_eq!(
        ids(&backend),
        vec![
            "water",
            "hillshade",
            "roads-metric",
            "contours",
            "scale-metric",
            "trails-all",
            "trails-any",
            "pois",
            "labels",
        ]
    );
    assert_eq!(map.units(), Some(Units::Metric));
}

#[test]
fn configured_units_apply_on_style_load() {
    let options = MapOptions {
        units: Some(Units::Imperial),
        ..MapOptions::default()
    };
    let (backend, _map) = loaded_map(options);
    let ids = ids(&backend);
    assert!(ids.contains(&"roads-imperial".to_string()));
    assert!(!ids.contains(&"roads-metric".to_string()));
    assert!(!ids.contains(&"scale-metric".to_string()));
}

#[test]
fn restored_unit_layers_get_current_visibility() {
    let (backend, map) = loaded_map(MapOptions::default());
    map.apply_units(Units::Imperial);
    map.set_flag("beta", true);
    map.apply_units(Units::Metric);
    assert!(visible(&backend, "trails-any"));
    assert!(visible(&backend, "roads-metric"));
}

#[test]
fn refresh_keeps_the_draw_order() {
    let (backend, map) = loaded_map(MapOptions::default());
    let before = ids(&backend);

    let replacement = SourceSpec::new("raster-dem").with_attribution("© Terrain Co");
    map.refresh(Some(("dem", replacement))).unwrap();

    assert_eq!(ids(&backend), before);
    assert_eq!(
        backend.borrow().source("dem").and_then(|s| s.attribution),
        Some("© Terrain Co".to_string())
    );
}

#[test]
fn refresh_without_source_resizes() {
    let (backend, map) = loaded_map(MapOptions::default());
    map.refresh(None).unwrap();
    let queued: Vec<String> = backend
        .borrow_mut()
        .take_events()
        .iter()
        .map(|e| e.name().to_string())
        .collect();
    assert_eq!(queued, vec!["resize"]);
}

#[test]
fn attribution_labels_reach_the_event_and_the_callback() {
    let (_backend, map) = loaded_map(MapOptions::default());
    let published = Rc::new(RefCell::new(Vec::new()));
    map.on_attribution({
        let published = Rc::clone(&published);
        move |labels: &[String]| *published.borrow_mut() = labels.to_vec()
    });

    let event = map.dispatch(MapEvent::new("sourcedata").with_data(DataPayload::source("osm", true)));

    let labels = event.attribution().unwrap();
    assert!(labels.contains(&"openstreetmap".to_string()));
    assert!(labels.contains(&"mapzen".to_string()));
    assert_eq!(*published.borrow(), labels);
    assert_eq!(map.attribution().len(), 2);
    assert!(map.attribution_text().contains(" | "));
}

#[test]
fn unfinished_source_loads_are_ignored() {
    let (_backend, map) = loaded_map(MapOptions::default());
    let event = map.dispatch(MapEvent::new("sourcedata").with_data(DataPayload::source("osm", false)));
    assert_eq!(event.attribution(), None);
}

#[test]
fn contained_attributions_are_deduplicated() {
    let backend = Rc::new(RefCell::new(StyleBackend::new()));
    let map = Map::new(backend.clone(), MapOptions::default(), None).unwrap();
    let doc = StyleDocument::from_json(
        &json!({
            "version": 8,
            "sources": {
                "a": { "type": "vector", "attribution": "© A" },
                "b": { "type": "vector", "attribution": "Data from A and B" },
                "c": { "type": "vector", "attribution": "© C" }
            },
            "layers": [
                { "id": "one", "type": "fill", "source": "a" },
                { "id": "two", "type": "fill", "source": "b" }
            ]
        })
        .to_string(),
    )
    .unwrap();
    backend.borrow_mut().load_style(doc);
    map.pump();
    assert_eq!(map.attribution(), vec!["Data from A and B".to_string()]);

    backend
        .borrow_mut()
        .add_layer(
            mapweave::style::StyleLayer::new("three", "fill").with_source("c"),
            None,
        )
        .unwrap();
    backend.borrow_mut().mark_source_loaded("c");
    map.pump();
    assert_eq!(
        map.attribution(),
        vec!["© C".to_string(), "Data from A and B".to_string()]
    );
}

#[test]
fn poi_layers_are_the_default_query_filter() {
    let (backend, map) = loaded_map(MapOptions::default());
    backend
        .borrow_mut()
        .render_feature("pois", ScreenPoint::new(100.0, 100.0), json!({ "name": "cafe" }));
    backend
        .borrow_mut()
        .render_feature("water", ScreenPoint::new(100.0, 100.0), json!({ "name": "lake" }));

    let found = map.query_rendered_features(ScreenPoint::new(104.0, 100.0), None);
    assert_eq!(found, vec![json!({ "name": "cafe" })]);

    let water = ["water".to_string()];
    let found = map.query_rendered_features(ScreenPoint::new(104.0, 100.0), Some(&water));
    assert_eq!(found, vec![json!({ "name": "lake" })]);
}

#[test]
fn features_are_drawn_below_their_z_index_anchor() {
    let (backend, map) = loaded_map(MapOptions::default());
    let mut marker = Marker::new(LngLat::new(0.0, 0.0));
    marker.set_z_index(5);
    marker.add(&map);

    let ids = ids(&backend);
    let marker_at = ids.iter().position(|id| *id == marker.key().layer_id).unwrap();
    assert_eq!(ids[marker_at + 1], "labels");

    marker.remove();
    assert!(!backend.borrow().has_layer(&marker.key().layer_id));
    assert!(backend.borrow().source(&marker.key().layer_id).is_none());
}
