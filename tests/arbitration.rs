use mapweave::backend::StyleBackend;
use mapweave::domain::FeatureHit;
use mapweave::{LngLat, Map, MapEvent, MapOptions, Marker, Polygon, Scheduler, TickQueue};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn counter() -> (Rc<Cell<u32>>, impl Fn(&MapEvent) + 'static) {
    let count = Rc::new(Cell::new(0));
    let inner = Rc::clone(&count);
    (count, move |_: &MapEvent| inner.set(inner.get() + 1))
}

fn map_with_ticks() -> (Map, Rc<TickQueue>) {
    let backend = Rc::new(RefCell::new(StyleBackend::new()));
    let ticks = Rc::new(TickQueue::new());
    let scheduler: Rc<dyn Scheduler> = ticks.clone();
    let map = Map::new(backend, MapOptions::default(), Some(scheduler)).unwrap();
    (map, ticks)
}

fn hit(marker: &Marker) -> FeatureHit {
    FeatureHit::new(marker.key().layer_id.clone(), marker.key().feature_id.clone())
}

fn click_at(lng: f64, lat: f64) -> MapEvent {
    MapEvent::new("click").at(LngLat::new(lng, lat))
}

#[test]
fn feature_claim_suppresses_the_background_click() {
    let (mut map, ticks) = map_with_ticks();
    let (background, on_background) = counter();
    let (feature, on_feature) = counter();

    map.on("click", on_background);
    let mut marker = Marker::new(LngLat::new(10.0, 20.0));
    marker.on("click", on_feature);
    marker.add(&map);

    let event = map.dispatch(click_at(10.0, 20.0).with_feature(hit(&marker)));
    assert_eq!(feature.get(), 1);
    assert!(event.is_claimed());

    ticks.run_until_idle();
    assert_eq!(background.get(), 0);
}

#[test]
fn unclaimed_click_reaches_the_map_once_after_one_tick() {
    let (mut map, ticks) = map_with_ticks();
    let (background, on_background) = counter();
    map.on("click", on_background);

    let mut marker = Marker::new(LngLat::new(10.0, 20.0));
    marker.on("click", |_: &MapEvent| {});
    marker.add(&map);

    let event = map.dispatch(click_at(-3.0, 51.0));
    assert_eq!(background.get(), 0);
    assert_eq!(ticks.pending(), 1);

    assert_eq!(ticks.run_tick(), 1);
    assert_eq!(background.get(), 1);
    assert_eq!(event.ll(), Some(LngLat::new(-3.0, 51.0)));

    ticks.run_until_idle();
    assert_eq!(background.get(), 1);
}

#[test]
fn located_events_without_geometry_are_dropped() {
    let (mut map, ticks) = map_with_ticks();
    let (background, on_background) = counter();
    let (feature, on_feature) = counter();

    map.on("click", on_background);
    let mut polygon = Polygon::new(&[
        LngLat::new(0.0, 0.0),
        LngLat::new(1.0, 0.0),
        LngLat::new(1.0, 1.0),
    ]);
    polygon.on("click", on_feature);
    polygon.add(&map);

    let hit = FeatureHit::new(polygon.key().layer_id.clone(), polygon.key().feature_id.clone());
    map.dispatch(MapEvent::new("click").with_feature(hit));
    ticks.run_until_idle();

    assert_eq!(feature.get(), 0);
    assert_eq!(background.get(), 0);
}

#[test]
fn feature_pointer_events_claim_before_the_map() {
    let (mut map, ticks) = map_with_ticks();
    let (background, on_background) = counter();
    let (feature, on_feature) = counter();

    map.on("mousemove", on_background);
    let mut marker = Marker::new(LngLat::new(4.0, 4.0));
    marker.on("mousemove", on_feature);
    marker.add(&map);

    map.dispatch(
        MapEvent::new("mousemove")
            .at(LngLat::new(4.0, 4.0))
            .with_feature(hit(&marker)),
    );
    map.dispatch(MapEvent::new("mousemove").at(LngLat::new(8.0, 8.0)));
    ticks.run_until_idle();

    assert_eq!(feature.get(), 1);
    assert_eq!(background.get(), 1);
}

#[test]
fn direct_events_do_not_wait_for_a_tick() {
    let (mut map, ticks) = map_with_ticks();
    let (zooms, on_zoom) = counter();
    map.on("zoom_changed", on_zoom);

    map.set_zoom(6.0);
    map.pump();

    assert_eq!(zooms.get(), 1);
    assert_eq!(ticks.pending(), 0);
}

#[test]
fn background_click_runs_inline_without_a_scheduler() {
    let backend = Rc::new(RefCell::new(StyleBackend::new()));
    let mut map = Map::new(backend, MapOptions::default(), None).unwrap();
    let (background, on_background) = counter();
    map.on("click", on_background);

    map.dispatch(click_at(1.0, 1.0));
    assert_eq!(background.get(), 1);
}

#[test]
fn claim_after_the_deferred_check_is_not_observed() {
    let (mut map, ticks) = map_with_ticks();
    let (background, on_background) = counter();
    map.on("click", on_background);

    let event = map.dispatch(click_at(1.0, 1.0));
    ticks.run_tick();
    event.claim();
    ticks.run_until_idle();

    assert_eq!(background.get(), 1);
}

#[test]
fn marker_drags_stay_on_the_marker() {
    let (mut map, ticks) = map_with_ticks();
    let (map_drags, on_map_drag) = counter();
    let (marker_drags, on_marker_drag) = counter();
    let ends = Rc::new(RefCell::new(Vec::new()));

    map.on("dragend", on_map_drag);
    let mut marker = Marker::new(LngLat::new(0.0, 0.0));
    marker.on("drag", on_marker_drag);
    marker.on("dragend", {
        let ends = Rc::clone(&ends);
        move |e: &MapEvent| ends.borrow_mut().push(e.ll())
    });
    marker.add(&map);

    marker.drag_to(LngLat::new(5.0, 6.0));
    ticks.run_until_idle();

    assert_eq!(marker_drags.get(), 1);
    assert_eq!(*ends.borrow(), vec![Some(LngLat::new(5.0, 6.0))]);
    assert_eq!(map_drags.get(), 0);
    assert_eq!(marker.position(), LngLat::new(5.0, 6.0));
}
