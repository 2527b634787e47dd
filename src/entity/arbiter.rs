//! Feature-versus-background event arbitration.
//!
//! Every listener is wrapped in a [`BoundHandler`] chosen by the class of its
//! event:
//!
//! | Class              | Behavior                                                        |
//! |--------------------|-----------------------------------------------------------------|
//! | `Direct`           | stop propagation, call                                          |
//! | `Located`          | tag a normalized location or drop the event; map handlers wait one tick |
//! | `ArbitratedClick`  | claim, stop propagation, tag location or drop, call             |
//!
//! A whole-map handler for a located event defers its final check through the
//! map's [`Scheduler`]. Feature handlers for the same physical event run
//! during the dispatch itself, so by the time the deferred task runs they
//! have had the chance to claim the event and the map handler is skipped.
//!
//! A claim made after the deferred task has run is not observed: the map
//! handler has already fired. Feature handlers must claim synchronously.

use crate::backend::BoundHandler;
use crate::domain::event::MapEvent;
use crate::domain::geo::LngLat;
use crate::entity::listener::Handler;
use crate::scheduler::Scheduler;
use std::cell::RefCell;
use std::rc::Rc;

/// The scheduler of the map an entity is attached to, shared with its bound
/// handlers so they see attachment changes.
pub(crate) type SchedulerSlot = Rc<RefCell<Option<Rc<dyn Scheduler>>>>;

const DRAG_EVENTS: &[&str] = &["drag", "dragstart", "dragend"];

const POINTER_EVENTS: &[&str] = &[
    "click",
    "dblclick",
    "contextmenu",
    "mousedown",
    "mouseup",
    "mousemove",
    "mouseenter",
    "mouseleave",
    "mouseover",
    "mouseout",
    "touchstart",
    "touchend",
];

/// Handling strategy of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Camera, data and drag events: called as soon as they arrive.
    Direct,
    /// Pointer events that need a location to be meaningful.
    Located,
    /// Clicks on a feature, which claim the event for the feature.
    ArbitratedClick,
}

/// Whether `event` is a drag-class event. Drag events are map-global and
/// never routed per feature.
pub fn is_drag(event: &str) -> bool {
    DRAG_EVENTS.contains(&event)
}

/// Classifies `event` for a feature (`on_feature`) or whole-map listener.
pub fn classify(event: &str, on_feature: bool) -> EventClass {
    if is_drag(event) {
        EventClass::Direct
    } else if on_feature && event == "click" {
        EventClass::ArbitratedClick
    } else if POINTER_EVENTS.contains(&event) {
        EventClass::Located
    } else {
        EventClass::Direct
    }
}

/// Tags `event` with its normalized location. Returns `false` if the event
/// carries no usable geometry.
pub fn locate(event: &MapEvent) -> bool {
    match event.lng_lat().and_then(LngLat::normalized) {
        Some(ll) => {
            event.set_ll(ll);
            true
        }
        None => false,
    }
}

/// Wraps `handler` in the strategy of its event class.
pub(crate) fn bind(
    event: &str,
    on_feature: bool,
    handler: Handler,
    scheduler: SchedulerSlot,
) -> BoundHandler {
    match classify(event, on_feature) {
        EventClass::Direct => Rc::new(move |e: &Rc<MapEvent>| {
            e.stop_propagation();
            handler.call(e);
        }),
        EventClass::ArbitratedClick => Rc::new(move |e: &Rc<MapEvent>| {
            e.claim();
            e.stop_propagation();
            if !locate(e) {
                tracing::trace!(event = %e.name(), "dropped feature click without geometry");
                return;
            }
            handler.call(e);
        }),
        EventClass::Located if on_feature => Rc::new(move |e: &Rc<MapEvent>| {
            if !locate(e) {
                tracing::trace!(event = %e.name(), "dropped feature event without geometry");
                return;
            }
            e.claim();
            e.stop_propagation();
            handler.call(e);
        }),
        EventClass::Located => Rc::new(move |e: &Rc<MapEvent>| {
            if !locate(e) {
                tracing::trace!(event = %e.name(), "dropped map event without geometry");
                return;
            }
            if e.is_claimed() {
                return;
            }
            let pending = Rc::clone(e);
            let handler = handler.clone();
            let task = Box::new(move || resolve_background(&pending, &handler));
            let scheduler = scheduler.borrow().clone();
            match scheduler {
                Some(scheduler) => scheduler.defer(task),
                None => task(),
            }
        }),
    }
}

fn resolve_background(event: &MapEvent, handler: &Handler) {
    if event.is_claimed() {
        tracing::trace!(event = %event.name(), "background handler suppressed by feature claim");
        return;
    }
    event.stop_propagation();
    handler.call(event);
}
