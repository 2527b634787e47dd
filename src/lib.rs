//! Mapweave: provider-agnostic event arbitration and style synchronization
//! for map-rendering backends.
//!
//! Mapweave sits between application code and a pluggable map backend and
//! provides:
//! - One listener model (`on`/`off`/`fire`/`add`/`remove`) for the map,
//!   markers and shapes, with listeners that survive detach and re-attach
//! - Feature-versus-background arbitration of clicks and pointer events
//! - Declarative layer visibility (flag predicates) and metric/imperial
//!   layer sets driven by style metadata
//! - 1-based zoom levels on every backend, with integral animated zoom
//! - Deduplicated source attribution with host labels

#![allow(clippy::multiple_crate_versions)]

//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Map entity (map.rs)                                │  ← Entry point
//! │  - Options, camera, style state, attribution        │
//! └─────────────────────────────────────────────────────┘
//!         │                    │                    │
//! ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//! │ Entity Layer  │   │ Style Layer   │   │ Zoom          │
//! │ (entity/)     │   │ (style/)      │   │ (zoom.rs)     │
//! │ - Listeners   │   │ - Predicates  │   │ - User/native │
//! │ - Arbitration │   │ - Layer groups│   │ - Transitions │
//! │ - Routing     │   │ - Attribution │   │               │
//! │ - Features    │   │ - Documents   │   │               │
//! └───────────────┘   └───────────────┘   └───────────────┘
//!         │                    │                    │
//! ┌─────────────────────────────────────────────────────┐
//! │  Backend Layer (backend/)                           │  ← Trait seam
//! │  - MapBackend trait + Dialect                       │
//! │  - StyleBackend, OverlayBackend (headless)          │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain & Scheduler                                 │
//! │  - Errors, geo types, MapEvent (domain/)            │
//! │  - One-tick deferred tasks (scheduler.rs)           │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Observability (observability/)                     │  ← Optional
//! │  - OpenTelemetry tracing                            │
//! │  - File-based span export                           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`backend`]: Backend trait, dialects and the two headless backends
//! - [`config`]: Map options loaded from code or TOML
//! - [`domain`]: Errors, geographic types and the shared event object
//! - [`entity`]: Entities, listener tables, arbitration and features
//! - [`map`]: The map entity
//! - [`scheduler`]: Deferred one-tick tasks
//! - [`style`]: Style documents, visibility, units and attribution
//! - [`zoom`]: User and native zoom conversion
//! - [`observability`]: Tracing setup
//!
//! # Event Flow
//!
//! 1. **Registration**: `on(event, handler)` records the listener and, while
//!    attached, installs a bound handler on the backend (whole-map) or on the
//!    map's feature router (feature-scoped).
//!
//! 2. **Dispatch**: the backend delivers a physical event to every matching
//!    bound handler. Feature handlers claim located clicks; whole-map handlers
//!    for located events defer their check by one scheduler tick.
//!
//! 3. **Resolution**: on the next tick the deferred check calls the map
//!    handler only if nothing claimed the event.
//!
//! # Examples
//!
//! ```rust
//! use mapweave::{LngLat, Map, MapEvent, MapOptions, Marker, Scheduler, TickQueue};
//! use mapweave::backend::StyleBackend;
//! use mapweave::domain::FeatureHit;
//! use std::cell::{Cell, RefCell};
//! use std::rc::Rc;
//!
//! let backend = Rc::new(RefCell::new(StyleBackend::new()));
//! let ticks = Rc::new(TickQueue::new());
//! let scheduler: Rc<dyn Scheduler> = ticks.clone();
//! let mut map = Map::new(backend, MapOptions::default(), Some(scheduler))?;
//!
//! let background = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&background);
//! map.on("click", move |_: &MapEvent| counter.set(counter.get() + 1));
//!
//! let mut marker = Marker::new(LngLat::new(2.35, 48.85));
//! marker.on("click", |_: &MapEvent| {});
//! marker.add(&map);
//!
//! let hit = FeatureHit::new(marker.key().layer_id.clone(), marker.key().feature_id.clone());
//! map.dispatch(MapEvent::new("click").at(LngLat::new(2.35, 48.85)).with_feature(hit));
//! ticks.run_tick();
//! assert_eq!(background.get(), 0);
//! # Ok::<(), mapweave::MapError>(())
//! ```
//!
//! # Key Design Decisions
//!
//! ## Two-Phase Events
//!
//! A [`MapEvent`] is shared by every handler of one physical event and carries
//! a mutable claimed flag. Deferred checks hold the event alive past the
//! dispatch, so no timer or backend ordering guarantee is needed.
//!
//! ## Persistent Listener Tables
//!
//! Listener tables belong to the entity, not to the backend. Detaching only
//! uninstalls the bound handlers; re-attaching replays the table in
//! registration order.
//!
//! ## Silent Degradation
//!
//! Stale layers, unmatched removals, repeated attaches and located events
//! without geometry are no-ops. Backend errors in style synchronization are
//! logged and dropped.

pub mod backend;
pub mod config;
pub mod domain;
pub mod entity;
pub mod map;
pub mod observability;
pub mod scheduler;
pub mod style;
pub mod zoom;

pub use config::MapOptions;
pub use domain::{Bounds, FeatureHit, LngLat, MapError, MapEvent, Result, ScreenPoint};
pub use entity::{Entity, Handler, Marker, Polygon, Polyline};
pub use map::Map;
pub use scheduler::{Scheduler, TickQueue};
pub use style::visibility::{Flags, Units};
