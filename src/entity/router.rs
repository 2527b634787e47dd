//! Shared routing of layer events to feature entities.
//!
//! Backends scope subscriptions to a style layer, not to a single feature.
//! The router holds one backend subscription per `(event, layer)` pair and
//! fans each event out to the targets registered for the feature that was
//! hit. The backend subscription is dropped with its last target.

use crate::backend::{BackendHandle, BoundHandler, SubscriptionId};
use crate::domain::event::MapEvent;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Identifies one routed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteId(u64);

/// The feature an entity stands for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureKey {
    /// Style layer that draws the feature.
    pub layer_id: String,
    /// Feature id within the layer.
    pub feature_id: String,
}

impl FeatureKey {
    /// Key of feature `feature_id` in layer `layer_id`.
    pub fn new(layer_id: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            feature_id: feature_id.into(),
        }
    }
}

struct Target {
    id: RouteId,
    feature_id: String,
    handler: BoundHandler,
}

struct Route {
    subscription: SubscriptionId,
    targets: Vec<Target>,
}

#[derive(Default)]
struct RouterState {
    /// Keyed by `(native event, layer id)`.
    routes: BTreeMap<(String, String), Route>,
    /// Route keys in subscription order.
    order: Vec<(String, String)>,
    last_id: u64,
}

/// Per-map feature event router. Clones share state.
///
/// Targets of one `(event, layer)` pair share a single backend subscription.
/// Its dispatcher reads the hit of the layer from the event and calls the
/// targets registered for that feature, in registration order. Events
/// without a hit in the layer are ignored.
#[derive(Clone)]
pub struct FeatureRouter {
    backend: BackendHandle,
    state: Rc<RefCell<RouterState>>,
}

impl FeatureRouter {
    /// A router with no routes on `backend`.
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            backend,
            state: Rc::new(RefCell::new(RouterState::default())),
        }
    }

    /// Routes the native `event` on `key`'s feature to `handler`.
    ///
    /// Subscribes on the backend the first time the `(event, layer)` pair is
    /// routed. Returns the id to pass to [`FeatureRouter::remove`].
    pub fn add(&self, event: &str, key: &FeatureKey, handler: BoundHandler) -> RouteId {
        let route_key = (event.to_string(), key.layer_id.clone());
        let needs_subscription = !self.state.borrow().routes.contains_key(&route_key);

        if needs_subscription {
            let dispatcher = Self::dispatcher(Rc::downgrade(&self.state), route_key.clone());
            let subscription =
                self.backend
                    .borrow_mut()
                    .subscribe(event, Some(key.layer_id.as_str()), dispatcher);
            let mut state = self.state.borrow_mut();
            state.order.push(route_key.clone());
            state.routes.insert(
                route_key.clone(),
                Route {
                    subscription,
                    targets: Vec::new(),
                },
            );
            tracing::trace!(event, layer_id = %key.layer_id, "route subscribed");
        }

        let mut state = self.state.borrow_mut();
        state.last_id += 1;
        let id = RouteId(state.last_id);
        if let Some(route) = state.routes.get_mut(&route_key) {
            route.targets.push(Target {
                id,
                feature_id: key.feature_id.clone(),
                handler,
            });
        }
        id
    }

    /// Removes a target. Returns `false` if it was not routed.
    ///
    /// The backend subscription of the pair is dropped with its last target.
    pub fn remove(&self, id: RouteId) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(route_key) = state
            .routes
            .iter()
            .find(|(_, route)| route.targets.iter().any(|t| t.id == id))
            .map(|(key, _)| key.clone())
        else {
            return false;
        };

        let emptied = state.routes.get_mut(&route_key).map_or(false, |route| {
            route.targets.retain(|t| t.id != id);
            route.targets.is_empty()
        });
        if !emptied {
            return true;
        }

        let route = state.routes.remove(&route_key);
        state.order.retain(|key| *key != route_key);
        drop(state);
        if let Some(route) = route {
            self.backend.borrow_mut().unsubscribe(route.subscription);
            tracing::trace!(event = %route_key.0, layer_id = %route_key.1, "route unsubscribed");
        }
        true
    }

    /// `(event, layer, feature)` of every routed target, in subscription
    /// order.
    ///
    /// Targets of one `(event, layer)` pair are listed together, in the
    /// order they were added.
    pub fn routes(&self) -> Vec<(String, String, String)> {
        let state = self.state.borrow();
        state
            .order
            .iter()
            .filter_map(|key| state.routes.get(key).map(|route| (key, route)))
            .flat_map(|((event, layer), route)| {
                route
                    .targets
                    .iter()
                    .map(move |t| (event.clone(), layer.clone(), t.feature_id.clone()))
            })
            .collect()
    }

    fn dispatcher(state: Weak<RefCell<RouterState>>, route_key: (String, String)) -> BoundHandler {
        Rc::new(move |event: &Rc<MapEvent>| {
            let Some(state) = state.upgrade() else {
                return;
            };
            let Some(hit) = event.feature_in(&route_key.1) else {
                return;
            };
            let handlers: Vec<BoundHandler> = state
                .borrow()
                .routes
                .get(&route_key)
                .map(|route| {
                    route
                        .targets
                        .iter()
                        .filter(|t| t.feature_id == hit.feature_id)
                        .map(|t| t.handler.clone())
                        .collect()
                })
                .unwrap_or_default();
            for handler in handlers {
                handler(event);
            }
        })
    }
}

impl std::fmt::Debug for FeatureRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRouter")
            .field("routes", &self.state.borrow().order)
            .finish_non_exhaustive()
    }
}
