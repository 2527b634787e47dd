//! Wrapped entities: the map itself, markers and shapes.
//!
//! An [`Entity`] owns its listener table for its whole life. While attached
//! to a map it also holds the map's [`Attachment`] and every listener is
//! installed on the backend: whole-map listeners directly, feature listeners
//! through the map's [`FeatureRouter`]. Detaching uninstalls them; attaching
//! again replays the table in registration order.
//!
//! # Modules
//!
//! - [`arbiter`]: Event classification and feature-versus-background arbitration
//! - [`router`]: Shared `(event, layer, feature)` routing
//! - [`feature`]: Marker, polyline and polygon factories
//! - [`listener`]: Handler identity and listener records

pub mod arbiter;
pub mod feature;
pub mod listener;
pub mod router;

pub use feature::{Marker, Polygon, Polyline};
pub use listener::Handler;
pub use router::{FeatureKey, FeatureRouter, RouteId};

use crate::backend::BackendHandle;
use crate::domain::event::MapEvent;
use crate::scheduler::Scheduler;
use arbiter::SchedulerSlot;
use listener::{Binding, Listener};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Resolves the insertion anchor of a z-index bucket.
pub type AnchorResolver = Rc<dyn Fn(i64) -> Option<String>>;

/// Hook run when an entity is attached to or detached from a map.
pub type Hook = Box<dyn FnMut(&Attachment)>;

/// Identity of an entity, unique per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

/// What an entity stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The whole map background.
    Map,
    /// One rendered feature.
    Feature(FeatureKey),
}

/// Everything an entity needs from the map it is attached to.
///
/// Built by [`Map::attachment`](crate::Map::attachment). Cloning shares the
/// same backend, router and scheduler.
#[derive(Clone)]
pub struct Attachment {
    /// Backend the map renders on.
    pub backend: BackendHandle,
    /// Router shared by every feature of the map.
    pub router: FeatureRouter,
    /// Runs deferred background checks. `None` runs them inline.
    pub scheduler: Option<Rc<dyn Scheduler>>,
    /// Finds the layer a feature of a given z-index is inserted below.
    pub anchors: AnchorResolver,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("dialect", &self.backend.borrow().dialect().name)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// An addressable map object with a persistent listener table.
///
/// Listeners registered while detached are kept and installed on the next
/// [`Entity::add`]. [`Entity::remove`] uninstalls them but keeps the table,
/// so an entity can move between maps without re-registering anything.
///
/// # Examples
///
/// ```
/// use mapweave::backend::StyleBackend;
/// use mapweave::entity::{Entity, Scope};
/// use mapweave::{Map, MapEvent, MapOptions};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let backend = Rc::new(RefCell::new(StyleBackend::new()));
/// let map = Map::new(backend, MapOptions::default(), None)?;
///
/// let mut entity = Entity::new(Scope::Map);
/// entity.on("click", |_: &MapEvent| {});
/// assert!(!entity.is_attached());
///
/// entity.add(map.attachment());
/// assert!(entity.is_attached());
///
/// entity.remove();
/// assert_eq!(entity.listeners().count(), 1);
/// # Ok::<(), mapweave::MapError>(())
/// ```
pub struct Entity {
    id: EntityId,
    scope: Scope,
    listeners: Vec<Listener>,
    attachment: Option<Attachment>,
    scheduler: SchedulerSlot,
    on_add: Option<Hook>,
    on_remove: Option<Hook>,
}

impl Entity {
    /// Creates a detached entity with an empty listener table.
    pub fn new(scope: Scope) -> Self {
        Self {
            id: EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed)),
            scope,
            listeners: Vec::new(),
            attachment: None,
            scheduler: Rc::new(RefCell::new(None)),
            on_add: None,
            on_remove: None,
        }
    }

    /// Sets the hooks run when attaching and detaching.
    ///
    /// # Parameters
    ///
    /// * `on_add` - Runs on [`Entity::add`] before the listeners are installed
    /// * `on_remove` - Runs on [`Entity::remove`] after the listeners are gone
    ///
    /// Feature wrappers use the hooks to add and remove their layer.
    #[must_use]
    pub fn with_hooks(mut self, on_add: Option<Hook>, on_remove: Option<Hook>) -> Self {
        self.on_add = on_add;
        self.on_remove = on_remove;
        self
    }

    /// Process-unique identity, used in log fields.
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Whether this entity is the map or one feature.
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether the entity is currently attached to a map.
    pub const fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// The map attachment, while attached.
    pub const fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Registered `(event, handler)` pairs in registration order.
    pub fn listeners(&self) -> impl Iterator<Item = (&str, &Handler)> {
        self.listeners.iter().map(|l| (l.event.as_str(), &l.handler))
    }

    /// Registers `handler` for `event`.
    ///
    /// # Parameters
    ///
    /// * `event` - Canonical name such as `click` or `zoom_changed`; native
    ///   names of the backend are accepted too
    /// * `handler` - A closure or a [`Handler`]; keep a [`Handler`] clone to
    ///   remove the listener later with [`Entity::off`]
    ///
    /// Registering the same pair twice yields two independent listeners.
    /// While attached the listener is installed at once; otherwise it is
    /// installed by the next [`Entity::add`]. Drag events on features are
    /// recorded but never bound on the backend, only [`Entity::fire`] reaches
    /// them.
    pub fn on(&mut self, event: &str, handler: impl Into<Handler>) -> &mut Self {
        let handler = handler.into();
        let on_feature = matches!(self.scope, Scope::Feature(_));
        let bound = arbiter::bind(event, on_feature, handler.clone(), Rc::clone(&self.scheduler));
        let mut listener = Listener {
            event: event.to_string(),
            handler,
            bound,
            binding: None,
        };
        if let Some(attachment) = &self.attachment {
            listener.binding = install(&listener, &self.scope, attachment);
        }
        tracing::trace!(entity = %self.id, event, attached = self.is_attached(), "listener registered");
        self.listeners.push(listener);
        self
    }

    /// Removes the first listener registered for `(event, handler)`.
    ///
    /// Handlers match by identity. While attached, event names match after
    /// translation to the backend's names, so `off("zoomend", &h)` removes a
    /// listener registered as `zoom_changed` on a backend aliasing the two.
    /// Removing a listener that was never registered does nothing.
    pub fn off(&mut self, event: &str, handler: &Handler) -> &mut Self {
        let Some(index) = self
            .listeners
            .iter()
            .position(|l| l.handler == *handler && self.same_event(&l.event, event))
        else {
            return self;
        };
        let listener = self.listeners.remove(index);
        if let Some(attachment) = &self.attachment {
            uninstall(&listener, attachment);
        }
        self
    }

    /// Removes every listener registered for `event`, matching names the
    /// same way as [`Entity::off`].
    pub fn off_event(&mut self, event: &str) -> &mut Self {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.listeners)
            .into_iter()
            .partition(|l| self.same_event(&l.event, event));
        self.listeners = kept;
        if let Some(attachment) = &self.attachment {
            for listener in &removed {
                uninstall(listener, attachment);
            }
        }
        self
    }

    /// Removes every listener and uninstalls the ones bound on the backend.
    pub fn off_all(&mut self) -> &mut Self {
        let removed = std::mem::take(&mut self.listeners);
        if let Some(attachment) = &self.attachment {
            for listener in &removed {
                uninstall(listener, attachment);
            }
        }
        self
    }

    /// Calls every handler registered for `event`, in registration order.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::entity::{Entity, Scope};
    /// use mapweave::{Handler, MapEvent};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let calls = Rc::new(Cell::new(0));
    /// let counter = Rc::clone(&calls);
    /// let handler = Handler::new(move |_| counter.set(counter.get() + 1));
    ///
    /// let mut entity = Entity::new(Scope::Map);
    /// entity.on("moveend", handler.clone()).on("moveend", handler.clone());
    /// entity.fire("moveend", &MapEvent::new("moveend"));
    /// assert_eq!(calls.get(), 2);
    ///
    /// entity.off("moveend", &handler);
    /// entity.fire("moveend", &MapEvent::new("moveend"));
    /// assert_eq!(calls.get(), 3);
    /// ```
    ///
    /// The call is synchronous: no arbitration or deferral happens. Events
    /// carrying a location are tagged with it first.
    pub fn fire(&self, event: &str, e: &MapEvent) {
        arbiter::locate(e);
        let handlers: Vec<Handler> = self
            .listeners
            .iter()
            .filter(|l| self.same_event(&l.event, event))
            .map(|l| l.handler.clone())
            .collect();
        for handler in handlers {
            handler.call(e);
        }
    }

    fn same_event(&self, registered: &str, fired: &str) -> bool {
        match &self.attachment {
            Some(attachment) => {
                let dialect = attachment.backend.borrow().dialect();
                dialect.translate(registered) == dialect.translate(fired)
            }
            None => registered == fired,
        }
    }

    /// Attaches the entity and installs every listener. No-op while attached.
    ///
    /// The attach hook runs before the listeners are installed, so a feature
    /// layer exists by the time its first handler is bound.
    pub fn add(&mut self, attachment: Attachment) -> &mut Self {
        if self.attachment.is_some() {
            tracing::debug!(entity = %self.id, "already attached");
            return self;
        }
        let _span = tracing::debug_span!("attach", entity = %self.id).entered();

        self.scheduler.replace(attachment.scheduler.clone());
        if let Some(hook) = self.on_add.as_mut() {
            hook(&attachment);
        }
        for listener in &mut self.listeners {
            listener.binding = install(listener, &self.scope, &attachment);
        }
        tracing::debug!(listeners = self.listeners.len(), "listeners installed");
        self.attachment = Some(attachment);
        self
    }

    /// Uninstalls every listener and detaches. The listener table is kept.
    ///
    /// The detach hook runs after the listeners are gone. Does nothing while
    /// detached.
    pub fn remove(&mut self) -> &mut Self {
        let Some(attachment) = self.attachment.take() else {
            return self;
        };
        let _span = tracing::debug_span!("detach", entity = %self.id).entered();

        for listener in &mut self.listeners {
            uninstall(listener, &attachment);
            listener.binding = None;
        }
        if let Some(hook) = self.on_remove.as_mut() {
            hook(&attachment);
        }
        self.scheduler.replace(None);
        self
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("listeners", &self.listeners)
            .field("attached", &self.is_attached())
            .finish()
    }
}

fn install(listener: &Listener, scope: &Scope, attachment: &Attachment) -> Option<Binding> {
    let native = attachment
        .backend
        .borrow()
        .dialect()
        .translate(&listener.event)
        .to_string();
    match scope {
        Scope::Map => {
            let id = attachment
                .backend
                .borrow_mut()
                .subscribe(&native, None, listener.bound.clone());
            Some(Binding::Map(id))
        }
        Scope::Feature(_) if arbiter::is_drag(&listener.event) => None,
        Scope::Feature(key) => {
            let id = attachment.router.add(&native, key, listener.bound.clone());
            Some(Binding::Feature(id))
        }
    }
}

fn uninstall(listener: &Listener, attachment: &Attachment) {
    match listener.binding {
        Some(Binding::Map(id)) => {
            attachment.backend.borrow_mut().unsubscribe(id);
        }
        Some(Binding::Feature(id)) => {
            attachment.router.remove(id);
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StyleBackend;

    fn attachment() -> Attachment {
        let backend: BackendHandle = Rc::new(RefCell::new(StyleBackend::new()));
        Attachment {
            router: FeatureRouter::new(Rc::clone(&backend)),
            backend,
            scheduler: None,
            anchors: Rc::new(|_: i64| None::<String>),
        }
    }

    fn events(attachment: &Attachment) -> Vec<String> {
        attachment
            .backend
            .borrow()
            .subscriptions()
            .into_iter()
            .map(|s| s.event)
            .collect()
    }

    #[test]
    fn listeners_registered_while_detached_bind_on_add() {
        let mut entity = Entity::new(Scope::Map);
        entity.on("zoom_changed", |_: &MapEvent| {}).on("click", |_: &MapEvent| {});
        let target = attachment();
        entity.add(target.clone());
        assert_eq!(events(&target), vec!["zoomend", "click"]);
    }

    #[test]
    fn second_add_is_a_no_op() {
        let mut entity = Entity::new(Scope::Map);
        entity.on("click", |_: &MapEvent| {});
        let target = attachment();
        entity.add(target.clone()).add(target.clone());
        assert_eq!(events(&target).len(), 1);
    }

    #[test]
    fn off_removes_one_exact_match() {
        let mut entity = Entity::new(Scope::Map);
        let handler = Handler::new(|_| {});
        let target = attachment();
        entity.add(target.clone());
        entity.on("click", handler.clone()).on("click", handler.clone());
        entity.off("click", &handler);
        assert_eq!(events(&target).len(), 1);
        entity.off("click", &Handler::new(|_| {}));
        assert_eq!(events(&target).len(), 1);
    }

    #[test]
    fn off_matches_translated_event_names() {
        let mut entity = Entity::new(Scope::Map);
        let handler = Handler::new(|_| {});
        let target = attachment();
        entity.add(target.clone());
        entity.on("zoom_changed", handler.clone()).on("moveend", handler.clone());

        entity.off("zoomend", &handler);
        assert_eq!(events(&target), vec!["moveend"]);

        entity.off_event("bounds_changed");
        assert!(events(&target).is_empty());
        assert_eq!(entity.listeners().count(), 0);
    }

    #[test]
    fn detached_off_matches_the_registered_name() {
        let mut entity = Entity::new(Scope::Map);
        let handler = Handler::new(|_| {});
        entity.on("zoom_changed", handler.clone());
        entity.off("zoomend", &handler);
        assert_eq!(entity.listeners().count(), 1);
        entity.off("zoom_changed", &handler);
        assert_eq!(entity.listeners().count(), 0);
    }

    #[test]
    fn feature_drag_listeners_stay_local() {
        let mut entity = Entity::new(Scope::Feature(FeatureKey::new("pins", "1")));
        entity.on("dragend", |_: &MapEvent| {});
        let target = attachment();
        entity.add(target.clone());
        assert!(events(&target).is_empty());
    }

    #[test]
    fn fire_translates_canonical_names() {
        let fired = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&fired);
        let mut entity = Entity::new(Scope::Map);
        entity.on("zoom_changed", move |_: &MapEvent| counter.set(counter.get() + 1));
        entity.add(attachment());
        entity.fire("zoomend", &MapEvent::new("zoomend"));
        assert_eq!(fired.get(), 1);
    }
}
