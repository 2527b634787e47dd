//! Listener records and handler identity.

use crate::backend::{BoundHandler, SubscriptionId};
use crate::domain::event::MapEvent;
use crate::entity::router::RouteId;
use std::fmt;
use std::rc::Rc;

/// An application callback.
///
/// Handlers compare by identity: clones of one `Handler` are equal, two
/// handlers built from identical closures are not. [`Entity::off`] relies on
/// this to remove exactly the listener that was registered.
///
/// [`Entity::off`]: crate::entity::Entity::off
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&MapEvent)>);

impl Handler {
    /// Wraps `f` in a new identity.
    pub fn new(f: impl Fn(&MapEvent) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Calls the wrapped closure.
    pub fn call(&self, event: &MapEvent) {
        (self.0)(event);
    }
}

impl<F> From<F> for Handler
where
    F: Fn(&MapEvent) + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0).cast::<()>(),
            Rc::as_ptr(&other.0).cast::<()>(),
        )
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0).cast::<()>())
    }
}

/// Where a listener is installed while its entity is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Directly on the backend map.
    Map(SubscriptionId),
    /// Through the map's feature router.
    Feature(RouteId),
}

/// One registered listener.
pub(crate) struct Listener {
    /// Event name as registered by the application.
    pub event: String,
    /// Application handler, compared by identity.
    pub handler: Handler,
    /// Arbitration wrapper installed on the backend.
    pub bound: BoundHandler,
    /// Where the bound handler is installed, while attached.
    pub binding: Option<Binding>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("event", &self.event)
            .field("handler", &self.handler)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_compare_by_identity() {
        let a = Handler::new(|_| {});
        let b = Handler::new(|_| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
