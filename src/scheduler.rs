//! Single-shot deferred tasks.
//!
//! The only suspension point in the crate is the background-click arbitration:
//! a whole-map handler for a located event yields one tick so that feature
//! handlers for the same physical event can claim it first. [`Scheduler`]
//! abstracts "run this after the current dispatch has drained" so the
//! arbitration does not depend on a specific timer API.
//!
//! [`TickQueue`] is the deterministic implementation used by the headless
//! backends and the tests: the host drains it after each backend dispatch.
//!
//! ```
//! use mapweave::scheduler::{Scheduler, TickQueue};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let queue = TickQueue::new();
//! let ran = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&ran);
//! queue.defer(Box::new(move || flag.set(true)));
//! assert!(!ran.get());
//! assert_eq!(queue.run_tick(), 1);
//! assert!(ran.get());
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks after the current event dispatch has completed.
///
/// Implementations must run every deferred task exactly once, after the
/// dispatch that deferred it returns, and in the order they were deferred.
pub trait Scheduler {
    /// Queues `task` to run once the current dispatch has returned.
    fn defer(&self, task: Task);
}

/// A FIFO queue of deferred tasks drained one tick at a time.
///
/// The host decides what a tick is: typically one [`TickQueue::run_tick`]
/// after each dispatched event, or [`TickQueue::run_until_idle`] when only
/// the final state matters.
#[derive(Default)]
pub struct TickQueue {
    pending: RefCell<VecDeque<Task>>,
}

impl TickQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Runs the tasks that were queued before this call.
    ///
    /// Tasks deferred while the tick runs wait for the next tick. Returns the
    /// number of tasks executed.
    pub fn run_tick(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        let count = batch.len();
        for task in batch {
            task();
        }
        if count > 0 {
            tracing::trace!(count, "ran deferred tasks");
        }
        count
    }

    /// Runs ticks until no task is pending. Returns the total executed.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::{Scheduler, TickQueue};
    /// use std::rc::Rc;
    ///
    /// let queue = Rc::new(TickQueue::new());
    /// let inner = Rc::clone(&queue);
    /// queue.defer(Box::new(move || inner.defer(Box::new(|| {}))));
    ///
    /// assert_eq!(queue.run_until_idle(), 2);
    /// assert_eq!(queue.pending(), 0);
    /// ```
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_tick();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Scheduler for TickQueue {
    fn defer(&self, task: Task) {
        self.pending.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for TickQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn tasks_run_in_deferral_order() {
        let queue = TickQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            queue.defer(Box::new(move || log.borrow_mut().push(i)));
        }
        assert_eq!(queue.pending(), 3);
        assert_eq!(queue.run_tick(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_deferred_during_a_tick_wait_for_the_next() {
        let queue = Rc::new(TickQueue::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_queue = Rc::clone(&queue);
        let inner_log = Rc::clone(&log);
        queue.defer(Box::new(move || {
            inner_log.borrow_mut().push("outer");
            let log = Rc::clone(&inner_log);
            inner_queue.defer(Box::new(move || log.borrow_mut().push("inner")));
        }));

        assert_eq!(queue.run_tick(), 1);
        assert_eq!(*log.borrow(), vec!["outer"]);
        assert_eq!(queue.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }
}
