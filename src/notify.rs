//! Notification Channel
//!
//! Synchronous, ordered pub/sub keyed by event name. One channel belongs to each
//! Store, and one is shared by every keyed instance of a Contract.
//!
//! Emission delivers to a snapshot of the listeners registered for the event at
//! the moment of the call, in subscription order. Nothing is queued: when `emit`
//! returns, every listener has run. Because no borrow is held while listeners run,
//! a listener may subscribe, unsubscribe, or call back into the owner.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

type Listener<P> = Rc<dyn Fn(&P)>;

/// Handle returned by [`NotificationChannel::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

pub struct NotificationChannel<P> {
    listeners: RefCell<HashMap<String, Vec<(ListenerId, Listener<P>)>>>,
    next_id: Cell<u64>,
}

impl<P> Default for NotificationChannel<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for NotificationChannel<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let mut counts: Vec<(&String, usize)> =
            listeners.iter().map(|(name, list)| (name, list.len())).collect();
        counts.sort();
        f.debug_struct("NotificationChannel")
            .field("listeners", &counts)
            .finish()
    }
}

impl<P> NotificationChannel<P> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Register `listener` for `event`. Listeners for one event run in the order
    /// they were registered.
    pub fn subscribe<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&P) + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(event.into())
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered for `event`.
    pub fn unsubscribe(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Deliver `payload` to every listener of `event`. Returns how many ran.
    pub fn emit(&self, event: &str, payload: &P) -> usize {
        let snapshot: Vec<Listener<P>> = match self.listeners.borrow().get(event) {
            Some(list) => list.iter().map(|(_, l)| Rc::clone(l)).collect(),
            None => Vec::new(),
        };
        trace!(event, listeners = snapshot.len(), "Emitting event");
        for listener in &snapshot {
            listener(payload);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .get(event)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}
