//! Change notification bus shared by the mapping graph and the variable engine.
//!
//! Listeners fire synchronously, in registration order, from a snapshot of the
//! listener list taken when `notify` starts. A listener added while an event is
//! being dispatched does not see that event; a listener removed during dispatch
//! is skipped. A listener is never re-entered: if its own callback causes a
//! nested notification that would reach it again, the nested delivery is
//! dropped, logged and counted in [`Bus::dropped_events`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Which aspects of a node changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Properties: u8 {
        /// The node's value (or mapped signal) changed.
        const VALUE = 1 << 0;
        /// The node's status changed.
        const STATUS = 1 << 1;
        /// A pin/signal mapping involving the node changed.
        const MAPPING = 1 << 2;
        /// Children were added or removed.
        const STRUCTURE = 1 << 3;
        /// Visibility changed.
        const HIDDEN = 1 << 4;
    }
}

/// Handle returned by [`Bus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// A single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent<S> {
    pub source: S,
    pub properties: Properties,
}

type Callback<S> = Rc<RefCell<dyn FnMut(&ChangeEvent<S>)>>;

struct Slot<S> {
    id: ListenerId,
    /// `None` listens to every source.
    filter: Option<S>,
    mask: Properties,
    callback: Callback<S>,
}

/// Observer registry keyed by source node.
pub struct Bus<S> {
    slots: RefCell<Vec<Slot<S>>>,
    next_id: Cell<u64>,
    dropped: Cell<u64>,
}

impl<S: Copy + PartialEq> Bus<S> {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            dropped: Cell::new(0),
        }
    }

    /// Register a listener.
    ///
    /// `filter` restricts the listener to one source; `mask` restricts it to
    /// events carrying at least one of the given properties.
    pub fn subscribe<F>(&self, filter: Option<S>, mask: Properties, callback: F) -> ListenerId
    where
        F: FnMut(&ChangeEvent<S>) + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push(Slot {
            id,
            filter,
            mask,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// Register a listener for every event from every source.
    pub fn subscribe_all<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&ChangeEvent<S>) + 'static,
    {
        self.subscribe(None, Properties::all(), callback)
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|s| s.id != id);
        slots.len() != before
    }

    /// Nested deliveries dropped because the listener was already running.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.get()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// True if any listener would receive events from `source`.
    pub fn has_listeners_for(&self, source: S) -> bool {
        self.slots
            .borrow()
            .iter()
            .any(|s| s.filter.map_or(true, |f| f == source))
    }

    fn is_subscribed(&self, id: ListenerId) -> bool {
        self.slots.borrow().iter().any(|s| s.id == id)
    }

    /// Deliver an event. Returns the number of listeners invoked.
    pub fn notify(&self, source: S, properties: Properties) -> usize {
        if properties.is_empty() {
            return 0;
        }
        let snapshot: Vec<(ListenerId, Callback<S>)> = self
            .slots
            .borrow()
            .iter()
            .filter(|s| s.filter.map_or(true, |f| f == source) && s.mask.intersects(properties))
            .map(|s| (s.id, Rc::clone(&s.callback)))
            .collect();

        let event = ChangeEvent { source, properties };
        let mut delivered = 0;
        for (id, callback) in snapshot {
            if !self.is_subscribed(id) {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut f) => {
                    (&mut *f)(&event);
                    delivered += 1;
                }
                Err(_) => {
                    self.dropped.set(self.dropped.get() + 1);
                    tracing::debug!(listener = id.0, properties = ?properties, "listener re-entered, nested event dropped");
                }
            }
        }
        delivered
    }
}

impl<S: Copy + PartialEq> Default for Bus<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Bus<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("listeners", &self.slots.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_registration_order() {
        let bus: Bus<u32> = Bus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let log = Rc::clone(&log);
            bus.subscribe_all(move |_| log.borrow_mut().push(n));
        }
        assert_eq!(bus.notify(7, Properties::VALUE), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn filter_and_mask() {
        let bus: Bus<u32> = Bus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.subscribe(Some(1), Properties::STATUS, move |_| h.set(h.get() + 1));

        bus.notify(2, Properties::STATUS);
        bus.notify(1, Properties::VALUE);
        assert_eq!(hits.get(), 0);

        bus.notify(1, Properties::STATUS | Properties::VALUE);
        assert_eq!(hits.get(), 1);
        assert!(bus.has_listeners_for(1));
        assert!(!bus.has_listeners_for(2));
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_next_event() {
        let bus: Rc<Bus<u32>> = Rc::new(Bus::new());
        let late_hits = Rc::new(Cell::new(0));
        {
            let bus2 = Rc::clone(&bus);
            let late_hits = Rc::clone(&late_hits);
            let added = Cell::new(false);
            bus.subscribe_all(move |_| {
                if !added.replace(true) {
                    let late_hits = Rc::clone(&late_hits);
                    bus2.subscribe_all(move |_| late_hits.set(late_hits.get() + 1));
                }
            });
        }
        bus.notify(0, Properties::VALUE);
        assert_eq!(late_hits.get(), 0);
        bus.notify(0, Properties::VALUE);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn listener_removed_during_dispatch_is_skipped() {
        let bus: Rc<Bus<u32>> = Rc::new(Bus::new());
        let victim_hits = Rc::new(Cell::new(0));
        let victim_id = Rc::new(Cell::new(None));
        {
            let bus2 = Rc::clone(&bus);
            let victim_id = Rc::clone(&victim_id);
            bus.subscribe_all(move |_| {
                if let Some(id) = victim_id.get() {
                    bus2.unsubscribe(id);
                }
            });
        }
        let h = Rc::clone(&victim_hits);
        victim_id.set(Some(bus.subscribe_all(move |_| h.set(h.get() + 1))));

        assert_eq!(bus.notify(0, Properties::VALUE), 1);
        assert_eq!(victim_hits.get(), 0);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn nested_notify_does_not_reenter() {
        let bus: Rc<Bus<u32>> = Rc::new(Bus::new());
        let hits = Rc::new(Cell::new(0));
        {
            let bus2 = Rc::clone(&bus);
            let hits = Rc::clone(&hits);
            bus.subscribe_all(move |e| {
                hits.set(hits.get() + 1);
                bus2.notify(e.source, e.properties);
            });
        }
        assert_eq!(bus.dropped_events(), 0);
        bus.notify(0, Properties::VALUE);
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.dropped_events(), 1);
    }

    #[test]
    fn empty_properties_deliver_nothing() {
        let bus: Bus<u32> = Bus::new();
        bus.subscribe_all(|_| panic!("should not fire"));
        assert_eq!(bus.notify(0, Properties::empty()), 0);
    }
}
