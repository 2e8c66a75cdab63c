//! In-process command channels.
//!
//! A [`Channel`] delivers every published item, in publication order, to
//! each listener subscribed at the time of publication. Listeners run on the
//! publishing thread and outside the channel's lock, so they may publish or
//! subscribe again from inside the callback.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Listener<C> = Arc<dyn Fn(&C) + Send + Sync>;

struct Listeners<C> {
    next_id: u64,
    entries: Vec<(u64, Listener<C>)>,
}

/// Ordered multi-consumer pipe with explicit unsubscribe.
pub struct Channel<C> {
    listeners: Arc<Mutex<Listeners<C>>>,
}

impl<C: 'static> Channel<C> {
    /// Create a channel without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Attach a listener. It stays attached until [`Subscription::cancel`].
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::new(listener)));
            id
        };
        let weak: Weak<Mutex<Listeners<C>>> = Arc::downgrade(&self.listeners);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.lock().entries.retain(|(other, _)| *other != id);
                }
            })),
        }
    }

    /// Deliver `item` to every current listener.
    pub fn publish(&self, item: &C) {
        let snapshot: Vec<Listener<C>> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(item);
        }
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }
}

impl<C: 'static> Default for Channel<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Channel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("subscribers", &self.listeners.lock().entries.len())
            .finish()
    }
}

/// Handle to an attached listener.
///
/// Dropping the handle leaves the listener attached; call
/// [`cancel`](Subscription::cancel) to detach it.
#[must_use = "a subscription can only be cancelled through its handle"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Detach the listener. Items published afterwards are not delivered.
    pub fn cancel(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

/// A bidirectional link between two CRDT instances.
#[derive(Debug)]
#[must_use = "dropping a connection keeps both directions attached"]
pub struct Connection {
    inbound: Subscription,
    outbound: Subscription,
}

impl Connection {
    pub(crate) fn new(inbound: Subscription, outbound: Subscription) -> Self {
        Self { inbound, outbound }
    }

    /// Stop forwarding in both directions. Applied commands stay applied.
    pub fn disconnect(self) {
        self.inbound.cancel();
        self.outbound.cancel();
    }
}
