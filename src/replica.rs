//! Replicas: hosts of CRDT instances that exchange commands with peers.
//!
//! A [`Replica`] records every command its CRDTs produce or receive in a
//! history log, drops exact duplicates, and forwards each new command to
//! every connected peer. A peer connected late is sent the whole history
//! first, so it converges as if it had always been connected. The first
//! command of every CRDT is an announce naming its [`CrdtType`]; peers use
//! their [`TypeRegistry`] to instantiate the CRDT on first sight.
//!
//! # Example
//!
//! ```
//! use crdt_sync::prelude::*;
//!
//! let a = Replica::<String>::new("a");
//! let b = Replica::<String>::new("b");
//! let c = Replica::<String>::new("c");
//!
//! let hits = a.create_g_counter(Some("hits")).unwrap();
//! hits.increment_by(3).unwrap();
//!
//! a.connect(&b);
//! b.connect(&c);
//! hits.increment().unwrap();
//!
//! let on_c = c.find_g_counter("hits").unwrap();
//! assert_eq!(on_c.get(), 4);
//! ```

use core::fmt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::channel::{Channel, Subscription};
use crate::command::{AnyCrdt, ReplicaCommand, Replicated};
use crate::config::{ReplicaBuilder, ReplicaConfig};
use crate::crdt::{Command, Value};
use crate::error::{CrdtError, Result};
use crate::registry::{CrdtType, TypeRegistry};
use crate::{GCounter, GSet, LWWRegister, MVRegister, ORSet, PNCounter, Rga, TwoPSet, USet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Produced by a CRDT hosted here; already applied.
    Local,
    /// Received from a peer or a transport.
    Remote,
}

/// Both directions of one peer connection. `None` once disconnected.
struct Link {
    subscriptions: Mutex<Option<Vec<Subscription>>>,
}

impl Link {
    fn open() -> Self {
        Self {
            subscriptions: Mutex::new(Some(Vec::new())),
        }
    }

    fn attach(&self, subscription: Subscription) {
        let mut subscriptions = self.subscriptions.lock();
        match subscriptions.as_mut() {
            Some(active) => active.push(subscription),
            None => {
                drop(subscriptions);
                subscription.cancel();
            }
        }
    }

    fn close(&self) {
        let subscriptions = self.subscriptions.lock().take();
        for subscription in subscriptions.into_iter().flatten() {
            subscription.cancel();
        }
    }
}

struct Inner<T: Value> {
    crdts: HashMap<String, AnyCrdt<T>>,
    seen: HashSet<ReplicaCommand<T>>,
    history: Vec<ReplicaCommand<T>>,
    /// Remote commands waiting for a command they depend on. Not yet seen.
    pending: Vec<ReplicaCommand<T>>,
    links: HashMap<String, Arc<Link>>,
}

impl<T: Value> Inner<T> {
    fn record(&mut self, command: ReplicaCommand<T>, recorded: &mut Vec<ReplicaCommand<T>>) {
        self.seen.insert(command.clone());
        self.history.push(command.clone());
        recorded.push(command);
    }

    /// Apply and record every pending command of `crdt` that became ready.
    fn flush_pending(&mut self, crdt: &AnyCrdt<T>, recorded: &mut Vec<ReplicaCommand<T>>) {
        while let Some(at) = self
            .pending
            .iter()
            .position(|command| command.crdt_id() == crdt.id() && crdt.is_ready(command))
        {
            let command = self.pending.remove(at);
            if self.seen.contains(&command) {
                continue;
            }
            crdt.apply(&command);
            self.record(command, recorded);
        }
    }
}

struct Shared<T: Value> {
    id: String,
    registry: TypeRegistry<T>,
    inner: Mutex<Inner<T>>,
    outbound: Channel<ReplicaCommand<T>>,
}

/// A set of CRDT instances sharing one replica id and one command stream.
///
/// `T` is the value type of the collection and register CRDTs hosted here.
/// Cloning a `Replica` yields another handle to the same replica.
pub struct Replica<T: Value> {
    shared: Arc<Shared<T>>,
}

impl<T: Value> Replica<T> {
    /// Create a replica with the standard registry.
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self::from_parts(replica_id.into(), TypeRegistry::standard())
    }

    /// Create a replica from a configuration.
    pub fn with_config(config: ReplicaConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Start building a replica.
    #[must_use]
    pub fn builder() -> ReplicaBuilder<T> {
        ReplicaBuilder::new()
    }

    pub(crate) fn from_parts(id: String, registry: TypeRegistry<T>) -> Self {
        debug!(replica = %id, "created replica");
        Self {
            shared: Arc::new(Shared {
                id,
                registry,
                inner: Mutex::new(Inner {
                    crdts: HashMap::new(),
                    seen: HashSet::new(),
                    history: Vec::new(),
                    pending: Vec::new(),
                    links: HashMap::new(),
                }),
                outbound: Channel::new(),
            }),
        }
    }

    /// This replica's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Create a CRDT of type `C`, or return the existing one.
    ///
    /// Without an id a random UUID is used. An id already hosting another
    /// type fails with [`CrdtError::TypeMismatch`].
    pub fn create<C: Replicated<T>>(&self, crdt_id: Option<&str>) -> Result<Arc<C>> {
        let crdt_id = match crdt_id {
            Some("") => {
                return Err(CrdtError::InvalidArgument(
                    "crdt id must not be empty".into(),
                ))
            }
            Some(id) => id.to_owned(),
            None => Uuid::new_v4().to_string(),
        };
        let announce = ReplicaCommand::Announce {
            crdt_type: C::CRDT_TYPE,
            crdt_id: crdt_id.clone(),
        };

        let handle = {
            let mut inner = self.shared.inner.lock();
            if let Some(existing) = inner.crdts.get(&crdt_id) {
                return C::unwrap(existing).ok_or_else(|| CrdtError::TypeMismatch {
                    id: crdt_id.clone(),
                    expected: C::CRDT_TYPE,
                    found: existing.crdt_type(),
                });
            }
            let handle = Arc::new(C::create(&self.shared.id, &crdt_id));
            let crdt = C::wrap(Arc::clone(&handle));
            self.attach(&crdt);
            inner.crdts.insert(crdt_id.clone(), crdt);
            inner.seen.insert(announce.clone());
            inner.history.push(announce.clone());
            handle
        };

        debug!(replica = %self.shared.id, crdt = %crdt_id, crdt_type = %C::CRDT_TYPE, "created crdt");
        self.shared.outbound.publish(&announce);
        Ok(handle)
    }

    /// Look up a CRDT of type `C`. `None` if absent or of another type.
    #[must_use]
    pub fn find<C: Replicated<T>>(&self, crdt_id: &str) -> Option<Arc<C>> {
        self.shared.inner.lock().crdts.get(crdt_id).and_then(C::unwrap)
    }

    /// Type of the CRDT hosted under `crdt_id`.
    #[must_use]
    pub fn crdt_type(&self, crdt_id: &str) -> Option<CrdtType> {
        self.shared
            .inner
            .lock()
            .crdts
            .get(crdt_id)
            .map(AnyCrdt::crdt_type)
    }

    /// Ids of every hosted CRDT, sorted.
    #[must_use]
    pub fn crdt_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.inner.lock().crdts.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every command recorded so far, in recording order.
    #[must_use]
    pub fn history(&self) -> Vec<ReplicaCommand<T>> {
        self.shared.inner.lock().history.clone()
    }

    /// Observe the command stream: the whole history first, then every new
    /// command as it is recorded.
    ///
    /// A command recorded while the history is being replayed may be seen
    /// twice.
    pub fn subscribe<F>(&self, consumer: F) -> Subscription
    where
        F: Fn(&ReplicaCommand<T>) + Send + Sync + 'static,
    {
        let consumer = Arc::new(consumer);
        let mut replayed = 0;
        loop {
            let pending = {
                let inner = self.shared.inner.lock();
                if inner.history.len() == replayed {
                    let live = Arc::clone(&consumer);
                    return self.shared.outbound.subscribe(move |command| live(command));
                }
                inner.history[replayed..].to_vec()
            };
            replayed += pending.len();
            for command in &pending {
                consumer(command);
            }
        }
    }

    /// Accept a command from a peer or a transport.
    ///
    /// Duplicates are dropped. Commands for CRDTs that were never announced
    /// here are dropped too, without being remembered.
    pub fn deliver(&self, command: ReplicaCommand<T>) {
        self.dispatch(command, Origin::Remote);
    }

    /// Exchange command streams with `peer`, history included.
    ///
    /// Connecting to itself or to an already connected peer does nothing.
    pub fn connect(&self, peer: &Replica<T>) {
        if Arc::ptr_eq(&self.shared, &peer.shared) || self.is_connected(peer.id()) {
            return;
        }
        let link = Arc::new(Link::open());
        self.shared
            .inner
            .lock()
            .links
            .insert(peer.id().to_owned(), Arc::clone(&link));
        peer.shared
            .inner
            .lock()
            .links
            .insert(self.id().to_owned(), Arc::clone(&link));
        debug!(replica = %self.shared.id, peer = %peer.shared.id, "connecting");

        link.attach(peer.subscribe(self.sink()));
        link.attach(self.subscribe(peer.sink()));
    }

    /// Stop exchanging commands with `peer`. Nothing is rolled back.
    pub fn disconnect(&self, peer: &Replica<T>) {
        let link = self.shared.inner.lock().links.remove(peer.id());
        peer.shared.inner.lock().links.remove(self.id());
        if let Some(link) = link {
            link.close();
            debug!(replica = %self.shared.id, peer = %peer.shared.id, "disconnected");
        }
    }

    /// Whether a peer with id `peer_id` is connected.
    #[must_use]
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.shared.inner.lock().links.contains_key(peer_id)
    }

    /// Forward the commands of a hosted CRDT into this replica.
    fn attach(&self, crdt: &AnyCrdt<T>) {
        let weak = Arc::downgrade(&self.shared);
        let _ = crdt.publish(move |command| {
            if let Some(shared) = weak.upgrade() {
                Replica { shared }.dispatch(command, Origin::Local);
            }
        });
    }

    /// A listener that delivers into this replica while it is alive.
    fn sink(&self) -> impl Fn(&ReplicaCommand<T>) + Send + Sync + 'static {
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        move |command| {
            if let Some(shared) = weak.upgrade() {
                Replica { shared }.deliver(command.clone());
            }
        }
    }

    /// Record a command and forward it, together with every pending command
    /// it unblocked.
    ///
    /// Remote commands are applied under the replica lock, so a command is
    /// marked seen only once its effect is in place. A remote command whose
    /// dependency has not been applied yet is parked until it has.
    fn dispatch(&self, command: ReplicaCommand<T>, origin: Origin) {
        let replica = self.shared.id.as_str();
        let mut recorded = Vec::new();
        {
            let mut inner = self.shared.inner.lock();
            if inner.seen.contains(&command) {
                trace!(replica, crdt = %command.crdt_id(), "dropping duplicate command");
                return;
            }
            let target = match &command {
                ReplicaCommand::Announce { crdt_type, crdt_id } => {
                    match inner.crdts.get(crdt_id) {
                        Some(existing) if existing.crdt_type() != *crdt_type => {
                            debug!(replica, crdt = %crdt_id, announced = %crdt_type, hosted = %existing.crdt_type(), "announce type mismatch");
                        }
                        Some(_) => {}
                        None => {
                            let Some(crdt) =
                                self.shared.registry.construct(*crdt_type, replica, crdt_id)
                            else {
                                trace!(replica, crdt = %crdt_id, crdt_type = %crdt_type, "dropping announce of unregistered type");
                                return;
                            };
                            self.attach(&crdt);
                            inner.crdts.insert(crdt_id.clone(), crdt);
                            debug!(replica, crdt = %crdt_id, crdt_type = %crdt_type, "instantiated announced crdt");
                        }
                    }
                    None
                }
                other => match inner.crdts.get(other.crdt_id()) {
                    Some(crdt) => Some(crdt.clone()),
                    None => {
                        trace!(replica, crdt = %other.crdt_id(), "dropping command for unknown crdt");
                        return;
                    }
                },
            };

            if let (Origin::Remote, Some(crdt)) = (origin, &target) {
                if !crdt.is_ready(&command) {
                    if !inner.pending.contains(&command) {
                        trace!(replica, crdt = %command.crdt_id(), "deferring command until its dependency arrives");
                        inner.pending.push(command);
                    }
                    return;
                }
                crdt.apply(&command);
            }
            inner.record(command, &mut recorded);
            if let Some(crdt) = &target {
                inner.flush_pending(crdt, &mut recorded);
            }
        }

        for command in &recorded {
            self.shared.outbound.publish(command);
        }
    }
}

macro_rules! typed_accessors {
    ($($doc:literal $create:ident $find:ident => $crdt:ty;)*) => {
        impl<T: Value> Replica<T> {
            $(
                #[doc = concat!("Create a ", $doc, ", see [`Replica::create`].")]
                pub fn $create(&self, crdt_id: Option<&str>) -> Result<Arc<$crdt>> {
                    self.create::<$crdt>(crdt_id)
                }

                #[doc = concat!("Look up a ", $doc, ", see [`Replica::find`].")]
                #[must_use]
                pub fn $find(&self, crdt_id: &str) -> Option<Arc<$crdt>> {
                    self.find::<$crdt>(crdt_id)
                }
            )*
        }
    };
}

typed_accessors! {
    "grow-only counter" create_g_counter find_g_counter => GCounter;
    "positive-negative counter" create_pn_counter find_pn_counter => PNCounter;
    "grow-only set" create_g_set find_g_set => GSet<T>;
    "two-phase set" create_twop_set find_twop_set => TwoPSet<T>;
    "unique-element set" create_u_set find_u_set => USet<T>;
    "observed-remove set" create_or_set find_or_set => ORSet<T>;
    "last-writer-wins register" create_lww_register find_lww_register => LWWRegister<T>;
    "multi-value register" create_mv_register find_mv_register => MVRegister<T>;
    "replicated growable array" create_rga find_rga => Rga<T>;
}

impl<T: Value> Clone for Replica<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Value> fmt::Debug for Replica<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        let mut peers: Vec<&String> = inner.links.keys().collect();
        peers.sort();
        f.debug_struct("Replica")
            .field("id", &self.shared.id)
            .field("crdts", &inner.crdts.len())
            .field("history", &inner.history.len())
            .field("pending", &inner.pending.len())
            .field("peers", &peers)
            .finish()
    }
}
