use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::channel::{Channel, Connection, Subscription};
use crate::error::{CrdtError, Result};

/// Bound for values stored in collection CRDTs.
///
/// Implemented automatically for every type that satisfies it.
pub trait Value: Clone + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + Ord + Hash + fmt::Debug + Send + Sync + 'static {}

/// A mutation exchanged between replicas of one CRDT.
///
/// Every command names the CRDT it targets so that a shared inbound stream
/// can be filtered per instance.
pub trait Command: Clone + fmt::Debug + Send + Sync + 'static {
    /// Id of the CRDT this command is addressed to.
    fn crdt_id(&self) -> &str;
}

/// Core trait that all operation-based CRDTs implement.
///
/// Local mutators update state and synchronously publish a [`Command`] on
/// the instance's outbound channel. Remote commands go through
/// [`Crdt::apply`], which must be:
/// - **Idempotent:** applying a command twice has no additional effect
/// - **Commutative:** causally unrelated commands can arrive in any order
///
/// Applied commands are not re-published; forwarding them further is the
/// job of the [`Replica`](crate::Replica).
pub trait Crdt: Send + Sync + 'static {
    /// The closed set of commands this CRDT produces and consumes.
    type Command: Command;

    /// Id shared by every replica of this CRDT.
    fn id(&self) -> &str;

    /// Id of the replica this instance lives on.
    fn replica_id(&self) -> &str;

    /// Channel carrying commands produced by local mutations.
    fn outbound(&self) -> &Channel<Self::Command>;

    /// Apply a command produced elsewhere. Returns `true` if state changed.
    fn apply(&self, command: &Self::Command) -> bool;

    /// `false` while `command` refers to state this instance has not seen
    /// yet. Applying such a command drops it.
    fn is_ready(&self, _command: &Self::Command) -> bool {
        true
    }

    /// Observe the commands this instance publishes.
    ///
    /// Consumers run synchronously while local mutations of this instance
    /// are serialized: a consumer that mutates the same instance deadlocks.
    /// Hand the command to another instance or thread instead.
    fn publish<F>(&self, consumer: F) -> Subscription
    where
        F: Fn(&Self::Command) + Send + Sync + 'static,
        Self: Sized,
    {
        self.outbound().subscribe(consumer)
    }

    /// Apply every command on `inbound` that is addressed to this instance.
    fn subscribe_to(self: &Arc<Self>, inbound: &Channel<Self::Command>) -> Subscription
    where
        Self: Sized,
    {
        let weak = Arc::downgrade(self);
        inbound.subscribe(move |command: &Self::Command| {
            if let Some(crdt) = weak.upgrade() {
                if command.crdt_id() == crdt.id() {
                    crdt.apply(command);
                }
            }
        })
    }

    /// Exchange mutation streams with `peer` in both directions.
    fn connect(self: &Arc<Self>, peer: &Arc<Self>) -> Connection
    where
        Self: Sized,
    {
        let inbound = self.subscribe_to(peer.outbound());
        let outbound = peer.subscribe_to(self.outbound());
        Connection::new(inbound, outbound)
    }
}

/// Shared plumbing of every CRDT: identity, guarded state, outbound channel.
pub(crate) struct CrdtCore<S, C> {
    id: String,
    replica_id: String,
    state: Mutex<S>,
    /// Serializes local mutations so commands leave in the order their
    /// effects were applied.
    sequencer: Mutex<()>,
    outbound: Channel<C>,
}

impl<S, C: Command> CrdtCore<S, C> {
    pub(crate) fn new(replica_id: impl Into<String>, id: impl Into<String>, state: S) -> Self {
        Self {
            id: id.into(),
            replica_id: replica_id.into(),
            state: Mutex::new(state),
            sequencer: Mutex::new(()),
            outbound: Channel::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn replica_id(&self) -> &str {
        &self.replica_id
    }

    pub(crate) fn outbound(&self) -> &Channel<C> {
        &self.outbound
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.lock())
    }

    /// Run a local mutation and publish the command it produced, if any.
    ///
    /// An error leaves the state untouched and publishes nothing.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut S) -> Result<(R, Option<C>)>) -> Result<R> {
        let _sequence = self.sequencer.lock();
        let (result, command) = f(&mut self.state.lock())?;
        self.emit(command);
        Ok(result)
    }

    /// [`mutate`](Self::mutate) for mutations that cannot fail.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut S) -> (R, Option<C>)) -> R {
        let _sequence = self.sequencer.lock();
        let (result, command) = f(&mut self.state.lock());
        self.emit(command);
        result
    }

    /// Publish while the sequencer is held.
    fn emit(&self, command: Option<C>) {
        if let Some(command) = command {
            self.outbound.publish(&command);
        }
    }

    pub(crate) fn apply_with(&self, f: impl FnOnce(&mut S) -> bool) -> bool {
        let changed = f(&mut self.state.lock());
        tracing::trace!(crdt = %self.id, replica = %self.replica_id, changed, "applied command");
        changed
    }
}

impl<S: fmt::Debug, C> fmt::Debug for CrdtCore<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crdt")
            .field("id", &self.id)
            .field("replica", &self.replica_id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Reject zero deltas before touching state.
pub(crate) fn positive(amount: u64) -> Result<u64> {
    if amount == 0 {
        return Err(CrdtError::InvalidArgument(
            "amount must be greater than zero".into(),
        ));
    }
    Ok(amount)
}
