//! Replica-level envelopes: one command type and one handle type that
//! cover every CRDT a [`Replica`](crate::Replica) can host.

use std::sync::Arc;

use crate::channel::Subscription;
use crate::crdt::{Command, Crdt, Value};
use crate::registry::CrdtType;
use crate::{
    GCounter, GCounterCommand, GSet, GSetCommand, LWWRegister, LWWRegisterCommand, MVRegister,
    MVRegisterCommand, ORSet, ORSetCommand, PNCounter, PNCounterCommand, Rga, RgaCommand, TwoPSet,
    TwoPSetCommand, USet, USetCommand,
};

/// A CRDT type a replica can host and instantiate from an announce.
pub trait Replicated<T: Value>: Crdt + Sized {
    /// Tag sent in announce commands.
    const CRDT_TYPE: CrdtType;

    /// A fresh instance with id `crdt_id` living on `replica_id`.
    fn create(replica_id: &str, crdt_id: &str) -> Self;

    /// Erase the concrete type.
    fn wrap(handle: Arc<Self>) -> AnyCrdt<T>;

    /// Recover the concrete type, `None` if `any` holds another type.
    fn unwrap(any: &AnyCrdt<T>) -> Option<Arc<Self>>;
}

macro_rules! replica_kinds {
    ($($(#[$doc:meta])* $variant:ident($crdt:ty, $command:ty);)*) => {
        /// Every command a replica records, forwards and receives.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(
            feature = "serde",
            serde(bound(deserialize = "T: serde::Deserialize<'de> + Ord"))
        )]
        pub enum ReplicaCommand<T> {
            /// Precedes every other command of a CRDT so peers can
            /// instantiate it.
            Announce {
                /// Type to instantiate.
                crdt_type: CrdtType,
                /// Id of the new CRDT.
                crdt_id: String,
            },
            $($(#[$doc])* $variant($command),)*
        }

        impl<T: Value> Command for ReplicaCommand<T> {
            fn crdt_id(&self) -> &str {
                match self {
                    Self::Announce { crdt_id, .. } => crdt_id,
                    $(Self::$variant(command) => command.crdt_id(),)*
                }
            }
        }

        /// Type-erased handle to a CRDT hosted by a replica.
        #[derive(Debug, Clone)]
        pub enum AnyCrdt<T: Value> {
            $($(#[$doc])* $variant(Arc<$crdt>),)*
        }

        impl<T: Value> AnyCrdt<T> {
            /// Type tag of the wrapped CRDT.
            #[must_use]
            pub fn crdt_type(&self) -> CrdtType {
                match self {
                    $(Self::$variant(_) => CrdtType::$variant,)*
                }
            }

            /// Id of the wrapped CRDT.
            #[must_use]
            pub fn id(&self) -> &str {
                match self {
                    $(Self::$variant(crdt) => crdt.id(),)*
                }
            }

            /// Apply `command` if it belongs to this CRDT type.
            ///
            /// Announces and commands of another type are ignored.
            pub fn apply(&self, command: &ReplicaCommand<T>) -> bool {
                match (self, command) {
                    $((Self::$variant(crdt), ReplicaCommand::$variant(command)) => {
                        crdt.apply(command)
                    })*
                    _ => false,
                }
            }

            /// `false` while a command `command` depends on has not been
            /// applied here.
            pub fn is_ready(&self, command: &ReplicaCommand<T>) -> bool {
                match (self, command) {
                    $((Self::$variant(crdt), ReplicaCommand::$variant(command)) => {
                        crdt.is_ready(command)
                    })*
                    _ => true,
                }
            }

            /// Observe the commands the wrapped CRDT publishes, wrapped.
            pub fn publish<F>(&self, consumer: F) -> Subscription
            where
                F: Fn(ReplicaCommand<T>) + Send + Sync + 'static,
            {
                match self {
                    $(Self::$variant(crdt) => crdt.publish(move |command| {
                        consumer(ReplicaCommand::$variant(command.clone()))
                    }),)*
                }
            }
        }

        $(impl<T: Value> Replicated<T> for $crdt {
            const CRDT_TYPE: CrdtType = CrdtType::$variant;

            fn create(replica_id: &str, crdt_id: &str) -> Self {
                <$crdt>::new(replica_id, crdt_id)
            }

            fn wrap(handle: Arc<Self>) -> AnyCrdt<T> {
                AnyCrdt::$variant(handle)
            }

            fn unwrap(any: &AnyCrdt<T>) -> Option<Arc<Self>> {
                match any {
                    AnyCrdt::$variant(handle) => Some(Arc::clone(handle)),
                    _ => None,
                }
            }
        })*
    };
}

replica_kinds! {
    /// Grow-only counter.
    GCounter(GCounter, GCounterCommand);
    /// Positive-negative counter.
    PNCounter(PNCounter, PNCounterCommand);
    /// Grow-only set.
    GSet(GSet<T>, GSetCommand<T>);
    /// Two-phase set.
    TwoPSet(TwoPSet<T>, TwoPSetCommand<T>);
    /// Unique-element set.
    USet(USet<T>, USetCommand<T>);
    /// Observed-remove set.
    ORSet(ORSet<T>, ORSetCommand<T>);
    /// Last-writer-wins register.
    LWWRegister(LWWRegister<T>, LWWRegisterCommand<T>);
    /// Multi-value register.
    MVRegister(MVRegister<T>, MVRegisterCommand<T>);
    /// Replicated growable array.
    Rga(Rga<T>, RgaCommand<T>);
}
