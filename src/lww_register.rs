use core::cmp::Ordering;
use core::fmt;

use crate::channel::Channel;
use crate::clock::VectorClock;
use crate::crdt::{Command, Crdt, CrdtCore, Value};

/// Commands of an [`LWWRegister`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LWWRegisterCommand<T> {
    /// A write together with the writer's clock after the write.
    Set {
        /// Target crdt.
        crdt_id: String,
        /// The written value.
        value: T,
        /// Clock of the write.
        clock: VectorClock,
        /// Replica that performed the write, used as tie-breaker.
        replica_id: String,
    },
}

impl<T: Value> Command for LWWRegisterCommand<T> {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Set { crdt_id, .. } => crdt_id,
        }
    }
}

#[derive(Debug)]
struct LwwState<T> {
    value: Option<T>,
    clock: VectorClock,
    writer: Option<String>,
}

impl<T> LwwState<T> {
    fn wins(&self, clock: &VectorClock, replica_id: &str) -> bool {
        match self.clock.compare(clock) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => match &self.writer {
                Some(writer) => replica_id > writer.as_str(),
                None => true,
            },
        }
    }
}

/// A last-writer-wins register (LWW-Register).
///
/// Writes are ordered by vector clock. Concurrent writes are resolved by
/// keeping the value of the replica with the lexicographically greater id.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let r1 = Arc::new(LWWRegister::new("N_1", "greeting"));
/// let r2 = Arc::new(LWWRegister::new("N_2", "greeting"));
/// let _link = r1.connect(&r2);
///
/// r1.set("Hello");
/// r2.set("Goodbye");
/// assert_eq!(r1.get(), Some("Goodbye"));
/// assert_eq!(r2.get(), Some("Goodbye"));
/// ```
pub struct LWWRegister<T: Value> {
    core: CrdtCore<LwwState<T>, LWWRegisterCommand<T>>,
}

impl<T: Value> LWWRegister<T> {
    /// Create an unset register with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(
                replica_id,
                crdt_id,
                LwwState {
                    value: None,
                    clock: VectorClock::new(),
                    writer: None,
                },
            ),
        }
    }

    /// Write a value.
    ///
    /// Writing the current value again is a no-op and publishes nothing.
    pub fn set(&self, value: T) {
        let replica = self.core.replica_id().to_owned();
        let crdt_id = self.core.id().to_owned();
        self.core.update(|state| {
            if state.value.as_ref() == Some(&value) {
                return ((), None);
            }
            state.clock = state.clock.increment(&replica);
            state.value = Some(value.clone());
            state.writer = Some(replica.clone());
            let command = LWWRegisterCommand::Set {
                crdt_id,
                value,
                clock: state.clock.clone(),
                replica_id: replica,
            };
            ((), Some(command))
        });
    }

    /// Current value, `None` until the first write is seen.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.core.read(|state| state.value.clone())
    }

    /// Clock of the current value.
    #[must_use]
    pub fn clock(&self) -> VectorClock {
        self.core.read(|state| state.clock.clone())
    }
}

impl<T: Value> Crdt for LWWRegister<T> {
    type Command = LWWRegisterCommand<T>;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<LWWRegisterCommand<T>> {
        self.core.outbound()
    }

    fn apply(&self, command: &LWWRegisterCommand<T>) -> bool {
        match command {
            LWWRegisterCommand::Set {
                value,
                clock,
                replica_id,
                ..
            } => self.core.apply_with(|state| {
                let wins = state.wins(clock, replica_id);
                // merged even on a loss: later local writes must dominate it
                state.clock = state.clock.merge(clock);
                if !wins {
                    return false;
                }
                let changed = state.value.as_ref() != Some(value);
                state.value = Some(value.clone());
                state.writer = Some(replica_id.clone());
                changed
            }),
        }
    }
}

impl<T: Value> fmt::Debug for LWWRegister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
