use core::cmp::Ordering;
use core::fmt;

use crate::channel::Channel;
use crate::clock::VectorClock;
use crate::crdt::{Command, Crdt, CrdtCore, Value};

/// A value together with the clock of the write that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entry<T> {
    /// The written value.
    pub value: T,
    /// Clock of the write.
    pub clock: VectorClock,
}

/// Commands of an [`MVRegister`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MVRegisterCommand<T> {
    /// A write that supersedes every entry its clock dominates.
    Set {
        /// Target crdt.
        crdt_id: String,
        /// The new entry.
        entry: Entry<T>,
    },
}

impl<T: Value> Command for MVRegisterCommand<T> {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Set { crdt_id, .. } => crdt_id,
        }
    }
}

/// A multi-value register (MV-Register).
///
/// Concurrent writes are all kept; a read returns every value that is not
/// causally superseded. The next local write collapses them into one.
///
/// # Example
///
/// ```
/// use crdt_sync::prelude::*;
///
/// let r = MVRegister::new("node-1", "flavour");
/// r.set("strawberry");
/// r.apply(&MVRegisterCommand::Set {
///     crdt_id: "flavour".into(),
///     entry: Entry {
///         value: "pear",
///         clock: [("node-2", 1)].into_iter().collect(),
///     },
/// });
/// assert!(r.is_conflicted());
///
/// r.set("orange");
/// assert_eq!(r.get(), vec!["orange"]);
/// ```
pub struct MVRegister<T: Value> {
    core: CrdtCore<Vec<Entry<T>>, MVRegisterCommand<T>>,
}

impl<T: Value> MVRegister<T> {
    /// Create an empty register with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(replica_id, crdt_id, Vec::new()),
        }
    }

    /// Write a value, superseding every entry seen so far.
    pub fn set(&self, value: T) {
        let replica = self.core.replica_id().to_owned();
        let crdt_id = self.core.id().to_owned();
        self.core.update(|entries| {
            if let [only] = entries.as_slice() {
                if only.value == value {
                    return ((), None);
                }
            }
            let clock = entries
                .iter()
                .fold(VectorClock::new(), |acc, entry| acc.merge(&entry.clock))
                .increment(&replica);
            let entry = Entry { value, clock };
            *entries = vec![entry.clone()];
            ((), Some(MVRegisterCommand::Set { crdt_id, entry }))
        });
    }

    /// Every concurrent value, ordered by value and then by clock.
    #[must_use]
    pub fn get(&self) -> Vec<T> {
        self.core
            .read(|entries| entries.iter().map(|entry| entry.value.clone()).collect())
    }

    /// `true` when more than one concurrent value is held.
    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        self.core.read(|entries| entries.len() > 1)
    }

    /// Snapshot of the entries with their clocks.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry<T>> {
        self.core.read(Clone::clone)
    }
}

impl<T: Value> Crdt for MVRegister<T> {
    type Command = MVRegisterCommand<T>;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<MVRegisterCommand<T>> {
        self.core.outbound()
    }

    fn apply(&self, command: &MVRegisterCommand<T>) -> bool {
        match command {
            MVRegisterCommand::Set { entry, .. } => self.core.apply_with(|entries| {
                let superseded = entries.iter().any(|existing| {
                    matches!(
                        existing.clock.causal_cmp(&entry.clock),
                        Some(Ordering::Greater | Ordering::Equal)
                    )
                });
                if superseded {
                    return false;
                }
                entries.retain(|existing| existing.clock.is_concurrent(&entry.clock));
                entries.push(entry.clone());
                entries.sort_by(entry_order);
                true
            }),
        }
    }
}

/// Total order over entries, independent of arrival order.
fn entry_order<T: Ord>(a: &Entry<T>, b: &Entry<T>) -> Ordering {
    a.value
        .cmp(&b.value)
        .then_with(|| a.clock.iter().cmp(b.clock.iter()))
}

impl<T: Value> fmt::Debug for MVRegister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
