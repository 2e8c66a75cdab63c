use core::fmt;
use std::collections::BTreeSet;

use crate::channel::Channel;
use crate::crdt::{Command, Crdt, CrdtCore, Value};

/// Commands of a [`TwoPSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TwoPSetCommand<T> {
    /// A value was added.
    Add {
        /// Target crdt.
        crdt_id: String,
        /// The added value.
        value: T,
    },
    /// A value was removed for good.
    Remove {
        /// Target crdt.
        crdt_id: String,
        /// The removed value.
        value: T,
    },
}

impl<T: Value> Command for TwoPSetCommand<T> {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Add { crdt_id, .. } | Self::Remove { crdt_id, .. } => crdt_id,
        }
    }
}

#[derive(Debug)]
struct TwoPState<T> {
    added: BTreeSet<T>,
    removed: BTreeSet<T>,
}

impl<T: Value> TwoPState<T> {
    fn add(&mut self, value: &T) -> bool {
        !self.removed.contains(value) && self.added.insert(value.clone())
    }

    fn remove(&mut self, value: &T) -> bool {
        let was_present = self.added.remove(value);
        self.removed.insert(value.clone());
        was_present
    }
}

/// A two-phase set (2P-Set).
///
/// Elements can be added and removed, but once removed, they cannot be
/// re-added: the tombstone blocks every later add, local or remote.
/// Commands are only published when they change local state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let s1 = Arc::new(TwoPSet::new("node-1", "ids"));
/// let s2 = Arc::new(TwoPSet::new("node-2", "ids"));
/// let _link = s1.connect(&s2);
///
/// s1.add("apple");
/// s2.remove(&"apple");
/// assert!(!s1.contains(&"apple"));
/// assert!(!s1.add("apple")); // tombstone wins
/// ```
pub struct TwoPSet<T: Value> {
    core: CrdtCore<TwoPState<T>, TwoPSetCommand<T>>,
}

impl<T: Value> TwoPSet<T> {
    /// Create an empty 2P-Set with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(
                replica_id,
                crdt_id,
                TwoPState {
                    added: BTreeSet::new(),
                    removed: BTreeSet::new(),
                },
            ),
        }
    }

    /// Insert an element.
    ///
    /// Returns `true` if the element was newly added. An element that was
    /// ever removed cannot be re-added and this returns `false`.
    pub fn add(&self, value: T) -> bool {
        let crdt_id = self.core.id().to_owned();
        self.core.update(|state| {
            if !state.add(&value) {
                return (false, None);
            }
            (true, Some(TwoPSetCommand::Add { crdt_id, value }))
        })
    }

    /// Remove a present element permanently.
    ///
    /// Returns `true` if the element was present and is now removed.
    pub fn remove(&self, value: &T) -> bool {
        let crdt_id = self.core.id().to_owned();
        self.core.update(|state| {
            if !state.added.contains(value) {
                return (false, None);
            }
            state.remove(value);
            let command = TwoPSetCommand::Remove {
                crdt_id,
                value: value.clone(),
            };
            (true, Some(command))
        })
    }

    /// Check if the set contains an element (added and not removed).
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.core.read(|state| state.added.contains(value))
    }

    /// Get the number of active elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.read(|state| state.added.len())
    }

    /// Check if the set has no active elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the active elements in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.core.read(|state| state.added.iter().cloned().collect())
    }
}

impl<T: Value> Crdt for TwoPSet<T> {
    type Command = TwoPSetCommand<T>;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<TwoPSetCommand<T>> {
        self.core.outbound()
    }

    fn apply(&self, command: &TwoPSetCommand<T>) -> bool {
        match command {
            TwoPSetCommand::Add { value, .. } => self.core.apply_with(|state| state.add(value)),
            TwoPSetCommand::Remove { value, .. } => self.core.apply_with(|state| {
                let newly_removed = !state.removed.contains(value);
                state.remove(value) || newly_removed
            }),
        }
    }
}

impl<T: Value> fmt::Debug for TwoPSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn new_set_is_empty() {
        let s = TwoPSet::<String>::new("a", "s");
        assert!(s.is_empty());
    }

    #[test]
    fn add_and_remove() {
        let s = TwoPSet::new("a", "s");
        assert!(s.add("a"));
        assert!(s.contains(&"a"));
        assert!(s.remove(&"a"));
        assert!(!s.contains(&"a"));
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn cannot_readd_removed_element() {
        let s = TwoPSet::new("a", "s");
        s.add("a");
        s.remove(&"a");
        assert!(!s.add("a"));
        assert!(!s.contains(&"a"));
    }

    #[test]
    fn only_state_changes_are_published() {
        let s = TwoPSet::<i32>::new("a", "s");
        let sent = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&sent);
        let _sub = s.publish(move |_| *counter.lock() += 1);

        s.add(1);
        s.add(1);
        s.remove(&2);
        s.remove(&1);
        s.remove(&1);
        s.add(1);
        assert_eq!(*sent.lock(), 2);
    }

    #[test]
    fn remote_remove_blocks_later_add() {
        let s = TwoPSet::new("a", "s");
        let remove = TwoPSetCommand::Remove {
            crdt_id: "s".into(),
            value: "x",
        };
        let add = TwoPSetCommand::Add {
            crdt_id: "s".into(),
            value: "x",
        };
        assert!(s.apply(&remove));
        assert!(!s.apply(&remove));
        assert!(!s.apply(&add));
        assert!(!s.contains(&"x"));
    }

    #[test]
    fn remove_wins_regardless_of_order() {
        let remove = TwoPSetCommand::Remove {
            crdt_id: "s".into(),
            value: 1,
        };
        let add = TwoPSetCommand::Add {
            crdt_id: "s".into(),
            value: 1,
        };

        let left = TwoPSet::new("a", "s");
        left.apply(&add);
        left.apply(&remove);

        let right = TwoPSet::new("b", "s");
        right.apply(&remove);
        right.apply(&add);

        assert_eq!(left.to_vec(), right.to_vec());
        assert!(left.is_empty());
    }
}
