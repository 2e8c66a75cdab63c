use core::fmt;
use std::collections::BTreeSet;

use crate::channel::Channel;
use crate::crdt::{Command, Crdt, CrdtCore, Value};

/// Commands of a [`USet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum USetCommand<T> {
    /// A value was added.
    Add {
        /// Target crdt.
        crdt_id: String,
        /// The added value.
        value: T,
    },
    /// A value was removed.
    Remove {
        /// Target crdt.
        crdt_id: String,
        /// The removed value.
        value: T,
    },
}

impl<T: Value> Command for USetCommand<T> {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Add { crdt_id, .. } | Self::Remove { crdt_id, .. } => crdt_id,
        }
    }
}

/// A set of unique elements.
///
/// Converges only when every value is added at most once over the lifetime
/// of the set and a remove is only issued after its add was observed. The
/// set keeps no tombstones, so a violated precondition can diverge.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let s1 = Arc::new(USet::new("node-1", "sessions"));
/// let s2 = Arc::new(USet::new("node-2", "sessions"));
/// let _link = s1.connect(&s2);
///
/// s1.add(17);
/// assert!(s2.remove(&17));
/// assert!(s1.is_empty());
/// ```
pub struct USet<T: Value> {
    core: CrdtCore<BTreeSet<T>, USetCommand<T>>,
}

impl<T: Value> USet<T> {
    /// Create an empty U-Set with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(replica_id, crdt_id, BTreeSet::new()),
        }
    }

    /// Add an element. Returns `true` if it was not present.
    pub fn add(&self, value: T) -> bool {
        let crdt_id = self.core.id().to_owned();
        self.core.update(|elements| {
            if !elements.insert(value.clone()) {
                return (false, None);
            }
            (true, Some(USetCommand::Add { crdt_id, value }))
        })
    }

    /// Remove an element. Returns `true` if it was present.
    pub fn remove(&self, value: &T) -> bool {
        let crdt_id = self.core.id().to_owned();
        self.core.update(|elements| {
            if !elements.remove(value) {
                return (false, None);
            }
            let command = USetCommand::Remove {
                crdt_id,
                value: value.clone(),
            };
            (true, Some(command))
        })
    }

    /// Check if the set contains an element.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.core.read(|elements| elements.contains(value))
    }

    /// Get the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.read(BTreeSet::len)
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the elements in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.core.read(|elements| elements.iter().cloned().collect())
    }
}

impl<T: Value> Crdt for USet<T> {
    type Command = USetCommand<T>;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<USetCommand<T>> {
        self.core.outbound()
    }

    fn apply(&self, command: &USetCommand<T>) -> bool {
        match command {
            USetCommand::Add { value, .. } => {
                self.core.apply_with(|elements| elements.insert(value.clone()))
            }
            USetCommand::Remove { value, .. } => {
                self.core.apply_with(|elements| elements.remove(value))
            }
        }
    }
}

impl<T: Value> fmt::Debug for USet<T> {
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
    fn add_remove_add() {
        let s = USet::new("a", "s");
        assert!(s.add(1));
        assert!(!s.add(1));
        assert!(s.remove(&1));
        assert!(!s.remove(&1));
        assert!(s.add(1));
        assert_eq!(s.to_vec(), vec![1]);
    }

    #[test]
    fn noop_mutations_publish_nothing() {
        let s = USet::<&str>::new("a", "s");
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);
        let _sub = s.publish(move |cmd| log.lock().push(cmd.clone()));

        s.remove(&"x");
        s.add("x");
        s.add("x");
        assert_eq!(
            *sent.lock(),
            vec![USetCommand::Add {
                crdt_id: "s".into(),
                value: "x"
            }]
        );
    }

    #[test]
    fn apply_remove_of_missing_is_noop() {
        let s = USet::<i32>::new("a", "s");
        assert!(!s.apply(&USetCommand::Remove {
            crdt_id: "s".into(),
            value: 4,
        }));
        assert!(s.is_empty());
    }

    #[test]
    fn connected_sets_follow_unique_adds() {
        let s1 = Arc::new(USet::new("a", "s"));
        let s2 = Arc::new(USet::new("b", "s"));
        let _link = s1.connect(&s2);

        s1.add("x");
        s2.add("y");
        s2.remove(&"x");
        assert_eq!(s1.to_vec(), vec!["y"]);
        assert_eq!(s2.to_vec(), vec!["y"]);
    }
}
