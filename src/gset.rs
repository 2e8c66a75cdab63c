use core::fmt;
use std::collections::BTreeSet;

use crate::channel::Channel;
use crate::crdt::{Command, Crdt, CrdtCore, Value};
use crate::error::{CrdtError, Result};

/// Commands of a [`GSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GSetCommand<T> {
    /// A value was added.
    Add {
        /// Target crdt.
        crdt_id: String,
        /// The added value.
        value: T,
    },
}

impl<T: Value> Command for GSetCommand<T> {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Add { crdt_id, .. } => crdt_id,
        }
    }
}

/// A grow-only set (G-Set).
///
/// Elements can be added but never removed. Applying a command is simply
/// the union of both sets. This is the simplest set CRDT.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let s1 = Arc::new(GSet::new("node-1", "fruit"));
/// let s2 = Arc::new(GSet::new("node-2", "fruit"));
/// let _link = s1.connect(&s2);
///
/// s1.add("apple");
/// s2.add("cherry");
/// assert_eq!(s1.len(), 2);
/// assert!(s2.contains(&"apple"));
/// assert!(s1.remove(&"apple").is_err());
/// ```
pub struct GSet<T: Value> {
    core: CrdtCore<BTreeSet<T>, GSetCommand<T>>,
}

impl<T: Value> GSet<T> {
    /// Create an empty G-Set with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(replica_id, crdt_id, BTreeSet::new()),
        }
    }

    /// Add an element.
    ///
    /// Returns `true` if the element was newly inserted. Re-adding a
    /// present element publishes nothing.
    pub fn add(&self, value: T) -> bool {
        let crdt_id = self.core.id().to_owned();
        self.core.update(|elements| {
            if !elements.insert(value.clone()) {
                return (false, None);
            }
            (true, Some(GSetCommand::Add { crdt_id, value }))
        })
    }

    /// Always fails: a grow-only set cannot remove elements.
    pub fn remove(&self, _value: &T) -> Result<bool> {
        Err(CrdtError::Unsupported("a grow-only set cannot remove elements"))
    }

    /// Check if the set contains an element.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.core.read(|elements| elements.contains(value))
    }

    /// Get the number of elements in the set.
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

impl<T: Value> Crdt for GSet<T> {
    type Command = GSetCommand<T>;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<GSetCommand<T>> {
        self.core.outbound()
    }

    fn apply(&self, command: &GSetCommand<T>) -> bool {
        match command {
            GSetCommand::Add { value, .. } => {
                self.core.apply_with(|elements| elements.insert(value.clone()))
            }
        }
    }
}

impl<T: Value> fmt::Debug for GSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
