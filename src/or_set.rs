use core::fmt;
use std::collections::BTreeSet;

use uuid::Uuid;

use crate::channel::Channel;
use crate::crdt::{Command, Crdt, CrdtCore, Value};

/// A value tagged with the unique id of the add that produced it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Element<T> {
    value: T,
    tag: Uuid,
}

impl<T> Element<T> {
    /// Tag a value with a fresh random id.
    pub fn new(value: T) -> Self {
        Self::with_tag(value, Uuid::new_v4())
    }

    /// Tag a value with a known id.
    pub fn with_tag(value: T, tag: Uuid) -> Self {
        Self { value, tag }
    }

    /// The tagged value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The add's unique id.
    pub fn tag(&self) -> Uuid {
        self.tag
    }
}

/// Commands of an [`ORSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(deserialize = "T: serde::Deserialize<'de> + Ord"))
)]
pub enum ORSetCommand<T> {
    /// One tagged add.
    Add {
        /// Target crdt.
        crdt_id: String,
        /// The new element.
        element: Element<T>,
    },
    /// Every tagged element the remover observed for one value.
    Remove {
        /// Target crdt.
        crdt_id: String,
        /// The removed elements.
        elements: BTreeSet<Element<T>>,
    },
}

impl<T: Value> Command for ORSetCommand<T> {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Add { crdt_id, .. } | Self::Remove { crdt_id, .. } => crdt_id,
        }
    }
}

#[derive(Debug)]
struct OrState<T> {
    elements: BTreeSet<Element<T>>,
    tombstone: BTreeSet<Element<T>>,
}

impl<T: Value> OrState<T> {
    fn insert(&mut self, element: &Element<T>) -> bool {
        if self.tombstone.contains(element) {
            return false;
        }
        self.elements.insert(element.clone())
    }

    fn tombstone(&mut self, removed: &BTreeSet<Element<T>>) -> bool {
        let mut changed = false;
        for element in removed {
            changed |= self.elements.remove(element);
            self.tombstone.insert(element.clone());
        }
        changed
    }
}

/// An observed-remove set (OR-Set).
///
/// Each add generates a unique tag. Remove only tombstones the tags the
/// remover has observed, so a concurrent add of the same value on another
/// replica survives. A tombstoned tag never comes back.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let s1 = Arc::new(ORSet::new("node-1", "basket"));
/// let s2 = Arc::new(ORSet::new("node-2", "basket"));
///
/// s1.add("pear");
/// s2.add("pear");
/// s2.remove(&"pear");
/// assert!(!s2.contains(&"pear"));
///
/// let _link = s1.connect(&s2);
/// s1.add("plum");
/// ```
pub struct ORSet<T: Value> {
    core: CrdtCore<OrState<T>, ORSetCommand<T>>,
}

impl<T: Value> ORSet<T> {
    /// Create an empty OR-Set with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(
                replica_id,
                crdt_id,
                OrState {
                    elements: BTreeSet::new(),
                    tombstone: BTreeSet::new(),
                },
            ),
        }
    }

    /// Add a value under a fresh tag.
    ///
    /// Always publishes, even when the value is already present: every add
    /// is an independent event.
    pub fn add(&self, value: T) {
        let crdt_id = self.core.id().to_owned();
        let element = Element::new(value);
        self.core.update(|state| {
            state.insert(&element);
            ((), Some(ORSetCommand::Add { crdt_id, element }))
        });
    }

    /// Remove every observed instance of `value`.
    ///
    /// Returns `true` if the value was present. Nothing is published
    /// otherwise.
    pub fn remove(&self, value: &T) -> bool {
        let crdt_id = self.core.id().to_owned();
        self.core.update(|state| {
            let observed: BTreeSet<Element<T>> = state
                .elements
                .iter()
                .filter(|element| element.value == *value)
                .cloned()
                .collect();
            if observed.is_empty() {
                return (false, None);
            }
            state.tombstone(&observed);
            let command = ORSetCommand::Remove {
                crdt_id,
                elements: observed,
            };
            (true, Some(command))
        })
    }

    /// Check if the set contains a value.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.core
            .read(|state| state.elements.iter().any(|element| element.value == *value))
    }

    /// Number of distinct visible values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_vec().len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.read(|state| state.elements.is_empty())
    }

    /// Snapshot of the distinct visible values in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.core.read(|state| {
            let mut values: Vec<T> = state
                .elements
                .iter()
                .map(|element| element.value.clone())
                .collect();
            values.dedup();
            values
        })
    }

    /// Snapshot of the visible tagged elements.
    #[must_use]
    pub fn elements(&self) -> BTreeSet<Element<T>> {
        self.core.read(|state| state.elements.clone())
    }
}

impl<T: Value> Crdt for ORSet<T> {
    type Command = ORSetCommand<T>;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<ORSetCommand<T>> {
        self.core.outbound()
    }

    fn apply(&self, command: &ORSetCommand<T>) -> bool {
        match command {
            ORSetCommand::Add { element, .. } => self.core.apply_with(|state| state.insert(element)),
            ORSetCommand::Remove { elements, .. } => {
                self.core.apply_with(|state| state.tombstone(elements))
            }
        }
    }
}

impl<T: Value> fmt::Debug for ORSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
