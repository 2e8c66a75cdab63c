//! Vector clocks for causal ordering.
//!
//! - [`VectorClock`] is a partial order: two clocks may be concurrent.
//! - [`StrictVectorClock`] carries the id of the replica that owns it and
//!   breaks concurrency by comparing replica ids, which yields a total order.
//!
//! Both are immutable values. [`increment`](VectorClock::increment) and
//! [`merge`](VectorClock::merge) return new clocks.
//!
//! # Example
//!
//! ```
//! use core::cmp::Ordering;
//! use crdt_sync::clock::VectorClock;
//!
//! let base = VectorClock::new();
//! let a = base.increment("node-a");
//! let b = base.increment("node-b");
//!
//! assert_eq!(a.compare(&base), Ordering::Greater);
//! assert!(a.is_concurrent(&b));
//!
//! let merged = a.merge(&b);
//! assert!(merged.dominates(&a));
//! assert!(merged.dominates(&b));
//! ```

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use std::collections::BTreeMap;

/// Per-replica logical counters.
///
/// Absent entries count as zero and zero entries are never stored, so two
/// clocks are equal exactly when every per-replica difference is zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter recorded for `replica`.
    #[must_use]
    pub fn get(&self, replica: &str) -> u64 {
        self.entries.get(replica).copied().unwrap_or(0)
    }

    /// A copy of this clock with `replica`'s counter bumped by one.
    #[must_use]
    pub fn increment(&self, replica: &str) -> Self {
        let mut entries = self.entries.clone();
        *entries.entry(replica.to_owned()).or_insert(0) += 1;
        Self { entries }
    }

    /// Pointwise maximum of both clocks.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (replica, &count) in &other.entries {
            let entry = entries.entry(replica.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        Self { entries }
    }

    /// Compare two clocks.
    ///
    /// `Equal` is returned both for identical clocks and for concurrent ones;
    /// use [`causal_cmp`](Self::causal_cmp) to tell them apart.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.causal_cmp(other).unwrap_or(Ordering::Equal)
    }

    /// Causal comparison: `None` when the clocks are concurrent.
    #[must_use]
    pub fn causal_cmp(&self, other: &Self) -> Option<Ordering> {
        let mut result = Ordering::Equal;
        for replica in self.entries.keys().chain(
            other
                .entries
                .keys()
                .filter(|k| !self.entries.contains_key(*k)),
        ) {
            match (result, self.get(replica).cmp(&other.get(replica))) {
                (_, Ordering::Equal) => {}
                (Ordering::Equal, diff) => result = diff,
                (current, diff) if current != diff => return None,
                _ => {}
            }
        }
        Some(result)
    }

    /// `true` if `self` happened strictly after `other`.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        self.causal_cmp(other) == Some(Ordering::Greater)
    }

    /// `true` if neither clock happened before the other.
    #[must_use]
    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.causal_cmp(other).is_none()
    }

    /// Number of replicas with a non-zero counter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` for the initial clock.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(replica, counter)` pairs in replica order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(replica, count)| (replica.into(), count))
            .collect();
        Self { entries }
    }
}

/// A [`VectorClock`] owned by one replica, totally ordered.
///
/// Concurrent clocks are ordered by the owning replica id. Equality and
/// hashing only look at the counters, so the same event observed through
/// different owners compares equal.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StrictVectorClock {
    replica: String,
    clock: VectorClock,
}

impl StrictVectorClock {
    /// Create an empty clock owned by `replica`.
    pub fn new(replica: impl Into<String>) -> Self {
        Self {
            replica: replica.into(),
            clock: VectorClock::new(),
        }
    }

    /// Owning replica id.
    #[must_use]
    pub fn replica(&self) -> &str {
        &self.replica
    }

    /// The underlying counters.
    #[must_use]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// A copy with the owner's counter bumped by one.
    #[must_use]
    pub fn increment(&self) -> Self {
        Self {
            replica: self.replica.clone(),
            clock: self.clock.increment(&self.replica),
        }
    }

    /// Pointwise maximum, keeping this clock's owner.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            replica: self.replica.clone(),
            clock: self.clock.merge(&other.clock),
        }
    }

    /// Total order: causal order first, replica id for concurrent clocks.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match self.clock.causal_cmp(&other.clock) {
            Some(ordering) if ordering != Ordering::Equal => ordering,
            Some(_) => Ordering::Equal,
            None => self.replica.cmp(&other.replica),
        }
    }
}

impl PartialEq for StrictVectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.clock == other.clock
    }
}

impl Eq for StrictVectorClock {}

impl Hash for StrictVectorClock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.clock.hash(state);
    }
}
