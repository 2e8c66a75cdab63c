use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;

use crate::channel::Channel;
use crate::clock::StrictVectorClock;
use crate::crdt::{Command, Crdt, CrdtCore, Value};
use crate::error::{CrdtError, Result};

/// Commands of an [`Rga`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RgaCommand<T> {
    /// Insert `value` to the right of the vertex identified by `anchor`.
    AddRight {
        /// Target crdt.
        crdt_id: String,
        /// Clock of the left neighbour at insertion time. The empty clock
        /// names the head.
        anchor: StrictVectorClock,
        /// The inserted value.
        value: T,
        /// Clock identifying the new vertex.
        clock: StrictVectorClock,
    },
    /// Tombstone the vertex identified by `clock`.
    Remove {
        /// Target crdt.
        crdt_id: String,
        /// Clock of the removed vertex.
        clock: StrictVectorClock,
    },
}

impl<T: Value> Command for RgaCommand<T> {
    fn crdt_id(&self) -> &str {
        match self {
            Self::AddRight { crdt_id, .. } | Self::Remove { crdt_id, .. } => crdt_id,
        }
    }
}

#[derive(Debug)]
struct Vertex<T> {
    /// `None` only for the head.
    value: Option<T>,
    clock: StrictVectorClock,
    removed: bool,
    /// Arena index of the right neighbour.
    next: Option<usize>,
}

/// Vertices live in an arena and are never dropped; index 0 is the head.
#[derive(Debug)]
struct RgaState<T> {
    vertices: Vec<Vertex<T>>,
    index: HashMap<StrictVectorClock, usize>,
    clock: StrictVectorClock,
    size: usize,
}

const HEAD: usize = 0;

/// Total order of insert clocks: counter sums, then owning replica id.
///
/// Agrees with causal order and is transitive across causally related and
/// concurrent clocks alike.
fn insertion_order(a: &StrictVectorClock, b: &StrictVectorClock) -> Ordering {
    let weight = |c: &StrictVectorClock| c.clock().iter().map(|(_, n)| u128::from(n)).sum::<u128>();
    weight(a)
        .cmp(&weight(b))
        .then_with(|| a.replica().cmp(b.replica()))
}

impl<T: Value> RgaState<T> {
    fn new(replica: &str) -> Self {
        let clock = StrictVectorClock::new(replica);
        let mut index = HashMap::new();
        index.insert(clock.clone(), HEAD);
        Self {
            vertices: vec![Vertex {
                value: None,
                clock: clock.clone(),
                removed: false,
                next: None,
            }],
            index,
            clock,
            size: 0,
        }
    }

    /// Arena indices of the live vertices, in sequence order.
    fn live(&self) -> impl Iterator<Item = usize> + '_ {
        let mut cursor = self.vertices[HEAD].next;
        core::iter::from_fn(move || loop {
            let at = cursor?;
            cursor = self.vertices[at].next;
            if !self.vertices[at].removed {
                return Some(at);
            }
        })
    }

    fn position(&self, index: usize) -> Result<usize> {
        self.live()
            .nth(index)
            .ok_or(CrdtError::IndexOutOfBounds {
                index,
                len: self.size,
            })
    }

    fn value_at(&self, index: usize) -> Result<T> {
        let at = self.position(index)?;
        self.vertices[at]
            .value
            .clone()
            .ok_or(CrdtError::IndexOutOfBounds {
                index,
                len: self.size,
            })
    }

    /// Splice a new vertex right of `anchor`, after every successor whose
    /// clock orders above the new one.
    fn add_right(&mut self, anchor: usize, value: T, clock: StrictVectorClock) {
        let mut left = anchor;
        while let Some(next) = self.vertices[left].next {
            if insertion_order(&self.vertices[next].clock, &clock) != Ordering::Greater {
                break;
            }
            left = next;
        }
        let at = self.vertices.len();
        let next = self.vertices[left].next;
        self.vertices.push(Vertex {
            value: Some(value),
            clock: clock.clone(),
            removed: false,
            next,
        });
        self.vertices[left].next = Some(at);
        self.index.insert(clock, at);
        self.size += 1;
    }

    /// Insert a locally produced value right of `anchor` under a fresh clock.
    fn insert_local(&mut self, crdt_id: String, anchor: usize, value: T) -> RgaCommand<T> {
        let clock = self.clock.increment();
        self.clock = clock.clone();
        let anchor_clock = self.vertices[anchor].clock.clone();
        self.add_right(anchor, value.clone(), clock.clone());
        RgaCommand::AddRight {
            crdt_id,
            anchor: anchor_clock,
            value,
            clock,
        }
    }

    fn tombstone(&mut self, at: usize) -> bool {
        let vertex = &mut self.vertices[at];
        if vertex.removed {
            return false;
        }
        vertex.removed = true;
        self.size -= 1;
        true
    }
}

/// A Replicated Growable Array (RGA), an ordered sequence CRDT.
///
/// Every insert names its left neighbour (the anchor) and carries a
/// [`StrictVectorClock`]. Concurrent inserts at the same anchor are ordered
/// by insertion order (counter sum, then replica id), the later insert
/// ending up closer to the anchor, so all replicas converge to the same
/// sequence whatever the delivery order. Removed elements stay in the
/// structure as tombstones.
///
/// [`Crdt::apply`] drops a command whose target vertex is still unknown;
/// [`Crdt::is_ready`] tells whether it would be. A [`Replica`](crate::Replica)
/// holds such commands back until they are ready.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let a = Arc::new(Rga::new("node-1", "doc"));
/// let b = Arc::new(Rga::new("node-2", "doc"));
/// let _link = a.connect(&b);
///
/// a.push('H');
/// b.push('i');
/// b.add(0, '>').unwrap();
/// assert_eq!(a.to_vec(), vec!['>', 'H', 'i']);
///
/// assert_eq!(a.remove(0).unwrap(), '>');
/// assert_eq!(b.to_vec(), vec!['H', 'i']);
/// ```
pub struct Rga<T: Value> {
    core: CrdtCore<RgaState<T>, RgaCommand<T>>,
}

impl<T: Value> Rga<T> {
    /// Create an empty sequence with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        let replica_id = replica_id.into();
        let state = RgaState::new(&replica_id);
        Self {
            core: CrdtCore::new(replica_id, crdt_id, state),
        }
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Result<T> {
        self.core.read(|state| state.value_at(index))
    }

    /// Insert `value` so that it ends up at `index`.
    ///
    /// Fails with [`CrdtError::IndexOutOfBounds`] when `index > len()`.
    pub fn add(&self, index: usize, value: T) -> Result<()> {
        let crdt_id = self.core.id().to_owned();
        self.core.mutate(|state| {
            if index > state.size {
                return Err(CrdtError::IndexOutOfBounds {
                    index,
                    len: state.size,
                });
            }
            let anchor = match index {
                0 => HEAD,
                _ => state.position(index - 1)?,
            };
            Ok(((), Some(state.insert_local(crdt_id, anchor, value))))
        })
    }

    /// Append `value` at the end.
    pub fn push(&self, value: T) {
        let crdt_id = self.core.id().to_owned();
        self.core.update(|state| {
            let anchor = state.live().last().unwrap_or(HEAD);
            ((), Some(state.insert_local(crdt_id, anchor, value)))
        });
    }

    /// Remove the element at `index` and return it.
    pub fn remove(&self, index: usize) -> Result<T> {
        let crdt_id = self.core.id().to_owned();
        self.core.mutate(|state| {
            let at = state.position(index)?;
            let value = state.value_at(index)?;
            state.tombstone(at);
            let command = RgaCommand::Remove {
                crdt_id,
                clock: state.vertices[at].clock.clone(),
            };
            Ok((value, Some(command)))
        })
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.read(|state| state.size)
    }

    /// `true` if no live element is left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live elements in sequence order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.core.read(|state| {
            state
                .live()
                .filter_map(|at| state.vertices[at].value.clone())
                .collect()
        })
    }
}

impl<T: Value> Crdt for Rga<T> {
    type Command = RgaCommand<T>;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<RgaCommand<T>> {
        self.core.outbound()
    }

    fn is_ready(&self, command: &RgaCommand<T>) -> bool {
        self.core.read(|state| match command {
            RgaCommand::AddRight { anchor, clock, .. } => {
                state.index.contains_key(anchor) || state.index.contains_key(clock)
            }
            RgaCommand::Remove { clock, .. } => state.index.contains_key(clock),
        })
    }

    fn apply(&self, command: &RgaCommand<T>) -> bool {
        match command {
            RgaCommand::AddRight {
                anchor,
                value,
                clock,
                ..
            } => self.core.apply_with(|state| {
                state.clock = state.clock.merge(clock);
                if state.index.contains_key(clock) {
                    return false;
                }
                let Some(&anchor) = state.index.get(anchor) else {
                    tracing::trace!(?clock, "dropping insert with unknown anchor");
                    return false;
                };
                state.add_right(anchor, value.clone(), clock.clone());
                true
            }),
            RgaCommand::Remove { clock, .. } => self.core.apply_with(|state| {
                match state.index.get(clock).copied() {
                    Some(at) if at != HEAD => state.tombstone(at),
                    _ => {
                        tracing::trace!(?clock, "dropping remove of unknown vertex");
                        false
                    }
                }
            }),
        }
    }
}

impl<T: Value> fmt::Debug for Rga<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
