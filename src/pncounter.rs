use core::fmt;
use std::collections::BTreeMap;

use crate::channel::Channel;
use crate::crdt::{positive, Command, Crdt, CrdtCore};
use crate::error::Result;
use crate::gcounter::{bump, merge_counts, total, Counts};

/// Commands of a [`PNCounter`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PNCounterCommand {
    /// Both full maps after a local increment or decrement.
    Update {
        /// Target crdt.
        crdt_id: String,
        /// Per-replica increments.
        p: BTreeMap<String, u64>,
        /// Per-replica decrements.
        n: BTreeMap<String, u64>,
    },
}

impl Command for PNCounterCommand {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Update { crdt_id, .. } => crdt_id,
        }
    }
}

#[derive(Debug, Default)]
struct PnState {
    p: Counts,
    n: Counts,
}

/// A positive-negative counter (PN-Counter).
///
/// Supports both increment and decrement operations by maintaining two
/// grow-only maps: one for increments and one for decrements.
/// The value is `increments - decrements`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let c1 = Arc::new(PNCounter::new("node-1", "stock"));
/// let c2 = Arc::new(PNCounter::new("node-2", "stock"));
/// let _link = c1.connect(&c2);
///
/// c1.increment_by(2).unwrap();
/// c2.decrement().unwrap();
/// assert_eq!(c1.get(), 1);
/// assert_eq!(c2.get(), 1);
/// ```
pub struct PNCounter {
    core: CrdtCore<PnState, PNCounterCommand>,
}

impl PNCounter {
    /// Create a PN-Counter with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(replica_id, crdt_id, PnState::default()),
        }
    }

    /// Increment the counter by 1.
    pub fn increment(&self) -> Result<()> {
        self.increment_by(1)
    }

    /// Increment the counter by a positive `amount`.
    pub fn increment_by(&self, amount: u64) -> Result<()> {
        let amount = positive(amount)?;
        self.change(|state, replica| bump(&mut state.p, replica, amount))
    }

    /// Decrement the counter by 1.
    pub fn decrement(&self) -> Result<()> {
        self.decrement_by(1)
    }

    /// Decrement the counter by a positive `amount`.
    pub fn decrement_by(&self, amount: u64) -> Result<()> {
        let amount = positive(amount)?;
        self.change(|state, replica| bump(&mut state.n, replica, amount))
    }

    /// Current value (increments - decrements), clamped to the `i64` range.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.core.read(|state| {
            let value = i128::from(total(&state.p)) - i128::from(total(&state.n));
            i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
        })
    }

    fn change(&self, f: impl FnOnce(&mut PnState, &str) -> Result<()>) -> Result<()> {
        let replica = self.core.replica_id().to_owned();
        let crdt_id = self.core.id().to_owned();
        self.core.mutate(|state| {
            f(state, &replica)?;
            let command = PNCounterCommand::Update {
                crdt_id,
                p: state.p.clone(),
                n: state.n.clone(),
            };
            Ok(((), Some(command)))
        })
    }
}

impl Crdt for PNCounter {
    type Command = PNCounterCommand;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<PNCounterCommand> {
        self.core.outbound()
    }

    fn apply(&self, command: &PNCounterCommand) -> bool {
        match command {
            PNCounterCommand::Update { p, n, .. } => self.core.apply_with(|state| {
                let grew = merge_counts(&mut state.p, p);
                merge_counts(&mut state.n, n) || grew
            }),
        }
    }
}

impl fmt::Debug for PNCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
