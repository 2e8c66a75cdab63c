use core::fmt;
use std::collections::BTreeMap;

use crate::channel::Channel;
use crate::crdt::{positive, Command, Crdt, CrdtCore};
use crate::error::{CrdtError, Result};

/// Per-replica accumulated amounts, merged by entry-wise maximum.
pub(crate) type Counts = BTreeMap<String, u64>;

pub(crate) fn merge_counts(into: &mut Counts, from: &Counts) -> bool {
    let mut changed = false;
    for (replica, &count) in from {
        let entry = into.entry(replica.clone()).or_insert(0);
        if count > *entry {
            *entry = count;
            changed = true;
        }
    }
    changed
}

/// Add `amount` to `replica`'s entry. Leaves `counts` untouched on overflow.
pub(crate) fn bump(counts: &mut Counts, replica: &str, amount: u64) -> Result<()> {
    let current = counts.get(replica).copied().unwrap_or(0);
    let next = current.checked_add(amount).ok_or_else(|| {
        CrdtError::InvalidArgument(format!("count for {replica} would overflow"))
    })?;
    counts.insert(replica.to_owned(), next);
    Ok(())
}

/// Sum of every entry, saturating at `u64::MAX`.
pub(crate) fn total(counts: &Counts) -> u64 {
    counts
        .values()
        .fold(0u64, |sum, &count| sum.saturating_add(count))
}

/// Commands of a [`GCounter`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GCounterCommand {
    /// Full per-replica map after a local increment.
    Update {
        /// Target crdt.
        crdt_id: String,
        /// Every known replica entry, not only the delta.
        entries: BTreeMap<String, u64>,
    },
}

impl Command for GCounterCommand {
    fn crdt_id(&self) -> &str {
        match self {
            Self::Update { crdt_id, .. } => crdt_id,
        }
    }
}

/// A grow-only counter (G-Counter).
///
/// Each replica maintains its own count. The total value is the sum of all
/// replica counts. Every increment ships the whole map, so a lost command is
/// healed by the next one.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crdt_sync::prelude::*;
///
/// let c1 = Arc::new(GCounter::new("node-1", "hits"));
/// let c2 = Arc::new(GCounter::new("node-2", "hits"));
/// let link = c1.connect(&c2);
///
/// c1.increment_by(2).unwrap();
/// c2.increment().unwrap();
///
/// assert_eq!(c1.get(), 3);
/// assert_eq!(c2.get(), 3);
/// link.disconnect();
/// ```
pub struct GCounter {
    core: CrdtCore<Counts, GCounterCommand>,
}

impl GCounter {
    /// Create a G-Counter with id `crdt_id` living on `replica_id`.
    pub fn new(replica_id: impl Into<String>, crdt_id: impl Into<String>) -> Self {
        Self {
            core: CrdtCore::new(replica_id, crdt_id, Counts::new()),
        }
    }

    /// Increment this replica's count by 1.
    pub fn increment(&self) -> Result<()> {
        self.increment_by(1)
    }

    /// Increment this replica's count by `amount`, which must be positive.
    pub fn increment_by(&self, amount: u64) -> Result<()> {
        let amount = positive(amount)?;
        let replica = self.core.replica_id().to_owned();
        let crdt_id = self.core.id().to_owned();
        self.core.mutate(|counts| {
            bump(counts, &replica, amount)?;
            let command = GCounterCommand::Update {
                crdt_id,
                entries: counts.clone(),
            };
            Ok(((), Some(command)))
        })
    }

    /// Total across all replicas, saturating at `u64::MAX`.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.core.read(total)
    }

    /// Count contributed by one replica.
    #[must_use]
    pub fn count_for(&self, replica: &str) -> u64 {
        self.core
            .read(|counts| counts.get(replica).copied().unwrap_or(0))
    }
}

impl Crdt for GCounter {
    type Command = GCounterCommand;

    fn id(&self) -> &str {
        self.core.id()
    }

    fn replica_id(&self) -> &str {
        self.core.replica_id()
    }

    fn outbound(&self) -> &Channel<GCounterCommand> {
        self.core.outbound()
    }

    fn apply(&self, command: &GCounterCommand) -> bool {
        match command {
            GCounterCommand::Update { entries, .. } => {
                self.core.apply_with(|counts| merge_counts(counts, entries))
            }
        }
    }
}

impl fmt::Debug for GCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
