//! Per-handle collapsing buffer of pending fact operations.
//!
//! External calls and rule actions never touch memory directly. They append
//! to an [`ActionBuffer`], which keeps at most one net action per handle:
//!
//! | pending  | incoming | result                     |
//! |----------|----------|----------------------------|
//! | INSERT   | RETRACT  | cancelled (no-op)          |
//! | INSERT   | UPDATE   | INSERT of the new record   |
//! | UPDATE   | UPDATE   | latest UPDATE              |
//! | UPDATE   | RETRACT  | RETRACT                    |
//! | RETRACT  | RETRACT  | RETRACT (idempotent)       |
//! | RETRACT  | UPDATE   | rejected with a warning    |
//! | any      | INSERT   | rejected with a warning    |

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ruleweave_foundation::FactHandle;

use crate::record::FactRecord;

/// A pending operation on one handle.
#[derive(Clone, Debug)]
pub enum Action {
    /// Insert a new fact.
    Insert(FactRecord),
    /// Replace an existing fact.
    Update(FactRecord),
    /// Remove an existing fact.
    Retract,
    /// Inserted and retracted within one buffer window.
    Cancelled,
}

impl Action {
    /// Returns the action's kind, or `None` for a cancelled action.
    #[must_use]
    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            Self::Insert(_) => Some(ActionKind::Insert),
            Self::Update(_) => Some(ActionKind::Update),
            Self::Retract => Some(ActionKind::Retract),
            Self::Cancelled => None,
        }
    }

    /// Returns the record carried by an insert or update.
    #[must_use]
    pub fn record(&self) -> Option<&FactRecord> {
        match self {
            Self::Insert(r) | Self::Update(r) => Some(r),
            Self::Retract | Self::Cancelled => None,
        }
    }
}

/// Kind of a fact operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActionKind {
    /// Insert.
    Insert,
    /// Update.
    Update,
    /// Retract.
    Retract,
}

/// Per-kind operation counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActionCounts {
    /// Inserts.
    pub inserts: usize,
    /// Updates.
    pub updates: usize,
    /// Retracts.
    pub retracts: usize,
}

impl ActionCounts {
    /// Records one operation of the given kind.
    pub fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Insert => self.inserts += 1,
            ActionKind::Update => self.updates += 1,
            ActionKind::Retract => self.retracts += 1,
        }
    }

    /// Total number of operations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.retracts
    }

    /// Number of operations that add facts to memory.
    #[must_use]
    pub fn additions(&self) -> usize {
        self.inserts + self.updates
    }

    /// Adds another set of counts to this one.
    pub fn merge(&mut self, other: &Self) {
        self.inserts += other.inserts;
        self.updates += other.updates;
        self.retracts += other.retracts;
    }
}

/// Outcome of offering an action to the buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Buffered {
    /// Stored as a new entry.
    Added,
    /// Collapsed into the pending entry for the handle.
    Merged,
    /// Dropped (logged as a warning or a no-op).
    Rejected,
}

/// Collapsing buffer of pending operations, in first-touch order.
#[derive(Clone, Debug, Default)]
pub struct ActionBuffer {
    entries: Vec<(FactHandle, Action)>,
    index: HashMap<FactHandle, usize>,
}

impl ActionBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers an insert.
    pub fn insert(&mut self, handle: FactHandle, record: FactRecord) -> Buffered {
        self.add(handle, Action::Insert(record))
    }

    /// Offers an update.
    pub fn update(&mut self, handle: FactHandle, record: FactRecord) -> Buffered {
        self.add(handle, Action::Update(record))
    }

    /// Offers a retract.
    pub fn retract(&mut self, handle: FactHandle) -> Buffered {
        self.add(handle, Action::Retract)
    }

    /// Offers an action, collapsing it with any pending one for the handle.
    pub fn add(&mut self, handle: FactHandle, action: Action) -> Buffered {
        let Some(&slot) = self.index.get(&handle) else {
            self.index.insert(handle, self.entries.len());
            self.entries.push((handle, action));
            return Buffered::Added;
        };

        let pending = &mut self.entries[slot].1;
        let next = match (&*pending, action) {
            (_, Action::Insert(_)) => {
                warn!(%handle, "duplicate insert of a buffered handle, skipping");
                return Buffered::Rejected;
            }
            (_, Action::Cancelled) => return Buffered::Rejected,
            (Action::Insert(_), Action::Update(record)) => Action::Insert(record),
            (Action::Update(_), Action::Update(record)) => Action::Update(record),
            (Action::Retract | Action::Cancelled, Action::Update(_)) => {
                warn!(%handle, "update of a retracted fact, skipping");
                return Buffered::Rejected;
            }
            (Action::Insert(_), Action::Retract) => Action::Cancelled,
            (Action::Update(_), Action::Retract) => Action::Retract,
            (Action::Retract | Action::Cancelled, Action::Retract) => {
                debug!(%handle, "repeated retract ignored");
                return Buffered::Rejected;
            }
        };
        *pending = next;
        Buffered::Merged
    }

    /// Returns the pending action for a handle.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&Action> {
        self.index.get(&handle).map(|&slot| &self.entries[slot].1)
    }

    /// Returns true if at least one non-cancelled action is pending.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, a)| !matches!(a, Action::Cancelled))
    }

    /// Number of buffered entries, cancelled ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts pending actions per kind.
    #[must_use]
    pub fn counts(&self) -> ActionCounts {
        let mut counts = ActionCounts::default();
        for kind in self.entries.iter().filter_map(|(_, a)| a.kind()) {
            counts.record(kind);
        }
        counts
    }

    /// Iterates over pending entries.
    pub fn iter(&self) -> impl Iterator<Item = (FactHandle, &Action)> {
        self.entries.iter().map(|(h, a)| (*h, a))
    }

    /// Iterates mutably over the records of pending inserts and updates.
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut FactRecord> {
        self.entries.iter_mut().filter_map(|(_, a)| match a {
            Action::Insert(r) | Action::Update(r) => Some(r),
            Action::Retract | Action::Cancelled => None,
        })
    }

    /// Moves every pending entry of `other` into this buffer.
    pub fn append(&mut self, other: &mut Self) {
        for (handle, action) in other.drain() {
            self.add(handle, action);
        }
    }

    /// Removes and returns all entries, leaving the buffer empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, (FactHandle, Action)> {
        self.index.clear();
        self.entries.drain(..)
    }

    /// Discards everything.
    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }
}
