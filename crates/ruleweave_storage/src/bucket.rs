//! Key-grouped fact memory feeding beta entry nodes.
//!
//! A [`KeyMemoryBucket`] holds the facts of one memory address (a fact type,
//! an alpha address, and the set of fields the network joins on). Facts are
//! grouped by key: the values of those join fields. Joins operate on key
//! rows, not on individual facts, so a thousand facts sharing one key cost a
//! single join probe.
//!
//! Rows move through two scopes. A row first seen in the current cycle is
//! *fresh*; once the cycle commits it becomes *known*. A known row can still
//! receive fresh facts, which the agenda needs to tell apart from brand-new
//! keys.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ruleweave_foundation::{FactHandle, Value};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// Value Rows
// =============================================================================

/// One distinct key of a bucket.
///
/// Rows are shared with condition nodes through [`KeyRow`]. When the last
/// fact of a key is purged the row is flagged deleted so node stores can
/// drop tuples that reference it.
#[derive(Debug)]
pub struct ValueRow {
    id: u64,
    values: Box<[Value]>,
    deleted: AtomicBool,
}

impl ValueRow {
    fn new(id: u64, values: Box<[Value]>) -> Self {
        Self {
            id,
            values,
            deleted: AtomicBool::new(false),
        }
    }

    /// Bucket-local row id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key values, in the bucket's key field order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns a key value by position.
    #[must_use]
    pub fn value(&self, position: usize) -> &Value {
        const NIL: &Value = &Value::Nil;
        self.values.get(position).unwrap_or(NIL)
    }

    /// Returns true once the row was purged from its bucket.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }
}

/// Shared reference to a [`ValueRow`].
pub type KeyRow = Arc<ValueRow>;

/// Hash-map key that looks rows up by their values.
#[derive(Debug, Clone)]
struct RowKey(KeyRow);

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.values == other.0.values
    }
}

impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.values.hash(state);
    }
}

impl Borrow<[Value]> for RowKey {
    fn borrow(&self) -> &[Value] {
        &self.0.values
    }
}

// =============================================================================
// Fact Entries
// =============================================================================

/// A versioned reference to a fact stored under a key.
///
/// The entry is live only while the fact's record still carries `version`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactEntry {
    /// The referenced fact.
    pub handle: FactHandle,
    /// Record version observed when the entry was written.
    pub version: u32,
}

impl FactEntry {
    /// Creates an entry.
    #[must_use]
    pub const fn new(handle: FactHandle, version: u32) -> Self {
        Self { handle, version }
    }
}

#[derive(Debug)]
struct RowFacts {
    row: KeyRow,
    committed: Vec<FactEntry>,
    fresh: Vec<FactEntry>,
}

impl RowFacts {
    fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.fresh.is_empty()
    }
}

/// Which rows, or which facts of a row, to iterate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KeyScope {
    /// Rows committed in earlier cycles.
    Known,
    /// Rows first seen in the current cycle.
    Fresh,
    /// Known rows that received facts in the current cycle.
    KnownWithFreshFacts,
}

/// Which facts of a row to iterate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FactScope {
    /// Facts committed in earlier cycles.
    Committed,
    /// Facts added in the current cycle.
    Fresh,
    /// Both.
    All,
}

// =============================================================================
// Key Memory Bucket
// =============================================================================

/// Facts of one memory address, grouped by join key.
#[derive(Debug)]
pub struct KeyMemoryBucket {
    address: usize,
    key_fields: Box<[usize]>,
    rows: HashMap<RowKey, RowFacts>,
    known: Vec<KeyRow>,
    fresh: Vec<KeyRow>,
    known_touched: Vec<KeyRow>,
    next_row_id: u64,
}

impl KeyMemoryBucket {
    /// Creates an empty bucket keyed on the given value indices.
    #[must_use]
    pub fn new(address: usize, key_fields: impl Into<Box<[usize]>>) -> Self {
        Self {
            address,
            key_fields: key_fields.into(),
            rows: HashMap::new(),
            known: Vec::new(),
            fresh: Vec::new(),
            known_touched: Vec::new(),
            next_row_id: 0,
        }
    }

    /// Memory address this bucket serves.
    #[must_use]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Value indices that form the key.
    #[must_use]
    pub fn key_fields(&self) -> &[usize] {
        &self.key_fields
    }

    /// Files a fact under its key.
    ///
    /// `values` is the record's full value array. Returns true when the key
    /// was not present before.
    pub fn insert(&mut self, values: &[Value], entry: FactEntry) -> bool {
        let key: Box<[Value]> = self
            .key_fields
            .iter()
            .map(|&i| values.get(i).cloned().unwrap_or_default())
            .collect();

        if let Some(facts) = self.rows.get_mut(&*key) {
            if facts.fresh.is_empty() && !facts.committed.is_empty() {
                self.known_touched.push(Arc::clone(&facts.row));
            }
            facts.fresh.push(entry);
            return false;
        }

        let row = Arc::new(ValueRow::new(self.next_row_id, key));
        self.next_row_id += 1;
        self.fresh.push(Arc::clone(&row));
        self.rows.insert(
            RowKey(Arc::clone(&row)),
            RowFacts {
                row,
                committed: Vec::new(),
                fresh: vec![entry],
            },
        );
        true
    }

    /// Iterates over the rows of a scope.
    pub fn iterate(&self, scope: KeyScope) -> std::slice::Iter<'_, KeyRow> {
        match scope {
            KeyScope::Known => self.known.iter(),
            KeyScope::Fresh => self.fresh.iter(),
            KeyScope::KnownWithFreshFacts => self.known_touched.iter(),
        }
    }

    /// Iterates over the fact entries filed under a row.
    pub fn facts<'a>(
        &'a self,
        row: &ValueRow,
        scope: FactScope,
    ) -> impl Iterator<Item = &'a FactEntry> + use<'a> {
        let empty: &[FactEntry] = &[];
        let (committed, fresh) = match self.rows.get(row.values()) {
            Some(f) => match scope {
                FactScope::Committed => (f.committed.as_slice(), empty),
                FactScope::Fresh => (empty, f.fresh.as_slice()),
                FactScope::All => (f.committed.as_slice(), f.fresh.as_slice()),
            },
            None => (empty, empty),
        };
        committed.iter().chain(fresh)
    }

    /// Returns true if the row received facts in the current cycle.
    #[must_use]
    pub fn has_fresh_facts(&self, row: &ValueRow) -> bool {
        self.rows
            .get(row.values())
            .is_some_and(|f| !f.fresh.is_empty())
    }

    /// Returns true if anything was filed since the last commit.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.fresh.is_empty() || !self.known_touched.is_empty()
    }

    /// Promotes fresh rows and fresh facts to known/committed.
    pub fn commit(&mut self) {
        for row in self.fresh.drain(..) {
            if let Some(facts) = self.rows.get_mut(row.values()) {
                let fresh = std::mem::take(&mut facts.fresh);
                facts.committed.extend(fresh);
            }
            self.known.push(row);
        }
        for row in self.known_touched.drain(..) {
            if let Some(facts) = self.rows.get_mut(row.values()) {
                let fresh = std::mem::take(&mut facts.fresh);
                facts.committed.extend(fresh);
            }
        }
    }

    /// Drops entries the predicate reports as dead, and keys left empty.
    ///
    /// Returns the number of rows removed. Removed rows are flagged deleted.
    pub fn purge(&mut self, mut is_live: impl FnMut(&FactEntry) -> bool) -> usize {
        let mut removed = 0;
        self.rows.retain(|_, facts| {
            facts.committed.retain(&mut is_live);
            facts.fresh.retain(&mut is_live);
            if facts.is_empty() {
                facts.row.mark_deleted();
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.known.retain(|r| !r.is_deleted());
            self.fresh.retain(|r| !r.is_deleted());
            self.known_touched.retain(|r| !r.is_deleted());
        }
        removed
    }

    /// Removes every row, flagging each deleted.
    pub fn clear(&mut self) {
        for facts in self.rows.values() {
            facts.row.mark_deleted();
        }
        self.rows.clear();
        self.known.clear();
        self.fresh.clear();
        self.known_touched.clear();
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of fact entries, live or stale.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.rows
            .values()
            .map(|f| f.committed.len() + f.fresh.len())
            .sum()
    }
}
