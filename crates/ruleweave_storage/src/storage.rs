//! Pluggable fact storage.
//!
//! [`FactStorage`] is the capability contract a per-type record table must
//! provide. [`HashFactStorage`] is the default implementation.

use std::collections::HashMap;

use ruleweave_foundation::FactHandle;

use crate::record::FactRecord;

/// Record table for one fact type.
pub trait FactStorage: Send + Sync {
    /// Stores a record, returning the previous record for the handle.
    fn insert(&mut self, handle: FactHandle, record: FactRecord) -> Option<FactRecord>;

    /// Returns the record for a handle.
    fn get(&self, handle: FactHandle) -> Option<&FactRecord>;

    /// Removes and returns the record for a handle.
    fn remove(&mut self, handle: FactHandle) -> Option<FactRecord>;

    /// Iterates over all stored records in unspecified order.
    fn iter(&self) -> Box<dyn Iterator<Item = (FactHandle, &FactRecord)> + '_>;

    /// Returns the number of stored records.
    fn len(&self) -> usize;

    /// Returns true if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every record.
    fn clear(&mut self);
}

/// Hash-map backed [`FactStorage`].
#[derive(Debug, Clone, Default)]
pub struct HashFactStorage {
    records: HashMap<FactHandle, FactRecord>,
}

impl HashFactStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty boxed storage, usable as a storage factory.
    #[must_use]
    pub fn boxed() -> Box<dyn FactStorage> {
        Box::new(Self::new())
    }
}

impl FactStorage for HashFactStorage {
    fn insert(&mut self, handle: FactHandle, record: FactRecord) -> Option<FactRecord> {
        self.records.insert(handle, record)
    }

    fn get(&self, handle: FactHandle) -> Option<&FactRecord> {
        self.records.get(&handle)
    }

    fn remove(&mut self, handle: FactHandle) -> Option<FactRecord> {
        self.records.remove(&handle)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (FactHandle, &FactRecord)> + '_> {
        Box::new(self.records.iter().map(|(h, r)| (*h, r)))
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}
