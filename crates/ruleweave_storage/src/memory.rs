//! Per-type fact memory and the bucket table.

use std::sync::Arc;

use ruleweave_foundation::{AlphaConditionBits, Error, Fact, FactHandle, Mask, Result, TypeId, Value};

use crate::bucket::{FactEntry, KeyMemoryBucket};
use crate::buffer::{ActionCounts, ActionKind};
use crate::record::FactRecord;
use crate::storage::{FactStorage, HashFactStorage};

/// Creates the record table for a newly seen type.
pub type StorageFactory = fn() -> Box<dyn FactStorage>;

/// Versioned records of one fact type.
pub struct TypeMemory {
    type_id: TypeId,
    name: Arc<str>,
    records: Box<dyn FactStorage>,
    buckets: Vec<usize>,
}

impl TypeMemory {
    /// Creates an empty memory using the given record table.
    #[must_use]
    pub fn new(type_id: TypeId, name: Arc<str>, records: Box<dyn FactStorage>) -> Self {
        Self {
            type_id,
            name,
            records,
            buckets: Vec::new(),
        }
    }

    /// The type served by this memory.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The type's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Memory addresses of this type's buckets.
    #[must_use]
    pub fn buckets(&self) -> &[usize] {
        &self.buckets
    }

    /// Returns the record for a handle.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&FactRecord> {
        self.records.get(handle)
    }

    /// Returns true if the entry still points at the current record version.
    #[must_use]
    pub fn is_live(&self, entry: &FactEntry) -> bool {
        self.records
            .get(entry.handle)
            .is_some_and(|r| r.version == entry.version)
    }

    /// Stores a new record.
    pub fn insert(&mut self, handle: FactHandle, record: FactRecord, counts: &mut ActionCounts) {
        self.records.insert(handle, record);
        counts.record(ActionKind::Insert);
    }

    /// Replaces a record, bumping its version past the previous one.
    ///
    /// Returns the previous record, or `None` (and stores nothing) when the
    /// handle has no record.
    pub fn replace(
        &mut self,
        handle: FactHandle,
        mut record: FactRecord,
        counts: &mut ActionCounts,
    ) -> Option<FactRecord> {
        let version = self.records.get(handle)?.version.wrapping_add(1);
        record.version = version;
        counts.record(ActionKind::Update);
        self.records.insert(handle, record)
    }

    /// Removes a record.
    pub fn remove(&mut self, handle: FactHandle, counts: &mut ActionCounts) -> Option<FactRecord> {
        let removed = self.records.remove(handle);
        if removed.is_some() {
            counts.record(ActionKind::Retract);
        }
        removed
    }

    /// Recomputes the derived values and alpha bits of every record.
    ///
    /// Versions are kept, so bucket entries stay live.
    pub fn reindex(
        &mut self,
        mut derive: impl FnMut(&Fact) -> (Box<[Value]>, Mask<AlphaConditionBits>),
    ) {
        let handles: Vec<FactHandle> = self.records.iter().map(|(h, _)| h).collect();
        for handle in handles {
            if let Some(old) = self.records.remove(handle) {
                let (values, alpha_bits) = derive(&old.fact);
                self.records.insert(
                    handle,
                    FactRecord {
                        values,
                        alpha_bits,
                        ..old
                    },
                );
            }
        }
    }

    /// Iterates over all records.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (FactHandle, &FactRecord)> + '_> {
        self.records.iter()
    }

    /// Number of stored facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no fact is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for TypeMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMemory")
            .field("type_id", &self.type_id)
            .field("name", &self.name)
            .field("facts", &self.records.len())
            .field("buckets", &self.buckets)
            .finish()
    }
}

/// All fact memory of a session: per-type records and per-address buckets.
#[derive(Debug)]
pub struct WorkingMemory {
    types: Vec<Option<TypeMemory>>,
    buckets: Vec<Option<KeyMemoryBucket>>,
    factory: StorageFactory,
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingMemory {
    /// Creates an empty memory backed by [`HashFactStorage`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            buckets: Vec::new(),
            factory: HashFactStorage::boxed,
        }
    }

    /// Uses a different record table for types created from now on.
    #[must_use]
    pub fn with_storage_factory(mut self, factory: StorageFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Creates the memory for a type if it does not exist yet.
    pub fn ensure_type(&mut self, type_id: TypeId, name: &Arc<str>) {
        let idx = type_id.as_usize();
        if idx >= self.types.len() {
            self.types.resize_with(idx + 1, || None);
        }
        if self.types[idx].is_none() {
            let records = (self.factory)();
            self.types[idx] = Some(TypeMemory::new(type_id, Arc::clone(name), records));
        }
    }

    /// Allocates the bucket for a memory address.
    ///
    /// Allocating an address twice is a no-op.
    pub fn allocate_bucket(
        &mut self,
        address: usize,
        type_id: TypeId,
        key_fields: &[usize],
    ) -> Result<()> {
        if address >= self.buckets.len() {
            self.buckets.resize_with(address + 1, || None);
        }
        if self.buckets[address].is_some() {
            return Ok(());
        }
        let memory = self
            .types
            .get_mut(type_id.as_usize())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::internal(format!("no memory for {type_id:?}")))?;
        memory.buckets.push(address);
        self.buckets[address] = Some(KeyMemoryBucket::new(address, key_fields.to_vec()));
        Ok(())
    }

    /// Returns the memory of a type.
    #[must_use]
    pub fn type_memory(&self, type_id: TypeId) -> Option<&TypeMemory> {
        self.types.get(type_id.as_usize()).and_then(Option::as_ref)
    }

    /// Returns the mutable memory of a type.
    pub fn type_memory_mut(&mut self, type_id: TypeId) -> Option<&mut TypeMemory> {
        self.types.get_mut(type_id.as_usize()).and_then(Option::as_mut)
    }

    /// Iterates over all type memories.
    pub fn types(&self) -> impl Iterator<Item = &TypeMemory> {
        self.types.iter().flatten()
    }

    /// Returns the record for a handle.
    #[must_use]
    pub fn record(&self, handle: FactHandle) -> Option<&FactRecord> {
        self.type_memory(handle.type_id)?.get(handle)
    }

    /// Returns true if the entry still points at the current record version.
    #[must_use]
    pub fn is_live(&self, entry: &FactEntry) -> bool {
        self.type_memory(entry.handle.type_id)
            .is_some_and(|m| m.is_live(entry))
    }

    /// Returns an allocated bucket.
    pub fn bucket(&self, address: usize) -> Result<&KeyMemoryBucket> {
        self.buckets
            .get(address)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::unallocated_bucket(address))
    }

    /// Returns an allocated bucket mutably.
    pub fn bucket_mut(&mut self, address: usize) -> Result<&mut KeyMemoryBucket> {
        self.buckets
            .get_mut(address)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::unallocated_bucket(address))
    }

    /// Iterates over all allocated buckets.
    pub fn buckets(&self) -> impl Iterator<Item = &KeyMemoryBucket> {
        self.buckets.iter().flatten()
    }

    /// Commits every bucket that changed this cycle.
    pub fn commit_buckets(&mut self) {
        for bucket in self.buckets.iter_mut().flatten() {
            if bucket.has_changes() {
                bucket.commit();
            }
        }
    }

    /// Purges stale entries from the given buckets.
    ///
    /// Returns the number of key rows removed across them.
    pub fn purge_buckets(&mut self, addresses: impl IntoIterator<Item = usize>) -> usize {
        let mut removed = 0;
        for address in addresses {
            let Some(Some(bucket)) = self.buckets.get_mut(address) else {
                continue;
            };
            let types = &self.types;
            removed += bucket.purge(|entry| {
                types
                    .get(entry.handle.type_id.as_usize())
                    .and_then(Option::as_ref)
                    .is_some_and(|m| m.is_live(entry))
            });
        }
        removed
    }

    /// Total number of stored facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.types().map(TypeMemory::len).sum()
    }

    /// Drops every fact and every bucket entry, keeping allocations.
    pub fn clear(&mut self) {
        for memory in self.types.iter_mut().flatten() {
            memory.records.clear();
        }
        for bucket in self.buckets.iter_mut().flatten() {
            bucket.clear();
        }
    }
}
