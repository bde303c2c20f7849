//! Working memory: records, versions, and bucket purging.

use std::sync::Arc;

use ruleweave_foundation::{ErrorKind, Fact, FactHandle, Mask, TypeId, Value};
use ruleweave_storage::{
    ActionCounts, FactEntry, FactRecord, FactStorage, HashFactStorage, KeyScope, WorkingMemory,
};

fn record(owner: i64) -> FactRecord {
    FactRecord::new(
        Fact::new("Car").with("owner", owner),
        vec![Value::Int(owner)].into(),
        Mask::new(),
    )
}

fn setup() -> (WorkingMemory, TypeId) {
    let mut memory = WorkingMemory::new();
    let t = TypeId::new(0);
    memory.ensure_type(t, &Arc::from("Car"));
    memory.allocate_bucket(0, t, &[0]).unwrap();
    memory.allocate_bucket(1, t, &[]).unwrap();
    (memory, t)
}

/// Stores a record and files it in every bucket of its type.
fn store(memory: &mut WorkingMemory, handle: FactHandle, record: FactRecord) -> FactEntry {
    let mut counts = ActionCounts::default();
    let values = record.values.clone();
    let types = memory.type_memory_mut(handle.type_id).unwrap();
    if types.get(handle).is_some() {
        types.replace(handle, record, &mut counts);
    } else {
        types.insert(handle, record, &mut counts);
    }
    let version = types.get(handle).map(|r| r.version).unwrap();
    let entry = FactEntry::new(handle, version);
    let addresses = memory.type_memory(handle.type_id).unwrap().buckets().to_vec();
    for address in addresses {
        memory.bucket_mut(address).unwrap().insert(&values, entry);
    }
    entry
}

#[test]
fn buckets_belong_to_their_type() {
    let (memory, t) = setup();
    assert_eq!(memory.type_memory(t).unwrap().buckets(), &[0, 1]);
    assert_eq!(memory.type_memory(t).unwrap().name(), "Car");
    assert!(matches!(
        memory.bucket(2).map(|_| ()).unwrap_err().kind,
        ErrorKind::UnallocatedBucket(2)
    ));
}

#[test]
fn allocating_without_type_is_internal_error() {
    let mut memory = WorkingMemory::new();
    let err = memory.allocate_bucket(0, TypeId::new(4), &[]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
}

#[test]
fn updated_fact_leaves_stale_entry_until_purge() {
    let (mut memory, t) = setup();
    let h = FactHandle::new(1, t);
    let first = store(&mut memory, h, record(1));
    memory.commit_buckets();

    let second = store(&mut memory, h, record(2));
    assert!(!memory.is_live(&first));
    assert!(memory.is_live(&second));
    assert_eq!(memory.bucket(0).unwrap().key_count(), 2);
    assert_eq!(memory.bucket(1).unwrap().entry_count(), 2);

    memory.commit_buckets();
    let removed = memory.purge_buckets([0, 1]);
    assert_eq!(removed, 1);
    let bucket = memory.bucket(0).unwrap();
    let keys: Vec<&Value> = bucket.iterate(KeyScope::Known).map(|r| r.value(0)).collect();
    assert_eq!(keys, vec![&Value::Int(2)]);
    assert_eq!(memory.bucket(1).unwrap().entry_count(), 1);
}

#[test]
fn removed_fact_is_purged_everywhere() {
    let (mut memory, t) = setup();
    let h = FactHandle::new(1, t);
    let entry = store(&mut memory, h, record(1));
    store(&mut memory, FactHandle::new(2, t), record(1));
    memory.commit_buckets();

    let mut counts = ActionCounts::default();
    memory.type_memory_mut(t).unwrap().remove(h, &mut counts);
    assert_eq!(counts.retracts, 1);
    assert!(!memory.is_live(&entry));
    assert!(memory.record(h).is_none());

    // unallocated addresses are skipped
    assert_eq!(memory.purge_buckets([0, 1, 7]), 0);
    assert_eq!(memory.bucket(0).unwrap().entry_count(), 1);
    assert_eq!(memory.fact_count(), 1);
}

#[test]
fn clear_keeps_allocations() {
    let (mut memory, t) = setup();
    store(&mut memory, FactHandle::new(1, t), record(1));
    memory.clear();
    assert_eq!(memory.fact_count(), 0);
    assert_eq!(memory.bucket(0).unwrap().key_count(), 0);
    assert_eq!(memory.type_memory(t).unwrap().buckets(), &[0, 1]);
}

fn boxed_storage() -> Box<dyn FactStorage> {
    Box::new(HashFactStorage::new())
}

#[test]
fn storage_factory_applies_to_new_types() {
    let mut memory = WorkingMemory::new().with_storage_factory(boxed_storage);
    let t = TypeId::new(3);
    memory.ensure_type(t, &Arc::from("Garage"));
    let mut counts = ActionCounts::default();
    memory.type_memory_mut(t).unwrap().insert(
        FactHandle::new(1, t),
        record(1),
        &mut counts,
    );
    assert_eq!(memory.types().count(), 1);
    assert_eq!(memory.fact_count(), 1);
}
