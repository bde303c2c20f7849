//! Key memory bucket lifecycle across cycles.

use ruleweave_foundation::{FactHandle, TypeId, Value};
use ruleweave_storage::{FactEntry, FactScope, KeyMemoryBucket, KeyScope};

fn entry(id: u64) -> FactEntry {
    FactEntry::new(FactHandle::new(id, TypeId::new(0)), 0)
}

fn values(owner: i64) -> Vec<Value> {
    vec![Value::from("ignored"), Value::Int(owner)]
}

fn ids<'a>(entries: impl Iterator<Item = &'a FactEntry>) -> Vec<u64> {
    entries.map(|e| e.handle.id).collect()
}

// =============================================================================
// Scopes
// =============================================================================

#[test]
fn fresh_rows_become_known_after_commit() {
    let mut bucket = KeyMemoryBucket::new(0, vec![1]);
    assert!(bucket.insert(&values(1), entry(1)));
    assert!(!bucket.insert(&values(1), entry(2)));
    assert!(bucket.insert(&values(2), entry(3)));

    assert_eq!(bucket.iterate(KeyScope::Fresh).count(), 2);
    assert_eq!(bucket.iterate(KeyScope::Known).count(), 0);

    bucket.commit();
    assert!(!bucket.has_changes());
    assert_eq!(bucket.iterate(KeyScope::Fresh).count(), 0);
    let known: Vec<&Value> = bucket.iterate(KeyScope::Known).map(|r| r.value(0)).collect();
    assert_eq!(known, vec![&Value::Int(1), &Value::Int(2)]);
}

#[test]
fn known_rows_track_fresh_facts() {
    let mut bucket = KeyMemoryBucket::new(0, vec![1]);
    bucket.insert(&values(1), entry(1));
    bucket.insert(&values(2), entry(2));
    bucket.commit();

    bucket.insert(&values(1), entry(3));
    bucket.insert(&values(1), entry(4));

    let touched: Vec<_> = bucket.iterate(KeyScope::KnownWithFreshFacts).collect();
    assert_eq!(touched.len(), 1);
    let row = touched[0];
    assert!(bucket.has_fresh_facts(row));
    assert_eq!(ids(bucket.facts(row, FactScope::Committed)), vec![1]);
    assert_eq!(ids(bucket.facts(row, FactScope::Fresh)), vec![3, 4]);
    assert_eq!(ids(bucket.facts(row, FactScope::All)), vec![1, 3, 4]);

    bucket.commit();
    let row = bucket.iterate(KeyScope::Known).next().cloned();
    let row = row.expect("row survives commit");
    assert!(!bucket.has_fresh_facts(&row));
    assert_eq!(ids(bucket.facts(&row, FactScope::Committed)), vec![1, 3, 4]);
}

#[test]
fn missing_key_values_file_under_nil() {
    let mut bucket = KeyMemoryBucket::new(0, vec![5]);
    bucket.insert(&[Value::Int(1)], entry(1));
    let row = bucket.iterate(KeyScope::Fresh).next().cloned();
    assert_eq!(row.map(|r| r.value(0).clone()), Some(Value::Nil));
}

// =============================================================================
// Purge
// =============================================================================

#[test]
fn purge_flags_emptied_rows() {
    let mut bucket = KeyMemoryBucket::new(0, vec![1]);
    bucket.insert(&values(1), entry(1));
    bucket.insert(&values(2), entry(2));
    bucket.insert(&values(2), entry(3));
    bucket.commit();

    let rows: Vec<_> = bucket.iterate(KeyScope::Known).cloned().collect();
    let removed = bucket.purge(|e| e.handle.id != 1 && e.handle.id != 2);

    assert_eq!(removed, 1);
    assert!(rows[0].is_deleted());
    assert!(!rows[1].is_deleted());
    assert_eq!(bucket.key_count(), 1);
    assert_eq!(bucket.entry_count(), 1);
    assert_eq!(bucket.iterate(KeyScope::Known).count(), 1);
}

#[test]
fn reinserted_key_gets_a_new_row() {
    let mut bucket = KeyMemoryBucket::new(0, vec![1]);
    bucket.insert(&values(1), entry(1));
    bucket.commit();
    let old = bucket.iterate(KeyScope::Known).next().cloned();
    bucket.purge(|_| false);

    assert!(bucket.insert(&values(1), entry(2)));
    let new = bucket.iterate(KeyScope::Fresh).next().cloned();
    assert_ne!(old.map(|r| r.id()), new.map(|r| r.id()));
}

#[test]
fn clear_drops_everything() {
    let mut bucket = KeyMemoryBucket::new(3, vec![1]);
    bucket.insert(&values(1), entry(1));
    bucket.commit();
    bucket.insert(&values(2), entry(2));
    let rows: Vec<_> = bucket
        .iterate(KeyScope::Known)
        .chain(bucket.iterate(KeyScope::Fresh))
        .cloned()
        .collect();

    bucket.clear();
    assert!(rows.iter().all(|r| r.is_deleted()));
    assert_eq!(bucket.key_count(), 0);
    assert!(!bucket.has_changes());
    assert_eq!(bucket.address(), 3);
}
