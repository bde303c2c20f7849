//! Action buffer collapse as seen by a consumer draining it.

use ruleweave_foundation::{Fact, FactHandle, Mask, TypeId};
use ruleweave_storage::{Action, ActionBuffer, ActionCounts, ActionKind, Buffered, FactRecord};

fn handle(id: u64) -> FactHandle {
    FactHandle::new(id, TypeId::new(1))
}

fn record(age: i64) -> FactRecord {
    FactRecord::new(Fact::new("Person").with("age", age), Box::new([]), Mask::new())
}

fn kinds(buffer: &ActionBuffer) -> Vec<(u64, Option<ActionKind>)> {
    buffer.iter().map(|(h, a)| (h.id, a.kind())).collect()
}

#[test]
fn mixed_sequence_collapses_per_handle() {
    let mut buffer = ActionBuffer::new();

    // 1: insert then update folds into one insert
    buffer.insert(handle(1), record(1));
    buffer.update(handle(1), record(2));
    // 2: insert then retract cancels
    buffer.insert(handle(2), record(1));
    buffer.retract(handle(2));
    // 3: update twice keeps the last
    buffer.update(handle(3), record(5));
    assert_eq!(buffer.update(handle(3), record(6)), Buffered::Merged);
    // 4: update then retract becomes retract
    buffer.update(handle(4), record(1));
    buffer.retract(handle(4));

    assert_eq!(
        kinds(&buffer),
        vec![
            (1, Some(ActionKind::Insert)),
            (2, None),
            (3, Some(ActionKind::Update)),
            (4, Some(ActionKind::Retract)),
        ]
    );
    assert_eq!(
        buffer.counts(),
        ActionCounts {
            inserts: 1,
            updates: 1,
            retracts: 1
        }
    );
    assert_eq!(
        buffer.get(handle(3)).and_then(Action::record).map(|r| r.fact.value("age")),
        Some(6.into())
    );
}

#[test]
fn cancelled_buffer_has_no_data() {
    let mut buffer = ActionBuffer::new();
    buffer.insert(handle(1), record(1));
    buffer.retract(handle(1));
    assert!(!buffer.is_empty());
    assert!(!buffer.has_data());
    assert_eq!(buffer.counts().additions(), 0);
}

#[test]
fn counts_merge() {
    let mut total = ActionCounts::default();
    total.merge(&ActionCounts {
        inserts: 2,
        updates: 0,
        retracts: 1,
    });
    total.merge(&ActionCounts {
        inserts: 0,
        updates: 3,
        retracts: 0,
    });
    assert_eq!(total.total(), 6);
    assert_eq!(total.additions(), 5);
}

#[test]
fn records_mut_reaches_buffered_writes() {
    let mut buffer = ActionBuffer::new();
    buffer.insert(handle(1), record(1));
    buffer.update(handle(2), record(2));
    buffer.retract(handle(3));

    for r in buffer.records_mut() {
        r.version = 9;
    }
    let versions: Vec<u32> = buffer
        .iter()
        .filter_map(|(_, a)| a.record())
        .map(|r| r.version)
        .collect();
    assert_eq!(versions, vec![9, 9]);
}
