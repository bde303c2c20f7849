//! End-to-end fire scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ruleweave_engine::{Condition, Knowledge, RuleBuilder, RuleDefinition, Session, SessionConfig};
use ruleweave_foundation::{Error, ErrorKind, Fact, FactHandle, SemanticLimit, TypeId, Value};

use crate::common::{car, init_tracing, ownership, person};

// =============================================================================
// Helper Functions
// =============================================================================

fn session_with(rules: Vec<RuleDefinition>) -> Session {
    let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
    for rule in &rules {
        knowledge.add_rule(rule).unwrap();
    }
    knowledge.new_session().unwrap()
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn owner_gets_flagged_once() {
    init_tracing();
    let rule = RuleBuilder::new("R1")
        .for_each("$p", "Person")
        .for_each("$c", "Car")
        .when(Condition::eq("$p.id", "$c.owner"))
        .when(Condition::is_true("$p.hasCar").not())
        .execute(|ctx| {
            let person = ctx.get("$p")?.clone().with("hasCar", true);
            ctx.update_fact("$p", person)
        });
    let mut session = session_with(vec![rule]);

    let p = session.insert(person(1)).unwrap().unwrap();
    session.insert(car(1)).unwrap();
    let report = session.fire().unwrap();

    assert_eq!(report.activations_of("R1"), 1);
    assert_eq!(report.actions.inserts, 2);
    assert_eq!(report.actions.updates, 1);
    assert_eq!(session.get_fact(p).unwrap().value("hasCar"), true.into());

    // the flagged person no longer matches
    assert_eq!(session.fire().unwrap().activations, 0);
    session.insert(car(1)).unwrap();
    assert_eq!(session.fire().unwrap().activations, 0);
}

#[test]
fn three_by_three_pairs_by_key() {
    let orders: [&[usize]; 3] = [&[0, 1, 2, 3, 4, 5], &[5, 4, 3, 2, 1, 0], &[3, 0, 4, 1, 5, 2]];
    let facts = [person(1), person(2), person(3), car(3), car(2), car(1)];

    for order in orders {
        let mut session = session_with(vec![ownership("owns")]);
        for &i in order {
            session.insert(facts[i].clone()).unwrap();
        }
        assert_eq!(session.fire().unwrap().activations_of("owns"), 3);
    }
}

#[test]
fn facts_split_across_fires_pair_once() {
    let mut session = session_with(vec![ownership("owns")]);
    let mut total = 0;
    for id in 1..=3 {
        session.insert(person(id)).unwrap();
        total += session.fire().unwrap().activations;
    }
    for id in 1..=3 {
        session.insert(car(id)).unwrap();
        session.insert(car(id + 10)).unwrap();
        total += session.fire().unwrap().activations;
    }
    assert_eq!(total, 3);
}

#[test]
fn derived_facts_chain_through_rules() {
    let greeted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&greeted);

    let adult = RuleBuilder::new("adult")
        .for_each("$p", "Person")
        .when(Condition::ge_value("$p.age", 18))
        .execute(|ctx| {
            let id = ctx.get("$p")?.value("id");
            ctx.insert(Fact::new("Adult").with("person", id))?;
            Ok(())
        });
    let greet = RuleBuilder::new("greet")
        .for_each("$a", "Adult")
        .execute(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    let mut session = session_with(vec![adult, greet]);

    for (id, age) in [(1, 30), (2, 12), (3, 18)] {
        session.insert(person(id).with("age", age)).unwrap();
    }
    let report = session.fire().unwrap();

    assert_eq!(report.activations_of("adult"), 2);
    assert_eq!(report.activations_of("greet"), 2);
    assert_eq!(greeted.load(Ordering::SeqCst), 2);
    assert_eq!(session.facts("Adult").len(), 2);
}

// =============================================================================
// Fact Operations
// =============================================================================

#[test]
fn pending_insert_and_delete_cancel_out() {
    let mut session = session_with(vec![ownership("owns")]);
    let p = session.insert(person(1)).unwrap().unwrap();
    session.insert(car(1)).unwrap();
    session.delete(p).unwrap();

    assert!(session.get_fact(p).is_none());
    let report = session.fire().unwrap();
    assert_eq!(report.activations, 0);
    assert_eq!(report.actions.inserts, 1);
    assert_eq!(report.actions.retracts, 0);
    assert_eq!(session.fact_count(), 1);
}

#[test]
fn pending_insert_takes_later_updates() {
    let mut session = session_with(vec![ownership("owns")]);
    let p = session.insert(person(1)).unwrap().unwrap();
    session.update(p, person(2)).unwrap();
    session.insert(car(2)).unwrap();

    let report = session.fire().unwrap();
    assert_eq!(report.activations_of("owns"), 1);
    assert_eq!(report.actions.updates, 0);
    assert_eq!(session.facts("Person"), vec![(p, person(2))]);
}

#[test]
fn delete_is_idempotent() {
    let mut session = session_with(vec![ownership("owns")]);
    let p = session.insert(person(1)).unwrap().unwrap();
    session.fire().unwrap();

    session.delete(p).unwrap();
    session.delete(p).unwrap();
    assert_eq!(session.fire().unwrap().actions.retracts, 1);

    session.delete(p).unwrap();
    let report = session.fire().unwrap();
    assert_eq!(report.cycles, 0);
    assert_eq!(report.actions.total(), 0);
}

#[test]
fn update_of_deleted_fact_is_skipped() {
    let mut session = session_with(vec![ownership("owns")]);
    let p = session.insert(person(1)).unwrap().unwrap();
    session.insert(car(1)).unwrap();
    session.fire().unwrap();
    session.delete(p).unwrap();
    session.fire().unwrap();

    session.update(p, person(1)).unwrap();
    let report = session.fire().unwrap();
    assert_eq!(report.activations, 0);
    assert!(session.get_fact(p).is_none());
}

#[test]
fn foreign_handles_and_mismatched_types_are_rejected() {
    let mut session = session_with(vec![ownership("owns")]);
    let p = session.insert(person(1)).unwrap().unwrap();

    let foreign = FactHandle::new(99, p.type_id);
    let err = session.update(foreign, person(1)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownFactHandle(h) if h == foreign));

    let err = session.delete(FactHandle::new(0, TypeId::new(40))).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownFactHandle(_)));

    let err = session.update(p, car(1)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));

    // a real id under the wrong type is not a handle this session issued
    let c = session.insert(car(1)).unwrap().unwrap();
    let borrowed = FactHandle::new(p.id, c.type_id);
    let err = session.update(borrowed, car(2)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownFactHandle(h) if h == borrowed));
}

// =============================================================================
// Runtime Changes
// =============================================================================

#[test]
fn replaced_alpha_logic_classifies_new_and_updated_facts() {
    let adult = RuleBuilder::new("adult")
        .for_each("$p", "Person")
        .when(Condition::custom("{0} >= 18", ["$p.age"], |a: &[&Value]| {
            a[0] >= &Value::Int(18)
        }))
        .execute(|_| Ok(()));
    let mut session = session_with(vec![adult]);

    let child = session.insert(person(1).with("age", 10)).unwrap().unwrap();
    session.insert(person(2).with("age", 20)).unwrap();
    assert_eq!(session.fire().unwrap().activations_of("adult"), 1);

    assert_eq!(
        session
            .replace_condition("{0} >= 18", |a: &[&Value]| a[0] >= &Value::Int(5))
            .unwrap(),
        1
    );

    // classified earlier: untouched until updated
    session.insert(person(3).with("age", 8)).unwrap();
    assert_eq!(session.fire().unwrap().activations_of("adult"), 1);
    session.update(child, person(1).with("age", 10)).unwrap();
    assert_eq!(session.fire().unwrap().activations_of("adult"), 1);
}

#[test]
fn stateless_sessions_share_knowledge_but_not_facts() {
    let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
    knowledge.add_rule(&ownership("owns")).unwrap();

    for owners in 1..4_usize {
        let mut once = knowledge.new_stateless_session().unwrap();
        once.insert(person(1)).unwrap();
        for _ in 0..owners {
            once.insert(car(1)).unwrap();
        }
        assert_eq!(once.fire().unwrap().activations_of("owns"), owners);
    }
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn runaway_rule_hits_the_cycle_ceiling() {
    let bump = RuleBuilder::new("bump")
        .for_each("$c", "Counter")
        .execute(|ctx| {
            let counter = ctx.get("$c")?;
            let n = counter.value("n").as_int().unwrap_or_default();
            let next = counter.clone().with("n", n + 1);
            ctx.update_fact("$c", next)
        });
    let mut knowledge =
        Knowledge::new().with_config(SessionConfig::single_threaded().with_max_fire_cycles(5));
    knowledge.add_rule(&bump).unwrap();
    let mut session = knowledge.new_session().unwrap();

    let c = session.insert(Fact::new("Counter").with("n", 0)).unwrap().unwrap();
    let err = session.fire().unwrap_err();

    match &err.kind {
        ErrorKind::LimitExceeded(SemanticLimit::MaxFireCycles { limit, context }) => {
            assert_eq!(*limit, 5);
            assert_eq!(context.as_deref(), Some("1 actions pending"));
        }
        other => panic!("expected LimitExceeded, got {other:?}"),
    }
    assert_eq!(err.context.as_ref().and_then(|c| c.cycle), Some(6));

    // work done before the ceiling is kept
    assert_eq!(session.get_fact(c).unwrap().value("n"), 5.into());
    assert_eq!(session.facts("Counter")[0].1.value("n"), 4.into());
}

#[test]
fn action_errors_carry_rule_and_cycle() {
    let failing = RuleBuilder::new("fails")
        .for_each("$p", "Person")
        .when(Condition::eq_value("$p.id", 2))
        .execute(|_| Err(Error::rhs("boom")));
    let mut session = session_with(vec![failing, ownership("owns")]);

    session.insert(person(1)).unwrap();
    session.insert(person(2)).unwrap();
    session.insert(car(1)).unwrap();
    let err = session.fire().unwrap_err();

    assert!(matches!(&err.kind, ErrorKind::Rhs(m) if m == "boom"));
    let context = err.context.unwrap();
    assert_eq!(context.rule.as_deref(), Some("fails"));
    assert_eq!(context.cycle, Some(1));

    // facts applied in the failed cycle stay
    assert_eq!(session.fact_count(), 3);
}
