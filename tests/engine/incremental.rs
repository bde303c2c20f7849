//! Incremental evaluation: conditions run once per new key pairing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ruleweave_engine::{Condition, Knowledge, RuleBuilder, RuleDefinition, SessionConfig};
use ruleweave_foundation::{Fact, Value};

use crate::common::{car, ownership, person};

fn counting_eq(calls: &Arc<AtomicUsize>) -> Condition {
    let calls = Arc::clone(calls);
    Condition::custom("{0} == {1}", ["$p.id", "$c.owner"], move |args: &[&Value]| {
        calls.fetch_add(1, Ordering::SeqCst);
        args[0] == args[1]
    })
}

fn counted_ownership(calls: &Arc<AtomicUsize>) -> RuleDefinition {
    RuleBuilder::new("owns")
        .for_each("$p", "Person")
        .for_each("$c", "Car")
        .when(counting_eq(calls))
        .execute(|_| Ok(()))
}

#[test]
fn known_key_pairs_are_not_reevaluated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
    knowledge.add_rule(&counted_ownership(&calls)).unwrap();
    let mut session = knowledge.new_session().unwrap();

    for id in 0..10 {
        session.insert(person(id)).unwrap();
        session.insert(car(id)).unwrap();
    }
    assert_eq!(session.fire().unwrap().activations, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 100);

    // a new owner key meets the ten known person keys
    session.insert(car(42)).unwrap();
    assert_eq!(session.fire().unwrap().activations, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 110);

    // a known owner key needs no evaluation at all
    session.insert(car(3)).unwrap();
    assert_eq!(session.fire().unwrap().activations, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 110);
}

#[test]
fn facts_sharing_a_key_share_one_evaluation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
    knowledge.add_rule(&counted_ownership(&calls)).unwrap();
    let mut session = knowledge.new_session().unwrap();

    for _ in 0..5 {
        session.insert(person(1)).unwrap();
        session.insert(car(1)).unwrap();
    }
    assert_eq!(session.fire().unwrap().activations, 25);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn identical_alpha_conditions_run_once_per_fact() {
    let calls = Arc::new(AtomicUsize::new(0));
    let adult = |name: &str| {
        let calls = Arc::clone(&calls);
        RuleBuilder::new(name)
            .for_each("$p", "Person")
            .when(Condition::custom(
                "{0} >= 18",
                ["$p.age"],
                move |args: &[&Value]| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    args[0] >= &Value::Int(18)
                },
            ))
            .execute(|_| Ok(()))
    };

    let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
    knowledge.add_rule(&adult("a")).unwrap();
    knowledge.add_rule(&adult("b")).unwrap();
    let mut session = knowledge.new_session().unwrap();

    for age in [10, 20, 30] {
        session.insert(person(age).with("age", age)).unwrap();
    }
    let report = session.fire().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.activations_of("a"), 2);
    assert_eq!(report.activations_of("b"), 2);
}

#[test]
fn workers_agree_with_single_thread() {
    let run = |workers: usize| {
        let mut knowledge =
            Knowledge::new().with_config(SessionConfig::new().with_worker_threads(workers));
        knowledge.add_rule(&ownership("owns")).unwrap();
        knowledge
            .add_rule(
                &RuleBuilder::new("garage")
                    .for_each("$c", "Car")
                    .for_each("$g", "Garage")
                    .when(Condition::eq("$c.city", "$g.city"))
                    .execute(|_| Ok(())),
            )
            .unwrap();
        let mut session = knowledge.new_session().unwrap();

        let mut reports = Vec::new();
        for round in 0..3_i64 {
            for i in 0..40_i64 {
                let id = round * 40 + i;
                session.insert(person(id)).unwrap();
                session
                    .insert(car((id * 7) % 97).with("city", id % 5))
                    .unwrap();
            }
            for city in 0..round + 1 {
                session
                    .insert(Fact::new("Garage").with("city", city))
                    .unwrap();
            }
            reports.push(session.fire().unwrap().rule_activations);
        }
        reports
    };

    assert_eq!(run(1), run(4));
}

#[test]
fn unchanged_combinations_are_built_only_against_new_ones() {
    let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
    knowledge
        .add_rule(
            &RuleBuilder::new("owned_near_garage")
                .for_each("$p", "Person")
                .for_each("$c", "Car")
                .for_each("$g", "Garage")
                .when(Condition::eq("$p.id", "$c.owner"))
                .execute(|_| Ok(())),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();

    for id in 0..10 {
        session.insert(person(id)).unwrap();
        session.insert(car(id)).unwrap();
        session.insert(Fact::new("Garage").with("n", id)).unwrap();
    }
    let report = session.fire().unwrap();
    assert_eq!(report.activations, 100);
    // ten new pairs and ten new garages, nothing committed yet
    assert_eq!(report.combinations, 20);

    // cars without owners reach the rule but pair with nothing
    for owner in 100..105 {
        session.insert(car(owner)).unwrap();
        let report = session.fire().unwrap();
        assert_eq!(report.activations, 0);
        assert_eq!(report.combinations, 0);
    }

    // one new garage meets the ten known pairs; known garages stay untouched
    session.insert(Fact::new("Garage").with("n", 10)).unwrap();
    let report = session.fire().unwrap();
    assert_eq!(report.activations, 10);
    assert_eq!(report.combinations, 11);
}
