//! Rules added to live sessions, and knowledge shared between sessions.

use ruleweave_engine::{Condition, Knowledge, RuleBuilder, RuleDefinition, Session, SessionConfig};
use ruleweave_foundation::{ErrorKind, Fact};

use crate::common::{car, ownership, person};

fn garage_rule() -> RuleDefinition {
    RuleBuilder::new("garage")
        .for_each("$c", "Car")
        .for_each("$g", "Garage")
        .when(Condition::eq("$c.color", "$g.color"))
        .execute(|_| Ok(()))
}

#[test]
fn hot_deployed_rule_skips_existing_matches() {
    let mut session = Session::new(SessionConfig::single_threaded());
    session.add_rule(&ownership("first")).unwrap();
    session.insert(person(1)).unwrap();
    session.insert(car(1)).unwrap();
    assert_eq!(session.fire().unwrap().activations_of("first"), 1);

    session.add_rule(&ownership("second")).unwrap();
    assert_eq!(session.fire().unwrap().activations, 0);

    session.insert(car(1)).unwrap();
    let report = session.fire().unwrap();
    assert_eq!(report.activations_of("first"), 1);
    assert_eq!(report.activations_of("second"), 1);
}

#[test]
fn hot_deployed_rule_sees_new_fields_of_old_facts() {
    let mut session = Session::new(SessionConfig::single_threaded());
    session.add_rule(&ownership("owns")).unwrap();
    for (owner, color) in [(1, "red"), (2, "red"), (3, "blue")] {
        session.insert(car(owner).with("color", color)).unwrap();
    }
    session.fire().unwrap();

    session.add_rule(&garage_rule()).unwrap();
    session
        .insert(Fact::new("Garage").with("color", "red"))
        .unwrap();
    assert_eq!(session.fire().unwrap().activations_of("garage"), 2);
}

#[test]
fn hot_deploy_reindexes_buffered_facts() {
    let mut session = Session::new(SessionConfig::single_threaded());
    session.add_rule(&ownership("owns")).unwrap();
    session.insert(car(1).with("color", "red")).unwrap();

    session.add_rule(&garage_rule()).unwrap();
    session
        .insert(Fact::new("Garage").with("color", "red"))
        .unwrap();
    assert_eq!(session.fire().unwrap().activations_of("garage"), 1);
}

#[test]
fn hot_deployed_alpha_filters_existing_facts() {
    let mut session = Session::new(SessionConfig::single_threaded());
    session.add_rule(&ownership("owns")).unwrap();
    for (id, age) in [(1, 40), (2, 10)] {
        session.insert(person(id).with("age", age)).unwrap();
    }
    session.fire().unwrap();

    session
        .add_rule(
            &RuleBuilder::new("adult_owner")
                .for_each("$p", "Person")
                .for_each("$c", "Car")
                .when(Condition::eq("$p.id", "$c.owner"))
                .when(Condition::ge_value("$p.age", 18))
                .execute(|_| Ok(())),
        )
        .unwrap();
    session.insert(car(1)).unwrap();
    session.insert(car(2)).unwrap();

    let report = session.fire().unwrap();
    assert_eq!(report.activations_of("adult_owner"), 1);
    assert_eq!(report.activations_of("owns"), 2);
}

#[test]
fn duplicate_names_are_rejected_everywhere() {
    let mut knowledge = Knowledge::new();
    knowledge.add_rule(&ownership("owns")).unwrap();
    let err = knowledge.add_rule(&ownership("owns")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateRule(ref n) if n == "owns"));

    let mut session = knowledge.new_session().unwrap();
    let err = session.add_rule(&ownership("owns")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateRule(_)));
    assert_eq!(session.rules().len(), 1);
}

#[test]
fn failed_compile_leaves_session_usable() {
    let mut session = Session::new(SessionConfig::single_threaded());
    session.add_rule(&ownership("owns")).unwrap();

    let broken = RuleBuilder::new("broken")
        .for_each("$p", "Person")
        .when(Condition::eq("$p.id", "$x.owner"))
        .execute(|_| Ok(()));
    let err = session.add_rule(&broken).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownVariable(_)));
    assert_eq!(err.context.and_then(|c| c.rule).as_deref(), Some("broken"));

    session.insert(person(1)).unwrap();
    session.insert(car(1)).unwrap();
    assert_eq!(session.fire().unwrap().activations_of("owns"), 1);
}

#[test]
fn sessions_from_one_knowledge_are_independent() {
    let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
    knowledge.add_rule(&ownership("owns")).unwrap();
    let mut a = knowledge.new_session().unwrap();
    let mut b = knowledge.new_session().unwrap();

    // later rules only reach later sessions
    knowledge.add_rule(&ownership("late")).unwrap();
    let mut c = knowledge.new_session().unwrap();

    for session in [&mut a, &mut c] {
        session.insert(person(1)).unwrap();
        session.insert(car(1)).unwrap();
    }
    assert_eq!(a.fire().unwrap().activations, 1);
    assert_eq!(b.fire().unwrap().activations, 0);
    assert_eq!(c.fire().unwrap().activations, 2);
    assert_eq!(b.fact_count(), 0);
    assert!(a.rule("late").is_none());
}
