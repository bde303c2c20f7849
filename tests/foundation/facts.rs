//! Facts and handles.

use ruleweave_foundation::{Fact, FactHandle, TypeId, Value};

#[test]
fn missing_fields_read_as_nil() {
    let fact = Fact::new("Person").with("id", 1);
    assert_eq!(fact.value("id"), Value::Int(1));
    assert_eq!(fact.value("age"), Value::Nil);
    assert!(fact.get("age").is_none());
}

#[test]
fn with_leaves_the_original_untouched() {
    let base = Fact::new("Person").with("id", 1);
    let derived = base.clone().with("hasCar", true);
    assert_eq!(base.len(), 1);
    assert_eq!(derived.len(), 2);
    assert_ne!(base, derived);
}

#[test]
fn fields_iterate_in_name_order() {
    let fact = Fact::new("Car").with("owner", 3).with("color", "red");
    let names: Vec<&str> = fact.fields().map(|(k, _)| k).collect();
    assert_eq!(names, vec!["color", "owner"]);
    assert_eq!(format!("{fact:?}"), "Car{color: \"red\", owner: 3}");
}

#[test]
fn handles_are_identity_only() {
    let a = FactHandle::new(1, TypeId::new(0));
    let b = FactHandle::new(1, TypeId::new(0));
    let c = FactHandle::new(2, TypeId::new(0));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(format!("{a:?}"), "FactHandle(1:0)");
}
