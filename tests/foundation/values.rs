//! Value equality, hashing, and ordering.

use std::collections::HashSet;

use ruleweave_foundation::{FactHandle, TypeId, Value};

#[test]
fn values_key_hash_sets() {
    let set: HashSet<Value> = [
        Value::Int(1),
        Value::Int(1),
        Value::Float(1.0),
        Value::from("1"),
        Value::Nil,
    ]
    .into_iter()
    .collect();
    // int and float never collide as keys
    assert_eq!(set.len(), 4);
}

#[test]
fn floats_compare_by_bits() {
    assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    assert_ne!(Value::Float(0.0), Value::Float(-0.0));
}

#[test]
fn numbers_order_across_kinds() {
    assert!(Value::Int(2) < Value::Float(2.5));
    assert!(Value::Float(-1.0) < Value::Int(0));
    assert!(Value::from("a") < Value::from("b"));
    assert_eq!(Value::Int(1).partial_cmp(&Value::from("1")), None);
}

#[test]
fn conversions() {
    assert_eq!(Value::from(Some(3)), Value::Int(3));
    assert_eq!(Value::from(None::<i64>), Value::Nil);
    assert_eq!(Value::from(vec![1, 2]).as_list().map(|l| l.len()), Some(2));

    let h = FactHandle::new(7, TypeId::new(2));
    assert_eq!(Value::from(h).as_handle(), Some(h));
    assert_eq!(Value::from(h).to_string(), "#7");
}

#[test]
fn display_lists() {
    let v = Value::from(vec![Value::Int(1), Value::from("x"), Value::Nil]);
    assert_eq!(v.to_string(), "[1 x nil]");
}
