//! Shared fixtures for engine tests.

use ruleweave_engine::{Condition, RuleBuilder, RuleDefinition};
use ruleweave_foundation::Fact;

/// Routes engine logs to the test harness. Set `RUST_LOG=ruleweave_engine=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn person(id: i64) -> Fact {
    Fact::new("Person").with("id", id)
}

pub fn car(owner: i64) -> Fact {
    Fact::new("Car").with("owner", owner)
}

/// `$p.id == $c.owner`, with no action.
pub fn ownership(name: &str) -> RuleDefinition {
    RuleBuilder::new(name)
        .for_each("$p", "Person")
        .for_each("$c", "Car")
        .when(Condition::eq("$p.id", "$c.owner"))
        .execute(|_| Ok(()))
}
