//! Ruleweave - Forward-chaining production rule engine
//!
//! This crate re-exports all layers of the Ruleweave system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: ruleweave_engine     - Indexer, alpha router, join network,
//!                                 scheduler, agenda, sessions
//! Layer 1: ruleweave_storage    - Fact records, key buckets, action buffer
//! Layer 0: ruleweave_foundation - Core types (Value, Fact, FactHandle, Mask, Error)
//! ```
//!
//! # Example
//!
//! ```
//! use ruleweave::engine::{Condition, Knowledge, RuleBuilder, SessionConfig};
//! use ruleweave::foundation::Fact;
//!
//! let mut knowledge = Knowledge::new().with_config(SessionConfig::single_threaded());
//! knowledge
//!     .add_rule(
//!         &RuleBuilder::new("owner")
//!             .for_each("$p", "Person")
//!             .for_each("$c", "Car")
//!             .when(Condition::eq("$p.id", "$c.owner"))
//!             .when(Condition::is_true("$p.hasCar").not())
//!             .execute(|ctx| {
//!                 let person = ctx.get("$p")?.clone().with("hasCar", true);
//!                 ctx.update_fact("$p", person)
//!             }),
//!     )
//!     .unwrap();
//!
//! let mut session = knowledge.new_session().unwrap();
//! let p = session.insert(Fact::new("Person").with("id", 1)).unwrap().unwrap();
//! session.insert(Fact::new("Car").with("owner", 1)).unwrap();
//! let report = session.fire().unwrap();
//!
//! assert_eq!(report.activations_of("owner"), 1);
//! assert_eq!(session.get_fact(p).unwrap().value("hasCar"), true.into());
//! ```

pub use ruleweave_engine as engine;
pub use ruleweave_foundation as foundation;
pub use ruleweave_storage as storage;
