//! Discrimination network, join evaluation, and the fire loop for Ruleweave.
//!
//! This crate provides:
//! - [`TypeIndex`] - Types, fields, alpha conditions, and memory addresses
//! - [`AlphaRouter`] - Single-fact condition classification
//! - [`NetworkBuilder`] - Join tree construction from beta conditions
//! - [`TreeMemory`] - Main/delta key tuple stores and delta evaluation
//! - [`Scheduler`] - Fork-join delta computation on worker threads
//! - [`Knowledge`] and [`Session`] - Rule sets and the stateful fire loop
//! - [`StatelessSession`] - One-shot insert-and-fire sessions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agenda;
pub mod alpha;
pub mod condition;
pub mod config;
pub mod index;
pub mod knowledge;
pub mod network;
pub mod node;
pub mod rhs;
pub mod rule;
pub mod scheduler;
pub mod session;

pub use agenda::{Activation, ActivationManager, DefaultActivationManager};
pub use alpha::{AlphaAddress, AlphaCondition, AlphaRouter};
pub use condition::{Condition, FieldRef, Predicate, PredicateFn};
pub use config::{AgendaMode, SessionConfig};
pub use index::{ActiveField, ActiveType, MemoryAddress, TypeIndex};
pub use knowledge::Knowledge;
pub use network::{
    BetaArg, BetaCondition, ConditionNode, FactGroup, GroupKind, JoinTree, NetworkBuilder,
    RuleNetwork, Source,
};
pub use node::{DeltaMode, KeyTuple, KeysStore, NodeMemory, PairingMode, TreeMemory};
pub use rhs::RhsContext;
pub use rule::{CompiledRule, FactType, RhsFn, RuleBuilder, RuleCompiler, RuleDefinition, RuleInfo};
pub use scheduler::{DeltaTask, Scheduler};
pub use session::{FireReport, Session, StatelessSession};
