//! Fact storage, key-grouped memory, and the action buffer for Ruleweave.
//!
//! This crate provides:
//! - [`FactRecord`] - Versioned fact records
//! - [`FactStorage`] - The record table capability, with [`HashFactStorage`]
//! - [`KeyMemoryBucket`] - Facts grouped by join key, split known/fresh
//! - [`ActionBuffer`] - Per-handle collapsing buffer of pending operations
//! - [`WorkingMemory`] - Per-type record tables and the bucket table

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod buffer;
pub mod memory;
pub mod record;
pub mod storage;

pub use bucket::{FactEntry, FactScope, KeyMemoryBucket, KeyRow, KeyScope, ValueRow};
pub use buffer::{Action, ActionBuffer, ActionCounts, ActionKind, Buffered};
pub use memory::{StorageFactory, TypeMemory, WorkingMemory};
pub use record::FactRecord;
pub use storage::{FactStorage, HashFactStorage};
