//! Core types, values, and bitmasks for Ruleweave.
//!
//! This crate provides:
//! - [`Value`] - The dynamically typed value stored in fact fields
//! - [`Fact`] - A typed record of named field values
//! - [`FactHandle`] - Stable, never-reused fact identity
//! - [`Mask`] - Bitsets tagged with the index space that built them
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod fact;
pub mod mask;
pub mod value;

pub use error::{Error, ErrorContext, ErrorKind, Result, SemanticLimit};
pub use fact::{Fact, FactHandle, TypeId};
pub use mask::{
    AlphaConditionBits, FactTypeBits, Mask, MaskIndex, MemoryAddressBits, TypeBits,
};
pub use value::Value;
