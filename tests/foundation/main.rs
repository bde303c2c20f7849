//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, Fact, FactHandle, Mask, and Error.

mod errors;
mod facts;
mod masks;
mod values;
