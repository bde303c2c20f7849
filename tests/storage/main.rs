//! Integration tests for Layer 1: Storage
//!
//! Tests for key memory buckets, the action buffer, and working memory.

mod buckets;
mod buffer;
mod memory;
