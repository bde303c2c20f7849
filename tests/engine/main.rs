//! Integration tests for Layer 2: Engine
//!
//! Tests for rule firing, incremental joins, hot deployment, and the agenda.

mod common;
mod deployment;
mod incremental;
mod scenarios;
