//! Scenario tests for the sweep pipeline
//!
//! Tests are organized by topic:
//! - `support` - Scripted engine with per-seed fault injection
//! - `lifecycle` - Stepped run controller phases, tail window and failures
//! - `sweeps` - End-to-end sweeps: partitioning, artifacts, empty sweeps
//! - `population` - Population sweeps against the mock market

mod lifecycle;
mod support;
