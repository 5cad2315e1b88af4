//! Workflow engine core: definition validation, dependency scheduling, and
//! checkpointed execution state.
//!
//! - `definition` -- YAML/JSON parsing, step normalization, validation
//! - `dag` -- DAG validation, ready-set computation, stuck diagnosis
//! - `step_runner` -- Step runner trait and the built-in tool runner
//! - `retry` -- Bounded retry with linear backoff and per-attempt timeouts
//! - `checkpoint` -- Per-execution state tracker, persisted on every transition
//! - `scheduler` -- Event-driven dependency scheduler
//! - `active` -- Active execution table with cancellation handles
//! - `coordinator` -- Drives one execution to its terminal state
//! - `service` -- Public workflow service API

pub mod active;
pub mod checkpoint;
pub mod coordinator;
pub mod dag;
pub mod definition;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod step_runner;

#[cfg(test)]
pub(crate) mod testing;
