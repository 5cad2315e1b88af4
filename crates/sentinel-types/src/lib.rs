//! Shared domain types for Sentinel.
//!
//! This crate contains the workflow domain model (definitions, executions,
//! step results), the configuration structs, and the repository error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod workflow;
