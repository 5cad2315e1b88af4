//! Workflow engine and repository trait definitions for Sentinel.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements. It depends only on `sentinel-types` -- never on
//! `sentinel-infra` or any database/IO crate.

pub mod repository;
pub mod workflow;
