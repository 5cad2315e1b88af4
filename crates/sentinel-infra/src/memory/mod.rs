//! In-memory storage, used when `storage.backend = "memory"`.
//!
//! Nothing survives a restart.

pub mod workflow;
