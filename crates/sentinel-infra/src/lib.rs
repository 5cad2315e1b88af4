//! Infrastructure layer for Sentinel.
//!
//! Contains implementations of the repository traits defined in `sentinel-core`:
//! SQLite storage (WAL mode, split reader/writer pools), an in-memory store,
//! the backend-selectable `WorkflowStore`, and the `config.toml` loader.

pub mod config;
pub mod memory;
pub mod sqlite;
pub mod store;
