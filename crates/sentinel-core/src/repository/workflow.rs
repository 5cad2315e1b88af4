//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions and executions.
//! The infrastructure layer (sentinel-infra) implements this trait with
//! SQLite persistence and an in-memory store.

use sentinel_types::error::RepositoryError;
use sentinel_types::workflow::{WorkflowDefinition, WorkflowExecution};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Implementations must be safe for concurrent calls from many executions;
/// no cross-execution transactional guarantees are expected.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a workflow definition (insert or replace by ID).
    fn save_definition(
        &self,
        def: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by its UUID.
    fn get_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// List definitions ordered by creation time, newest first, with the total count.
    fn list_definitions(
        &self,
        limit: u32,
        offset: u32,
    ) -> impl std::future::Future<Output = Result<(Vec<WorkflowDefinition>, u64), RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Upsert an execution record. Called on every checkpoint.
    fn save_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by its UUID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// List executions of a definition, newest first.
    fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;
}
