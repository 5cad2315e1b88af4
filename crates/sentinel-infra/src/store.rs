//! Backend-selectable `WorkflowRepository`.
//!
//! The service is generic over its repository, but the binary decides the
//! backend at startup from `[storage] backend`. `WorkflowStore` lets one
//! concrete service type serve both.

use sentinel_core::repository::workflow::WorkflowRepository;
use sentinel_types::error::RepositoryError;
use sentinel_types::workflow::{WorkflowDefinition, WorkflowExecution};
use uuid::Uuid;

use crate::memory::workflow::InMemoryWorkflowRepository;
use crate::sqlite::workflow::SqliteWorkflowRepository;

pub enum WorkflowStore {
    Sqlite(SqliteWorkflowRepository),
    Memory(InMemoryWorkflowRepository),
}

impl WorkflowStore {
    pub fn backend_name(&self) -> &'static str {
        match self {
            WorkflowStore::Sqlite(_) => "sqlite",
            WorkflowStore::Memory(_) => "memory",
        }
    }
}

impl WorkflowRepository for WorkflowStore {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        match self {
            WorkflowStore::Sqlite(repo) => repo.save_definition(def).await,
            WorkflowStore::Memory(repo) => repo.save_definition(def).await,
        }
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        match self {
            WorkflowStore::Sqlite(repo) => repo.get_definition(id).await,
            WorkflowStore::Memory(repo) => repo.get_definition(id).await,
        }
    }

    async fn list_definitions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WorkflowDefinition>, u64), RepositoryError> {
        match self {
            WorkflowStore::Sqlite(repo) => repo.list_definitions(limit, offset).await,
            WorkflowStore::Memory(repo) => repo.list_definitions(limit, offset).await,
        }
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        match self {
            WorkflowStore::Sqlite(repo) => repo.save_execution(execution).await,
            WorkflowStore::Memory(repo) => repo.save_execution(execution).await,
        }
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        match self {
            WorkflowStore::Sqlite(repo) => repo.get_execution(id).await,
            WorkflowStore::Memory(repo) => repo.get_execution(id).await,
        }
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        match self {
            WorkflowStore::Sqlite(repo) => repo.list_executions(workflow_id, limit).await,
            WorkflowStore::Memory(repo) => repo.list_executions(workflow_id, limit).await,
        }
    }
}
