//! In-memory `WorkflowRepository`.

use std::collections::HashMap;

use sentinel_core::repository::workflow::WorkflowRepository;
use sentinel_types::error::RepositoryError;
use sentinel_types::workflow::{WorkflowDefinition, WorkflowExecution};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store. Definitions and executions live in separate maps so
/// readers of one never wait on writers of the other.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    definitions: RwLock<HashMap<Uuid, WorkflowDefinition>>,
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        self.definitions.write().await.insert(def.id, def.clone());
        Ok(())
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.definitions.read().await.get(id).cloned())
    }

    async fn list_definitions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WorkflowDefinition>, u64), RepositoryError> {
        let definitions = self.definitions.read().await;
        let mut defs: Vec<&WorkflowDefinition> = definitions.values().collect();
        defs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let page = defs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, definitions.len() as u64))
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        if !self
            .definitions
            .read()
            .await
            .contains_key(&execution.workflow_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "workflow {} does not exist",
                execution.workflow_id
            )));
        }
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let executions = self.executions.read().await;
        let mut execs: Vec<WorkflowExecution> = executions
            .values()
            .filter(|e| e.workflow_id == *workflow_id)
            .cloned()
            .collect();
        execs.sort_by(|a, b| b.id.cmp(&a.id));
        execs.truncate(limit as usize);
        Ok(execs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_types::workflow::{ExecutionStatus, WorkflowStep};

    fn definition(name: &str) -> WorkflowDefinition {
        let now = Utc::now();
        WorkflowDefinition {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            version: "1.0.0".to_string(),
            steps: vec![WorkflowStep::new("only", "check")],
            input_schema: None,
            output_schema: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_definitions_round_trip_and_page() {
        let repo = InMemoryWorkflowRepository::new();
        let mut ids = Vec::new();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let mut def = definition(name);
            def.created_at = Utc::now() + chrono::Duration::seconds(i as i64);
            ids.push(def.id);
            repo.save_definition(&def).await.unwrap();
        }

        assert_eq!(repo.get_definition(&ids[0]).await.unwrap().unwrap().name, "a");
        let (page, total) = repo.list_definitions(2, 1).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<&str> = page.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_execution_upsert_and_listing() {
        let repo = InMemoryWorkflowRepository::new();
        let def = definition("wf");
        repo.save_definition(&def).await.unwrap();

        let mut exec = WorkflowExecution::new(&def);
        repo.save_execution(&exec).await.unwrap();
        exec.status = ExecutionStatus::Running;
        repo.save_execution(&exec).await.unwrap();

        let loaded = repo.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(repo.list_executions(&def.id, 10).await.unwrap().len(), 1);
        assert!(repo.list_executions(&Uuid::now_v7(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execution_requires_definition() {
        let repo = InMemoryWorkflowRepository::new();
        let exec = WorkflowExecution::new(&definition("missing"));
        assert!(matches!(
            repo.save_execution(&exec).await,
            Err(RepositoryError::Conflict(_))
        ));
    }
}
