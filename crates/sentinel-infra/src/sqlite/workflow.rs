//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `sentinel-core` using sqlx with split
//! read/write pools. Definitions and executions are stored as JSON blobs next
//! to the columns used for ordering and filtering. Every checkpoint is an
//! upsert of the whole execution record.

use chrono::{DateTime, Utc};
use sentinel_core::repository::workflow::WorkflowRepository;
use sentinel_types::error::RepositoryError;
use sentinel_types::workflow::{WorkflowDefinition, WorkflowExecution};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowDefRow {
    definition: String,
}

impl WorkflowDefRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            definition: row.try_get("definition")?,
        })
    }

    fn into_definition(self) -> Result<WorkflowDefinition, RepositoryError> {
        serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))
    }
}

struct ExecutionRow {
    state: String,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            state: row.try_get("state")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        serde_json::from_str(&self.state)
            .map_err(|e| RepositoryError::Query(format!("invalid execution state JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(def)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, version, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 version = excluded.version,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(def.id.to_string())
        .bind(&def.name)
        .bind(&def.version)
        .bind(&definition_json)
        .bind(format_datetime(&def.created_at))
        .bind(format_datetime(&def.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = WorkflowDefRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_definition()?))
            }
            None => Ok(None),
        }
    }

    async fn list_definitions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<WorkflowDefinition>, u64), RepositoryError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflows")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let rows = sqlx::query(
            "SELECT definition FROM workflows ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut defs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WorkflowDefRow::from_row(row).map_err(query_error)?;
            defs.push(r.into_definition()?);
        }
        Ok((defs, total.max(0) as u64))
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(execution)
            .map_err(|e| RepositoryError::Query(format!("serialize execution: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
                 (id, workflow_id, status, progress, started_at, completed_at, state, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 progress = excluded.progress,
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at,
                 state = excluded.state,
                 updated_at = excluded.updated_at"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.status.as_str())
        .bind(i64::from(execution.progress))
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(&state_json)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                RepositoryError::Conflict(format!(
                    "workflow {} does not exist",
                    execution.workflow_id
                ))
            }
            other => query_error(other),
        })?;

        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT state FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT state FROM workflow_executions WHERE workflow_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(workflow_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut execs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ExecutionRow::from_row(row).map_err(query_error)?;
            execs.push(r.into_execution()?);
        }
        Ok(execs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::workflow::*;
    use serde_json::json;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn sample_definition(name: &str) -> WorkflowDefinition {
        let now = Utc::now();
        WorkflowDefinition {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: Some("Nightly dependency audit".to_string()),
            version: "1.0.0".to_string(),
            steps: vec![
                WorkflowStep::new("fetch", "sleep").with_argument("duration_ms", json!(10)),
                WorkflowStep::new("audit", "validate")
                    .depends_on(["fetch"])
                    .with_retries(2)
                    .with_timeout_ms(5_000),
            ],
            input_schema: Some(json!({"type": "object"})),
            output_schema: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_definition() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let def = sample_definition("audit");
        repo.save_definition(&def).await.unwrap();

        let loaded = repo.get_definition(&def.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "audit");
        assert_eq!(loaded.steps, def.steps);
        assert_eq!(loaded.input_schema, def.input_schema);
    }

    #[tokio::test]
    async fn test_get_missing_definition() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        assert!(repo.get_definition(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_definitions_paginates_newest_first() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        for (i, name) in ["first", "second", "third"].iter().enumerate() {
            let mut def = sample_definition(name);
            def.created_at = Utc::now() + chrono::Duration::seconds(i as i64);
            repo.save_definition(&def).await.unwrap();
        }

        let (page, total) = repo.list_definitions(2, 0).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<&str> = page.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["third", "second"]);

        let (page, _) = repo.list_definitions(2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "first");
    }

    #[tokio::test]
    async fn test_save_execution_upserts() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let def = sample_definition("audit");
        repo.save_definition(&def).await.unwrap();

        let mut exec = WorkflowExecution::new(&def);
        repo.save_execution(&exec).await.unwrap();

        exec.status = ExecutionStatus::Completed;
        exec.progress = 100;
        exec.completed_at = Some(Utc::now());
        exec.steps[0].status = StepStatus::Completed;
        exec.steps[0].output = Some(json!({"result": "success"}));
        repo.save_execution(&exec).await.unwrap();

        let loaded = repo.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.progress, 100);
        assert_eq!(loaded.steps[0].status, StepStatus::Completed);
        assert_eq!(loaded.steps[0].output, Some(json!({"result": "success"})));
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_execution_error_round_trips() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let def = sample_definition("audit");
        repo.save_definition(&def).await.unwrap();

        let mut exec = WorkflowExecution::new(&def);
        exec.status = ExecutionStatus::Failed;
        exec.error = Some(ExecutionError {
            code: ExecutionErrorCode::ExecutionFailed,
            message: "step 'audit' failed: boom".to_string(),
            step_id: Some("audit".to_string()),
        });
        repo.save_execution(&exec).await.unwrap();

        let loaded = repo.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.error, exec.error);
    }

    #[tokio::test]
    async fn test_execution_for_unknown_workflow_conflicts() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let exec = WorkflowExecution::new(&sample_definition("never-saved"));
        let err = repo.save_execution(&exec).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_list_executions_scoped_to_workflow() {
        let repo = SqliteWorkflowRepository::new(test_pool().await);
        let def = sample_definition("audit");
        let other = sample_definition("other");
        repo.save_definition(&def).await.unwrap();
        repo.save_definition(&other).await.unwrap();

        let first = WorkflowExecution::new(&def);
        let second = WorkflowExecution::new(&def);
        repo.save_execution(&first).await.unwrap();
        repo.save_execution(&second).await.unwrap();
        repo.save_execution(&WorkflowExecution::new(&other)).await.unwrap();

        let execs = repo.list_executions(&def.id, 10).await.unwrap();
        let ids: Vec<Uuid> = execs.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let execs = repo.list_executions(&def.id, 1).await.unwrap();
        assert_eq!(execs.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_checkpoints() {
        let repo = std::sync::Arc::new(SqliteWorkflowRepository::new(test_pool().await));
        let def = sample_definition("audit");
        repo.save_definition(&def).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let exec = WorkflowExecution::new(&def);
            handles.push(tokio::spawn(async move {
                repo.save_execution(&exec).await.unwrap();
                exec.id
            }));
        }
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(repo.get_execution(&id).await.unwrap().is_some());
        }
    }
}
