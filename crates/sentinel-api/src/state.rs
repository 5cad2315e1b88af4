//! Application state wiring the workflow service to its backends.
//!
//! `WorkflowService` is generic over its repository and step runner;
//! AppState pins it to the backend-selectable store and the built-in tool
//! runner.

use std::path::PathBuf;
use std::sync::Arc;

use sentinel_core::workflow::service::WorkflowService;
use sentinel_core::workflow::step_runner::BuiltinToolRunner;
use sentinel_infra::config::{load_global_config, resolve_data_dir};
use sentinel_infra::memory::workflow::InMemoryWorkflowRepository;
use sentinel_infra::sqlite::pool::{DatabasePool, database_url};
use sentinel_infra::sqlite::workflow::SqliteWorkflowRepository;
use sentinel_infra::store::WorkflowStore;
use sentinel_types::config::{GlobalConfig, StorageBackend};

/// Concrete service type used by both the CLI and the REST API.
pub type ConcreteWorkflowService = WorkflowService<WorkflowStore, BuiltinToolRunner>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<ConcreteWorkflowService>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load `config.toml`, open the configured
    /// storage backend and build the service.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;

        let store = match config.storage.backend {
            StorageBackend::Sqlite => {
                let url = format!("{}?mode=rwc", database_url(&data_dir));
                let pool = DatabasePool::new(&url).await?;
                WorkflowStore::Sqlite(SqliteWorkflowRepository::new(pool))
            }
            StorageBackend::Memory => WorkflowStore::Memory(InMemoryWorkflowRepository::new()),
        };
        tracing::debug!(
            data_dir = %data_dir.display(),
            backend = store.backend_name(),
            "application state initialized"
        );

        Ok(Self::from_parts(store, config, data_dir))
    }

    pub fn from_parts(store: WorkflowStore, config: GlobalConfig, data_dir: PathBuf) -> Self {
        let workflow_service = WorkflowService::new(
            Arc::new(store),
            Arc::new(BuiltinToolRunner::new()),
            config.engine.clone(),
        );
        Self {
            workflow_service: Arc::new(workflow_service),
            config: Arc::new(config),
            data_dir,
        }
    }
}
