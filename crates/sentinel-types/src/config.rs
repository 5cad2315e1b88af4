//! Global configuration types for Sentinel.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! workflow engine, the HTTP listener, and the storage backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Sentinel service.
///
/// Loaded from `~/.sentinel/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Tuning knobs for the workflow execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of steps of one execution running at the same time.
    #[serde(default = "default_max_parallel_steps")]
    pub max_parallel_steps: usize,

    /// Backoff unit in milliseconds; retry `k` waits `k * retry_backoff_ms`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Timeout applied to steps that do not declare their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_step_timeout_ms: Option<u64>,

    /// How long shutdown waits for active executions to wind down.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_max_parallel_steps() -> usize {
    8
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: default_max_parallel_steps(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_step_timeout_ms: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl EngineConfig {
    /// Parallelism ceiling with a floor of one step.
    pub fn parallelism(&self) -> usize {
        self.max_parallel_steps.max(1)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn default_step_timeout(&self) -> Option<Duration> {
        self.default_step_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which `WorkflowRepository` implementation backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.engine.max_parallel_steps, 8);
        assert_eq!(config.engine.retry_backoff_ms, 100);
        assert!(config.engine.default_step_timeout_ms.is_none());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_parallel_steps, 8);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[engine]
max_parallel_steps = 2
retry_backoff_ms = 25
default_step_timeout_ms = 30000

[server]
port = 8080

[storage]
backend = "memory"
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_parallel_steps, 2);
        assert_eq!(config.engine.retry_backoff(), Duration::from_millis(25));
        assert_eq!(
            config.engine.default_step_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_parallelism_has_floor_of_one() {
        let config = EngineConfig {
            max_parallel_steps: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.parallelism(), 1);
    }
}
