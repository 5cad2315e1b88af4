//! Global configuration loader for Sentinel.
//!
//! Reads `config.toml` from the data directory (`~/.sentinel/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use sentinel_types::config::GlobalConfig;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "SENTINEL_DATA_DIR";

/// Resolve the data directory: `SENTINEL_DATA_DIR`, else `$HOME/.sentinel`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    match dirs::home_dir() {
        Some(home) => home.join(".sentinel"),
        None => PathBuf::from(".sentinel"),
    }
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::config::StorageBackend;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.max_parallel_steps, 8);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[engine]
max_parallel_steps = 3
shutdown_grace_ms = 250

[server]
host = "0.0.0.0"
port = 9090
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.max_parallel_steps, 3);
        assert_eq!(config.engine.shutdown_grace_ms, 250);
        assert_eq!(config.engine.retry_backoff_ms, 100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.engine.max_parallel_steps, 8);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn resolve_data_dir_ends_with_sentinel_or_env() {
        let dir = resolve_data_dir();
        match std::env::var(DATA_DIR_ENV) {
            Ok(env) if !env.trim().is_empty() => assert_eq!(dir, PathBuf::from(env)),
            _ => assert!(dir.ends_with(".sentinel")),
        }
    }
}
