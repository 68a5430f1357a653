//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery,
//! environment detection and layered merging through the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::ConnectorConfig;
use crate::constants::{CONFIG_DIR_ENV_VAR, DEFAULT_ENVIRONMENT, ENVIRONMENT_ENV_VAR, ENV_OVERRIDE_PREFIX};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded, validated configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ConnectorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        if explicit && !config_directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound {
                path: config_directory,
            });
        }

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            batch_size = config.state_machine.batch_size,
            max_retries = config.retry.max_retries,
            lease_duration_ms = config.lease.duration_ms,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: ConnectorConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Effective configuration as JSON, for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    /// Detect the current environment from `DATASPACE_ENV`
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_ENV_VAR)
            .ok()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var(CONFIG_DIR_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    /// Merge `base.toml`, `<environment>.toml` and `DATASPACE__*` variables, in that order
    fn load_and_merge_config(config_directory: &Path, environment: &str) -> ConfigResult<ConnectorConfig> {
        let base_path = config_directory.join("base.toml");
        let env_path = config_directory.join(format!("{environment}.toml"));

        for path in [&base_path, &env_path] {
            if path.exists() {
                debug!(file = %path.display(), "Applying configuration file");
            }
        }

        let merged = Config::builder()
            .add_source(File::new(&base_path.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(File::new(&env_path.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Self::classify_error(e, environment))?;

        merged
            .try_deserialize::<ConnectorConfig>()
            .map_err(|e| ConfigurationError::merge_error(environment, e))
    }

    fn classify_error(error: config::ConfigError, environment: &str) -> ConfigurationError {
        match error {
            config::ConfigError::FileParse { uri, cause } => ConfigurationError::InvalidToml {
                file_path: uri.unwrap_or_else(|| "<unknown>".to_string()),
                error: cause.to_string(),
            },
            other => ConfigurationError::merge_error(environment, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().retry, super::super::RetryConfig::default());
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("base.toml"),
            "[state_machine]\nbatch_size = 10\n\n[retry]\nmax_retries = 4\n",
        )
        .unwrap();
        fs::write(dir.path().join("production.toml"), "[retry]\nmax_retries = 9\n").unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "production")
                .unwrap();
        assert_eq!(manager.config().state_machine.batch_size, 10);
        assert_eq!(manager.config().retry.max_retries, 9);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.toml"), "[lease]\nduration_ms = 0\n").unwrap();

        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_directory_is_reported() {
        let err = ConfigManager::load_from_directory_with_env(
            Some(PathBuf::from("/definitely/not/a/config/dir")),
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::DirectoryNotFound { .. }));
    }
}
