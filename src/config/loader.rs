//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered, later ones winning:
//!
//! 1. Built-in defaults ([`ConcurrencyConfig::default`])
//! 2. `{config_dir}/concurrency.toml` (optional)
//! 3. `{config_dir}/concurrency.{environment}.toml` (optional)
//! 4. `TASKER_CONCURRENCY_*` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::ConcurrencyConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "TASKER_CONCURRENCY";
const BASE_FILE_STEM: &str = "concurrency";

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ConcurrencyConfig,
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
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_sources(config_dir, environment, None)
    }

    /// Load configuration with an explicit set of environment variables instead of the
    /// process environment. Keys must carry the `TASKER_CONCURRENCY_` prefix.
    pub fn load_with_sources(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading concurrency configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment, env_vars)?;
        config.validate()?;

        info!(
            environment = %environment,
            concurrency_limit = config.concurrency_limit,
            timeout_seconds = config.timeout_seconds,
            default_batch_size = config.default_batch_size,
            sequential = config.disable_concurrency_in_testing,
            "Concurrency configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: ConcurrencyConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("TASKER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        env_vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<ConcurrencyConfig> {
        let base_path = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let env_path = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        for path in [&base_path, &env_path] {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
            }
        }

        let mut env_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .try_parsing(true);
        if let Some(vars) = env_vars {
            env_source = env_source.source(Some(vars.into_iter().collect()));
        }

        let merged = Config::builder()
            .add_source(File::from(base_path.as_path()).required(false))
            .add_source(File::from(env_path.as_path()).required(false))
            .add_source(env_source)
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(config_directory.display().to_string(), e)
            })?;

        Ok(merged.try_deserialize::<ConcurrencyConfig>()?)
    }
}
