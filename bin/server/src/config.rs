//! Centralized daemon configuration.
//!
//! Loaded via the `config` crate from an optional `nodeflow.toml` and from
//! environment variables prefixed with `NODEFLOW_`. Nested keys use `__`, so
//! `NODEFLOW_ENGINE__RETRY__MAX_ATTEMPTS=5` sets `engine.retry.max_attempts`.

use nodeflow_workflow::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "nodeflow.toml";

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Directory scanned for `*.json` graph documents at startup.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Interval between sweeps for waiting runs whose timers were lost.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}

fn default_sweep_interval_seconds() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `nodeflow.toml` (if present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value has the wrong type.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_sources(Path::new(DEFAULT_CONFIG_FILE), None)
    }

    /// Loads configuration from `file` and from either the process
    /// environment or the given variables.
    fn from_sources(
        file: &Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix("NODEFLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}
