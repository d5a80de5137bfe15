use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::workflow::{Role, RolePermission, TransitionAuthorizer};

/// Default configuration file, looked up in the working directory
pub const CONFIG_FILE: &str = "launchpad.toml";

/// Main configuration structure for the launchpad workflow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Transition engine settings
    pub engine: EngineConfig,
    /// Which store backs the workflow
    pub storage: StorageConfig,
    /// SQLite settings, used when `storage.backend = "sqlite"`
    pub database: Option<DatabaseConfig>,
    /// Per-role grant overrides; roles not listed keep the built-in grant
    #[serde(default)]
    pub permissions: BTreeMap<Role, RolePermission>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level, used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Deadline for each store call made by a transition
    pub store_timeout_ms: u64,
}

impl EngineConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding the JSON state file and its lock
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json: false,
            },
            engine: EngineConfig {
                store_timeout_ms: 5_000,
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                state_dir: PathBuf::from(".launchpad"),
            },
            database: Some(DatabaseConfig {
                url: "sqlite://.launchpad/launchpad.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            }),
            permissions: BTreeMap::new(),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. `launchpad.toml` in the working directory
    /// 3. Environment variables (`LAUNCHPAD_STORAGE__BACKEND=memory`)
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Same as [`WorkflowConfig::load`], reading `path` instead of
    /// `launchpad.toml`. An explicit path must exist.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())?;
        let mut builder = Config::builder().add_source(defaults);

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(CONFIG_FILE).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix("LAUNCHPAD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to read configuration")?;
        let workflow_config: WorkflowConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(workflow_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env from the working directory if it exists. Returns whether a
    /// file was loaded; this runs before logging is set up, so the caller
    /// reports it.
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        dotenvy::from_path(path)?;
        Ok(true)
    }

    /// Built-in grants with the configured per-role overrides applied
    pub fn authorizer(&self) -> TransitionAuthorizer {
        TransitionAuthorizer::with_overrides(&self.permissions)
    }
}
