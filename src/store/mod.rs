// Persistence collaborators for the workflow engine.
// The engine only talks to these traits; stage ownership lives behind them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::config::{StorageBackend, WorkflowConfig};
use crate::workflow::{AuditEntry, Stage, StageUpdate};

pub mod file;
pub mod memory;
pub mod snapshot;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use snapshot::StoreSnapshot;

/// Errors reported by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Site not found: {0}")]
    NotFound(String),

    #[error("Site already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: stage changed concurrently for {site_id} (expected {expected}, found {actual})")]
    Conflict {
        site_id: String,
        expected: Stage,
        actual: Stage,
    },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Timeouts and cancellation are interruptions of the call rather than
    /// answers from the store.
    pub fn is_interruption(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Cancelled)
    }
}

/// Current record of one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub site_id: String,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Site stage ownership.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SiteStore: Send + Sync {
    /// Register a new site at the first stage.
    async fn create_site(&self, site_id: &str, created_at: DateTime<Utc>) -> Result<SiteRecord, StoreError>;

    async fn get_current_stage(&self, site_id: &str) -> Result<Stage, StoreError>;

    /// Compare-and-swap the site's stage. Fails with [`StoreError::Conflict`]
    /// when the stored stage is not `update.expected_from`.
    async fn update_stage(&self, update: &StageUpdate) -> Result<(), StoreError>;

    /// Current stage of every site, one entry per site.
    async fn current_stages(&self) -> Result<Vec<Stage>, StoreError>;
}

/// Append-only audit rows.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Entries for one site in insertion order.
    async fn query_by_site(&self, site_id: &str) -> Result<Vec<AuditEntry>, StoreError>;
}

/// A store that can apply a stage update and its audit entry as one unit.
#[async_trait]
pub trait TransitionStore: SiteStore + AuditStore {
    /// Apply `update` and insert `entry` atomically: either both are
    /// persisted or neither is.
    async fn commit_transition(&self, update: &StageUpdate, entry: &AuditEntry) -> Result<(), StoreError>;
}

/// Open the store selected by configuration.
pub async fn open_store(config: &WorkflowConfig) -> Result<Arc<dyn TransitionStore>> {
    let store: Arc<dyn TransitionStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::File => Arc::new(JsonFileStore::new(&config.storage.state_dir)),
        StorageBackend::Sqlite => open_sqlite(config).await?,
    };
    tracing::debug!(backend = ?config.storage.backend, "Workflow store opened");
    Ok(store)
}

#[cfg(feature = "database")]
async fn open_sqlite(config: &WorkflowConfig) -> Result<Arc<dyn TransitionStore>> {
    let db = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("storage.backend = \"sqlite\" requires a [database] section"))?;
    let store = crate::database::SqliteStore::connect(db).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_sqlite(_config: &WorkflowConfig) -> Result<Arc<dyn TransitionStore>> {
    anyhow::bail!("SQLite storage requires building with the `database` feature")
}
