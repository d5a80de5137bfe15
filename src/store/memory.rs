use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{AuditStore, SiteRecord, SiteStore, StoreError, StoreSnapshot, TransitionStore};
use crate::workflow::{AuditEntry, Stage, StageUpdate};

/// Process-local store. Sites and audit rows share one lock, so a commit is
/// atomic with respect to every other call.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl SiteStore for InMemoryStore {
    async fn create_site(&self, site_id: &str, created_at: DateTime<Utc>) -> Result<SiteRecord, StoreError> {
        self.state.write().await.create_site(site_id, created_at)
    }

    async fn get_current_stage(&self, site_id: &str) -> Result<Stage, StoreError> {
        self.state.read().await.current_stage(site_id)
    }

    async fn update_stage(&self, update: &StageUpdate) -> Result<(), StoreError> {
        self.state.write().await.apply_update(update)
    }

    async fn current_stages(&self) -> Result<Vec<Stage>, StoreError> {
        Ok(self.state.read().await.stages())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.state.write().await.insert_entry(entry)
    }

    async fn query_by_site(&self, site_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.state.read().await.entries_for(site_id))
    }
}

#[async_trait]
impl TransitionStore for InMemoryStore {
    async fn commit_transition(&self, update: &StageUpdate, entry: &AuditEntry) -> Result<(), StoreError> {
        self.state.write().await.commit(update, entry)
    }
}
