use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use tracing::debug;

use super::{AuditStore, SiteRecord, SiteStore, StoreError, StoreSnapshot, TransitionStore};
use crate::workflow::{AuditEntry, Stage, StageUpdate};

const DATA_FILE: &str = "workflow.json";
const LOCK_FILE: &str = "workflow.lock";

/// JSON-file store for single-host deployments and the operator CLI.
///
/// Every mutation holds an exclusive lock on `workflow.lock` for its whole
/// read-modify-write and replaces `workflow.json` through a rename, so
/// readers in other processes see either the old or the new snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn open_lock(&self) -> Result<RwLock<File>, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(self.lock_path())?;
        Ok(RwLock::new(file))
    }

    fn load(&self) -> Result<StoreSnapshot, StoreError> {
        let path = self.data_path();
        if !path.exists() {
            return Ok(StoreSnapshot::default());
        }
        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            return Ok(StoreSnapshot::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let tmp = self.dir.join(format!("{DATA_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(snapshot)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.data_path())?;
        Ok(())
    }

    /// Read a consistent snapshot under a shared lock. A missing state
    /// directory reads as empty and is not created.
    pub async fn read_snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let store = self.clone();
        run_blocking(move || {
            if !store.dir.is_dir() {
                return Ok(StoreSnapshot::default());
            }
            let lock = store.open_lock()?;
            let _guard = lock.read()?;
            store.load()
        })
        .await
    }

    /// Apply `change` under the exclusive lock and persist the result. The
    /// file is left untouched when `change` fails.
    async fn mutate<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreSnapshot) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        run_blocking(move || {
            let mut lock = store.open_lock()?;
            let _guard = lock.write()?;
            let mut snapshot = store.load()?;
            let value = change(&mut snapshot)?;
            store.persist(&snapshot)?;
            debug!(path = %store.data_path().display(), "Workflow snapshot persisted");
            Ok(value)
        })
        .await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Backend(format!("file store task failed: {e}")))?
}

#[async_trait]
impl SiteStore for JsonFileStore {
    async fn create_site(&self, site_id: &str, created_at: DateTime<Utc>) -> Result<SiteRecord, StoreError> {
        let site_id = site_id.to_string();
        self.mutate(move |snapshot| snapshot.create_site(&site_id, created_at))
            .await
    }

    async fn get_current_stage(&self, site_id: &str) -> Result<Stage, StoreError> {
        self.read_snapshot().await?.current_stage(site_id)
    }

    async fn update_stage(&self, update: &StageUpdate) -> Result<(), StoreError> {
        let update = update.clone();
        self.mutate(move |snapshot| snapshot.apply_update(&update)).await
    }

    async fn current_stages(&self) -> Result<Vec<Stage>, StoreError> {
        Ok(self.read_snapshot().await?.stages())
    }
}

#[async_trait]
impl AuditStore for JsonFileStore {
    async fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let entry = entry.clone();
        self.mutate(move |snapshot| snapshot.insert_entry(&entry)).await
    }

    async fn query_by_site(&self, site_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.read_snapshot().await?.entries_for(site_id))
    }
}

#[async_trait]
impl TransitionStore for JsonFileStore {
    async fn commit_transition(&self, update: &StageUpdate, entry: &AuditEntry) -> Result<(), StoreError> {
        let update = update.clone();
        let entry = entry.clone();
        self.mutate(move |snapshot| snapshot.commit(&update, &entry)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join("state");
        let store = JsonFileStore::new(&state_dir);
        assert!(store.current_stages().await.unwrap().is_empty());
        assert!(store.query_by_site("s1").await.unwrap().is_empty());
        assert!(matches!(
            store.get_current_stage("s1").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!state_dir.exists());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.create_site("s1", Utc::now()).await.unwrap();
        store
            .update_stage(&StageUpdate {
                site_id: "s1".to_string(),
                expected_from: Stage::SiteCreated,
                new_stage: Stage::StudyDone,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let reopened = JsonFileStore::new(dir.path());
        assert_eq!(reopened.get_current_stage("s1").await.unwrap(), Stage::StudyDone);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.create_site("s1", Utc::now()).await.unwrap();
        let before = std::fs::read(store.data_path()).unwrap();

        let err = store.create_site("s1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(std::fs::read(store.data_path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DATA_FILE), b"{not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.current_stages().await,
            Err(StoreError::Serialization(_))
        ));
    }
}
