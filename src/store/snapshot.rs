use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SiteRecord, StoreError};
use crate::workflow::{AuditEntry, Stage, StageUpdate};

/// Complete store contents shared by the in-memory and JSON-file stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub sites: BTreeMap<String, SiteRecord>,
    pub audit: Vec<AuditEntry>,
}

impl StoreSnapshot {
    pub fn create_site(&mut self, site_id: &str, created_at: DateTime<Utc>) -> Result<SiteRecord, StoreError> {
        if self.sites.contains_key(site_id) {
            return Err(StoreError::AlreadyExists(site_id.to_string()));
        }
        let record = SiteRecord {
            site_id: site_id.to_string(),
            stage: Stage::SiteCreated,
            created_at,
            updated_at: created_at,
        };
        self.sites.insert(site_id.to_string(), record.clone());
        Ok(record)
    }

    pub fn current_stage(&self, site_id: &str) -> Result<Stage, StoreError> {
        self.sites
            .get(site_id)
            .map(|record| record.stage)
            .ok_or_else(|| StoreError::NotFound(site_id.to_string()))
    }

    /// Check the compare-and-swap precondition without mutating anything.
    pub fn check_update(&self, update: &StageUpdate) -> Result<(), StoreError> {
        let actual = self.current_stage(&update.site_id)?;
        if actual != update.expected_from {
            return Err(StoreError::Conflict {
                site_id: update.site_id.clone(),
                expected: update.expected_from,
                actual,
            });
        }
        Ok(())
    }

    pub fn apply_update(&mut self, update: &StageUpdate) -> Result<(), StoreError> {
        self.check_update(update)?;
        if let Some(record) = self.sites.get_mut(&update.site_id) {
            record.stage = update.new_stage;
            record.updated_at = update.updated_at;
        }
        Ok(())
    }

    pub fn insert_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        if self.audit.iter().any(|existing| existing.id == entry.id) {
            return Err(StoreError::Backend(format!("duplicate audit entry id {}", entry.id)));
        }
        self.audit.push(entry.clone());
        Ok(())
    }

    /// The precondition is checked before the entry is appended, and the
    /// update cannot fail once it holds, so an error leaves the snapshot
    /// untouched.
    pub fn commit(&mut self, update: &StageUpdate, entry: &AuditEntry) -> Result<(), StoreError> {
        self.check_update(update)?;
        self.insert_entry(entry)?;
        self.apply_update(update)
    }

    pub fn entries_for(&self, site_id: &str) -> Vec<AuditEntry> {
        self.audit
            .iter()
            .filter(|entry| entry.site_id == site_id)
            .cloned()
            .collect()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.sites.values().map(|record| record.stage).collect()
    }
}
