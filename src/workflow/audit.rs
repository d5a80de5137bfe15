use tracing::{debug, error};

use super::types::AuditEntry;
use crate::store::{AuditStore, StoreError};

/// Read and append access to the workflow audit log of a store.
pub struct AuditTrail<'a, S: AuditStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: AuditStore + ?Sized> AuditTrail<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Insert a standalone entry. Failures are logged and returned to the
    /// caller.
    pub async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        match self.store.insert(entry).await {
            Ok(()) => {
                debug!(
                    audit.id = %entry.id,
                    site_id = %entry.site_id,
                    from = %entry.from_stage,
                    to = %entry.to_stage,
                    "Audit entry appended"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    audit.id = %entry.id,
                    site_id = %entry.site_id,
                    error = %e,
                    "Failed to append audit entry"
                );
                Err(e)
            }
        }
    }

    /// Entries for `site_id`, newest first.
    pub async fn get_for_site(&self, site_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = self.store.query_by_site(site_id).await?;
        Ok(newest_first(entries))
    }
}

/// Order entries by `created_at` descending. Entries sharing a timestamp
/// come out in reverse insertion order.
pub fn newest_first(mut entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
    entries.reverse();
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries
}
