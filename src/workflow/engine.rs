use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn, Instrument};

use super::audit::AuditTrail;
use super::authorizer::TransitionAuthorizer;
use super::stage::{Role, Stage, StatusModel};
use super::stats::{StageCounts, WorkflowStats};
use super::types::{
    AuditEntry, ProgressionAdvice, StageUpdate, TransitionErrorKind, TransitionRequest,
    TransitionResult,
};
use crate::cancel::{guarded, CancelSignal};
use crate::config::WorkflowConfig;
use crate::store::{SiteRecord, StoreError, TransitionStore};
use crate::telemetry::{create_transition_span, generate_correlation_id};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const PERSISTENCE_FAILED: &str = "Failed to update site status in database";
const CONCURRENT_CONFLICT: &str = "conflict: stage changed concurrently";
const UNEXPECTED_ERROR: &str = "An unexpected error occurred during status transition";

/// Orchestrates site stage transitions against a [`TransitionStore`].
///
/// The engine holds no site state of its own and can be shared across tasks
/// behind an `Arc`. Every expected failure is reported through
/// [`TransitionResult`]; nothing is written unless both guards pass.
pub struct WorkflowEngine<S: ?Sized = dyn TransitionStore> {
    store: Arc<S>,
    authorizer: TransitionAuthorizer,
    store_timeout: Duration,
}

impl<S: TransitionStore + ?Sized> WorkflowEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            authorizer: TransitionAuthorizer::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn from_config(store: Arc<S>, config: &WorkflowConfig) -> Self {
        Self::new(store)
            .with_authorizer(config.authorizer())
            .with_store_timeout(config.engine.store_timeout())
    }

    pub fn with_authorizer(mut self, authorizer: TransitionAuthorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn authorizer(&self) -> &TransitionAuthorizer {
        &self.authorizer
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn audit_trail(&self) -> AuditTrail<'_, S> {
        AuditTrail::new(self.store.as_ref())
    }

    /// Authorize, validate and apply one transition request.
    pub async fn transition_site_status(
        &self,
        request: &TransitionRequest,
        cancel: &CancelSignal,
    ) -> TransitionResult {
        let correlation_id = generate_correlation_id();
        let span = create_transition_span(request, &correlation_id);

        async move {
            match self.apply_transition(request, cancel).await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Unexpected error during status transition");
                    TransitionResult::failed(TransitionErrorKind::UnexpectedError, UNEXPECTED_ERROR)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// `Err` is reserved for interruptions (timeout, cancellation); every
    /// answer from the guards or the store is an `Ok` result.
    async fn apply_transition(
        &self,
        request: &TransitionRequest,
        cancel: &CancelSignal,
    ) -> Result<TransitionResult, StoreError> {
        let (from, to, role) = (request.from_stage, request.to_stage, request.actor_role);

        if !self.authorizer.has_permission(from, to, role) {
            info!("Transition rejected: role lacks permission for this stage pair");
            return Ok(TransitionResult::failed(
                TransitionErrorKind::PermissionDenied,
                format!("Insufficient permissions. {role} cannot transition from {from} to {to}"),
            ));
        }

        let validation = StatusModel::validate_progression(from, to);
        if !validation.valid && !role.is_admin() {
            let reason = validation
                .reason
                .unwrap_or_else(|| "Invalid progression".to_string());
            info!(reason = %reason, "Transition rejected: invalid progression");
            return Ok(TransitionResult::failed(
                TransitionErrorKind::InvalidProgression,
                reason,
            ));
        }

        let admin_override = !validation.valid && role.is_admin();
        if admin_override {
            warn!(
                actor_id = %request.actor_id,
                bypassed = ?validation.reason,
                "Admin override bypasses sequence validation"
            );
        }

        let now = Utc::now();
        let update = StageUpdate {
            site_id: request.site_id.clone(),
            expected_from: from,
            new_stage: to,
            updated_at: now,
        };
        let entry = AuditEntry::for_request(request, admin_override, now);

        let committed = guarded(
            self.store_timeout,
            cancel,
            self.store.commit_transition(&update, &entry),
        )
        .await;

        match committed {
            Ok(()) => {}
            Err(e) if e.is_interruption() => return Err(e),
            Err(e) if e.is_conflict() => {
                error!(error = %e, "Stage changed concurrently; transition not applied");
                return Ok(TransitionResult::failed(
                    TransitionErrorKind::PersistenceFailure,
                    CONCURRENT_CONFLICT,
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to update site status");
                return Ok(TransitionResult::failed(
                    TransitionErrorKind::PersistenceFailure,
                    PERSISTENCE_FAILED,
                ));
            }
        }

        info!(audit.id = %entry.id, admin_override, "Site status transition applied");

        let message = if admin_override {
            format!("Status updated with admin override from {from} to {to}")
        } else {
            format!("Status successfully updated from {from} to {to}")
        };
        Ok(TransitionResult::applied(message, to, now, admin_override))
    }

    /// Advisory: stages `role` may target from `current`.
    pub fn get_valid_next_statuses(&self, current: Stage, role: Role) -> BTreeSet<Stage> {
        self.authorizer.valid_next_stages(current, role)
    }

    pub fn validate_site_progression(
        &self,
        current: Stage,
        target: Stage,
        is_admin: bool,
    ) -> ProgressionAdvice {
        if is_admin {
            return ProgressionAdvice {
                can_progress: true,
                message: "Admin override available".to_string(),
            };
        }
        let check = StatusModel::validate_progression(current, target);
        if check.valid {
            ProgressionAdvice {
                can_progress: true,
                message: "Valid progression".to_string(),
            }
        } else {
            ProgressionAdvice {
                can_progress: false,
                message: check
                    .reason
                    .unwrap_or_else(|| "Invalid progression".to_string()),
            }
        }
    }

    /// Register a new site at the first stage.
    pub async fn create_site(&self, site_id: &str, cancel: &CancelSignal) -> Result<SiteRecord, StoreError> {
        let record = guarded(
            self.store_timeout,
            cancel,
            self.store.create_site(site_id, Utc::now()),
        )
        .await?;
        info!(site_id, stage = %record.stage, "Site created");
        Ok(record)
    }

    pub async fn current_stage(&self, site_id: &str, cancel: &CancelSignal) -> Result<Stage, StoreError> {
        guarded(self.store_timeout, cancel, self.store.get_current_stage(site_id)).await
    }

    /// Audit entries of one site, newest first.
    pub async fn get_site_audit_logs(
        &self,
        site_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        guarded(self.store_timeout, cancel, self.audit_trail().get_for_site(site_id)).await
    }

    /// Site counts per stage, with every stage present.
    pub async fn get_workflow_stats(&self, cancel: &CancelSignal) -> Result<StageCounts, StoreError> {
        let stages = guarded(self.store_timeout, cancel, self.store.current_stages()).await?;
        Ok(WorkflowStats::aggregate(stages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::store::{AuditStore, SiteStore};
    use async_trait::async_trait;
    use chrono::DateTime;
    use mockall::mock;

    mock! {
        pub Store {}

        #[async_trait]
        impl SiteStore for Store {
            async fn create_site(&self, site_id: &str, created_at: DateTime<Utc>) -> Result<SiteRecord, StoreError>;
            async fn get_current_stage(&self, site_id: &str) -> Result<Stage, StoreError>;
            async fn update_stage(&self, update: &StageUpdate) -> Result<(), StoreError>;
            async fn current_stages(&self) -> Result<Vec<Stage>, StoreError>;
        }

        #[async_trait]
        impl AuditStore for Store {
            async fn insert(&self, entry: &AuditEntry) -> Result<(), StoreError>;
            async fn query_by_site(&self, site_id: &str) -> Result<Vec<AuditEntry>, StoreError>;
        }

        #[async_trait]
        impl TransitionStore for Store {
            async fn commit_transition(&self, update: &StageUpdate, entry: &AuditEntry) -> Result<(), StoreError>;
        }
    }

    fn engine(store: MockStore) -> WorkflowEngine<MockStore> {
        WorkflowEngine::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_permission_denied_writes_nothing() {
        let mut store = MockStore::new();
        store.expect_commit_transition().never();

        let request = TransitionRequest::new(
            "s1",
            Stage::Approved,
            Stage::ProcurementDone,
            "u1",
            Role::OpsManager,
        );
        let result = engine(store)
            .transition_site_status(&request, &CancelSignal::never())
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(TransitionErrorKind::PermissionDenied));
        assert_eq!(
            result.message,
            "Insufficient permissions. ops_manager cannot transition from approved to procurement_done"
        );
    }

    #[tokio::test]
    async fn test_invalid_progression_writes_nothing() {
        let mut store = MockStore::new();
        store.expect_commit_transition().never();

        let request =
            TransitionRequest::new("s1", Stage::SiteCreated, Stage::Approved, "u1", Role::OpsManager);
        let result = engine(store)
            .transition_site_status(&request, &CancelSignal::never())
            .await;

        assert_eq!(result.error_kind, Some(TransitionErrorKind::InvalidProgression));
        assert!(result.message.contains("site_study_done"));
        assert!(!result.is_retryable());
    }

    #[tokio::test]
    async fn test_commit_carries_compare_and_swap_and_override_flag() {
        let mut store = MockStore::new();
        store
            .expect_commit_transition()
            .withf(|update, entry| {
                update.expected_from == Stage::Live
                    && update.new_stage == Stage::Deployed
                    && entry.admin_override
                    && entry.updated_matches(update)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let request = TransitionRequest::new("s1", Stage::Live, Stage::Deployed, "root", Role::Admin)
            .with_reason("rollback after failed go-live");
        let result = engine(store)
            .transition_site_status(&request, &CancelSignal::never())
            .await;

        assert!(result.success);
        assert!(result.admin_override);
        assert_eq!(result.new_stage, Some(Stage::Deployed));
        assert_eq!(
            result.message,
            "Status updated with admin override from live to deployed"
        );
    }

    #[tokio::test]
    async fn test_conflict_is_retryable_persistence_failure() {
        let mut store = MockStore::new();
        store.expect_commit_transition().times(1).returning(|update, _| {
            Err(StoreError::Conflict {
                site_id: update.site_id.clone(),
                expected: update.expected_from,
                actual: Stage::ProcurementDone,
            })
        });

        let request = TransitionRequest::new(
            "s1",
            Stage::Approved,
            Stage::ProcurementDone,
            "u2",
            Role::DeploymentEngineer,
        );
        let result = engine(store)
            .transition_site_status(&request, &CancelSignal::never())
            .await;

        assert_eq!(result.message, "conflict: stage changed concurrently");
        assert_eq!(result.error_kind, Some(TransitionErrorKind::PersistenceFailure));
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_backend_failure_reports_database_message() {
        let mut store = MockStore::new();
        store
            .expect_commit_transition()
            .times(1)
            .returning(|_, _| Err(StoreError::Backend("connection reset".to_string())));

        let request =
            TransitionRequest::new("s1", Stage::SiteCreated, Stage::StudyDone, "u1", Role::OpsManager);
        let result = engine(store)
            .transition_site_status(&request, &CancelSignal::never())
            .await;

        assert_eq!(result.message, "Failed to update site status in database");
        assert!(!result.message.contains("connection reset"));
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_cancelled_request_is_unexpected_and_writes_nothing() {
        let mut store = MockStore::new();
        store.expect_commit_transition().never();
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let request =
            TransitionRequest::new("s1", Stage::SiteCreated, Stage::StudyDone, "u1", Role::OpsManager);
        let result = engine(store).transition_site_status(&request, &signal).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(TransitionErrorKind::UnexpectedError));
        assert_eq!(result.message, "An unexpected error occurred during status transition");
    }

    #[test]
    fn test_validate_site_progression_messages() {
        let engine = engine(MockStore::new());

        let admin = engine.validate_site_progression(Stage::Live, Stage::SiteCreated, true);
        assert!(admin.can_progress);
        assert_eq!(admin.message, "Admin override available");

        let valid = engine.validate_site_progression(Stage::Deployed, Stage::Live, false);
        assert_eq!(valid.message, "Valid progression");

        let invalid = engine.validate_site_progression(Stage::Deployed, Stage::Approved, false);
        assert!(!invalid.can_progress);
        assert_eq!(invalid.message, "cannot move backwards");
    }

    #[tokio::test]
    async fn test_stats_zero_fill_from_store() {
        let mut store = MockStore::new();
        store
            .expect_current_stages()
            .times(1)
            .returning(|| Ok(vec![Stage::Live, Stage::Live]));

        let stats = engine(store)
            .get_workflow_stats(&CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(stats.len(), 7);
        assert_eq!(stats[&Stage::Live], 2);
        assert_eq!(stats[&Stage::SiteCreated], 0);
    }

    impl AuditEntry {
        fn updated_matches(&self, update: &StageUpdate) -> bool {
            self.site_id == update.site_id
                && self.from_stage == update.expected_from
                && self.to_stage == update.new_stage
                && self.created_at == update.updated_at
        }
    }
}
