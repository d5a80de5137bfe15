//! JSON file store integration tests
//!
//! The file store is what the CLI uses by default, so these check that state
//! survives reopening and that two handles on one directory stay consistent.

use chrono::Utc;
use launchpad_workflow::store::{AuditStore, JsonFileStore, SiteStore, TransitionStore};
use launchpad_workflow::{CancelSignal, Role, Stage, TransitionErrorKind, TransitionRequest, WorkflowEngine};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_engine_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelSignal::never();

    {
        let engine = WorkflowEngine::new(Arc::new(JsonFileStore::new(dir.path())));
        engine.create_site("north-1", &cancel).await.unwrap();
        let request = TransitionRequest::new(
            "north-1",
            Stage::SiteCreated,
            Stage::StudyDone,
            "ops-1",
            Role::OpsManager,
        )
        .with_reason("survey uploaded");
        assert!(engine.transition_site_status(&request, &cancel).await.success);
    }

    let reopened = JsonFileStore::new(dir.path());
    assert_eq!(reopened.get_current_stage("north-1").await.unwrap(), Stage::StudyDone);
    let log = reopened.query_by_site("north-1").await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].reason.as_deref(), Some("survey uploaded"));
    assert!(reopened.data_path().exists());
}

#[tokio::test]
async fn test_two_handles_see_each_others_commits() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelSignal::never();
    let first = WorkflowEngine::new(Arc::new(JsonFileStore::new(dir.path())));
    let second = WorkflowEngine::new(Arc::new(JsonFileStore::new(dir.path())));

    first.create_site("east-2", &cancel).await.unwrap();
    let request =
        TransitionRequest::new("east-2", Stage::SiteCreated, Stage::StudyDone, "ops-1", Role::OpsManager);

    assert!(first.transition_site_status(&request, &cancel).await.success);

    // Same request through the other handle now loses the compare-and-swap.
    let replay = second.transition_site_status(&request, &cancel).await;
    assert_eq!(replay.error_kind, Some(TransitionErrorKind::PersistenceFailure));
    assert!(replay.is_retryable());

    let stats = second.get_workflow_stats(&cancel).await.unwrap();
    assert_eq!(stats[&Stage::StudyDone], 1);
}

#[tokio::test]
async fn test_failed_commit_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());
    store.create_site("west-3", Utc::now()).await.unwrap();
    let before = std::fs::read(store.data_path()).unwrap();

    let request =
        TransitionRequest::new("west-3", Stage::Approved, Stage::ProcurementDone, "eng-1", Role::DeploymentEngineer);
    let update = launchpad_workflow::workflow::StageUpdate {
        site_id: "west-3".to_string(),
        expected_from: Stage::Approved,
        new_stage: Stage::ProcurementDone,
        updated_at: Utc::now(),
    };
    let entry = launchpad_workflow::AuditEntry::for_request(&request, false, update.updated_at);
    let err = store.commit_transition(&update, &entry).await.unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(std::fs::read(store.data_path()).unwrap(), before);
}
