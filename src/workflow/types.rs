use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::{Role, Stage};

/// A caller's request to move one site between stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub site_id: String,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub actor_id: String,
    pub actor_role: Role,
    pub reason: Option<String>,
}

impl TransitionRequest {
    pub fn new(
        site_id: impl Into<String>,
        from_stage: Stage,
        to_stage: Stage,
        actor_id: impl Into<String>,
        actor_role: Role,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            from_stage,
            to_stage,
            actor_id: actor_id.into(),
            actor_role,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Why a transition was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionErrorKind {
    PermissionDenied,
    InvalidProgression,
    PersistenceFailure,
    UnexpectedError,
}

impl TransitionErrorKind {
    /// Only persistence failures are worth retrying after re-reading the
    /// current stage.
    pub fn is_retryable(self) -> bool {
        matches!(self, TransitionErrorKind::PersistenceFailure)
    }
}

/// Outcome of a transition request. Every expected failure is reported here
/// rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TransitionErrorKind>,
    #[serde(default)]
    pub admin_override: bool,
}

impl TransitionResult {
    pub fn applied(
        message: String,
        new_stage: Stage,
        timestamp: DateTime<Utc>,
        admin_override: bool,
    ) -> Self {
        Self {
            success: true,
            message,
            new_stage: Some(new_stage),
            timestamp: Some(timestamp),
            error_kind: None,
            admin_override,
        }
    }

    pub fn failed(kind: TransitionErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            new_stage: None,
            timestamp: None,
            error_kind: Some(kind),
            admin_override: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.error_kind.is_some_and(TransitionErrorKind::is_retryable)
    }
}

/// Immutable record of one applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub site_id: String,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub actor_id: String,
    pub actor_role: Role,
    pub reason: Option<String>,
    pub admin_override: bool,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn for_request(
        request: &TransitionRequest,
        admin_override: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site_id: request.site_id.clone(),
            from_stage: request.from_stage,
            to_stage: request.to_stage,
            actor_id: request.actor_id.clone(),
            actor_role: request.actor_role,
            reason: request.reason.clone(),
            admin_override,
            created_at,
        }
    }
}

/// Compare-and-swap write of a site's stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUpdate {
    pub site_id: String,
    pub expected_from: Stage,
    pub new_stage: Stage,
    pub updated_at: DateTime<Utc>,
}

/// Advisory answer for UI collaborators asking whether a move is possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionAdvice {
    pub can_progress: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_persistence_failures_are_retryable() {
        assert!(TransitionErrorKind::PersistenceFailure.is_retryable());
        assert!(!TransitionErrorKind::PermissionDenied.is_retryable());
        assert!(!TransitionErrorKind::InvalidProgression.is_retryable());
        assert!(!TransitionErrorKind::UnexpectedError.is_retryable());

        let result = TransitionResult::failed(TransitionErrorKind::PersistenceFailure, "conflict");
        assert!(result.is_retryable());
        assert!(!result.success);
        assert!(result.new_stage.is_none());
    }

    #[test]
    fn test_audit_entry_copies_request() {
        let request = TransitionRequest::new(
            "site-1",
            Stage::Approved,
            Stage::ProcurementDone,
            "user-7",
            Role::DeploymentEngineer,
        )
        .with_reason("hardware ordered");
        let now = Utc::now();
        let entry = AuditEntry::for_request(&request, false, now);

        assert_eq!(entry.site_id, "site-1");
        assert_eq!(entry.from_stage, Stage::Approved);
        assert_eq!(entry.to_stage, Stage::ProcurementDone);
        assert_eq!(entry.actor_role, Role::DeploymentEngineer);
        assert_eq!(entry.reason.as_deref(), Some("hardware ordered"));
        assert_eq!(entry.created_at, now);
        assert!(Uuid::parse_str(&entry.id).is_ok());
    }

    #[test]
    fn test_result_json_shape() {
        let result = TransitionResult::failed(TransitionErrorKind::PermissionDenied, "nope");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_kind"], "permission_denied");
        assert!(json.get("new_stage").is_none());
    }
}
