// Site lifecycle workflow: stage model, role grants, transition orchestration,
// audit trail and stage statistics.

pub mod audit;
pub mod authorizer;
pub mod engine;
pub mod stage;
pub mod stats;
pub mod types;

pub use audit::{newest_first, AuditTrail};
pub use authorizer::{RolePermission, TransitionAuthorizer};
pub use engine::WorkflowEngine;
pub use stage::{ProgressionCheck, Role, RoleParseError, Stage, StageParseError, StatusModel};
pub use stats::{StageCounts, WorkflowStats};
pub use types::{
    AuditEntry, ProgressionAdvice, StageUpdate, TransitionErrorKind, TransitionRequest,
    TransitionResult,
};
