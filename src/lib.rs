// Launchpad Workflow Library - Site Lifecycle Stage Transitions
// This exposes the core components for testing and integration

pub mod cancel;
pub mod config;
pub mod database;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use cancel::{cancel_pair, guarded, CancelHandle, CancelSignal};
pub use config::{StorageBackend, WorkflowConfig};
#[cfg(feature = "database")]
pub use database::SqliteStore;
pub use store::{
    open_store, AuditStore, InMemoryStore, JsonFileStore, SiteRecord, SiteStore, StoreError,
    TransitionStore,
};
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    AuditEntry, ProgressionAdvice, Role, RolePermission, Stage, StageCounts, StatusModel,
    TransitionAuthorizer, TransitionErrorKind, TransitionRequest, TransitionResult,
    WorkflowEngine, WorkflowStats,
};
