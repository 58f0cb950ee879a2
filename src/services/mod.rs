//! Collaborator boundaries.
//!
//! Permission decisions, condition evaluation, notification delivery, audit
//! storage, and workflow template lookup live outside this crate. The engine
//! consumes them through these traits; tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Actor, Case, WorkflowStage};

/// Authorization check applied before every case mutation.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Whether `actor` may modify `case`. Errors are treated as denial by
    /// callers, never as permission.
    async fn can_modify_case(&self, actor: &Actor, case: &Case) -> Result<bool>;
}

/// Read-only access to workflow templates.
#[async_trait]
pub trait StageDirectory: Send + Sync {
    /// All stages of a workflow, unordered. Callers sort by template order.
    async fn stages_for_workflow(&self, workflow_id: i64) -> Result<Vec<WorkflowStage>>;
}

/// Result of condition evaluation after a stage completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionOutcome {
    /// Number of configured actions the engine executed.
    pub actions_executed: u32,
}

impl ConditionOutcome {
    /// Any executed action takes over stage routing, so the default advance
    /// must not run.
    pub fn suppresses_advance(&self) -> bool {
        self.actions_executed > 0
    }
}

/// External rules engine consulted after each stage completion.
#[async_trait]
pub trait ConditionEngine: Send + Sync {
    async fn evaluate_stage_completion(
        &self,
        case: &Case,
        completed_stage_id: i64,
    ) -> Result<ConditionOutcome>;
}

/// Payload for a stage-completed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCompletionNotice {
    pub case_id: i64,
    pub case_name: String,
    pub completed_stage_id: i64,
    pub completed_stage_name: String,
    pub next_stage_id: Option<i64>,
    pub next_stage_name: Option<String>,
    /// Default assignees and co-assignees of the newly current stage.
    pub recipients: Vec<String>,
    pub case_url: Option<String>,
}

/// Delivery channel for stage notifications. Best effort; failures are logged
/// by the side-effect workers and never surface to the caller.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn stage_completed(&self, notice: &StageCompletionNotice) -> Result<()>;
}

/// One audit record describing a case mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub case_id: i64,
    /// Short operation token, e.g. `Pause`, `CompleteStage`, `Reject`.
    pub operation: String,
    pub actor_name: String,
    pub actor_id: Option<i64>,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

impl OperationRecord {
    pub fn new(
        case_id: i64,
        operation: impl Into<String>,
        actor: &Actor,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            case_id,
            operation: operation.into(),
            actor_name: actor.name.clone(),
            actor_id: actor.id,
            detail: detail.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Sink for audit records, consumed by the side-effect workers.
#[async_trait]
pub trait OperationLogger: Send + Sync {
    async fn log(&self, record: &OperationRecord) -> Result<()>;
}
