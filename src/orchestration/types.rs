//! Request and result shapes for stage completion.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CaseflowError, Result};
use crate::state_machine::CaseState;

/// Request to complete a stage of a case.
///
/// Two historical shapes name the target: `stageId` and the older
/// `completedStageId`. Either alone is fine; both are fine when they agree;
/// conflicting or absent selectors are malformed input, not a guess.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompleteStageRequest {
    #[serde(alias = "stage_id", skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<i64>,
    #[serde(alias = "completed_stage_id", skip_serializing_if = "Option::is_none")]
    pub completed_stage_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CompleteStageRequest {
    pub fn for_stage(stage_id: i64) -> Self {
        Self {
            stage_id: Some(stage_id),
            ..Self::default()
        }
    }

    /// Resolve the target stage id from the dual-shape selector.
    pub fn selector(&self) -> Result<i64> {
        match (self.stage_id, self.completed_stage_id) {
            (Some(a), Some(b)) if a != b => Err(CaseflowError::InvalidInput(format!(
                "conflicting stage selectors: stageId {a} vs completedStageId {b}"
            ))),
            (Some(id), _) | (None, Some(id)) => Ok(id),
            (None, None) => Err(CaseflowError::InvalidInput(
                "a stage selector is required".to_string(),
            )),
        }
    }
}

/// Outcome of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub case_id: i64,
    pub completed_stage_id: i64,
    pub status: CaseState,
    pub completion_rate: Decimal,
    /// Whether every stage is now completed or skipped.
    pub all_done: bool,
    /// The stage the case advanced to, when the default advance ran.
    pub next_stage_id: Option<i64>,
    /// True when the case was already Completed and the request became a
    /// no-op.
    pub no_op: bool,
}
