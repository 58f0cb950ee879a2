//! Workflow stage template definitions.
//!
//! A workflow template is an ordered list of stages. Stage orders are
//! authoritative for sequencing and may be non-contiguous; code must never
//! assume `order == index + 1`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One stage definition inside a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: i64,
    pub workflow_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordering key within the workflow. Gaps are legal.
    pub order: i32,
    /// Team names the stage is assigned to by default.
    #[serde(default)]
    pub default_assignee: Vec<String>,
    /// Additional teams shown alongside the default assignment.
    #[serde(default)]
    pub co_assignees: Vec<String>,
    /// Estimated working days for the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<Decimal>,
    #[serde(default)]
    pub visible_in_portal: bool,
    #[serde(default)]
    pub attachment_management_needed: bool,
    /// Raw component configuration carried through for enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<serde_json::Value>,
}

impl WorkflowStage {
    /// Joined display string of default and co-assigned teams.
    pub fn assignee_display(&self) -> String {
        self.default_assignee
            .iter()
            .chain(self.co_assignees.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Sort stages into template order, preserving relative order of equal keys.
pub fn sort_by_order(stages: &mut [WorkflowStage]) {
    stages.sort_by_key(|s| s.order);
}
