//! # Case Model
//!
//! A case is one customer instance progressing through a configurable
//! multi-stage workflow. The entity carries its overall lifecycle status, the
//! current-stage pointer, a completion rate, and the embedded ordered
//! stage-progress list stored as a JSONB column.
//!
//! Cases are created once by the case-creation flow, mutated exclusively
//! through the lifecycle state machine and the stage orchestrator, and never
//! physically deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{business_rule, Result};
use crate::progress::StageProgress;
use crate::state_machine::CaseState;

/// Upper bound on the free-text notes log, matching the storage column.
pub const MAX_NOTES_LEN: usize = 1000;

/// The operator performing a mutation, resolved by the caller's auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<i64>,
    pub name: String,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }

    /// Actor used for automated transitions with no human operator.
    pub fn system() -> Self {
        Self {
            id: None,
            name: "System".to_string(),
        }
    }
}

/// A case row with its embedded stage-progress list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    pub workflow_id: i64,
    pub name: String,
    pub status: CaseState,
    pub current_stage_id: Option<i64>,
    pub current_stage_order: i32,
    /// 0-100, two decimal places. Monotonically non-decreasing; the
    /// orchestrator enforces the floor against the previously stored value.
    pub completion_rate: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub current_stage_start_time: Option<DateTime<Utc>>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
    pub actual_completion_date: Option<DateTime<Utc>>,
    /// Bounded append/prepend log of operational notes.
    pub notes: Option<String>,
    /// Per-stage progress entries, one per workflow template stage.
    pub stages_progress: Vec<StageProgress>,
    pub stage_updated_time: Option<DateTime<Utc>>,
    pub stage_updated_by: Option<String>,
    pub stage_updated_by_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_by_id: Option<i64>,
}

impl Case {
    /// Whether any stage progress has been saved or completed. Once true, the
    /// workflow template reference is frozen.
    pub fn has_saved_progress(&self) -> bool {
        self.stages_progress.iter().any(|entry| {
            entry.is_completed || entry.completion_time.is_some() || entry.last_updated_time.is_some()
        })
    }

    /// Re-point the case at a different workflow template. Legal only while
    /// the case has not yet produced any saved or completed stage progress.
    pub fn set_workflow(&mut self, workflow_id: i64) -> Result<()> {
        if self.has_saved_progress() {
            return Err(business_rule(format!(
                "case {} already has saved stage progress; workflow cannot be changed",
                self.id
            )));
        }
        self.workflow_id = workflow_id;
        Ok(())
    }

    /// Append a note line, truncating at the storage bound.
    pub fn append_note(&mut self, text: &str) {
        let combined = match self.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{existing}. {text}"),
            _ => text.to_string(),
        };
        self.notes = Some(truncate_chars(&combined, MAX_NOTES_LEN));
    }

    /// Prepend a note line (used by cancellation so the reason leads the log).
    pub fn prepend_note(&mut self, text: &str) {
        let combined = match self.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{text}. {existing}"),
            _ => text.to_string(),
        };
        self.notes = Some(truncate_chars(&combined, MAX_NOTES_LEN));
    }

    /// Stamp the stage-tracking audit trio.
    pub fn touch_stage_tracking(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.stage_updated_time = Some(now);
        self.stage_updated_by = Some(actor.name.clone());
        self.stage_updated_by_id = actor.id;
    }

    /// Stamp the row-level audit trio.
    pub fn touch_audit(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.updated_at = now;
        self.updated_by = Some(actor.name.clone());
        self.updated_by_id = actor.id;
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
