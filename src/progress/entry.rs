//! Stage-progress entry and status vocabulary.
//!
//! Entries live inside the case row as a JSONB array. Canonical wire keys are
//! camelCase; snake_case keys from the older persistence path are accepted on
//! read via aliases. Display metadata overlaid by enrichment is marked
//! `skip_serializing` so it can never leak back into storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CaseflowError, Result};
use crate::models::{Actor, MAX_NOTES_LEN};

/// Status of a single stage within a case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
    Rejected,
    Terminated,
}

impl StageStatus {
    /// Whether the stage can still be worked on.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Skipped => "Skipped",
            Self::Rejected => "Rejected",
            Self::Terminated => "Terminated",
        };
        write!(f, "{token}")
    }
}

impl FromStr for StageStatus {
    type Err = CaseflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(Self::Pending),
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Skipped" => Ok(Self::Skipped),
            "Rejected" => Ok(Self::Rejected),
            "Terminated" => Ok(Self::Terminated),
            other => Err(CaseflowError::InvalidInput(format!(
                "unknown stage status token: {other}"
            ))),
        }
    }
}

/// One stage's progress record inside a case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageProgress {
    #[serde(alias = "stage_id")]
    pub stage_id: i64,
    /// Sequential position 1..N, recomputed on every load and reconcile.
    /// Stored values are never trusted.
    #[serde(alias = "stage_order")]
    pub stage_order: i32,
    pub status: StageStatus,
    #[serde(alias = "is_completed")]
    pub is_completed: bool,
    #[serde(alias = "is_current")]
    pub is_current: bool,
    #[serde(alias = "start_time", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(alias = "completion_time", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(alias = "completed_by", skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(alias = "completed_by_id", skip_serializing_if = "Option::is_none")]
    pub completed_by_id: Option<i64>,
    #[serde(alias = "last_updated_time", skip_serializing_if = "Option::is_none")]
    pub last_updated_time: Option<DateTime<Utc>>,
    #[serde(alias = "last_updated_by", skip_serializing_if = "Option::is_none")]
    pub last_updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(alias = "co_assignees", skip_serializing_if = "Vec::is_empty")]
    pub co_assignees: Vec<String>,
    /// Per-case override of the template estimate, in working days.
    #[serde(alias = "custom_estimated_days", skip_serializing_if = "Option::is_none")]
    pub custom_estimated_days: Option<Decimal>,
    #[serde(alias = "custom_end_time", skip_serializing_if = "Option::is_none")]
    pub custom_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(alias = "rejection_reason", skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(alias = "rejection_time", skip_serializing_if = "Option::is_none")]
    pub rejection_time: Option<DateTime<Utc>>,
    #[serde(alias = "rejected_by", skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(alias = "termination_time", skip_serializing_if = "Option::is_none")]
    pub termination_time: Option<DateTime<Utc>>,
    #[serde(alias = "terminated_by", skip_serializing_if = "Option::is_none")]
    pub terminated_by: Option<String>,

    // Enrichment overlay, never written back to storage.
    #[serde(skip_serializing, alias = "stage_name")]
    pub stage_name: Option<String>,
    #[serde(skip_serializing, alias = "estimated_days")]
    pub estimated_days: Option<Decimal>,
    #[serde(skip_serializing, alias = "visible_in_portal")]
    pub visible_in_portal: bool,
    #[serde(skip_serializing)]
    pub components: Option<serde_json::Value>,
}

impl StageProgress {
    /// A fresh Pending entry with no timestamps.
    pub fn pending(stage_id: i64) -> Self {
        Self {
            stage_id,
            status: StageStatus::Pending,
            ..Self::default()
        }
    }

    /// Mark this entry completed by `actor`. Backfills the start time when the
    /// stage was completed out of order and never activated.
    pub fn mark_completed(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.status = StageStatus::Completed;
        self.is_completed = true;
        self.is_current = false;
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
        self.completion_time = Some(now);
        self.completed_by = Some(actor.name.clone());
        self.completed_by_id = actor.id;
        self.last_updated_time = Some(now);
        self.last_updated_by = Some(actor.name.clone());
    }

    /// Make this entry the active one.
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.is_current = true;
        self.status = StageStatus::InProgress;
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
    }

    /// Stamp rejection metadata. Used when the whole case is rejected.
    pub fn mark_rejected(&mut self, reason: &str, actor: &Actor, now: DateTime<Utc>) {
        self.status = StageStatus::Rejected;
        self.is_current = false;
        self.rejection_reason = Some(reason.to_string());
        self.rejection_time = Some(now);
        self.rejected_by = Some(actor.name.clone());
        self.last_updated_time = Some(now);
        self.last_updated_by = Some(actor.name.clone());
    }

    /// Stamp termination metadata. Used when the whole case is terminated.
    pub fn mark_terminated(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.status = StageStatus::Terminated;
        self.is_current = false;
        self.termination_time = Some(now);
        self.terminated_by = Some(actor.name.clone());
        self.last_updated_time = Some(now);
        self.last_updated_by = Some(actor.name.clone());
    }

    /// Append a dated note line, bounded like case notes.
    pub fn append_note(&mut self, text: &str, now: DateTime<Utc>) {
        let line = format!("[{}] {text}", now.format("%Y-%m-%d %H:%M"));
        let combined = match self.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
            _ => line,
        };
        self.notes = Some(if combined.chars().count() > MAX_NOTES_LEN {
            combined.chars().take(MAX_NOTES_LEN).collect()
        } else {
            combined
        });
    }
}
