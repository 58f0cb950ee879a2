//! The closed case status vocabulary.
//!
//! Exactly one token per state. Historical rows used `Started` and
//! `InProgress` interchangeably for the working state; both parse as
//! [`CaseState::Active`] at the storage boundary and are never written back.
//! Unknown tokens are rejected, not defaulted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CaseflowError, Result};

/// Lifecycle status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseState {
    /// Created but not yet started.
    Inactive,
    /// Being worked on.
    #[serde(alias = "Started", alias = "InProgress")]
    Active,
    /// Work suspended, resumable.
    Paused,
    /// Stopped before completion, reactivatable.
    Aborted,
    /// Rejected with a reason. Terminal.
    Rejected,
    /// Terminated with a reason. Terminal.
    Terminated,
    /// Administratively completed regardless of stage progress. Terminal.
    ForceCompleted,
    /// Every stage completed or skipped. Terminal.
    Completed,
    /// Withdrawn. Terminal.
    Cancelled,
}

impl CaseState {
    /// Terminal states admit no further lifecycle transitions except the
    /// narrow ones the transition table names (none today).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::ForceCompleted | Self::Terminated | Self::Rejected | Self::Cancelled
        )
    }

    /// States in which stage work may proceed. Aborted cases must be
    /// reactivated before their stages can move again.
    pub fn allows_stage_work(&self) -> bool {
        matches!(self, Self::Inactive | Self::Active | Self::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "Inactive",
            Self::Active => "Active",
            Self::Paused => "Paused",
            Self::Aborted => "Aborted",
            Self::Rejected => "Rejected",
            Self::Terminated => "Terminated",
            Self::ForceCompleted => "ForceCompleted",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CaseState {
    type Err = CaseflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Inactive" => Ok(Self::Inactive),
            "Active" | "Started" | "InProgress" => Ok(Self::Active),
            "Paused" => Ok(Self::Paused),
            "Aborted" => Ok(Self::Aborted),
            "Rejected" => Ok(Self::Rejected),
            "Terminated" => Ok(Self::Terminated),
            "ForceCompleted" => Ok(Self::ForceCompleted),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(CaseflowError::InvalidInput(format!(
                "unknown case status token: {other}"
            ))),
        }
    }
}
