//! Transition inputs for the case lifecycle.

use serde::{Deserialize, Serialize};

/// An event requesting a case lifecycle transition.
///
/// Each variant carries exactly the inputs its transition needs. The mapping
/// from (current state, event) to target state lives in the lifecycle's
/// central transition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseEvent {
    /// Begin work on an Inactive case. `reset_progress` re-points the case at
    /// the first template stage with a zero rate; stage progress itself is
    /// never touched by Start.
    Start { reset_progress: bool },
    /// Suspend work.
    Pause,
    /// Resume a Paused case.
    Resume,
    /// Stop before completion. Reversible via Reactivate.
    Abort,
    /// Bring an Aborted case back to Active.
    Reactivate,
    /// Permanently end the case. `terminate` selects Terminated over
    /// Rejected. The only transition that rewrites stage progress.
    Reject { terminate: bool, reason: String },
    /// Administratively complete regardless of stage progress.
    ForceComplete { notes: Option<String> },
    /// Withdraw the case. The reason is prepended to the notes log.
    Cancel { reason: String },
    /// Internal: raised by the orchestrator when every stage is completed or
    /// skipped.
    Complete,
}

impl CaseEvent {
    /// Short token used in audit records and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "Start",
            Self::Pause => "Pause",
            Self::Resume => "Resume",
            Self::Abort => "Abort",
            Self::Reactivate => "Reactivate",
            Self::Reject { terminate: false, .. } => "Reject",
            Self::Reject { terminate: true, .. } => "Terminate",
            Self::ForceComplete { .. } => "ForceComplete",
            Self::Cancel { .. } => "Cancel",
            Self::Complete => "Complete",
        }
    }
}
