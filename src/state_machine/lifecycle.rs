//! The case lifecycle machine.
//!
//! Every status change flows through [`CaseLifecycle::transition`]:
//! permission gate, fetch, guard via the central [`target_state`] table,
//! event-specific actions, a single persisted write, then a fire-and-forget
//! audit effect. Illegal (state, event) pairs fail as business-rule errors
//! before anything is written.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::error::{business_rule, CaseflowError, Result};
use crate::events::{SideEffect, SideEffectHandle};
use crate::models::{Actor, Case};
use crate::persistence::CaseRepository;
use crate::progress::store;
use crate::services::{OperationRecord, PermissionGate, StageDirectory};
use crate::state_machine::{CaseEvent, CaseState};

/// The single transition table.
///
/// Returns the target state for a legal (current, event) pair and a
/// business-rule error otherwise. Pure; guards that need the case body
/// (permissions, template lookups) live in [`CaseLifecycle::transition`].
pub fn target_state(current: CaseState, event: &CaseEvent) -> Result<CaseState> {
    use CaseState::{Aborted, Active, Cancelled, Completed, ForceCompleted, Inactive, Paused, Rejected, Terminated};

    let target = match (current, event) {
        (Inactive, CaseEvent::Start { .. }) => Active,
        (Inactive | Active, CaseEvent::Pause) => Paused,
        (Paused, CaseEvent::Resume) => Active,
        (Inactive | Active | Paused, CaseEvent::Abort) => Aborted,
        (Aborted, CaseEvent::Reactivate) => Active,
        (Inactive | Active | Paused, CaseEvent::Reject { terminate, .. }) => {
            if *terminate {
                Terminated
            } else {
                Rejected
            }
        }
        (Inactive | Active | Paused, CaseEvent::ForceComplete { .. }) => ForceCompleted,
        (Completed | ForceCompleted | Cancelled, CaseEvent::Cancel { .. }) => {
            return Err(business_rule(format!(
                "cannot Cancel a case in state {current}"
            )))
        }
        (_, CaseEvent::Cancel { .. }) => Cancelled,
        (Inactive | Active | Paused, CaseEvent::Complete) => Completed,
        (current, event) => {
            return Err(business_rule(format!(
                "cannot {} a case in state {current}",
                event.name()
            )))
        }
    };
    Ok(target)
}

/// Orchestrates lifecycle transitions against storage and collaborators.
pub struct CaseLifecycle {
    repository: Arc<dyn CaseRepository>,
    permissions: Arc<dyn PermissionGate>,
    stages: Arc<dyn StageDirectory>,
    side_effects: SideEffectHandle,
}

impl CaseLifecycle {
    pub fn new(
        repository: Arc<dyn CaseRepository>,
        permissions: Arc<dyn PermissionGate>,
        stages: Arc<dyn StageDirectory>,
        side_effects: SideEffectHandle,
    ) -> Self {
        Self {
            repository,
            permissions,
            stages,
            side_effects,
        }
    }

    /// Apply `event` to the case, persist, and enqueue the audit record.
    ///
    /// Returns the updated case. Permission errors and permission failures
    /// both deny; guard failures abort before any write.
    #[instrument(skip(self, actor), fields(event = event.name()))]
    pub async fn transition(&self, case_id: i64, event: CaseEvent, actor: &Actor) -> Result<Case> {
        let mut case = self.repository.get(case_id).await?;

        let allowed = self
            .permissions
            .can_modify_case(actor, &case)
            .await
            .unwrap_or(false);
        if !allowed {
            return Err(CaseflowError::PermissionDenied { case_id });
        }

        let from = case.status;
        let target = target_state(from, &event)?;

        let now = Utc::now();
        match &event {
            CaseEvent::Start { reset_progress } => {
                case.start_date = Some(now);
                case.current_stage_start_time = Some(now);
                if *reset_progress {
                    self.reset_to_first_stage(&mut case).await?;
                }
                case.append_note(&format!("[Start] Case started by {}", actor.name));
                self.stamp_stage_tracking(&mut case, actor);
            }
            CaseEvent::Pause => {
                case.append_note(&format!("[Pause] Case paused by {}", actor.name));
            }
            CaseEvent::Resume => {
                case.current_stage_start_time = Some(now);
                case.append_note(&format!("[Resume] Case resumed by {}", actor.name));
            }
            CaseEvent::Abort => {
                case.estimated_completion_date = None;
                case.append_note(&format!("[Abort] Case aborted by {}", actor.name));
            }
            CaseEvent::Reactivate => {
                case.actual_completion_date = None;
                case.append_note(&format!("[Reactivate] Case reactivated by {}", actor.name));
            }
            CaseEvent::Reject { terminate, reason } => {
                for entry in case.stages_progress.iter_mut() {
                    if entry.status.is_open() {
                        if *terminate {
                            entry.mark_terminated(actor, now);
                        } else {
                            entry.mark_rejected(reason, actor, now);
                        }
                    }
                }
                case.append_note(&format!("[{}] {reason}", event.name()));
                self.stamp_stage_tracking(&mut case, actor);
            }
            CaseEvent::ForceComplete { notes } => {
                // Force-completion freezes stage progress: the shared
                // tracking stamp rewrites is_current flags, so snapshot and
                // restore around it.
                let snapshot = case.stages_progress.clone();
                case.completion_rate = Decimal::ONE_HUNDRED;
                case.actual_completion_date = Some(now);
                case.append_note(&format!("[ForceComplete] Case force completed by {}", actor.name));
                if let Some(text) = notes {
                    case.append_note(text);
                }
                self.stamp_stage_tracking(&mut case, actor);
                case.stages_progress = snapshot;
            }
            CaseEvent::Cancel { reason } => {
                case.prepend_note(&format!("[Cancelled] {reason}"));
            }
            CaseEvent::Complete => {
                case.completion_rate = Decimal::ONE_HUNDRED;
                case.actual_completion_date = Some(now);
                case.append_note("[Complete] All stages completed");
                self.stamp_stage_tracking(&mut case, actor);
            }
        }

        case.status = target;
        case.touch_audit(actor, now);
        self.repository.save(&case).await?;

        info!(
            case_id,
            from = %from,
            to = %target,
            actor = %actor.name,
            "case lifecycle transition"
        );
        self.side_effects.enqueue(SideEffect::Audit(OperationRecord::new(
            case_id,
            event.name(),
            actor,
            format!("{from} -> {target}"),
        )));

        Ok(case)
    }

    /// Point the case back at the first template stage with a zero rate.
    async fn reset_to_first_stage(&self, case: &mut Case) -> Result<()> {
        let mut stages = self.stages.stages_for_workflow(case.workflow_id).await?;
        stages.sort_by_key(|s| s.order);
        let first = stages
            .first()
            .ok_or_else(|| business_rule(format!("workflow {} has no stages", case.workflow_id)))?;
        case.current_stage_id = Some(first.id);
        case.current_stage_order = 1;
        case.completion_rate = Decimal::ZERO;
        Ok(())
    }

    /// Shared stage-tracking stamp: audit trio plus is_current realignment.
    fn stamp_stage_tracking(&self, case: &mut Case, actor: &Actor) {
        let now = Utc::now();
        case.touch_stage_tracking(actor, now);
        store::sync_current_pointer(&mut case.stages_progress, case.current_stage_id, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_only_from_inactive() {
        let start = CaseEvent::Start { reset_progress: false };
        assert_eq!(
            target_state(CaseState::Inactive, &start).unwrap(),
            CaseState::Active
        );
        for state in [CaseState::Active, CaseState::Paused, CaseState::Completed] {
            assert!(target_state(state, &start).is_err());
        }
    }

    #[test]
    fn test_pause_resume_cycle() {
        assert_eq!(
            target_state(CaseState::Active, &CaseEvent::Pause).unwrap(),
            CaseState::Paused
        );
        assert_eq!(
            target_state(CaseState::Inactive, &CaseEvent::Pause).unwrap(),
            CaseState::Paused
        );
        assert_eq!(
            target_state(CaseState::Paused, &CaseEvent::Resume).unwrap(),
            CaseState::Active
        );
        assert!(target_state(CaseState::Active, &CaseEvent::Resume).is_err());
        assert!(target_state(CaseState::Completed, &CaseEvent::Pause).is_err());
    }

    #[test]
    fn test_abort_and_reactivate() {
        assert_eq!(
            target_state(CaseState::Active, &CaseEvent::Abort).unwrap(),
            CaseState::Aborted
        );
        assert!(target_state(CaseState::Aborted, &CaseEvent::Abort).is_err());
        assert!(target_state(CaseState::Completed, &CaseEvent::Abort).is_err());
        assert_eq!(
            target_state(CaseState::Aborted, &CaseEvent::Reactivate).unwrap(),
            CaseState::Active
        );
        assert!(target_state(CaseState::Active, &CaseEvent::Reactivate).is_err());
    }

    #[test]
    fn test_reject_selects_terminated_or_rejected() {
        let reject = CaseEvent::Reject {
            terminate: false,
            reason: "incomplete paperwork".to_string(),
        };
        let terminate = CaseEvent::Reject {
            terminate: true,
            reason: "fraud".to_string(),
        };
        assert_eq!(
            target_state(CaseState::Active, &reject).unwrap(),
            CaseState::Rejected
        );
        assert_eq!(
            target_state(CaseState::Inactive, &terminate).unwrap(),
            CaseState::Terminated
        );
        for state in [CaseState::Completed, CaseState::Rejected, CaseState::Terminated] {
            assert!(target_state(state, &reject).is_err());
        }
    }

    #[test]
    fn test_cancel_forbidden_after_completion() {
        let cancel = CaseEvent::Cancel {
            reason: "duplicate".to_string(),
        };
        for state in [
            CaseState::Inactive,
            CaseState::Active,
            CaseState::Paused,
            CaseState::Aborted,
            CaseState::Rejected,
        ] {
            assert_eq!(target_state(state, &cancel).unwrap(), CaseState::Cancelled);
        }
        for state in [CaseState::Completed, CaseState::ForceCompleted, CaseState::Cancelled] {
            assert!(target_state(state, &cancel).is_err());
        }
    }

    #[test]
    fn test_force_complete_and_internal_complete() {
        let force = CaseEvent::ForceComplete { notes: None };
        for state in [CaseState::Inactive, CaseState::Active, CaseState::Paused] {
            assert_eq!(target_state(state, &force).unwrap(), CaseState::ForceCompleted);
            assert_eq!(target_state(state, &CaseEvent::Complete).unwrap(), CaseState::Completed);
        }
        assert!(target_state(CaseState::Completed, &force).is_err());
        assert!(target_state(CaseState::Aborted, &CaseEvent::Complete).is_err());
    }
}
