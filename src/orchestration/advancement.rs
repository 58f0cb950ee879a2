//! Pointer-only stage movement.
//!
//! Moving a case between stages changes which stage is current without
//! marking anything completed. Used by operators stepping a case forward or
//! jumping it to an arbitrary stage.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::error::{business_rule, CaseflowError, Result};
use crate::events::{SideEffect, SideEffectHandle};
use crate::models::{Actor, Case};
use crate::persistence::CaseRepository;
use crate::progress::store;
use crate::services::{OperationRecord, PermissionGate, StageDirectory};

pub struct StageMover {
    repository: Arc<dyn CaseRepository>,
    permissions: Arc<dyn PermissionGate>,
    stages: Arc<dyn StageDirectory>,
    side_effects: SideEffectHandle,
}

impl StageMover {
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

    /// Advance the pointer to the next open stage after the current one.
    #[instrument(skip(self, actor))]
    pub async fn move_to_next_stage(&self, case_id: i64, actor: &Actor) -> Result<Case> {
        let case = self.load_for_move(case_id, actor).await?;
        let current_order = case
            .stages_progress
            .iter()
            .find(|entry| Some(entry.stage_id) == case.current_stage_id)
            .map(|entry| entry.stage_order)
            .unwrap_or(0);
        let next_id = case
            .stages_progress
            .iter()
            .filter(|entry| entry.stage_order > current_order && entry.status.is_open())
            .min_by_key(|entry| entry.stage_order)
            .map(|entry| entry.stage_id)
            .ok_or_else(|| business_rule(format!("case {case_id} has no next open stage")))?;
        self.move_pointer(case, next_id, actor).await
    }

    /// Move the pointer to a specific stage of the case's workflow.
    #[instrument(skip(self, actor))]
    pub async fn move_to_stage(&self, case_id: i64, stage_id: i64, actor: &Actor) -> Result<Case> {
        let case = self.load_for_move(case_id, actor).await?;
        if !case.stages_progress.iter().any(|e| e.stage_id == stage_id) {
            return Err(business_rule(format!(
                "stage {stage_id} is not part of workflow {}",
                case.workflow_id
            )));
        }
        self.move_pointer(case, stage_id, actor).await
    }

    /// Fetch, authorize, and reconcile the progress list against the current
    /// template so pointer moves see the same stage set completion does.
    async fn load_for_move(&self, case_id: i64, actor: &Actor) -> Result<Case> {
        let mut case = self.repository.get(case_id).await?;
        let allowed = self
            .permissions
            .can_modify_case(actor, &case)
            .await
            .unwrap_or(false);
        if !allowed {
            return Err(CaseflowError::PermissionDenied { case_id });
        }
        if !case.status.allows_stage_work() {
            return Err(business_rule(format!(
                "cannot move stages of a case in state {}",
                case.status
            )));
        }

        let template = self.stages.stages_for_workflow(case.workflow_id).await?;
        if case.stages_progress.is_empty() {
            case.stages_progress = store::initialize(&template, Utc::now());
        } else {
            let existing = std::mem::take(&mut case.stages_progress);
            case.stages_progress = store::reconcile(existing, &template);
        }
        Ok(case)
    }

    async fn move_pointer(&self, mut case: Case, stage_id: i64, actor: &Actor) -> Result<Case> {
        let now = Utc::now();
        let order = case
            .stages_progress
            .iter()
            .find(|entry| entry.stage_id == stage_id)
            .map(|entry| entry.stage_order)
            .ok_or_else(|| business_rule(format!("stage {stage_id} is not part of this case")))?;

        let from = case.current_stage_id;
        case.current_stage_id = Some(stage_id);
        case.current_stage_order = order;
        case.current_stage_start_time = Some(now);
        store::sync_current_pointer(&mut case.stages_progress, case.current_stage_id, now);
        case.touch_stage_tracking(actor, now);
        case.touch_audit(actor, now);
        self.repository.save(&case).await?;

        info!(case_id = case.id, ?from, to = stage_id, "case stage pointer moved");
        self.side_effects.enqueue(SideEffect::Audit(OperationRecord::new(
            case.id,
            "MoveToStage",
            actor,
            format!("pointer {from:?} -> {stage_id}"),
        )));
        Ok(case)
    }
}
