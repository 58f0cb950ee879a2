//! The stage completion flow.
//!
//! Composes the stage-progress store, the lifecycle machine, the condition
//! engine, and notification dispatch into the one operation the rest of the
//! system calls when an operator finishes a stage.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::config::NotificationConfig;
use crate::error::{business_rule, CaseflowError, Result};
use crate::events::{SideEffect, SideEffectHandle};
use crate::models::{Actor, Case, WorkflowStage};
use crate::orchestration::types::{CompleteStageRequest, CompletionResult};
use crate::persistence::CaseRepository;
use crate::progress::store;
use crate::services::{
    ConditionEngine, OperationRecord, PermissionGate, StageCompletionNotice, StageDirectory,
};
use crate::state_machine::{CaseEvent, CaseLifecycle, CaseState};

pub struct StageCompleter {
    repository: Arc<dyn CaseRepository>,
    permissions: Arc<dyn PermissionGate>,
    stages: Arc<dyn StageDirectory>,
    conditions: Arc<dyn ConditionEngine>,
    lifecycle: Arc<CaseLifecycle>,
    side_effects: SideEffectHandle,
    notifications: NotificationConfig,
    /// Process-local reentrancy guard for ensure-initialized. Concurrent
    /// initialization across processes remains an accepted race; last write
    /// wins at the row level.
    init_guard: DashMap<i64, ()>,
}

impl StageCompleter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn CaseRepository>,
        permissions: Arc<dyn PermissionGate>,
        stages: Arc<dyn StageDirectory>,
        conditions: Arc<dyn ConditionEngine>,
        lifecycle: Arc<CaseLifecycle>,
        side_effects: SideEffectHandle,
        notifications: NotificationConfig,
    ) -> Self {
        Self {
            repository,
            permissions,
            stages,
            conditions,
            lifecycle,
            side_effects,
            notifications,
            init_guard: DashMap::new(),
        }
    }

    /// Complete one stage of a case.
    ///
    /// Requests against an already-Completed case succeed as no-ops so
    /// retried clients do not see spurious failures. Cases in any other
    /// terminal state, and Aborted cases, reject the request.
    #[instrument(skip(self, request, actor), fields(actor = %actor.name))]
    pub async fn complete_stage(
        &self,
        case_id: i64,
        request: &CompleteStageRequest,
        actor: &Actor,
    ) -> Result<CompletionResult> {
        let stage_id = request.selector()?;
        let mut case = self.repository.get(case_id).await?;

        let allowed = self
            .permissions
            .can_modify_case(actor, &case)
            .await
            .unwrap_or(false);
        if !allowed {
            return Err(CaseflowError::PermissionDenied { case_id });
        }

        if case.status == CaseState::Completed {
            debug!(case_id, stage_id, "case already completed, no-op");
            return Ok(CompletionResult {
                case_id,
                completed_stage_id: stage_id,
                status: case.status,
                completion_rate: case.completion_rate,
                all_done: true,
                next_stage_id: None,
                no_op: true,
            });
        }
        if !case.status.allows_stage_work() {
            return Err(business_rule(format!(
                "cannot complete a stage of a case in state {}",
                case.status
            )));
        }

        let template = self.stages.stages_for_workflow(case.workflow_id).await?;
        self.ensure_initialized(&mut case, &template);

        if !template.iter().any(|stage| stage.id == stage_id) {
            return Err(business_rule(format!(
                "stage {stage_id} is not part of workflow {}",
                case.workflow_id
            )));
        }

        let now = Utc::now();
        let outcome = store::complete(
            &mut case.stages_progress,
            stage_id,
            actor,
            request.notes.as_deref(),
            now,
        )?;

        // Rates never go backwards, even when reconciliation grew the
        // denominator.
        let raw_rate = store::completion_rate(&case.stages_progress);
        case.completion_rate = Decimal::max(raw_rate, case.completion_rate);

        if outcome.all_done {
            case.touch_stage_tracking(actor, now);
            case.touch_audit(actor, now);
            self.repository.save(&case).await?;
            let case = self
                .lifecycle
                .transition(case_id, CaseEvent::Complete, actor)
                .await?;
            info!(case_id, stage_id, "final stage completed, case auto-completed");
            return Ok(CompletionResult {
                case_id,
                completed_stage_id: stage_id,
                status: case.status,
                completion_rate: case.completion_rate,
                all_done: true,
                next_stage_id: None,
                no_op: false,
            });
        }

        let condition_outcome = match self
            .conditions
            .evaluate_stage_completion(&case, stage_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                // Rule evaluation is advisory; a broken engine must not block
                // the completion itself.
                warn!(case_id, stage_id, error = %err, "condition evaluation failed, using default advance");
                Default::default()
            }
        };

        let next_stage_id = if condition_outcome.suppresses_advance() {
            info!(
                case_id,
                stage_id,
                actions = condition_outcome.actions_executed,
                "condition actions executed, default advance suppressed"
            );
            store::sync_current_pointer(&mut case.stages_progress, case.current_stage_id, now);
            // The demoted stage was never current: undo the start timestamp
            // its short-lived activation backfilled in this call.
            if let Some(activated_id) = outcome.activated_stage_id {
                if let Some(entry) = case
                    .stages_progress
                    .iter_mut()
                    .find(|entry| entry.stage_id == activated_id && !entry.is_current)
                {
                    if entry.start_time == Some(now) {
                        entry.start_time = None;
                    }
                }
            }
            None
        } else if let Some(next_id) = outcome.activated_stage_id {
            let next_order = case
                .stages_progress
                .iter()
                .find(|entry| entry.stage_id == next_id)
                .map(|entry| entry.stage_order)
                .unwrap_or(case.current_stage_order);
            case.current_stage_id = Some(next_id);
            case.current_stage_order = next_order;
            case.current_stage_start_time = Some(now);
            Some(next_id)
        } else {
            None
        };

        case.touch_stage_tracking(actor, now);
        case.touch_audit(actor, now);
        self.repository.save(&case).await?;

        info!(
            case_id,
            stage_id,
            next_stage_id,
            completion_rate = %case.completion_rate,
            "stage completed"
        );
        self.enqueue_effects(&case, &template, stage_id, next_stage_id, actor);

        Ok(CompletionResult {
            case_id,
            completed_stage_id: stage_id,
            status: case.status,
            completion_rate: case.completion_rate,
            all_done: false,
            next_stage_id,
            no_op: false,
        })
    }

    /// Initialize or reconcile the progress list against the template, then
    /// overlay display metadata.
    ///
    /// The guard only stops reentrant initialization within this process;
    /// see the field doc for the cross-instance caveat.
    fn ensure_initialized(&self, case: &mut Case, template: &[WorkflowStage]) {
        if self.init_guard.insert(case.id, ()).is_some() {
            debug!(case_id = case.id, "progress initialization already in flight, skipping");
            return;
        }

        if case.stages_progress.is_empty() {
            case.stages_progress = store::initialize(template, Utc::now());
            if case.current_stage_id.is_none() {
                if let Some(first) = case.stages_progress.first() {
                    case.current_stage_id = Some(first.stage_id);
                    case.current_stage_order = first.stage_order;
                }
            }
        } else {
            let existing = std::mem::take(&mut case.stages_progress);
            case.stages_progress = store::reconcile(existing, template);
        }
        store::enrich(&mut case.stages_progress, template);

        self.init_guard.remove(&case.id);
    }

    fn enqueue_effects(
        &self,
        case: &Case,
        template: &[WorkflowStage],
        completed_stage_id: i64,
        next_stage_id: Option<i64>,
        actor: &Actor,
    ) {
        self.side_effects.enqueue(SideEffect::Audit(OperationRecord::new(
            case.id,
            "CompleteStage",
            actor,
            format!("stage {completed_stage_id} completed, rate {}", case.completion_rate),
        )));

        if !self.notifications.enabled {
            return;
        }
        let completed_name = template
            .iter()
            .find(|s| s.id == completed_stage_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let next_stage = next_stage_id.and_then(|id| template.iter().find(|s| s.id == id));
        let recipients = next_stage
            .map(|stage| {
                stage
                    .default_assignee
                    .iter()
                    .chain(stage.co_assignees.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        self.side_effects.enqueue(SideEffect::Notify(StageCompletionNotice {
            case_id: case.id,
            case_name: case.name.clone(),
            completed_stage_id,
            completed_stage_name: completed_name,
            next_stage_id,
            next_stage_name: next_stage.map(|s| s.name.clone()),
            recipients,
            case_url: self
                .notifications
                .case_url_base
                .as_ref()
                .map(|base| format!("{}/{}", base.trim_end_matches('/'), case.id)),
        }));
    }
}
