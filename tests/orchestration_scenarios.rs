//! End-to-end scenarios over an in-memory repository and fake collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;

use caseflow_core::config::{NotificationConfig, SideEffectConfig};
use caseflow_core::error::{CaseflowError, Result};
use caseflow_core::events::{SideEffectHandle, SideEffectQueue};
use caseflow_core::models::{Actor, Case, WorkflowStage};
use caseflow_core::orchestration::{CompleteStageRequest, StageCompleter, StageMover};
use caseflow_core::persistence::CaseRepository;
use caseflow_core::progress::{store, StageStatus};
use caseflow_core::services::{
    ConditionEngine, ConditionOutcome, NotificationSender, OperationLogger, OperationRecord,
    PermissionGate, StageCompletionNotice, StageDirectory,
};
use caseflow_core::state_machine::{CaseEvent, CaseLifecycle, CaseState};

struct InMemoryRepository {
    cases: Mutex<HashMap<i64, Case>>,
}

impl InMemoryRepository {
    fn with_case(case: Case) -> Arc<Self> {
        let mut cases = HashMap::new();
        cases.insert(case.id, case);
        Arc::new(Self {
            cases: Mutex::new(cases),
        })
    }

    fn snapshot(&self, id: i64) -> Case {
        self.cases.lock().unwrap().get(&id).cloned().unwrap()
    }
}

#[async_trait]
impl CaseRepository for InMemoryRepository {
    async fn get(&self, id: i64) -> Result<Case> {
        self.cases
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(CaseflowError::NotFound { entity: "case", id })
    }

    async fn save(&self, case: &Case) -> Result<()> {
        self.cases.lock().unwrap().insert(case.id, case.clone());
        Ok(())
    }
}

struct StaticGate {
    allow: bool,
}

#[async_trait]
impl PermissionGate for StaticGate {
    async fn can_modify_case(&self, _actor: &Actor, _case: &Case) -> Result<bool> {
        Ok(self.allow)
    }
}

struct FixedDirectory {
    stages: Vec<WorkflowStage>,
}

#[async_trait]
impl StageDirectory for FixedDirectory {
    async fn stages_for_workflow(&self, _workflow_id: i64) -> Result<Vec<WorkflowStage>> {
        Ok(self.stages.clone())
    }
}

struct StaticConditions {
    actions: u32,
}

#[async_trait]
impl ConditionEngine for StaticConditions {
    async fn evaluate_stage_completion(
        &self,
        _case: &Case,
        _completed_stage_id: i64,
    ) -> Result<ConditionOutcome> {
        Ok(ConditionOutcome {
            actions_executed: self.actions,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    audits: AtomicU32,
    notices: Mutex<Vec<StageCompletionNotice>>,
}

#[async_trait]
impl OperationLogger for RecordingSink {
    async fn log(&self, _record: &OperationRecord) -> Result<()> {
        self.audits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for RecordingSink {
    async fn stage_completed(&self, notice: &StageCompletionNotice) -> Result<()> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

fn stage(id: i64, order: i32, name: &str) -> WorkflowStage {
    WorkflowStage {
        id,
        workflow_id: 10,
        name: name.to_string(),
        description: None,
        order,
        default_assignee: vec![],
        co_assignees: vec![],
        estimated_duration: None,
        visible_in_portal: true,
        attachment_management_needed: false,
        components: None,
    }
}

fn three_stage_template() -> Vec<WorkflowStage> {
    vec![stage(101, 10, "A"), stage(102, 20, "B"), stage(103, 30, "C")]
}

fn active_case(template: &[WorkflowStage]) -> Case {
    let progress = store::initialize(template, Utc::now());
    let first = progress.first().map(|e| e.stage_id);
    Case {
        id: 1,
        workflow_id: 10,
        name: "Acme Corp".to_string(),
        status: CaseState::Active,
        current_stage_id: first,
        current_stage_order: 1,
        completion_rate: dec!(0),
        start_date: Some(Utc::now()),
        current_stage_start_time: Some(Utc::now()),
        estimated_completion_date: None,
        actual_completion_date: None,
        notes: None,
        stages_progress: progress,
        stage_updated_time: None,
        stage_updated_by: None,
        stage_updated_by_id: None,
        updated_at: Utc::now(),
        updated_by: None,
        updated_by_id: None,
    }
}

struct Harness {
    repository: Arc<InMemoryRepository>,
    completer: StageCompleter,
    mover: StageMover,
    lifecycle: Arc<CaseLifecycle>,
}

fn harness_with(
    case: Case,
    template: Vec<WorkflowStage>,
    allow: bool,
    condition_actions: u32,
    side_effects: SideEffectHandle,
) -> Harness {
    let repository = InMemoryRepository::with_case(case);
    let gate = Arc::new(StaticGate { allow });
    let directory = Arc::new(FixedDirectory { stages: template });
    let lifecycle = Arc::new(CaseLifecycle::new(
        repository.clone(),
        gate.clone(),
        directory.clone(),
        side_effects.clone(),
    ));
    let completer = StageCompleter::new(
        repository.clone(),
        gate.clone(),
        directory.clone(),
        Arc::new(StaticConditions {
            actions: condition_actions,
        }),
        lifecycle.clone(),
        side_effects.clone(),
        NotificationConfig {
            enabled: true,
            case_url_base: Some("https://portal.example.com/cases".to_string()),
        },
    );
    let mover = StageMover::new(repository.clone(), gate, directory, side_effects);
    Harness {
        repository,
        completer,
        mover,
        lifecycle,
    }
}

fn harness(case: Case) -> Harness {
    harness_with(
        case,
        three_stage_template(),
        true,
        0,
        SideEffectHandle::disconnected(),
    )
}

#[tokio::test]
async fn skipping_ahead_then_backfilling_auto_completes() {
    let h = harness(active_case(&three_stage_template()));
    let actor = Actor::new(9, "Dana");

    // Complete B first: A keeps working state, C becomes current.
    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(102), &actor)
        .await
        .unwrap();
    assert_eq!(result.completion_rate, dec!(33.33));
    assert_eq!(result.next_stage_id, Some(103));
    let case = h.repository.snapshot(1);
    assert_eq!(case.current_stage_id, Some(103));
    assert_eq!(case.stages_progress[0].status, StageStatus::InProgress);
    assert!(!case.stages_progress[0].is_current);

    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(103), &actor)
        .await
        .unwrap();
    assert_eq!(result.completion_rate, dec!(66.67));
    assert_eq!(result.next_stage_id, None);

    // Backfilling A finishes everything and auto-completes the case.
    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &actor)
        .await
        .unwrap();
    assert!(result.all_done);
    assert_eq!(result.status, CaseState::Completed);
    assert_eq!(result.completion_rate, dec!(100));
    let case = h.repository.snapshot(1);
    assert_eq!(case.status, CaseState::Completed);
    assert!(case.actual_completion_date.is_some());
}

#[tokio::test]
async fn template_growth_is_reconciled_on_next_completion() {
    let template = three_stage_template();
    let mut case = active_case(&template);
    store::complete(
        &mut case.stages_progress,
        101,
        &Actor::new(9, "Dana"),
        None,
        Utc::now(),
    )
    .unwrap();
    case.completion_rate = store::completion_rate(&case.stages_progress);
    assert_eq!(case.completion_rate, dec!(33.33));

    // Template gains stage D between B and C before the next request.
    let mut grown = template.clone();
    grown.push(stage(104, 25, "D"));
    let h = harness_with(case, grown, true, 0, SideEffectHandle::disconnected());

    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(102), &Actor::new(9, "Dana"))
        .await
        .unwrap();
    let case = h.repository.snapshot(1);
    let ids: Vec<i64> = case.stages_progress.iter().map(|e| e.stage_id).collect();
    assert_eq!(ids, vec![101, 102, 104, 103]);
    let orders: Vec<i32> = case.stages_progress.iter().map(|e| e.stage_order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);
    assert_eq!(result.completion_rate, dec!(50.00));
    assert_eq!(result.next_stage_id, Some(104));
}

#[tokio::test]
async fn completion_rate_never_decreases() {
    let mut case = active_case(&three_stage_template());
    case.completion_rate = dec!(80);
    let h = harness(case);

    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &Actor::system())
        .await
        .unwrap();
    assert_eq!(result.completion_rate, dec!(80), "stored rate is the floor");
}

#[tokio::test]
async fn aborted_case_rejects_stage_completion() {
    let mut case = active_case(&three_stage_template());
    case.status = CaseState::Aborted;
    let h = harness(case);

    let err = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &Actor::system())
        .await
        .unwrap_err();
    assert!(matches!(err, CaseflowError::BusinessRule(_)));
    let case = h.repository.snapshot(1);
    assert!(!case.stages_progress[0].is_completed, "nothing was written");
}

#[tokio::test]
async fn completed_case_is_a_no_op_not_an_error() {
    let mut case = active_case(&three_stage_template());
    case.status = CaseState::Completed;
    case.completion_rate = dec!(100);
    let before = case.clone();
    let h = harness(case);

    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(102), &Actor::system())
        .await
        .unwrap();
    assert!(result.no_op);
    assert!(result.all_done);
    assert_eq!(h.repository.snapshot(1), before, "no write happened");
}

#[tokio::test]
async fn condition_actions_suppress_default_advance() {
    let h = harness_with(
        active_case(&three_stage_template()),
        three_stage_template(),
        true,
        2,
        SideEffectHandle::disconnected(),
    );

    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &Actor::system())
        .await
        .unwrap();
    assert_eq!(result.next_stage_id, None);
    let case = h.repository.snapshot(1);
    assert_eq!(case.current_stage_id, Some(101), "pointer did not move");
    assert!(case.stages_progress[0].is_completed);

    // The would-be next stage was never current, so it keeps no trace of the
    // suppressed activation.
    let next = &case.stages_progress[1];
    assert_eq!(next.status, StageStatus::Pending);
    assert!(!next.is_current);
    assert!(next.start_time.is_none(), "demoted stage must stay unstarted");
}

#[tokio::test]
async fn uninitialized_case_gets_progress_on_first_completion() {
    let mut case = active_case(&three_stage_template());
    case.stages_progress = Vec::new();
    case.current_stage_id = None;
    let h = harness(case);

    let result = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &Actor::system())
        .await
        .unwrap();
    let case = h.repository.snapshot(1);
    assert_eq!(case.stages_progress.len(), 3);
    assert!(case.stages_progress[0].is_completed);
    assert_eq!(result.next_stage_id, Some(102));
}

#[tokio::test]
async fn unknown_stage_and_bad_selectors_fail_before_writes() {
    let h = harness(active_case(&three_stage_template()));

    let err = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(999), &Actor::system())
        .await
        .unwrap_err();
    assert!(matches!(err, CaseflowError::BusinessRule(_)));

    let err = h
        .completer
        .complete_stage(1, &CompleteStageRequest::default(), &Actor::system())
        .await
        .unwrap_err();
    assert!(matches!(err, CaseflowError::InvalidInput(_)));
}

#[tokio::test]
async fn permission_denied_blocks_every_mutation() {
    let h = harness_with(
        active_case(&three_stage_template()),
        three_stage_template(),
        false,
        0,
        SideEffectHandle::disconnected(),
    );
    let actor = Actor::new(3, "Eve");

    let err = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseflowError::PermissionDenied { case_id: 1 }));

    let err = h
        .lifecycle
        .transition(1, CaseEvent::Pause, &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseflowError::PermissionDenied { case_id: 1 }));

    let err = h.mover.move_to_next_stage(1, &actor).await.unwrap_err();
    assert!(matches!(err, CaseflowError::PermissionDenied { case_id: 1 }));
}

#[tokio::test]
async fn force_complete_freezes_stage_progress() {
    let h = harness(active_case(&three_stage_template()));
    let actor = Actor::new(9, "Dana");

    h.completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &actor)
        .await
        .unwrap();
    let progress_before = h.repository.snapshot(1).stages_progress;

    let case = h
        .lifecycle
        .transition(1, CaseEvent::ForceComplete { notes: None }, &actor)
        .await
        .unwrap();
    assert_eq!(case.status, CaseState::ForceCompleted);
    assert_eq!(case.completion_rate, dec!(100));
    assert!(case.actual_completion_date.is_some());
    assert_eq!(
        case.stages_progress, progress_before,
        "force completion must not disturb stage progress"
    );
}

#[tokio::test]
async fn reject_rewrites_open_stages_with_reason() {
    let h = harness(active_case(&three_stage_template()));
    let actor = Actor::new(9, "Dana");
    h.completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &actor)
        .await
        .unwrap();

    let case = h
        .lifecycle
        .transition(
            1,
            CaseEvent::Reject {
                terminate: false,
                reason: "incomplete paperwork".to_string(),
            },
            &actor,
        )
        .await
        .unwrap();
    assert_eq!(case.status, CaseState::Rejected);
    assert_eq!(case.stages_progress[0].status, StageStatus::Completed);
    for entry in &case.stages_progress[1..] {
        assert_eq!(entry.status, StageStatus::Rejected);
        assert_eq!(entry.rejection_reason.as_deref(), Some("incomplete paperwork"));
        assert!(entry.rejection_time.is_some());
    }
}

#[tokio::test]
async fn cancel_prepends_reason_and_blocks_further_work() {
    let h = harness(active_case(&three_stage_template()));
    let actor = Actor::new(9, "Dana");
    h.lifecycle
        .transition(1, CaseEvent::Pause, &actor)
        .await
        .unwrap();

    let case = h
        .lifecycle
        .transition(
            1,
            CaseEvent::Cancel {
                reason: "duplicate lead".to_string(),
            },
            &actor,
        )
        .await
        .unwrap();
    assert_eq!(case.status, CaseState::Cancelled);
    assert!(case.notes.unwrap().starts_with("[Cancelled] duplicate lead"));

    let err = h
        .completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseflowError::BusinessRule(_)));
}

#[tokio::test]
async fn pause_resume_round_trip() {
    let h = harness(active_case(&three_stage_template()));
    let actor = Actor::new(9, "Dana");

    let case = h
        .lifecycle
        .transition(1, CaseEvent::Pause, &actor)
        .await
        .unwrap();
    assert_eq!(case.status, CaseState::Paused);

    let case = h
        .lifecycle
        .transition(1, CaseEvent::Resume, &actor)
        .await
        .unwrap();
    assert_eq!(case.status, CaseState::Active);

    let err = h
        .lifecycle
        .transition(1, CaseEvent::Resume, &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, CaseflowError::BusinessRule(_)));
}

#[tokio::test]
async fn move_to_stage_validates_membership_and_moves_pointer_only() {
    let h = harness(active_case(&three_stage_template()));
    let actor = Actor::new(9, "Dana");

    let err = h.mover.move_to_stage(1, 999, &actor).await.unwrap_err();
    assert!(matches!(err, CaseflowError::BusinessRule(_)));

    let case = h.mover.move_to_stage(1, 103, &actor).await.unwrap();
    assert_eq!(case.current_stage_id, Some(103));
    assert!(case.stages_progress[2].is_current);
    assert!(!case.stages_progress.iter().any(|e| e.is_completed));

    let case = h.mover.move_to_stage(1, 101, &actor).await.unwrap();
    assert_eq!(case.current_stage_id, Some(101));

    let case = h.mover.move_to_next_stage(1, &actor).await.unwrap();
    assert_eq!(case.current_stage_id, Some(102));
}

#[tokio::test]
async fn notifications_target_the_new_current_stage_teams() {
    let mut template = three_stage_template();
    template[1].default_assignee = vec!["Sales".to_string()];
    template[1].co_assignees = vec!["Legal".to_string()];

    let sink = Arc::new(RecordingSink::default());
    let config = SideEffectConfig {
        queue_capacity: 16,
        workers: 1,
    };
    let (queue, handle) = SideEffectQueue::start(&config, sink.clone(), sink.clone());

    let h = harness_with(
        active_case(&template),
        template,
        true,
        0,
        handle.clone(),
    );
    h.completer
        .complete_stage(1, &CompleteStageRequest::for_stage(101), &Actor::new(9, "Dana"))
        .await
        .unwrap();

    drop(handle);
    drop(h);
    queue.shutdown().await;

    assert!(sink.audits.load(Ordering::SeqCst) >= 1);
    let notices = sink.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    let notice = &notices[0];
    assert_eq!(notice.completed_stage_name, "A");
    assert_eq!(notice.next_stage_name.as_deref(), Some("B"));
    assert_eq!(notice.recipients, vec!["Sales".to_string(), "Legal".to_string()]);
    assert_eq!(
        notice.case_url.as_deref(),
        Some("https://portal.example.com/cases/1")
    );
}

#[tokio::test]
async fn start_resets_pointer_when_requested() {
    let mut case = active_case(&three_stage_template());
    case.status = CaseState::Inactive;
    case.current_stage_id = Some(103);
    case.completion_rate = dec!(10);
    case.stages_progress = Vec::new();
    let h = harness(case);

    let case = h
        .lifecycle
        .transition(
            1,
            CaseEvent::Start {
                reset_progress: true,
            },
            &Actor::system(),
        )
        .await
        .unwrap();
    assert_eq!(case.status, CaseState::Active);
    assert_eq!(case.current_stage_id, Some(101));
    assert_eq!(case.completion_rate, dec!(0));
    assert!(case.start_date.is_some());
}
