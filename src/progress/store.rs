//! Pure operations over a case's stage-progress list.
//!
//! Everything here is synchronous and side-effect free. The orchestrator and
//! the lifecycle machine compose these functions and own persistence; tests
//! exercise them directly on in-memory vectors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::{business_rule, CaseflowError, Result};
use crate::models::{Actor, WorkflowStage};
use crate::progress::entry::{StageProgress, StageStatus};

/// How many layers of string-wrapped JSON [`load`] will unwrap before
/// declaring the payload corrupt.
const MAX_ENCODING_DEPTH: usize = 3;

/// Result of [`complete`]: whether every stage is now done and which stage,
/// if any, became current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteOutcome {
    pub all_done: bool,
    pub activated_stage_id: Option<i64>,
}

/// Build the initial progress list for a fresh case.
///
/// Stages are taken in template order and numbered sequentially from 1 even
/// when template orders have gaps. The first stage starts InProgress and
/// current; the rest are Pending with no timestamps.
pub fn initialize(stages: &[WorkflowStage], now: DateTime<Utc>) -> Vec<StageProgress> {
    let mut ordered: Vec<&WorkflowStage> = stages.iter().collect();
    ordered.sort_by_key(|s| s.order);

    ordered
        .iter()
        .enumerate()
        .map(|(idx, stage)| {
            let mut entry = StageProgress::pending(stage.id);
            entry.stage_order = idx as i32 + 1;
            entry.assignee = join_nonempty(&stage.default_assignee);
            entry.co_assignees = stage
                .co_assignees
                .iter()
                .filter(|team| !stage.default_assignee.contains(team))
                .cloned()
                .collect();
            if idx == 0 {
                entry.activate(now);
            }
            entry
        })
        .collect()
}

/// Parse a stored stage-progress payload.
///
/// Legacy rows carry the array double-encoded as a JSON string (sometimes
/// more than once); unwrap string layers up to [`MAX_ENCODING_DEPTH`], then
/// fail loud rather than silently returning an empty list. Blank input means
/// a case created before progress tracking existed and yields an empty list.
///
/// Two historical writers disagreed on property naming (camelCase and
/// PascalCase), so keys are matched case-insensitively with underscores
/// ignored. An entry whose stage id cannot be recognized under any
/// convention is corrupt, not defaultable.
pub fn load(raw: &str) -> Result<Vec<StageProgress>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }

    let mut value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| CaseflowError::Storage(format!("malformed stage progress payload: {e}")))?;

    let mut depth = 0;
    while let serde_json::Value::String(inner) = value {
        depth += 1;
        if depth > MAX_ENCODING_DEPTH {
            return Err(CaseflowError::Storage(format!(
                "stage progress payload string-encoded more than {MAX_ENCODING_DEPTH} levels deep"
            )));
        }
        if inner.trim().is_empty() {
            return Ok(Vec::new());
        }
        value = serde_json::from_str(&inner).map_err(|e| {
            CaseflowError::Storage(format!(
                "malformed stage progress payload at encoding level {depth}: {e}"
            ))
        })?;
    }

    let mut entries: Vec<StageProgress> = serde_json::from_value(canonicalize_keys(value)?)
        .map_err(|e| CaseflowError::Storage(format!("malformed stage progress entries: {e}")))?;
    renumber(&mut entries);
    Ok(entries)
}

/// Every key the entry wire format recognizes, in canonical camelCase.
const ENTRY_KEYS: &[&str] = &[
    "stageId",
    "stageOrder",
    "status",
    "isCompleted",
    "isCurrent",
    "startTime",
    "completionTime",
    "completedBy",
    "completedById",
    "lastUpdatedTime",
    "lastUpdatedBy",
    "assignee",
    "coAssignees",
    "customEstimatedDays",
    "customEndTime",
    "notes",
    "rejectionReason",
    "rejectionTime",
    "rejectedBy",
    "terminationTime",
    "terminatedBy",
    "stageName",
    "estimatedDays",
    "visibleInPortal",
    "components",
];

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Rewrite each entry's keys to canonical camelCase, matching incoming names
/// case-insensitively and ignoring underscores. Entries without a
/// recognizable stage id would otherwise deserialize as zeroed defaults and
/// silently lose completion state.
fn canonicalize_keys(value: serde_json::Value) -> Result<serde_json::Value> {
    let serde_json::Value::Array(items) = value else {
        return Err(CaseflowError::Storage(
            "stage progress payload is not an array".to_string(),
        ));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let serde_json::Value::Object(fields) = item else {
            return Err(CaseflowError::Storage(
                "stage progress entry is not an object".to_string(),
            ));
        };
        let mut normalized = serde_json::Map::with_capacity(fields.len());
        for (key, field_value) in fields {
            let folded = fold_key(&key);
            let canonical = ENTRY_KEYS
                .iter()
                .find(|candidate| fold_key(candidate) == folded)
                .map_or(key, |candidate| (*candidate).to_string());
            normalized.insert(canonical, field_value);
        }
        if !normalized.contains_key("stageId") {
            return Err(CaseflowError::Storage(
                "stage progress entry has no recognizable stage id".to_string(),
            ));
        }
        entries.push(serde_json::Value::Object(normalized));
    }
    Ok(serde_json::Value::Array(entries))
}

/// Serialize the list in its canonical wire form (camelCase, nulls omitted).
pub fn serialize(progress: &[StageProgress]) -> Result<String> {
    Ok(serde_json::to_string(progress)?)
}

/// Align an existing progress list with the current workflow template.
///
/// Entries whose stage left the template are dropped; new template stages get
/// Pending entries at their template position; surviving entries keep their
/// completion state, timestamps, and actor fields untouched. Orders are
/// renumbered 1..N afterwards.
pub fn reconcile(existing: Vec<StageProgress>, stages: &[WorkflowStage]) -> Vec<StageProgress> {
    let mut ordered: Vec<&WorkflowStage> = stages.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let mut result: Vec<StageProgress> = ordered
        .iter()
        .map(|stage| {
            existing
                .iter()
                .find(|entry| entry.stage_id == stage.id)
                .cloned()
                .unwrap_or_else(|| StageProgress::pending(stage.id))
        })
        .collect();

    let dropped = existing
        .iter()
        .filter(|entry| !ordered.iter().any(|s| s.id == entry.stage_id))
        .count();
    if dropped > 0 {
        warn!(dropped, "dropped stage progress entries no longer in workflow template");
    }

    renumber(&mut result);
    result
}

/// Overlay display metadata from the template onto the progress entries.
///
/// Overlay fields are `skip_serializing` so this never reaches storage.
pub fn enrich(progress: &mut [StageProgress], stages: &[WorkflowStage]) {
    for entry in progress.iter_mut() {
        if let Some(stage) = stages.iter().find(|s| s.id == entry.stage_id) {
            entry.stage_name = Some(stage.name.clone());
            entry.estimated_days = stage.estimated_duration;
            entry.visible_in_portal = stage.visible_in_portal;
            entry.components = stage.components.clone();
        }
    }
    renumber(progress);
}

/// Mark `stage_id` completed and activate the next open stage.
///
/// Completion is non-sequential: any open stage may be completed at any time.
/// The next current stage is the lowest-order not-yet-completed entry AFTER
/// the completed one; earlier open stages keep their status but lose the
/// current flag. Skipped entries are never activated. Re-completing an
/// already-completed stage only appends a dated note line.
pub fn complete(
    progress: &mut [StageProgress],
    stage_id: i64,
    actor: &Actor,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CompleteOutcome> {
    let target_idx = progress
        .iter()
        .position(|entry| entry.stage_id == stage_id)
        .ok_or_else(|| business_rule(format!("stage {stage_id} is not part of this case")))?;

    if progress[target_idx].is_completed {
        if let Some(text) = notes {
            progress[target_idx].append_note(text, now);
        }
        return Ok(CompleteOutcome {
            all_done: all_done(progress),
            activated_stage_id: None,
        });
    }

    progress[target_idx].mark_completed(actor, now);
    if let Some(text) = notes {
        if !text.trim().is_empty() {
            progress[target_idx].append_note(text, now);
        }
    }

    for entry in progress.iter_mut() {
        entry.is_current = false;
    }

    let completed_order = progress[target_idx].stage_order;
    let next_idx = progress
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            entry.stage_order > completed_order
                && !entry.is_completed
                && entry.status != StageStatus::Skipped
        })
        .min_by_key(|(_, entry)| entry.stage_order)
        .map(|(idx, _)| idx);

    let activated_stage_id = match next_idx {
        Some(idx) => {
            progress[idx].activate(now);
            Some(progress[idx].stage_id)
        }
        None => None,
    };

    Ok(CompleteOutcome {
        all_done: all_done(progress),
        activated_stage_id,
    })
}

/// Whether every stage is Completed or Skipped.
pub fn all_done(progress: &[StageProgress]) -> bool {
    !progress.is_empty()
        && progress
            .iter()
            .all(|entry| entry.is_completed || entry.status == StageStatus::Skipped)
}

/// Completed-stage percentage, 0-100 with two decimal places.
///
/// Skipped stages do not count toward the numerator. The monotonic floor
/// against the previously stored rate is applied by the orchestrator, not
/// here.
pub fn completion_rate(progress: &[StageProgress]) -> Decimal {
    if progress.is_empty() {
        return Decimal::ZERO;
    }
    let completed = progress.iter().filter(|entry| entry.is_completed).count();
    (Decimal::from(completed as u64) * Decimal::ONE_HUNDRED / Decimal::from(progress.len() as u64))
        .round_dp(2)
}

/// Align is_current flags and open statuses with the case's stage pointer.
///
/// Completed, Skipped, Rejected, and Terminated entries are never touched.
/// Callers that must not move progress (force-complete) snapshot the list
/// around this.
pub fn sync_current_pointer(
    progress: &mut [StageProgress],
    current_stage_id: Option<i64>,
    now: DateTime<Utc>,
) {
    for entry in progress.iter_mut() {
        if !entry.status.is_open() {
            entry.is_current = false;
            continue;
        }
        if Some(entry.stage_id) == current_stage_id {
            entry.activate(now);
        } else {
            entry.is_current = false;
            entry.status = StageStatus::Pending;
        }
    }
}

fn renumber(progress: &mut [StageProgress]) {
    for (idx, entry) in progress.iter_mut().enumerate() {
        entry.stage_order = idx as i32 + 1;
    }
}

fn join_nonempty(teams: &[String]) -> Option<String> {
    if teams.is_empty() {
        None
    } else {
        Some(teams.join(", "))
    }
}
