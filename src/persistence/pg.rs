//! Postgres adapter for [`CaseRepository`].
//!
//! Expects a `cases` table whose scalar columns mirror [`Case`] and whose
//! `stages_progress` column is `jsonb`. Writes are two phases inside one
//! transaction: the scalar UPDATE, then the JSONB UPDATE with a `$1::jsonb`
//! typed cast. Some legacy rows live behind drivers that reject the typed
//! cast, so a cast failure rolls back to a savepoint and retries once with a
//! string-escaped literal statement before giving up.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Acquire, Row};
use tracing::{debug, warn};

use crate::error::{not_found, CaseflowError, Result};
use crate::models::Case;
use crate::persistence::CaseRepository;
use crate::progress::store;
use crate::state_machine::CaseState;

pub struct PgCaseRepository {
    pool: PgPool,
}

impl PgCaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_CASE: &str = r"
SELECT id, workflow_id, name, status, current_stage_id, current_stage_order,
       completion_rate, start_date, current_stage_start_time,
       estimated_completion_date, actual_completion_date, notes,
       stages_progress::text AS stages_progress,
       stage_updated_time, stage_updated_by, stage_updated_by_id,
       updated_at, updated_by, updated_by_id
FROM cases
WHERE id = $1
";

const UPDATE_SCALARS: &str = r"
UPDATE cases
SET workflow_id = $2,
    name = $3,
    status = $4,
    current_stage_id = $5,
    current_stage_order = $6,
    completion_rate = $7,
    start_date = $8,
    current_stage_start_time = $9,
    estimated_completion_date = $10,
    actual_completion_date = $11,
    notes = $12,
    stage_updated_time = $13,
    stage_updated_by = $14,
    stage_updated_by_id = $15,
    updated_at = $16,
    updated_by = $17,
    updated_by_id = $18
WHERE id = $1
";

const UPDATE_PROGRESS_TYPED: &str = r"
UPDATE cases SET stages_progress = $2::jsonb WHERE id = $1
";

#[async_trait]
impl CaseRepository for PgCaseRepository {
    async fn get(&self, id: i64) -> Result<Case> {
        let row = sqlx::query(SELECT_CASE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("case", id))?;

        let status_token: String = row.try_get("status")?;
        let status: CaseState = status_token.parse().map_err(|_| {
            CaseflowError::Storage(format!("case {id} has unknown status token: {status_token}"))
        })?;

        let raw_progress: Option<String> = row.try_get("stages_progress")?;
        let stages_progress = store::load(raw_progress.as_deref().unwrap_or(""))?;

        Ok(Case {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            name: row.try_get("name")?,
            status,
            current_stage_id: row.try_get("current_stage_id")?,
            current_stage_order: row.try_get("current_stage_order")?,
            completion_rate: row.try_get("completion_rate")?,
            start_date: row.try_get("start_date")?,
            current_stage_start_time: row.try_get("current_stage_start_time")?,
            estimated_completion_date: row.try_get("estimated_completion_date")?,
            actual_completion_date: row.try_get("actual_completion_date")?,
            notes: row.try_get("notes")?,
            stages_progress,
            stage_updated_time: row.try_get("stage_updated_time")?,
            stage_updated_by: row.try_get("stage_updated_by")?,
            stage_updated_by_id: row.try_get("stage_updated_by_id")?,
            updated_at: row.try_get("updated_at")?,
            updated_by: row.try_get("updated_by")?,
            updated_by_id: row.try_get("updated_by_id")?,
        })
    }

    async fn save(&self, case: &Case) -> Result<()> {
        let payload = store::serialize(&case.stages_progress)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(UPDATE_SCALARS)
            .bind(case.id)
            .bind(case.workflow_id)
            .bind(&case.name)
            .bind(case.status.as_str())
            .bind(case.current_stage_id)
            .bind(case.current_stage_order)
            .bind(case.completion_rate)
            .bind(case.start_date)
            .bind(case.current_stage_start_time)
            .bind(case.estimated_completion_date)
            .bind(case.actual_completion_date)
            .bind(&case.notes)
            .bind(case.stage_updated_time)
            .bind(&case.stage_updated_by)
            .bind(case.stage_updated_by_id)
            .bind(case.updated_at)
            .bind(&case.updated_by)
            .bind(case.updated_by_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(not_found("case", case.id));
        }

        write_progress(&mut tx, case.id, &payload).await?;
        tx.commit().await?;
        Ok(())
    }

}

/// Phase two of the write: typed-cast JSONB update inside a savepoint, raw
/// escaped-literal retry when the cast fails with a type error.
async fn write_progress(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    case_id: i64,
    payload: &str,
) -> Result<()> {
    let typed_result = {
        let mut savepoint = tx.begin().await?;
        match sqlx::query(UPDATE_PROGRESS_TYPED)
            .bind(case_id)
            .bind(payload)
            .execute(&mut *savepoint)
            .await
        {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(())
            }
            Err(err) => {
                savepoint.rollback().await?;
                Err(err)
            }
        }
    };

    match typed_result {
        Ok(()) => {
            debug!(case_id, "stage progress written via typed cast");
            Ok(())
        }
        Err(err) if is_type_cast_error(&err) => {
            warn!(case_id, error = %err, "typed jsonb cast failed, retrying with escaped literal");
            let escaped = payload.replace('\'', "''");
            let statement =
                format!("UPDATE cases SET stages_progress = '{escaped}'::jsonb WHERE id = {case_id}");
            sqlx::query(&statement).execute(&mut **tx).await.map_err(|e| {
                CaseflowError::Storage(format!(
                    "stage progress write for case {case_id} failed after cast fallback: {e}"
                ))
            })?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Type and representation errors worth the literal retry. Anything else
/// (connection loss, constraint violations) propagates untouched.
fn is_type_cast_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("22") || code.starts_with("42"))
            .unwrap_or(false),
        _ => false,
    }
}
