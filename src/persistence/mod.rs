//! Persistence boundary for cases.
//!
//! The engine mutates cases in memory and hands the whole entity to
//! [`CaseRepository::save`], which owns the two-phase scalar + JSONB write.

pub mod pg;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Case;

pub use pg::PgCaseRepository;

/// Storage contract for case rows.
#[async_trait]
pub trait CaseRepository: Send + Sync {
    /// Fetch a case with its parsed stage-progress list. Unknown status
    /// tokens and corrupt progress payloads fail loud.
    async fn get(&self, id: i64) -> Result<Case>;

    /// Persist every mutable column and the stage-progress JSONB in one
    /// atomic write.
    async fn save(&self, case: &Case) -> Result<()>;
}
