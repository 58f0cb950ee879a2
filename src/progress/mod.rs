//! Per-case stage-progress tracking.
//!
//! [`entry`] defines the stored progress record and its status vocabulary;
//! [`store`] holds the pure operations (initialize, load, reconcile, enrich,
//! complete, rate) that the orchestrator and lifecycle machine compose. Both
//! are synchronous and storage-free so they can be tested without a database.

pub mod entry;
pub mod store;

pub use entry::{StageProgress, StageStatus};
pub use store::CompleteOutcome;
