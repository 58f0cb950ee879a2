#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Caseflow Core
//!
//! Case lifecycle state machine and stage-progress synchronization engine for
//! configurable multi-stage onboarding workflows.
//!
//! ## Overview
//!
//! A *case* is one customer instance progressing through an ordered workflow of
//! stages. The workflow template is editable after cases exist, so every case
//! carries its own stage-progress list that must be reconciled against template
//! drift on every load. This crate owns the three cooperating pieces with real
//! invariants:
//!
//! - [`progress`] - the per-case stage-progress store: initialization,
//!   tolerant legacy parsing, template reconciliation, display-metadata
//!   enrichment, and non-sequential stage completion
//! - [`state_machine`] - the case lifecycle: a closed status vocabulary with a
//!   single central transition table (start/pause/resume/abort/reactivate/
//!   reject/force-complete/cancel)
//! - [`orchestration`] - stage completion and advancement: composes the store,
//!   the lifecycle, an external condition engine, and notification dispatch
//!
//! Everything around them is a collaborator boundary: permission checks,
//! condition evaluation, notification delivery, and audit logging are consumed
//! through the traits in [`services`]; persistence goes through
//! [`persistence::CaseRepository`] with a Postgres adapter implementing the
//! two-phase scalar + JSONB write contract.
//!
//! ## Concurrency model
//!
//! One logical writer per case is assumed. Side effects (audit entries, stage
//! notifications) are dispatched through a bounded queue consumed by background
//! workers with at-least-once semantics; their failure never fails the primary
//! transition.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod progress;
pub mod services;
pub mod state_machine;

pub use config::{CaseflowConfig, DatabaseConfig, NotificationConfig, SideEffectConfig};
pub use error::{CaseflowError, Result};
pub use events::{SideEffect, SideEffectHandle, SideEffectQueue};
pub use models::{Actor, Case, WorkflowStage};
pub use orchestration::{CompleteStageRequest, CompletionResult, StageCompleter, StageMover};
pub use persistence::{CaseRepository, PgCaseRepository};
pub use progress::{StageProgress, StageStatus};
pub use state_machine::{CaseEvent, CaseLifecycle, CaseState};
