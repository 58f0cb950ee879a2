//! Stage transition orchestration.
//!
//! [`StageCompleter`] drives the full completion flow (initialize or
//! reconcile, complete, rate, auto-complete or advance, notify);
//! [`StageMover`] moves the current-stage pointer without touching
//! completion state.

pub mod advancement;
pub mod stage_completer;
pub mod types;

pub use advancement::StageMover;
pub use stage_completer::StageCompleter;
pub use types::{CompleteStageRequest, CompletionResult};
