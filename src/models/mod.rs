//! Data layer: the case entity and the workflow stage template it follows.

pub mod case;
pub mod stage;

pub use case::{Actor, Case, MAX_NOTES_LEN};
pub use stage::WorkflowStage;
