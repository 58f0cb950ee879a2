//! Case lifecycle state machine.
//!
//! [`states`] defines the closed status vocabulary, [`events`] the transition
//! inputs, and [`lifecycle`] the single central transition table with its
//! guards and actions. All status changes in the crate flow through
//! [`CaseLifecycle::transition`]; nothing else assigns `Case::status`.

pub mod events;
pub mod lifecycle;
pub mod states;

pub use events::CaseEvent;
pub use lifecycle::CaseLifecycle;
pub use states::CaseState;
