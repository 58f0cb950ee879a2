//! Background side-effect dispatch.

pub mod side_effects;

pub use side_effects::{SideEffect, SideEffectHandle, SideEffectQueue};
