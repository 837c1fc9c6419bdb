//! Desktop input: held keys, mouse buttons and motion, plus toggle actions.
//!
//! # Invariants
//! - Camera motion reads level-triggered state, never events.
//! - Toggles are edge-triggered [`Action`]s.

pub mod action;
mod state;

pub use action::Action;
pub use state::{InputState, Key, MouseButtons};
