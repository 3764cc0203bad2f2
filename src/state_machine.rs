//! Session turn-loop state machine
//!
//! Elm-style: a pure transition function maps (state, event) to a new state
//! plus effects; the runtime executes the effects.

mod effect;
mod event;
mod state;
mod transition;

pub use effect::Effect;
pub use event::Event;
pub use state::{SessionContext, SessionState};
pub use transition::{transition, TransitionError, TransitionResult, MAX_RETRY_ATTEMPTS};
