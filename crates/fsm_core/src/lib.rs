//! fsm_core - Event-driven finite state machine
//!
//! A keyed `(state, event) -> state` transition table over arbitrary
//! comparable values. Transitions may run an async action (optionally bounded
//! by a timeout) and redirect to an error state when it fails. A single
//! observer is notified on every committed transition.

pub mod error;
pub mod machine;

// Re-export commonly used types
pub use error::{ActionError, FsmError, Result};
pub use machine::{
    action_fn, Fsm, Params, SharedAction, StateTransition, Transition, TransitionAction,
    TransitionObserver, TransitionTable,
};
