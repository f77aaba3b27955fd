//! State machine module
//!
//! Contains the transition table, action and observer seams, and the engine.

mod action;
mod engine;
mod observer;
mod transitions;

pub use action::{action_fn, Params, SharedAction, TransitionAction};
pub use engine::Fsm;
pub use observer::TransitionObserver;
pub use transitions::{StateTransition, Transition, TransitionTable};
