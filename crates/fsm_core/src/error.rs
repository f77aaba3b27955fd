use std::time::Duration;

use thiserror::Error;

/// Convenient result alias for fsm_core.
pub type Result<T> = std::result::Result<T, FsmError>;

/// Errors returned by the transition engine.
///
/// States and events are generic, so they are carried in their `Debug`
/// rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    #[error("a transition callback is required")]
    MissingCallback,

    #[error("duplicate transition from {from} on event {event}")]
    DuplicateTransition { from: String, event: String },

    #[error("state {0} has no registered transitions")]
    StateNotFound(String),

    #[error("current state {0} has no registered transitions")]
    InvalidState(String),

    #[error("event {event} is not valid in state {state}")]
    InvalidEvent { state: String, event: String },

    #[error("state machine has been stopped")]
    EngineStopped,
}

impl FsmError {
    pub(crate) fn duplicate<S: std::fmt::Debug, E: std::fmt::Debug>(from: &S, event: &E) -> Self {
        Self::DuplicateTransition {
            from: format!("{from:?}"),
            event: format!("{event:?}"),
        }
    }

    pub(crate) fn state_not_found<S: std::fmt::Debug>(state: &S) -> Self {
        Self::StateNotFound(format!("{state:?}"))
    }

    pub(crate) fn invalid_state<S: std::fmt::Debug>(state: &S) -> Self {
        Self::InvalidState(format!("{state:?}"))
    }

    pub(crate) fn invalid_event<S: std::fmt::Debug, E: std::fmt::Debug>(state: &S, event: &E) -> Self {
        Self::InvalidEvent {
            state: format!("{state:?}"),
            event: format!("{event:?}"),
        }
    }
}

/// Failure of a transition action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action failed: {0}")]
    Failed(String),

    #[error("action timed out after {0:?}")]
    TimedOut(Duration),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
