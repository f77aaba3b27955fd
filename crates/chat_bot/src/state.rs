use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::rule::Rule;

/// Literal transition: a message equal to `event` moves the session to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub event: String,
    pub target: String,
}

impl Transition {
    pub fn new(event: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            target: target.into(),
        }
    }
}

/// A conversational state.
#[derive(Debug, Clone)]
pub struct BotState {
    pub name: String,
    /// Template rendered when a session enters the state
    pub entry_message: String,
    pub transitions: Vec<Transition>,
    /// Evaluated concurrently; the lowest index wins ties
    pub rules: Vec<Arc<Rule>>,
}

impl BotState {
    pub fn new(
        name: impl Into<String>,
        entry_message: impl Into<String>,
        transitions: Vec<Transition>,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            name: name.into(),
            entry_message: entry_message.into(),
            transitions,
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    /// First transition, in registration order, whose event equals `message`.
    pub fn transition_for(&self, message: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.event == message)
    }
}
