//! Rules - regex matchers bound to a state

use regex::Regex;
use serde::{Deserialize, Serialize};
use session_manager::UserSession;

use crate::error::{BotError, Result};

/// Side effect executed when a rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Copy the session variable `source` into `target`, when `source` is set.
    SetVariable { target: String, source: String },
}

impl Action {
    pub fn set_variable(target: impl Into<String>, source: impl Into<String>) -> Self {
        Self::SetVariable {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn apply(&self, session: &mut UserSession) {
        match self {
            Self::SetVariable { target, source } => {
                session.copy_var(source, target);
            }
        }
    }
}

/// What activates an error rule.
#[derive(Debug, Clone)]
pub enum ErrorTrigger {
    /// The named error kind was flagged for the session's current state.
    Flag(String),
    /// The inbound message matches; checked before literal transitions.
    Pattern(Regex),
}

/// Alternative response emitted instead of the rule's own.
#[derive(Debug, Clone)]
pub struct ErrorRule {
    pub trigger: ErrorTrigger,
    pub message: String,
}

impl ErrorRule {
    pub fn on_flag(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            trigger: ErrorTrigger::Flag(kind.into()),
            message: message.into(),
        }
    }

    pub fn on_pattern(pattern: &str, message: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| BotError::InvalidPattern {
            rule: format!("error rule '{pattern}'"),
            source,
        })?;
        Ok(Self {
            trigger: ErrorTrigger::Pattern(regex),
            message: message.into(),
        })
    }

    pub fn kind(&self) -> Option<&str> {
        match &self.trigger {
            ErrorTrigger::Flag(kind) => Some(kind),
            ErrorTrigger::Pattern(_) => None,
        }
    }

    pub fn matches_message(&self, message: &str) -> bool {
        match &self.trigger {
            ErrorTrigger::Pattern(regex) => regex.is_match(message),
            ErrorTrigger::Flag(_) => false,
        }
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub pattern: Regex,
    /// Response template
    pub response: String,
    pub actions: Vec<Action>,
    pub error_rules: Vec<ErrorRule>,
}

/// Outcome of matching one rule against a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// Registration index of the rule within its state
    pub index: usize,
    /// Named capture groups that participated in the match
    pub captures: Vec<(String, String)>,
}

impl Rule {
    /// Compile `pattern`; fails with `InvalidPattern`.
    pub fn new(name: impl Into<String>, pattern: &str, response: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|source| BotError::InvalidPattern {
            rule: name.clone(),
            source,
        })?;
        Ok(Self {
            name,
            pattern,
            response: response.into(),
            actions: Vec::new(),
            error_rules: Vec::new(),
        })
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_error_rules(mut self, error_rules: Vec<ErrorRule>) -> Self {
        self.error_rules = error_rules;
        self
    }

    /// Match `message`, collecting named groups.
    pub fn evaluate(&self, index: usize, message: &str) -> Option<RuleMatch> {
        let caps = self.pattern.captures(message)?;
        let captures = self
            .pattern
            .capture_names()
            .flatten()
            .filter_map(|group| {
                caps.name(group)
                    .map(|value| (group.to_string(), value.as_str().to_string()))
            })
            .collect();
        Some(RuleMatch { index, captures })
    }

    /// First flag-triggered error rule whose kind is flagged for `state`.
    pub fn flagged_error(&self, session: &UserSession, state: &str) -> Option<&ErrorRule> {
        self.error_rules
            .iter()
            .find(|rule| rule.kind().is_some_and(|kind| session.is_flagged(state, kind)))
    }
}
