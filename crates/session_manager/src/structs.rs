//! Session data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Variable bindings of a session.
pub type VariableMap = HashMap<String, String>;

/// One user's conversational context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSession {
    pub user_id: String,

    /// Name of the state the conversation is currently in
    pub state: String,

    /// Values captured from messages or copied by actions
    #[serde(default)]
    pub variables: VariableMap,

    /// Error kinds flagged for this session, keyed by state name
    #[serde(default)]
    pub error_flags: HashMap<String, BTreeSet<String>>,

    /// Last time a message was processed for this session
    pub last_active: DateTime<Utc>,
}

impl UserSession {
    /// Create a fresh session positioned at `state`
    pub fn new(user_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: state.into(),
            variables: VariableMap::new(),
            error_flags: HashMap::new(),
            last_active: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Whether the session has been idle for longer than `timeout` at `now`.
    ///
    /// A `last_active` in the future never counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now.signed_duration_since(self.last_active)
            .to_std()
            .map(|idle| idle > timeout)
            .unwrap_or(false)
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Copy the value of `source` into `target`. No-op when `source` is unset.
    pub fn copy_var(&mut self, source: &str, target: &str) -> bool {
        match self.variables.get(source).cloned() {
            Some(value) => {
                self.variables.insert(target.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Move the session to another state. Variables are kept.
    pub fn enter(&mut self, state: impl Into<String>) {
        self.state = state.into();
    }

    /// Flag `kind` for the session's current state.
    pub fn flag_error(&mut self, kind: impl Into<String>) {
        self.error_flags
            .entry(self.state.clone())
            .or_default()
            .insert(kind.into());
    }

    pub fn is_flagged(&self, state: &str, kind: &str) -> bool {
        self.error_flags
            .get(state)
            .is_some_and(|kinds| kinds.contains(kind))
    }

    /// Clear `kind` for `state`, returning whether it was flagged.
    pub fn take_error_flag(&mut self, state: &str, kind: &str) -> bool {
        let Some(kinds) = self.error_flags.get_mut(state) else {
            return false;
        };
        let was_flagged = kinds.remove(kind);
        if kinds.is_empty() {
            self.error_flags.remove(state);
        }
        was_flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_expiry_window() {
        let mut session = UserSession::new("u1", "start");
        let now = Utc::now();
        session.last_active = now - ChronoDuration::seconds(120);

        assert!(session.is_expired(now, Duration::from_secs(60)));
        assert!(!session.is_expired(now, Duration::from_secs(300)));

        session.last_active = now + ChronoDuration::seconds(10);
        assert!(!session.is_expired(now, Duration::from_secs(0)));
    }

    #[test]
    fn test_copy_var_requires_source() {
        let mut session = UserSession::new("u1", "start");
        assert!(!session.copy_var("name", "child_name"));
        assert_eq!(session.var("child_name"), None);

        session.set_var("name", "Ann");
        assert!(session.copy_var("name", "child_name"));
        assert_eq!(session.var("child_name"), Some("Ann"));
    }

    #[test]
    fn test_error_flags_are_per_state() {
        let mut session = UserSession::new("u1", "update");
        session.flag_error("invalid_weight");

        assert!(session.is_flagged("update", "invalid_weight"));
        assert!(!session.is_flagged("start", "invalid_weight"));

        assert!(session.take_error_flag("update", "invalid_weight"));
        assert!(!session.take_error_flag("update", "invalid_weight"));
        assert!(session.error_flags.is_empty());
    }

    #[test]
    fn test_enter_keeps_variables() {
        let mut session = UserSession::new("u1", "start");
        session.set_var("month", "January");
        session.enter("history");

        assert_eq!(session.state, "history");
        assert_eq!(session.var("month"), Some("January"));
    }

    #[test]
    fn test_serde_roundtrip_defaults() {
        let json = r#"{"user_id":"u1","state":"start","last_active":"2024-01-01T00:00:00Z"}"#;
        let session: UserSession = serde_json::from_str(json).unwrap();
        assert!(session.variables.is_empty());
        assert!(session.error_flags.is_empty());
    }
}
