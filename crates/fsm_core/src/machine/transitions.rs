//! State transitions - the keyed transition table
//!
//! Transitions are addressed by `(from, event)`. A state is "registered" as
//! long as at least one transition leaves it.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use crate::error::{FsmError, Result};

use super::action::SharedAction;

/// A `(from, event) -> to` edge with optional async action.
#[derive(Clone)]
pub struct Transition<S, E> {
    pub from: S,
    pub event: E,
    pub to: S,
    /// Runs before the transition commits. Without an action the transition
    /// commits synchronously.
    pub action: Option<SharedAction>,
    /// Upper bound for the action. Ignored when there is no action.
    pub timeout: Option<Duration>,
    /// State entered when the action fails or times out.
    pub on_error: Option<S>,
}

impl<S, E> Transition<S, E> {
    pub fn new(from: S, event: E, to: S) -> Self {
        Self {
            from,
            event,
            to,
            action: None,
            timeout: None,
            on_error: None,
        }
    }

    pub fn with_action(mut self, action: SharedAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_on_error(mut self, state: S) -> Self {
        self.on_error = Some(state);
        self
    }
}

impl<S: fmt::Debug, E: fmt::Debug> fmt::Debug for Transition<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("event", &self.event)
            .field("to", &self.to)
            .field("has_action", &self.action.is_some())
            .field("timeout", &self.timeout)
            .field("on_error", &self.on_error)
            .finish()
    }
}

/// Record of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition<S, E> {
    /// The state before the transition.
    pub from: S,
    /// The state after the transition.
    pub to: S,
    /// The event that triggered the transition.
    pub event: E,
    /// Whether the transition landed on its error-redirect state.
    pub redirected: bool,
}

/// Two-level `from -> event -> transition` lookup table.
#[derive(Debug, Clone)]
pub struct TransitionTable<S, E> {
    edges: HashMap<S, HashMap<E, Transition<S, E>>>,
}

impl<S, E> Default for TransitionTable<S, E> {
    fn default() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }
}

impl<S, E> TransitionTable<S, E>
where
    S: Clone + Eq + Hash + fmt::Debug,
    E: Clone + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, rejecting two transitions with the same `(from, event)`.
    pub fn from_transitions(transitions: impl IntoIterator<Item = Transition<S, E>>) -> Result<Self> {
        let mut table = Self::new();
        for transition in transitions {
            if table.contains(&transition.from, &transition.event) {
                return Err(FsmError::duplicate(&transition.from, &transition.event));
            }
            table.upsert(transition);
        }
        Ok(table)
    }

    /// Insert or replace the transition keyed by its `(from, event)`.
    pub fn upsert(&mut self, transition: Transition<S, E>) -> Option<Transition<S, E>> {
        self.edges
            .entry(transition.from.clone())
            .or_default()
            .insert(transition.event.clone(), transition)
    }

    /// Remove `(from, event)`. Fails only when `from` has no transitions at all.
    pub fn remove(&mut self, from: &S, event: &E) -> Result<Option<Transition<S, E>>> {
        let events = self
            .edges
            .get_mut(from)
            .ok_or_else(|| FsmError::state_not_found(from))?;
        let removed = events.remove(event);
        if events.is_empty() {
            self.edges.remove(from);
        }
        Ok(removed)
    }

    pub fn exists(&self, from: &S, event: &E) -> Result<bool> {
        self.edges
            .get(from)
            .map(|events| events.contains_key(event))
            .ok_or_else(|| FsmError::state_not_found(from))
    }

    /// Resolve the transition to take from `state` on `event`.
    pub fn lookup(&self, state: &S, event: &E) -> Result<&Transition<S, E>> {
        let events = self
            .edges
            .get(state)
            .ok_or_else(|| FsmError::invalid_state(state))?;
        events
            .get(event)
            .ok_or_else(|| FsmError::invalid_event(state, event))
    }

    pub fn contains(&self, from: &S, event: &E) -> bool {
        self.edges
            .get(from)
            .is_some_and(|events| events.contains_key(event))
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TransitionTable<&'static str, &'static str> {
        TransitionTable::from_transitions([
            Transition::new("start", "event1", "state1"),
            Transition::new("state1", "event2", "state2"),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = TransitionTable::from_transitions([
            Transition::new("A", "X", "B"),
            Transition::new("A", "X", "C"),
        ]);
        assert!(matches!(result, Err(FsmError::DuplicateTransition { .. })));
    }

    #[test]
    fn test_exists_matrix() {
        let table = table();
        assert_eq!(table.exists(&"start", &"event1"), Ok(true));
        assert_eq!(table.exists(&"state1", &"event2"), Ok(true));
        assert_eq!(table.exists(&"start", &"event2"), Ok(false));
        assert_eq!(table.exists(&"state1", &"event1"), Ok(false));
        assert!(matches!(
            table.exists(&"state2", &"event3"),
            Err(FsmError::StateNotFound(_))
        ));
    }

    #[test]
    fn test_upsert_replaces_target() {
        let mut table = table();
        let previous = table.upsert(Transition::new("start", "event1", "elsewhere"));
        assert_eq!(previous.map(|t| t.to), Some("state1"));
        assert_eq!(table.lookup(&"start", &"event1").unwrap().to, "elsewhere");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove_semantics() {
        let mut table = table();

        // Absent event on a registered state is a no-op.
        assert!(table.remove(&"start", &"event2").unwrap().is_none());

        assert!(table.remove(&"start", &"event1").unwrap().is_some());
        // Last transition gone: the state is no longer registered.
        assert!(matches!(
            table.remove(&"start", &"event1"),
            Err(FsmError::StateNotFound(_))
        ));
    }

    #[test]
    fn test_lookup_errors() {
        let table = table();
        assert!(matches!(
            table.lookup(&"state2", &"event1"),
            Err(FsmError::InvalidState(_))
        ));
        assert!(matches!(
            table.lookup(&"state1", &"event1"),
            Err(FsmError::InvalidEvent { .. })
        ));
    }
}
