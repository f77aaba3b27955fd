//! Listener callbacks fired on state entry and rule matches

use crate::bot::Bot;
use session_manager::UserSession;

/// What a listener was registered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerKind {
    StateEntered { state: String },
    RuleMatched { state: String, rule: String },
}

/// Payload handed to listeners.
///
/// `session` is a snapshot taken after the message was applied, so listeners
/// never hold the session lock.
#[derive(Debug, Clone)]
pub struct ListenerEvent {
    pub user_id: String,
    pub message: String,
    pub session: UserSession,
    pub kind: ListenerKind,
}

/// Callback registered on a state or rule.
///
/// Runs on the blocking pool, off the message path; a slow listener never
/// delays the response.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &ListenerEvent, bot: &Bot);
}

impl<F> Listener for F
where
    F: Fn(&ListenerEvent, &Bot) + Send + Sync,
{
    fn on_event(&self, event: &ListenerEvent, bot: &Bot) {
        self(event, bot)
    }
}
