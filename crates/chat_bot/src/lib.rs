//! chat_bot - Rule-based conversational state machine
//!
//! A [`Bot`] owns named states. Each state has an entry message, literal
//! transitions keyed by the exact message text, and regex rules that capture
//! variables into the user's session and answer with a rendered template.
//! Every user gets an independent session that expires after inactivity.

pub mod bot;
pub mod config;
pub mod definition;
pub mod error;
pub mod listener;
pub mod rule;
pub mod state;
pub mod template;

pub use bot::Bot;
pub use config::{BotConfig, ErrorLogger};
pub use definition::{BotDefinition, ErrorRuleDefinition, RuleDefinition, StateDefinition};
pub use error::{BotError, Result};
pub use listener::{Listener, ListenerEvent, ListenerKind};
pub use rule::{Action, ErrorRule, ErrorTrigger, Rule, RuleMatch};
pub use state::{BotState, Transition};

// Session types appear in listener events and snapshots.
pub use session_manager::{FileSessionStorage, SessionStorage, UserSession, VariableMap};
