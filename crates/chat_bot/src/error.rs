//! Bot error types

use session_manager::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Invalid pattern for rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("State '{0}' not found")]
    StateNotFound(String),

    #[error("No valid rule in state '{state}' for message: {message}")]
    NoValidRule { state: String, message: String },

    #[error("Invalid bot definition: {0}")]
    Definition(String),

    #[error("Bot has been stopped")]
    Stopped,

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;
