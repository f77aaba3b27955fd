//! Bot configuration

use crate::error::BotError;
use session_manager::SessionStorage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Sink for runtime errors that do not surface through a return value.
pub type ErrorLogger = Arc<dyn Fn(&BotError) + Send + Sync>;

pub const DEFAULT_STARTING_STATE: &str = "start";
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct BotConfig {
    pub name: String,
    /// State new sessions start in
    pub starting_state: String,
    /// Idle time after which a session is evicted
    pub session_timeout: Duration,
    /// Period of the eviction sweep
    pub session_cleanup_interval: Duration,
    /// Let messages of different users run in parallel. When false every
    /// message is processed under one bot-wide lock.
    pub concurrent_access: bool,
    pub error_logger: Option<ErrorLogger>,
    /// Write-through persistence for sessions
    pub storage: Option<Arc<dyn SessionStorage>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "bot".to_string(),
            starting_state: DEFAULT_STARTING_STATE.to_string(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            session_cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            concurrent_access: false,
            error_logger: None,
            storage: None,
        }
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("name", &self.name)
            .field("starting_state", &self.starting_state)
            .field("session_timeout", &self.session_timeout)
            .field("session_cleanup_interval", &self.session_cleanup_interval)
            .field("concurrent_access", &self.concurrent_access)
            .field("error_logger", &self.error_logger.is_some())
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

impl BotConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_starting_state(mut self, state: impl Into<String>) -> Self {
        self.starting_state = state.into();
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.session_cleanup_interval = interval;
        self
    }

    pub fn with_concurrent_access(mut self, concurrent: bool) -> Self {
        self.concurrent_access = concurrent;
        self
    }

    pub fn with_error_logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&BotError) + Send + Sync + 'static,
    {
        self.error_logger = Some(Arc::new(logger));
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }
}
