//! Session rule engine

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::listener::{Listener, ListenerEvent, ListenerKind};
use crate::rule::{Rule, RuleMatch};
use crate::state::BotState;
use crate::template;
use futures::future::join_all;
use session_manager::{spawn_sweeper, SessionStore, UserSession};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

type SharedListener = Arc<dyn Listener>;

/// Rule-based conversational state machine.
///
/// Cloning is cheap; clones share states, sessions and listeners.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    config: BotConfig,
    states: RwLock<HashMap<String, Arc<BotState>>>,
    globals: RwLock<HashMap<String, String>>,
    state_listeners: RwLock<HashMap<String, SharedListener>>,
    rule_listeners: RwLock<HashMap<String, SharedListener>>,
    sessions: Arc<SessionStore>,
    /// Serializes messages of all users unless `concurrent_access` is set
    serial: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    listener_tasks: TaskTracker,
}

impl Drop for BotInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Result of applying one message to a locked session.
struct Reply {
    response: String,
    notify: Vec<ListenerKind>,
}

impl Bot {
    /// Create a bot and start the session sweeper on the current runtime.
    pub fn new(config: BotConfig) -> Self {
        let sessions = Arc::new(match &config.storage {
            Some(storage) => SessionStore::with_storage(Arc::clone(storage)),
            None => SessionStore::new(),
        });
        let shutdown = CancellationToken::new();

        let sweeper = if config.session_cleanup_interval.is_zero() {
            warn!("[{}] Cleanup interval is zero, session sweeper disabled", config.name);
            None
        } else if Handle::try_current().is_err() {
            warn!(
                "[{}] No tokio runtime available, session sweeper disabled",
                config.name
            );
            None
        } else {
            Some(spawn_sweeper(
                Arc::clone(&sessions),
                config.session_timeout,
                config.session_cleanup_interval,
                shutdown.clone(),
            ))
        };

        info!(
            "[{}] Bot created (starting state '{}', concurrent access {})",
            config.name, config.starting_state, config.concurrent_access
        );

        Self {
            inner: Arc::new(BotInner {
                config,
                states: RwLock::new(HashMap::new()),
                globals: RwLock::new(HashMap::new()),
                state_listeners: RwLock::new(HashMap::new()),
                rule_listeners: RwLock::new(HashMap::new()),
                sessions,
                serial: tokio::sync::Mutex::new(()),
                shutdown,
                sweeper: Mutex::new(sweeper),
                listener_tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    /// Insert a state, replacing any state with the same name.
    pub fn register_state(&self, state: BotState) {
        debug!("[{}] Registering state '{}'", self.inner.config.name, state.name);
        write(&self.inner.states).insert(state.name.clone(), Arc::new(state));
    }

    /// Append `rule` to the rules of `state_name`.
    pub fn register_rule(&self, state_name: &str, rule: Rule) -> Result<()> {
        let mut states = write(&self.inner.states);
        let state = states
            .get_mut(state_name)
            .ok_or_else(|| BotError::StateNotFound(state_name.to_string()))?;
        debug!(
            "[{}] Registering rule '{}' in state '{}'",
            self.inner.config.name, rule.name, state_name
        );
        Arc::make_mut(state).rules.push(Arc::new(rule));
        Ok(())
    }

    /// Observe every entry into `state_name` and every rule match within it.
    pub fn register_state_listener<L>(&self, state_name: impl Into<String>, listener: L)
    where
        L: Listener + 'static,
    {
        write(&self.inner.state_listeners).insert(state_name.into(), Arc::new(listener));
    }

    /// Observe matches of the rule named `rule_name`.
    pub fn register_rule_listener<L>(&self, rule_name: impl Into<String>, listener: L)
    where
        L: Listener + 'static,
    {
        write(&self.inner.rule_listeners).insert(rule_name.into(), Arc::new(listener));
    }

    pub fn set_global_var(&self, name: impl Into<String>, value: impl Into<String>) {
        write(&self.inner.globals).insert(name.into(), value.into());
    }

    pub fn global_var(&self, name: &str) -> Option<String> {
        read(&self.inner.globals).get(name).cloned()
    }

    pub fn has_state(&self, name: &str) -> bool {
        read(&self.inner.states).contains_key(name)
    }

    pub fn state_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner.states).keys().cloned().collect();
        names.sort();
        names
    }

    /// Process one inbound message for `user_id` and return the response.
    ///
    /// Literal transitions take precedence over rules. Unmatched input answers
    /// with the current state's entry message.
    pub async fn process_message(&self, user_id: &str, message: &str) -> Result<String> {
        if self.is_stopped() {
            return Err(BotError::Stopped);
        }

        let _serial = if self.inner.config.concurrent_access {
            None
        } else {
            Some(self.inner.serial.lock().await)
        };

        let mut session = self
            .inner
            .sessions
            .lock_session(user_id, &self.inner.config.starting_state)
            .await?;
        session.touch();

        let reply = self.dispatch(&mut session, message).await;
        self.persist(&session).await;
        let snapshot = session.clone();
        drop(session);

        let reply = reply?;
        self.notify(user_id, message, &snapshot, reply.notify);
        Ok(reply.response)
    }

    /// Move `user_id` to `state_name`, creating the session if needed, and
    /// return the rendered entry message.
    pub async fn move_to_state(&self, user_id: &str, state_name: &str) -> Result<String> {
        if self.is_stopped() {
            return Err(BotError::Stopped);
        }
        let state = self
            .state(state_name)
            .ok_or_else(|| BotError::StateNotFound(state_name.to_string()))?;

        let mut session = self
            .inner
            .sessions
            .lock_session(user_id, &self.inner.config.starting_state)
            .await?;
        session.touch();
        session.enter(state.name.clone());
        let response = self.render(&state.entry_message, &session);
        self.persist(&session).await;
        let snapshot = session.clone();
        drop(session);

        debug!("[{}] Moved to state '{}'", user_id, state.name);
        self.notify(
            user_id,
            "",
            &snapshot,
            vec![ListenerKind::StateEntered { state: state.name.clone() }],
        );
        Ok(response)
    }

    /// Flag error `kind` for the user's current state. The next match of a
    /// rule with a matching error rule answers with the error message instead.
    pub async fn flag_error(&self, user_id: &str, kind: &str) -> Result<()> {
        let mut session = self
            .inner
            .sessions
            .lock_session(user_id, &self.inner.config.starting_state)
            .await?;
        session.flag_error(kind);
        debug!("[{}] Flagged '{}' in state '{}'", user_id, kind, session.state);
        self.persist(&session).await;
        Ok(())
    }

    /// Snapshot of the user's session.
    pub async fn session(&self, user_id: &str) -> Option<UserSession> {
        self.inner.sessions.snapshot(user_id).await
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Evict expired sessions now instead of waiting for the next sweep.
    pub async fn sweep_expired(&self) -> usize {
        self.inner
            .sessions
            .sweep(self.inner.config.session_timeout)
            .await
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop the sweeper and wait for running listeners. Safe to call twice.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();

        let sweeper = lock(&self.inner.sweeper).take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!("[{}] Session sweeper ended abnormally: {}", self.inner.config.name, e);
            }
        }

        self.inner.listener_tasks.close();
        self.inner.listener_tasks.wait().await;
        info!("[{}] Bot stopped", self.inner.config.name);
    }

    async fn dispatch(&self, session: &mut UserSession, message: &str) -> Result<Reply> {
        let Some(state) = self.state(&session.state) else {
            let error = BotError::StateNotFound(session.state.clone());
            self.report(&error);
            return Err(error);
        };

        // Pattern-triggered error rules pre-empt everything else.
        if let Some(error_rule) = state
            .rules
            .iter()
            .flat_map(|rule| rule.error_rules.iter())
            .find(|error_rule| error_rule.matches_message(message))
        {
            debug!("[{}] Error pattern matched in '{}'", session.user_id, state.name);
            return Ok(Reply {
                response: self.render(&error_rule.message, session),
                notify: Vec::new(),
            });
        }

        if let Some(transition) = state.transition_for(message) {
            let Some(target) = self.state(&transition.target) else {
                let error = BotError::StateNotFound(transition.target.clone());
                self.report(&error);
                return Err(error);
            };
            debug!(
                "[{}] '{}' -> '{}' on '{}'",
                session.user_id, state.name, target.name, message
            );
            session.enter(target.name.clone());
            return Ok(Reply {
                response: self.render(&target.entry_message, session),
                notify: vec![ListenerKind::StateEntered {
                    state: target.name.clone(),
                }],
            });
        }

        let matches = evaluate_rules(&state, message).await;
        if matches.is_empty() {
            self.report(&BotError::NoValidRule {
                state: state.name.clone(),
                message: message.to_string(),
            });
            return Ok(Reply {
                response: self.render(&state.entry_message, session),
                notify: Vec::new(),
            });
        }

        for matched in &matches {
            for (name, value) in &matched.captures {
                session.set_var(name.clone(), value.clone());
            }
            for action in &state.rules[matched.index].actions {
                action.apply(session);
            }
        }

        let mut responses = Vec::with_capacity(matches.len());
        let mut notify = Vec::new();
        for matched in &matches {
            let rule = &state.rules[matched.index];
            let flagged = rule
                .flagged_error(session, &state.name)
                .map(|error_rule| (error_rule.kind().map(str::to_string), error_rule.message.clone()));

            match flagged {
                Some((kind, error_message)) => {
                    if let Some(kind) = kind {
                        session.take_error_flag(&state.name, &kind);
                    }
                    debug!("[{}] Rule '{}' answered with error", session.user_id, rule.name);
                    responses.push(self.render(&error_message, session));
                }
                None => {
                    debug!("[{}] Rule '{}' matched", session.user_id, rule.name);
                    responses.push(self.render(&rule.response, session));
                    notify.push(ListenerKind::RuleMatched {
                        state: state.name.clone(),
                        rule: rule.name.clone(),
                    });
                }
            }
        }

        // Lowest registration index wins.
        let response = responses.into_iter().next().unwrap_or_default();
        Ok(Reply { response, notify })
    }

    fn state(&self, name: &str) -> Option<Arc<BotState>> {
        read(&self.inner.states).get(name).cloned()
    }

    fn render(&self, text: &str, session: &UserSession) -> String {
        template::render(text, &session.variables, &read(&self.inner.globals))
    }

    async fn persist(&self, session: &UserSession) {
        if let Err(e) = self.inner.sessions.persist(session).await {
            self.report(&BotError::Session(e));
        }
    }

    fn report(&self, error: &BotError) {
        match error {
            BotError::NoValidRule { .. } => debug!("[{}] {}", self.inner.config.name, error),
            _ => warn!("[{}] {}", self.inner.config.name, error),
        }
        if let Some(logger) = &self.inner.config.error_logger {
            logger(error);
        }
    }

    fn listeners_for(&self, kind: &ListenerKind) -> Vec<SharedListener> {
        let states = read(&self.inner.state_listeners);
        match kind {
            ListenerKind::StateEntered { state } => states.get(state).cloned().into_iter().collect(),
            ListenerKind::RuleMatched { state, rule } => {
                let rules = read(&self.inner.rule_listeners);
                states
                    .get(state)
                    .cloned()
                    .into_iter()
                    .chain(rules.get(rule).cloned())
                    .collect()
            }
        }
    }

    /// Hand listener calls to the blocking pool; the caller never waits on them.
    fn notify(&self, user_id: &str, message: &str, session: &UserSession, kinds: Vec<ListenerKind>) {
        for kind in kinds {
            let listeners = self.listeners_for(&kind);
            if listeners.is_empty() {
                continue;
            }

            let event = Arc::new(ListenerEvent {
                user_id: user_id.to_string(),
                message: message.to_string(),
                session: session.clone(),
                kind,
            });
            for listener in listeners {
                let bot = self.clone();
                let event = Arc::clone(&event);
                self.inner
                    .listener_tasks
                    .spawn_blocking(move || listener.on_event(&event, &bot));
            }
        }
    }
}

/// Match every rule of `state` in parallel; results come back in
/// registration order.
async fn evaluate_rules(state: &BotState, message: &str) -> Vec<RuleMatch> {
    let tasks = state.rules.iter().enumerate().map(|(index, rule)| {
        let rule = Arc::clone(rule);
        let message = message.to_string();
        tokio::task::spawn_blocking(move || rule.evaluate(index, &message))
    });

    join_all(tasks)
        .await
        .into_iter()
        .filter_map(|result| match result {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Rule evaluation task failed: {}", e);
                None
            }
        })
        .collect()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
