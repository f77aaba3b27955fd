//! Transition engine
//!
//! `Fsm` is a cheap, cloneable handle. Transitions without an action commit
//! before `send_event` returns; transitions with an action commit from a
//! detached task once the action resolves. `stop()` aborts in-flight actions
//! and waits for them to drain.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{ActionError, FsmError, Result};

use super::action::{Params, SharedAction, TransitionAction};
use super::observer::TransitionObserver;
use super::transitions::{StateTransition, Transition, TransitionTable};

const MAX_HISTORY: usize = 50;

/// Event-driven state machine over opaque state and event values.
pub struct Fsm<S, E> {
    inner: Arc<FsmInner<S, E>>,
}

impl<S, E> Clone for Fsm<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct FsmInner<S, E> {
    table: RwLock<TransitionTable<S, E>>,
    current: RwLock<S>,
    history: Mutex<VecDeque<StateTransition<S, E>>>,
    observer: Arc<dyn TransitionObserver<S, E>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl<S, E> Fsm<S, E>
where
    S: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    E: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    /// Create a state machine positioned at `initial`.
    ///
    /// Fails with `MissingCallback` when no observer is supplied and with
    /// `DuplicateTransition` when two transitions share `(from, event)`.
    pub fn new(
        initial: S,
        transitions: impl IntoIterator<Item = Transition<S, E>>,
        observer: Option<Arc<dyn TransitionObserver<S, E>>>,
    ) -> Result<Self> {
        let observer = observer.ok_or(FsmError::MissingCallback)?;
        let table = TransitionTable::from_transitions(transitions)?;

        Ok(Self {
            inner: Arc::new(FsmInner {
                table: RwLock::new(table),
                current: RwLock::new(initial),
                history: Mutex::new(VecDeque::new()),
                observer,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        })
    }

    /// Insert a transition, replacing any existing one with the same `(from, event)`.
    pub fn add_transition(&self, transition: Transition<S, E>) {
        if let Some(previous) = write(&self.inner.table).upsert(transition) {
            debug!(
                from = ?previous.from,
                event = ?previous.event,
                "replaced existing transition"
            );
        }
    }

    pub fn remove_transition(&self, from: &S, event: &E) -> Result<()> {
        write(&self.inner.table).remove(from, event).map(|_| ())
    }

    pub fn transition_exists(&self, from: &S, event: &E) -> Result<bool> {
        read(&self.inner.table).exists(from, event)
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> S {
        read(&self.inner.current).clone()
    }

    /// Most recent committed transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition<S, E>> {
        lock(&self.inner.history).iter().cloned().collect()
    }

    /// Number of actions still in flight.
    pub fn pending_actions(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fire `event` from the current state.
    ///
    /// Returns once the transition is committed, or once its action has been
    /// scheduled. Action failures are not reported here: they surface through
    /// the error-redirect state and the log.
    pub async fn send_event(&self, event: E, params: Params) -> Result<()> {
        if self.is_stopped() {
            return Err(FsmError::EngineStopped);
        }

        // Hold `current` across lookup and commit so concurrent events cannot
        // both fire from the same state.
        let mut current = write(&self.inner.current);
        let from = current.clone();
        let transition = read(&self.inner.table).lookup(&from, &event)?.clone();

        match transition.action.clone() {
            None => {
                *current = transition.to.clone();
                drop(current);
                self.inner
                    .record(&from, &event, &transition.to, &params, false);
            }
            Some(action) => {
                drop(current);
                debug!(from = ?from, event = ?event, "scheduling transition action");
                self.spawn_action(transition, action, event, params);
            }
        }

        Ok(())
    }

    fn spawn_action(&self, transition: Transition<S, E>, action: SharedAction, event: E, params: Params) {
        let inner = Arc::clone(&self.inner);

        self.inner.tasks.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = inner.shutdown.cancelled() => {
                    debug!(event = ?event, "state machine stopped, abandoning action");
                    return;
                }
                outcome = run_action(action.as_ref(), &params, transition.timeout) => outcome,
            };

            if inner.shutdown.is_cancelled() {
                return;
            }

            let (to, redirected) = match outcome {
                Ok(()) => (transition.to.clone(), false),
                Err(error) => match &transition.on_error {
                    Some(redirect) => {
                        warn!(
                            from = ?transition.from,
                            event = ?event,
                            redirect = ?redirect,
                            "transition action failed: {}",
                            error
                        );
                        (redirect.clone(), true)
                    }
                    None => {
                        warn!(
                            from = ?transition.from,
                            event = ?event,
                            "transition action failed, state unchanged: {}",
                            error
                        );
                        return;
                    }
                },
            };

            if !inner.commit_from(&transition.from, &event, to, &params, redirected) {
                debug!(
                    from = ?transition.from,
                    event = ?event,
                    "state moved on while the action ran, result dropped"
                );
            }
        });
    }

    /// Abort in-flight actions and wait until they have all finished.
    ///
    /// Safe to call more than once; later `send_event` calls fail with
    /// `EngineStopped`.
    pub async fn stop(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("stopping state machine");
        }
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

impl<S, E> FsmInner<S, E>
where
    S: Clone + Eq + fmt::Debug,
    E: Clone + fmt::Debug,
{
    /// Move to `to` only if the machine is still in `from`.
    fn commit_from(&self, from: &S, event: &E, to: S, params: &Params, redirected: bool) -> bool {
        {
            let mut current = write(&self.current);
            if *current != *from {
                return false;
            }
            *current = to.clone();
        }
        self.record(from, event, &to, params, redirected);
        true
    }

    /// Append to history and notify the observer of a committed transition.
    fn record(&self, from: &S, event: &E, to: &S, params: &Params, redirected: bool) {
        {
            let mut history = lock(&self.history);
            history.push_back(StateTransition {
                from: from.clone(),
                to: to.clone(),
                event: event.clone(),
                redirected,
            });
            if history.len() > MAX_HISTORY {
                history.pop_front();
            }
        }

        debug!(from = ?from, event = ?event, to = ?to, redirected, "transition committed");
        self.observer.on_transition(from, event, to, params);
    }
}

async fn run_action(
    action: &dyn TransitionAction,
    params: &Params,
    timeout: Option<Duration>,
) -> std::result::Result<(), ActionError> {
    match timeout {
        Some(limit) if !limit.is_zero() => {
            match tokio::time::timeout(limit, action.run(params)).await {
                Ok(result) => result,
                Err(_) => Err(ActionError::TimedOut(limit)),
            }
        }
        _ => action.run(params).await,
    }
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
