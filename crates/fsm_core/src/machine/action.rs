//! Transition actions - async work executed before a transition commits

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ActionError;

/// Parameters passed along with an event to actions and the observer.
pub type Params = HashMap<String, serde_json::Value>;

/// Async work attached to a transition.
///
/// The transition commits to its target state only when the action succeeds.
#[async_trait]
pub trait TransitionAction: Send + Sync {
    async fn run(&self, params: &Params) -> Result<(), ActionError>;
}

pub type SharedAction = Arc<dyn TransitionAction>;

struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> TransitionAction for FnAction<F>
where
    F: Fn(Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    async fn run(&self, params: &Params) -> Result<(), ActionError> {
        (self.0)(params.clone()).await
    }
}

/// Wrap an async closure as a transition action.
pub fn action_fn<F, Fut>(f: F) -> SharedAction
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    Arc::new(FnAction(f))
}
