use super::action::Params;

/// Observer notified after every committed transition.
///
/// `to` is the state actually entered, which is the error-redirect state when
/// the transition's action failed.
pub trait TransitionObserver<S, E>: Send + Sync {
    fn on_transition(&self, from: &S, event: &E, to: &S, params: &Params);
}

impl<S, E, F> TransitionObserver<S, E> for F
where
    F: Fn(&S, &E, &S, &Params) + Send + Sync,
{
    fn on_transition(&self, from: &S, event: &E, to: &S, params: &Params) {
        self(from, event, to, params)
    }
}
