//! Contract tests for the transition engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fsm_core::{action_fn, ActionError, Fsm, FsmError, Params, Transition, TransitionObserver};
use tokio::sync::mpsc;

type Commit = (&'static str, &'static str, &'static str);

fn channel_observer() -> (
    Arc<dyn TransitionObserver<&'static str, &'static str>>,
    mpsc::UnboundedReceiver<Commit>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer: Arc<dyn TransitionObserver<&'static str, &'static str>> = Arc::new(
        move |from: &&'static str, event: &&'static str, to: &&'static str, _: &Params| {
            let _ = tx.send((*from, *event, *to));
        },
    );
    (observer, rx)
}

async fn next_commit(rx: &mut mpsc::UnboundedReceiver<Commit>) -> Commit {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("observer was not called in time")
        .expect("observer channel closed")
}

#[tokio::test]
async fn test_send_event_walks_table() {
    let (observer, mut rx) = channel_observer();
    let fsm = Fsm::new(
        "A",
        [Transition::new("A", "X", "B"), Transition::new("B", "Y", "C")],
        Some(observer),
    )
    .unwrap();

    fsm.send_event("X", Params::new()).await.unwrap();
    assert_eq!(fsm.current_state(), "B");
    assert_eq!(next_commit(&mut rx).await, ("A", "X", "B"));

    let result = fsm.send_event("Z", Params::new()).await;
    assert!(matches!(result, Err(FsmError::InvalidEvent { .. })));
    assert_eq!(fsm.current_state(), "B");
}

#[tokio::test]
async fn test_state_without_transitions_is_invalid() {
    let (observer, _rx) = channel_observer();
    let fsm = Fsm::new("A", [Transition::new("A", "X", "B")], Some(observer)).unwrap();

    fsm.send_event("X", Params::new()).await.unwrap();
    let result = fsm.send_event("X", Params::new()).await;
    assert!(matches!(result, Err(FsmError::InvalidState(_))));
    assert_eq!(fsm.current_state(), "B");
}

#[tokio::test]
async fn test_timeout_without_action_commits_immediately() {
    let (observer, mut rx) = channel_observer();
    let fsm = Fsm::new(
        "start",
        [Transition::new("start", "event1", "state1").with_timeout(Duration::from_secs(1))],
        Some(observer),
    )
    .unwrap();

    let started = std::time::Instant::now();
    fsm.send_event("event1", Params::new()).await.unwrap();

    assert_eq!(fsm.current_state(), "state1");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(next_commit(&mut rx).await, ("start", "event1", "state1"));
}

#[tokio::test]
async fn test_timed_action_commits_once() {
    let (observer, mut rx) = channel_observer();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let action = action_fn(move |_| {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let fsm = Fsm::new(
        "A",
        [Transition::new("A", "X", "B")
            .with_action(action)
            .with_timeout(Duration::from_secs(1))],
        Some(observer),
    )
    .unwrap();

    fsm.send_event("X", Params::new()).await.unwrap();
    assert_eq!(next_commit(&mut rx).await, ("A", "X", "B"));
    assert_eq!(fsm.current_state(), "B");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Exactly one notification for one event.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failing_action_redirects() {
    let (observer, mut rx) = channel_observer();
    let fsm = Fsm::new(
        "state1",
        [Transition::new("state1", "event1", "state2")
            .with_action(action_fn(|_| async { Err(ActionError::failed("boom")) }))
            .with_on_error("errorState")],
        Some(observer),
    )
    .unwrap();

    fsm.send_event("event1", Params::new()).await.unwrap();
    assert_eq!(next_commit(&mut rx).await, ("state1", "event1", "errorState"));
    assert_eq!(fsm.current_state(), "errorState");
    assert!(fsm.history()[0].redirected);
}

#[tokio::test]
async fn test_action_timeout_redirects() {
    let (observer, mut rx) = channel_observer();
    let fsm = Fsm::new(
        "A",
        [Transition::new("A", "X", "B")
            .with_action(action_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }))
            .with_timeout(Duration::from_millis(20))
            .with_on_error("E")],
        Some(observer),
    )
    .unwrap();

    fsm.send_event("X", Params::new()).await.unwrap();
    assert_eq!(next_commit(&mut rx).await, ("A", "X", "E"));
}

#[tokio::test]
async fn test_failing_action_without_redirect_keeps_state() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let observer = move |_: &&'static str, _: &&'static str, _: &&'static str, _: &Params| {
        counter.fetch_add(1, Ordering::SeqCst);
    };
    let fsm = Fsm::new(
        "A",
        [Transition::new("A", "X", "B")
            .with_action(action_fn(|_| async { Err(ActionError::failed("nope")) }))],
        Some(Arc::new(observer) as Arc<dyn TransitionObserver<&'static str, &'static str>>),
    )
    .unwrap();

    fsm.send_event("X", Params::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    fsm.stop().await;

    assert_eq!(fsm.current_state(), "A");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_abandons_in_flight_actions() {
    let (observer, mut rx) = channel_observer();
    let fsm = Fsm::new(
        "A",
        [Transition::new("A", "X", "B").with_action(action_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }))],
        Some(observer),
    )
    .unwrap();

    fsm.send_event("X", Params::new()).await.unwrap();
    assert_eq!(fsm.pending_actions(), 1);

    let started = std::time::Instant::now();
    fsm.stop().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(fsm.pending_actions(), 0);
    assert_eq!(fsm.current_state(), "A");
    assert!(rx.try_recv().is_err());
    assert_eq!(
        fsm.send_event("X", Params::new()).await,
        Err(FsmError::EngineStopped)
    );
}

#[tokio::test]
async fn test_add_and_remove_transitions() {
    let (observer, _rx) = channel_observer();
    let fsm = Fsm::new(
        "start",
        [
            Transition::new("start", "event1", "state1"),
            Transition::new("state1", "event2", "state2"),
        ],
        Some(observer),
    )
    .unwrap();

    fsm.add_transition(Transition::new("start", "event1", "other"));
    fsm.send_event("event1", Params::new()).await.unwrap();
    assert_eq!(fsm.current_state(), "other");

    fsm.remove_transition(&"state1", &"event2").unwrap();
    assert!(matches!(
        fsm.transition_exists(&"state1", &"event2"),
        Err(FsmError::StateNotFound(_))
    ));
    assert!(matches!(
        fsm.remove_transition(&"state2", &"event3"),
        Err(FsmError::StateNotFound(_))
    ));

    // Removing an absent event on a registered state succeeds.
    fsm.remove_transition(&"start", &"missing").unwrap();
    assert_eq!(fsm.transition_exists(&"start", &"event1"), Ok(true));
}

#[tokio::test]
async fn test_params_reach_observer() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let observer = move |_: &u8, _: &u8, _: &u8, params: &Params| {
        let _ = tx.send(params.get("user").cloned());
    };
    let fsm = Fsm::new(
        0u8,
        [Transition::new(0u8, 1u8, 2u8)],
        Some(Arc::new(observer) as Arc<dyn TransitionObserver<u8, u8>>),
    )
    .unwrap();

    let mut params = Params::new();
    params.insert("user".to_string(), serde_json::json!("u1"));
    fsm.send_event(1, params).await.unwrap();

    assert_eq!(rx.recv().await, Some(Some(serde_json::json!("u1"))));
}

fn slow_action_machine(
    observer: Arc<dyn TransitionObserver<&'static str, &'static str>>,
) -> Fsm<&'static str, &'static str> {
    let action = action_fn(|_| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    });
    Fsm::new(
        "A",
        [
            Transition::new("A", "X", "B").with_action(action),
            Transition::new("A", "Y", "C"),
        ],
        Some(observer),
    )
    .unwrap()
}

#[tokio::test]
async fn test_action_result_dropped_after_state_moved_on() {
    let (observer, mut rx) = channel_observer();
    let fsm = slow_action_machine(observer);

    fsm.send_event("X", Params::new()).await.unwrap();
    fsm.send_event("Y", Params::new()).await.unwrap();
    assert_eq!(fsm.current_state(), "C");
    assert_eq!(next_commit(&mut rx).await, ("A", "Y", "C"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fsm.pending_actions(), 0);
    assert_eq!(fsm.current_state(), "C");
    assert!(rx.try_recv().is_err());
    assert_eq!(fsm.history().len(), 1);
}

#[tokio::test]
async fn test_repeated_event_during_action_commits_once() {
    let (observer, mut rx) = channel_observer();
    let fsm = slow_action_machine(observer);

    fsm.send_event("X", Params::new()).await.unwrap();
    fsm.send_event("X", Params::new()).await.unwrap();
    assert_eq!(next_commit(&mut rx).await, ("A", "X", "B"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fsm.current_state(), "B");
    assert!(rx.try_recv().is_err());
    assert_eq!(fsm.history().len(), 1);
}
