//! Store dispatch, middleware and reducer replacement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hotswap_store::{
    listener_fn, middleware_fn, reducer_fn, Action, ReducerFn, Store, StoreError,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Counter reducer: `inc` adds the payload (default 1), everything else is a no-op.
fn counter() -> ReducerFn {
    reducer_fn(|state, action| {
        let current = state.and_then(|s| s.as_i64()).unwrap_or(0);
        match action.kind.as_str() {
            "inc" => json!(current + action.payload.as_i64().unwrap_or(1)),
            _ => json!(current),
        }
    })
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn build_applies_init_to_initial_state() {
    let store = Store::builder(counter()).initial_state(json!(5)).build();
    assert_eq!(store.state(), json!(5));

    let store = Store::builder(counter()).build();
    assert_eq!(store.state(), json!(0));
}

#[test]
fn dispatch_reduces_and_notifies_listeners() {
    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    let sink = seen.clone();
    let store = Store::builder(counter())
        .listener(listener_fn(move |s| sink.lock().unwrap().push(s.clone())))
        .build();

    store.dispatch(Action::new("inc")).unwrap();
    store
        .dispatch(Action::new("inc").with_payload(json!(10)))
        .unwrap();

    assert_eq!(store.state(), json!(11));
    assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(11)]);
}

#[test]
fn empty_type_is_rejected() {
    let store = Store::builder(counter()).build();
    let err = store.dispatch(Action::new("")).unwrap_err();
    assert!(matches!(err, StoreError::MissingType));
    assert_eq!(store.state(), json!(0));
}

#[test]
fn middleware_runs_in_order_and_can_swallow() {
    let order = Arc::new(Mutex::new(Vec::<String>::new()));
    let first = order.clone();
    let second = order.clone();

    let store = Store::builder(counter())
        .middleware(middleware_fn(move |action, next| {
            first.lock().unwrap().push(format!("first:{}", action.kind));
            next.run(action)
        }))
        .middleware(middleware_fn(move |action, next| {
            second.lock().unwrap().push(format!("second:{}", action.kind));
            if action.kind == "blocked" {
                return Ok(());
            }
            next.run(action)
        }))
        .build();

    store.dispatch(Action::new("inc")).unwrap();
    store.dispatch(Action::new("blocked")).unwrap();

    assert_eq!(store.state(), json!(1));
    assert_eq!(
        *order.lock().unwrap(),
        vec!["first:inc", "second:inc", "first:blocked", "second:blocked"]
    );
}

#[test]
fn middleware_can_read_state_through_next() {
    let observed = Arc::new(Mutex::new(None));
    let sink = observed.clone();
    let store = Store::builder(counter())
        .initial_state(json!(3))
        .middleware(middleware_fn(move |action, next| {
            *sink.lock().unwrap() = Some(next.store().state());
            next.run(action)
        }))
        .build();

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(json!(3)));
}

#[test]
fn replace_reducer_applies_new_function_immediately() {
    let store = Store::builder(counter()).initial_state(json!(2)).build();

    store.replace_reducer(reducer_fn(|state, _action| {
        let n = state.and_then(|s| s.as_i64()).unwrap_or(0);
        json!({ "wrapped": n })
    }));

    assert_eq!(store.state(), json!({ "wrapped": 2 }));
}

#[test]
fn reducer_may_not_dispatch() {
    let slot: Arc<Mutex<Option<Store>>> = Arc::new(Mutex::new(None));
    let result = Arc::new(Mutex::new(None));

    let inner_slot = slot.clone();
    let inner_result = result.clone();
    let store = Store::builder(reducer_fn(move |state, action| {
        if action.kind == "nested" {
            if let Some(store) = inner_slot.lock().unwrap().as_ref() {
                *inner_result.lock().unwrap() = Some(store.dispatch(Action::new("inner")));
            }
        }
        state.unwrap_or(Value::Null)
    }))
    .build();
    *slot.lock().unwrap() = Some(store.clone());

    store.dispatch(Action::new("nested")).unwrap();

    let nested = result.lock().unwrap().take().unwrap();
    assert!(matches!(nested, Err(StoreError::ReducerBusy { .. })));
}

#[test]
fn unsubscribe_stops_notifications() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter_calls = calls.clone();
    let store = Store::builder(counter()).build();
    let id = store.subscribe(listener_fn(move |_| {
        counter_calls.fetch_add(1, Ordering::SeqCst);
    }));

    store.dispatch(Action::new("inc")).unwrap();
    assert!(store.unsubscribe(id));
    store.dispatch(Action::new("inc")).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!store.unsubscribe(id));
}

#[tokio::test]
async fn actions_reach_watchers_after_reduction() {
    let store = Store::builder(counter()).build();
    let mut rx = store.subscribe_actions();

    store
        .dispatch(Action::new("inc").with_payload(json!(2)))
        .unwrap();

    let action = rx.recv().await.unwrap();
    assert_eq!(action.kind, "inc");
    assert_eq!(action.payload, json!(2));
    assert_eq!(store.state(), json!(2));
}

#[test]
fn enhancer_extends_the_builder() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let store = Store::builder(counter())
        .enhance(move |builder| {
            builder.listener(listener_fn(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
        })
        .build();

    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn watchers_keep_every_action_of_a_burst() {
    let store = Store::builder(counter()).build();
    let mut rx = store.subscribe_actions();

    for _ in 0..5000 {
        store.dispatch(Action::new("inc")).unwrap();
    }
    drop(rx.recv().await.unwrap());

    let mut received = 1;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 5000);
    assert_eq!(store.state(), json!(5000));
}

#[test]
fn dropped_watchers_are_pruned() {
    let store = Store::builder(counter()).build();
    let rx = store.subscribe_actions();
    drop(rx);
    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(store.state(), json!(1));
}

#[test]
fn panicking_reducer_keeps_committed_state() {
    let store = Store::builder(reducer_fn(|state, action| {
        let current = state.and_then(|s| s.as_i64()).unwrap_or(0);
        match action.kind.as_str() {
            "inc" => json!(current + 1),
            "boom" => panic!("handler failed"),
            _ => json!(current),
        }
    }))
    .build();

    for _ in 0..5 {
        store.dispatch(Action::new("inc")).unwrap();
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        store.dispatch(Action::new("boom"))
    }));
    assert!(outcome.is_err());
    assert_eq!(store.state(), json!(5));

    // The store is usable afterwards, and not stuck in the reducer guard.
    store.dispatch(Action::new("inc")).unwrap();
    assert_eq!(store.state(), json!(6));
}
