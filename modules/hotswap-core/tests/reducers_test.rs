//! Reducer shapes, enhancers, extra reducers and composition hooks.

use std::collections::BTreeMap;
use std::sync::Arc;

use hotswap_core::{
    reducer_fn, Action, App, AppOptions, Hooks, Model, Reducers, RuntimeError, StartError,
};
use hotswap_core::model::HandlerFn;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn add(state: Value, action: &Action) -> Value {
    json!(state.as_i64().unwrap_or(0) + action.payload.as_i64().unwrap_or(1))
}

fn started(app: &App) -> Value {
    app.start().unwrap();
    app.state().unwrap()
}

// =========================================================================
// Shapes
// =========================================================================

#[tokio::test]
async fn absent_reducers_keep_initial_state() {
    let app = App::new(AppOptions::default());
    app.model(Model::new("plain").state(json!({ "ready": false })))
        .unwrap();
    assert_eq!(started(&app)["plain"], json!({ "ready": false }));

    app.dispatch(Action::new("plain/anything")).unwrap();
    assert_eq!(app.state().unwrap()["plain"], json!({ "ready": false }));
}

#[tokio::test]
async fn map_reducers_handle_prefixed_types() {
    let mut handlers: BTreeMap<String, HandlerFn> = BTreeMap::new();
    handlers.insert("add".into(), Arc::new(add));

    let app = App::new(AppOptions::default());
    app.model(Model::new("count").state(json!(0)).reducers(Reducers::Map(handlers)))
        .unwrap();
    app.start().unwrap();

    app.dispatch(Action::new("count/add").with_payload(json!(2)))
        .unwrap();
    app.dispatch(Action::new("add")).unwrap();
    assert_eq!(app.state().unwrap()["count"], json!(2));
}

#[tokio::test]
async fn enhancer_wraps_model_reducer() {
    let app = App::new(AppOptions::default());
    app.model(
        Model::new("count")
            .state(json!(0))
            .reducer("add", add)
            .enhancer(|reducer| {
                reducer_fn(move |state, action| {
                    let next = reducer(state, action);
                    if action.kind == "square" {
                        json!(next.as_i64().unwrap_or(0).pow(2))
                    } else {
                        next
                    }
                })
            }),
    )
    .unwrap();
    app.start().unwrap();

    app.dispatch(Action::new("count/add").with_payload(json!(3)))
        .unwrap();
    app.dispatch(Action::new("square")).unwrap();
    app.dispatch(Action::new("count/add")).unwrap();
    assert_eq!(app.state().unwrap()["count"], json!(10));
}

#[test]
fn enhancer_before_handlers_keeps_both() {
    let model = Model::new("count")
        .enhancer(|reducer| reducer)
        .reducer("add", add);
    assert!(matches!(model.reducers, Some(Reducers::Enhanced(ref map, _)) if map.len() == 1));
}

// =========================================================================
// Extra reducers
// =========================================================================

#[tokio::test]
async fn static_and_extra_reducers_are_composed() {
    let app = App::new(
        AppOptions::builder()
            .reducers(vec![(
                "routing".to_string(),
                reducer_fn(|state, _| state.unwrap_or_else(|| json!("/"))),
            )])
            .build(),
    );
    app.use_hooks(Hooks::new().extra_reducer(
        "visits",
        reducer_fn(|state, action| {
            let n = state.and_then(|s| s.as_i64()).unwrap_or(0);
            if action.kind == "visit" {
                json!(n + 1)
            } else {
                json!(n)
            }
        }),
    ))
    .unwrap();
    app.model(Model::new("count").state(json!(0))).unwrap();

    let state = started(&app);
    assert_eq!(state["routing"], json!("/"));
    assert_eq!(state["visits"], json!(0));

    app.dispatch(Action::new("visit")).unwrap();
    assert_eq!(app.state().unwrap()["visits"], json!(1));
}

#[tokio::test]
async fn later_extra_reducer_with_same_key_wins() {
    let app = App::new(AppOptions::default());
    app.use_hooks(Hooks::new().extra_reducer("flag", reducer_fn(|_, _| json!("first"))))
        .unwrap();
    app.use_hooks(Hooks::new().extra_reducer("flag", reducer_fn(|_, _| json!("second"))))
        .unwrap();
    assert_eq!(started(&app)["flag"], json!("second"));
}

#[tokio::test]
async fn extra_reducer_conflicting_with_namespace_fails_start() {
    let app = App::new(AppOptions::default());
    app.use_hooks(Hooks::new().extra_reducer("count", reducer_fn(|_, _| json!(null))))
        .unwrap();
    app.model(Model::new("count")).unwrap();

    let err = app.start().unwrap_err();
    assert!(matches!(err, RuntimeError::Conflict { ref key } if key == "count"));
    assert!(err.to_string().contains("extraReducers conflict"));
    assert!(!app.is_running());
}

#[tokio::test]
async fn injected_model_conflicting_with_extra_reducer_fails() {
    let app = App::new(AppOptions::default());
    app.use_hooks(Hooks::new().extra_reducer("count", reducer_fn(|_, _| json!(null))))
        .unwrap();
    app.start().unwrap();

    assert!(matches!(
        app.model(Model::new("count")),
        Err(RuntimeError::Conflict { .. })
    ));
    assert!(app.namespaces().is_empty());
}

#[tokio::test]
async fn injected_reducers_join_and_leave_the_live_state() {
    let app = App::new(AppOptions::default());
    app.model(Model::new("count").state(json!(0)).reducer("add", add))
        .unwrap();
    assert!(app
        .inject_reducer("late", reducer_fn(|_, _| json!(null)))
        .is_err());
    app.start().unwrap();

    app.dispatch(Action::new("count/add")).unwrap();
    app.inject_reducer(
        "log",
        reducer_fn(|state, action| {
            let mut seen = state.and_then(|s| s.as_array().cloned()).unwrap_or_default();
            seen.push(json!(action.kind));
            Value::Array(seen)
        }),
    )
    .unwrap();
    app.dispatch(Action::new("count/add")).unwrap();

    let state = app.state().unwrap();
    assert_eq!(state["count"], json!(2));
    assert_eq!(state["log"], json!(["@@store/REPLACE", "count/add"]));

    assert!(matches!(
        app.inject_reducer("count", reducer_fn(|_, _| json!(null))),
        Err(RuntimeError::Conflict { .. })
    ));
    assert!(matches!(
        app.model(Model::new("log")),
        Err(RuntimeError::Conflict { .. })
    ));

    assert!(app.eject_reducer("log").unwrap());
    assert!(!app.eject_reducer("log").unwrap());
    assert!(app.state().unwrap().get("log").is_none());
}

// =========================================================================
// Hooks
// =========================================================================

#[tokio::test]
async fn on_reducer_wraps_the_whole_state_function() {
    let app = App::new(AppOptions::default());
    app.use_hooks(Hooks::new().on_reducer(|reducer| {
        reducer_fn(move |state, action| {
            let mut next = reducer(state, action);
            if let Some(map) = next.as_object_mut() {
                map.insert("present".into(), json!(true));
            }
            next
        })
    }))
    .unwrap();
    app.model(Model::new("count").state(json!(0)).reducer("add", add))
        .unwrap();
    app.start().unwrap();

    app.dispatch(Action::new("count/add")).unwrap();
    let state = app.state().unwrap();
    assert_eq!(state["count"], json!(1));
    assert_eq!(state["present"], json!(true));

    // Still applied after a live recomposition.
    app.model(Model::new("other")).unwrap();
    assert_eq!(app.state().unwrap()["present"], json!(true));
}

#[tokio::test]
async fn hooks_are_sealed_after_start() {
    let app = App::new(AppOptions::default());
    app.start().unwrap();
    assert!(matches!(
        app.use_hooks(Hooks::new()),
        Err(RuntimeError::Start(StartError::HooksSealed))
    ));
}
