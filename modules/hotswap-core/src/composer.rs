//! Reducer composition.
//!
//! Each model's handler map becomes one transition function at registration.
//! On every model add/remove, all per-model functions plus the static and
//! dynamic extras are combined into the single whole-state function the
//! store applies.

use std::collections::BTreeMap;
use std::sync::Arc;

use hotswap_store::{reducer_fn, ReducerFn};
use serde_json::{Map, Value};

use crate::model::{HandlerFn, Reducers};

/// Build the transition function for one model.
///
/// Unknown action types return the state unchanged; an undefined state
/// becomes `initial`.
pub fn model_reducer(reducers: Option<Reducers>, initial: Value) -> ReducerFn {
    match reducers {
        Some(Reducers::Enhanced(handlers, enhancer)) => enhancer(from_handlers(handlers, initial)),
        Some(Reducers::Map(handlers)) => from_handlers(handlers, initial),
        None => from_handlers(BTreeMap::new(), initial),
    }
}

fn from_handlers(handlers: BTreeMap<String, HandlerFn>, initial: Value) -> ReducerFn {
    let handlers = Arc::new(handlers);
    reducer_fn(move |state, action| {
        let state = state.unwrap_or_else(|| initial.clone());
        match handlers.get(&action.kind) {
            Some(handler) => handler(state, action),
            None => state,
        }
    })
}

/// Merge keyed reducers, later entries replacing earlier ones with the same
/// key while keeping the first position.
pub fn merge<'a, I>(layers: I) -> Vec<(String, ReducerFn)>
where
    I: IntoIterator<Item = &'a (String, ReducerFn)>,
{
    let mut merged: Vec<(String, ReducerFn)> = Vec::new();
    for (key, reducer) in layers {
        match merged.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = Arc::clone(reducer),
            None => merged.push((key.clone(), Arc::clone(reducer))),
        }
    }
    merged
}

/// Combine keyed reducers into one whole-state function. The whole state is
/// an object with exactly one key per entry; anything else is dropped.
pub fn combine(entries: Vec<(String, ReducerFn)>) -> ReducerFn {
    let entries = Arc::new(entries);
    reducer_fn(move |state, action| {
        let mut previous = match state {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let mut next = Map::new();
        for (key, reducer) in entries.iter() {
            next.insert(key.clone(), reducer(previous.remove(key), action));
        }
        Value::Object(next)
    })
}

/// Keys present in both `extras` and `namespaces`.
pub fn conflicts<'a>(
    extras: impl IntoIterator<Item = &'a str>,
    namespaces: &[String],
) -> Option<String> {
    extras
        .into_iter()
        .find(|key| namespaces.iter().any(|ns| ns == key))
        .map(str::to_string)
}
