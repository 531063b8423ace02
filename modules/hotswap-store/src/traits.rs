//! Function types the store is built from.
//!
//! Reducers, middlewares and listeners are plain closures behind `Arc`.
//! The `*_fn` helpers exist so closures get their signatures inferred
//! without annotating every reference argument.

use std::sync::Arc;

use serde_json::Value;

use crate::action::Action;
use crate::error::StoreResult;
use crate::store::Store;

/// Pure state updates. No I/O, no side effects.
///
/// `state` is `None` when the slice has never been initialised; the function
/// is expected to fall back to its own initial value.
pub type ReducerFn = Arc<dyn Fn(Option<Value>, &Action) -> Value + Send + Sync>;

/// Called with the new whole state after every reduction.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Dispatch middleware. Call `next.run(action)` to continue the chain, or
/// return without calling it to swallow the action.
pub type Middleware = Arc<dyn Fn(Action, &Next<'_>) -> StoreResult<()> + Send + Sync>;

pub fn reducer_fn<F>(f: F) -> ReducerFn
where
    F: Fn(Option<Value>, &Action) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn listener_fn<F>(f: F) -> Listener
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(Action, &Next<'_>) -> StoreResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The remainder of a middleware chain.
pub struct Next<'a> {
    pub(crate) chain: &'a [Middleware],
    pub(crate) store: &'a Store,
}

impl<'a> Next<'a> {
    /// Hand the action to the next middleware, or to the reducer when the
    /// chain is exhausted.
    pub fn run(&self, action: Action) -> StoreResult<()> {
        match self.chain.split_first() {
            Some((head, rest)) => head(
                action,
                &Next {
                    chain: rest,
                    store: self.store,
                },
            ),
            None => self.store.apply(action),
        }
    }

    /// The store this chain belongs to. Dispatching through it restarts the
    /// chain from the first middleware.
    pub fn store(&self) -> &Store {
        self.store
    }
}
