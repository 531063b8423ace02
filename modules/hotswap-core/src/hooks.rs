//! Cross-cutting extension points.
//!
//! `Hooks` is collected before `start()` (several values may be merged) and
//! then split: enhancers, middleware and state listeners go into the store,
//! the rest is sealed behind an `Arc` for the lifetime of the runtime.

use std::sync::Arc;

use hotswap_store::{Listener, Middleware, ReducerFn, Store, StoreBuilder};
use tracing::error;

use crate::error::ReportedError;
use crate::model::EffectKind;
use crate::traits::Effect;

pub type ErrorHandler = Arc<dyn Fn(&ReportedError, &Store) + Send + Sync>;
pub type StoreEnhancer = Box<dyn FnOnce(StoreBuilder) -> StoreBuilder + Send>;
pub type ReducerWrapper = Arc<dyn Fn(ReducerFn) -> ReducerFn + Send + Sync>;
pub type EffectWrapper = Arc<dyn Fn(Arc<dyn Effect>, &EffectSite<'_>) -> Arc<dyn Effect> + Send + Sync>;

/// Where an effect wrapper is being applied.
#[derive(Debug, Clone, Copy)]
pub struct EffectSite<'a> {
    pub namespace: &'a str,
    /// Qualified key, `{ns}/{name}`.
    pub key: &'a str,
    pub kind: EffectKind,
}

#[derive(Default)]
pub struct Hooks {
    pub(crate) on_error: Vec<ErrorHandler>,
    pub(crate) extra_reducers: Vec<(String, ReducerFn)>,
    pub(crate) extra_enhancers: Vec<StoreEnhancer>,
    pub(crate) on_action: Vec<Middleware>,
    pub(crate) on_reducer: Vec<ReducerWrapper>,
    pub(crate) on_state_change: Vec<Listener>,
    pub(crate) on_effect: Vec<EffectWrapper>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ReportedError, &Store) + Send + Sync + 'static,
    {
        self.on_error.push(Arc::new(handler));
        self
    }

    pub fn extra_reducer(mut self, key: impl Into<String>, reducer: ReducerFn) -> Self {
        self.extra_reducers.push((key.into(), reducer));
        self
    }

    pub fn extra_enhancer<F>(mut self, enhancer: F) -> Self
    where
        F: FnOnce(StoreBuilder) -> StoreBuilder + Send + 'static,
    {
        self.extra_enhancers.push(Box::new(enhancer));
        self
    }

    pub fn on_action(mut self, middleware: Middleware) -> Self {
        self.on_action.push(middleware);
        self
    }

    pub fn on_reducer<F>(mut self, wrapper: F) -> Self
    where
        F: Fn(ReducerFn) -> ReducerFn + Send + Sync + 'static,
    {
        self.on_reducer.push(Arc::new(wrapper));
        self
    }

    pub fn on_state_change(mut self, listener: Listener) -> Self {
        self.on_state_change.push(listener);
        self
    }

    pub fn on_effect<F>(mut self, wrapper: F) -> Self
    where
        F: Fn(Arc<dyn Effect>, &EffectSite<'_>) -> Arc<dyn Effect> + Send + Sync + 'static,
    {
        self.on_effect.push(Arc::new(wrapper));
        self
    }

    /// Append `other`'s hooks after ours. An extra reducer key given twice
    /// keeps the later reducer.
    pub fn merge(&mut self, other: Hooks) {
        self.on_error.extend(other.on_error);
        for (key, reducer) in other.extra_reducers {
            self.extra_reducers.retain(|(k, _)| *k != key);
            self.extra_reducers.push((key, reducer));
        }
        self.extra_enhancers.extend(other.extra_enhancers);
        self.on_action.extend(other.on_action);
        self.on_reducer.extend(other.on_reducer);
        self.on_state_change.extend(other.on_state_change);
        self.on_effect.extend(other.on_effect);
    }

    /// Split into the store-level hooks and the part kept for the lifetime
    /// of the runtime.
    pub(crate) fn seal(self) -> (StoreHooks, SealedHooks) {
        let store = StoreHooks {
            on_action: self.on_action,
            on_state_change: self.on_state_change,
            extra_enhancers: self.extra_enhancers,
        };
        let sealed = SealedHooks {
            on_error: self.on_error.into(),
            extra_reducers: self.extra_reducers,
            on_reducer: self.on_reducer,
            on_effect: self.on_effect,
        };
        (store, sealed)
    }
}

/// Hooks consumed while the store is being built.
pub(crate) struct StoreHooks {
    on_action: Vec<Middleware>,
    on_state_change: Vec<Listener>,
    extra_enhancers: Vec<StoreEnhancer>,
}

impl StoreHooks {
    pub fn apply(self, mut builder: StoreBuilder) -> StoreBuilder {
        for middleware in self.on_action {
            builder = builder.middleware(middleware);
        }
        for listener in self.on_state_change {
            builder = builder.listener(listener);
        }
        for enhancer in self.extra_enhancers {
            builder = builder.enhance(enhancer);
        }
        builder
    }
}

/// The read-only half of [`Hooks`] once the runtime is running.
pub(crate) struct SealedHooks {
    pub on_error: Arc<[ErrorHandler]>,
    pub extra_reducers: Vec<(String, ReducerFn)>,
    pub on_reducer: Vec<ReducerWrapper>,
    pub on_effect: Vec<EffectWrapper>,
}

impl SealedHooks {
    pub fn wrap_reducer(&self, reducer: ReducerFn) -> ReducerFn {
        self.on_reducer
            .iter()
            .fold(reducer, |reducer, wrap| wrap(reducer))
    }

    pub fn wrap_effect(&self, effect: Arc<dyn Effect>, site: &EffectSite<'_>) -> Arc<dyn Effect> {
        self.on_effect
            .iter()
            .fold(effect, |effect, wrap| wrap(effect, site))
    }

    pub fn error_sink(&self, store: Store) -> ErrorSink {
        ErrorSink {
            handlers: Arc::clone(&self.on_error),
            store,
        }
    }
}

/// Single funnel for errors raised by scheduled work.
#[derive(Clone)]
pub struct ErrorSink {
    handlers: Arc<[ErrorHandler]>,
    store: Store,
}

impl ErrorSink {
    pub fn report(&self, err: ReportedError) {
        if self.handlers.is_empty() {
            error!(namespace = %err.namespace(), error = %err, "Unhandled runtime error");
            return;
        }
        for handler in self.handlers.iter() {
            handler(&err, &self.store);
        }
    }
}
