//! Model definitions as applications write them.
//!
//! A [`Model`] is plain data plus closures. Keys are short names (`"add"`);
//! the registry prefixes them with the namespace when the model is
//! registered.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use hotswap_store::{Action, ReducerFn};
use serde::Deserialize;
use serde_json::Value;

use crate::context::EffectContext;
use crate::subscriptions::{SubscriptionContext, Unlisten};
use crate::traits::{Effect, Subscription};

/// Handles one action type for one model: `(state, action) -> state`.
pub type HandlerFn = Arc<dyn Fn(Value, &Action) -> Value + Send + Sync>;

/// Wraps the reducer built from a handler map.
pub type Enhancer = Arc<dyn Fn(ReducerFn) -> ReducerFn + Send + Sync>;

/// The three legal reducer shapes. Absent reducers are `None` on the model.
#[derive(Clone)]
pub enum Reducers {
    Map(BTreeMap<String, HandlerFn>),
    Enhanced(BTreeMap<String, HandlerFn>, Enhancer),
}

impl Reducers {
    pub fn handlers(&self) -> &BTreeMap<String, HandlerFn> {
        match self {
            Reducers::Map(handlers) | Reducers::Enhanced(handlers, _) => handlers,
        }
    }

    fn handlers_mut(&mut self) -> &mut BTreeMap<String, HandlerFn> {
        match self {
            Reducers::Map(handlers) | Reducers::Enhanced(handlers, _) => handlers,
        }
    }
}

/// Scheduling discipline of a managed effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    #[default]
    TakeEvery,
    TakeLatest,
    /// Matches inside the quiet window are dropped, not deferred.
    Throttle,
    Watcher,
}

/// `{ type, ms? }`. `ms` is required for [`EffectKind::Throttle`] and
/// ignored otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EffectOptions {
    #[serde(rename = "type", default)]
    pub kind: EffectKind,
    #[serde(default)]
    pub ms: Option<u64>,
}

impl EffectOptions {
    pub fn new(kind: EffectKind) -> Self {
        Self { kind, ms: None }
    }

    pub fn take_every() -> Self {
        Self::new(EffectKind::TakeEvery)
    }

    pub fn take_latest() -> Self {
        Self::new(EffectKind::TakeLatest)
    }

    pub fn throttle(ms: u64) -> Self {
        Self {
            kind: EffectKind::Throttle,
            ms: Some(ms),
        }
    }

    pub fn watcher() -> Self {
        Self::new(EffectKind::Watcher)
    }

    pub fn with_ms(mut self, ms: u64) -> Self {
        self.ms = Some(ms);
        self
    }
}

#[derive(Clone)]
pub struct EffectDef {
    pub routine: Arc<dyn Effect>,
    pub options: EffectOptions,
}

/// A unit of state ownership.
#[derive(Clone, Default)]
pub struct Model {
    pub namespace: String,
    pub state: Option<Value>,
    pub reducers: Option<Reducers>,
    pub effects: BTreeMap<String, EffectDef>,
    pub subscriptions: BTreeMap<String, Arc<dyn Subscription>>,
}

impl Model {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the whole reducer definition.
    pub fn reducers(mut self, reducers: Reducers) -> Self {
        self.reducers = Some(reducers);
        self
    }

    /// Add one handler, keeping an enhancer if one is set.
    pub fn reducer<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, &Action) -> Value + Send + Sync + 'static,
    {
        self.reducers
            .get_or_insert_with(|| Reducers::Map(BTreeMap::new()))
            .handlers_mut()
            .insert(name.into(), Arc::new(handler));
        self
    }

    /// Switch to the `(map, enhancer)` shape.
    pub fn enhancer<F>(mut self, enhancer: F) -> Self
    where
        F: Fn(ReducerFn) -> ReducerFn + Send + Sync + 'static,
    {
        let handlers = match self.reducers.take() {
            Some(Reducers::Map(handlers)) | Some(Reducers::Enhanced(handlers, _)) => handlers,
            None => BTreeMap::new(),
        };
        self.reducers = Some(Reducers::Enhanced(handlers, Arc::new(enhancer)));
        self
    }

    /// Add a `takeEvery` effect.
    pub fn effect<F, Fut>(self, name: impl Into<String>, routine: F) -> Self
    where
        F: Fn(Action, EffectContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.effect_with(name, EffectOptions::default(), routine)
    }

    pub fn effect_with<F, Fut>(self, name: impl Into<String>, options: EffectOptions, routine: F) -> Self
    where
        F: Fn(Action, EffectContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.effect_impl(name, options, Arc::new(routine))
    }

    /// Add an effect implemented as a trait object.
    pub fn effect_impl(
        mut self,
        name: impl Into<String>,
        options: EffectOptions,
        routine: Arc<dyn Effect>,
    ) -> Self {
        self.effects
            .insert(name.into(), EffectDef { routine, options });
        self
    }

    pub fn subscription<F>(mut self, name: impl Into<String>, setup: F) -> Self
    where
        F: Fn(SubscriptionContext) -> Option<Unlisten> + Send + Sync + 'static,
    {
        self.subscriptions.insert(name.into(), Arc::new(setup));
        self
    }
}
