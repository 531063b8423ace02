//! A live-pluggable model runtime on top of `hotswap-store`.
//!
//! Applications are built from [`Model`]s: a namespace, an initial state
//! slice, pure reducers, effect routines and subscriptions. The [`App`]
//! composes every model's reducers into the store's transition function and
//! runs effects as supervised tokio tasks. Models can be injected and removed
//! while the store is live; removal cancels the model's effects and runs its
//! subscription cleanups.

pub mod app;
pub mod composer;
pub mod config;
pub mod context;
pub mod dispatch;
mod effects;
pub mod error;
pub mod hooks;
pub mod model;
mod registry;
pub mod router;
pub mod subscriptions;
pub mod traits;

pub use app::{App, INTERNAL_NAMESPACE};
pub use config::{load_config, parse_config, AppOptions, Navigation, RuntimeConfig, UnknownNamespacePolicy};
pub use context::EffectContext;
pub use dispatch::ModelDispatch;
pub use error::{ReportedError, Result, RuntimeError, StartError, ValidationError};
pub use hooks::{EffectSite, ErrorSink, Hooks};
pub use model::{EffectKind, EffectOptions, Model, Reducers};
pub use subscriptions::{SubscriptionContext, Unlisten};
pub use traits::{Effect, Subscription};

pub use hotswap_store::{
    listener_fn, middleware_fn, reducer_fn, Action, Listener, Middleware, Next, ReducerFn, Store,
    StoreBuilder, StoreError,
};
