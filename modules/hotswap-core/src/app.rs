//! The runtime facade.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use hotswap_store::{Action, ReducerFn, Store};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::composer;
use crate::config::{AppOptions, UnknownNamespacePolicy};
use crate::dispatch::ModelDispatch;
use crate::effects::{ModelTasks, Scheduler};
use crate::error::{Result, RuntimeError, StartError, ValidationError};
use crate::hooks::{ErrorSink, Hooks, SealedHooks};
use crate::model::Model;
use crate::registry::{RegisteredModel, Registry};
use crate::router::{cancel_type, prefix_type};
use crate::subscriptions::{self, SubscriptionContext, SubscriptionHandles};

/// Namespace of the runtime's own bookkeeping model.
pub const INTERNAL_NAMESPACE: &str = "@@hotswap";
const UPDATE: &str = "UPDATE";

/// A live-pluggable model runtime.
///
/// Models and hooks are collected while configuring. `start()` builds the
/// store and launches every model's effects and subscriptions; after that,
/// `model()` and `unmodel()` inject and remove models on the live store.
///
/// All registration goes through one lock, so `model`, `unmodel` and
/// `start` are serialised against each other and against recomposition.
pub struct App {
    options: AppOptions,
    phase: Mutex<Phase>,
}

enum Phase {
    Configuring { registry: Registry, hooks: Hooks },
    /// Only observable inside `start`, while the lock is held.
    Starting,
    Running(Running),
}

struct Running {
    registry: Registry,
    store: Store,
    hooks: Arc<SealedHooks>,
    scheduler: Scheduler,
    errors: ErrorSink,
    /// Keyed reducers injected after start, composed after the static ones.
    dynamic: Vec<(String, ReducerFn)>,
    tasks: HashMap<String, ModelTasks>,
    subscriptions: HashMap<String, SubscriptionHandles>,
}

impl App {
    pub fn new(options: AppOptions) -> Self {
        Self {
            options,
            phase: Mutex::new(Phase::Configuring {
                registry: Registry::default(),
                hooks: Hooks::default(),
            }),
        }
    }

    /// Merge hooks into the ones collected so far. Only allowed before
    /// `start()`.
    pub fn use_hooks(&self, hooks: Hooks) -> Result<()> {
        match &mut *self.lock_phase() {
            Phase::Configuring { hooks: collected, .. } => {
                collected.merge(hooks);
                Ok(())
            }
            _ => Err(StartError::HooksSealed.into()),
        }
    }

    /// Register a model. Once running, the model is injected live: the
    /// transition function is rebuilt and swapped, then its effects and
    /// subscriptions are launched.
    pub fn model(&self, model: Model) -> Result<()> {
        let mut phase = self.lock_phase();
        match &mut *phase {
            Phase::Configuring { registry, .. } => {
                let registered = registry.register(model)?;
                debug!(namespace = %registered.namespace, "Model registered");
                Ok(())
            }
            Phase::Running(running) => running.inject(&self.options, model),
            Phase::Starting => Err(StartError::NotStarted("model").into()),
        }
    }

    /// Remove a model: cancel its effects, drop its state slice, run its
    /// subscription cleanups.
    pub fn unmodel(&self, namespace: &str) -> Result<()> {
        let mut phase = self.lock_phase();
        let known = match &mut *phase {
            Phase::Configuring { registry, .. } => {
                namespace != INTERNAL_NAMESPACE && registry.remove(namespace).is_some()
            }
            Phase::Running(running) => {
                namespace != INTERNAL_NAMESPACE && running.registry.contains(namespace)
            }
            Phase::Starting => return Err(StartError::NotStarted("unmodel").into()),
        };

        if !known {
            return match self.options.config.unknown_namespace {
                UnknownNamespacePolicy::Fail => {
                    Err(ValidationError::UnknownNamespace(namespace.to_string()).into())
                }
                UnknownNamespacePolicy::Ignore => {
                    debug!(namespace, "Ignoring removal of unknown namespace");
                    Ok(())
                }
            };
        }

        match &mut *phase {
            Phase::Running(running) => running.remove(&self.options, namespace),
            _ => {
                debug!(namespace, "Model unregistered");
                Ok(())
            }
        }
    }

    /// Build the store and launch every registered model. One-shot; must be
    /// called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| StartError::NoRuntime)?;
        let mut phase = self.lock_phase();

        match &*phase {
            Phase::Configuring { registry, hooks } => {
                let statics = static_reducers(&self.options, &hooks.extra_reducers);
                check_conflicts(&statics, &registry.namespaces())?;
            }
            _ => return Err(StartError::AlreadyStarted.into()),
        }

        let Phase::Configuring { mut registry, hooks } =
            std::mem::replace(&mut *phase, Phase::Starting)
        else {
            return Err(StartError::AlreadyStarted.into());
        };

        registry.register_internal(internal_model());

        let (store_hooks, sealed) = hooks.seal();
        let sealed = Arc::new(sealed);
        let reducer = compose(&self.options, &sealed, &[], &registry);

        let mut builder = Store::builder(reducer);
        if let Some(initial) = &self.options.initial_state {
            builder = builder.initial_state(initial.clone());
        }
        let store = store_hooks.apply(builder).build();

        let errors = sealed.error_sink(store.clone());
        let scheduler = Scheduler::new(
            runtime,
            store.clone(),
            Arc::clone(&sealed),
            errors.clone(),
            self.options.config.warn_prefixed_dispatch,
        );

        let models: Vec<Arc<RegisteredModel>> = registry.models().to_vec();
        let mut running = Running {
            registry,
            store,
            hooks: sealed,
            scheduler,
            errors,
            dynamic: Vec::new(),
            tasks: HashMap::new(),
            subscriptions: HashMap::new(),
        };

        // All effects first, so subscriptions that dispatch during setup are
        // seen by every model's watchers.
        for model in &models {
            running.spawn_effects(model);
        }
        for model in &models {
            running.start_subscriptions(&self.options, model);
        }

        info!(models = models.len() - 1, "Runtime started");
        *phase = Phase::Running(running);
        Ok(())
    }

    /// The store handle. Available once running.
    pub fn store(&self) -> Result<Store> {
        match &*self.lock_phase() {
            Phase::Running(running) => Ok(running.store.clone()),
            _ => Err(StartError::NotStarted("store").into()),
        }
    }

    /// Dispatch on the store. The type is used as given; no prefixing.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        let store = self.store()?;
        store.dispatch(action)?;
        Ok(())
    }

    /// Add or replace a keyed reducer next to the models on the live store.
    pub fn inject_reducer(&self, key: impl Into<String>, reducer: ReducerFn) -> Result<()> {
        let key = key.into();
        match &mut *self.lock_phase() {
            Phase::Running(running) => {
                let candidate = [(key.clone(), Arc::clone(&reducer))];
                check_conflicts(&candidate, &running.registry.namespaces())?;
                running.dynamic.retain(|(k, _)| *k != key);
                running.dynamic.push((key.clone(), reducer));
                running.recompose(&self.options);
                debug!(key = %key, "Reducer injected");
                Ok(())
            }
            _ => Err(StartError::NotStarted("inject_reducer").into()),
        }
    }

    /// Remove a reducer added with `inject_reducer`. Returns false when no
    /// such key was injected.
    pub fn eject_reducer(&self, key: &str) -> Result<bool> {
        match &mut *self.lock_phase() {
            Phase::Running(running) => {
                let before = running.dynamic.len();
                running.dynamic.retain(|(k, _)| k != key);
                if running.dynamic.len() == before {
                    return Ok(false);
                }
                running.recompose(&self.options);
                debug!(key, "Reducer ejected");
                Ok(true)
            }
            _ => Err(StartError::NotStarted("eject_reducer").into()),
        }
    }

    /// Snapshot of the whole state.
    pub fn state(&self) -> Result<Value> {
        Ok(self.store()?.state())
    }

    /// Registered user namespaces in registration order.
    pub fn namespaces(&self) -> Vec<String> {
        let phase = self.lock_phase();
        let registry = match &*phase {
            Phase::Configuring { registry, .. } => registry,
            Phase::Running(running) => &running.registry,
            Phase::Starting => return Vec::new(),
        };
        registry
            .namespaces()
            .into_iter()
            .filter(|ns| ns != INTERNAL_NAMESPACE)
            .collect()
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.lock_phase(), Phase::Running(_))
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Running {
    fn inject(&mut self, options: &AppOptions, model: Model) -> Result<()> {
        let mut extras = static_reducers(options, &self.hooks.extra_reducers);
        extras.extend(self.dynamic.iter().cloned());
        check_conflicts(&extras, std::slice::from_ref(&model.namespace))?;

        let registered = self.registry.register(model)?;
        self.recompose(options);
        self.spawn_effects(&registered);
        self.start_subscriptions(options, &registered);

        info!(namespace = %registered.namespace, "Model injected");
        Ok(())
    }

    fn remove(&mut self, options: &AppOptions, namespace: &str) -> Result<()> {
        if let Some(tasks) = self.tasks.remove(namespace) {
            tasks.cancel();
        }
        // Teardown finishes even when middleware rejects these signals; the
        // first rejection is returned afterwards.
        let cancelled = self.store.dispatch(Action::new(cancel_type(namespace)));

        self.registry.remove(namespace);
        self.recompose(options);
        let updated = self
            .store
            .dispatch(Action::new(prefix_type(INTERNAL_NAMESPACE, UPDATE)));

        if let Some(handles) = self.subscriptions.remove(namespace) {
            subscriptions::stop(handles, &self.errors);
        }

        info!(namespace, "Model removed");
        cancelled.and(updated)?;
        Ok(())
    }

    fn recompose(&self, options: &AppOptions) {
        self.store
            .replace_reducer(compose(options, &self.hooks, &self.dynamic, &self.registry));
        debug!(models = self.registry.models().len(), "Reducers recomposed");
    }

    fn spawn_effects(&mut self, model: &RegisteredModel) {
        if model.effects.is_empty() {
            return;
        }
        let tasks = self.scheduler.spawn_model(model);
        self.tasks.insert(model.namespace.clone(), tasks);
    }

    fn start_subscriptions(&mut self, options: &AppOptions, model: &RegisteredModel) {
        if model.subscriptions.is_empty() {
            return;
        }
        let ctx = SubscriptionContext {
            dispatch: ModelDispatch::new(
                self.store.clone(),
                Arc::clone(&model.scope),
                options.config.warn_prefixed_dispatch,
            ),
            navigation: options.navigation.clone(),
            errors: self.errors.clone(),
        };
        let handles = subscriptions::start(model, &ctx);
        self.subscriptions.insert(model.namespace.clone(), handles);
    }
}

/// Static reducers from the options followed by the `extra_reducers` hooks;
/// a later key replaces an earlier one.
fn static_reducers(
    options: &AppOptions,
    extras: &[(String, ReducerFn)],
) -> Vec<(String, ReducerFn)> {
    composer::merge(options.reducers.iter().chain(extras.iter()))
}

fn check_conflicts(statics: &[(String, ReducerFn)], namespaces: &[String]) -> Result<()> {
    match composer::conflicts(statics.iter().map(|(key, _)| key.as_str()), namespaces) {
        Some(key) => Err(RuntimeError::Conflict { key }),
        None => Ok(()),
    }
}

/// Static reducers first, then injected ones, then one entry per model,
/// wrapped by `on_reducer`.
fn compose(
    options: &AppOptions,
    hooks: &SealedHooks,
    dynamic: &[(String, ReducerFn)],
    registry: &Registry,
) -> ReducerFn {
    let statics = static_reducers(options, &hooks.extra_reducers);
    let mut entries = composer::merge(statics.iter().chain(dynamic.iter()));
    entries.extend(
        registry
            .models()
            .iter()
            .map(|model| (model.namespace.clone(), Arc::clone(&model.reducer))),
    );
    hooks.wrap_reducer(composer::combine(entries))
}

/// Counts removals so listeners observe a state change after each one.
fn internal_model() -> Model {
    Model::new(INTERNAL_NAMESPACE)
        .state(json!(0))
        .reducer(UPDATE, |state, _| json!(state.as_i64().unwrap_or(0) + 1))
}
