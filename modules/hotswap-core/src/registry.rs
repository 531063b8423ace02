//! Model registry: validation, key prefixing, ordered storage.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hotswap_store::ReducerFn;
use serde_json::Value;
use tracing::warn;

use crate::composer;
use crate::error::ValidationError;
use crate::model::{EffectKind, Model, Reducers};
use crate::router::{prefix_type, ModelScope, CANCEL_EFFECTS, NAMESPACE_SEP};
use crate::traits::{Effect, Subscription};

const RESERVED_PREFIX: &str = "@@";

/// How a supervising watcher schedules invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discipline {
    Every,
    Latest,
    /// Runs the first matching action, then drops every match until the
    /// window has passed. Dropped actions are not kept for a trailing run
    /// after the window closes.
    Throttle(Duration),
    Watcher,
}

impl Discipline {
    pub fn kind(&self) -> EffectKind {
        match self {
            Discipline::Every => EffectKind::TakeEvery,
            Discipline::Latest => EffectKind::TakeLatest,
            Discipline::Throttle(_) => EffectKind::Throttle,
            Discipline::Watcher => EffectKind::Watcher,
        }
    }
}

pub(crate) struct PreparedEffect {
    /// Qualified key, `{ns}/{name}`.
    pub key: String,
    pub routine: Arc<dyn Effect>,
    pub discipline: Discipline,
}

/// A validated model with every key resolved to its qualified form.
pub(crate) struct RegisteredModel {
    pub namespace: String,
    pub scope: Arc<ModelScope>,
    /// Per-model transition function, built once here.
    pub reducer: ReducerFn,
    pub effects: Vec<PreparedEffect>,
    pub subscriptions: Vec<(String, Arc<dyn Subscription>)>,
}

/// Ordered collection of registered models.
#[derive(Default)]
pub(crate) struct Registry {
    models: Vec<Arc<RegisteredModel>>,
}

impl Registry {
    pub fn register(&mut self, model: Model) -> Result<Arc<RegisteredModel>, ValidationError> {
        validate(&model, self)?;
        Ok(self.insert(model))
    }

    /// Skips validation. Only for the runtime's own bookkeeping model, whose
    /// namespace is reserved and therefore cannot collide.
    pub fn register_internal(&mut self, model: Model) -> Arc<RegisteredModel> {
        self.insert(model)
    }

    pub fn remove(&mut self, namespace: &str) -> Option<Arc<RegisteredModel>> {
        let idx = self.models.iter().position(|m| m.namespace == namespace)?;
        Some(self.models.remove(idx))
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.models.iter().any(|m| m.namespace == namespace)
    }

    pub fn models(&self) -> &[Arc<RegisteredModel>] {
        &self.models
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.models.iter().map(|m| m.namespace.clone()).collect()
    }

    fn insert(&mut self, model: Model) -> Arc<RegisteredModel> {
        let registered = Arc::new(prepare(model));
        self.models.push(Arc::clone(&registered));
        registered
    }
}

fn validate(model: &Model, registry: &Registry) -> Result<(), ValidationError> {
    let namespace = model.namespace.as_str();
    if namespace.is_empty() {
        return Err(ValidationError::MissingNamespace);
    }
    if registry.contains(namespace) {
        return Err(ValidationError::DuplicateNamespace(namespace.to_string()));
    }
    if namespace.contains(NAMESPACE_SEP) {
        return Err(ValidationError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: "namespace must not contain the separator",
        });
    }
    if namespace.starts_with(RESERVED_PREFIX) {
        return Err(ValidationError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: "namespaces starting with @@ are reserved",
        });
    }

    if let Some(reducers) = &model.reducers {
        check_keys(namespace, "reducers", reducers.handlers().keys())?;
    }
    check_keys(namespace, "effects", model.effects.keys())?;
    check_keys(namespace, "subscriptions", model.subscriptions.keys())?;

    for (key, def) in &model.effects {
        if def.options.kind == EffectKind::Throttle && !def.options.ms.is_some_and(|ms| ms > 0) {
            return Err(ValidationError::ThrottleWithoutInterval {
                namespace: namespace.to_string(),
                key: key.clone(),
            });
        }
    }

    Ok(())
}

fn check_keys<'a>(
    namespace: &str,
    section: &'static str,
    keys: impl Iterator<Item = &'a String>,
) -> Result<(), ValidationError> {
    for key in keys {
        if key.is_empty() {
            return Err(ValidationError::EmptyKey {
                namespace: namespace.to_string(),
                section,
            });
        }
        if key == CANCEL_EFFECTS {
            return Err(ValidationError::ReservedKey {
                namespace: namespace.to_string(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}

/// `add` → `ns/add`. A key already carrying its own namespace is kept.
fn qualify(namespace: &str, key: &str) -> String {
    let own = prefix_type(namespace, "");
    if key.starts_with(&own) {
        warn!(namespace, key, "[app.model] key should not be prefixed with its own namespace");
        key.to_string()
    } else {
        prefix_type(namespace, key)
    }
}

fn prepare(model: Model) -> RegisteredModel {
    let Model {
        namespace,
        state,
        reducers,
        effects,
        subscriptions,
    } = model;

    let reducers = reducers.map(|reducers| match reducers {
        Reducers::Map(handlers) => Reducers::Map(qualify_map(&namespace, handlers)),
        Reducers::Enhanced(handlers, enhancer) => {
            Reducers::Enhanced(qualify_map(&namespace, handlers), enhancer)
        }
    });

    let effects: Vec<PreparedEffect> = effects
        .into_iter()
        .map(|(name, def)| PreparedEffect {
            key: qualify(&namespace, &name),
            routine: def.routine,
            discipline: match def.options.kind {
                EffectKind::TakeEvery => Discipline::Every,
                EffectKind::TakeLatest => Discipline::Latest,
                EffectKind::Throttle => {
                    Discipline::Throttle(Duration::from_millis(def.options.ms.unwrap_or_default()))
                }
                EffectKind::Watcher => Discipline::Watcher,
            },
        })
        .collect();

    let mut keys: Vec<String> = effects.iter().map(|e| e.key.clone()).collect();
    if let Some(reducers) = &reducers {
        keys.extend(reducers.handlers().keys().cloned());
    }
    let scope = Arc::new(ModelScope::new(namespace.clone(), keys));

    let reducer = composer::model_reducer(reducers, state.unwrap_or(Value::Null));

    RegisteredModel {
        namespace,
        scope,
        reducer,
        effects,
        subscriptions: subscriptions.into_iter().collect(),
    }
}

fn qualify_map<V>(namespace: &str, map: BTreeMap<String, V>) -> BTreeMap<String, V> {
    map.into_iter()
        .map(|(key, value)| (qualify(namespace, &key), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EffectOptions;
    use serde_json::json;

    fn fx_model() -> Model {
        Model::new("fx")
    }

    #[test]
    fn empty_namespace_is_rejected() {
        let mut registry = Registry::default();
        let err = registry.register(Model::default()).err().unwrap();
        assert!(matches!(err, ValidationError::MissingNamespace));
        assert!(err.to_string().contains("namespace should be defined"));
    }

    #[test]
    fn duplicate_namespace_is_rejected() {
        let mut registry = Registry::default();
        registry.register(Model::new("repeat")).unwrap();
        let err = registry.register(Model::new("repeat")).err().unwrap();
        assert!(matches!(err, ValidationError::DuplicateNamespace(ns) if ns == "repeat"));
    }

    #[test]
    fn reserved_and_separated_namespaces_are_rejected() {
        let mut registry = Registry::default();
        assert!(matches!(
            registry.register(Model::new("@@internal")),
            Err(ValidationError::InvalidNamespace { .. })
        ));
        assert!(matches!(
            registry.register(Model::new("a/b")),
            Err(ValidationError::InvalidNamespace { .. })
        ));
    }

    #[test]
    fn cancel_key_is_reserved() {
        let mut registry = Registry::default();
        let model = Model::new("m").reducer(CANCEL_EFFECTS, |state, _| state);
        assert!(matches!(
            registry.register(model),
            Err(ValidationError::ReservedKey { .. })
        ));
    }

    #[test]
    fn throttle_requires_positive_interval() {
        let mut registry = Registry::default();
        let missing = fx_model().effect_with(
            "tick",
            EffectOptions::new(EffectKind::Throttle),
            |_, _| async { Ok(()) },
        );
        assert!(matches!(
            registry.register(missing),
            Err(ValidationError::ThrottleWithoutInterval { .. })
        ));

        let zero = fx_model().effect_with("tick", EffectOptions::throttle(0), |_, _| async {
            Ok(())
        });
        assert!(registry.register(zero).is_err());

        let ok = fx_model().effect_with("tick", EffectOptions::throttle(100), |_, _| async {
            Ok(())
        });
        assert!(registry.register(ok).is_ok());
    }

    #[test]
    fn keys_are_qualified_once() {
        let mut registry = Registry::default();
        let model = Model::new("count")
            .state(json!(0))
            .reducer("add", |state, _| state)
            .reducer("count/sub", |state, _| state)
            .effect("load", |_, _| async { Ok(()) });
        let registered = registry.register(model).unwrap();

        assert_eq!(registered.scope.resolve("add"), "count/add");
        assert_eq!(registered.scope.resolve("sub"), "count/sub");
        assert_eq!(registered.scope.resolve("load"), "count/load");
        assert_eq!(registered.effects[0].key, "count/load");
        assert_eq!(registered.effects[0].discipline, Discipline::Every);
    }

    #[test]
    fn remove_keeps_order_of_the_rest() {
        let mut registry = Registry::default();
        for ns in ["a", "b", "c"] {
            registry.register(Model::new(ns)).unwrap();
        }
        assert!(registry.remove("b").is_some());
        assert!(registry.remove("b").is_none());
        assert_eq!(registry.namespaces(), vec!["a", "c"]);
    }
}
