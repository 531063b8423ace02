//! Model-scoped dispatch.

use std::sync::Arc;

use hotswap_store::{Action, Store, StoreError, StoreResult};
use serde_json::Value;
use tracing::warn;

use crate::router::ModelScope;

/// Dispatch handle bound to one model. Short names that match the model's
/// own handlers are prefixed with its namespace before reaching the store.
#[derive(Clone)]
pub struct ModelDispatch {
    store: Store,
    scope: Arc<ModelScope>,
    warn_prefixed: bool,
}

impl ModelDispatch {
    pub(crate) fn new(store: Store, scope: Arc<ModelScope>, warn_prefixed: bool) -> Self {
        Self {
            store,
            scope,
            warn_prefixed,
        }
    }

    pub fn dispatch(&self, action: Action) -> StoreResult<()> {
        if action.kind.is_empty() {
            return Err(StoreError::MissingType);
        }
        if self.warn_prefixed && self.scope.is_own_prefixed(&action.kind) {
            warn!(
                namespace = %self.scope.namespace(),
                action = %action.kind,
                "dispatch: type should not be prefixed with its own namespace"
            );
        }
        let kind = self.scope.resolve(&action.kind).into_owned();
        self.store.dispatch(action.retyped(kind))
    }

    /// Shorthand for `dispatch(Action::new(kind).with_payload(payload))`.
    pub fn send(&self, kind: &str, payload: Value) -> StoreResult<()> {
        self.dispatch(Action::new(kind).with_payload(payload))
    }

    pub fn namespace(&self) -> &str {
        self.scope.namespace()
    }

    pub fn scope(&self) -> &ModelScope {
        &self.scope
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
