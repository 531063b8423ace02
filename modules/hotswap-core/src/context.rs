//! Capabilities handed to every effect invocation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hotswap_store::{Action, StoreResult};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::ModelDispatch;
use crate::error::ReportedError;
use crate::hooks::ErrorSink;

/// What an effect can do: read state, put actions, wait for actions, sleep,
/// fork child work. Every waiting operation gives up when the owning model
/// is cancelled.
///
/// Clones share one action cursor, so two clones calling `take` compete for
/// the same stream.
#[derive(Clone)]
pub struct EffectContext {
    dispatch: ModelDispatch,
    key: Arc<str>,
    token: CancellationToken,
    actions: Arc<Mutex<mpsc::UnboundedReceiver<Action>>>,
    errors: ErrorSink,
}

impl EffectContext {
    /// The action receiver must be created by the caller, synchronously,
    /// so nothing dispatched after the invocation was scheduled is missed.
    pub(crate) fn new(
        dispatch: ModelDispatch,
        key: Arc<str>,
        token: CancellationToken,
        actions: mpsc::UnboundedReceiver<Action>,
        errors: ErrorSink,
    ) -> Self {
        Self {
            dispatch,
            key,
            token,
            actions: Arc::new(Mutex::new(actions)),
            errors,
        }
    }

    /// Dispatch from inside the model. Own short names are prefixed.
    pub fn put(&self, action: Action) -> StoreResult<()> {
        self.dispatch.dispatch(action)
    }

    pub fn dispatch(&self) -> &ModelDispatch {
        &self.dispatch
    }

    /// Snapshot of the whole state.
    pub fn state(&self) -> Value {
        self.dispatch.store().state()
    }

    pub fn select<T>(&self, f: impl FnOnce(&Value) -> T) -> T {
        f(&self.state())
    }

    /// This model's slice of the state, `Null` when absent.
    pub fn own_state(&self) -> Value {
        self.select(|state| {
            state
                .get(self.dispatch.namespace())
                .cloned()
                .unwrap_or(Value::Null)
        })
    }

    /// Wait for the next action matching `pattern` (resolved like `put`).
    /// Returns `None` once the model is cancelled.
    pub async fn take(&self, pattern: &str) -> Option<Action> {
        let wanted = self.dispatch.scope().resolve(pattern).into_owned();
        let mut actions = self.actions.lock().await;
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                received = actions.recv() => match received {
                    Some(action) if action.kind == wanted => return Some(action),
                    Some(_) => continue,
                    None => return None,
                },
            }
        }
    }

    /// Sleep, waking early on cancellation. Returns false if cancelled.
    pub async fn delay(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Spawn child work that is cancelled together with the model. Errors are
    /// reported like the effect's own.
    pub fn fork<F>(&self, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.token.child_token();
        let errors = self.errors.clone();
        let namespace = self.namespace().to_string();
        let key = self.key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                result = work => {
                    if let Err(source) = result {
                        errors.report(ReportedError::Effect { namespace, key, source });
                    }
                }
            }
        })
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn namespace(&self) -> &str {
        self.dispatch.namespace()
    }

    /// Qualified key of the running effect.
    pub fn key(&self) -> &str {
        &self.key
    }
}
