//! Effect scheduling.
//!
//! Every effect of a model gets one supervising task. Managed disciplines
//! (`takeEvery`, `takeLatest`, `throttle`) read their own action queue and
//! spawn invocations; `watcher` effects run once and loop on their own.
//!
//! All tasks of a model hang off one `CancellationToken`. It fires when the
//! model is removed or when `{ns}/@@CANCEL_EFFECTS` is dispatched, and every
//! task observes it at its next await point.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use hotswap_store::{Action, Store};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::EffectContext;
use crate::dispatch::ModelDispatch;
use crate::error::{panic_message, ReportedError};
use crate::hooks::{EffectSite, ErrorSink, SealedHooks};
use crate::registry::{Discipline, PreparedEffect, RegisteredModel};
use crate::router::ModelScope;
use crate::traits::Effect;

/// Running tasks of one model.
pub(crate) struct ModelTasks {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ModelTasks {
    /// Cancel every supervisor and invocation of the model. Takes effect at
    /// each task's next suspension point.
    pub fn cancel(self) {
        self.token.cancel();
        drop(self.handles);
    }
}

pub(crate) struct Scheduler {
    runtime: Handle,
    store: Store,
    hooks: Arc<SealedHooks>,
    errors: ErrorSink,
    warn_prefixed: bool,
}

impl Scheduler {
    pub fn new(
        runtime: Handle,
        store: Store,
        hooks: Arc<SealedHooks>,
        errors: ErrorSink,
        warn_prefixed: bool,
    ) -> Self {
        Self {
            runtime,
            store,
            hooks,
            errors,
            warn_prefixed,
        }
    }

    /// Fork one supervisor per effect plus the model's cancel listener.
    /// Every action receiver is created before this returns, so actions
    /// dispatched right after are seen.
    pub fn spawn_model(&self, model: &RegisteredModel) -> ModelTasks {
        let token = CancellationToken::new();
        let mut handles = Vec::with_capacity(model.effects.len() + 1);

        handles.push(self.runtime.spawn(listen_for_cancel(
            Arc::clone(&model.scope),
            token.clone(),
            self.store.subscribe_actions(),
        )));

        for effect in &model.effects {
            handles.push(self.spawn_effect(model, effect, &token));
        }

        debug!(
            namespace = %model.namespace,
            effects = model.effects.len(),
            "Effect watchers started"
        );

        ModelTasks { token, handles }
    }

    fn spawn_effect(
        &self,
        model: &RegisteredModel,
        effect: &PreparedEffect,
        token: &CancellationToken,
    ) -> JoinHandle<()> {
        let invoker = Invoker {
            dispatch: ModelDispatch::new(
                self.store.clone(),
                Arc::clone(&model.scope),
                self.warn_prefixed,
            ),
            key: Arc::from(effect.key.as_str()),
            routine: Arc::clone(&effect.routine),
            errors: self.errors.clone(),
        };

        if effect.discipline == Discipline::Watcher {
            let start = Action::new(effect.key.clone());
            let invocation = invoker.invoke(start, token.clone());
            return self.runtime.spawn(invocation);
        }

        let site = EffectSite {
            namespace: &model.namespace,
            key: &effect.key,
            kind: effect.discipline.kind(),
        };
        let invoker = Invoker {
            routine: self.hooks.wrap_effect(invoker.routine.clone(), &site),
            ..invoker
        };

        self.runtime.spawn(supervise(
            invoker,
            effect.discipline,
            model.scope.cancel_type(),
            token.clone(),
            self.store.subscribe_actions(),
        ))
    }
}

/// Everything needed to start one invocation of an effect.
struct Invoker {
    dispatch: ModelDispatch,
    key: Arc<str>,
    routine: Arc<dyn Effect>,
    errors: ErrorSink,
}

impl Invoker {
    /// Build the invocation future. Called synchronously so the context's
    /// action receiver exists before any later dispatch.
    fn invoke(&self, action: Action, token: CancellationToken) -> impl Future<Output = ()> + Send + 'static {
        let ctx = EffectContext::new(
            self.dispatch.clone(),
            Arc::clone(&self.key),
            token.clone(),
            self.dispatch.store().subscribe_actions(),
            self.errors.clone(),
        );
        let routine = Arc::clone(&self.routine);
        let errors = self.errors.clone();
        let namespace = self.dispatch.namespace().to_string();
        let key = self.key.to_string();

        async move {
            let run = AssertUnwindSafe(routine.run(action, ctx)).catch_unwind();
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(namespace = %namespace, effect = %key, "Effect invocation cancelled");
                }
                outcome = run => match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => errors.report(ReportedError::Effect { namespace, key, source }),
                    Err(panic) => errors.report(ReportedError::EffectPanic {
                        namespace,
                        key,
                        message: panic_message(panic.as_ref()),
                    }),
                },
            }
        }
    }
}

/// Cancels the model's token when its cancel signal is dispatched.
async fn listen_for_cancel(
    scope: Arc<ModelScope>,
    token: CancellationToken,
    mut actions: mpsc::UnboundedReceiver<Action>,
) {
    let cancel_type = scope.cancel_type();
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = actions.recv() => match received {
                Some(action) if action.kind == cancel_type => {
                    token.cancel();
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }
    debug!(namespace = %scope.namespace(), "Effects cancelled");
}

/// Supervising watcher for one managed effect.
async fn supervise(
    invoker: Invoker,
    discipline: Discipline,
    cancel_type: String,
    token: CancellationToken,
    mut actions: mpsc::UnboundedReceiver<Action>,
) {
    let mut running = JoinSet::new();
    let mut latest: Option<CancellationToken> = None;
    let mut quiet_until: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(_) = running.join_next(), if !running.is_empty() => {}
            received = actions.recv() => {
                let Some(action) = received else { break };
                if action.kind == cancel_type {
                    token.cancel();
                    break;
                }
                if action.kind != *invoker.key {
                    continue;
                }

                let invocation_token = match discipline {
                    Discipline::Latest => {
                        if let Some(previous) = latest.take() {
                            previous.cancel();
                        }
                        let child = token.child_token();
                        latest = Some(child.clone());
                        child
                    }
                    Discipline::Throttle(window) => {
                        let now = Instant::now();
                        if quiet_until.is_some_and(|until| now < until) {
                            continue;
                        }
                        quiet_until = Some(now + window);
                        token.child_token()
                    }
                    Discipline::Every | Discipline::Watcher => token.child_token(),
                };

                running.spawn(invoker.invoke(action, invocation_token));
            }
        }
    }

    running.abort_all();
    debug!(effect = %invoker.key, "Effect watcher stopped");
}

