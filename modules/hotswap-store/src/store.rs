//! The store and its builder.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::action::Action;
use crate::error::{StoreError, StoreResult};
use crate::traits::{Listener, Middleware, Next, ReducerFn};

/// Applied once when the store is built.
pub const INIT: &str = "@@store/INIT";
/// Applied under the state lock whenever the transition function is swapped.
pub const REPLACE: &str = "@@store/REPLACE";

thread_local! {
    static REDUCING: Cell<bool> = const { Cell::new(false) };
}

/// Handle returned by [`Store::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Core {
    state: Option<Value>,
    reducer: ReducerFn,
    watchers: Vec<mpsc::UnboundedSender<Action>>,
}

impl Core {
    /// Hand the action to every live watcher, dropping the closed ones.
    fn fan_out(&mut self, action: &Action) {
        self.watchers.retain(|tx| tx.send(action.clone()).is_ok());
    }
}

struct Inner {
    core: Mutex<Core>,
    middleware: Vec<Middleware>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

/// Shared handle to one state container. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    pub fn builder(reducer: ReducerFn) -> StoreBuilder {
        StoreBuilder {
            reducer,
            initial_state: None,
            middleware: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Dispatch an action through the middleware chain into the reducer.
    pub fn dispatch(&self, action: Action) -> StoreResult<()> {
        if action.kind.is_empty() {
            return Err(StoreError::MissingType);
        }
        if REDUCING.with(Cell::get) {
            return Err(StoreError::ReducerBusy { kind: action.kind });
        }
        Next {
            chain: &self.inner.middleware,
            store: self,
        }
        .run(action)
    }

    /// Snapshot of the whole state.
    pub fn state(&self) -> Value {
        self.lock_core().state.clone().unwrap_or(Value::Null)
    }

    /// Swap the transition function. The new function is applied to the
    /// current state before the lock is released.
    pub fn replace_reducer(&self, reducer: ReducerFn) {
        let state = {
            let mut core = self.lock_core();
            core.reducer = reducer;
            let next = reduce(&mut core, &Action::new(REPLACE));
            core.state = Some(next.clone());
            next
        };
        debug!("Transition function replaced");
        self.notify(&state);
    }

    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, listener));
        id
    }

    /// Returns false when the id was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Every action that reaches the reducer is forwarded here, after the
    /// state has been updated. Each receiver has its own unbounded queue and
    /// only sees actions dispatched after it subscribed. Dropping the
    /// receiver unsubscribes it.
    pub fn subscribe_actions(&self) -> mpsc::UnboundedReceiver<Action> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_core().watchers.push(tx);
        rx
    }

    /// Innermost step of the chain.
    pub(crate) fn apply(&self, action: Action) -> StoreResult<()> {
        let state = {
            let mut core = self.lock_core();
            let next = reduce(&mut core, &action);
            core.state = Some(next.clone());
            // Under the lock so every watcher sees reduce order.
            core.fan_out(&action);
            next
        };
        self.notify(&state);
        Ok(())
    }

    fn notify(&self, state: &Value) {
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn reduce(core: &mut Core, action: &Action) -> Value {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            REDUCING.with(|r| r.set(false));
        }
    }

    REDUCING.with(|r| r.set(true));
    let _reset = Reset;
    // The committed state stays in place until the reducer returns, so a
    // panicking handler leaves it untouched.
    let prev = core.state.clone();
    (core.reducer)(prev, action)
}

/// Collects middleware, listeners and the initial state before the store
/// exists. Store enhancers are `FnOnce(StoreBuilder) -> StoreBuilder`.
pub struct StoreBuilder {
    reducer: ReducerFn,
    initial_state: Option<Value>,
    middleware: Vec<Middleware>,
    listeners: Vec<Listener>,
}

impl StoreBuilder {
    pub fn initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Apply a store enhancer.
    pub fn enhance<F>(self, enhancer: F) -> Self
    where
        F: FnOnce(StoreBuilder) -> StoreBuilder,
    {
        enhancer(self)
    }

    pub fn build(self) -> Store {
        let mut core = Core {
            state: self.initial_state,
            reducer: self.reducer,
            watchers: Vec::new(),
        };
        let initial = reduce(&mut core, &Action::new(INIT));
        core.state = Some(initial);

        let listeners = self
            .listeners
            .into_iter()
            .enumerate()
            .map(|(i, l)| (ListenerId(i as u64), l))
            .collect::<Vec<_>>();
        let next_listener = AtomicU64::new(listeners.len() as u64);

        Store {
            inner: Arc::new(Inner {
                core: Mutex::new(core),
                middleware: self.middleware,
                listeners: Mutex::new(listeners),
                next_listener,
            }),
        }
    }
}
