//! Subscription lifecycle: run every setup once, keep the cleanups, run them
//! exactly once when the model goes away. A panicking setup or cleanup is
//! reported and never stops its siblings.

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::Navigation;
use crate::dispatch::ModelDispatch;
use crate::error::{panic_message, ReportedError};
use crate::hooks::ErrorSink;
use crate::registry::RegisteredModel;

/// Cleanup returned by a subscription setup.
pub struct Unlisten(Box<dyn FnOnce() -> Result<()> + Send>);

impl Unlisten {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self(Box::new(cleanup))
    }

    fn call(self) -> Result<()> {
        (self.0)()
    }
}

/// Handed to every subscription setup.
#[derive(Clone)]
pub struct SubscriptionContext {
    pub dispatch: ModelDispatch,
    pub navigation: Option<Navigation>,
    pub errors: ErrorSink,
}

/// Per-namespace record of what the setups returned.
pub(crate) struct SubscriptionHandles {
    namespace: String,
    unlisteners: Vec<(String, Unlisten)>,
    malformed: Vec<String>,
}

pub(crate) fn start(model: &RegisteredModel, ctx: &SubscriptionContext) -> SubscriptionHandles {
    let mut unlisteners = Vec::new();
    let mut malformed = Vec::new();

    for (key, setup) in &model.subscriptions {
        match catch_unwind(AssertUnwindSafe(|| setup.setup(ctx.clone()))) {
            Ok(Some(unlisten)) => unlisteners.push((key.clone(), unlisten)),
            Ok(None) => malformed.push(key.clone()),
            Err(panic) => ctx.errors.report(ReportedError::SubscriptionPanic {
                namespace: model.namespace.clone(),
                key: key.clone(),
                phase: "setup",
                message: panic_message(panic.as_ref()),
            }),
        }
    }

    debug!(
        namespace = %model.namespace,
        running = unlisteners.len(),
        malformed = malformed.len(),
        "Subscriptions started"
    );

    SubscriptionHandles {
        namespace: model.namespace.clone(),
        unlisteners,
        malformed,
    }
}

/// Run every cleanup. A failing or panicking cleanup is reported and the rest
/// still run.
pub(crate) fn stop(handles: SubscriptionHandles, errors: &ErrorSink) {
    let SubscriptionHandles {
        namespace,
        unlisteners,
        malformed,
    } = handles;

    if !malformed.is_empty() {
        warn!(
            namespace = %namespace,
            subscriptions = %malformed.join(", "),
            "[app.unmodel] subscription should return unlistener function"
        );
    }

    for (key, unlisten) in unlisteners {
        match catch_unwind(AssertUnwindSafe(|| unlisten.call())) {
            Ok(Ok(())) => {}
            Ok(Err(source)) => errors.report(ReportedError::SubscriptionCleanup {
                namespace: namespace.clone(),
                key,
                source,
            }),
            Err(panic) => errors.report(ReportedError::SubscriptionPanic {
                namespace: namespace.clone(),
                key,
                phase: "cleanup",
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}
