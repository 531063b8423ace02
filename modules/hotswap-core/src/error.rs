//! Typed errors for registration, start-up and scheduled work.

use std::any::Any;

use hotswap_store::StoreError;
use thiserror::Error;

/// A malformed, duplicate or unknown model definition.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("[app.model] namespace should be defined")]
    MissingNamespace,

    #[error("[app.model] namespace should be unique: {0}")]
    DuplicateNamespace(String),

    #[error("[app.model] namespace {namespace:?} is invalid: {reason}")]
    InvalidNamespace {
        namespace: String,
        reason: &'static str,
    },

    #[error("[app.model] {section} of {namespace} contain an empty key")]
    EmptyKey {
        namespace: String,
        section: &'static str,
    },

    #[error("[app.model] {key} is reserved and cannot be used in {namespace}")]
    ReservedKey { namespace: String, key: String },

    /// Throttled effects must say how long to stay quiet.
    #[error("[app.model] effect {namespace}/{key}: opts.ms should be a positive number if type is throttle")]
    ThrottleWithoutInterval { namespace: String, key: String },

    #[error("[app.unmodel] no model registered under namespace {0}")]
    UnknownNamespace(String),
}

/// Lifecycle misuse of the runtime facade.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("[app.start] the runtime is already started")]
    AlreadyStarted,

    #[error("[app.use] hooks are sealed once the runtime has started")]
    HooksSealed,

    #[error("[app.{0}] the runtime has not been started")]
    NotStarted(&'static str),

    /// Watchers need a tokio runtime to be spawned on.
    #[error("[app.start] must be called from within a tokio runtime")]
    NoRuntime,
}

/// Everything the facade can return synchronously.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A static or injected extra reducer key equals a model namespace.
    #[error("[app.start] extraReducers conflict with other reducers: {key}")]
    Conflict { key: String },

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Dispatch(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures inside concurrently scheduled work. Never returned to a caller;
/// always delivered to the configured error handlers.
#[derive(Debug, Error)]
pub enum ReportedError {
    #[error("effect {key} failed: {source}")]
    Effect {
        namespace: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("effect {key} panicked: {message}")]
    EffectPanic {
        namespace: String,
        key: String,
        message: String,
    },

    #[error("subscription {namespace}/{key} cleanup failed: {source}")]
    SubscriptionCleanup {
        namespace: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// A subscription setup or cleanup panicked. `phase` is `setup` or
    /// `cleanup`.
    #[error("subscription {namespace}/{key} {phase} panicked: {message}")]
    SubscriptionPanic {
        namespace: String,
        key: String,
        phase: &'static str,
        message: String,
    },
}

impl ReportedError {
    pub fn namespace(&self) -> &str {
        match self {
            ReportedError::Effect { namespace, .. }
            | ReportedError::EffectPanic { namespace, .. }
            | ReportedError::SubscriptionCleanup { namespace, .. }
            | ReportedError::SubscriptionPanic { namespace, .. } => namespace,
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
