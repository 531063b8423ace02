//! Seams for user-supplied routines.

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use hotswap_store::Action;

use crate::context::EffectContext;
use crate::subscriptions::{SubscriptionContext, Unlisten};

/// An effect routine. May perform I/O and dispatch further actions through
/// the context.
///
/// Closures of shape `Fn(Action, EffectContext) -> impl Future<Output =
/// Result<()>>` implement this automatically.
#[async_trait]
pub trait Effect: Send + Sync {
    async fn run(&self, action: Action, ctx: EffectContext) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Effect for F
where
    F: Fn(Action, EffectContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, action: Action, ctx: EffectContext) -> Result<()> {
        (self)(action, ctx).await
    }
}

/// A subscription setup. Runs once when its model starts and may return a
/// cleanup to run when the model is removed.
pub trait Subscription: Send + Sync {
    fn setup(&self, ctx: SubscriptionContext) -> Option<Unlisten>;
}

impl<F> Subscription for F
where
    F: Fn(SubscriptionContext) -> Option<Unlisten> + Send + Sync,
{
    fn setup(&self, ctx: SubscriptionContext) -> Option<Unlisten> {
        (self)(ctx)
    }
}
