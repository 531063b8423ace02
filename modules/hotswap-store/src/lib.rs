//! Pure state container.
//!
//! Holds one JSON state value and one transition function. Every dispatch
//! runs middleware → reduce → forward the action to watchers → notify listeners.
//!
//! The transition function can be swapped while the store is live
//! (`replace_reducer`); the swap and the first reduction under the new
//! function happen under the same lock, so no dispatch ever observes a
//! half-applied change.

pub mod action;
pub mod error;
pub mod store;
pub mod traits;

pub use action::Action;
pub use error::{StoreError, StoreResult};
pub use store::{ListenerId, Store, StoreBuilder};
pub use traits::{listener_fn, middleware_fn, reducer_fn, Listener, Middleware, Next, ReducerFn};
