//! Namespace routing.
//!
//! A model's own code may address its handlers by short name (`"add"`);
//! everything else must use the qualified form (`"users/add"`). Whether a
//! short name is "own" is decided by existence: if `{ns}/{name}` is one of
//! the model's reducer or effect keys, the prefixed form wins.

use std::borrow::Cow;
use std::collections::HashSet;

pub const NAMESPACE_SEP: &str = "/";

/// Suffix of the per-model cancellation signal.
pub const CANCEL_EFFECTS: &str = "@@CANCEL_EFFECTS";

/// `{namespace}/{name}`.
pub fn prefix_type(namespace: &str, name: &str) -> String {
    format!("{namespace}{NAMESPACE_SEP}{name}")
}

/// `{namespace}/@@CANCEL_EFFECTS`.
pub fn cancel_type(namespace: &str) -> String {
    prefix_type(namespace, CANCEL_EFFECTS)
}

/// The resolved key set of one registered model.
#[derive(Debug, Clone)]
pub struct ModelScope {
    namespace: String,
    keys: HashSet<String>,
}

impl ModelScope {
    /// `keys` are the model's already-prefixed reducer and effect keys.
    pub fn new(namespace: impl Into<String>, keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            namespace: namespace.into(),
            keys: keys.into_iter().collect(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Effective type for `kind` when dispatched from inside this model.
    pub fn resolve<'a>(&self, kind: &'a str) -> Cow<'a, str> {
        let prefixed = prefix_type(&self.namespace, kind);
        if self.keys.contains(&prefixed) {
            Cow::Owned(prefixed)
        } else {
            Cow::Borrowed(kind)
        }
    }

    /// True when `kind` already starts with `{ns}/`.
    pub fn is_own_prefixed(&self, kind: &str) -> bool {
        kind.strip_prefix(self.namespace.as_str())
            .is_some_and(|rest| rest.starts_with(NAMESPACE_SEP))
    }

    pub fn cancel_type(&self) -> String {
        cancel_type(&self.namespace)
    }
}
