//! The dispatched signal.

use serde::{Deserialize, Serialize};

/// A dispatched signal: a type string plus an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Same payload, different type. Used when a namespace prefix is added.
    pub fn retyped(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}
