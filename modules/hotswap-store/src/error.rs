use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The action carried an empty type string.
    #[error("dispatch: action should have a non-empty type")]
    MissingType,

    /// A transition function tried to dispatch while it was running.
    #[error("dispatch: reducers may not dispatch actions (while handling {kind})")]
    ReducerBusy { kind: String },

    /// Rejected by a middleware.
    #[error("dispatch rejected by middleware: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
