// Central error type for the window lifecycle layer.
//
// Callback adapters never let these escape across the engine/toolkit
// boundary; they are logged there and turned into isolated outcomes.

use crate::state::window::{WindowId, WindowKind};

/// Error returned by a user hook. Any error type works.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The registry already holds a controller under this id. Means the id
    /// allocator handed the same value out twice.
    #[error("window id {0} is already registered")]
    DuplicateId(WindowId),

    /// An engine callback arrived for an id that is unknown or already destroyed.
    #[error("engine signal `{signal}` for unknown or destroyed window {id}")]
    ProtocolViolation { id: WindowId, signal: &'static str },

    /// A user hook returned an error or panicked.
    #[error("hook for `{event}` failed: {message}")]
    HookFailure { event: &'static str, message: String },

    /// An auxiliary window could not be torn down.
    #[error("teardown of {kind:?} window failed: {message}")]
    TeardownFailure { kind: WindowKind, message: String },

    /// The operation needs an attached engine handle.
    #[error("window has no engine attached")]
    NotAttached,

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Render a caught panic payload for the log.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
