use std::path::PathBuf;

use crate::{EngineRole, TransportState};

/// Result alias that carries the custom [`SyncError`] type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// An engine refused its source file: missing, corrupt, or not preparable.
    /// The session is left idle with no engines primed.
    #[error("{engine} engine could not load `{}`: {reason}", .path.display())]
    EngineInit {
        engine: EngineRole,
        path: PathBuf,
        reason: String,
    },
    /// A transport command was issued in a state that does not permit it.
    #[error("`{command}` is not permitted while the session is {state}")]
    InvalidState {
        command: &'static str,
        state: TransportState,
    },
    /// A single engine call failed after the engine was initialised.
    #[error("{engine} engine failed `{command}`: {reason}")]
    EngineCommand {
        engine: EngineRole,
        command: String,
        reason: String,
    },
    /// A command argument is outside of its accepted range.
    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// Free-form error, mostly used for poisoned locks and setup failures.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn invalid_state(command: &'static str, state: TransportState) -> Self {
        Self::InvalidState { command, state }
    }
}

impl From<&str> for SyncError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SyncError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
