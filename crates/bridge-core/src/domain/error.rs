//! Caller-facing error type.

use bridge_types::SerializedError;
use thiserror::Error;

/// Why a call (or a one-way send) did not produce a value.
///
/// A call that is never answered is not represented here: its future simply
/// stays pending. Wrap it in `tokio::time::timeout` if liveness matters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The remote handler failed. `message` is the handler's own message.
    #[error("{message}")]
    Handler {
        name: String,
        message: String,
        stack: Option<String>,
    },

    /// No focused renderer could be resolved; nothing was sent.
    #[error("No focused renderer to call")]
    NoPeerResolved,

    /// The transport refused to deliver to the target.
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// Channel names must be non-empty.
    #[error("Channel name must not be empty")]
    InvalidChannel,

    /// The call data could not be serialized.
    #[error("Failed to encode call data: {0}")]
    Encode(String),

    /// The return value did not match the requested type.
    #[error("Failed to decode return value: {0}")]
    Decode(String),

    /// `shutdown()` ran before a reply arrived, or before the call was sent.
    #[error("Correlation engine shut down before a reply arrived")]
    EngineClosed,
}

impl CallError {
    /// True for failures raised by the remote handler.
    #[must_use]
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, CallError::Handler { .. })
    }
}

impl From<SerializedError> for CallError {
    fn from(error: SerializedError) -> Self {
        CallError::Handler {
            name: error.name,
            message: error.message,
            stack: error.stack,
        }
    }
}
