//! # Envelopes
//!
//! The wire structures exchanged over the transport.
//!
//! - `CallEnvelope` travels on `<channel>#request`.
//! - `ReplyEnvelope` travels on `<channel>#reply` and echoes the call's `id`.
//! - `NotifyEnvelope` travels on `<channel>#notify` and expects no reply.

use crate::correlation::CallId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A request expecting exactly one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Correlation id, echoed by the reply.
    pub id: CallId,
    /// Logical channel selecting the handler on the peer.
    pub channel: String,
    /// Caller-supplied payload.
    #[serde(default)]
    pub data: Value,
}

impl CallEnvelope {
    pub fn new(id: CallId, channel: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            channel: channel.into(),
            data,
        }
    }
}

/// Failure description carried back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    /// Failure class (`"Error"`, `"Panic"`, ...).
    pub name: String,
    /// Human-readable message, as produced by the handler.
    pub message: String,
    /// Extended trace, if the answering side had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SerializedError {
    /// Name used for ordinary handler failures.
    pub const ERROR: &'static str = "Error";
    /// Name used when the handler panicked.
    pub const PANIC: &'static str = "Panic";

    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for SerializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Response to a `CallEnvelope`.
///
/// Exactly one of `error` / `return_value` is meaningful. When `error` is
/// absent, a missing `return_value` is the same as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
}

impl ReplyEnvelope {
    /// Successful reply.
    pub fn success(id: CallId, return_value: Value) -> Self {
        Self {
            id,
            error: None,
            return_value: Some(return_value),
        }
    }

    /// Failed reply.
    pub fn failure(id: CallId, error: SerializedError) -> Self {
        Self {
            id,
            error: Some(error),
            return_value: None,
        }
    }

    /// Collapse into the handler's outcome.
    pub fn into_result(self) -> Result<Value, SerializedError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.return_value.unwrap_or(Value::Null)),
        }
    }
}

/// One-way message; no id, no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyEnvelope {
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

impl NotifyEnvelope {
    pub fn new(channel: impl Into<String>, data: Value) -> Self {
        Self {
            channel: channel.into(),
            data,
        }
    }
}
