//! # Error Types
//!
//! Errors raised by transport implementations.

use thiserror::Error;

/// Errors a transport can report when asked to send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The addressed peer no longer accepts messages (window closed,
    /// process exited, endpoint dropped).
    #[error("Peer gone: {0}")]
    PeerGone(String),

    /// The transport itself was shut down.
    #[error("Transport closed")]
    Closed,
}
