//! # Bridge Types Crate
//!
//! Wire-level types shared by the hub ("main") and spoke ("renderer") sides
//! of the bridge.
//!
//! ## Design Principles
//!
//! - **Opaque payloads**: envelopes carry `serde_json::Value`; typed payloads
//!   are encoded and decoded at the call site, never inside the engine.
//! - **Correlation by id**: every request carries a `CallId` and the reply
//!   echoes it back unchanged.
//! - **Disjoint sub-channels**: requests, replies, and one-way notifications
//!   for the same logical channel never share a transport name.

pub mod channel;
pub mod correlation;
pub mod envelope;
pub mod errors;

pub use channel::{notify_channel, reply_channel, request_channel, SubChannelKind};
pub use correlation::CallId;
pub use envelope::{CallEnvelope, NotifyEnvelope, ReplyEnvelope, SerializedError};
pub use errors::TransportError;
