//! # Bridge Bus - One-Way Transport
//!
//! The bridge only ever asks its transport for three things: send a payload
//! to one process, register a listener for a sub-channel, and remove that
//! listener. This crate defines those ports and ships `LocalBus`, an
//! in-process implementation used by the demo runtime and the test suites.
//!
//! ## Topology
//!
//! ```text
//!                     ┌──────────────┐
//!                     │ HubEndpoint  │  peers(), focused_peer()
//!                     └──────┬───────┘
//!          send(PeerId)      │      send(HubRef)
//!        ┌───────────────────┼───────────────────┐
//!        ▼                   ▼                   ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ SpokeEndpoint│   │ SpokeEndpoint│   │ SpokeEndpoint│
//! │   peer-1     │   │   peer-2     │   │   peer-3     │
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! Every endpoint drains its mailbox from one dispatch task, so listeners on
//! one endpoint never run concurrently with each other.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod local;
pub mod ports;
pub mod registry;

pub use local::{HubEndpoint, LocalBus, SpokeEndpoint};
pub use ports::{HubRef, Listener, ListenerId, PeerDirectory, PeerId, Transport};
pub use registry::ListenerRegistry;
