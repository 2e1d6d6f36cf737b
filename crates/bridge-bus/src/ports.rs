//! # Transport Ports
//!
//! The host environment supplies these. The correlation engine is generic
//! over them so it can be driven by `LocalBus`, a real process transport, or
//! a hand-written fake in tests.

use bridge_types::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Callback invoked with `(payload, source)` for each message on a sub-channel.
pub type Listener<P> = Arc<dyn Fn(Value, P) + Send + Sync>;

/// Token returned by `Transport::on`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handle identifying one spoke process, as seen from the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// The single hub, as seen from a spoke. Spokes cannot address each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HubRef;

impl fmt::Display for HubRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("hub")
    }
}

/// One-way, fire-and-forget messaging.
///
/// `send` must not block: it hands the payload over for delivery and
/// returns. Delivery itself is not guaranteed.
pub trait Transport: Send + Sync + 'static {
    /// How this side addresses the other side.
    type Peer: Clone + Debug + fmt::Display + Send + Sync + 'static;

    /// Deliver `payload` on `sub_channel` to `to`.
    fn send(&self, to: &Self::Peer, sub_channel: &str, payload: Value)
        -> Result<(), TransportError>;

    /// Register a listener for incoming messages on `sub_channel`.
    fn on(&self, sub_channel: &str, listener: Listener<Self::Peer>) -> ListenerId;

    /// Remove a listener. Returns `false` if it was not registered.
    fn off(&self, sub_channel: &str, id: ListenerId) -> bool;
}

/// Hub-side view of the addressable spokes.
pub trait PeerDirectory: Transport {
    /// All currently known spokes.
    fn peers(&self) -> Vec<Self::Peer>;

    /// The spoke that currently has focus, if any.
    fn focused_peer(&self) -> Option<Self::Peer>;
}

impl<T: Transport> Transport for Arc<T> {
    type Peer = T::Peer;

    fn send(&self, to: &Self::Peer, sub_channel: &str, payload: Value) -> Result<(), TransportError> {
        (**self).send(to, sub_channel, payload)
    }

    fn on(&self, sub_channel: &str, listener: Listener<Self::Peer>) -> ListenerId {
        (**self).on(sub_channel, listener)
    }

    fn off(&self, sub_channel: &str, id: ListenerId) -> bool {
        (**self).off(sub_channel, id)
    }
}

impl<T: PeerDirectory> PeerDirectory for Arc<T> {
    fn peers(&self) -> Vec<Self::Peer> {
        (**self).peers()
    }

    fn focused_peer(&self) -> Option<Self::Peer> {
        (**self).focused_peer()
    }
}
