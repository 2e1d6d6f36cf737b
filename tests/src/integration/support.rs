//! Test transports.

use bridge_bus::{Listener, ListenerId, ListenerRegistry, PeerDirectory, PeerId, Transport};
use bridge_types::TransportError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;

/// A message handed to `ManualTransport::send`.
#[derive(Debug, Clone)]
pub struct Sent {
    pub to: PeerId,
    pub sub_channel: String,
    pub payload: Value,
}

/// Hub-side transport that records every send and only delivers when the
/// test says so. Lets a test control reply order exactly.
#[derive(Default)]
pub struct ManualTransport {
    peers: Vec<PeerId>,
    focused: Option<PeerId>,
    refused: Mutex<HashSet<PeerId>>,
    sent: Mutex<Vec<Sent>>,
    listeners: ListenerRegistry<PeerId>,
}

impl ManualTransport {
    pub fn with_peers(peers: Vec<PeerId>) -> Self {
        Self {
            peers,
            ..Default::default()
        }
    }

    pub fn with_focus(mut self, peer: PeerId) -> Self {
        self.focused = Some(peer);
        self
    }

    /// Make every later send to `peer` fail.
    pub fn refuse(&self, peer: PeerId) {
        self.refused.lock().insert(peer);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Deliver `payload` to local listeners as if `from` had sent it.
    pub fn deliver(&self, from: PeerId, sub_channel: &str, payload: Value) -> usize {
        self.listeners.dispatch(sub_channel, payload, from)
    }
}

impl Transport for ManualTransport {
    type Peer = PeerId;

    fn send(&self, to: &PeerId, sub_channel: &str, payload: Value) -> Result<(), TransportError> {
        if self.refused.lock().contains(to) {
            return Err(TransportError::PeerGone(to.to_string()));
        }
        self.sent.lock().push(Sent {
            to: *to,
            sub_channel: sub_channel.to_string(),
            payload,
        });
        Ok(())
    }

    fn on(&self, sub_channel: &str, listener: Listener<PeerId>) -> ListenerId {
        self.listeners.add(sub_channel, listener)
    }

    fn off(&self, sub_channel: &str, id: ListenerId) -> bool {
        self.listeners.remove(sub_channel, id)
    }
}

impl PeerDirectory for ManualTransport {
    fn peers(&self) -> Vec<PeerId> {
        self.peers.clone()
    }

    fn focused_peer(&self) -> Option<PeerId> {
        self.focused
    }
}
