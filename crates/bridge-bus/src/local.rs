//! # Local Bus
//!
//! In-process hub/spoke transport built on unbounded Tokio channels.
//!
//! Suitable for tests and single-process deployments; a multi-process host
//! supplies its own `Transport` implementation instead.

use crate::ports::{HubRef, Listener, ListenerId, PeerDirectory, PeerId, Transport};
use crate::registry::ListenerRegistry;
use bridge_types::TransportError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// A message waiting in an endpoint's mailbox.
struct Delivery<P> {
    sub_channel: String,
    payload: Value,
    source: P,
}

type Mailbox<P> = mpsc::UnboundedSender<Delivery<P>>;

/// Directory slot for one spoke. `mailbox` is `None` once the spoke's
/// endpoint has been dropped; the peer stays listed until removed.
struct SpokeSlot {
    mailbox: Option<Mailbox<HubRef>>,
}

#[derive(Default)]
struct BusState {
    hub: Option<Mailbox<PeerId>>,
    spokes: BTreeMap<PeerId, SpokeSlot>,
    focused: Option<PeerId>,
    next_peer: u32,
}

/// Listener registry plus the task draining the mailbox into it.
struct Endpoint<P> {
    registry: Arc<ListenerRegistry<P>>,
    dispatcher: JoinHandle<()>,
}

impl<P: Clone + Send + Sync + 'static> Endpoint<P> {
    fn spawn(name: String) -> (Self, Mailbox<P>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery<P>>();
        let registry = Arc::new(ListenerRegistry::new());

        let dispatch_registry = registry.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let ran = dispatch_registry.dispatch(
                    &delivery.sub_channel,
                    delivery.payload,
                    delivery.source,
                );
                if ran == 0 {
                    trace!(
                        endpoint = %name,
                        sub_channel = %delivery.sub_channel,
                        "No listener for delivery, dropped"
                    );
                }
            }
            debug!(endpoint = %name, "Mailbox closed, dispatcher stopping");
        });

        (
            Self {
                registry,
                dispatcher,
            },
            tx,
        )
    }
}

impl<P> Drop for Endpoint<P> {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Connects one hub and any number of spokes inside a single process.
///
/// Endpoints spawn their dispatch task on creation, so `hub_endpoint` and
/// `add_spoke` must be called from within a Tokio runtime.
#[derive(Clone, Default)]
pub struct LocalBus {
    state: Arc<RwLock<BusState>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the hub endpoint. A second call replaces the first hub.
    pub fn hub_endpoint(&self) -> HubEndpoint {
        let (endpoint, mailbox) = Endpoint::spawn("hub".to_string());
        let mut state = self.state.write();
        if state.hub.replace(mailbox.clone()).is_some() {
            warn!("Hub endpoint replaced");
        }
        HubEndpoint {
            state: self.state.clone(),
            mailbox,
            endpoint,
        }
    }

    /// Create a new spoke and list it in the hub's directory.
    pub fn add_spoke(&self) -> SpokeEndpoint {
        let mut state = self.state.write();
        state.next_peer += 1;
        let id = PeerId(state.next_peer);

        let (endpoint, mailbox) = Endpoint::spawn(id.to_string());
        state.spokes.insert(
            id,
            SpokeSlot {
                mailbox: Some(mailbox),
            },
        );
        debug!(peer = %id, "Spoke attached");

        SpokeEndpoint {
            id,
            state: self.state.clone(),
            endpoint,
        }
    }

    /// Drop a spoke from the directory entirely.
    pub fn remove_spoke(&self, peer: PeerId) -> bool {
        let mut state = self.state.write();
        if state.focused == Some(peer) {
            state.focused = None;
        }
        state.spokes.remove(&peer).is_some()
    }

    /// Set (or clear) the focused spoke. Unknown peers are ignored.
    pub fn focus(&self, peer: Option<PeerId>) {
        let mut state = self.state.write();
        match peer {
            Some(id) if !state.spokes.contains_key(&id) => {
                warn!(peer = %id, "Cannot focus unknown peer");
            }
            other => state.focused = other,
        }
    }
}

/// The hub side of a `LocalBus`.
pub struct HubEndpoint {
    state: Arc<RwLock<BusState>>,
    mailbox: Mailbox<PeerId>,
    endpoint: Endpoint<PeerId>,
}

impl Transport for HubEndpoint {
    type Peer = PeerId;

    fn send(&self, to: &PeerId, sub_channel: &str, payload: Value) -> Result<(), TransportError> {
        let state = self.state.read();
        let mailbox = state
            .spokes
            .get(to)
            .and_then(|slot| slot.mailbox.as_ref())
            .ok_or_else(|| TransportError::PeerGone(to.to_string()))?;

        mailbox
            .send(Delivery {
                sub_channel: sub_channel.to_string(),
                payload,
                source: HubRef,
            })
            .map_err(|_| TransportError::PeerGone(to.to_string()))
    }

    fn on(&self, sub_channel: &str, listener: Listener<PeerId>) -> ListenerId {
        self.endpoint.registry.add(sub_channel, listener)
    }

    fn off(&self, sub_channel: &str, id: ListenerId) -> bool {
        self.endpoint.registry.remove(sub_channel, id)
    }
}

impl PeerDirectory for HubEndpoint {
    fn peers(&self) -> Vec<PeerId> {
        self.state.read().spokes.keys().copied().collect()
    }

    fn focused_peer(&self) -> Option<PeerId> {
        self.state.read().focused
    }
}

impl Drop for HubEndpoint {
    fn drop(&mut self) {
        let mut state = self.state.write();
        if state
            .hub
            .as_ref()
            .is_some_and(|current| current.same_channel(&self.mailbox))
        {
            state.hub = None;
        }
    }
}

/// One spoke of a `LocalBus`.
pub struct SpokeEndpoint {
    id: PeerId,
    state: Arc<RwLock<BusState>>,
    endpoint: Endpoint<HubRef>,
}

impl SpokeEndpoint {
    /// How the hub addresses this spoke.
    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl Transport for SpokeEndpoint {
    type Peer = HubRef;

    fn send(&self, _to: &HubRef, sub_channel: &str, payload: Value) -> Result<(), TransportError> {
        let state = self.state.read();
        let mailbox = state.hub.as_ref().ok_or(TransportError::Closed)?;

        mailbox
            .send(Delivery {
                sub_channel: sub_channel.to_string(),
                payload,
                source: self.id,
            })
            .map_err(|_| TransportError::Closed)
    }

    fn on(&self, sub_channel: &str, listener: Listener<HubRef>) -> ListenerId {
        self.endpoint.registry.add(sub_channel, listener)
    }

    fn off(&self, sub_channel: &str, id: ListenerId) -> bool {
        self.endpoint.registry.remove(sub_channel, id)
    }
}

impl Drop for SpokeEndpoint {
    fn drop(&mut self) {
        // Keep the directory entry so broadcasts still see (and fail on) it.
        if let Some(slot) = self.state.write().spokes.get_mut(&self.id) {
            slot.mailbox = None;
        }
        debug!(peer = %self.id, "Spoke detached");
    }
}
