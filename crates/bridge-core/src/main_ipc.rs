//! # Main IPC
//!
//! Hub-side facade. The hub can address any spoke individually, the focused
//! spoke, or every spoke at once.

use crate::domain::CallError;
use crate::engine::{AnswerHandle, CorrelationEngine, ListenerHandle};
use bridge_bus::PeerDirectory;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::{debug, warn};

/// Call/answer API for the hub process.
pub struct MainIpc<T: PeerDirectory> {
    engine: CorrelationEngine<T>,
}

impl<T: PeerDirectory> MainIpc<T> {
    pub fn new(transport: T) -> Self {
        Self {
            engine: CorrelationEngine::new(transport),
        }
    }

    /// Call a handler registered on `peer` and wait for its reply.
    pub async fn call_renderer<D, R>(&self, peer: &T::Peer, channel: &str, data: D) -> Result<R, CallError>
    where
        D: Serialize,
        R: DeserializeOwned,
    {
        self.engine.call(peer, channel, data).await
    }

    /// Call the focused spoke.
    ///
    /// Fails with `NoPeerResolved` before anything is sent when no spoke has
    /// focus.
    pub async fn call_focused_renderer<D, R>(&self, channel: &str, data: D) -> Result<R, CallError>
    where
        D: Serialize,
        R: DeserializeOwned,
    {
        let peer = self
            .engine
            .transport()
            .focused_peer()
            .ok_or(CallError::NoPeerResolved)?;
        self.engine.call(&peer, channel, data).await
    }

    /// Answer calls from any spoke on `channel`.
    pub fn answer_renderer<D, R, F, Fut>(&self, channel: &str, handler: F) -> Result<AnswerHandle<T>, CallError>
    where
        D: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(D, T::Peer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.engine.answer(channel, handler)
    }

    pub fn answer_renderer_sync<D, R, F>(&self, channel: &str, handler: F) -> Result<AnswerHandle<T>, CallError>
    where
        D: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(D, T::Peer) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.engine.answer_sync(channel, handler)
    }

    pub fn off_answer_renderer(&self, channel: &str) -> bool {
        self.engine.off_answer(channel)
    }

    /// Broadcast a one-way message to every known spoke.
    ///
    /// A spoke that cannot be reached is logged and skipped. Returns how
    /// many spokes accepted the message.
    pub fn send_to_renderers<D: Serialize>(&self, channel: &str, data: D) -> Result<usize, CallError> {
        if channel.is_empty() {
            return Err(CallError::InvalidChannel);
        }
        let data = serde_json::to_value(data).map_err(|e| CallError::Encode(e.to_string()))?;

        let peers = self.engine.transport().peers();
        let mut delivered = 0;
        for peer in &peers {
            match self.engine.notify(peer, channel, data.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(peer = %peer, channel, error = %err, "Broadcast skipped peer");
                }
            }
        }

        debug!(channel, delivered, total = peers.len(), "Broadcast sent");
        Ok(delivered)
    }

    /// Listen for one-way messages sent by spokes with `send_to_main`.
    pub fn on_renderer_message<D, F>(&self, channel: &str, on_message: F) -> Result<ListenerHandle<T>, CallError>
    where
        D: DeserializeOwned + 'static,
        F: Fn(D, T::Peer) + Send + Sync + 'static,
    {
        self.engine.on_notify(channel, on_message)
    }

    pub fn engine(&self) -> &CorrelationEngine<T> {
        &self.engine
    }
}
