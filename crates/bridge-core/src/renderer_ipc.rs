//! # Renderer IPC
//!
//! Spoke-side facade. A spoke only ever talks to its single hub, so none of
//! these operations take a target.

use crate::domain::CallError;
use crate::engine::{AnswerHandle, CorrelationEngine, ListenerHandle};
use bridge_bus::{HubRef, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

/// Call/answer API for a spoke process.
pub struct RendererIpc<T: Transport<Peer = HubRef>> {
    engine: CorrelationEngine<T>,
}

impl<T: Transport<Peer = HubRef>> RendererIpc<T> {
    pub fn new(transport: T) -> Self {
        Self {
            engine: CorrelationEngine::new(transport),
        }
    }

    /// Call a handler registered on the hub and wait for its reply.
    pub async fn call_main<D, R>(&self, channel: &str, data: D) -> Result<R, CallError>
    where
        D: Serialize,
        R: DeserializeOwned,
    {
        self.engine.call(&HubRef, channel, data).await
    }

    /// Answer calls from the hub on `channel`.
    pub fn answer_main<D, R, F, Fut>(&self, channel: &str, handler: F) -> Result<AnswerHandle<T>, CallError>
    where
        D: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.engine
            .answer(channel, move |data: D, _hub: HubRef| handler(data))
    }

    pub fn answer_main_sync<D, R, F>(&self, channel: &str, handler: F) -> Result<AnswerHandle<T>, CallError>
    where
        D: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(D) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.engine
            .answer_sync(channel, move |data: D, _hub: HubRef| handler(data))
    }

    pub fn off_answer_main(&self, channel: &str) -> bool {
        self.engine.off_answer(channel)
    }

    /// Subscribe to messages the hub sends with `send_to_renderers`.
    pub fn on_broadcast<D, F>(&self, channel: &str, on_message: F) -> Result<ListenerHandle<T>, CallError>
    where
        D: DeserializeOwned + 'static,
        F: Fn(D) + Send + Sync + 'static,
    {
        self.engine
            .on_notify(channel, move |data: D, _hub: HubRef| on_message(data))
    }

    /// One-way message to the hub.
    pub fn send_to_main<D: Serialize>(&self, channel: &str, data: D) -> Result<(), CallError> {
        self.engine.notify(&HubRef, channel, data)
    }

    pub fn engine(&self) -> &CorrelationEngine<T> {
        &self.engine
    }
}
