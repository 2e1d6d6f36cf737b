//! # Correlation Engine
//!
//! Call/answer semantics over a one-way `Transport`.
//!
//! ```text
//!  caller side                                    answering side
//!  ───────────                                    ──────────────
//!  call(ch, data)
//!    ├─ register pending (id)
//!    └─ send CallEnvelope ── "<ch>#request" ──────▶ handler(data, source)
//!                                                     │ Ok / Err / panic
//!  complete(id) ◀──────────── "<ch>#reply" ── ReplyEnvelope{id, ...}
//! ```
//!
//! One engine exists per process side. It exclusively owns its pending-call
//! store and handler registry; transport listeners only hold weak
//! references back to it, so dropping the last `CorrelationEngine` clone
//! detaches every listener. `shutdown()` does the same while clones are
//! still alive and resolves outstanding calls with `CallError::EngineClosed`.
//!
//! A caller that stops waiting (a dropped future, an expired
//! `tokio::time::timeout`) removes its own pending entry; a reply that
//! shows up afterwards is counted as unmatched.

use crate::domain::{
    AbandonOnDrop, CallError, CallOutcome, EngineStats, ErasedHandler, HandlerRegistry, PendingCallStore,
    StatsSnapshot,
};
use bridge_bus::{Listener, ListenerId, Transport};
use bridge_types::{
    notify_channel, reply_channel, request_channel, CallEnvelope, CallId, NotifyEnvelope,
    ReplyEnvelope, SerializedError,
};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Per-process call/answer engine, generic over the injected transport.
pub struct CorrelationEngine<T: Transport> {
    inner: Arc<EngineInner<T>>,
}

struct EngineInner<T: Transport> {
    transport: T,
    pending: PendingCallStore,
    handlers: HandlerRegistry<T::Peer>,
    /// Reply listeners, installed lazily on the first call per channel
    reply_listeners: Mutex<HashMap<String, ListenerId>>,
    stats: Arc<EngineStats>,
    closed: AtomicBool,
}

impl<T: Transport> CorrelationEngine<T> {
    pub fn new(transport: T) -> Self {
        let stats = Arc::new(EngineStats::default());
        Self {
            inner: Arc::new(EngineInner {
                transport,
                pending: PendingCallStore::new(stats.clone()),
                handlers: HandlerRegistry::new(),
                reply_listeners: Mutex::new(HashMap::new()),
                stats,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The injected transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Call `channel` on `target` and wait for its single reply.
    ///
    /// There is no timeout: if the peer never answers, the returned future
    /// never resolves. Dropping the future forgets the call.
    pub async fn call<D, R>(&self, target: &T::Peer, channel: &str, data: D) -> Result<R, CallError>
    where
        D: Serialize,
        R: DeserializeOwned,
    {
        if channel.is_empty() {
            return Err(CallError::InvalidChannel);
        }
        let data = serde_json::to_value(data).map_err(|e| CallError::Encode(e.to_string()))?;

        let (id, receiver) = self.inner.dispatch_call(target, channel, data)?;
        let guard = AbandonOnDrop::new(&self.inner.pending, id);
        let outcome = receiver.await;
        guard.disarm();

        let outcome = outcome.map_err(|_| CallError::EngineClosed)?;

        let value = outcome.map_err(CallError::from)?;
        serde_json::from_value(value).map_err(|e| CallError::Decode(e.to_string()))
    }

    /// Answer calls on `channel` with an async handler.
    ///
    /// Replaces any handler already registered on `channel`. The handler
    /// receives the decoded data and the peer that sent the call; its error
    /// (or panic) is sent back to the caller instead of escaping.
    pub fn answer<D, R, F, Fut>(&self, channel: &str, handler: F) -> Result<AnswerHandle<T>, CallError>
    where
        D: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(D, T::Peer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        if channel.is_empty() {
            return Err(CallError::InvalidChannel);
        }
        if self.is_closed() {
            return Err(CallError::EngineClosed);
        }

        let handler = Arc::new(handler);
        let label = channel.to_string();
        let erased: ErasedHandler<T::Peer> = Arc::new(move |data: Value, source: T::Peer| {
            let handler = handler.clone();
            let label = label.clone();
            async move {
                let input: D = serde_json::from_value(data)
                    .map_err(|e| anyhow::anyhow!("Invalid payload for channel `{label}`: {e}"))?;
                let output = handler(input, source).await?;
                Ok::<Value, anyhow::Error>(serde_json::to_value(output)?)
            }
            .boxed()
        });

        Ok(self.inner.register(channel, erased))
    }

    /// Answer calls on `channel` with a synchronous handler.
    pub fn answer_sync<D, R, F>(&self, channel: &str, handler: F) -> Result<AnswerHandle<T>, CallError>
    where
        D: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(D, T::Peer) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.answer(channel, move |data: D, source: T::Peer| {
            futures::future::ready(handler(data, source))
        })
    }

    /// Remove whatever handler is registered on `channel`.
    pub fn off_answer(&self, channel: &str) -> bool {
        self.inner.off_answer(channel)
    }

    /// Send a one-way notification to `target`.
    pub fn notify<D: Serialize>(&self, target: &T::Peer, channel: &str, data: D) -> Result<(), CallError> {
        if channel.is_empty() {
            return Err(CallError::InvalidChannel);
        }
        let data = serde_json::to_value(data).map_err(|e| CallError::Encode(e.to_string()))?;
        let payload = serde_json::to_value(NotifyEnvelope::new(channel, data))
            .map_err(|e| CallError::Encode(e.to_string()))?;

        self.inner
            .transport
            .send(target, &notify_channel(channel), payload)
            .map_err(|err| CallError::PeerUnreachable {
                peer: target.to_string(),
                reason: err.to_string(),
            })
    }

    /// Listen for one-way notifications on `channel`.
    ///
    /// The listener runs on the transport's dispatch path, so it should be
    /// quick; a panic inside it is caught and logged.
    pub fn on_notify<D, F>(&self, channel: &str, on_message: F) -> Result<ListenerHandle<T>, CallError>
    where
        D: DeserializeOwned + 'static,
        F: Fn(D, T::Peer) + Send + Sync + 'static,
    {
        if channel.is_empty() {
            return Err(CallError::InvalidChannel);
        }
        if self.is_closed() {
            return Err(CallError::EngineClosed);
        }

        let label = channel.to_string();
        let listener: Listener<T::Peer> = Arc::new(move |payload: Value, source: T::Peer| {
            let envelope: NotifyEnvelope = match serde_json::from_value(payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(channel = %label, error = %e, "Malformed notification, ignored");
                    return;
                }
            };
            let data: D = match serde_json::from_value(envelope.data) {
                Ok(data) => data,
                Err(e) => {
                    warn!(channel = %label, error = %e, "Notification payload did not decode, ignored");
                    return;
                }
            };
            if std::panic::catch_unwind(AssertUnwindSafe(|| on_message(data, source))).is_err() {
                warn!(channel = %label, "Notification listener panicked");
            }
        });

        let sub_channel = notify_channel(channel);
        let id = self.inner.transport.on(&sub_channel, listener);
        Ok(ListenerHandle {
            engine: Arc::downgrade(&self.inner),
            sub_channel,
            id,
            active: AtomicBool::new(true),
        })
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    /// Whether `id` is still waiting for a reply.
    pub fn is_pending(&self, id: &CallId) -> bool {
        self.inner.pending.is_pending(id)
    }

    /// Channels that currently have an answering handler.
    pub fn answered_channels(&self) -> Vec<String> {
        self.inner.handlers.channels()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Stop the engine for every clone.
    ///
    /// Detaches all transport listeners, drops every handler, and resolves
    /// outstanding calls with `CallError::EngineClosed`. Later calls and
    /// registrations fail with the same error. Returns how many calls were
    /// still pending. Idempotent.
    pub fn shutdown(&self) -> usize {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        self.inner.detach_all();
        let closed = self.inner.pending.close_all();
        info!(closed, "Correlation engine shut down");
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl<T: Transport> Clone for CorrelationEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for CorrelationEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationEngine")
            .field("pending", &self.pending_count())
            .field("answered_channels", &self.answered_channels())
            .finish()
    }
}

impl<T: Transport> EngineInner<T> {
    /// Register-then-send. On a send failure the pending entry is removed
    /// again before the error is returned.
    fn dispatch_call(
        self: &Arc<Self>,
        target: &T::Peer,
        channel: &str,
        data: Value,
    ) -> Result<(CallId, oneshot::Receiver<CallOutcome>), CallError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CallError::EngineClosed);
        }
        self.ensure_reply_listener(channel);

        let (id, receiver) = self.pending.register(channel);
        // Lost a race with shutdown(): the store was already drained
        if self.closed.load(Ordering::Acquire) {
            self.pending.cancel(&id);
            return Err(CallError::EngineClosed);
        }
        let payload = match serde_json::to_value(CallEnvelope::new(id, channel, data)) {
            Ok(payload) => payload,
            Err(e) => {
                self.pending.cancel(&id);
                return Err(CallError::Encode(e.to_string()));
            }
        };

        if let Err(err) = self.transport.send(target, &request_channel(channel), payload) {
            self.pending.cancel(&id);
            EngineStats::bump(&self.stats.send_failures);
            warn!(
                call_id = %id,
                channel,
                peer = %target,
                error = %err,
                "Call could not be sent"
            );
            return Err(CallError::PeerUnreachable {
                peer: target.to_string(),
                reason: err.to_string(),
            });
        }

        EngineStats::bump(&self.stats.calls_issued);
        debug!(call_id = %id, channel, peer = %target, "Call sent");
        Ok((id, receiver))
    }

    fn ensure_reply_listener(self: &Arc<Self>, channel: &str) {
        let mut listeners = self.reply_listeners.lock();
        if listeners.contains_key(channel) {
            return;
        }

        let weak = Arc::downgrade(self);
        let listener: Listener<T::Peer> = Arc::new(move |payload: Value, source: T::Peer| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_reply(payload, source);
            }
        });
        let id = self.transport.on(&reply_channel(channel), listener);
        listeners.insert(channel.to_string(), id);
    }

    fn handle_reply(&self, payload: Value, source: T::Peer) {
        match serde_json::from_value::<ReplyEnvelope>(payload) {
            Ok(reply) => {
                self.pending.complete(reply);
            }
            Err(e) => {
                warn!(peer = %source, error = %e, "Malformed reply, ignored");
            }
        }
    }

    fn register(self: &Arc<Self>, channel: &str, handler: ErasedHandler<T::Peer>) -> AnswerHandle<T> {
        let installed = self.handlers.install(channel, handler, || {
            let weak = Arc::downgrade(self);
            let label = channel.to_string();
            let listener: Listener<T::Peer> = Arc::new(move |payload: Value, source: T::Peer| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_request(&label, payload, source);
                }
            });
            self.transport.on(&request_channel(channel), listener)
        });

        if installed.replaced {
            debug!(channel, "Handler replaced, last registration wins");
        } else {
            debug!(channel, "Handler registered");
        }

        AnswerHandle {
            engine: Arc::downgrade(self),
            channel: channel.to_string(),
            generation: installed.generation,
            active: AtomicBool::new(true),
        }
    }

    /// Run the handler for an incoming call on its own task and reply.
    fn handle_request(self: &Arc<Self>, channel: &str, payload: Value, source: T::Peer) {
        let call: CallEnvelope = match serde_json::from_value(payload) {
            Ok(call) => call,
            Err(e) => {
                warn!(channel, peer = %source, error = %e, "Malformed call, ignored");
                return;
            }
        };

        let Some(handler) = self.handlers.lookup(channel) else {
            debug!(call_id = %call.id, channel, "No handler registered, call left unanswered");
            return;
        };

        let weak = Arc::downgrade(self);
        let channel = channel.to_string();
        tokio::spawn(async move {
            let id = call.id;
            let outcome = AssertUnwindSafe(handler(call.data, source.clone()))
                .catch_unwind()
                .await;

            let Some(inner) = weak.upgrade() else {
                debug!(call_id = %id, channel = %channel, "Engine dropped, reply discarded");
                return;
            };
            let reply = inner.reply_for(id, &channel, outcome);
            inner.send_reply(&source, &channel, reply);
        });
    }

    fn reply_for(
        &self,
        id: CallId,
        channel: &str,
        outcome: Result<anyhow::Result<Value>, Box<dyn Any + Send>>,
    ) -> ReplyEnvelope {
        match outcome {
            Ok(Ok(value)) => {
                EngineStats::bump(&self.stats.requests_answered);
                ReplyEnvelope::success(id, value)
            }
            Ok(Err(err)) => {
                EngineStats::bump(&self.stats.handler_failures);
                debug!(call_id = %id, channel, error = %err, "Handler failed");
                ReplyEnvelope::failure(id, serialize_error(&err))
            }
            Err(panic) => {
                EngineStats::bump(&self.stats.handler_failures);
                let message = panic_message(panic.as_ref());
                warn!(call_id = %id, channel, panic = %message, "Handler panicked");
                ReplyEnvelope::failure(id, SerializedError::new(SerializedError::PANIC, message))
            }
        }
    }

    fn send_reply(&self, to: &T::Peer, channel: &str, reply: ReplyEnvelope) {
        let id = reply.id;
        let payload = match serde_json::to_value(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(call_id = %id, channel, error = %e, "Reply could not be encoded");
                return;
            }
        };

        if let Err(err) = self.transport.send(to, &reply_channel(channel), payload) {
            warn!(
                call_id = %id,
                channel,
                peer = %to,
                error = %err,
                "Reply could not be delivered"
            );
        }
    }

    fn deregister(&self, channel: &str, generation: u64) -> bool {
        match self.handlers.remove_generation(channel, generation) {
            Some(listener) => {
                self.transport.off(&request_channel(channel), listener);
                debug!(channel, "Handler deregistered");
                true
            }
            None => false,
        }
    }

    /// Remove every reply and request listener from the transport.
    fn detach_all(&self) {
        let replies: Vec<(String, ListenerId)> = self.reply_listeners.lock().drain().collect();
        for (channel, id) in replies {
            self.transport.off(&reply_channel(&channel), id);
        }
        for (channel, id) in self.handlers.drain() {
            self.transport.off(&request_channel(&channel), id);
        }
    }

    fn off_answer(&self, channel: &str) -> bool {
        match self.handlers.remove(channel) {
            Some(listener) => {
                self.transport.off(&request_channel(channel), listener);
                debug!(channel, "Handler removed");
                true
            }
            None => false,
        }
    }
}

impl<T: Transport> Drop for EngineInner<T> {
    fn drop(&mut self) {
        self.detach_all();

        let outstanding = self.pending.pending_count();
        if outstanding > 0 {
            debug!(outstanding, "Engine dropped with calls still pending");
        }
    }
}

/// Convert a handler error into its wire form.
///
/// `message` is the outermost error's display; `stack` is the full debug
/// rendering, which includes the cause chain.
fn serialize_error(err: &anyhow::Error) -> SerializedError {
    SerializedError::new(SerializedError::ERROR, err.to_string()).with_stack(format!("{err:?}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Handler panicked".to_string()
    }
}

/// Registration token returned by `answer`.
///
/// Dropping the handle leaves the handler registered; call `deregister`.
pub struct AnswerHandle<T: Transport> {
    engine: Weak<EngineInner<T>>,
    channel: String,
    generation: u64,
    active: AtomicBool,
}

impl<T: Transport> AnswerHandle<T> {
    /// Remove this registration. Idempotent: only the first call can return
    /// true, and a newer handler on the same channel is left untouched.
    pub fn deregister(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.engine
            .upgrade()
            .is_some_and(|engine| engine.deregister(&self.channel, self.generation))
    }

    /// True while this registration is the one answering its channel.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
            && self.engine.upgrade().is_some_and(|engine| {
                engine.handlers.generation(&self.channel) == Some(self.generation)
            })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl<T: Transport> fmt::Debug for AnswerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerHandle")
            .field("channel", &self.channel)
            .field("generation", &self.generation)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

/// Token returned by `on_notify`.
pub struct ListenerHandle<T: Transport> {
    engine: Weak<EngineInner<T>>,
    sub_channel: String,
    id: ListenerId,
    active: AtomicBool,
}

impl<T: Transport> ListenerHandle<T> {
    /// Stop listening. Idempotent.
    pub fn remove(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.engine
            .upgrade()
            .is_some_and(|engine| engine.transport.off(&self.sub_channel, self.id))
    }
}

impl<T: Transport> fmt::Debug for ListenerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("sub_channel", &self.sub_channel)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}
