//! Handler registry: at most one answering handler per logical channel.
//!
//! Registrations are stamped with a generation so a stale `AnswerHandle`
//! cannot remove a handler that replaced the one it was issued for.

use bridge_bus::ListenerId;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A handler with its payload types erased. Every handler, sync or async,
/// is normalised into this shape at registration time.
pub type ErasedHandler<P> = Arc<dyn Fn(Value, P) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

struct HandlerSlot<P> {
    generation: u64,
    handler: ErasedHandler<P>,
    /// Transport listener on the channel's request sub-channel
    listener: ListenerId,
}

/// Outcome of `HandlerRegistry::install`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Installed {
    pub generation: u64,
    /// True when an earlier handler on the same channel was overwritten
    pub replaced: bool,
}

pub struct HandlerRegistry<P> {
    slots: Mutex<HashMap<String, HandlerSlot<P>>>,
    next_generation: AtomicU64,
}

impl<P> HandlerRegistry<P> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Install `handler` on `channel`, last write wins.
    ///
    /// `listen` is only invoked when the channel had no handler yet; a
    /// replacement reuses the existing transport listener.
    pub fn install(
        &self,
        channel: &str,
        handler: ErasedHandler<P>,
        listen: impl FnOnce() -> ListenerId,
    ) -> Installed {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.lock();

        if let Some(slot) = slots.get_mut(channel) {
            slot.generation = generation;
            slot.handler = handler;
            return Installed {
                generation,
                replaced: true,
            };
        }

        slots.insert(
            channel.to_string(),
            HandlerSlot {
                generation,
                handler,
                listener: listen(),
            },
        );
        Installed {
            generation,
            replaced: false,
        }
    }

    /// Current handler for `channel`.
    pub fn lookup(&self, channel: &str) -> Option<ErasedHandler<P>> {
        self.slots.lock().get(channel).map(|slot| slot.handler.clone())
    }

    /// Remove the handler on `channel` only if it is still `generation`.
    /// Returns its transport listener so the caller can detach it.
    pub fn remove_generation(&self, channel: &str, generation: u64) -> Option<ListenerId> {
        let mut slots = self.slots.lock();
        match slots.get(channel) {
            Some(slot) if slot.generation == generation => {
                slots.remove(channel).map(|slot| slot.listener)
            }
            _ => None,
        }
    }

    /// Remove whatever handler is on `channel`.
    pub fn remove(&self, channel: &str) -> Option<ListenerId> {
        self.slots.lock().remove(channel).map(|slot| slot.listener)
    }

    /// Remove every handler, returning `(channel, listener)` pairs.
    pub fn drain(&self) -> Vec<(String, ListenerId)> {
        self.slots
            .lock()
            .drain()
            .map(|(channel, slot)| (channel, slot.listener))
            .collect()
    }

    /// Generation of the handler currently on `channel`.
    pub fn generation(&self, channel: &str) -> Option<u64> {
        self.slots.lock().get(channel).map(|slot| slot.generation)
    }

    pub fn is_registered(&self, channel: &str) -> bool {
        self.slots.lock().contains_key(channel)
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.slots.lock().keys().cloned().collect();
        channels.sort();
        channels
    }
}

impl<P> Default for HandlerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}
