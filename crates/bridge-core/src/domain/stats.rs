//! Engine counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by one correlation engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Calls handed to the transport
    pub calls_issued: AtomicU64,
    /// Replies matched to a pending call
    pub replies_matched: AtomicU64,
    /// Replies whose id was not pending
    pub replies_unmatched: AtomicU64,
    /// Replies that arrived after the caller stopped waiting
    pub calls_abandoned: AtomicU64,
    /// Calls the transport refused to deliver
    pub send_failures: AtomicU64,
    /// Incoming calls answered with a value
    pub requests_answered: AtomicU64,
    /// Incoming calls answered with an error (including panics)
    pub handler_failures: AtomicU64,
}

/// Point-in-time copy of `EngineStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub calls_issued: u64,
    pub replies_matched: u64,
    pub replies_unmatched: u64,
    pub calls_abandoned: u64,
    pub send_failures: u64,
    pub requests_answered: u64,
    pub handler_failures: u64,
}

impl EngineStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls_issued: self.calls_issued.load(Ordering::Relaxed),
            replies_matched: self.replies_matched.load(Ordering::Relaxed),
            replies_unmatched: self.replies_unmatched.load(Ordering::Relaxed),
            calls_abandoned: self.calls_abandoned.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            requests_answered: self.requests_answered.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}
