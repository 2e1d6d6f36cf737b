//! Engine-owned state: pending calls, answering handlers, counters.

pub mod error;
pub mod handlers;
pub mod pending;
pub mod stats;

pub use error::CallError;
pub use handlers::{ErasedHandler, HandlerRegistry};
pub use pending::{AbandonOnDrop, CallOutcome, PendingCallStore};
pub use stats::{EngineStats, StatsSnapshot};
