//! Bridge Core - call/answer correlation over a one-way transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐      ┌──────────────────────────────────────┐
//! │            HUB (main)                │      │          SPOKE (renderer)            │
//! │  ┌────────────────────────────────┐  │      │  ┌────────────────────────────────┐  │
//! │  │ MainIpc                        │  │      │  │ RendererIpc                    │  │
//! │  │  call_renderer / focused       │  │      │  │  call_main / answer_main       │  │
//! │  │  answer_renderer / broadcast   │  │      │  │  on_broadcast / send_to_main   │  │
//! │  └──────────────┬─────────────────┘  │      │  └──────────────┬─────────────────┘  │
//! │  ┌──────────────┴─────────────────┐  │      │  ┌──────────────┴─────────────────┐  │
//! │  │ CorrelationEngine              │  │      │  │ CorrelationEngine              │  │
//! │  │  PendingCallStore (by CallId)  │  │      │  │  PendingCallStore (by CallId)  │  │
//! │  │  HandlerRegistry (by channel)  │  │      │  │  HandlerRegistry (by channel)  │  │
//! │  └──────────────┬─────────────────┘  │      │  └──────────────┬─────────────────┘  │
//! └─────────────────┼────────────────────┘      └─────────────────┼────────────────────┘
//!                   │   <ch>#request / <ch>#reply / <ch>#notify     │
//!                   └──────────────── Transport ───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bridge_bus::LocalBus;
//! use bridge_core::{MainIpc, RendererIpc};
//!
//! let bus = LocalBus::new();
//! let main = MainIpc::new(bus.hub_endpoint());
//! let renderer = RendererIpc::new(bus.add_spoke());
//!
//! renderer.answer_main_sync("sum", |(a, b): (i64, i64)| Ok(a + b))?;
//! let total: i64 = main.call_renderer(&peer, "sum", (2, 3)).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod engine;
pub mod main_ipc;
pub mod renderer_ipc;

pub use bridge_bus::{HubRef, PeerId};
pub use domain::{CallError, StatsSnapshot};
pub use engine::{AnswerHandle, CorrelationEngine, ListenerHandle};
pub use main_ipc::MainIpc;
pub use renderer_ipc::RendererIpc;
