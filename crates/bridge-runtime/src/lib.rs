//! # Bridge Runtime
//!
//! Wires one hub and several spokes over `LocalBus` and drives a demo
//! exchange through every bridge operation.
//!
//! ## Demo Flow (per round)
//!
//! ```text
//! renderers ──main:sum──────────▶ main        (spoke → hub calls, concurrent)
//! main ──────renderer:describe──▶ renderers   (hub → each spoke)
//! main ──────renderer:render────▶ renderers   (replies arrive out of order)
//! main ──────renderer:describe──▶ focused     (focused-peer resolution)
//! main ──────theme (broadcast)──▶ renderers   (one-way)
//! renderer ──main:reject────────▶ main        (handler failure travels back)
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (from env)
//! 2. Create the bus, the hub endpoint, and N spoke endpoints
//! 3. Register handlers on both sides
//! 4. Run the demo rounds (or stop on Ctrl+C)
//! 5. Shut every engine down and log its counters

pub mod config;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use bridge_bus::{HubEndpoint, LocalBus, PeerId, SpokeEndpoint};
use bridge_core::{CallError, MainIpc, RendererIpc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use config::RuntimeConfig;

/// Reply of `renderer:describe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub peer: PeerId,
    pub title: String,
}

/// What a demo run observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    /// Calls that came back with a value
    pub calls_answered: u64,
    /// Calls that came back with the remote handler's error
    pub handler_errors: u64,
    /// Spokes that accepted a broadcast, summed over rounds
    pub broadcasts_delivered: u64,
}

struct Renderer {
    peer: PeerId,
    ipc: RendererIpc<SpokeEndpoint>,
    theme_updates: Arc<AtomicU64>,
}

/// One hub and its spokes, living in this process.
pub struct BridgeRuntime {
    bus: LocalBus,
    main: MainIpc<HubEndpoint>,
    renderers: Vec<Renderer>,
    config: RuntimeConfig,
}

impl BridgeRuntime {
    /// Build the topology. Must be called from within a Tokio runtime.
    pub fn new(config: RuntimeConfig) -> Self {
        info!(spokes = config.spokes, "Creating bridge runtime");

        let bus = LocalBus::new();
        let main = MainIpc::new(bus.hub_endpoint());
        let renderers = (0..config.spokes)
            .map(|_| {
                let endpoint = bus.add_spoke();
                Renderer {
                    peer: endpoint.id(),
                    ipc: RendererIpc::new(endpoint),
                    theme_updates: Arc::new(AtomicU64::new(0)),
                }
            })
            .collect();

        Self {
            bus,
            main,
            renderers,
            config,
        }
    }

    /// Register handlers and listeners on every endpoint.
    pub fn start(&self) -> Result<()> {
        self.main
            .answer_renderer_sync("main:sum", |numbers: Vec<i64>, peer: PeerId| {
                debug!(peer = %peer, count = numbers.len(), "Summing");
                Ok(numbers.iter().sum::<i64>())
            })?;
        self.main
            .answer_renderer_sync("main:reject", |reason: String, peer: PeerId| -> Result<()> {
                anyhow::bail!("{peer} asked to fail: {reason}")
            })?;

        for renderer in &self.renderers {
            let peer = renderer.peer;
            renderer.ipc.answer_main_sync("renderer:describe", move |_: ()| {
                Ok(WindowInfo {
                    peer,
                    title: format!("Window {}", peer.0),
                })
            })?;

            renderer.ipc.answer_main("renderer:render", move |markup: String| async move {
                // Higher peers answer sooner so replies come back reordered
                let delay = 20u64.saturating_sub(u64::from(peer.0) * 5);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(format!("<{peer}>{markup}</{peer}>"))
            })?;

            let updates = renderer.theme_updates.clone();
            renderer.ipc.on_broadcast("theme", move |theme: String| {
                updates.fetch_add(1, Ordering::Relaxed);
                debug!(peer = %peer, theme = %theme, "Theme applied");
            })?;
        }

        info!(renderers = self.renderers.len(), "Handlers registered");
        Ok(())
    }

    /// Run every configured round.
    pub async fn run_demo(&self) -> Result<DemoReport> {
        ensure!(!self.renderers.is_empty(), "demo needs at least one spoke");

        let mut report = DemoReport::default();
        for round in 0..self.config.demo_rounds {
            self.run_round(round, &mut report)
                .await
                .with_context(|| format!("demo round {round} failed"))?;
        }
        info!(?report, "Demo finished");
        Ok(report)
    }

    async fn run_round(&self, round: u32, report: &mut DemoReport) -> Result<()> {
        info!(round, "Starting demo round");

        // Spokes → hub, all at once
        let sums = self.renderers.iter().map(|renderer| {
            let numbers = vec![i64::from(round), i64::from(renderer.peer.0), 10];
            async move {
                let expected: i64 = numbers.iter().sum();
                let total: i64 = renderer.ipc.call_main("main:sum", numbers).await?;
                Ok::<_, CallError>((expected, total))
            }
        });
        for result in futures::future::join_all(sums).await {
            let (expected, total) = result?;
            ensure!(total == expected, "main:sum returned {total}, expected {expected}");
            report.calls_answered += 1;
        }

        // Hub → each spoke
        for renderer in &self.renderers {
            let info: WindowInfo = self
                .main
                .call_renderer(&renderer.peer, "renderer:describe", ())
                .await?;
            ensure!(info.peer == renderer.peer, "describe answered by the wrong peer");
            report.calls_answered += 1;
        }

        let renders = self.renderers.iter().map(|renderer| {
            self.main
                .call_renderer::<_, String>(&renderer.peer, "renderer:render", format!("round {round}"))
        });
        for (renderer, result) in self.renderers.iter().zip(futures::future::join_all(renders).await) {
            let html = result?;
            ensure!(
                html.starts_with(&format!("<{}>", renderer.peer)),
                "render reply crossed over: {html}"
            );
            report.calls_answered += 1;
        }

        // Focused spoke rotates each round
        let focused = &self.renderers[round as usize % self.renderers.len()];
        self.bus.focus(Some(focused.peer));
        let info: WindowInfo = self
            .main
            .call_focused_renderer("renderer:describe", ())
            .await?;
        ensure!(info.peer == focused.peer, "focused call reached {}", info.peer);
        report.calls_answered += 1;

        let delivered = self.main.send_to_renderers("theme", format!("theme-{round}"))?;
        report.broadcasts_delivered += delivered as u64;

        match self.renderers[0]
            .ipc
            .call_main::<_, ()>("main:reject", "demo")
            .await
        {
            Err(err) if err.is_handler_failure() => {
                debug!(error = %err, "Handler failure travelled back as expected");
                report.handler_errors += 1;
            }
            other => anyhow::bail!("main:reject should fail with a handler error, got {other:?}"),
        }

        Ok(())
    }

    /// Stop every engine and log its counters.
    pub fn shutdown(&self) {
        let abandoned = self.main.engine().shutdown();
        info!(abandoned, stats = ?self.main.engine().stats(), "Hub engine");
        for renderer in &self.renderers {
            let abandoned = renderer.ipc.engine().shutdown();
            info!(
                peer = %renderer.peer,
                abandoned,
                theme_updates = renderer.theme_updates.load(Ordering::Relaxed),
                stats = ?renderer.ipc.engine().stats(),
                "Spoke engine"
            );
        }
        info!("Shutdown complete");
    }

    pub fn main(&self) -> &MainIpc<HubEndpoint> {
        &self.main
    }
}
