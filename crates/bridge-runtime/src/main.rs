//! # IPC Bridge Demo
//!
//! Runs a hub and `BRIDGE_SPOKES` spokes in one process and exercises the
//! bridge end to end. See `bridge_runtime` for the flow.

use anyhow::Result;
use bridge_runtime::{BridgeRuntime, RuntimeConfig};
use bridge_telemetry::{init_logging, TelemetryConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::for_process("runtime");
    let _logging = init_logging(&telemetry)?;

    let config = RuntimeConfig::from_env();
    info!(?config, "Configuration loaded");

    let runtime = BridgeRuntime::new(config);
    runtime.start()?;

    tokio::select! {
        report = runtime.run_demo() => {
            let report = report?;
            info!(
                answered = report.calls_answered,
                handler_errors = report.handler_errors,
                broadcasts = report.broadcasts_delivered,
                "Demo complete"
            );
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("Interrupted, stopping before the demo finished");
        }
    }

    runtime.shutdown();
    Ok(())
}
