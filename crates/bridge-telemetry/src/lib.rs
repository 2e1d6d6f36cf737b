//! # Bridge Telemetry
//!
//! Structured logging for every process that hosts a bridge endpoint.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BRIDGE_SERVICE_NAME` | `ipc-bridge` | Service name attached to startup logs |
//! | `BRIDGE_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `BRIDGE_JSON_LOGS` | `false` | JSON formatted output |
//! | `BRIDGE_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging, LoggingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter `{filter}`: {reason}")]
    Filter { filter: String, reason: String },

    #[error("Failed to install global subscriber: {0}")]
    SubscriberInit(String),
}
