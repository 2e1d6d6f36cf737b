//! Runtime configuration from environment variables.

use std::env;
use tracing::warn;

/// Shape of the demo topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of spokes attached to the hub
    pub spokes: usize,
    /// How many times the demo exchange is repeated
    pub demo_rounds: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            spokes: 3,
            demo_rounds: 1,
        }
    }
}

impl RuntimeConfig {
    /// - `BRIDGE_SPOKES`: spoke count, at least 1 (default: 3)
    /// - `BRIDGE_DEMO_ROUNDS`: rounds (default: 1)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("BRIDGE_SPOKES") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.spokes = n,
                _ => warn!(value = %raw, "BRIDGE_SPOKES must be a positive integer, using default"),
            }
        }
        if let Some(raw) = lookup("BRIDGE_DEMO_ROUNDS") {
            match raw.parse() {
                Ok(n) => config.demo_rounds = n,
                Err(_) => warn!(value = %raw, "BRIDGE_DEMO_ROUNDS is not a number, using default"),
            }
        }

        config
    }
}
