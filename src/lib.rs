//! MQTT bridge for the DVI LV12 heat pump.
//!
//! The bridge polls the heat-pump controller over Modbus RTU and publishes the
//! merged device state as a single JSON snapshot to `dvi/measurement`. Inbound
//! messages on `dvi/command/*` topics are translated into register writes.
//!
//! # Snapshot payload
//!
//! ```text
//! {
//!   "coils":           { "<label>": 0|1, ... },
//!   "input_registers": { "<label>": <number>, ... },
//!   "write_registers": { "<label>": <number>, ... }
//! }
//! ```
//!
//! Labels are sorted ascending within each object, and the snapshot is only
//! published when it differs from the previously published one.

pub mod bus;
pub mod commands;
pub mod config;
pub mod mqtt;
pub mod poller;
pub mod protocol;
pub mod publisher;
pub mod schema;
pub mod state;

use config::LoggingConfig;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}
