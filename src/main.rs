//! MQTT bridge for the DVI LV12 heat pump.
//!
//! Polls the controller over Modbus RTU and publishes the merged state
//! snapshot to MQTT; translates inbound command messages into register
//! writes.

use anyhow::{Context, Result};
use clap::Parser;
use mqtt_bridge_dvi::bus::SerialBus;
use mqtt_bridge_dvi::commands::CommandDispatcher;
use mqtt_bridge_dvi::config::{BridgeConfig, LoggingConfig};
use mqtt_bridge_dvi::poller::BridgeEngine;
use mqtt_bridge_dvi::publisher::MeasurementPublisher;
use mqtt_bridge_dvi::schema::RegisterSchema;
use mqtt_bridge_dvi::{init_tracing, mqtt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// MQTT bridge for the DVI LV12 heat pump (Modbus RTU).
#[derive(Parser, Debug)]
#[command(name = "mqtt-bridge-dvi")]
#[command(about = "Polls a DVI LV12 heat pump and publishes to MQTT")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "dvi-bridge.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
    };
    init_tracing(&log_config)?;

    info!("Starting mqtt-bridge-dvi");
    info!("Loaded configuration from {:?}", args.config);

    let schema = Arc::new(RegisterSchema::dvi_lv12());

    let bus = Arc::new(
        SerialBus::open(&config.serial)
            .with_context(|| format!("Failed to open serial port '{}'", config.serial.port))?,
    );
    info!(
        "Opened serial port '{}' (unit {:#04x}, {} baud)",
        config.serial.port, config.serial.unit_id, config.serial.baud_rate
    );

    let (client, event_loop) = mqtt::build_client(&config.mqtt);

    let dispatcher = CommandDispatcher::new(schema.clone(), bus.clone());
    let mqtt_task = tokio::spawn(mqtt::run_event_loop(
        event_loop,
        client.clone(),
        dispatcher,
        config.mqtt.clone(),
    ));

    let publisher = MeasurementPublisher::new(client);
    let mut engine = BridgeEngine::new(schema, bus, publisher);

    tokio::select! {
        _ = engine.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    mqtt_task.abort();
    info!("Bridge stopped");

    Ok(())
}
