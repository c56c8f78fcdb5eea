//! Configuration for the DVI bridge.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Serial line to the heat-pump controller
    pub serial: SerialConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host (default: "127.0.0.1")
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port (default: 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Username; falls back to the `MQTT_USER` environment variable
    #[serde(default)]
    pub username: Option<String>,

    /// Password; falls back to the `MQTT_PASS` environment variable
    #[serde(default)]
    pub password: Option<String>,

    /// Client identifier (default: "mqtt-bridge-dvi")
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds (default: 30)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Minimum reconnect backoff in seconds (default: 1)
    #[serde(default = "default_reconnect_min")]
    pub reconnect_min_secs: u64,

    /// Maximum reconnect backoff in seconds (default: 60)
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            reconnect_min_secs: default_reconnect_min(),
            reconnect_max_secs: default_reconnect_max(),
        }
    }
}

impl MqttConfig {
    /// Resolve broker credentials from the config file or the environment.
    ///
    /// Returns `None` when neither source provides both a username and a
    /// password, in which case the connection is made anonymously.
    pub fn credentials(&self) -> Option<(String, String)> {
        let username = self
            .username
            .clone()
            .or_else(|| std::env::var("MQTT_USER").ok())?;
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("MQTT_PASS").ok())?;
        Some((username, password))
    }
}

fn default_mqtt_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "mqtt-bridge-dvi".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_reconnect_min() -> u64 {
    1
}

fn default_reconnect_max() -> u64 {
    60
}

/// Serial (Modbus RTU) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0")
    pub port: String,

    /// Modbus unit/slave ID (default: 0x10)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,

    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// Per-transaction timeout in milliseconds (default: 2000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_unit_id() -> u8 {
    0x10
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port path cannot be empty".to_string(),
            ));
        }

        if self.serial.unit_id == 0 || self.serial.unit_id > 247 {
            return Err(ConfigError::Validation(format!(
                "unit_id {} out of range (1-247)",
                self.serial.unit_id
            )));
        }

        match self.serial.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "invalid parity '{}' (use none, even, or odd)",
                    other
                )));
            }
        }

        if self.mqtt.reconnect_min_secs == 0
            || self.mqtt.reconnect_min_secs > self.mqtt.reconnect_max_secs
        {
            return Err(ConfigError::Validation(format!(
                "invalid reconnect backoff bounds {}..{}",
                self.mqtt.reconnect_min_secs, self.mqtt.reconnect_max_secs
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{
            serial: { port: "/dev/ttyUSB0" }
        }"#;

        let config: BridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.unit_id, 0x10);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.parity, "none");
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.serial.timeout_ms, 2000);
        assert_eq!(config.mqtt.host, "127.0.0.1");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            mqtt: {
                host: "broker.local",
                port: 8883,
                username: "bridge",
                password: "secret",
                reconnect_min_secs: 2,
                reconnect_max_secs: 120,
            },
            serial: {
                port: "/dev/serial/by-id/usb-heatpump",
                unit_id: 16,
                baud_rate: 19200,
                parity: "even",
            },
            logging: { level: "debug" }
        }"#;

        let config: BridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(
            config.mqtt.credentials(),
            Some(("bridge".to_string(), "secret".to_string()))
        );
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_empty_port() {
        let json = r#"{ serial: { port: "" } }"#;
        let config: BridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_parity() {
        let json = r#"{ serial: { port: "/dev/ttyUSB0", parity: "mark" } }"#;
        let config: BridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unit_id_range() {
        let json = r#"{ serial: { port: "/dev/ttyUSB0", unit_id: 0 } }"#;
        let config: BridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let json = r#"{
            mqtt: { reconnect_min_secs: 90, reconnect_max_secs: 60 },
            serial: { port: "/dev/ttyUSB0" }
        }"#;
        let config: BridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }
}
