//! Inbound command handling.
//!
//! Each entry in the schema's command map is one subscribed topic. Payloads
//! are ASCII decimal integers; the parsed value is multiplied by the entry's
//! scale and written to the mapped register through the serialized bus.
//! Writes are at-most-once per message: failures are logged and swallowed,
//! never retried.

use crate::bus::SerialBus;
use crate::protocol;
use crate::schema::RegisterSchema;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// A resolved register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandWrite {
    pub address: u16,
    pub value: u16,
}

/// Errors raised while resolving a command payload.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("payload {0:?} is not an integer")]
    Parse(String),
    #[error("value {value} overflows register range with scale {scale}")]
    Range { value: u16, scale: u16 },
}

/// Resolve an inbound message into a register write.
///
/// Returns `Ok(None)` for unmapped topics: unknown channels are expected
/// background noise on a shared bus, not an error.
pub fn resolve(
    schema: &RegisterSchema,
    topic: &str,
    payload: &[u8],
) -> Result<Option<CommandWrite>, CommandError> {
    let Some(command) = schema.command(topic) else {
        return Ok(None);
    };

    let text = String::from_utf8_lossy(payload);
    let text = text.trim();
    let value: u16 = text
        .parse()
        .map_err(|_| CommandError::Parse(text.to_string()))?;
    let scaled = value
        .checked_mul(command.scale)
        .ok_or(CommandError::Range {
            value,
            scale: command.scale,
        })?;

    Ok(Some(CommandWrite {
        address: command.address,
        value: scaled,
    }))
}

/// Turns subscribed messages into serialized register writes.
pub struct CommandDispatcher {
    schema: Arc<RegisterSchema>,
    bus: Arc<SerialBus>,
}

impl CommandDispatcher {
    pub fn new(schema: Arc<RegisterSchema>, bus: Arc<SerialBus>) -> Self {
        Self { schema, bus }
    }

    /// Topics this dispatcher wants subscribed.
    pub fn topics(&self) -> Vec<&'static str> {
        self.schema.command_topics().collect()
    }

    /// Handle one inbound message. Never fails: bad payloads and write
    /// errors are logged and dropped.
    pub async fn handle(&self, topic: &str, payload: &[u8]) {
        match resolve(&self.schema, topic, payload) {
            Ok(None) => {
                trace!("Ignoring message on unmapped topic '{}'", topic);
            }
            Err(e) => {
                warn!("Dropping command on '{}': {}", topic, e);
            }
            Ok(Some(write)) => {
                match protocol::write_register(&self.bus, write.address, write.value).await {
                    Ok(()) => {
                        info!(
                            "Wrote {} to register {:#06x} (topic '{}')",
                            write.value, write.address, topic
                        );
                    }
                    Err(e) => {
                        warn!(
                            "Write to register {:#06x} failed (topic '{}'): {}",
                            write.address, topic, e
                        );
                    }
                }
            }
        }
    }
}
