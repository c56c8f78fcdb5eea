//! MQTT broker connection and subscription routing.

use crate::commands::CommandDispatcher;
use crate::config::MqttConfig;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Build the MQTT client from configuration.
///
/// Credentials come from the config file or the `MQTT_USER`/`MQTT_PASS`
/// environment variables; without both the connection is anonymous.
pub fn build_client(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);

    if let Some((username, password)) = config.credentials() {
        options.set_credentials(username, password);
    }

    AsyncClient::new(options, 16)
}

/// Drive the MQTT event loop forever.
///
/// - On connection acknowledgement, every command topic is (re)subscribed,
///   since subscriptions do not survive a connection reset.
/// - Inbound publishes are routed to the command dispatcher.
/// - On connection errors the loop sleeps the current backoff, doubles it up
///   to the configured maximum, and polls again; a successful connection
///   resets the backoff to its minimum.
pub async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    dispatcher: CommandDispatcher,
    config: MqttConfig,
) {
    let min_backoff = Duration::from_secs(config.reconnect_min_secs);
    let max_backoff = Duration::from_secs(config.reconnect_max_secs);
    let mut backoff = min_backoff;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker {}:{}", config.host, config.port);
                backoff = min_backoff;

                for topic in dispatcher.topics() {
                    if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
                        warn!("Failed to subscribe to '{}': {}", topic, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatcher.handle(&publish.topic, &publish.payload).await;
            }
            Ok(event) => {
                debug!("MQTT event: {:?}", event);
            }
            Err(e) => {
                warn!(
                    "MQTT connection error: {}; reconnecting in {:?}",
                    e, backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_clamps() {
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        let mut backoff = min;
        let mut observed = Vec::new();

        for _ in 0..8 {
            observed.push(backoff);
            backoff = (backoff * 2).min(max);
        }

        assert_eq!(
            observed,
            [1u64, 2, 4, 8, 16, 32, 60, 60]
                .into_iter()
                .map(Duration::from_secs)
                .collect::<Vec<_>>()
        );
    }
}
