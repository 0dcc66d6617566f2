//! MQTT payload source.
//!
//! Wraps a `rumqttc` client subscribed to the station topic. Reconnection is
//! whatever the client library does when its event loop is polled again after
//! an error; the source only re-subscribes on every `ConnAck` so the
//! subscription survives a new session.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, info, trace};

use super::source::PayloadSource;
use crate::config::MqttConfig;
use crate::error::{AwsMonitorError, Result};

/// Subscription to the station topic on one broker
pub struct MqttSource {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    broker: String,
}

impl std::fmt::Debug for MqttSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSource")
            .field("broker", &self.broker)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl MqttSource {
    /// Create the client.
    ///
    /// No network traffic happens until [`PayloadSource::next_payload`] is
    /// first polled; the connection and subscription are made from there.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_s));

        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);

        Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            broker: format!("{}:{}", config.broker, config.port),
        }
    }

    /// Subscribed topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Broker address as `host:port`
    pub fn broker(&self) -> &str {
        &self.broker
    }
}

#[async_trait]
impl PayloadSource for MqttSource {
    async fn next_payload(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to {} ({:?}), subscribing to '{}'", self.broker, ack.code, self.topic);
                    self.client
                        .try_subscribe(self.topic.clone(), QoS::AtMostOnce)
                        .map_err(|e| AwsMonitorError::Mqtt(format!("subscribe to '{}' failed: {}", self.topic, e)))?;
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("Subscription to '{}' acknowledged", self.topic);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == self.topic {
                        return Ok(Some(publish.payload));
                    }
                    debug!("Ignoring message on unexpected topic '{}'", publish.topic);
                }
                Ok(event) => {
                    trace!("MQTT event: {:?}", event);
                }
                Err(e) => {
                    return Err(AwsMonitorError::Mqtt(format!("{}: {}", self.broker, e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MqttConfig {
        MqttConfig {
            broker: "localhost".to_string(),
            port: 1883,
            topic: "AWS@port".to_string(),
            client_id: "aws-monitor-test".to_string(),
            keep_alive_s: 60,
            channel_capacity: 10,
            reconnect_delay_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        let source = MqttSource::new(&config());

        assert_eq!(source.topic(), "AWS@port");
        assert_eq!(source.broker(), "localhost:1883");
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_transport_error() {
        let mut cfg = config();
        // Reserved port, nothing listens there
        cfg.port = 1;
        let mut source = MqttSource::new(&cfg);

        let result = source.next_payload().await;
        assert!(matches!(result, Err(AwsMonitorError::Mqtt(_))));
    }

    // Integration test - only runs against a live broker
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_receive_from_public_broker() {
        let mut cfg = config();
        cfg.broker = "mqtt-dashboard.com".to_string();
        let mut source = MqttSource::new(&cfg);

        match tokio::time::timeout(Duration::from_secs(30), source.next_payload()).await {
            Ok(Ok(Some(payload))) => println!("Received {} bytes", payload.len()),
            Ok(other) => println!("No payload: {:?}", other),
            Err(_) => println!("No station message within 30s (this is OK)"),
        }
    }
}
