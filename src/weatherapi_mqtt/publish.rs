// weatherapi_mqtt - Relay weatherapi.com conditions to MQTT
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::error::Error;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("unable to queue message for {topic}: {source}")]
    Queue {
        topic: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Best-effort, fire-and-forget delivery of a payload to a topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Connection settings for the MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
}

impl MqttSettings {
    const KEEP_ALIVE: Duration = Duration::from_secs(30);

    fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.client_id, &self.host, self.port);
        opts.set_keep_alive(Self::KEEP_ALIVE);
        if let Some((username, password)) = &self.credentials {
            opts.set_credentials(username, password);
        }

        opts
    }
}

/// Publisher backed by an MQTT connection.
///
/// Messages are sent at QoS 0 without the retain flag. The connection itself is driven
/// by a background task that reconnects to the broker after errors.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    const REQUEST_CAPACITY: usize = 10;
    const RECONNECT_DELAY: Duration = Duration::from_secs(5);

    /// Create a publisher and spawn the task driving its connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(settings: &MqttSettings) -> (Self, JoinHandle<()>) {
        let (client, mut eventloop) = AsyncClient::new(settings.options(), Self::REQUEST_CAPACITY);
        let host = settings.host.clone();
        let port = settings.port;

        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        tracing::info!(message = "connected to broker", host = %host, port = port, code = ?ack.code);
                    }
                    Ok(event) => {
                        tracing::trace!(message = "broker event", event = ?event);
                    }
                    Err(e) => {
                        tracing::warn!(message = "broker connection error", host = %host, port = port, error = %e);
                        tokio::time::sleep(Self::RECONNECT_DELAY).await;
                    }
                }
            }
        });

        (MqttPublisher { client }, handle)
    }

    /// Ask the broker connection to close after queued messages are sent.
    ///
    /// Never waits: when the request queue is full, because the broker has been
    /// unreachable, the disconnect is skipped and the connection is simply dropped.
    pub fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            tracing::warn!(message = "unable to disconnect from broker", error = %e);
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        // try_publish never waits on a full request queue, the message is dropped instead.
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| PublishError::Queue {
                topic: topic.to_owned(),
                source: Box::new(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{MqttPublisher, MqttSettings, Publisher, PublishError};

    fn settings() -> MqttSettings {
        MqttSettings {
            host: "127.0.0.1".to_owned(),
            // Nothing listens here, the event loop just keeps failing to connect.
            port: 1,
            client_id: "weatherapi_mqtt_test".to_owned(),
            credentials: Some(("user".to_owned(), "pass".to_owned())),
        }
    }

    #[test]
    fn test_options() {
        let opts = settings().options();
        assert_eq!("weatherapi_mqtt_test", opts.client_id());
        assert_eq!(("127.0.0.1".to_owned(), 1), opts.broker_address());
        assert_eq!(MqttSettings::KEEP_ALIVE, opts.keep_alive());
        assert!(opts.credentials().is_some());
    }

    #[tokio::test]
    async fn test_publish_is_queued_without_broker() {
        let (publisher, handle) = MqttPublisher::connect(&settings());
        let res = publisher.publish("weatherapi/out", b"{}".to_vec()).await;
        handle.abort();

        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn test_publish_without_event_loop_is_an_error() {
        let (publisher, handle) = MqttPublisher::connect(&settings());
        handle.abort();
        let _ = handle.await;

        let res = publisher.publish("weatherapi/out", b"{}".to_vec()).await;
        assert!(matches!(res, Err(PublishError::Queue { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_with_full_queue_returns() {
        let (publisher, handle) = MqttPublisher::connect(&settings());

        // Without a broker nothing drains the request queue.
        for _ in 0..MqttPublisher::REQUEST_CAPACITY {
            publisher.publish("weatherapi/out", b"{}".to_vec()).await.unwrap();
        }
        let res = publisher.publish("weatherapi/out", b"{}".to_vec()).await;
        assert!(matches!(res, Err(PublishError::Queue { .. })));

        publisher.disconnect();
        handle.abort();
    }
}
