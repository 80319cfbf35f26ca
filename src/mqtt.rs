use crate::prelude::*;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use std::sync::{Arc, Mutex};

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    /// Messages describing one published state. Topics are relative to the
    /// namespace.
    pub fn for_snapshot(
        serial: &str,
        state: &DeviceState,
        publish_individual: bool,
    ) -> Result<Vec<Message>> {
        let mut r = Vec::new();
        let readings = sensor::collect(state);

        let mut values = serde_json::Map::new();
        for reading in &readings {
            values.insert(reading.key.clone(), serde_json::to_value(reading.value)?);
        }

        r.push(Message {
            topic: format!("{}/state", serial),
            retain: false,
            payload: serde_json::to_string(&values)?,
        });

        if publish_individual {
            for reading in &readings {
                r.push(Message {
                    topic: format!("{}/sensor/{}", serial, reading.key),
                    retain: false,
                    payload: serde_json::to_string(&reading.value)?,
                });
            }
        }

        r.push(Message {
            topic: format!("{}/snapshot", serial),
            retain: false,
            payload: serde_json::to_string(state)?,
        });

        Ok(r)
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<PacketStats>>,
}

impl Mqtt {
    pub fn new(config: ConfigWrapper, channels: Channels, shared_stats: Arc<Mutex<PacketStats>>) -> Self {
        Self {
            config,
            channels,
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let c = self.config.mqtt();

        if !c.enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let mut options = MqttOptions::new(
            format!("powerocean-bridge-{}", self.config.device().serial()),
            c.host(),
            c.port(),
        );

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, eventloop) = AsyncClient::new(options, 10);

        // the sender ends on Shutdown; the eventloop poller has nothing to
        // drain after that
        tokio::select! {
            res = async {
                futures::try_join!(self.setup(client.clone()), self.sender(client))
            } => { res?; }
            res = self.receiver(eventloop) => { res?; }
        }

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    async fn setup(&self, client: AsyncClient) -> Result<()> {
        client
            .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")
            .await?;

        Ok(())
    }

    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Err(e) => {
                    error!("{}", e);
                    info!("reconnecting in 5s");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
                _ => {} // keepalives etc
            }
        }
    }

    async fn sender(&self, client: AsyncClient) -> Result<()> {
        let mut receiver = self.channels.to_mqtt.subscribe();
        let namespace = self.config.mqtt().namespace().to_string();

        loop {
            let message = match receiver.recv().await {
                Ok(ChannelData::Message(message)) => message,
                Ok(ChannelData::Shutdown) => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client.try_disconnect();
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("mqtt sender lagged, {} messages dropped", n);
                    continue;
                }
                Err(e) => bail!("to_mqtt channel: {}", e),
            };

            let topic = format!("{}/{}", namespace, message.topic);
            debug!("publishing: {} = {}", topic, message.payload);

            match client
                .publish(&topic, QoS::AtLeastOnce, message.retain, message.payload.into_bytes())
                .await
            {
                Ok(_) => {
                    if let Ok(mut stats) = self.shared_stats.lock() {
                        stats.mqtt_messages_sent += 1;
                    }
                }
                Err(err) => {
                    error!("MQTT publish to {} failed: {:?}", topic, err);
                    if let Ok(mut stats) = self.shared_stats.lock() {
                        stats.mqtt_errors += 1;
                    }
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}
