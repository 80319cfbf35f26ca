use crate::prelude::*;

use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, Transport};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    Payload(Bytes), // raw envelope as published by the device
    Shutdown,
}

pub fn property_topic(serial: &str) -> String {
    format!("/app/device/property/{}", serial)
}

pub fn get_topic(user_id: &str, serial: &str) -> String {
    format!("/app/{}/{}/thing/property/get", user_id, serial)
}

pub fn get_request_payload() -> Result<String> {
    Ok(serde_json::to_string(&json!({
        "version": "1.0",
        "moduleType": 0,
        "operateType": "get",
        "params": {},
    }))?)
}

/// Connection to the EcoFlow cloud broker. Inbound property messages are
/// forwarded untouched on `from_device`; decoding happens in the coordinator.
#[derive(Clone)]
pub struct Cloud {
    config: ConfigWrapper,
    channels: Channels,
}

impl Cloud {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self { config, channels }
    }

    pub async fn start(&self) -> Result<()> {
        let c = self.config.ecoflow();
        let device = self.config.device();

        let mut options = MqttOptions::new(c.client_id(&device), c.host(), c.port());
        options.set_keep_alive(Duration::from_secs(c.keepalive_secs()));
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }
        if c.tls() {
            options.set_transport(Transport::tls_with_default_config());
        }

        info!("connecting to ecoflow broker at {}:{}", c.host(), c.port());

        let (client, eventloop) = AsyncClient::new(options, 10);

        tokio::select! {
            res = self.receiver(eventloop, client.clone()) => res?,
            res = self.sender(client) => res?,
        }

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_device.send(ChannelData::Shutdown);
    }

    async fn receiver(&self, mut eventloop: EventLoop, client: AsyncClient) -> Result<()> {
        let topic = property_topic(self.config.device().serial());
        let reconnect_delay = self.config.ecoflow().reconnect_delay_secs();

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("ecoflow broker connected, subscribing to {}", topic);
                    // subscriptions don't survive a reconnect
                    if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                        error!("subscribe to {} failed: {}", topic, e);
                    }
                    if self.config.ecoflow().request_on_connect() {
                        self.request_data(&client);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    if publish.topic != topic {
                        trace!("ignoring message on {}", publish.topic);
                        continue;
                    }
                    debug!("RX: {} bytes on {}", publish.payload.len(), publish.topic);
                    // nobody listening is fine; the next message supersedes this one
                    let _ = self.channels.from_device.send(ChannelData::Payload(publish.payload));
                }
                Err(e) => {
                    warn!("ecoflow broker connection lost: {}", e);
                    info!("reconnecting in {}s", reconnect_delay);
                    tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
                }
                _ => {} // keepalives etc
            }
        }
    }

    async fn sender(&self, client: AsyncClient) -> Result<()> {
        let mut receiver = self.channels.to_device.subscribe();
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.ecoflow().request_interval_secs()));
        interval.tick().await; // first tick is immediate; connect already asks

        loop {
            tokio::select! {
                _ = interval.tick() => self.request_data(&client),
                msg = receiver.recv() => match msg {
                    Ok(ChannelData::Shutdown) => {
                        info!("ecoflow sender received shutdown signal");
                        let _ = client.try_disconnect();
                        break;
                    }
                    Ok(ChannelData::Payload(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("ecoflow sender lagged, {} messages dropped", n);
                    }
                    Err(e) => bail!("to_device channel: {}", e),
                },
            }
        }

        Ok(())
    }

    fn request_data(&self, client: &AsyncClient) {
        let device = self.config.device();
        let topic = get_topic(device.user_id(), device.serial());

        let payload = match get_request_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("building GET request: {}", e);
                return;
            }
        };

        match client.try_publish(topic.clone(), QoS::AtLeastOnce, false, payload) {
            Ok(_) => debug!("GET request sent to {}", topic),
            Err(e) => warn!("GET request to {} failed: {}", topic, e),
        }
    }
}
