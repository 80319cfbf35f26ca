use crate::prelude::*;

use crate::ecoflow::cloud::ChannelData;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct PacketStats {
    pub payloads_received: u64,
    pub payloads_dropped: u64,
    pub battery_headers: u64,
    pub energy_stream_headers: u64,
    pub heartbeat_headers: u64,
    pub unknown_headers: u64,
    pub snapshots_published: u64,
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
}

impl PacketStats {
    pub fn record(&mut self, decoded: &DecodedPayload) {
        self.payloads_received += 1;
        if decoded.is_empty() {
            self.payloads_dropped += 1;
        }

        for kind in &decoded.kinds {
            match kind {
                MessageKind::BatteryPackStatus => self.battery_headers += 1,
                MessageKind::EnergyStream => self.energy_stream_headers += 1,
                MessageKind::Heartbeat => self.heartbeat_headers += 1,
                MessageKind::Unknown { .. } => self.unknown_headers += 1,
            }
        }
    }

    pub fn print_summary(&self) {
        info!("Packet Statistics:");
        info!("  Payloads received: {}", self.payloads_received);
        info!("  Payloads with nothing usable: {}", self.payloads_dropped);
        info!("  Headers by type:");
        info!("    Battery pack status: {}", self.battery_headers);
        info!("    Energy stream: {}", self.energy_stream_headers);
        info!("    EMS heartbeat: {}", self.heartbeat_headers);
        info!("    Unknown: {}", self.unknown_headers);
        info!("  Snapshots published: {}", self.snapshots_published);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
    }
}

/// Decodes inbound payloads and folds them into the shared `SnapshotStore`.
#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    store: Arc<SnapshotStore>,
    pub shared_stats: Arc<Mutex<PacketStats>>,
}

impl Coordinator {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self {
            config,
            channels,
            store: Arc::new(SnapshotStore::new()),
            shared_stats: Arc::new(Mutex::new(PacketStats::default())),
        }
    }

    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    pub async fn start(&self) -> Result<()> {
        let mut receiver = self.channels.from_device.subscribe();

        loop {
            match receiver.recv().await {
                Ok(ChannelData::Payload(payload)) => {
                    self.process_payload(&payload);
                }
                Ok(ChannelData::Shutdown) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("coordinator lagged, {} payloads dropped", n);
                }
                Err(e) => bail!("from_device channel: {}", e),
            }
        }

        info!("coordinator loop exiting");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.from_device.send(ChannelData::Shutdown);
    }

    /// Decodes and merges one payload; returns the newly published state, or
    /// `None` when the payload carried nothing recognisable.
    pub fn process_payload(&self, raw: &[u8]) -> Option<Arc<DeviceState>> {
        let decoded = Parser::parse(raw);

        if let Ok(mut stats) = self.shared_stats.lock() {
            stats.record(&decoded);
        }

        let state = self.store.apply(decoded)?;

        if let Ok(mut stats) = self.shared_stats.lock() {
            stats.snapshots_published += 1;
        }
        debug!(
            "state updated: {} packs, energy stream {}, heartbeat {}",
            state.battery_packs.len(),
            state.energy_stream.is_some(),
            state.heartbeat.is_some()
        );

        if let Err(e) = self.publish(&state) {
            warn!("failed to hand state to mqtt: {}", e);
        }

        Some(state)
    }

    // posts to the publisher's channel; never waits on it
    fn publish(&self, state: &DeviceState) -> Result<()> {
        let mqtt_config = self.config.mqtt();
        if !mqtt_config.enabled() {
            return Ok(());
        }

        let serial = self.config.device().serial().to_string();
        for message in mqtt::Message::for_snapshot(&serial, state, mqtt_config.publish_individual())? {
            // no receiver just means the publisher isn't running
            let _ = self.channels.to_mqtt.send(mqtt::ChannelData::Message(message));
        }

        Ok(())
    }
}
