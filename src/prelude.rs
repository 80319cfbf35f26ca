pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use tokio::sync::{broadcast, watch};

pub use crate::{
    channels::Channels,
    config::{self, Config, ConfigWrapper},
    coordinator::{self, Coordinator, PacketStats},
    ecoflow::{
        self,
        packet::{DecodedPayload, MessageKind, Parser},
        report::{BatteryPack, EmsHeartbeat, EnergyStream, MpptString, PhaseReading},
    },
    mqtt,
    options::Options,
    sensor,
    snapshot::{DeviceState, SnapshotStore},
};
