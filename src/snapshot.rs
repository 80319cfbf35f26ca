use crate::prelude::*;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Everything currently known about the device.
///
/// Values are only ever replaced by newer decodes of the same thing; an
/// update that omits something keeps what was there before.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeviceState {
    pub battery_packs: BTreeMap<i64, BatteryPack>,
    pub energy_stream: Option<EnergyStream>,
    pub heartbeat: Option<EmsHeartbeat>,
}

impl DeviceState {
    pub fn merged(&self, update: DecodedPayload) -> Self {
        let mut battery_packs = self.battery_packs.clone();
        for pack in update.battery_packs {
            battery_packs.insert(pack.pack_index, pack);
        }

        Self {
            battery_packs,
            energy_stream: update.energy_stream.or_else(|| self.energy_stream.clone()),
            heartbeat: update.heartbeat.or_else(|| self.heartbeat.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.battery_packs.is_empty() && self.energy_stream.is_none() && self.heartbeat.is_none()
    }

    pub fn battery_pack(&self, index: i64) -> Option<&BatteryPack> {
        self.battery_packs.get(&index)
    }
}

/// Holds the published `DeviceState` and swaps in merged copies.
///
/// Readers take a handle with `current()` and never wait on a merge; they see
/// either the previous or the next state, never a mix. `merge_lock` only
/// serialises writers.
pub struct SnapshotStore {
    merge_lock: Mutex<()>,
    tx: watch::Sender<Arc<DeviceState>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(DeviceState::default()));

        Self {
            merge_lock: Mutex::new(()),
            tx,
        }
    }

    pub fn current(&self) -> Arc<DeviceState> {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every published state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DeviceState>> {
        self.tx.subscribe()
    }

    /// Folds `update` into the current state and publishes the result.
    ///
    /// Returns `None` without publishing when the update carries nothing.
    pub fn apply(&self, update: DecodedPayload) -> Option<Arc<DeviceState>> {
        if update.is_empty() {
            return None;
        }

        let _guard = self.merge_lock.lock().unwrap_or_else(|e| e.into_inner());

        let previous = self.current();
        let next = Arc::new(previous.merged(update));
        self.tx.send_replace(next.clone());

        Some(next)
    }
}
