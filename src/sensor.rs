use crate::prelude::*;

use serde::Serialize;

pub const WATT: &str = "W";
pub const WATT_HOUR: &str = "Wh";
pub const VOLT: &str = "V";
pub const AMPERE: &str = "A";
pub const HERTZ: &str = "Hz";
pub const CELSIUS: &str = "°C";
pub const PERCENT: &str = "%";

/// One named metric and how to pull it out of a record.
pub struct SensorDescription<T: 'static> {
    pub key: &'static str,
    pub unit: Option<&'static str>,
    pub value_fn: fn(&T) -> Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    pub key: String,
    pub unit: Option<&'static str>,
    pub value: f64,
}

fn round(value: f64, digits: i32) -> f64 {
    let m = 10f64.powi(digits);
    (value * m).round() / m
}

fn mppt_power(hb: &EmsHeartbeat, n: usize) -> Option<f64> {
    hb.mppt_strings.get(n).map(|s| round(s.power_w, 1))
}

// {{{ tables
pub static BATTERY_SENSORS: &[SensorDescription<BatteryPack>] = &[
    SensorDescription { key: "soc", unit: Some(PERCENT), value_fn: |p| Some(p.soc as f64) },
    SensorDescription { key: "soh", unit: Some(PERCENT), value_fn: |p| Some(p.soh as f64) },
    SensorDescription { key: "power", unit: Some(WATT), value_fn: |p| Some(round(p.power_w, 1)) },
    SensorDescription { key: "voltage", unit: Some(VOLT), value_fn: |p| Some(round(p.voltage_v, 2)) },
    SensorDescription { key: "current", unit: Some(AMPERE), value_fn: |p| Some(round(p.current_a, 3)) },
    SensorDescription { key: "remaining_energy", unit: Some(WATT_HOUR), value_fn: |p| Some(round(p.remaining_wh, 0)) },
    SensorDescription { key: "temperature", unit: Some(CELSIUS), value_fn: |p| Some(round(p.temperature_env_c, 1)) },
    SensorDescription { key: "cycles", unit: None, value_fn: |p| Some(p.cycles as f64) },
];

pub static ENERGY_STREAM_SENSORS: &[SensorDescription<EnergyStream>] = &[
    SensorDescription { key: "stream_load_power", unit: Some(WATT), value_fn: |e| Some(round(e.load_w, 1)) },
    SensorDescription { key: "stream_grid_power", unit: Some(WATT), value_fn: |e| Some(round(e.grid_w, 1)) },
    SensorDescription { key: "stream_solar_power", unit: Some(WATT), value_fn: |e| Some(round(e.solar_w, 1)) },
    SensorDescription { key: "stream_battery_power", unit: Some(WATT), value_fn: |e| Some(round(e.battery_w, 1)) },
    SensorDescription { key: "stream_soc", unit: Some(PERCENT), value_fn: |e| Some(e.soc as f64) },
];

// the device doesn't send energy-stream reports reliably, so the system
// power values are worked out from the heartbeat
pub static HEARTBEAT_SENSORS: &[SensorDescription<EmsHeartbeat>] = &[
    SensorDescription { key: "solar_power", unit: Some(WATT), value_fn: |d| Some(round(d.solar_power_w(), 1)) },
    SensorDescription { key: "grid_power", unit: Some(WATT), value_fn: |d| Some(round(d.grid_power_w(), 1)) },
    SensorDescription { key: "load_power", unit: Some(WATT), value_fn: |d| Some(round(d.load_power_w(), 1)) },
    SensorDescription { key: "battery_total_power", unit: Some(WATT), value_fn: |d| Some(round(d.battery_power_w, 1)) },
    SensorDescription { key: "phase_a_voltage", unit: Some(VOLT), value_fn: |d| Some(round(d.phase_a.volt, 1)) },
    SensorDescription { key: "phase_a_current", unit: Some(AMPERE), value_fn: |d| Some(round(d.phase_a.amp, 2)) },
    SensorDescription { key: "phase_a_power", unit: Some(WATT), value_fn: |d| Some(round(d.phase_a.act_pwr, 1)) },
    SensorDescription { key: "phase_b_voltage", unit: Some(VOLT), value_fn: |d| Some(round(d.phase_b.volt, 1)) },
    SensorDescription { key: "phase_b_current", unit: Some(AMPERE), value_fn: |d| Some(round(d.phase_b.amp, 2)) },
    SensorDescription { key: "phase_b_power", unit: Some(WATT), value_fn: |d| Some(round(d.phase_b.act_pwr, 1)) },
    SensorDescription { key: "phase_c_voltage", unit: Some(VOLT), value_fn: |d| Some(round(d.phase_c.volt, 1)) },
    SensorDescription { key: "phase_c_current", unit: Some(AMPERE), value_fn: |d| Some(round(d.phase_c.amp, 2)) },
    SensorDescription { key: "phase_c_power", unit: Some(WATT), value_fn: |d| Some(round(d.phase_c.act_pwr, 1)) },
    SensorDescription { key: "grid_frequency", unit: Some(HERTZ), value_fn: |d| Some(round(d.frequency_hz, 2)) },
    SensorDescription { key: "mppt_1_power", unit: Some(WATT), value_fn: |d| mppt_power(d, 0) },
    SensorDescription { key: "mppt_2_power", unit: Some(WATT), value_fn: |d| mppt_power(d, 1) },
    SensorDescription { key: "mppt_3_power", unit: Some(WATT), value_fn: |d| mppt_power(d, 2) },
    SensorDescription { key: "mppt_4_power", unit: Some(WATT), value_fn: |d| mppt_power(d, 3) },
];

pub static STATE_SENSORS: &[SensorDescription<DeviceState>] = &[SensorDescription {
    key: "total_soc",
    unit: Some(PERCENT),
    value_fn: |s| {
        if s.battery_packs.is_empty() {
            return None;
        }
        // summed as f64; pack SOCs are taken as sent and may be huge
        let sum: f64 = s.battery_packs.values().map(|p| p.soc as f64).sum();
        Some((sum / s.battery_packs.len() as f64).trunc())
    },
}];
// }}}

fn push_readings<T>(out: &mut Vec<Reading>, prefix: &str, table: &[SensorDescription<T>], source: &T) {
    for desc in table {
        if let Some(value) = (desc.value_fn)(source) {
            out.push(Reading {
                key: format!("{}{}", prefix, desc.key),
                unit: desc.unit,
                value,
            });
        }
    }
}

/// Flattens a state into readings. Sensors whose record hasn't been seen yet
/// are left out rather than reported as zero.
pub fn collect(state: &DeviceState) -> Vec<Reading> {
    let mut r = Vec::new();

    for (index, pack) in &state.battery_packs {
        push_readings(&mut r, &format!("battery_{}_", index), BATTERY_SENSORS, pack);
    }
    if let Some(es) = &state.energy_stream {
        push_readings(&mut r, "", ENERGY_STREAM_SENSORS, es);
    }
    if let Some(hb) = &state.heartbeat {
        push_readings(&mut r, "", HEARTBEAT_SENSORS, hb);
    }
    push_readings(&mut r, "", STATE_SENSORS, state);

    r
}
