use crate::prelude::*;
use crate::ecoflow::wire::Fields;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

// field numbers {{{
mod bp_fields {
    pub const PACKS: u64 = 1;

    pub const POWER: u64 = 1;
    pub const SOC: u64 = 2;
    pub const SOH: u64 = 3;
    pub const VOLTAGE: u64 = 9;
    pub const CURRENT: u64 = 10;
    pub const INDEX: u64 = 15;
    pub const SERIAL: u64 = 16;
    pub const CYCLES: u64 = 17;
    pub const MOS_TEMP: u64 = 19;
    pub const ENV_TEMP: u64 = 25;
    pub const REAL_SOC: u64 = 38;
    pub const CHG_DSG_STATE: u64 = 50;
    pub const REMAINING_WH: u64 = 54;
}

mod es_fields {
    pub const LOAD: u64 = 1;
    pub const GRID: u64 = 2;
    pub const SOLAR: u64 = 3;
    pub const BATTERY: u64 = 4;
    pub const SOC: u64 = 5;
}

mod hb_fields {
    pub const PHASE_A: u64 = 12;
    pub const PHASE_B: u64 = 13;
    pub const PHASE_C: u64 = 14;
    pub const LOAD_INFO: u64 = 15;
    pub const ENTRIES: u64 = 31;
    pub const REMAINING_WH: u64 = 55;
    pub const ALIVE_PACKS: u64 = 56;
    pub const BUS_VOLTAGE: u64 = 57;
    pub const BATTERY_POWER: u64 = 59;

    pub const LOAD_INFO_FREQUENCY: u64 = 3;
    pub const ENTRY_PV_STRINGS: u64 = 1;
}

mod phase_fields {
    pub const VOLT: u64 = 1;
    pub const AMP: u64 = 2;
    pub const ACTIVE_POWER: u64 = 3;
    pub const REACTIVE_POWER: u64 = 4;
    pub const APPARENT_POWER: u64 = 5;
}

mod pv_fields {
    pub const VOLT: u64 = 1;
    pub const AMP: u64 = 2;
    pub const POWER: u64 = 3;
}
// }}}

const CHG_DSG_CHARGING: i64 = 1;

// BatteryPack {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatteryPack {
    pub pack_index: i64,
    pub serial_number: String,
    pub soc: i64,
    pub real_soc: f64,
    pub soh: i64,
    pub power_w: f64, // positive = discharging
    pub voltage_v: f64,
    pub current_a: f64,
    pub remaining_wh: f64,
    pub cycles: i64,
    pub temperature_env_c: f64,
    pub temperature_mos_c: f64,
    pub is_charging: bool,
}

impl BatteryPack {
    /// Decodes a battery-pack status report (`cmd_func=96, cmd_id=7`).
    ///
    /// Entries that are not embedded messages, and packs without a positive
    /// index, are left out; the remaining packs are still returned.
    pub fn decode_report(pdata: &[u8]) -> Vec<BatteryPack> {
        let outer = Fields::decode(pdata);

        outer
            .get(bp_fields::PACKS)
            .iter()
            .filter_map(|raw| match raw.as_bytes() {
                Some(blob) => Some(Self::decode(&Fields::decode(blob))),
                None => {
                    debug!("skipping non-message battery pack entry {:?}", raw);
                    None
                }
            })
            .filter(|pack| {
                if pack.pack_index <= 0 {
                    debug!("dropping battery pack with index {}", pack.pack_index);
                }
                pack.pack_index > 0
            })
            .collect()
    }

    fn decode(f: &Fields) -> Self {
        Self {
            pack_index: f.i64_or(bp_fields::INDEX, 0),
            serial_number: Self::decode_serial(&f.string_or(bp_fields::SERIAL, "")),
            soc: f.i64_or(bp_fields::SOC, 0),
            real_soc: f.f64_or(bp_fields::REAL_SOC, 0.0),
            soh: f.i64_or(bp_fields::SOH, 0),
            power_w: f.f64_or(bp_fields::POWER, 0.0),
            voltage_v: f.f64_or(bp_fields::VOLTAGE, 0.0),
            current_a: f.f64_or(bp_fields::CURRENT, 0.0),
            remaining_wh: f.f64_or(bp_fields::REMAINING_WH, 0.0),
            cycles: f.i64_or(bp_fields::CYCLES, 0),
            temperature_env_c: f.f64_or(bp_fields::ENV_TEMP, 0.0),
            temperature_mos_c: f.f64_or(bp_fields::MOS_TEMP, 0.0),
            is_charging: f.i64_or(bp_fields::CHG_DSG_STATE, 0) == CHG_DSG_CHARGING,
        }
    }

    // serials are usually base64 on the wire; anything that doesn't decode
    // to UTF-8 text is kept as sent. Characters outside the alphabet (stray
    // whitespace) are skipped before decoding.
    fn decode_serial(raw: &str) -> String {
        let alphabet: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
            .collect();

        STANDARD
            .decode(alphabet)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
            .unwrap_or_else(|| raw.to_string())
    }
} // }}}

// EnergyStream {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EnergyStream {
    pub load_w: f64,
    pub grid_w: f64, // positive = import
    pub solar_w: f64,
    pub battery_w: f64, // positive = discharge
    pub soc: i64,
}

impl EnergyStream {
    /// Decodes an energy-stream report (`cmd_func=96, cmd_id=33`).
    ///
    /// The five values only make sense together, so any field that is present
    /// but not numeric fails the whole record.
    pub fn decode(pdata: &[u8]) -> Result<Self> {
        let f = Fields::decode(pdata);

        Ok(Self {
            load_w: f.try_f64(es_fields::LOAD)?.unwrap_or_default(),
            grid_w: f.try_f64(es_fields::GRID)?.unwrap_or_default(),
            solar_w: f.try_f64(es_fields::SOLAR)?.unwrap_or_default(),
            battery_w: f.try_f64(es_fields::BATTERY)?.unwrap_or_default(),
            soc: f.try_i64(es_fields::SOC)?.unwrap_or_default(),
        })
    }
} // }}}

// EmsHeartbeat {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PhaseReading {
    pub volt: f64,
    pub amp: f64,
    pub act_pwr: f64,
    pub react_pwr: Option<f64>,
    pub apparent_pwr: Option<f64>,
}

impl PhaseReading {
    fn decode(f: &Fields) -> Result<Self> {
        Ok(Self {
            volt: f.try_f64(phase_fields::VOLT)?.unwrap_or_default(),
            amp: f.try_f64(phase_fields::AMP)?.unwrap_or_default(),
            act_pwr: f.try_f64(phase_fields::ACTIVE_POWER)?.unwrap_or_default(),
            react_pwr: f.try_f64(phase_fields::REACTIVE_POWER)?,
            apparent_pwr: f.try_f64(phase_fields::APPARENT_POWER)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MpptString {
    pub index: u32, // 1-based, counted across all heartbeat entries
    pub volt: f64,
    pub amp: f64,
    pub power_w: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EmsHeartbeat {
    pub phase_a: PhaseReading,
    pub phase_b: PhaseReading,
    pub phase_c: PhaseReading,
    pub frequency_hz: f64,
    pub mppt_strings: Vec<MpptString>,
    pub battery_power_w: f64,
    pub remaining_wh: Option<f64>,
    pub alive_pack_count: Option<i64>,
    pub bus_voltage_v: Option<f64>,
}

impl EmsHeartbeat {
    /// Decodes an EMS heartbeat (`cmd_func=96, cmd_id=1`). Like the energy
    /// stream this is all or nothing.
    pub fn decode(pdata: &[u8]) -> Result<Self> {
        let f = Fields::decode(pdata);

        let phase = |field| -> Result<PhaseReading> {
            match f.message(field)? {
                Some(p) => PhaseReading::decode(&p),
                None => Ok(PhaseReading::default()),
            }
        };

        let frequency_hz = match f.message(hb_fields::LOAD_INFO)? {
            Some(info) => info.try_f64(hb_fields::LOAD_INFO_FREQUENCY)?.unwrap_or_default(),
            None => 0.0,
        };

        let mut mppt_strings = Vec::new();
        for entry in f.messages(hb_fields::ENTRIES)? {
            for pv in entry.messages(hb_fields::ENTRY_PV_STRINGS)? {
                mppt_strings.push(MpptString {
                    index: mppt_strings.len() as u32 + 1,
                    volt: pv.try_f64(pv_fields::VOLT)?.unwrap_or_default(),
                    amp: pv.try_f64(pv_fields::AMP)?.unwrap_or_default(),
                    power_w: pv.try_f64(pv_fields::POWER)?.unwrap_or_default(),
                });
            }
        }

        Ok(Self {
            phase_a: phase(hb_fields::PHASE_A)?,
            phase_b: phase(hb_fields::PHASE_B)?,
            phase_c: phase(hb_fields::PHASE_C)?,
            frequency_hz,
            mppt_strings,
            battery_power_w: f.try_f64(hb_fields::BATTERY_POWER)?.unwrap_or_default(),
            remaining_wh: f.try_f64(hb_fields::REMAINING_WH)?,
            alive_pack_count: f.try_i64(hb_fields::ALIVE_PACKS)?,
            bus_voltage_v: f.try_f64(hb_fields::BUS_VOLTAGE)?,
        })
    }

    pub fn solar_power_w(&self) -> f64 {
        self.mppt_strings.iter().map(|s| s.power_w).sum()
    }

    pub fn grid_power_w(&self) -> f64 {
        self.phase_a.act_pwr + self.phase_b.act_pwr + self.phase_c.act_pwr
    }

    // solar + battery + grid import balance out to the house load
    pub fn load_power_w(&self) -> f64 {
        self.solar_power_w() + self.battery_power_w + self.grid_power_w()
    }
} // }}}
