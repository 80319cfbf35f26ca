#![allow(dead_code)]

pub use powerocean_bridge::prelude::*;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// encoder {{{
// just enough of the wire format to build device messages by hand

pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut r = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            r.push(byte);
            return r;
        }
        r.push(byte | 0x80);
    }
}

fn tag(field: u64, wire_type: u64) -> Vec<u8> {
    encode_varint((field << 3) | wire_type)
}

pub fn field_varint(field: u64, value: i64) -> Vec<u8> {
    let mut r = tag(field, 0);
    r.extend(encode_varint(value as u64));
    r
}

pub fn field_i64(field: u64, value: i64) -> Vec<u8> {
    let mut r = tag(field, 1);
    r.extend(value.to_le_bytes());
    r
}

pub fn field_bytes(field: u64, value: &[u8]) -> Vec<u8> {
    let mut r = tag(field, 2);
    r.extend(encode_varint(value.len() as u64));
    r.extend(value);
    r
}

pub fn field_f32(field: u64, value: f32) -> Vec<u8> {
    let mut r = tag(field, 5);
    r.extend(value.to_le_bytes());
    r
}

pub fn header(pdata: &[u8], enc_type: i64, cmd_func: i64, cmd_id: i64, seq: i64) -> Vec<u8> {
    let mut r = field_bytes(1, pdata);
    r.extend(field_varint(6, enc_type));
    r.extend(field_varint(8, cmd_func));
    r.extend(field_varint(9, cmd_id));
    r.extend(field_varint(14, seq));
    r
}

pub fn envelope(headers: &[Vec<u8>]) -> Vec<u8> {
    headers.iter().flat_map(|h| field_bytes(1, h)).collect()
}

pub fn xor(data: &[u8], seq: i64) -> Vec<u8> {
    let key = (seq & 0xff) as u8;
    data.iter().map(|b| b ^ key).collect()
}
// }}}

pub struct Factory;
impl Factory {
    /// One pack entry as it appears inside a battery report.
    pub fn battery_pack_entry(index: i64, soc: i64, voltage: f32) -> Vec<u8> {
        let mut r = field_varint(15, index);
        r.extend(field_varint(2, soc));
        r.extend(field_varint(3, 98));
        r.extend(field_f32(1, -250.5));
        r.extend(field_f32(9, voltage));
        r.extend(field_f32(10, -4.9));
        r.extend(field_bytes(16, b"SEoxMjM0"));
        r.extend(field_varint(17, 42));
        r.extend(field_f32(25, 21.5));
        r.extend(field_varint(50, 1));
        r.extend(field_f32(54, 4200.0));
        r
    }

    pub fn battery_report(entries: &[Vec<u8>]) -> Vec<u8> {
        entries.iter().flat_map(|e| field_bytes(1, e)).collect()
    }

    pub fn energy_stream_pdata() -> Vec<u8> {
        let mut r = field_f32(1, 1500.0);
        r.extend(field_f32(2, -200.0));
        r.extend(field_f32(3, 2100.0));
        r.extend(field_f32(4, -400.0));
        r.extend(field_varint(5, 76));
        r
    }

    fn phase(volt: f32, amp: f32, act: f32) -> Vec<u8> {
        let mut r = field_f32(1, volt);
        r.extend(field_f32(2, amp));
        r.extend(field_f32(3, act));
        r
    }

    fn pv_string(volt: f32, amp: f32, power: f32) -> Vec<u8> {
        let mut r = field_f32(1, volt);
        r.extend(field_f32(2, amp));
        r.extend(field_f32(3, power));
        r
    }

    /// Heartbeat with two entries of two and one pv strings.
    pub fn heartbeat_pdata() -> Vec<u8> {
        let mut r = field_bytes(12, &Self::phase(230.0, 2.0, 100.0));
        r.extend(field_bytes(13, &Self::phase(231.0, 1.0, -50.0)));
        r.extend(field_bytes(14, &Self::phase(229.0, 0.5, 25.0)));
        r.extend(field_bytes(15, &field_f32(3, 50.0)));

        let mut entry = field_bytes(1, &Self::pv_string(400.0, 2.5, 1000.0));
        entry.extend(field_bytes(1, &Self::pv_string(380.0, 2.0, 760.0)));
        r.extend(field_bytes(31, &entry));
        r.extend(field_bytes(31, &field_bytes(1, &Self::pv_string(300.0, 1.0, 300.0))));

        r.extend(field_f32(59, -500.0));
        r
    }

    pub fn config(mqtt_enabled: bool) -> Result<ConfigWrapper> {
        let yaml = format!(
            "device:\n  serial: R371ZD1AZH4U0484\n  user_id: \"1234\"\nmqtt:\n  enabled: {}\n  host: localhost\n  publish_individual: true\n",
            mqtt_enabled
        );
        Ok(ConfigWrapper::from_config(Config::from_yaml(&yaml)?))
    }
}
