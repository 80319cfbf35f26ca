mod common;
use common::*;

use proptest::prelude::*;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn decodes_encrypted_battery_report() {
    common_setup();

    let report = Factory::battery_report(&[Factory::battery_pack_entry(1, 85, 51.2)]);
    let raw = envelope(&[header(&xor(&report, 5), 1, 96, 7, 5)]);

    let decoded = Parser::parse(&raw);

    assert_eq!(decoded.kinds, vec![MessageKind::BatteryPackStatus]);
    assert_eq!(decoded.battery_packs.len(), 1);
    let pack = &decoded.battery_packs[0];
    assert_eq!(pack.pack_index, 1);
    assert_eq!(pack.soc, 85);
    assert_eq!(pack.soh, 98);
    assert!(approx(pack.voltage_v, 51.2));
    assert!(approx(pack.power_w, -250.5));
    assert_eq!(pack.serial_number, "HJ1234");
    assert_eq!(pack.cycles, 42);
    assert!(pack.is_charging);
    assert!(approx(pack.remaining_wh, 4200.0));
    assert!(decoded.energy_stream.is_none());
    assert!(decoded.heartbeat.is_none());
}

#[test]
fn wrong_key_gives_garbage_not_panic() {
    common_setup();

    let report = Factory::battery_report(&[Factory::battery_pack_entry(1, 85, 51.2)]);
    let raw = envelope(&[header(&xor(&report, 5), 1, 96, 7, 6)]);

    // whatever comes out, pack 1 with soc 85 is not it
    let decoded = Parser::parse(&raw);
    assert!(!decoded.battery_packs.iter().any(|p| p.pack_index == 1 && p.soc == 85));
}

#[test]
fn packs_without_positive_index_are_dropped() {
    common_setup();

    let report = Factory::battery_report(&[
        Factory::battery_pack_entry(0, 10, 50.0),
        Factory::battery_pack_entry(-3, 20, 50.0),
        Factory::battery_pack_entry(2, 30, 50.0),
    ]);
    let raw = envelope(&[header(&report, 0, 96, 7, 1)]);

    let decoded = Parser::parse(&raw);
    let indices: Vec<i64> = decoded.battery_packs.iter().map(|p| p.pack_index).collect();
    assert_eq!(indices, vec![2]);
}

#[test]
fn unknown_commands_are_counted_not_decoded() {
    common_setup();

    let raw = envelope(&[header(&Factory::energy_stream_pdata(), 0, 32, 33, 1)]);

    let decoded = Parser::parse(&raw);
    assert!(decoded.is_empty());
    assert_eq!(decoded.kinds, vec![MessageKind::Unknown { cmd_func: 32, cmd_id: 33 }]);
}

#[test]
fn bad_header_does_not_stop_the_rest() {
    common_setup();

    // pdata as a varint can't be a payload
    let mut bad = field_varint(1, 5);
    bad.extend(field_varint(8, 96));
    bad.extend(field_varint(9, 33));

    let raw = envelope(&[bad, header(&Factory::energy_stream_pdata(), 0, 96, 33, 2)]);

    let decoded = Parser::parse(&raw);
    let es = decoded.energy_stream.unwrap_or_default();
    assert!(approx(es.load_w, 1500.0));
    assert!(approx(es.grid_w, -200.0));
    assert!(approx(es.solar_w, 2100.0));
    assert!(approx(es.battery_w, -400.0));
    assert_eq!(es.soc, 76);
}

#[test]
fn energy_stream_with_bytes_field_is_discarded() {
    common_setup();

    let mut pdata = field_bytes(1, b"oops");
    pdata.extend(field_f32(2, 10.0));
    let raw = envelope(&[header(&pdata, 0, 96, 33, 1)]);

    let decoded = Parser::parse(&raw);
    assert!(decoded.energy_stream.is_none());
    assert!(decoded.is_empty());
}

#[test]
fn last_energy_stream_wins() {
    common_setup();

    let first = Factory::energy_stream_pdata();
    let second = field_varint(5, 12);
    let raw = envelope(&[header(&first, 0, 96, 33, 1), header(&second, 0, 96, 33, 2)]);

    let decoded = Parser::parse(&raw);
    let es = decoded.energy_stream.unwrap_or_default();
    assert_eq!(es.soc, 12);
    assert_eq!(es.load_w, 0.0);
}

#[test]
fn failed_later_energy_stream_keeps_earlier() {
    common_setup();

    let bad = field_bytes(5, b"x");
    let raw = envelope(&[
        header(&Factory::energy_stream_pdata(), 0, 96, 33, 1),
        header(&bad, 0, 96, 33, 2),
    ]);

    let decoded = Parser::parse(&raw);
    assert_eq!(decoded.energy_stream.map(|es| es.soc), Some(76));
}

#[test]
fn empty_pdata_is_skipped() {
    common_setup();

    let raw = envelope(&[header(&[], 0, 96, 33, 1)]);

    let decoded = Parser::parse(&raw);
    assert!(decoded.is_empty());
    assert!(decoded.kinds.is_empty());
}

#[test]
fn envelope_without_headers_is_empty() {
    common_setup();

    assert!(Parser::parse(&[]).is_empty());
    assert!(Parser::parse(&field_varint(1, 7)).is_empty());
    assert!(Parser::parse(&[0xff, 0xff, 0xff]).is_empty());
}

#[test]
fn decodes_heartbeat() {
    common_setup();

    let pdata = Factory::heartbeat_pdata();
    let raw = envelope(&[header(&xor(&pdata, 0x2a), 1, 96, 1, 0x2a)]);

    let decoded = Parser::parse(&raw);
    assert_eq!(decoded.kinds, vec![MessageKind::Heartbeat]);
    let hb = decoded.heartbeat.unwrap_or_default();

    assert!(approx(hb.phase_a.volt, 230.0));
    assert!(approx(hb.phase_b.act_pwr, -50.0));
    assert!(approx(hb.phase_c.amp, 0.5));
    assert_eq!(hb.phase_a.react_pwr, None);
    assert!(approx(hb.frequency_hz, 50.0));
    assert!(approx(hb.battery_power_w, -500.0));
    assert_eq!(hb.remaining_wh, None);

    // numbering runs across entries
    let indices: Vec<u32> = hb.mppt_strings.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert!(approx(hb.mppt_strings[2].power_w, 300.0));

    assert!(approx(hb.solar_power_w(), 2060.0));
    assert!(approx(hb.grid_power_w(), 75.0));
    assert!(approx(hb.load_power_w(), 2060.0 - 500.0 + 75.0));
}

#[test]
fn heartbeat_with_bad_phase_is_discarded() {
    common_setup();

    let mut pdata = field_f32(12, 1.0);
    pdata.extend(field_f32(59, -500.0));
    let raw = envelope(&[header(&pdata, 0, 96, 1, 1)]);

    assert!(Parser::parse(&raw).heartbeat.is_none());
}

#[test]
fn mixed_envelope() {
    common_setup();

    let report = Factory::battery_report(&[
        Factory::battery_pack_entry(1, 80, 51.0),
        Factory::battery_pack_entry(2, 90, 52.0),
    ]);
    let raw = envelope(&[
        header(&Factory::heartbeat_pdata(), 0, 96, 1, 1),
        header(&xor(&report, 300), 1, 96, 7, 300),
        header(&Factory::energy_stream_pdata(), 0, 96, 33, 3),
    ]);

    let decoded = Parser::parse(&raw);
    assert_eq!(decoded.battery_packs.len(), 2);
    assert!(decoded.energy_stream.is_some());
    assert!(decoded.heartbeat.is_some());
    assert_eq!(
        decoded.kinds,
        vec![MessageKind::Heartbeat, MessageKind::BatteryPackStatus, MessageKind::EnergyStream]
    );
}

#[test]
fn bad_pack_entry_does_not_drop_its_neighbours() {
    common_setup();

    let mut report = field_varint(1, 5);
    report.extend(field_bytes(1, &Factory::battery_pack_entry(3, 64, 50.5)));
    report.extend(field_f32(1, 1.0));
    report.extend(field_bytes(1, &Factory::battery_pack_entry(4, 65, 50.5)));
    let raw = envelope(&[header(&xor(&report, 77), 1, 96, 7, 77)]);

    let decoded = Parser::parse(&raw);
    let packs: Vec<(i64, i64)> = decoded.battery_packs.iter().map(|p| (p.pack_index, p.soc)).collect();
    assert_eq!(packs, vec![(3, 64), (4, 65)]);
}

#[test]
fn truncated_report_keeps_complete_packs() {
    common_setup();

    let mut report = field_bytes(1, &Factory::battery_pack_entry(1, 70, 51.0));
    let second = field_bytes(1, &Factory::battery_pack_entry(2, 71, 51.0));
    report.extend(&second[..second.len() / 2]);
    let raw = envelope(&[header(&report, 0, 96, 7, 1)]);

    let decoded = Parser::parse(&raw);
    let indices: Vec<i64> = decoded.battery_packs.iter().map(|p| p.pack_index).collect();
    assert_eq!(indices, vec![1]);
}

proptest! {
    #[test]
    fn parse_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..512)) {
        let decoded = Parser::parse(&raw);
        prop_assert!(decoded.battery_packs.iter().all(|p| p.pack_index > 0));
    }

    #[test]
    fn random_pdata_never_panics(
        pdata in proptest::collection::vec(any::<u8>(), 1..256),
        seq in any::<i64>(),
        cmd_id in prop_oneof![Just(1i64), Just(7i64), Just(33i64)],
    ) {
        let raw = envelope(&[header(&xor(&pdata, seq), 1, 96, cmd_id, seq)]);
        let decoded = Parser::parse(&raw);

        let expected = match cmd_id {
            1 => MessageKind::Heartbeat,
            7 => MessageKind::BatteryPackStatus,
            _ => MessageKind::EnergyStream,
        };
        prop_assert_eq!(decoded.kinds, vec![expected]);
        prop_assert!(decoded.battery_packs.iter().all(|p| p.pack_index > 0));
    }
}
