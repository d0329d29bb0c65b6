//! End-to-end decoding of hand-built history buffers
//!
//! Each buffer is written byte by byte the way the device stores it, then
//! decoded through the public API and checked against the expected records.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use geiger_history::common::DecodeIssue;
use geiger_history::history::{
    decode, normalize, ChannelSelector, DecodedRecord, DecoderVariant, Measurement,
};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 10)
        .unwrap()
        .and_hms_opt(12, 30, 0)
        .unwrap()
}

/// GMC timestamp for 2024-01-10 12:30:00 with the given save type
fn gmc_stamp(save_type: u8) -> Vec<u8> {
    vec![
        0x55, 0xAA, 0x00, 0x18, 0x01, 0x0A, 0x0C, 0x1E, 0x00, 0x55, 0xAA, save_type,
    ]
}

/// Gamma-Scout BCD timestamp for 2024-01-10 12:30:00
fn scout_stamp() -> Vec<u8> {
    vec![0xF5, 0xED, 0x00, 0x30, 0x12, 0x10, 0x01, 0x24]
}

fn samples(records: &[DecodedRecord]) -> Vec<&Measurement> {
    records
        .iter()
        .filter_map(DecodedRecord::as_measurement)
        .filter(|m| !m.derived)
        .collect()
}

fn derived(records: &[DecodedRecord]) -> Vec<&Measurement> {
    records
        .iter()
        .filter_map(DecodedRecord::as_measurement)
        .filter(|m| m.derived)
        .collect()
}

#[test]
fn gmc_minute_mode_two_byte_count() {
    let mut raw = gmc_stamp(2);
    raw.extend_from_slice(&[0x55, 0xAA, 0x01, 0x00, 0x1C]);

    let result = decode(&raw, &DecoderVariant::gmc()).unwrap();
    assert!(!result.truncated);
    assert!(result.issues.is_empty());
    assert_eq!(result.anchor_offset, Some(0));

    let all: Vec<&Measurement> = result.measurements().collect();
    assert_eq!(all.len(), 1);
    let m = all[0];
    assert_eq!(m.value, 28.0);
    assert!(m.is_cpm);
    assert!(m.valid);
    assert_eq!(m.time, t0());
    assert_eq!(m.channel, ChannelSelector::Combined);
    assert_eq!(m.index, 12);
}

#[test]
fn gmc_minute_mode_spacing() {
    let mut raw = gmc_stamp(2);
    raw.extend_from_slice(&[0x10, 0x11, 0x12, 0x13]);

    let result = decode(&raw, &DecoderVariant::gmc()).unwrap();
    let times: Vec<NaiveDateTime> = samples(&result.records).iter().map(|m| m.time).collect();
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::seconds(60));
    }
    assert!(derived(&result.records).is_empty());
}

#[test]
fn gmc_cps_reconstructs_rolling_cpm() {
    let mut raw = gmc_stamp(1);
    raw.extend(1..=90u8);

    let result = decode(&raw, &DecoderVariant::gmc()).unwrap();
    let counts = samples(&result.records);
    let cpm = derived(&result.records);
    assert_eq!(counts.len(), 90);
    assert_eq!(cpm.len(), 90);

    assert_eq!(counts[0].value, 1.0);
    assert!(!counts[0].is_cpm);
    assert_eq!(counts[0].time, t0() + Duration::seconds(1));

    assert_eq!(cpm[59].value, 1830.0);
    assert_eq!(cpm[89].value, 3630.0);
    assert_eq!(cpm[89].index, counts[89].index);
    assert!(cpm.iter().all(|m| m.is_cpm));

    let history = normalize(&result.records);
    assert_eq!(history.rows.len(), 90);
    assert_eq!(history.rows[59].cps, Some(60.0));
    assert_eq!(history.rows[59].cpm, Some(1830.0));
}

#[test]
fn gmc_firmware_tag_remap() {
    let mut raw = gmc_stamp(2);
    raw.extend_from_slice(&[0x55, 0xAA, 0x04, 0x03, 0x41, 0x42, 0x43]);

    let standard = decode(&raw, &DecoderVariant::gmc()).unwrap();
    let counts = samples(&standard.records);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].value, f64::from(0x0341_4243u32));

    let remapped = decode(&raw, &DecoderVariant::gmc_500_re118()).unwrap();
    assert!(samples(&remapped.records).is_empty());
    let notes: Vec<&str> = remapped
        .annotations()
        .map(|a| a.text.as_str())
        .filter(|t| t.starts_with("Note/Location"))
        .collect();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("'ABC'"));
}

#[test]
fn gmc_model_selection_picks_remapped_variant() {
    let variant = DecoderVariant::for_model("GMC-500+Re 1.18").unwrap();
    assert_eq!(variant.name, "gmc-500-re118");
    let variant = DecoderVariant::for_model("GMC-320Re 4.26").unwrap();
    assert_eq!(variant.name, "gmc");
}

#[test]
fn gamma_scout_exp_mantissa_count() {
    let mut raw = scout_stamp();
    raw.extend_from_slice(&[0xF5, 0x0B, 0x3E, 0x27]);

    let result = decode(&raw, &DecoderVariant::gamma_scout_online()).unwrap();
    assert!(!result.truncated);

    let counts = samples(&result.records);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].value, 201_600.0);
    assert_eq!(counts[0].channel, ChannelSelector::Primary);
    assert_eq!(counts[0].interval_s, 60);
    assert_eq!(counts[0].time, t0());
    assert_eq!(counts[0].index, 10);

    let history = normalize(&result.records);
    assert_eq!(history.rows.len(), 1);
    assert_eq!(history.rows[0].cps3rd, Some(201_600.0));
    assert_eq!(history.rows[0].cpm3rd, Some(201_600.0));
    assert_eq!(history.rows[0].xtra, Some(60.0));
    assert_eq!(history.rows[0].cpm, None);
}

#[test]
fn gamma_scout_classic_shifts_interval_codes() {
    let mut raw = scout_stamp();
    raw.extend_from_slice(&[0xF5, 0x0B, 0x00, 0x05, 0x00, 0x06]);

    let online = decode(&raw, &DecoderVariant::gamma_scout_online()).unwrap();
    let classic = decode(&raw, &DecoderVariant::gamma_scout_classic()).unwrap();
    assert_eq!(samples(&online.records)[0].interval_s, 60);
    assert_eq!(samples(&classic.records)[0].interval_s, 30);

    let times: Vec<NaiveDateTime> = samples(&classic.records).iter().map(|m| m.time).collect();
    assert_eq!(times, vec![t0(), t0() + Duration::seconds(30)]);
}

#[test]
fn gamma_scout_trailing_half_count_is_truncated() {
    let mut raw = scout_stamp();
    raw.extend_from_slice(&[0xF5, 0x0B, 0x00, 0x05, 0x00]);

    let result = decode(&raw, &DecoderVariant::gamma_scout_online()).unwrap();
    assert!(result.truncated);
    assert_eq!(samples(&result.records).len(), 1);
    assert!(matches!(
        result.issues.last(),
        Some(DecodeIssue::Truncated {
            offset: 12,
            needed: 2,
            available: 1
        })
    ));
}

#[test]
fn decoding_is_idempotent() {
    let mut raw = gmc_stamp(1);
    raw.extend_from_slice(&[0x05, 0x55, 0xAA, 0x05, 0x02, 0x07, 0xFF, 0x08, 0x55]);
    let variant = DecoderVariant::gmc();

    let first = decode(&raw, &variant).unwrap();
    let second = decode(&raw, &variant).unwrap();
    assert_eq!(first, second);
}

#[test]
fn indices_strictly_increase() {
    let mut raw = gmc_stamp(1);
    raw.extend_from_slice(&[0x01, 0x02]);
    raw.extend_from_slice(&[0x55, 0xAA, 0x02, 0x02, 0x48, 0x49]);
    raw.extend_from_slice(&[0x55, 0xAA, 0x05, 0x01, 0x03]);
    raw.extend_from_slice(&[0x55, 0xAA, 0x09, 0x04]);
    raw.extend_from_slice(&gmc_stamp(2));
    raw.extend_from_slice(&[0x55, 0xAA, 0x03, 0x00, 0x01, 0x00]);

    let result = decode(&raw, &DecoderVariant::gmc()).unwrap();
    let indices: Vec<u32> = result
        .records
        .iter()
        .filter(|r| r.as_measurement().map_or(true, |m| !m.derived))
        .map(DecodedRecord::index)
        .collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]), "{:?}", indices);

    assert_eq!(
        result.issues,
        vec![DecodeIssue::InvalidTag {
            offset: 25,
            code: 0x09
        }]
    );
    let last = samples(&result.records);
    let last = last.last().unwrap();
    assert_eq!(last.value, 256.0);
    assert!(last.valid);
}

#[test]
fn timestamps_monotonic_within_segment() {
    let mut raw = gmc_stamp(1);
    raw.extend_from_slice(&[0x01, 0x02, 0x55, 0xAA, 0x05, 0x02, 0x03, 0x04]);

    let result = decode(&raw, &DecoderVariant::gmc()).unwrap();
    let times: Vec<NaiveDateTime> = samples(&result.records).iter().map(|m| m.time).collect();
    assert_eq!(times.len(), 4);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(samples(&result.records)[3].channel, ChannelSelector::Tube2);
}
