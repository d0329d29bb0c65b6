//! Tag dispatcher
//!
//! State machine that walks the unrolled log and turns bytes into records.
//!
//! # States
//! - `Idle`: classify the byte at the cursor (escape sequence, fill byte,
//!   bare code or plain count)
//! - `AwaitingPayload`: the record kind is known; size its payload, decode it
//!   once every byte is present, then return to `Idle`
//! - `Done`: end of log, or a record the log cannot complete
//!
//! Record meaning comes only from the variant's tag table. Clock, rolling
//! window and channel live in a `DecoderContext` created fresh per pass.

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::clock::ClockState;
use super::codec::{clamp_count, exp_mantissa};
use super::common::{Annotation, ChannelSelector, DecodedRecord, Measurement, Sampling};
use super::cpm::RollingWindow;
use super::scanner::LogView;
use super::variant::{alarm_text, DecoderVariant, TagKind, TagTable, TimestampLayout};
use crate::common::DecodeIssue;

/// Mutable state owned by one decode pass
#[derive(Debug, Clone)]
pub struct DecoderContext {
    pub clock: ClockState,
    pub window: RollingWindow,
    pub channel: ChannelSelector,
    /// False while the selected tube is unknown
    pub channel_valid: bool,
    pub sampling: Sampling,
    /// False from an unknown save type or discriminator until the next timestamp
    pub trusted: bool,
}

impl DecoderContext {
    pub fn new(variant: &DecoderVariant, start: NaiveDateTime) -> Self {
        let mut window = RollingWindow::new();
        window.configure(variant.initial_sampling, 0);
        Self {
            clock: ClockState::new(start),
            window,
            channel: variant.default_channel,
            channel_valid: true,
            sampling: variant.initial_sampling,
            trusted: true,
        }
    }

    fn set_mode(&mut self, sampling: Sampling, interval_s: u32) {
        self.sampling = sampling;
        self.window.configure(sampling, interval_s);
    }

    fn record_valid(&self) -> bool {
        self.trusted && self.channel_valid
    }
}

/// Where the payload's meaning came from
#[derive(Debug, Clone, Copy)]
enum Payload<'t> {
    /// Count stored without escape
    Plain,
    /// Discriminator after the escape sequence
    Tagged { code: u8, kind: &'t TagKind },
    /// Code standing on its own
    Bare { code: u8, kind: &'t TagKind },
}

#[derive(Debug, Clone, Copy)]
enum DispatchState<'t> {
    Idle {
        pos: usize,
    },
    AwaitingPayload {
        start: usize,
        at: usize,
        payload: Payload<'t>,
    },
    Done,
}

/// Payload length as far as the log can supply it
enum PayloadSize {
    Complete(usize),
    Short { needed: usize },
    Overrun { claimed: usize },
}

/// Everything one pass produced
#[derive(Debug, Clone, Default)]
pub struct DispatchOutput {
    pub records: Vec<DecodedRecord>,
    pub issues: Vec<DecodeIssue>,
    pub truncated: bool,
}

/// Single-pass record decoder over a `LogView`
pub struct Dispatcher<'a> {
    variant: &'a DecoderVariant,
    table: &'a TagTable,
    view: LogView<'a>,
    ctx: DecoderContext,
    output: DispatchOutput,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        variant: &'a DecoderVariant,
        table: &'a TagTable,
        view: LogView<'a>,
        start: NaiveDateTime,
    ) -> Self {
        Self {
            variant,
            table,
            view,
            ctx: DecoderContext::new(variant, start),
            output: DispatchOutput::default(),
        }
    }

    /// Decode the whole view
    pub fn run(mut self) -> DispatchOutput {
        let mut state = DispatchState::Idle { pos: 0 };
        loop {
            state = match state {
                DispatchState::Idle { pos } => self.idle(pos),
                DispatchState::AwaitingPayload { start, at, payload } => {
                    self.awaiting_payload(start, at, payload)
                }
                DispatchState::Done => break,
            };
        }
        self.output
    }

    fn idle(&mut self, pos: usize) -> DispatchState<'a> {
        let Some(byte) = self.view.get(pos) else {
            return DispatchState::Done;
        };
        let table = self.table;
        let variant = self.variant;
        let escape = variant.escape.as_slice();

        if self.view.starts_with(pos, escape) {
            let tag_at = pos + escape.len();
            let Some(code) = self.view.get(tag_at) else {
                return self.truncate(pos, escape.len() + 1);
            };
            return match table.escaped(code) {
                Some(kind) => DispatchState::AwaitingPayload {
                    start: pos,
                    at: tag_at + 1,
                    payload: Payload::Tagged { code, kind },
                },
                None => {
                    self.invalid_tag(pos, code);
                    DispatchState::Idle { pos: tag_at + 1 }
                }
            };
        }
        if variant.fill == Some(byte) && !variant.keep_fill {
            return DispatchState::Idle { pos: pos + 1 };
        }

        match table.bare(byte) {
            Some(kind) => DispatchState::AwaitingPayload {
                start: pos,
                at: pos + 1,
                payload: Payload::Bare { code: byte, kind },
            },
            None => DispatchState::AwaitingPayload {
                start: pos,
                at: pos,
                payload: Payload::Plain,
            },
        }
    }

    fn awaiting_payload(&mut self, start: usize, at: usize, payload: Payload<'a>) -> DispatchState<'a> {
        let size = match self.payload_size(at, payload) {
            PayloadSize::Complete(size) => size,
            PayloadSize::Short { needed } => return self.truncate(start, at - start + needed),
            PayloadSize::Overrun { claimed } => return self.overrun(start, at, claimed),
        };
        let Some(bytes) = self.view.slice(at, size) else {
            return self.truncate(start, at - start + size);
        };
        self.complete(start, at, payload, &bytes);
        DispatchState::Idle { pos: at + size }
    }

    fn fixed(&self, at: usize, size: usize) -> PayloadSize {
        if self.view.available(at) >= size {
            PayloadSize::Complete(size)
        } else {
            PayloadSize::Short { needed: size }
        }
    }

    fn payload_size(&self, at: usize, payload: Payload<'a>) -> PayloadSize {
        let kind = match payload {
            Payload::Plain => return self.fixed(at, usize::from(self.variant.plain.width)),
            Payload::Tagged { kind, .. } | Payload::Bare { kind, .. } => kind,
        };
        match kind {
            TagKind::Timestamp(layout) => self.fixed(at, layout.payload_len()),
            TagKind::Count { width, .. } => self.fixed(at, usize::from(*width)),
            TagKind::TubeSelect => self.fixed(at, 1),
            TagKind::SaveInterval | TagKind::Debug | TagKind::Alarm { .. } => {
                PayloadSize::Complete(0)
            }
            TagKind::Annotation => match self.view.get(at) {
                None => PayloadSize::Short { needed: 1 },
                Some(len) => {
                    let size = 1 + usize::from(len);
                    if self.view.available(at) < size {
                        PayloadSize::Overrun {
                            claimed: usize::from(len),
                        }
                    } else {
                        PayloadSize::Complete(size)
                    }
                }
            },
            // The size byte counts itself, so a zero size skips only the tag
            TagKind::Skip => match self.view.get(at) {
                None => PayloadSize::Short { needed: 1 },
                Some(0) => PayloadSize::Complete(0),
                Some(n) => self.fixed(at, usize::from(n)),
            },
            TagKind::OutOfBand { alarm_flag } => {
                let mut flags = 0;
                while self.view.get(at + 2 + flags) == Some(*alarm_flag) {
                    flags += 1;
                }
                self.fixed(at, 2 + flags + 2)
            }
        }
    }

    fn complete(&mut self, start: usize, at: usize, payload: Payload<'a>, bytes: &[u8]) {
        let (code, kind) = match payload {
            Payload::Plain => {
                let plain = self.variant.plain;
                if let Some(decoded) = plain.codec.decode(bytes, usize::from(plain.width)) {
                    self.count(start, decoded.value);
                }
                return;
            }
            Payload::Tagged { code, kind } | Payload::Bare { code, kind } => (code, kind),
        };

        match kind {
            TagKind::Timestamp(layout) => self.timestamp(start, code, layout, bytes),
            TagKind::Count {
                width,
                codec,
                cps_mask,
            } => {
                if let Some(decoded) = codec.decode(bytes, usize::from(*width)) {
                    let value = match cps_mask {
                        Some(mask) if self.ctx.sampling == Sampling::Cps => decoded.value & mask,
                        _ => decoded.value,
                    };
                    self.count(start, value);
                }
            }
            TagKind::Annotation => {
                let text: String = bytes
                    .get(1..)
                    .unwrap_or_default()
                    .iter()
                    .map(|&b| char::from(b))
                    .collect();
                let len = text.chars().count();
                self.annotate(start, format!("Note/Location: '{}' ({} bytes)", text, len));
            }
            TagKind::TubeSelect => {
                if let Some(&tube) = bytes.first() {
                    self.tube_select(start, tube);
                }
            }
            TagKind::SaveInterval => self.save_interval(start, code),
            TagKind::Skip => {
                self.annotate(start, format!("Skip: {} bytes", bytes.len()));
            }
            TagKind::Debug => {
                self.annotate(start, format!("Debug flag 0x{:02X} ignored", code));
            }
            TagKind::Alarm { text } => {
                let text = text.as_deref().unwrap_or(alarm_text(code));
                self.annotate(start, format!("Alarm 0x{:02X}: {}", code, text));
            }
            TagKind::OutOfBand { alarm_flag } => self.out_of_band(start, at, *alarm_flag, bytes),
        }
    }

    fn timestamp(&mut self, start: usize, code: u8, layout: &TimestampLayout, bytes: &[u8]) {
        let time = if layout.trailer_matches(bytes) {
            layout.parse_time(bytes)
        } else {
            None
        };
        let Some(time) = time else {
            self.issue(DecodeIssue::InvalidTag {
                offset: self.view.index_of(start),
                code,
            });
            self.annotate(start, format!("Invalid timestamp record: {}", hex(bytes)));
            return;
        };

        self.ctx.trusted = true;
        let variant = self.variant;
        let text = match layout.save_code(bytes) {
            Some(save) => match variant.save_mode(save) {
                Some(mode) => {
                    self.ctx.clock.reset(time, mode.interval_s, mode.first_index);
                    self.ctx.set_mode(mode.sampling, mode.interval_s);
                    debug!(
                        offset = self.view.index_of(start),
                        %time,
                        interval_s = mode.interval_s,
                        mode = %mode.label,
                        "save mode"
                    );
                    format!(
                        "Date&Time Stamp; Type: '{}', Interval: {} s",
                        mode.label, mode.interval_s
                    )
                }
                None => {
                    self.ctx.clock.reset(time, 0, 0);
                    self.ctx.set_mode(variant.initial_sampling, 0);
                    self.ctx.trusted = false;
                    warn!(
                        offset = self.view.index_of(start),
                        save_type = save,
                        "unknown save type, following counts flagged invalid"
                    );
                    format!(
                        "Date&Time Stamp; unknown save type {}, following counts flagged invalid",
                        save
                    )
                }
            },
            None => {
                let interval_s = self.ctx.clock.interval_s();
                self.ctx.clock.reset(time, interval_s, 0);
                format!("Date&Time Stamp: {}", time.format("%Y-%m-%d %H:%M:%S"))
            }
        };
        self.annotate_at(start, Some(time), text);
    }

    fn tube_select(&mut self, start: usize, tube: u8) {
        let text = match ChannelSelector::from_tube_byte(tube) {
            Some(channel) => {
                self.ctx.channel = channel;
                self.ctx.channel_valid = true;
                format!("Tube selected: {} [0=both, 1=tube1, 2=tube2]", tube)
            }
            None => {
                self.ctx.channel = self.variant.default_channel;
                self.ctx.channel_valid = false;
                warn!(
                    offset = self.view.index_of(start),
                    tube, "unknown tube, following counts flagged invalid"
                );
                format!("Tube selected: {} unknown, following counts flagged invalid", tube)
            }
        };
        self.annotate(start, text);
    }

    fn save_interval(&mut self, start: usize, code: u8) {
        let variant = self.variant;
        let Some(mode) = variant.save_mode(code) else {
            self.issue(DecodeIssue::InvalidTag {
                offset: self.view.index_of(start),
                code,
            });
            self.annotate(start, format!("Protocol interval 0x{:02X} unknown", code));
            return;
        };
        let previous = self.ctx.clock.interval_s();
        self.ctx.clock.set_interval(mode.interval_s);
        self.ctx.set_mode(mode.sampling, mode.interval_s);
        if previous != mode.interval_s {
            debug!(
                offset = self.view.index_of(start),
                previous,
                interval_s = mode.interval_s,
                "protocol interval changed"
            );
        }
        self.annotate(
            start,
            format!(
                "Protocol interval 0x{:02X}: {} ({} s, was {} s)",
                code, mode.label, mode.interval_s, previous
            ),
        );
    }

    fn out_of_band(&mut self, start: usize, at: usize, alarm_flag: u8, bytes: &[u8]) {
        let [lo, hi, rest @ ..] = bytes else {
            return;
        };
        let [flags @ .., msb, lsb] = rest else {
            return;
        };
        let delay = (u32::from(*hi) * 256 + u32::from(*lo)) * 10;
        let time = self.ctx.clock.now();

        self.annotate_at(start, Some(time), format!("Out-of-band: extra delay {} s", delay));
        for k in 0..flags.len() {
            self.annotate_at(
                at + 2 + k,
                Some(time),
                format!("Alarm 0x{:02X}: {}", alarm_flag, alarm_text(alarm_flag)),
            );
        }
        let pulses = exp_mantissa(u16::from_be_bytes([*msb, *lsb]));
        self.annotate_at(
            at + 2 + flags.len(),
            Some(time),
            format!("Out-of-band pulses: {} (excluded from counts)", pulses),
        );
        self.ctx.clock.delay(delay);
    }

    fn count(&mut self, start: usize, raw: u64) {
        let index = self.view.index_of(start);
        let (value, clamped) = clamp_count(raw, self.variant.max_count);
        if clamped {
            self.issue(DecodeIssue::ArithmeticOverflow {
                offset: index,
                raw,
                clamped: value,
            });
        }

        let valid = self.ctx.record_valid();
        let sign = if valid { 1.0 } else { -1.0 };
        let time = self.ctx.clock.next_record_time();
        let interval_s = self.ctx.clock.interval_s();
        let channel = self.ctx.channel;
        let measurement = |is_cpm: bool, value: f64, derived: bool| {
            DecodedRecord::Measurement(Measurement {
                index,
                time,
                channel,
                is_cpm,
                value: sign * value,
                valid,
                derived,
                interval_s,
            })
        };

        let native_cpm = self.ctx.sampling == Sampling::Cpm;
        self.output
            .records
            .push(measurement(native_cpm, value as f64, false));
        if let Some(sum) = self.ctx.window.push(value) {
            self.output.records.push(measurement(true, sum as f64, true));
        }
    }

    fn invalid_tag(&mut self, pos: usize, code: u8) {
        let index = self.view.index_of(pos);
        self.issue(DecodeIssue::InvalidTag {
            offset: index,
            code,
        });
        self.ctx.trusted = false;
        let time = self.ctx.clock.next_record_time();
        self.output
            .records
            .push(DecodedRecord::Measurement(Measurement {
                index,
                time,
                channel: self.ctx.channel,
                is_cpm: self.ctx.sampling == Sampling::Cpm,
                value: -f64::from(code),
                valid: false,
                derived: false,
                interval_s: self.ctx.clock.interval_s(),
            }));
    }

    fn truncate(&mut self, start: usize, needed: usize) -> DispatchState<'a> {
        let available = self.view.available(start);
        self.annotate(
            start,
            format!(
                "Truncated record: needs {} bytes, {} available",
                needed, available
            ),
        );
        self.issue(DecodeIssue::Truncated {
            offset: self.view.index_of(start),
            needed,
            available,
        });
        self.output.truncated = true;
        DispatchState::Done
    }

    fn overrun(&mut self, start: usize, at: usize, claimed: usize) -> DispatchState<'a> {
        let available = self.view.available(at + 1);
        self.annotate(
            start,
            format!(
                "Note/Location: ERROR: not enough data in history (expected {} bytes, got only {})",
                claimed, available
            ),
        );
        self.issue(DecodeIssue::OutOfBoundsRead {
            offset: self.view.index_of(start),
            claimed,
            available,
        });
        self.output.truncated = true;
        DispatchState::Done
    }

    fn annotate(&mut self, pos: usize, text: String) {
        let time = self.ctx.clock.now();
        self.annotate_at(pos, Some(time), text);
    }

    fn annotate_at(&mut self, pos: usize, time: Option<NaiveDateTime>, text: String) {
        self.output
            .records
            .push(DecodedRecord::Annotation(Annotation {
                index: self.view.index_of(pos),
                time,
                text,
            }));
    }

    fn issue(&mut self, issue: DecodeIssue) {
        warn!(%issue, "decode issue");
        self.output.issues.push(issue);
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    }

    fn stamp(save_type: u8) -> Vec<u8> {
        vec![
            0x55, 0xAA, 0x00, 0x18, 0x01, 0x0A, 0x0C, 0x1E, 0x00, 0x55, 0xAA, save_type,
        ]
    }

    fn run(variant: &DecoderVariant, raw: &[u8]) -> DispatchOutput {
        let table = variant.compile().unwrap();
        let view = LogView::new(raw, 0, variant.wraps, variant.fill);
        Dispatcher::new(variant, &table, view, t0()).run()
    }

    fn measurements(out: &DispatchOutput) -> Vec<&Measurement> {
        out.records
            .iter()
            .filter_map(DecodedRecord::as_measurement)
            .collect()
    }

    fn annotations(out: &DispatchOutput) -> Vec<&Annotation> {
        out.records
            .iter()
            .filter_map(DecodedRecord::as_annotation)
            .collect()
    }

    #[test]
    fn test_cpm_minute_mode() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x55, 0xAA, 0x01, 0x00, 0x1C, 0x20]);
        let out = run(&DecoderVariant::gmc(), &raw);

        let m = measurements(&out);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].value, 28.0);
        assert!(m[0].is_cpm);
        assert_eq!(m[0].time, t0());
        assert_eq!(m[0].index, 12);
        assert_eq!(m[1].value, 32.0);
        assert_eq!(m[1].time, t0() + chrono::Duration::seconds(60));
        assert!(!out.truncated);
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_cps_mode_emits_rolling_cpm() {
        let mut raw = stamp(1);
        raw.extend_from_slice(&[0x02, 0x03]);
        let out = run(&DecoderVariant::gmc(), &raw);

        let m = measurements(&out);
        assert_eq!(m.len(), 4);
        assert!(!m[0].is_cpm && !m[0].derived);
        assert_eq!(m[0].time, t0() + chrono::Duration::seconds(1));
        assert!(m[1].is_cpm && m[1].derived);
        assert_eq!(m[1].index, m[0].index);
        assert_eq!(m[1].value, 2.0);
        assert_eq!(m[3].value, 5.0);
        assert_eq!(m[3].index, m[2].index);
        assert!(m[2].index > m[1].index);
    }

    #[test]
    fn test_cps_two_byte_count_is_masked() {
        let mut raw = stamp(1);
        raw.extend_from_slice(&[0x55, 0xAA, 0x01, 0xC0, 0x05]);
        let out = run(&DecoderVariant::gmc(), &raw);
        assert_eq!(measurements(&out)[0].value, 5.0);
    }

    #[test]
    fn test_fill_bytes_skipped_without_clock() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x10, 0xFF, 0x11, 0xFF, 0xFF]);
        let out = run(&DecoderVariant::gmc(), &raw);

        let m = measurements(&out);
        assert_eq!(m.len(), 2);
        assert_eq!(m[1].time, t0() + chrono::Duration::seconds(60));
        assert_eq!(m[1].index, 14);
    }

    #[test]
    fn test_keep_fill_decodes_interior_fill() {
        let mut variant = DecoderVariant::gmc();
        variant.keep_fill = true;
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x10, 0xFF, 0x11, 0xFF]);
        let out = run(&variant, &raw);

        let values: Vec<f64> = measurements(&out).iter().map(|m| m.value).collect();
        assert_eq!(values, vec![16.0, 255.0, 17.0]);
    }

    #[test]
    fn test_tag_remapping() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x55, 0xAA, 0x04, 0x02, 0x41, 0x42, 0x00, 0x00]);

        let out = run(&DecoderVariant::gmc(), &raw);
        let m = measurements(&out);
        assert_eq!(m[0].value, f64::from(0x0241_4200u32));

        let out = run(&DecoderVariant::gmc_500_re118(), &raw);
        let notes = annotations(&out);
        assert!(notes.iter().any(|a| a.text.contains("'AB'")));
        let m = measurements(&out);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_invalid_discriminator_is_sign_flagged() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x55, 0xAA, 0x07, 0x10]);
        let out = run(&DecoderVariant::gmc(), &raw);

        let m = measurements(&out);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].value, -7.0);
        assert!(!m[0].valid);
        assert_eq!(m[1].value, -16.0);
        assert_eq!(
            out.issues,
            vec![DecodeIssue::InvalidTag {
                offset: 12,
                code: 0x07
            }]
        );
    }

    #[test]
    fn test_unknown_save_type_flags_until_next_timestamp() {
        let mut raw = stamp(2);
        raw[11] = 0x09;
        raw.push(0x10);
        raw.extend_from_slice(&stamp(2));
        raw.push(0x11);
        let out = run(&DecoderVariant::gmc(), &raw);

        let m: Vec<&Measurement> = measurements(&out)
            .into_iter()
            .filter(|m| !m.derived)
            .collect();
        assert_eq!(m[0].value, -16.0);
        assert!(!m[0].valid);
        assert_eq!(m[1].value, 17.0);
        assert!(m[1].valid);
    }

    #[test]
    fn test_tube_select_routes_channel() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x10, 0x55, 0xAA, 0x05, 0x02, 0x11, 0x55, 0xAA, 0x05, 0x07, 0x12]);
        let out = run(&DecoderVariant::gmc(), &raw);

        let m = measurements(&out);
        assert_eq!(m[0].channel, ChannelSelector::Combined);
        assert_eq!(m[1].channel, ChannelSelector::Tube2);
        assert_eq!(m[1].time, t0() + chrono::Duration::seconds(60));
        assert_eq!(m[2].channel, ChannelSelector::Combined);
        assert!(!m[2].valid);
        assert_eq!(m[2].value, -18.0);
    }

    #[test]
    fn test_annotation_overrun() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x55, 0xAA, 0x02, 0x09, 0x41, 0x42]);
        let out = run(&DecoderVariant::gmc(), &raw);

        assert!(out.truncated);
        assert_eq!(
            out.issues,
            vec![DecodeIssue::OutOfBoundsRead {
                offset: 12,
                claimed: 9,
                available: 2
            }]
        );
        let last = annotations(&out).pop().unwrap().clone();
        assert!(last.text.contains("expected 9 bytes, got only 2"));
    }

    #[test]
    fn test_truncated_count() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x55, 0xAA, 0x03, 0x01]);
        let out = run(&DecoderVariant::gmc(), &raw);

        assert!(out.truncated);
        assert_eq!(
            out.issues,
            vec![DecodeIssue::Truncated {
                offset: 12,
                needed: 6,
                available: 4
            }]
        );
        assert!(measurements(&out).is_empty());
    }

    #[test]
    fn test_lone_escape_byte_at_end_is_a_count() {
        let mut raw = stamp(2);
        raw.extend_from_slice(&[0x10, 0x55]);
        let out = run(&DecoderVariant::gmc(), &raw);

        assert!(!out.truncated);
        assert!(out.issues.is_empty());
        let m = measurements(&out);
        assert_eq!(m.len(), 2);
        assert_eq!(m[1].value, 85.0);
        assert_eq!(m[1].index, 13);
    }

    #[test]
    fn test_invalid_timestamp_mid_stream_keeps_decoding() {
        let mut raw = stamp(2);
        raw.push(0x10);
        let mut bad = stamp(2);
        bad[4] = 0x00; // month 0
        raw.extend_from_slice(&bad);
        raw.push(0x11);
        let mut bad = stamp(2);
        bad[10] = 0xAB; // broken trailer
        raw.extend_from_slice(&bad);
        raw.push(0x12);
        let out = run(&DecoderVariant::gmc(), &raw);

        assert!(!out.truncated);
        assert_eq!(
            out.issues,
            vec![
                DecodeIssue::InvalidTag {
                    offset: 13,
                    code: 0x00
                },
                DecodeIssue::InvalidTag {
                    offset: 26,
                    code: 0x00
                },
            ]
        );
        let notes = annotations(&out);
        assert_eq!(
            notes
                .iter()
                .filter(|a| a.text.starts_with("Invalid timestamp record"))
                .count(),
            2
        );

        let m = measurements(&out);
        let values: Vec<f64> = m.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![16.0, 17.0, 18.0]);
        assert!(m.iter().all(|m| m.valid));
        assert_eq!(m[1].time, t0() + chrono::Duration::seconds(60));
        assert_eq!(m[2].time, t0() + chrono::Duration::seconds(120));
    }

    #[test]
    fn test_scout_counts_and_interval() {
        let raw = [
            0xF5, 0xEF, 0x30, 0x12, 0x10, 0x01, 0x24, // 2024-01-10 12:30
            0xF5, 0x0C, // 30 s
            0x00, 0x0A, 0x00, 0x14, // 10, 20
            0xF5, 0x0B, // 60 s
            0x3E, 0x27,
        ];
        let out = run(&DecoderVariant::gamma_scout_online(), &raw);

        let m = measurements(&out);
        let plain: Vec<&&Measurement> = m.iter().filter(|m| !m.derived).collect();
        assert_eq!(plain.len(), 3);
        assert_eq!(plain[0].value, 10.0);
        assert_eq!(plain[0].channel, ChannelSelector::Primary);
        assert_eq!(plain[1].time, t0() + chrono::Duration::seconds(30));
        assert_eq!(plain[2].value, 201_600.0);
        assert_eq!(plain[2].time, t0() + chrono::Duration::seconds(60));
        assert_eq!(plain[2].interval_s, 60);

        let derived: Vec<&&Measurement> = m.iter().filter(|m| m.derived).collect();
        assert_eq!(derived.len(), 2);
        assert_eq!(derived[0].value, 30.0);
        assert_eq!(derived[0].index, plain[1].index);
        assert_eq!(derived[1].value, 201_600.0);
    }

    #[test]
    fn test_scout_out_of_band() {
        let raw = [
            0xF5, 0xEF, 0x30, 0x12, 0x10, 0x01, 0x24, //
            0xF5, 0x0B, //
            0xF5, 0xEE, 0x06, 0x00, 0xFC, 0xFC, 0x00, 0x05, //
            0x00, 0x01,
        ];
        let out = run(&DecoderVariant::gamma_scout_online(), &raw);

        let notes = annotations(&out);
        let alarms = notes.iter().filter(|a| a.text.starts_with("Alarm 0xFC")).count();
        assert_eq!(alarms, 2);
        assert!(notes.iter().any(|a| a.text.contains("pulses: 5")));

        let m = measurements(&out);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].time, t0() + chrono::Duration::seconds(60));
        assert_eq!(m[0].index, 17);

        for pair in out.records.windows(2) {
            assert!(pair[0].index() <= pair[1].index());
        }
    }

    #[test]
    fn test_scout_skip_and_alarm() {
        let raw = [
            0xF5, 0xEF, 0x30, 0x12, 0x10, 0x01, 0x24, //
            0xF8, 0x03, 0xAA, 0xBB, //
            0xF9, //
            0x00, 0x02,
        ];
        let out = run(&DecoderVariant::gamma_scout_online(), &raw);

        let notes = annotations(&out);
        assert!(notes.iter().any(|a| a.text == "Skip: 3 bytes"));
        assert!(notes.iter().any(|a| a.text.contains("Dose rate overflowed")));
        let m = measurements(&out);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].value, 2.0);
        assert_eq!(m[0].index, 12);
    }

    #[test]
    fn test_scout_zero_skip_consumes_only_tag() {
        let raw = [
            0xF5, 0xEF, 0x30, 0x12, 0x10, 0x01, 0x24, //
            0xF8, 0x00, 0x05,
        ];
        let out = run(&DecoderVariant::gamma_scout_online(), &raw);

        assert!(!out.truncated);
        assert!(annotations(&out).iter().any(|a| a.text == "Skip: 0 bytes"));
        let m = measurements(&out);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].value, 5.0);
        assert_eq!(m[0].index, 8);
    }

    #[test]
    fn test_scout_classic_unknown_interval_code() {
        let raw = [
            0xF5, 0xEF, 0x30, 0x12, 0x10, 0x01, 0x24, //
            0xF5, 0x0C, // 10 s on Classic
            0xF5, 0x0D, // no Classic counterpart
            0x00, 0x05,
        ];
        let out = run(&DecoderVariant::gamma_scout_classic(), &raw);

        assert_eq!(
            out.issues,
            vec![DecodeIssue::InvalidTag {
                offset: 9,
                code: 0x0D
            }]
        );
        assert!(annotations(&out)
            .iter()
            .any(|a| a.text == "Protocol interval 0x0D unknown"));
        let m = measurements(&out);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].value, 5.0);
        assert_eq!(m[0].interval_s, 10);
    }

    #[test]
    fn test_scout_overflow_is_clamped() {
        let raw = [
            0xF5, 0xEF, 0x30, 0x12, 0x10, 0x01, 0x24, //
            0xFF, 0xF0,
        ];
        let mut variant = DecoderVariant::gamma_scout_online();
        variant.bare.clear();
        let out = run(&variant, &raw);

        let m = measurements(&out);
        assert_eq!(m[0].value, f64::from(u32::MAX));
        assert!(matches!(
            out.issues[0],
            DecodeIssue::ArithmeticOverflow { offset: 7, .. }
        ));
    }
}
