//! Common types for the history decoder

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::DecodeIssue;

/// Raw history memory as handed over by the acquisition layer
#[derive(Debug, Clone)]
pub struct RawLog {
    pub data: Vec<u8>,
    pub size: usize,
}

impl RawLog {
    /// Create RawLog from a byte vector
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len();
        Self { data, size }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Which tube (or sensor) a decoded count belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelector {
    /// Both tubes / the only tube of a GMC counter
    #[default]
    Combined,
    Tube1,
    Tube2,
    Tube3,
    /// Single-channel instruments without tube selection (Gamma-Scout)
    Primary,
}

impl ChannelSelector {
    /// Map a GMC tube-select byte (0 = both, 1 = tube 1, 2 = tube 2)
    pub fn from_tube_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Combined),
            1 => Some(Self::Tube1),
            2 => Some(Self::Tube2),
            3 => Some(Self::Tube3),
            _ => None,
        }
    }
}

/// How the device sampled the values following a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Counts per second; a one-minute sum is reconstructed from the last 60
    Cps,
    /// Device-native counts per minute
    Cpm,
    /// Counts accumulated over the save interval
    Counts,
}

/// A single decoded count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Offset of the record start in the unrolled log
    ///
    /// Strictly increasing across source records. A derived CPM carries the
    /// index of the sample it was summed from, so it repeats that index.
    pub index: u32,
    pub time: NaiveDateTime,
    pub channel: ChannelSelector,
    pub is_cpm: bool,
    /// Negative when the record is flagged untrustworthy
    pub value: f64,
    /// False for sign-flagged values
    pub valid: bool,
    /// True for a CPM synthesized from the rolling window
    pub derived: bool,
    /// Active save interval in seconds
    pub interval_s: u32,
}

/// A non-numeric record: timestamp markers, notes, flags, diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub index: u32,
    pub time: Option<NaiveDateTime>,
    pub text: String,
}

/// Decoded history record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DecodedRecord {
    Measurement(Measurement),
    Annotation(Annotation),
}

impl DecodedRecord {
    pub fn index(&self) -> u32 {
        match self {
            Self::Measurement(m) => m.index,
            Self::Annotation(a) => a.index,
        }
    }

    pub fn time(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Measurement(m) => Some(m.time),
            Self::Annotation(a) => a.time,
        }
    }

    pub fn as_measurement(&self) -> Option<&Measurement> {
        match self {
            Self::Measurement(m) => Some(m),
            Self::Annotation(_) => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&Annotation> {
        match self {
            Self::Measurement(_) => None,
            Self::Annotation(a) => Some(a),
        }
    }

    /// Format record for display
    pub fn display(&self) -> String {
        match self {
            Self::Measurement(m) => format!(
                "#{:7} {} {:>8} {:?}{}{} = {}",
                m.index,
                m.time.format("%Y-%m-%d %H:%M:%S"),
                if m.is_cpm { "CPM" } else { "CPS" },
                m.channel,
                if m.derived { " [rolling]" } else { "" },
                if m.valid { "" } else { " [INVALID]" },
                m.value
            ),
            Self::Annotation(a) => format!(
                "#{:7} {} {}",
                a.index,
                a.time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-------------------".to_string()),
                a.text
            ),
        }
    }
}

impl std::fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Output of one decode pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeResult {
    pub records: Vec<DecodedRecord>,
    /// Log ended inside a record
    pub truncated: bool,
    /// Physical offset of the first valid timestamp
    pub anchor_offset: Option<u32>,
    /// Recoverable conditions, in the order they were met
    pub issues: Vec<DecodeIssue>,
}

impl DecodeResult {
    /// Result for a buffer without usable history
    pub fn no_anchor(scanned: usize) -> Self {
        Self {
            records: Vec::new(),
            truncated: false,
            anchor_offset: None,
            issues: vec![DecodeIssue::NoAnchorFound { scanned }],
        }
    }

    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.records.iter().filter_map(DecodedRecord::as_measurement)
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.records.iter().filter_map(DecodedRecord::as_annotation)
    }
}
