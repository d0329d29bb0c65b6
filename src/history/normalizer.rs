//! Fixed-column history rows
//!
//! Routes decoded measurements into the storage layout used for history
//! tables: one row per record index, with a CPM/CPS column pair per tube and
//! the ambient columns. Annotations go to a separate comment table. Columns a
//! record does not fill stay `None`, never zero.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::common::{ChannelSelector, DecodedRecord, Measurement};

/// Column names in row order
pub const ROW_HEADER: [&str; 14] = [
    "Index", "DateTime", "CPM", "CPS", "CPM1st", "CPS1st", "CPM2nd", "CPS2nd", "CPM3rd",
    "CPS3rd", "Temp", "Press", "Humid", "Xtra",
];

/// One storage row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub index: u32,
    pub time: NaiveDateTime,
    pub cpm: Option<f64>,
    pub cps: Option<f64>,
    pub cpm1st: Option<f64>,
    pub cps1st: Option<f64>,
    pub cpm2nd: Option<f64>,
    pub cps2nd: Option<f64>,
    pub cpm3rd: Option<f64>,
    pub cps3rd: Option<f64>,
    pub temp: Option<f64>,
    pub press: Option<f64>,
    pub humid: Option<f64>,
    /// Save interval in seconds for single-channel instruments
    pub xtra: Option<f64>,
}

impl HistoryRow {
    fn empty(index: u32, time: NaiveDateTime) -> Self {
        Self {
            index,
            time,
            cpm: None,
            cps: None,
            cpm1st: None,
            cps1st: None,
            cpm2nd: None,
            cps2nd: None,
            cpm3rd: None,
            cps3rd: None,
            temp: None,
            press: None,
            humid: None,
            xtra: None,
        }
    }

    fn slot(&mut self, channel: ChannelSelector, is_cpm: bool) -> &mut Option<f64> {
        match (channel, is_cpm) {
            (ChannelSelector::Combined, true) => &mut self.cpm,
            (ChannelSelector::Combined, false) => &mut self.cps,
            (ChannelSelector::Tube1, true) => &mut self.cpm1st,
            (ChannelSelector::Tube1, false) => &mut self.cps1st,
            (ChannelSelector::Tube2, true) => &mut self.cpm2nd,
            (ChannelSelector::Tube2, false) => &mut self.cps2nd,
            (ChannelSelector::Tube3 | ChannelSelector::Primary, true) => &mut self.cpm3rd,
            (ChannelSelector::Tube3 | ChannelSelector::Primary, false) => &mut self.cps3rd,
        }
    }

    fn place(&mut self, m: &Measurement) {
        *self.slot(m.channel, m.is_cpm) = Some(m.value);
        if m.channel == ChannelSelector::Primary {
            self.xtra = Some(f64::from(m.interval_s));
        }
    }

    /// Value columns in `ROW_HEADER` order, after index and time
    pub fn values(&self) -> [Option<f64>; 12] {
        [
            self.cpm,
            self.cps,
            self.cpm1st,
            self.cps1st,
            self.cpm2nd,
            self.cps2nd,
            self.cpm3rd,
            self.cps3rd,
            self.temp,
            self.press,
            self.humid,
            self.xtra,
        ]
    }

    /// Comma-separated line; empty fields for missing values
    pub fn to_csv(&self) -> String {
        let mut fields = vec![
            self.index.to_string(),
            self.time.format("%Y-%m-%d %H:%M:%S").to_string(),
        ];
        fields.extend(
            self.values()
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        fields.join(", ")
    }
}

/// One comment-table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentRow {
    pub index: u32,
    pub time: Option<NaiveDateTime>,
    pub text: String,
}

/// Rows and comments of a decoded history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedHistory {
    pub rows: Vec<HistoryRow>,
    pub comments: Vec<CommentRow>,
}

/// Split records into data rows and comment rows
///
/// Measurements sharing an index (a sample and the CPM derived from it) are
/// merged into one row.
pub fn normalize(records: &[DecodedRecord]) -> NormalizedHistory {
    let mut out = NormalizedHistory::default();
    for record in records {
        match record {
            DecodedRecord::Measurement(m) => match out.rows.last_mut() {
                Some(row) if row.index == m.index => row.place(m),
                _ => {
                    let mut row = HistoryRow::empty(m.index, m.time);
                    row.place(m);
                    out.rows.push(row);
                }
            },
            DecodedRecord::Annotation(a) => out.comments.push(CommentRow {
                index: a.index,
                time: a.time,
                text: a.text.clone(),
            }),
        }
    }
    out
}
