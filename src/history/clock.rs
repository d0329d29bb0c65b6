//! Record clock
//!
//! Only timestamp records carry a time. Every other record is placed at
//! `nominal + sub_index * interval`, and `sub_index` advances once per
//! count record.

use chrono::{Duration, NaiveDateTime};

/// Time base for records between explicit timestamps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockState {
    nominal: NaiveDateTime,
    interval_s: u32,
    sub_index: u32,
}

impl ClockState {
    /// Clock at `nominal` with no save interval yet
    pub fn new(nominal: NaiveDateTime) -> Self {
        Self {
            nominal,
            interval_s: 0,
            sub_index: 0,
        }
    }

    /// Restart from an explicit timestamp
    pub fn reset(&mut self, time: NaiveDateTime, interval_s: u32, first_index: u32) {
        self.nominal = time;
        self.interval_s = interval_s;
        self.sub_index = first_index;
    }

    /// Change the save interval without losing elapsed time
    pub fn set_interval(&mut self, interval_s: u32) {
        if interval_s == self.interval_s {
            return;
        }
        self.nominal = self.now();
        self.sub_index = 0;
        self.interval_s = interval_s;
    }

    /// Shift the time base by an out-of-band delay
    pub fn delay(&mut self, seconds: u32) {
        self.nominal = offset(self.nominal, i64::from(seconds));
    }

    /// Time the next count record will get
    pub fn now(&self) -> NaiveDateTime {
        offset(
            self.nominal,
            i64::from(self.sub_index) * i64::from(self.interval_s),
        )
    }

    /// Time for the current count record; advances the clock
    pub fn next_record_time(&mut self) -> NaiveDateTime {
        let time = self.now();
        self.sub_index = self.sub_index.saturating_add(1);
        time
    }

    pub fn interval_s(&self) -> u32 {
        self.interval_s
    }

    pub fn sub_index(&self) -> u32 {
        self.sub_index
    }
}

fn offset(time: NaiveDateTime, seconds: i64) -> NaiveDateTime {
    time.checked_add_signed(Duration::seconds(seconds))
        .unwrap_or(NaiveDateTime::MAX)
}
