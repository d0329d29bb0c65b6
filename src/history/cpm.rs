//! Rolling CPM reconstruction
//!
//! Counters that save per-second (or per-few-seconds) samples never store a
//! one-minute count. It is rebuilt here as the sum of the samples covering
//! the last minute.
//!
//! # Design Principles (KISS)
//! - One window per decode pass, sized from the active sampling mode
//! - A change of window size clears it, so samples of different scale never mix
//! - CPS windows start zero-filled and report from the first sample;
//!   interval-count windows report only once a full minute is covered

use std::collections::VecDeque;

use super::common::Sampling;

mod constants {
    pub const SECONDS_PER_MINUTE: u32 = 60;
}

/// Window length needed to cover one minute, None when no CPM can be derived
pub fn window_capacity(sampling: Sampling, interval_s: u32) -> Option<usize> {
    match sampling {
        Sampling::Cps => Some(constants::SECONDS_PER_MINUTE as usize),
        Sampling::Cpm => None,
        Sampling::Counts => {
            if (1..=constants::SECONDS_PER_MINUTE).contains(&interval_s) {
                Some((constants::SECONDS_PER_MINUTE / interval_s) as usize)
            } else {
                None
            }
        }
    }
}

/// Sliding sum over the last `capacity` samples
#[derive(Debug, Clone, Default)]
pub struct RollingWindow {
    capacity: Option<usize>,
    zero_primed: bool,
    samples: VecDeque<u64>,
    sum: u128,
}

impl RollingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize for a sampling mode; any size change clears the window
    pub fn configure(&mut self, sampling: Sampling, interval_s: u32) {
        let capacity = window_capacity(sampling, interval_s);
        let zero_primed = sampling == Sampling::Cps;
        if capacity != self.capacity || zero_primed != self.zero_primed {
            self.capacity = capacity;
            self.zero_primed = zero_primed;
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0;
    }

    pub fn is_active(&self) -> bool {
        self.capacity.is_some()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Add a sample and return the one-minute sum, if one can be given yet
    pub fn push(&mut self, sample: u64) -> Option<u128> {
        let capacity = self.capacity?;
        if self.samples.len() == capacity {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= u128::from(old);
            }
        }
        self.samples.push_back(sample);
        self.sum += u128::from(sample);

        if self.zero_primed || self.samples.len() == capacity {
            Some(self.sum)
        } else {
            None
        }
    }
}
