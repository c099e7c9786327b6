//! Accumulated time-series readings, one sequence per channel.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One of the three CO2 measurement streams the sensor exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Raw,
    Limited,
    Unlimited,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Raw, Channel::Limited, Channel::Unlimited];

    pub fn label(self) -> &'static str {
        match self {
            Channel::Raw => "Raw (PPM)",
            Channel::Limited => "Lim (PPM)",
            Channel::Unlimited => "Unlim (PPM)",
        }
    }
}

/// A single timestamped sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Local>,
    pub value: u16,
}

/// Append-only, insertion-ordered sequences of readings.
///
/// Mutation always happens inside the monitor's state lock, shared with
/// the poll tick, so a `clear` can never interleave with a
/// partially-written tick. A tick that fails midway legitimately leaves
/// the sequences at different lengths; consumers pair them up to the
/// shortest.
#[derive(Debug)]
pub struct ReadingStore {
    raw: Vec<Reading>,
    limited: Vec<Reading>,
    unlimited: Vec<Reading>,
}

impl ReadingStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            limited: Vec::with_capacity(capacity),
            unlimited: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, channel: Channel, timestamp: DateTime<Local>, value: u16) {
        self.seq_mut(channel).push(Reading { timestamp, value });
    }

    pub fn channel(&self, channel: Channel) -> &[Reading] {
        match channel {
            Channel::Raw => &self.raw,
            Channel::Limited => &self.limited,
            Channel::Unlimited => &self.unlimited,
        }
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.channel(channel).len()
    }

    pub fn is_empty(&self) -> bool {
        Channel::ALL.iter().all(|&c| self.channel(c).is_empty())
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.limited.clear();
        self.unlimited.clear();
    }

    fn seq_mut(&mut self, channel: Channel) -> &mut Vec<Reading> {
        match channel {
            Channel::Raw => &mut self.raw,
            Channel::Limited => &mut self.limited,
            Channel::Unlimited => &mut self.unlimited,
        }
    }
}
