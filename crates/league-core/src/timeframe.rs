use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LeagueError, Result};

/// A span of time `[from, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeFrame {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeFrame {
    /// Build a timeframe, rejecting one whose `until` does not come after `from`.
    pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self> {
        let tf = Self { from, until };
        if !tf.is_valid() {
            return Err(LeagueError::ValidationFailed(format!(
                "timeframe until {until} must occur after from {from}"
            )));
        }
        Ok(tf)
    }

    pub fn is_valid(&self) -> bool {
        self.from < self.until
    }

    pub fn has_begun_by(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts
    }

    pub fn has_elapsed_by(&self, ts: DateTime<Utc>) -> bool {
        self.until <= ts
    }

    /// Half-open membership: an instant equal to `until` belongs to whatever
    /// comes next, not to this frame.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.has_begun_by(ts) && !self.has_elapsed_by(ts)
    }

    /// Symmetric. Consecutive frames (one's `until` equals the other's
    /// `from`) do not overlap.
    pub fn overlaps_with(&self, other: &TimeFrame) -> bool {
        self.from < other.until && other.from < self.until
    }

    /// True when `from` lies within `tf`, both ends inclusive.
    pub fn begins_within(&self, tf: &TimeFrame) -> bool {
        tf.from <= self.from && self.from <= tf.until
    }

    /// True when `until` lies within `tf`, both ends inclusive.
    pub fn ends_within(&self, tf: &TimeFrame) -> bool {
        tf.from <= self.until && self.until <= tf.until
    }
}

/// A timeframe positioned within a season's ordered list of prediction windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequencedTimeFrame {
    /// 1-based position of `current` in the sequence.
    pub index: usize,
    pub total: usize,
    pub current: TimeFrame,
    pub next: Option<TimeFrame>,
}

impl SequencedTimeFrame {
    pub fn is_last(&self) -> bool {
        self.index == self.total
    }
}
