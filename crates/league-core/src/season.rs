use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::timeframe::{SequencedTimeFrame, TimeFrame};
use crate::types::{RankingWithMeta, TeamId};

/// One competition year, immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Season {
    pub id: String,
    pub name: String,
    /// Competition id at the standings provider. `None` disables polling.
    pub provider_id: Option<String>,
    pub active: TimeFrame,
    pub entries_accepted: TimeFrame,
    /// Prediction windows, chronological and non-overlapping.
    pub selections_accepted: Vec<TimeFrame>,
    pub teams: Vec<TeamId>,
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonStatus {
    Pending,
    Active,
    Elapsed,
}

impl SeasonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonStatus::Pending => "pending",
            SeasonStatus::Active => "active",
            SeasonStatus::Elapsed => "elapsed",
        }
    }
}

/// Submission state of a season at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonState {
    pub status: SeasonStatus,
    pub accepting_entries: bool,
    pub accepting_selections: bool,
    pub next_window: Option<SequencedTimeFrame>,
}

impl Season {
    pub fn status_at(&self, t: DateTime<Utc>) -> SeasonStatus {
        if self.active.has_elapsed_by(t) {
            SeasonStatus::Elapsed
        } else if self.active.has_begun_by(t) {
            SeasonStatus::Active
        } else {
            SeasonStatus::Pending
        }
    }

    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.status_at(t) == SeasonStatus::Active
    }

    /// Evaluate the season at `t`. The window containing `t` wins; otherwise
    /// the next window still to open is reported.
    pub fn state_at(&self, t: DateTime<Utc>) -> SeasonState {
        let mut accepting_selections = false;
        let mut next_window = None;

        for (idx, window) in self.selections_accepted.iter().enumerate() {
            if window.contains(t) {
                accepting_selections = true;
                next_window = Some(self.sequenced(idx));
                break;
            }
            if window.from > t {
                next_window = Some(self.sequenced(idx));
                break;
            }
        }

        SeasonState {
            status: self.status_at(t),
            accepting_entries: self.entries_accepted.contains(t),
            accepting_selections,
            next_window,
        }
    }

    /// The first window whose start lies in `tf` (inclusive on both ends).
    pub fn window_begins_within(&self, tf: &TimeFrame) -> Option<SequencedTimeFrame> {
        self.selections_accepted
            .iter()
            .position(|w| w.begins_within(tf))
            .map(|idx| self.sequenced(idx))
    }

    /// The first window whose end lies in `tf` (inclusive on both ends).
    pub fn window_ends_within(&self, tf: &TimeFrame) -> Option<SequencedTimeFrame> {
        self.selections_accepted
            .iter()
            .position(|w| w.ends_within(tf))
            .map(|idx| self.sequenced(idx))
    }

    /// True when every team has played its full fixture list.
    pub fn is_completed_by(&self, rankings: &[RankingWithMeta]) -> bool {
        !rankings.is_empty()
            && rankings
                .iter()
                .all(|r| r.metadata.played_games == self.max_rounds)
    }

    pub fn has_team(&self, id: &TeamId) -> bool {
        self.teams.contains(id)
    }

    fn sequenced(&self, idx: usize) -> SequencedTimeFrame {
        SequencedTimeFrame {
            index: idx + 1,
            total: self.selections_accepted.len(),
            current: self.selections_accepted[idx],
            next: self.selections_accepted.get(idx + 1).copied(),
        }
    }
}

/// `[t - 24h, t - 1min]`: windows that opened since the previous daily run.
pub fn window_open_query(t: DateTime<Utc>) -> TimeFrame {
    TimeFrame {
        from: t - Duration::hours(24),
        until: t - Duration::minutes(1),
    }
}

/// `[t + 12h, t + 36h - 1min]`: windows that close during "tomorrow".
pub fn window_closing_query(t: DateTime<Utc>) -> TimeFrame {
    TimeFrame {
        from: t + Duration::hours(12),
        until: t + Duration::hours(36) - Duration::minutes(1),
    }
}
