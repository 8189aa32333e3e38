use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, DurationRound, TimeZone, Timelike, Utc};

use crate::error::SchedulerError;

/// How far ahead `next_after` searches before giving up. Long enough for
/// expressions that only match on 29 February.
const SEARCH_HORIZON_DAYS: i64 = 366 * 8;

/// A standard five-field cron expression: minute, hour, day-of-month, month,
/// day-of-week. Fields accept `*`, single values, `a-b` ranges, `/n` steps and
/// comma-separated lists. Day-of-week runs 0-7 with both 0 and 7 meaning
/// Sunday. When both day fields are restricted a time matches if either does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    expr: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSpec {
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            spec: expr.to_string(),
            reason,
        };

        let expanded = match expr.trim() {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other => other,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let [min, hour, dom, month, dow] = fields[..] else {
            return Err(invalid(format!("expected 5 fields, got {}", fields.len())));
        };

        let mut days_of_week = parse_field(dow, 0, 7).map_err(&invalid)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expr: expr.trim().to_string(),
            minutes: parse_field(min, 0, 59).map_err(&invalid)?,
            hours: parse_field(hour, 0, 23).map_err(&invalid)?,
            days_of_month: parse_field(dom, 1, 31).map_err(&invalid)?,
            months: parse_field(month, 1, 12).map_err(&invalid)?,
            days_of_week,
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Whether the wall-clock minute of `t` is selected. Seconds are ignored.
    pub fn matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        self.hour_matches(t) && bit(self.minutes, t.minute())
    }

    fn hour_matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        bit(self.months, t.month()) && self.day_matches(t) && bit(self.hours, t.hour())
    }

    fn day_matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        let dom = bit(self.days_of_month, t.day());
        let dow = bit(self.days_of_week, t.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// The first minute strictly after `after` that matches when read as
    /// wall-clock time in `tz`.
    pub fn next_after<Tz: TimeZone>(&self, after: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
        let mut t = after.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        let horizon = t + Duration::days(SEARCH_HORIZON_DAYS);

        while t < horizon {
            let local = t.with_timezone(tz);
            if !self.hour_matches(&local) {
                // jump to the top of the next local hour
                t += Duration::minutes(60 - local.minute() as i64);
                continue;
            }
            if bit(self.minutes, local.minute()) {
                return Some(t);
            }
            t += Duration::minutes(1);
        }
        None
    }
}

impl FromStr for CronSpec {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronSpec::parse(s)
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

fn bit(set: u64, v: u32) -> bool {
    set & (1u64 << v) != 0
}

/// Parse one field into a bitset of the values it selects.
fn parse_field(field: &str, min: u32, max: u32) -> Result<u64, String> {
    let mut set = 0u64;
    for part in field.split(',') {
        if part.is_empty() {
            return Err(format!("empty list element in '{field}'"));
        }
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| format!("bad step '{s}'"))?;
                if step == 0 {
                    return Err("step must be positive".into());
                }
                (r, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, min, max)?, parse_value(b, min, max)?)
        } else {
            let v = parse_value(range, min, max)?;
            // `a/n` means "from a to the end in steps of n"
            (v, if step.is_some() { max } else { v })
        };
        if lo > hi {
            return Err(format!("range {lo}-{hi} is reversed"));
        }

        for v in (lo..=hi).step_by(step.unwrap_or(1) as usize) {
            set |= 1u64 << v;
        }
    }
    Ok(set)
}

fn parse_value(s: &str, min: u32, max: u32) -> Result<u32, String> {
    let v: u32 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if v < min || v > max {
        return Err(format!("{v} is outside {min}-{max}"));
    }
    Ok(v)
}
