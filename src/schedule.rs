// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cron-style schedule gate.
//!
//! A show is due when its five-field expression (minute, hour, day of month,
//! month, day of week) matches at least one whole minute after the minute of
//! the previous check, up to and including now. Matching happens in the
//! timezone the caller passes, which is the local timezone in production.

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Timelike, Utc};

use crate::error::ScheduleError;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Allowed values of one field as a bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        self.0 & (1u64 << value) != 0
    }
}

/// A parsed five-field cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    /// Both day fields restricted: a day matches when either of them does
    day_union: bool,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value the names list starts at
    names_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], names_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], names_base: 0 };
const DAY_OF_MONTH: FieldSpec =
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], names_base: 0 };
const MONTH: FieldSpec =
    FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES, names_base: 1 };
// 7 is accepted as an alias for Sunday and folded onto 0 after parsing
const DAY_OF_WEEK: FieldSpec =
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: &WEEKDAY_NAMES, names_base: 0 };

impl Schedule {
    /// Parse a cron expression, also accepting the usual `@daily`-style macros
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let invalid = |reason: String| ScheduleError::InvalidSchedule {
            expr: expr.to_string(),
            reason,
        };

        let trimmed = expr.trim();
        let expanded = match trimmed.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *".to_string(),
            "@monthly" => "0 0 1 * *".to_string(),
            "@weekly" => "0 0 * * 0".to_string(),
            "@daily" | "@midnight" => "0 0 * * *".to_string(),
            "@hourly" => "0 * * * *".to_string(),
            other if other.starts_with('@') => {
                return Err(invalid(format!("unknown macro '{trimmed}'")));
            }
            _ => trimmed.to_string(),
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        }

        let minutes = parse_field(fields[0], &MINUTE).map_err(&invalid)?;
        let hours = parse_field(fields[1], &HOUR).map_err(&invalid)?;
        let days_of_month = parse_field(fields[2], &DAY_OF_MONTH).map_err(&invalid)?;
        let months = parse_field(fields[3], &MONTH).map_err(&invalid)?;
        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK).map_err(&invalid)?;
        if days_of_week.contains(7) {
            days_of_week = FieldSet((days_of_week.0 | 1) & !(1 << 7));
        }

        let day_union = !fields[2].starts_with('*') && !fields[4].starts_with('*');

        Ok(Self {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            day_union,
        })
    }

    /// Whether the minute containing `t` matches the expression
    pub fn matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        self.minutes.contains(t.minute()) && self.hours.contains(t.hour()) && self.matches_day(t)
    }

    fn matches_day<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        if !self.months.contains(t.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(t.day());
        let dow = self.days_of_week.contains(t.weekday().num_days_from_sunday());
        if self.day_union { dom || dow } else { dom && dow }
    }

    /// First matching minute strictly after the minute of `after` and not later than `until`
    pub fn next_match<Tz: TimeZone>(
        &self,
        after: &DateTime<Utc>,
        until: &DateTime<Utc>,
        tz: &Tz,
    ) -> Option<DateTime<Utc>> {
        let mut candidate = truncate_to_minute(after) + Duration::minutes(1);

        while candidate <= *until {
            let local = candidate.with_timezone(tz);
            if !self.hours.contains(local.hour()) || !self.matches_day(&local) {
                // Nothing in the rest of this local hour can match
                candidate += Duration::minutes(i64::from(60 - local.minute()));
                continue;
            }
            if self.minutes.contains(local.minute()) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }

        None
    }
}

fn truncate_to_minute(t: &DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*t)
}

fn parse_field(text: &str, spec: &FieldSpec) -> Result<FieldSet, String> {
    let mut bits = 0u64;

    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("bad step '{step}' in {} field", spec.name))?;
                if step == 0 || step > spec.max - spec.min {
                    return Err(format!("step {step} out of range in {} field", spec.name));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_value(lo, spec)?, parse_value(hi, spec)?)
        } else {
            let value = parse_value(range, spec)?;
            // "5/15" means "from 5 to the end, every 15"
            if part.contains('/') { (value, spec.max) } else { (value, value) }
        };

        if start > end {
            return Err(format!("empty range '{range}' in {} field", spec.name));
        }

        let mut value = start;
        while value <= end {
            bits |= 1u64 << value;
            value += step;
        }
    }

    Ok(FieldSet(bits))
}

fn parse_value(text: &str, spec: &FieldSpec) -> Result<u32, String> {
    let lowered = text.to_ascii_lowercase();
    if let Some(pos) = spec.names.iter().position(|n| *n == lowered) {
        return Ok(spec.names_base + pos as u32);
    }

    let value: u32 = text
        .parse()
        .map_err(|_| format!("bad value '{text}' in {} field", spec.name))?;
    if value < spec.min || value > spec.max {
        return Err(format!(
            "value {value} out of range {}-{} in {} field",
            spec.min, spec.max, spec.name
        ));
    }
    Ok(value)
}

/// Whether a show with schedule `expr`, last checked at `last_check`, is due at `now`
///
/// Evaluated in the local timezone.
pub fn is_due(
    expr: &str,
    last_check: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool, ScheduleError> {
    is_due_in(expr, last_check, now, &Local)
}

/// [`is_due`] evaluated in an explicit timezone
pub fn is_due_in<Tz: TimeZone>(
    expr: &str,
    last_check: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<bool, ScheduleError> {
    let schedule = Schedule::parse(expr)?;
    Ok(match last_check {
        None => true,
        Some(last) => schedule.next_match(&last, &now, tz).is_some(),
    })
}
