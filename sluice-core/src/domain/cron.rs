//! Five-field cron schedules
//!
//! Supports the classic `minute hour day-of-month month day-of-week` syntax
//! with `*`, single values, ranges (`1-5`), lists (`1,15`) and steps (`*/10`,
//! `0-30/5`). Schedules are evaluated in UTC with minute granularity.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How far ahead `next_after` searches before giving up
const SEARCH_HORIZON_DAYS: i64 = 366 * 4;

/// Errors produced while parsing a cron expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("cron expression must have 5 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
};

/// A parsed cron schedule
///
/// Each field is stored as a bitset of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parses a five-field cron expression
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let minutes = parse_field(&MINUTE, fields[0])?;
        let hours = parse_field(&HOUR, fields[1])?;
        let days_of_month = parse_field(&DAY_OF_MONTH, fields[2])?;
        let months = parse_field(&MONTH, fields[3])?;
        let mut days_of_week = parse_field(&DAY_OF_WEEK, fields[4])?;

        // 7 is an alias for Sunday
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: fields.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The normalised source expression
    pub fn expression(&self) -> &str {
        &self.source
    }

    /// Returns true if the schedule fires at the minute containing `at`
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        bit(self.minutes, at.minute())
            && bit(self.hours, at.hour())
            && bit(self.months, at.month())
            && self.day_matches(at)
    }

    /// Returns the first firing time strictly after `after`
    ///
    /// Returns `None` when the expression never fires within four years
    /// (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = from_timestamp((after.timestamp().div_euclid(60) + 1) * 60)?;
        let limit = after + chrono::Duration::days(SEARCH_HORIZON_DAYS);

        while candidate <= limit {
            if !bit(self.months, candidate.month()) {
                candidate = start_of_next_month(candidate)?;
                continue;
            }
            if !self.day_matches(candidate) {
                candidate = from_timestamp((candidate.timestamp().div_euclid(86_400) + 1) * 86_400)?;
                continue;
            }
            if !bit(self.hours, candidate.hour()) {
                candidate = from_timestamp((candidate.timestamp().div_euclid(3_600) + 1) * 3_600)?;
                continue;
            }
            if !bit(self.minutes, candidate.minute()) {
                candidate += chrono::Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }

        None
    }

    fn day_matches(&self, at: DateTime<Utc>) -> bool {
        let dom = bit(self.days_of_month, at.day());
        let dow = bit(self.days_of_week, at.weekday().num_days_from_sunday());

        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

fn parse_field(spec: &FieldSpec, text: &str) -> Result<u64, CronError> {
    let invalid = |reason: String| CronError::InvalidField {
        field: spec.name,
        value: text.to_string(),
        reason,
    };

    let mut bits = 0u64;

    for part in text.split(',') {
        if part.is_empty() {
            return Err(invalid("empty list element".to_string()));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("step '{}' is not a number", step)))?;
                if step == 0 {
                    return Err(invalid("step must be greater than 0".to_string()));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((start, end)) = range.split_once('-') {
            (parse_value(spec, start, &invalid)?, parse_value(spec, end, &invalid)?)
        } else {
            let value = parse_value(spec, range, &invalid)?;
            // `5/15` means "from 5 to the end, every 15"
            if step.is_some() {
                (value, spec.max)
            } else {
                (value, value)
            }
        };

        if start > end {
            return Err(invalid(format!("range {}-{} is reversed", start, end)));
        }

        for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
            bits |= 1 << value;
        }
    }

    Ok(bits)
}

fn parse_value(
    spec: &FieldSpec,
    text: &str,
    invalid: &dyn Fn(String) -> CronError,
) -> Result<u32, CronError> {
    let value: u32 = text
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a number", text)))?;

    if value < spec.min || value > spec.max {
        return Err(invalid(format!(
            "{} is outside {}-{}",
            value, spec.min, spec.max
        )));
    }

    Ok(value)
}

fn bit(set: u64, value: u32) -> bool {
    set & (1 << value) != 0
}

fn from_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn start_of_next_month(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CronSchedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CronSchedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        CronSchedule::parse(&source).map_err(serde::de::Error::custom)
    }
}
