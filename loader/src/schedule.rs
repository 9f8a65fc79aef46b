//! Reload schedules parsed from resource properties.
//!
//! Three keys are understood:
//!
//! - `period`: repeat interval, `HH[:MM[:SS[:mmm]]]`
//! - `delay`: initial delay before the first periodic load, same format
//! - `at`: comma separated times of day (UTC) for daily loads, same format
//!
//! `period` and `at` may be combined; each arms its own timer.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};

use crate::error::{LoaderError, LoaderResult};

pub const PERIOD_KEY: &str = "period";
pub const DELAY_KEY: &str = "delay";
pub const AT_KEY: &str = "at";

/// Timer description for a scheduled resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    /// Delay before the first periodic load.
    pub delay: Duration,
    /// Repeat interval of periodic loads.
    pub period: Option<Duration>,
    /// Daily fire times.
    pub daily_at: Vec<NaiveTime>,
}

impl Schedule {
    /// Build a schedule from `period`, `delay` and `at` properties.
    pub fn from_properties(properties: &HashMap<String, String>) -> LoaderResult<Self> {
        let period = properties
            .get(PERIOD_KEY)
            .map(|v| parse_duration(v))
            .transpose()?;

        if period == Some(Duration::ZERO) {
            return Err(LoaderError::InvalidSchedule("period must be non-zero".to_string()));
        }

        let delay = properties
            .get(DELAY_KEY)
            .map(|v| parse_duration(v))
            .transpose()?
            .unwrap_or(Duration::ZERO);

        let daily_at = match properties.get(AT_KEY) {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(parse_time_of_day)
                .collect::<LoaderResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let schedule = Self {
            delay,
            period,
            daily_at,
        };

        if schedule.is_empty() {
            return Err(LoaderError::InvalidSchedule(format!(
                "one of '{}' or '{}' is required",
                PERIOD_KEY, AT_KEY
            )));
        }

        Ok(schedule)
    }

    /// Check if no timer would be armed.
    pub fn is_empty(&self) -> bool {
        self.period.is_none() && self.daily_at.is_empty()
    }

    /// Next daily fire time strictly after `now`.
    pub fn next_daily_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        self.daily_at
            .iter()
            .map(|time| {
                let candidate = Utc.from_utc_datetime(&today.and_time(*time));
                if candidate <= now {
                    candidate + ChronoDuration::days(1)
                } else {
                    candidate
                }
            })
            .min()
    }
}

fn split_components(value: &str) -> LoaderResult<Vec<u64>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoaderError::InvalidSchedule("empty duration".to_string()));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 4 {
        return Err(LoaderError::InvalidSchedule(format!(
            "too many components in {:?}",
            value
        )));
    }

    parts
        .iter()
        .map(|p| {
            p.trim().parse::<u64>().map_err(|_| {
                LoaderError::InvalidSchedule(format!("invalid component {:?} in {:?}", p, value))
            })
        })
        .collect()
}

/// Parse `HH[:MM[:SS[:mmm]]]` into a duration.
pub fn parse_duration(value: &str) -> LoaderResult<Duration> {
    let parts = split_components(value)?;
    let mut millis = 0u64;
    for (index, part) in parts.iter().enumerate() {
        let unit = match index {
            0 => 3_600_000,
            1 => 60_000,
            2 => 1_000,
            _ => 1,
        };
        millis = part
            .checked_mul(unit)
            .and_then(|v| millis.checked_add(v))
            .ok_or_else(|| LoaderError::InvalidSchedule(format!("{:?} overflows", value)))?;
    }
    Ok(Duration::from_millis(millis))
}

/// Parse `HH[:MM[:SS[:mmm]]]` into a time of day.
pub fn parse_time_of_day(value: &str) -> LoaderResult<NaiveTime> {
    let parts = split_components(value)?;
    let get = |i: usize| parts.get(i).copied().unwrap_or(0) as u32;
    NaiveTime::from_hms_milli_opt(get(0), get(1), get(2), get(3))
        .ok_or_else(|| LoaderError::InvalidSchedule(format!("{:?} is not a time of day", value)))
}
