//! Run cadence for scheduled synchronization.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use serde::Deserialize;

/// How often a provider sync runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Hourly,
    Daily,
    Weekly,
    /// A cron expression, carried through from configuration.
    Cron(String),
}

impl fmt::Display for ScheduleFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleFrequency::Hourly => write!(f, "hourly"),
            ScheduleFrequency::Daily => write!(f, "daily"),
            ScheduleFrequency::Weekly => write!(f, "weekly"),
            ScheduleFrequency::Cron(expr) => write!(f, "{expr}"),
        }
    }
}

impl FromStr for ScheduleFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(ScheduleFrequency::Hourly),
            "daily" => Ok(ScheduleFrequency::Daily),
            "weekly" => Ok(ScheduleFrequency::Weekly),
            _ if s.contains(' ') => Ok(ScheduleFrequency::Cron(s.to_string())),
            _ => Err(format!("unknown schedule frequency: {s}")),
        }
    }
}

/// When a provider's scheduled runs happen. All times are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncSchedule {
    #[serde(default = "default_frequency")]
    pub frequency: ScheduleFrequency,

    /// Hour of day for daily and weekly runs.
    #[serde(default = "default_hour_of_day")]
    pub hour_of_day: u8,

    /// Day of week for weekly runs, 0 = Sunday.
    #[serde(default)]
    pub day_of_week: Option<u8>,
}

fn default_frequency() -> ScheduleFrequency {
    ScheduleFrequency::Daily
}

fn default_hour_of_day() -> u8 {
    2
}

impl Default for SyncSchedule {
    /// Daily at 02:00 UTC.
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            hour_of_day: default_hour_of_day(),
            day_of_week: None,
        }
    }
}

impl SyncSchedule {
    pub fn hourly() -> Self {
        Self {
            frequency: ScheduleFrequency::Hourly,
            ..Self::default()
        }
    }

    pub fn daily(hour_of_day: u8) -> Self {
        Self {
            frequency: ScheduleFrequency::Daily,
            hour_of_day: hour_of_day.min(23),
            day_of_week: None,
        }
    }

    pub fn weekly(day_of_week: u8, hour_of_day: u8) -> Self {
        Self {
            frequency: ScheduleFrequency::Weekly,
            hour_of_day: hour_of_day.min(23),
            day_of_week: Some(day_of_week.min(6)),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.hour_of_day > 23 {
            return Err("hour_of_day must be between 0 and 23".to_string());
        }
        if let Some(day) = self.day_of_week {
            if day > 6 {
                return Err("day_of_week must be between 0 and 6".to_string());
            }
        }
        if self.frequency == ScheduleFrequency::Weekly && self.day_of_week.is_none() {
            return Err("day_of_week is required for a weekly schedule".to_string());
        }
        Ok(())
    }

    /// The next run strictly after `from`.
    pub fn next_run_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let target_time = NaiveTime::from_hms_opt(u32::from(self.hour_of_day), 0, 0)?;

        match &self.frequency {
            ScheduleFrequency::Hourly => {
                let next = from + Duration::hours(1);
                let top_of_hour = NaiveTime::from_hms_opt(next.hour(), 0, 0)?;
                Some(next.date_naive().and_time(top_of_hour).and_utc())
            }
            ScheduleFrequency::Daily => next_daily(from, target_time),
            ScheduleFrequency::Weekly => {
                next_weekly(from, target_time, self.day_of_week.unwrap_or(0))
            }
            // Cron expressions are not evaluated yet; treat them as a
            // daily run at the configured hour.
            ScheduleFrequency::Cron(_) => next_daily(from, target_time),
        }
    }
}

fn next_daily(from: DateTime<Utc>, target: NaiveTime) -> Option<DateTime<Utc>> {
    let today = from.date_naive().and_time(target).and_utc();
    if today > from {
        Some(today)
    } else {
        Some(today + Duration::days(1))
    }
}

fn next_weekly(from: DateTime<Utc>, target: NaiveTime, day_of_week: u8) -> Option<DateTime<Utc>> {
    let current = from.weekday().num_days_from_sunday();
    let wanted = u32::from(day_of_week);
    let days_ahead = if wanted >= current {
        wanted - current
    } else {
        7 - (current - wanted)
    };

    let candidate = (from.date_naive() + Duration::days(i64::from(days_ahead)))
        .and_time(target)
        .and_utc();
    if candidate > from {
        Some(candidate)
    } else {
        Some(candidate + Duration::days(7))
    }
}
