// sluice-core/src/domain/schedule/spec.rs

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    #[default]
    Minutes,
    Seconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn weekday(self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }
}

/// When a pipeline fires. Daily and weekly times are UTC wall-clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleSpec {
    Interval {
        interval: u64,
        #[serde(default)]
        unit: IntervalUnit,
    },
    Daily {
        #[serde(with = "hhmm")]
        time: NaiveTime,
    },
    Weekly {
        day: DayOfWeek,
        #[serde(with = "hhmm")]
        time: NaiveTime,
    },
    /// Accepted in configuration but never fires.
    Cron { expression: String },
}

impl ScheduleSpec {
    pub fn every_minutes(minutes: u64) -> Self {
        ScheduleSpec::Interval {
            interval: minutes,
            unit: IntervalUnit::Minutes,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ScheduleSpec::Cron { .. })
    }

    /// First firing time strictly after `after`. `None` for schedules that never fire.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            ScheduleSpec::Interval { interval, unit } => {
                let step = i64::try_from(*interval).ok()?.max(1);
                let delta = match unit {
                    IntervalUnit::Minutes => Duration::minutes(step),
                    IntervalUnit::Seconds => Duration::seconds(step),
                };
                after.checked_add_signed(delta)
            }
            ScheduleSpec::Daily { time } => {
                let today = after.date().and_time(*time);
                if today > after {
                    Some(today)
                } else {
                    Some(today + Duration::days(1))
                }
            }
            ScheduleSpec::Weekly { day, time } => {
                let target = day.weekday().num_days_from_monday() as i64;
                let current = after.weekday().num_days_from_monday() as i64;
                let ahead = (target - current).rem_euclid(7);
                let candidate = (after.date() + Duration::days(ahead)).and_time(*time);
                if candidate > after {
                    Some(candidate)
                } else {
                    Some(candidate + Duration::days(7))
                }
            }
            ScheduleSpec::Cron { .. } => None,
        }
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSpec::Interval { interval, unit } => {
                let unit = match unit {
                    IntervalUnit::Minutes => "min",
                    IntervalUnit::Seconds => "s",
                };
                write!(f, "every {}{}", interval, unit)
            }
            ScheduleSpec::Daily { time } => write!(f, "daily at {}", time.format("%H:%M")),
            ScheduleSpec::Weekly { day, time } => {
                write!(f, "{:?} at {}", day.weekday(), time.format("%H:%M"))
            }
            ScheduleSpec::Cron { expression } => write!(f, "cron '{}' (inactive)", expression),
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| D::Error::custom(format!("invalid time '{}': {}", raw, e)))
    }
}
