//! Calendar recurrence pattern ("timing")
//!
//! A [`RITiming`] is a set of calendar constraints (years, months, month
//! days, weekdays) plus an optional daily window. Empty sets are
//! wildcards. It answers containment questions for the rating splitter
//! and renders itself as a cron expression for the scheduler.

use apolo_core::{BillingError, BillingResult};
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

pub const META_ASAP: &str = "*asap";
pub const META_EVERY_MINUTE: &str = "*every_minute";
pub const META_HOURLY: &str = "*hourly";

/// Month day standing for "last day of the month"
pub const LAST_MONTH_DAY: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RITiming {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub months: Vec<u32>,
    #[serde(default)]
    pub month_days: Vec<i32>,
    #[serde(default)]
    pub week_days: Vec<Weekday>,
    /// `HH:MM:SS`, `*asap`, `+duration` or empty
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

/// Parse `HH:MM:SS` leniently: components that fail to parse count as zero
fn lenient_hms(s: &str) -> (u32, u32, u32) {
    let mut parts = s.split(':').map(|p| p.trim().parse::<u32>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

fn at_time_of_day(t: DateTime<Utc>, (h, m, s): (u32, u32, u32)) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(h.min(23), m.min(59), s.min(59)).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&t.date_naive().and_time(time))
}

fn is_last_day_of_month(t: DateTime<Utc>) -> bool {
    (t + Duration::days(1)).month() != t.month()
}

/// Check a single `HH`/`MM`/`SS` component: number in range or `*`
fn valid_component(c: &str, max: u32) -> bool {
    c == "*" || (c.len() <= 2 && c.parse::<u32>().map_or(false, |v| v <= max))
}

/// Check a start/end time-of-day string
pub fn verify_format(s: &str) -> bool {
    if s.is_empty() || s == META_ASAP || s.starts_with('+') {
        return true;
    }
    if s.len() > 8 {
        return false;
    }
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == 3
        && valid_component(parts[0], 23)
        && valid_component(parts[1], 59)
        && valid_component(parts[2], 59)
}

impl RITiming {
    /// Build a timing from its parts, rejecting malformed values
    pub fn new(
        years: Vec<i32>,
        months: Vec<u32>,
        month_days: Vec<i32>,
        week_days: Vec<Weekday>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> BillingResult<Self> {
        let timing = Self {
            id: String::new(),
            years,
            months,
            month_days,
            week_days,
            start_time: start_time.into(),
            end_time: end_time.into(),
        };
        timing.validate()?;
        Ok(timing)
    }

    /// Validate calendar values and the daily window format
    pub fn validate(&self) -> BillingResult<()> {
        if !verify_format(&self.start_time) {
            return Err(BillingError::InvalidTiming(format!(
                "start time {:?}",
                self.start_time
            )));
        }
        if self.end_time.starts_with('+') || self.end_time == META_ASAP || !verify_format(&self.end_time)
        {
            return Err(BillingError::InvalidTiming(format!(
                "end time {:?}",
                self.end_time
            )));
        }
        if let Some(m) = self.months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(BillingError::InvalidTiming(format!("month {}", m)));
        }
        if let Some(d) = self
            .month_days
            .iter()
            .find(|d| **d != LAST_MONTH_DAY && !(1..=31).contains(*d))
        {
            return Err(BillingError::InvalidTiming(format!("month day {}", d)));
        }
        Ok(())
    }

    fn has_fixed_start(&self) -> bool {
        !self.start_time.is_empty()
            && self.start_time != META_ASAP
            && !self.start_time.starts_with('+')
    }

    /// Whether `t` falls on a listed month day (or the last day, for -1)
    pub fn matches_month_day(&self, t: DateTime<Utc>) -> bool {
        self.month_days.is_empty()
            || self.month_days.iter().any(|d| {
                *d == t.day() as i32 || (*d == LAST_MONTH_DAY && is_last_day_of_month(t))
            })
    }

    /// Test whether `t` is inside the pattern.
    ///
    /// Every non-empty set must match. A start time excludes instants whose
    /// time of day is strictly before it, an end time excludes instants
    /// strictly after it. Malformed `HH:MM:SS` components read as zero;
    /// use [`RITiming::validate`] to reject them up front.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if !self.years.is_empty() && !self.years.contains(&t.year()) {
            return false;
        }
        if !self.months.is_empty() && !self.months.contains(&t.month()) {
            return false;
        }
        if !self.matches_month_day(t) {
            return false;
        }
        if !self.week_days.is_empty() && !self.week_days.contains(&t.weekday()) {
            return false;
        }
        let tod = (t.hour(), t.minute(), t.second());
        if self.has_fixed_start() && tod < lenient_hms(&self.start_time) {
            return false;
        }
        if !self.end_time.is_empty() && tod > lenient_hms(&self.end_time) {
            return false;
        }
        true
    }

    /// Start of the daily window on the date of `t`
    pub fn left_margin(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        if self.has_fixed_start() {
            at_time_of_day(t, lenient_hms(&self.start_time))
        } else {
            at_time_of_day(t, (0, 0, 0))
        }
    }

    /// End of the daily window on the date of `t`.
    ///
    /// With an end time this is the end time itself. Without one the window
    /// runs to 23:59:59 and the margin is the following midnight, so splits
    /// land on day boundaries.
    pub fn right_margin(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        if !self.end_time.is_empty() {
            return at_time_of_day(t, lenient_hms(&self.end_time));
        }
        at_time_of_day(t, (23, 59, 59)) + Duration::seconds(1)
    }

    pub fn is_asap(&self) -> bool {
        self.start_time == META_ASAP
    }

    /// Render as a 7-field cron expression: `sec min hour dom month dow year`.
    ///
    /// Month day -1 widens the day field to 28-31; callers keep only the
    /// instants accepted by [`RITiming::matches_month_day`].
    pub fn cron_string(&self) -> String {
        let (sec, min, hour) = match self.start_time.as_str() {
            "" | META_ASAP => ("*".to_string(), "*".to_string(), "*".to_string()),
            META_EVERY_MINUTE => ("0".to_string(), "*".to_string(), "*".to_string()),
            META_HOURLY => ("0".to_string(), "0".to_string(), "*".to_string()),
            st => {
                let parts: Vec<&str> = st.split(':').collect();
                if parts.len() == 3 {
                    let clean = |p: &str| {
                        if p == "*" {
                            p.to_string()
                        } else {
                            p.parse::<u32>().map_or_else(|_| "0".to_string(), |v| v.to_string())
                        }
                    };
                    (clean(parts[2]), clean(parts[1]), clean(parts[0]))
                } else {
                    ("*".to_string(), "*".to_string(), "*".to_string())
                }
            }
        };

        let join = |items: Vec<String>| {
            if items.is_empty() {
                "*".to_string()
            } else {
                items.join(",")
            }
        };

        let mut days: Vec<String> = self
            .month_days
            .iter()
            .filter(|d| **d != LAST_MONTH_DAY)
            .map(|d| d.to_string())
            .collect();
        if self.month_days.contains(&LAST_MONTH_DAY) {
            days.push("28-31".to_string());
        }
        let month_day = join(days);
        let month = join(self.months.iter().map(|m| m.to_string()).collect());
        let week_day = join(self.week_days.iter().map(|w| w.to_string()).collect());
        let year = join(self.years.iter().map(|y| y.to_string()).collect());

        format!(
            "{} {} {} {} {} {} {}",
            sec, min, hour, month_day, month, week_day, year
        )
    }
}
