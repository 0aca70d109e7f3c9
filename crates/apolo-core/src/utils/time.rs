//! Time and duration helpers

use crate::error::BillingError;
use crate::BillingResult;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};

/// Sentinel for "never expires"
pub const META_UNLIMITED: &str = "*unlimited";
pub const META_NOW: &str = "*now";
pub const META_MONTH: &str = "*month";
pub const META_MONTH_END: &str = "*month_end";
pub const META_YEAR: &str = "*year";

/// Round `amount` up to the next multiple of `whole`
pub fn round_duration(whole: Duration, amount: Duration) -> Duration {
    let w = whole.num_nanoseconds().unwrap_or(0);
    let a = amount.num_nanoseconds().unwrap_or(0);
    if w == 0 || a % w == 0 {
        return amount;
    }
    Duration::nanoseconds(a + (w - a % w))
}

/// Multiply a duration by a run-length count.
///
/// Computed on i64 nanoseconds, saturating instead of wrapping.
pub fn scale(duration: Duration, factor: u32) -> Duration {
    match duration.num_nanoseconds() {
        Some(n) => Duration::nanoseconds(n.saturating_mul(i64::from(factor))),
        None if factor == 0 => Duration::zero(),
        None if duration < Duration::zero() => Duration::MIN,
        None => Duration::MAX,
    }
}

/// One of `factor` equal parts of `duration`, a factor of 0 counting as 1
pub fn unit_of(duration: Duration, factor: u32) -> Duration {
    let factor = factor.max(1);
    match duration.num_nanoseconds() {
        Some(n) => Duration::nanoseconds(n / i64::from(factor)),
        None => Duration::milliseconds(duration.num_milliseconds() / i64::from(factor)),
    }
}

/// Last instant (23:59:59) of the month containing `t`
pub fn end_of_month(t: DateTime<Utc>) -> DateTime<Utc> {
    let (y, m) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    let first_next = Utc
        .with_ymd_and_hms(y, m, 1, 0, 0, 0)
        .single()
        .unwrap_or(t);
    first_next - Duration::seconds(1)
}

/// Number of days in the month containing `t`
pub fn days_in_month(t: DateTime<Utc>) -> u32 {
    end_of_month(t).day()
}

/// Parse a Go-style duration (`1h30m`, `90s`, `500ms`) or bare seconds
pub fn parse_duration(s: &str) -> BillingResult<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Duration::zero());
    }
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(Duration::seconds(secs));
    }
    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut total = Duration::zero();
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| BillingError::UnsupportedFormat(s.to_string()))?;
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| BillingError::UnsupportedFormat(s.to_string()))?;
        rest = &rest[digits..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let nanos_per_unit: f64 = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(BillingError::UnsupportedFormat(s.to_string())),
        };
        total = total + Duration::nanoseconds((value * nanos_per_unit) as i64);
        rest = &rest[unit_len..];
    }
    Ok(if negative { -total } else { total })
}

/// Parse a timezone name: `UTC`, `Local` (treated as UTC) or a fixed offset
pub fn parse_timezone(tz: &str) -> BillingResult<FixedOffset> {
    let invalid = || BillingError::UnsupportedFormat(format!("timezone {}", tz));
    let secs = match tz {
        "" | "UTC" | "Local" => 0,
        other => {
            let (sign, rest) = match other.as_bytes().first() {
                Some(b'+') => (1, &other[1..]),
                Some(b'-') => (-1, &other[1..]),
                _ => return Err(invalid()),
            };
            let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
            let h: i32 = h.parse().map_err(|_| invalid())?;
            let m: i32 = m.parse().map_err(|_| invalid())?;
            sign * (h * 3600 + m * 60)
        }
    };
    FixedOffset::east_opt(secs).ok_or_else(invalid)
}

/// Parse an expiration-like time string, detecting its layout.
///
/// Returns `None` for the unlimited sentinels (`""`, `*unlimited`).
/// Relative forms (`*now`, `*month`, `*month_end`, `*year`, `+1h`) are
/// resolved against `now`. Naive layouts are read in `tz`.
pub fn parse_time_detect_layout(
    s: &str,
    tz: &str,
    now: DateTime<Utc>,
) -> BillingResult<Option<DateTime<Utc>>> {
    let s = s.trim();
    match s {
        "" | META_UNLIMITED => return Ok(None),
        META_NOW => return Ok(Some(now)),
        META_MONTH => return Ok(Some(add_months(now, 1))),
        META_MONTH_END => return Ok(Some(end_of_month(now))),
        META_YEAR => return Ok(Some(add_months(now, 12))),
        _ => {}
    }
    if let Some(rel) = s.strip_prefix('+') {
        return Ok(Some(now + parse_duration(rel)?));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(ts) = s.parse::<i64>() {
        return Ok(Utc.timestamp_opt(ts, 0).single());
    }
    let offset = parse_timezone(tz)?;
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
        })
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S"))?;
    Ok(offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc)))
}

/// Calendar month arithmetic, clamping to the target month's last day
pub fn add_months(t: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    t.checked_add_months(chrono::Months::new(months)).unwrap_or(t)
}

/// Serde helpers storing `chrono::Duration` as integer nanoseconds
pub mod duration_nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let nanos = d
            .num_nanoseconds()
            .ok_or_else(|| serde::ser::Error::custom("duration overflows i64 nanoseconds"))?;
        s.serialize_i64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::nanoseconds)
    }

    pub mod option {
        use chrono::Duration;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<i64>::deserialize(d).map(|o| o.map(Duration::nanoseconds))
        }
    }
}
