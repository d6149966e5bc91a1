//! Duration parsing and versatile datetime normalization.
//!
//! Input plugin configurations accept datetimes in several forms:
//!
//! - keywords `now` and `never`
//! - signed relative offsets like `+1h30m` or `-15m` (units `d`, `h`, `m`, `s`)
//! - RFC 3339 datetimes like `2024-01-01T00:00:00Z`
//! - naive datetimes `2024-01-01T00:00:00` and dates `2024-01-01`, which are
//!   interpreted in the generator timezone

use crate::error::PluginError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parse a duration string like `1h30m`, `90s`, `2d` or `300` into a [`TimeDelta`].
///
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Any sequence of `<number><unit>` with units `d`, `h`, `m`, `s`: "1h30m"
/// - An optional leading sign: "-15m"
pub fn parse_duration(s: &str) -> Result<TimeDelta, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".to_string());
    }

    let (negative, body) = match s.as_bytes()[0] {
        b'+' => (false, &s[1..]),
        b'-' => (true, &s[1..]),
        _ => (false, s),
    };

    if body.is_empty() {
        return Err(format!("Invalid duration value: {s}"));
    }

    // No unit - treat as seconds
    if let Ok(secs) = body.parse::<i64>() {
        let secs = if negative { -secs } else { secs };
        return TimeDelta::try_seconds(secs).ok_or_else(|| format!("Duration out of range: {s}"));
    }

    let mut total: i64 = 0;
    let mut digits = String::new();

    for c in body.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let multiplier = match c {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("Invalid duration unit `{c}` in: {s}")),
        };

        let value: i64 = digits
            .parse()
            .map_err(|_| format!("Missing number before `{c}` in: {s}"))?;
        digits.clear();

        total = value
            .checked_mul(multiplier)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("Duration out of range: {s}"))?;
    }

    if !digits.is_empty() {
        return Err(format!("Missing unit after `{digits}` in: {s}"));
    }

    let total = if negative { -total } else { total };
    TimeDelta::try_seconds(total).ok_or_else(|| format!("Duration out of range: {s}"))
}

/// A datetime expression from plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersatileDatetime {
    Now,
    Never,
    Relative(TimeDelta),
    Absolute(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl TryFrom<String> for VersatileDatetime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for VersatileDatetime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.eq_ignore_ascii_case("now") {
            return Ok(Self::Now);
        }
        if s.eq_ignore_ascii_case("never") {
            return Ok(Self::Never);
        }
        if s.starts_with('+') || s.starts_with('-') {
            return parse_duration(s).map(Self::Relative);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::Absolute(dt));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self::Naive(naive));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Naive(date.and_time(chrono::NaiveTime::MIN)));
        }

        Err(format!("Cannot parse datetime expression `{s}`"))
    }
}

impl fmt::Display for VersatileDatetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => write!(f, "now"),
            Self::Never => write!(f, "never"),
            Self::Relative(delta) => {
                let secs = delta.num_seconds();
                let sign = if secs < 0 { '-' } else { '+' };
                write!(f, "{sign}{}s", secs.unsigned_abs())
            }
            Self::Absolute(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Naive(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl From<VersatileDatetime> for String {
    fn from(value: VersatileDatetime) -> Self {
        value.to_string()
    }
}

/// Which point an absent datetime resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonePoint {
    Now,
    Min,
    Max,
}

fn far_past() -> DateTime<Utc> {
    // 0001-01-01T00:00:00Z
    DateTime::from_timestamp(-62_135_596_800, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn far_future() -> DateTime<Utc> {
    // 9999-12-31T23:59:59Z
    DateTime::from_timestamp(253_402_300_799, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Resolve a versatile datetime to a point in `timezone`.
///
/// Relative offsets are applied to `relative_base`, or to the current time
/// when no base is given. `now` is always the current time.
pub fn normalize_versatile_datetime(
    value: Option<&VersatileDatetime>,
    timezone: Tz,
    relative_base: Option<DateTime<Tz>>,
    none_point: NonePoint,
) -> Result<DateTime<Tz>, PluginError> {
    let now = Utc::now().with_timezone(&timezone);

    let Some(value) = value else {
        return Ok(match none_point {
            NonePoint::Now => now,
            NonePoint::Min => far_past().with_timezone(&timezone),
            NonePoint::Max => far_future().with_timezone(&timezone),
        });
    };

    match value {
        VersatileDatetime::Now => Ok(now),
        VersatileDatetime::Never => Ok(far_future().with_timezone(&timezone)),
        VersatileDatetime::Relative(delta) => {
            let base = relative_base.unwrap_or(now);
            base.checked_add_signed(*delta).ok_or_else(|| {
                PluginError::configuration(format!("Datetime `{value}` is out of range"))
            })
        }
        VersatileDatetime::Absolute(dt) => Ok(dt.with_timezone(&timezone)),
        VersatileDatetime::Naive(naive) => timezone
            .from_local_datetime(naive)
            .earliest()
            .ok_or_else(|| {
                PluginError::configuration(format!(
                    "Datetime `{value}` does not exist in timezone {timezone}"
                ))
            }),
    }
}

/// Resolve a start/end pair. Relative `end` values are based on the resolved start.
pub fn normalize_versatile_daterange(
    start: Option<&VersatileDatetime>,
    end: Option<&VersatileDatetime>,
    timezone: Tz,
    none_start: NonePoint,
) -> Result<(DateTime<Tz>, DateTime<Tz>), PluginError> {
    if matches!(start, Some(VersatileDatetime::Never)) {
        return Err(PluginError::configuration(
            "Start of the date range cannot be `never`",
        ));
    }

    let start = normalize_versatile_datetime(start, timezone, None, none_start)?;
    let end = normalize_versatile_datetime(end, timezone, Some(start), NonePoint::Max)?;

    if start > end {
        return Err(PluginError::configuration(format!(
            "Start of the date range ({}) is later than its end ({})",
            start.to_rfc3339(),
            end.to_rfc3339()
        )));
    }

    Ok((start, end))
}
