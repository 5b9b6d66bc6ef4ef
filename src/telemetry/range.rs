use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, SecondsFormat, Timelike, Utc};
use serde::Serialize;

/// Query window selector. It picks both the window length and the bucket
/// width: `Hour` and `Day` bucket by minute, `Week` buckets by UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Range {
    #[default]
    Hour,
    Day,
    Week,
}

impl Range {
    /// Unknown selectors fall back to `Hour`.
    pub fn parse(value: &str) -> Self {
        match value {
            "hour" => Range::Hour,
            "day" => Range::Day,
            "week" => Range::Week,
            _ => Range::Hour,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Range::Hour => "hour",
            Range::Day => "day",
            Range::Week => "week",
        }
    }

    pub fn span(self) -> Duration {
        match self {
            Range::Hour => Duration::hours(1),
            Range::Day => Duration::days(1),
            Range::Week => Duration::days(7),
        }
    }

    pub fn step(self) -> Duration {
        match self {
            Range::Hour | Range::Day => Duration::minutes(1),
            Range::Week => Duration::days(1),
        }
    }

    /// `(start, end)` of the window ending at `now`.
    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.span(), now)
    }

    pub fn bucket_key(self, t: DateTime<Utc>) -> String {
        match self {
            Range::Hour | Range::Day => minute_key(t),
            Range::Week => format_key(floor_day(t)),
        }
    }
}

/// Canonical key rendering: UTC, millisecond precision, `Z` suffix.
pub fn format_key(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn minute_key(t: DateTime<Utc>) -> String {
    format_key(floor_minute(t))
}

/// RFC 3339 with any offset, or an ISO-8601 date-time without one, which is
/// read as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|e| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|t| t.and_utc())
                .map_err(|_| e)
        })
}

fn floor_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn floor_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}
