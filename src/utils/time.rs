use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{
    DATE_INACTIVE_DAY, DATE_INACTIVE_MONTH, DATE_INACTIVE_YEAR, SGT_OFFSET_SECS,
};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Converts a UTC instant to Singapore local time.
pub fn to_sgt(utc: DateTime<Utc>) -> NaiveDateTime {
    utc.naive_utc() + Duration::seconds(SGT_OFFSET_SECS as i64)
}

pub fn now_sgt() -> NaiveDateTime {
    to_sgt(Utc::now())
}

/// Parses an API or user timestamp into Singapore local time.
///
/// Offset-carrying RFC 3339 strings are converted to SGT; naive strings and
/// bare dates are taken to be SGT already.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(to_sgt(dt.with_timezone(&Utc)));
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Unrecognised timestamp: '{}'", input)))
}

/// Floors a timestamp to a multiple of `step_minutes` within its day.
pub fn round_down(timestamp: NaiveDateTime, step_minutes: i64) -> NaiveDateTime {
    let step = step_minutes.max(1) * 60;
    let seconds = timestamp.num_seconds_from_midnight() as i64;
    let whole = timestamp.with_nanosecond(0).unwrap_or(timestamp);
    whole - Duration::seconds(seconds.rem_euclid(step))
}

/// Timestamps from `start` (inclusive) to `end` (exclusive) in fixed steps.
pub fn timestamp_steps(
    start: NaiveDateTime,
    end: NaiveDateTime,
    step_minutes: i64,
) -> Vec<NaiveDateTime> {
    let step = Duration::minutes(step_minutes.max(1));
    let mut steps = Vec::new();
    let mut current = start;
    while current < end {
        steps.push(current);
        current += step;
    }
    steps
}

/// Default `date_inactive` for open-ended station assignments.
pub fn open_ended() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(DATE_INACTIVE_YEAR, DATE_INACTIVE_MONTH, DATE_INACTIVE_DAY)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_api_timestamp() {
        assert_eq!(
            parse_timestamp("2022-03-14T09:05:00+08:00").unwrap(),
            ts(9, 5, 0)
        );
        assert_eq!(parse_timestamp("2022-03-14T01:05:00Z").unwrap(), ts(9, 5, 0));
        assert_eq!(parse_timestamp("2022-03-14 09:05").unwrap(), ts(9, 5, 0));
        assert_eq!(parse_timestamp("2022-03-14").unwrap(), ts(0, 0, 0));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_round_down() {
        assert_eq!(round_down(ts(9, 14, 59), 15), ts(9, 0, 0));
        assert_eq!(round_down(ts(9, 15, 0), 15), ts(9, 15, 0));
        assert_eq!(round_down(ts(23, 59, 1), 15), ts(23, 45, 0));
    }

    #[test]
    fn test_timestamp_steps() {
        let steps = timestamp_steps(ts(9, 0, 0), ts(10, 0, 0), 15);
        assert_eq!(steps, vec![ts(9, 0, 0), ts(9, 15, 0), ts(9, 30, 0), ts(9, 45, 0)]);
        assert!(timestamp_steps(ts(10, 0, 0), ts(9, 0, 0), 15).is_empty());
    }

    #[test]
    fn test_open_ended() {
        assert_eq!(open_ended().to_string(), "2050-12-31 00:00:00");
    }
}
