//! Time periods and the buckets they cut time into
//!
//! A [`Period`] is one granularity level of a time fragmentation, e.g. "3
//! months". Its bucket for a timestamp is the half-open interval `[from, to)`
//! of `n` units containing it, anchored so a bucket never crosses into the next
//! unit of the next-coarser granularity.
//!
//! ```text
//! Days(3)   at 2025-08-09T18:05:09Z -> [2025-08-07 .. 2025-08-10]
//! Months(4) at 2025-08-09T18:05:09Z -> [2025-05 .. 2025-09]
//! ```
//!
//! Periods are written as single-component ISO-8601 durations: `P2Y`, `P3M`,
//! `P1D`, `PT6H`, `PT15M`, `PT30S`.

use crate::fragmentation::error::{FragmentationError, FragmentationResult, ResolutionError};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res},
    sequence::{pair, preceded},
    IResult,
};
use std::fmt;
use std::str::FromStr;

/// Boundary format of bucket intervals and relation values
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One granularity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Years(u32),
    Months(u32),
    Days(u32),
    Hours(u32),
    Minutes(u32),
    Seconds(u32),
}

/// A computed time interval and its bucket key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeBucket {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub key: String,
}

impl TimeBucket {
    /// Lower (inclusive) boundary as written in relations
    pub fn from_boundary(&self) -> String {
        self.from.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Upper (exclusive) boundary as written in relations
    pub fn to_boundary(&self) -> String {
        self.to.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl Period {
    /// Check `n` against the unit's bounds
    ///
    /// Months, days, hours, minutes and seconds are capped so one bucket never
    /// spans a whole unit of the next-coarser granularity.
    pub fn validate(self) -> FragmentationResult<Self> {
        let (unit, n, max) = match self {
            Period::Years(n) => ("Years", n, i32::MAX as u32),
            Period::Months(n) => ("Months", n, 11),
            Period::Days(n) => ("Days", n, 27),
            Period::Hours(n) => ("Hours", n, 23),
            Period::Minutes(n) => ("Minutes", n, 59),
            Period::Seconds(n) => ("Seconds", n, 59),
        };

        if n < 1 || n > max {
            return Err(FragmentationError::PeriodOutOfRange {
                unit,
                value: n,
                min: 1,
                max,
            });
        }
        Ok(self)
    }

    /// The default levels of a time fragmentation: year, month, day, hour
    pub fn defaults() -> Vec<Period> {
        vec![
            Period::Years(1),
            Period::Months(1),
            Period::Days(1),
            Period::Hours(1),
        ]
    }

    /// Compute the bucket containing `ts`
    ///
    /// A zero-sized period or a boundary beyond chrono's date range yields
    /// [`ResolutionError::OutOfRange`].
    pub fn calculate_bucket(&self, ts: DateTime<Utc>) -> Result<TimeBucket, ResolutionError> {
        let out_of_range = || ResolutionError::OutOfRange(ts.to_rfc3339());

        let (from, to) = match *self {
            Period::Years(n) => {
                let n = i32::try_from(n).map_err(|_| out_of_range())?;
                let offset = ts.year().checked_rem_euclid(n).ok_or_else(out_of_range)?;
                let year = ts.year() - offset;
                let from = utc_date(year, 1, 1).ok_or_else(out_of_range)?;
                let to = year
                    .checked_add(n)
                    .and_then(|y| utc_date(y, 1, 1))
                    .ok_or_else(out_of_range)?;
                (from, to)
            }
            Period::Months(n) => {
                let offset = (ts.month() - 1).checked_rem(n).ok_or_else(out_of_range)?;
                let from = utc_date(ts.year(), ts.month() - offset, 1).ok_or_else(out_of_range)?;
                let to = from
                    .checked_add_months(Months::new(n))
                    .ok_or_else(out_of_range)?;
                (from, to)
            }
            Period::Days(n) => {
                let offset = (ts.day() - 1).checked_rem(n).ok_or_else(out_of_range)?;
                let from =
                    utc_date(ts.year(), ts.month(), ts.day() - offset).ok_or_else(out_of_range)?;
                (from, add(from, Duration::days(n as i64)).ok_or_else(out_of_range)?)
            }
            Period::Hours(n) => {
                let offset = ts.hour().checked_rem(n).ok_or_else(out_of_range)?;
                let from = truncate(ts, ts.hour() - offset, 0, 0).ok_or_else(out_of_range)?;
                (from, add(from, Duration::hours(n as i64)).ok_or_else(out_of_range)?)
            }
            Period::Minutes(n) => {
                let offset = ts.minute().checked_rem(n).ok_or_else(out_of_range)?;
                let from =
                    truncate(ts, ts.hour(), ts.minute() - offset, 0).ok_or_else(out_of_range)?;
                (from, add(from, Duration::minutes(n as i64)).ok_or_else(out_of_range)?)
            }
            Period::Seconds(n) => {
                let offset = ts.second().checked_rem(n).ok_or_else(out_of_range)?;
                let from = truncate(ts, ts.hour(), ts.minute(), ts.second() - offset)
                    .ok_or_else(out_of_range)?;
                (from, add(from, Duration::seconds(n as i64)).ok_or_else(out_of_range)?)
            }
        };

        let key = match self {
            Period::Years(_) => format!("[{:04} .. {:04}]", from.year(), to.year()),
            Period::Months(_) => format!(
                "[{:04}-{:02} .. {:04}-{:02}]",
                from.year(),
                from.month(),
                to.year(),
                to.month()
            ),
            Period::Days(_) => format!(
                "[{} .. {}]",
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d")
            ),
            _ => format!(
                "[{} .. {}]",
                from.format(TIMESTAMP_FORMAT),
                to.format(TIMESTAMP_FORMAT)
            ),
        };

        Ok(TimeBucket { from, to, key })
    }
}

fn utc_date(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn truncate(ts: DateTime<Utc>, hour: u32, minute: u32, second: u32) -> Option<DateTime<Utc>> {
    let time = ts.date_naive().and_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&time))
}

fn add(ts: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    ts.checked_add_signed(duration)
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

type Unit = fn(u32) -> Period;

fn date_component(input: &str) -> IResult<&str, Period> {
    map(
        pair(
            number,
            alt((
                map(char('Y'), |_| Period::Years as Unit),
                map(char('M'), |_| Period::Months as Unit),
                map(char('D'), |_| Period::Days as Unit),
            )),
        ),
        |(n, unit)| unit(n),
    )(input)
}

fn time_component(input: &str) -> IResult<&str, Period> {
    preceded(
        char('T'),
        map(
            pair(
                number,
                alt((
                    map(char('H'), |_| Period::Hours as Unit),
                    map(char('M'), |_| Period::Minutes as Unit),
                    map(char('S'), |_| Period::Seconds as Unit),
                )),
            ),
            |(n, unit)| unit(n),
        ),
    )(input)
}

fn duration(input: &str) -> IResult<&str, Period> {
    all_consuming(preceded(tag("P"), alt((time_component, date_component))))(input)
}

impl FromStr for Period {
    type Err = FragmentationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        match duration(input) {
            Ok((_, period)) => period.validate(),
            Err(_) => Err(FragmentationError::InvalidDuration(s.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Years(n) => write!(f, "P{}Y", n),
            Period::Months(n) => write!(f, "P{}M", n),
            Period::Days(n) => write!(f, "P{}D", n),
            Period::Hours(n) => write!(f, "PT{}H", n),
            Period::Minutes(n) => write!(f, "PT{}M", n),
            Period::Seconds(n) => write!(f, "PT{}S", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!("P2Y".parse::<Period>().unwrap(), Period::Years(2));
        assert_eq!("P3M".parse::<Period>().unwrap(), Period::Months(3));
        assert_eq!("P1D".parse::<Period>().unwrap(), Period::Days(1));
        assert_eq!("PT6H".parse::<Period>().unwrap(), Period::Hours(6));
        assert_eq!("PT15M".parse::<Period>().unwrap(), Period::Minutes(15));
        assert_eq!("PT30S".parse::<Period>().unwrap(), Period::Seconds(30));
    }

    #[test]
    fn test_parse_rejects_unsupported_durations() {
        for input in ["", "P", "1D", "P1W", "P1Y2M", "PT1H30M", "P1H", "PT1D", "P-1D"] {
            assert!(
                matches!(
                    input.parse::<Period>(),
                    Err(FragmentationError::InvalidDuration(_))
                ),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_period_bounds() {
        assert!(matches!(
            "P12M".parse::<Period>(),
            Err(FragmentationError::PeriodOutOfRange { value: 12, .. })
        ));
        assert!(Period::Days(28).validate().is_err());
        assert!(Period::Days(27).validate().is_ok());
        assert!(Period::Hours(24).validate().is_err());
        assert!(Period::Minutes(60).validate().is_err());
        assert!(Period::Seconds(0).validate().is_err());
        assert!(Period::Years(10_000).validate().is_ok());
        assert!("PT0S".parse::<Period>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for period in [Period::Years(5), Period::Hours(2), Period::Minutes(10)] {
            assert_eq!(period.to_string().parse::<Period>().unwrap(), period);
        }
    }

    #[test]
    fn test_days_bucket() {
        let bucket = Period::Days(3)
            .calculate_bucket(ts("2025-08-09T18:05:09Z"))
            .unwrap();
        assert_eq!(bucket.from_boundary(), "2025-08-07T00:00:00Z");
        assert_eq!(bucket.to_boundary(), "2025-08-10T00:00:00Z");
        assert_eq!(bucket.key, "[2025-08-07 .. 2025-08-10]");
    }

    #[test]
    fn test_months_bucket() {
        let bucket = Period::Months(4)
            .calculate_bucket(ts("2025-08-09T18:05:09Z"))
            .unwrap();
        assert_eq!(bucket.from_boundary(), "2025-05-01T00:00:00Z");
        assert_eq!(bucket.to_boundary(), "2025-09-01T00:00:00Z");
        assert_eq!(bucket.key, "[2025-05 .. 2025-09]");

        // crosses into the next year
        let bucket = Period::Months(5)
            .calculate_bucket(ts("2025-12-31T23:59:59Z"))
            .unwrap();
        assert_eq!(bucket.key, "[2025-11 .. 2026-04]");
    }

    #[test]
    fn test_years_bucket() {
        assert!(matches!(
            Period::Hours(0).calculate_bucket(ts("2025-08-09T18:05:09Z")),
            Err(ResolutionError::OutOfRange(_))
        ));

        let bucket = Period::Years(2500)
            .calculate_bucket(ts("2025-08-09T18:05:09Z"))
            .unwrap();
        assert_eq!(bucket.from_boundary(), "0000-01-01T00:00:00Z");
        assert_eq!(bucket.to_boundary(), "2500-01-01T00:00:00Z");
        assert_eq!(bucket.key, "[0000 .. 2500]");
    }

    #[test]
    fn test_time_of_day_buckets() {
        let at = ts("2025-08-09T18:05:09Z");

        let hours = Period::Hours(5).calculate_bucket(at).unwrap();
        assert_eq!(hours.key, "[2025-08-09T15:00:00Z .. 2025-08-09T20:00:00Z]");

        let minutes = Period::Minutes(15).calculate_bucket(at).unwrap();
        assert_eq!(minutes.key, "[2025-08-09T18:00:00Z .. 2025-08-09T18:15:00Z]");

        let seconds = Period::Seconds(59).calculate_bucket(at).unwrap();
        assert_eq!(seconds.from_boundary(), "2025-08-09T18:05:00Z");
        assert_eq!(seconds.to_boundary(), "2025-08-09T18:05:59Z");
    }

    const STAMPS: [&str; 4] = [
        "2024-02-29T23:59:59Z",
        "2025-01-01T00:00:00Z",
        "2025-08-09T18:05:09Z",
        "1999-12-31T12:30:45Z",
    ];

    #[test]
    fn test_bucket_contains_timestamp() {
        let periods = [
            Period::Years(3),
            Period::Months(5),
            Period::Days(5),
            Period::Hours(7),
            Period::Minutes(13),
            Period::Seconds(17),
        ];

        for period in periods {
            for stamp in STAMPS {
                let t = ts(stamp);
                let bucket = period.calculate_bucket(t).unwrap();
                assert!(bucket.from <= t && t < bucket.to, "{} {}", period, stamp);
            }
        }
    }

    #[test]
    fn test_bucket_is_stable_within_interval() {
        // periods dividing their parent unit tile time without overlap
        let periods = [
            Period::Years(3),
            Period::Months(3),
            Period::Days(1),
            Period::Hours(6),
            Period::Minutes(15),
            Period::Seconds(20),
        ];

        for period in periods {
            for stamp in STAMPS {
                let bucket = period.calculate_bucket(ts(stamp)).unwrap();
                for probe in [bucket.from, bucket.to - Duration::seconds(1)] {
                    assert_eq!(period.calculate_bucket(probe).unwrap(), bucket);
                }
            }
        }
    }

    #[test]
    fn test_interval_width() {
        let t = ts("2025-08-09T18:05:09Z");
        let days = Period::Days(4).calculate_bucket(t).unwrap();
        assert_eq!(days.to - days.from, Duration::days(4));
        let minutes = Period::Minutes(13).calculate_bucket(t).unwrap();
        assert_eq!(minutes.to - minutes.from, Duration::minutes(13));
    }
}
