//! Time zone used to render and parse binlog timestamps.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

/// Format of every datetime accepted on the command line or written to a report.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The zone binlog timestamps are presented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinlogTimeZone {
    #[default]
    Local,
    Named(chrono_tz::Tz),
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid timezone: {0}. Use 'Local' or an IANA timezone name like 'UTC' or 'Asia/Shanghai'")]
pub struct InvalidTimeZone(String);

impl FromStr for BinlogTimeZone {
    type Err = InvalidTimeZone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(BinlogTimeZone::Local);
        }
        s.parse::<chrono_tz::Tz>()
            .map(BinlogTimeZone::Named)
            .map_err(|_| InvalidTimeZone(s.to_string()))
    }
}

impl fmt::Display for BinlogTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinlogTimeZone::Local => f.write_str("Local"),
            BinlogTimeZone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

impl BinlogTimeZone {
    /// Render epoch seconds as `YYYY-MM-DD HH:MM:SS`, with a fractional part
    /// when `micros` is non-zero.
    pub fn format_timestamp(&self, secs: i64, micros: u32) -> String {
        let Some(utc) = DateTime::<Utc>::from_timestamp(secs, 0) else {
            return secs.to_string();
        };
        let base = match self {
            BinlogTimeZone::Local => utc.with_timezone(&Local).format(DATETIME_FORMAT),
            BinlogTimeZone::Named(tz) => utc.with_timezone(tz).format(DATETIME_FORMAT),
        }
        .to_string();
        if micros == 0 {
            base
        } else {
            format!("{base}.{micros:06}")
        }
    }

    /// Parse a `YYYY-MM-DD HH:MM:SS` wall-clock time in this zone into epoch seconds.
    pub fn parse_datetime(&self, s: &str) -> Option<i64> {
        let naive = NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT).ok()?;
        let secs = match self {
            BinlogTimeZone::Local => Local.from_local_datetime(&naive).earliest()?.timestamp(),
            BinlogTimeZone::Named(tz) => tz.from_local_datetime(&naive).earliest()?.timestamp(),
        };
        Some(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zone() {
        assert_eq!("local".parse::<BinlogTimeZone>().unwrap(), BinlogTimeZone::Local);
        assert_eq!(
            "Asia/Shanghai".parse::<BinlogTimeZone>().unwrap(),
            BinlogTimeZone::Named(chrono_tz::Asia::Shanghai)
        );
        assert!("Mars/Olympus".parse::<BinlogTimeZone>().is_err());
    }

    #[test]
    fn test_format_and_parse_in_named_zone() {
        let tz = BinlogTimeZone::Named(chrono_tz::Asia::Shanghai);
        assert_eq!(tz.format_timestamp(0, 0), "1970-01-01 08:00:00");
        assert_eq!(tz.format_timestamp(0, 1500), "1970-01-01 08:00:00.001500");
        assert_eq!(tz.parse_datetime("1970-01-01 08:00:10"), Some(10));
        assert_eq!(tz.parse_datetime("1970-01-01"), None);
    }
}
