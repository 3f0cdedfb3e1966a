//! Human-readable duration parsing and formatting

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty duration")]
    Empty,

    #[error("Invalid duration '{input}': {source}")]
    InvalidFormat {
        input: String,
        #[source]
        source: humantime::DurationError,
    },
}

/// Duration wrapper accepting `"30m"`, `"7d"`, `"1h 30m"`, `"500ms"` or a plain
/// number of seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub const ZERO: HumanDuration = HumanDuration(Duration::ZERO);

    pub const fn from_secs(secs: u64) -> Self {
        HumanDuration(Duration::from_secs(secs))
    }

    pub const fn from_mins(mins: u64) -> Self {
        HumanDuration(Duration::from_secs(mins * 60))
    }

    pub const fn from_hours(hours: u64) -> Self {
        HumanDuration(Duration::from_secs(hours * 3600))
    }

    pub const fn from_days(days: u64) -> Self {
        HumanDuration(Duration::from_secs(days * 86_400))
    }

    pub fn as_std(&self) -> Duration {
        self.0
    }

    /// Converts to a chrono delta, saturating on overflow.
    pub fn as_chrono(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::from_std(self.0).unwrap_or(chrono::TimeDelta::MAX)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_human_readable(&self) -> String {
        humantime::format_duration(self.0).to_string()
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        HumanDuration(value)
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"30m\", \"7d\") or seconds as integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration::from_secs(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(HumanDuration::from_secs)
                    .map_err(|_| serde::de::Error::custom("duration cannot be negative"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        // Plain numbers are seconds
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(HumanDuration::from_secs(secs));
        }

        humantime::parse_duration(&s)
            .map(HumanDuration)
            .map_err(|source| ParseError::InvalidFormat { input: s, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!("90".parse::<HumanDuration>().unwrap(), HumanDuration::from_secs(90));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!("500ms".parse::<HumanDuration>().unwrap().as_std(), Duration::from_millis(500));
        assert_eq!("30m".parse::<HumanDuration>().unwrap(), HumanDuration::from_mins(30));
        assert_eq!("48h".parse::<HumanDuration>().unwrap(), HumanDuration::from_hours(48));
        assert_eq!("7d".parse::<HumanDuration>().unwrap(), HumanDuration::from_days(7));
        assert_eq!(" 2H ".parse::<HumanDuration>().unwrap(), HumanDuration::from_hours(2));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(
            "1h 30m".parse::<HumanDuration>().unwrap(),
            HumanDuration::from_mins(90)
        );
        assert_eq!("2days".parse::<HumanDuration>().unwrap(), HumanDuration::from_days(2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("m".parse::<HumanDuration>(), Err(ParseError::InvalidFormat { .. })));
        assert!(matches!(
            "5 fortnights".parse::<HumanDuration>(),
            Err(ParseError::InvalidFormat { .. })
        ));
        assert!(matches!("  ".parse::<HumanDuration>(), Err(ParseError::Empty)));
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!("99999999999999999999d".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(HumanDuration::from_mins(30).to_human_readable(), "30m");
        assert_eq!(HumanDuration::from_days(2).to_human_readable(), "2days");
        assert_eq!(HumanDuration::from_secs(90).to_human_readable(), "1m 30s");
        assert_eq!(HumanDuration(Duration::from_millis(1500)).to_human_readable(), "1s 500ms");
        assert_eq!(HumanDuration::ZERO.to_human_readable(), "0s");
    }

    #[test]
    fn test_formatted_value_parses_back() {
        for duration in [
            HumanDuration::from_secs(90),
            HumanDuration::from_days(7),
            HumanDuration(Duration::from_millis(1500)),
        ] {
            assert_eq!(duration.to_string().parse::<HumanDuration>().unwrap(), duration);
        }
    }

    #[test]
    fn test_deserialize_string_and_number() {
        #[derive(Deserialize)]
        struct TestStruct {
            ttl: HumanDuration,
            interval: HumanDuration,
        }
        let parsed: TestStruct = serde_json::from_str(r#"{"ttl": "30m", "interval": 60}"#).unwrap();
        assert_eq!(parsed.ttl, HumanDuration::from_mins(30));
        assert_eq!(parsed.interval, HumanDuration::from_secs(60));
    }

    #[test]
    fn test_serialize_round_trips_through_display() {
        let json = serde_json::to_string(&HumanDuration::from_hours(12)).unwrap();
        assert_eq!(json, r#""12h""#);
    }

    #[test]
    fn test_as_chrono() {
        assert_eq!(HumanDuration::from_mins(5).as_chrono(), chrono::TimeDelta::minutes(5));
    }
}
