//! # Meter Readings
//!
//! Core value types shared by meters, channels, and collectors. A reading is a
//! single measured value with a microsecond-resolution timestamp and the
//! identifier the producing meter attached to it. Readings are never mutated
//! after creation except for the tombstone flag the buffer uses to mark them
//! as consumed.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::obis::{self, ObisCode};

/// A Unix timestamp split into whole seconds and microseconds.
///
/// The pair is kept normalized (`0 <= micros < 1_000_000`), which makes the
/// derived lexicographic ordering the correct chronological ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingTime {
    secs: i64,
    micros: i64,
}

impl ReadingTime {
    /// Creates a timestamp from seconds and microseconds, normalizing the
    /// microsecond part into `[0, 1_000_000)`.
    pub fn new(secs: i64, micros: i64) -> Self {
        let carry = micros.div_euclid(1_000_000);
        ReadingTime {
            secs: secs + carry,
            micros: micros.rem_euclid(1_000_000),
        }
    }

    /// Creates a timestamp on a whole second.
    pub const fn from_secs(secs: i64) -> Self {
        ReadingTime { secs, micros: 0 }
    }

    /// Creates a timestamp from Unix milliseconds (the wire resolution).
    pub fn from_millis(millis: i64) -> Self {
        ReadingTime::new(millis.div_euclid(1000), millis.rem_euclid(1000) * 1000)
    }

    /// The current system time.
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => ReadingTime {
                secs: elapsed.as_secs() as i64,
                micros: elapsed.subsec_micros() as i64,
            },
            Err(_) => ReadingTime::from_secs(0),
        }
    }

    /// Whole seconds since the Unix epoch.
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Microsecond part, always in `[0, 1_000_000)`.
    pub fn micros(&self) -> i64 {
        self.micros
    }

    /// Unix milliseconds, truncating sub-millisecond precision.
    pub fn to_millis(&self) -> i64 {
        self.secs * 1000 + self.micros / 1000
    }

    /// Seconds since the epoch as a float.
    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.micros as f64 / 1e6
    }

    /// Signed distance in seconds from `earlier` to `self`.
    pub fn seconds_since(&self, earlier: &ReadingTime) -> f64 {
        (self.secs - earlier.secs) as f64 + (self.micros - earlier.micros) as f64 / 1e6
    }
}

impl fmt::Display for ReadingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

/// Identifies which register of a meter a reading belongs to.
///
/// Meters attach whatever variant their protocol speaks; channels filter on
/// it. The core never interprets the payload beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReadingIdentifier {
    /// No identifier. Used by single-scalar protocols that address nothing.
    Nil,
    /// A free-form register or tag name.
    Name(String),
    /// An IEC 62056-61 OBIS code.
    Obis(ObisCode),
    /// A numeric sub-channel of a multi-channel device.
    Channel(u32),
}

impl ReadingIdentifier {
    /// Resolves a configuration string to an identifier.
    ///
    /// Tried in order: OBIS code, OBIS alias, decimal sub-channel number,
    /// and finally a free-form name. Resolution never fails; the name
    /// variant absorbs everything else.
    pub fn resolve(s: &str) -> Self {
        if let Ok(code) = s.parse::<ObisCode>() {
            return ReadingIdentifier::Obis(code);
        }
        if let Some(code) = obis::lookup_alias(s) {
            return ReadingIdentifier::Obis(code);
        }
        if let Ok(n) = s.parse::<u32>() {
            return ReadingIdentifier::Channel(n);
        }
        ReadingIdentifier::Name(s.to_string())
    }
}

impl fmt::Display for ReadingIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingIdentifier::Nil => write!(f, "<nil>"),
            ReadingIdentifier::Name(name) => write!(f, "{name}"),
            ReadingIdentifier::Obis(code) => write!(f, "{code}"),
            ReadingIdentifier::Channel(n) => write!(f, "channel {n}"),
        }
    }
}

/// One measured value.
#[derive(Debug, Clone)]
pub struct Reading {
    /// The measured (or derived, in counter mode) value.
    pub value: f64,
    /// When the meter produced the value.
    pub time: ReadingTime,
    /// Which register the value belongs to.
    pub identifier: ReadingIdentifier,
    /// Tombstone flag: set once the buffer has consumed the reading.
    pub deleted: bool,
}

impl Reading {
    /// Creates a live (non-tombstoned) reading.
    pub fn new(value: f64, time: ReadingTime, identifier: ReadingIdentifier) -> Self {
        Reading {
            value,
            time,
            identifier,
            deleted: false,
        }
    }
}

// The tombstone flag is bookkeeping, not payload; two readings are equal
// when identifier, time, and value match.
impl PartialEq for Reading {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.time == other.time
            && self.value == other.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_normalization() {
        let t = ReadingTime::new(10, 2_500_000);
        assert_eq!(t.secs(), 12);
        assert_eq!(t.micros(), 500_000);

        let t = ReadingTime::new(10, -1);
        assert_eq!(t.secs(), 9);
        assert_eq!(t.micros(), 999_999);
    }

    #[test]
    fn test_time_ordering_is_chronological() {
        let a = ReadingTime::new(5, 999_999);
        let b = ReadingTime::new(6, 0);
        let c = ReadingTime::new(6, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_millis_conversion() {
        let t = ReadingTime::new(1, 234_567);
        assert_eq!(t.to_millis(), 1234);
        assert_eq!(ReadingTime::from_millis(1234), ReadingTime::new(1, 234_000));
        assert_eq!(ReadingTime::from_millis(-500), ReadingTime::new(-1, 500_000));
    }

    #[test]
    fn test_seconds_since() {
        let a = ReadingTime::new(10, 500_000);
        let b = ReadingTime::new(13, 0);
        assert!((b.seconds_since(&a) - 2.5).abs() < 1e-9);
        assert!((a.seconds_since(&b) + 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_reading_equality_ignores_tombstone() {
        let t = ReadingTime::from_secs(100);
        let a = Reading::new(1.5, t, ReadingIdentifier::Nil);
        let mut b = a.clone();
        b.deleted = true;
        assert_eq!(a, b);
    }

    #[test]
    fn test_identifier_resolution_order() {
        assert!(matches!(
            ReadingIdentifier::resolve("1-0:1.8.0"),
            ReadingIdentifier::Obis(_)
        ));
        assert!(matches!(
            ReadingIdentifier::resolve("power"),
            ReadingIdentifier::Obis(_)
        ));
        assert_eq!(
            ReadingIdentifier::resolve("3"),
            ReadingIdentifier::Channel(3)
        );
        assert_eq!(
            ReadingIdentifier::resolve("counter1"),
            ReadingIdentifier::Name("counter1".to_string())
        );
    }
}
