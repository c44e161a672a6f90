//! Stream timestamp ids.
//!
//! Every record in an event stream is keyed by a composite
//! `<millis>-<serial>` id: epoch milliseconds first, then a serial that
//! breaks ties within the same millisecond bucket. Ordering over the pair
//! defines the ordering of the log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, LocalResult, TimeZone};
use thiserror::Error;

/// A malformed timestamp-id string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid timestamp id {input:?}")]
pub struct InvalidTimestampId {
    pub input: String,
}

/// Composite ordering key of one log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampId {
    /// Epoch milliseconds, the primary ordering component.
    pub millis: i64,
    /// Tiebreak within a millisecond bucket.
    pub serial: u64,
}

impl TimestampId {
    /// The id of an instant truncated to milliseconds, serial zero.
    ///
    /// Used as an inclusive range start: every record at or after the
    /// instant sorts at or after this id.
    pub fn floor(instant: DateTime<Local>) -> Self {
        Self {
            millis: instant.timestamp_millis(),
            serial: 0,
        }
    }

    /// The largest id within the instant's millisecond bucket, used as an
    /// inclusive range end.
    pub fn ceil(instant: DateTime<Local>) -> Self {
        Self {
            millis: instant.timestamp_millis(),
            serial: u64::MAX,
        }
    }

    /// The instant this id encodes (the serial carries no time).
    pub fn instant(self) -> Option<DateTime<Local>> {
        match Local.timestamp_millis_opt(self.millis) {
            LocalResult::Single(dt) => Some(dt),
            _ => None,
        }
    }
}

impl fmt::Display for TimestampId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.serial)
    }
}

impl FromStr for TimestampId {
    type Err = InvalidTimestampId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidTimestampId {
            input: s.to_string(),
        };
        let (millis, serial) = s.split_once('-').ok_or_else(err)?;
        Ok(Self {
            millis: millis.parse().map_err(|_| err())?,
            serial: serial.parse().map_err(|_| err())?,
        })
    }
}

/// How an append picks its id: an exact id (replay) or `<millis>-*`,
/// meaning the next free serial in that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    Exact(TimestampId),
    Auto(i64),
}

impl IdSpec {
    /// The auto-serial hint for an instant, the default for new appends.
    pub fn from_instant(instant: DateTime<Local>) -> Self {
        Self::Auto(instant.timestamp_millis())
    }

    /// The millis component, regardless of variant.
    pub const fn millis(self) -> i64 {
        match self {
            Self::Exact(id) => id.millis,
            Self::Auto(millis) => millis,
        }
    }
}

impl fmt::Display for IdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(id) => id.fmt(f),
            Self::Auto(millis) => write!(f, "{millis}-*"),
        }
    }
}

impl FromStr for IdSpec {
    type Err = InvalidTimestampId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(millis) = s.strip_suffix("-*") {
            let millis = millis.parse().map_err(|_| InvalidTimestampId {
                input: s.to_string(),
            })?;
            return Ok(Self::Auto(millis));
        }
        s.parse().map(Self::Exact)
    }
}

/// Whether `s` is shaped like a timestamp id: `<digits>-<digits|*>`.
pub fn is_timestamp_id(s: &str) -> bool {
    let Some((millis, serial)) = s.split_once('-') else {
        return false;
    };
    !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && (serial == "*" || (!serial.is_empty() && serial.bytes().all(|b| b.is_ascii_digit())))
}
