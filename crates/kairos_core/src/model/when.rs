//! Instants with timezone context and their normalized key form.
//!
//! # Responsibility
//! - Represent user-facing instants that keep their timezone (or are
//!   explicitly floating).
//! - Provide the hashable canonical key used for recurrence-id lookups.
//!
//! # Invariants
//! - Two zoned instants denoting the same moment normalize to the same key
//!   regardless of the zone they are expressed in.
//! - Floating instants normalize to their naive local value and are only
//!   resolved against a zone when a timestamp is needed.

use crate::error::ConstraintError;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

const KEY_NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A user-facing instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WhenRecord", try_from = "WhenRecord")]
pub enum When {
    /// Anchored to a concrete zone.
    Zoned(DateTime<Tz>),
    /// Wall-clock value that follows the configured default zone.
    Floating(NaiveDateTime),
}

impl When {
    /// Floating instant from a naive wall-clock value.
    pub fn floating(naive: NaiveDateTime) -> Self {
        Self::Floating(naive)
    }

    /// Anchors a naive wall-clock value in the named zone.
    ///
    /// # Errors
    /// - `MissingTimezone` when `tzid` is blank, unknown, or the local time
    ///   does not exist in that zone.
    pub fn in_zone(naive: NaiveDateTime, tzid: &str) -> Result<Self, ConstraintError> {
        let trimmed = tzid.trim();
        if trimmed.is_empty() {
            return Err(ConstraintError::MissingTimezone(
                naive.format(KEY_NAIVE_FORMAT).to_string(),
            ));
        }
        let tz = Tz::from_str(trimmed).map_err(|_| {
            ConstraintError::MissingTimezone(format!(
                "{} {trimmed}",
                naive.format(KEY_NAIVE_FORMAT)
            ))
        })?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(Self::Zoned)
            .ok_or_else(|| {
                ConstraintError::MissingTimezone(format!(
                    "{} {trimmed}",
                    naive.format(KEY_NAIVE_FORMAT)
                ))
            })
    }

    /// Zoned instant for an epoch timestamp.
    pub fn from_timestamp(timestamp: Timestamp, tz: Tz) -> Self {
        match tz.timestamp_opt(timestamp, 0).single() {
            Some(value) => Self::Zoned(value),
            None => Self::Zoned(tz.from_utc_datetime(&NaiveDateTime::default())),
        }
    }

    /// Epoch seconds; floating values resolve in `default_tz`.
    pub fn timestamp(&self, default_tz: Tz) -> Timestamp {
        match self {
            Self::Zoned(value) => value.timestamp(),
            Self::Floating(naive) => default_tz
                .from_local_datetime(naive)
                .earliest()
                .map(|value| value.timestamp())
                .unwrap_or_else(|| naive.and_utc().timestamp()),
        }
    }

    /// Normalized, hashable form used as map and cache key.
    pub fn key(&self) -> RecurrenceKey {
        match self {
            Self::Zoned(value) => RecurrenceKey::Epoch(value.timestamp()),
            Self::Floating(naive) => RecurrenceKey::Floating(*naive),
        }
    }

    /// Wall-clock value in this instant's own zone.
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            Self::Zoned(value) => value.naive_local(),
            Self::Floating(naive) => *naive,
        }
    }

    /// Same zone (or floating-ness), different wall-clock value.
    ///
    /// Returns `None` when the wall-clock value falls into a DST gap.
    pub fn with_naive_local(&self, naive: NaiveDateTime) -> Option<Self> {
        match self {
            Self::Zoned(value) => value
                .timezone()
                .from_local_datetime(&naive)
                .earliest()
                .map(Self::Zoned),
            Self::Floating(_) => Some(Self::Floating(naive)),
        }
    }

    /// Floating midnight of this instant's local date.
    pub fn floating_midnight(&self) -> Self {
        Self::Floating(self.naive_local().date().and_time(NaiveTime::MIN))
    }

    /// Shifts by an absolute duration; `None` when the result leaves the
    /// representable range.
    pub fn shifted(&self, delta: Duration) -> Option<Self> {
        match self {
            Self::Zoned(value) => value.checked_add_signed(delta).map(Self::Zoned),
            Self::Floating(naive) => naive.checked_add_signed(delta).map(Self::Floating),
        }
    }

    /// Zone name, or `None` for floating values.
    pub fn tz_name(&self) -> Option<&'static str> {
        match self {
            Self::Zoned(value) => Some(value.timezone().name()),
            Self::Floating(_) => None,
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Floating(_))
    }

    /// Zone of a zoned instant.
    pub fn zone(&self) -> Option<Tz> {
        match self {
            Self::Zoned(value) => Some(value.timezone()),
            Self::Floating(_) => None,
        }
    }

    /// Rebuilds a user-facing value for `key`, expressed in `zone` (or
    /// `default_tz` when the series has no zone).
    pub fn from_key(key: RecurrenceKey, zone: Option<Tz>, default_tz: Tz) -> Self {
        match key {
            RecurrenceKey::Floating(naive) => Self::Floating(naive),
            RecurrenceKey::Epoch(seconds) => {
                Self::from_timestamp(seconds, zone.unwrap_or(default_tz))
            }
        }
    }
}

impl From<DateTime<Tz>> for When {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Zoned(value)
    }
}

impl Display for When {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let local = self.naive_local().format(KEY_NAIVE_FORMAT);
        match self.tz_name() {
            Some(name) => write!(f, "{local} {name}"),
            None => write!(f, "{local} floating"),
        }
    }
}

/// Serialized shape of [`When`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhenRecord {
    pub local: NaiveDateTime,
    pub tzid: Option<String>,
}

impl From<When> for WhenRecord {
    fn from(value: When) -> Self {
        Self {
            local: value.naive_local(),
            tzid: value.tz_name().map(str::to_string),
        }
    }
}

impl TryFrom<WhenRecord> for When {
    type Error = ConstraintError;

    fn try_from(value: WhenRecord) -> Result<Self, Self::Error> {
        match value.tzid {
            None => Ok(Self::Floating(value.local)),
            Some(tzid) => Self::in_zone(value.local, tzid.as_str()),
        }
    }
}

/// Canonical recurrence-id used for map and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RecurrenceKey {
    Epoch(Timestamp),
    Floating(NaiveDateTime),
}

impl Display for RecurrenceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Epoch(seconds) => write!(f, "epoch:{seconds}"),
            Self::Floating(naive) => write!(f, "floating:{}", naive.format(KEY_NAIVE_FORMAT)),
        }
    }
}

/// Unparseable recurrence key text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid recurrence key: {0}")]
pub struct KeyParseError(pub String);

impl FromStr for RecurrenceKey {
    type Err = KeyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(seconds) = value.strip_prefix("epoch:") {
            return seconds
                .parse::<Timestamp>()
                .map(Self::Epoch)
                .map_err(|_| KeyParseError(value.to_string()));
        }
        if let Some(naive) = value.strip_prefix("floating:") {
            return NaiveDateTime::parse_from_str(naive, KEY_NAIVE_FORMAT)
                .map(Self::Floating)
                .map_err(|_| KeyParseError(value.to_string()));
        }
        Err(KeyParseError(value.to_string()))
    }
}

impl From<RecurrenceKey> for String {
    fn from(value: RecurrenceKey) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for RecurrenceKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
