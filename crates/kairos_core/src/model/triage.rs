//! Triage values stored on items and occurrences.
//!
//! # Invariants
//! - A `TriageStatus` is always one of NOW=100, LATER=200, DONE=300; codes
//!   below 100 never become a status.

use crate::error::ConstraintError;
use crate::model::when::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Time-sensitive priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum TriageStatus {
    Now,
    Later,
    Done,
}

impl TriageStatus {
    pub const fn code(self) -> i64 {
        match self {
            Self::Now => 100,
            Self::Later => 200,
            Self::Done => 300,
        }
    }

    /// Maps a status code onto a status.
    ///
    /// Codes above 300 clamp to DONE; other codes floor to their hundred.
    ///
    /// # Errors
    /// - `TriageRange` for any code below 100.
    pub fn from_code(code: i64) -> Result<Self, ConstraintError> {
        if code < 100 {
            return Err(ConstraintError::TriageRange(code));
        }
        match code.min(300) / 100 {
            1 => Ok(Self::Now),
            2 => Ok(Self::Later),
            _ => Ok(Self::Done),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::Later => "later",
            Self::Done => "done",
        }
    }
}

impl Display for TriageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<TriageStatus> for i64 {
    fn from(value: TriageStatus) -> Self {
        value.code()
    }
}

impl TryFrom<i64> for TriageStatus {
    type Error = ConstraintError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_code(value)
    }
}

/// Manual triage fields of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageFields {
    pub manual: Option<TriageStatus>,
    pub manual_timestamp: Option<Timestamp>,
}

/// Manual triage record kept by a master for one of its occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTriage {
    pub timestamp: Timestamp,
    pub status: TriageStatus,
}

/// User pinning of display section and position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriagePosition {
    pub pinned_section: Option<TriageStatus>,
    pub pinned_position: Option<Timestamp>,
}

impl TriagePosition {
    pub fn is_pinned(&self) -> bool {
        self.pinned_section.is_some() || self.pinned_position.is_some()
    }
}
