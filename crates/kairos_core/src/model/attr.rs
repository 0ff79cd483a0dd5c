//! Extension attribute addressing for inheritance and overrides.
//!
//! # Responsibility
//! - Name every (extension, attribute) pair an occurrence can override.
//! - Carry override values with a type that matches their attribute.
//!
//! # Invariants
//! - `Attr::accepts` is the single type check for override values.

use crate::model::item::Transparency;
use crate::model::triage::TriageStatus;
use crate::model::when::{Timestamp, When};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Extension types that can be attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    Item,
    Event,
    Recurrence,
    Triage,
    Reminders,
}

impl ExtensionKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Event => "event",
            Self::Recurrence => "recurrence",
            Self::Triage => "triage",
            Self::Reminders => "reminders",
        }
    }
}

impl Display for ExtensionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Overridable (extension, attribute) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attr {
    Title,
    BaseStart,
    BaseDuration,
    AllDay,
    AnyTime,
    Transparency,
    TriageManual,
    TriageManualTimestamp,
}

const ALL_ATTRS: [Attr; 8] = [
    Attr::Title,
    Attr::BaseStart,
    Attr::BaseDuration,
    Attr::AllDay,
    Attr::AnyTime,
    Attr::Transparency,
    Attr::TriageManual,
    Attr::TriageManualTimestamp,
];

impl Attr {
    pub fn extension(self) -> ExtensionKind {
        match self {
            Self::Title => ExtensionKind::Item,
            Self::BaseStart
            | Self::BaseDuration
            | Self::AllDay
            | Self::AnyTime
            | Self::Transparency => ExtensionKind::Event,
            Self::TriageManual | Self::TriageManualTimestamp => ExtensionKind::Triage,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::BaseStart => "base_start",
            Self::BaseDuration => "base_duration",
            Self::AllDay => "all_day",
            Self::AnyTime => "any_time",
            Self::Transparency => "transparency",
            Self::TriageManual => "manual",
            Self::TriageManualTimestamp => "manual_timestamp",
        }
    }

    /// Resolves an `(extension, attribute-name)` pair.
    pub fn lookup(extension: ExtensionKind, name: &str) -> Option<Self> {
        ALL_ATTRS
            .into_iter()
            .find(|attr| attr.extension() == extension && attr.name() == name)
    }

    /// Whether `value` has the shape this attribute stores.
    pub fn accepts(self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (Self::Title, AttrValue::Text(_))
                | (Self::BaseStart, AttrValue::When(_))
                | (Self::BaseDuration, AttrValue::Duration(_))
                | (Self::AllDay | Self::AnyTime, AttrValue::Flag(_))
                | (Self::Transparency, AttrValue::Transparency(_))
                | (Self::TriageManual, AttrValue::Status(_))
                | (Self::TriageManualTimestamp, AttrValue::Timestamp(_))
        )
    }
}

impl Display for Attr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Override or resolved attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Text(String),
    When(Option<When>),
    Duration(#[serde(with = "crate::model::duration_seconds")] Duration),
    Flag(bool),
    Transparency(Transparency),
    Status(Option<TriageStatus>),
    Timestamp(Option<Timestamp>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_when(&self) -> Option<When> {
        match self {
            Self::When(value) => *value,
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Duration(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_transparency(&self) -> Option<Transparency> {
        match self {
            Self::Transparency(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<TriageStatus> {
        match self {
            Self::Status(value) => *value,
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Timestamp(value) => *value,
            _ => None,
        }
    }
}
