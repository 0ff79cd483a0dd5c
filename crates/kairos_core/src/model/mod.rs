//! Domain model for items, events, occurrences and triage values.
//!
//! # Responsibility
//! - Define canonical data structures used by the recurrence and triage
//!   engines.
//! - Provide one `Subject` handle for anything that can be classified.
//!
//! # Invariants
//! - Masters are identified by a stable `ItemId`.
//! - Occurrences are identified by `(master, normalized recurrence-id)`.

pub mod attr;
pub mod item;
pub mod triage;
pub mod when;

use crate::model::item::ItemId;
use crate::recurrence::occurrence::OccurrenceId;
use std::fmt::{Display, Formatter};

/// Anything that can be classified and shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Item(ItemId),
    Occurrence(OccurrenceId),
}

impl Subject {
    /// Master item backing this subject.
    pub fn master(&self) -> ItemId {
        match self {
            Self::Item(id) => *id,
            Self::Occurrence(occurrence) => occurrence.master,
        }
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Item(id) => write!(f, "item:{id}"),
            Self::Occurrence(occurrence) => write!(f, "{occurrence}"),
        }
    }
}

/// Serde helpers storing `chrono::Duration` as whole seconds.
pub(crate) mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        Duration::try_seconds(seconds)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {seconds}")))
    }

    pub mod option {
        use chrono::Duration;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_some(&value.num_seconds()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            match Option::<i64>::deserialize(deserializer)? {
                Some(seconds) => Duration::try_seconds(seconds).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("duration out of range: {seconds}"))
                }),
                None => Ok(None),
            }
        }
    }
}
