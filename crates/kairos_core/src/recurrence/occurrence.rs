//! Occurrence handles, the identity-stable occurrence cache, and
//! modification recipes.
//!
//! # Invariants
//! - One normalized recurrence-id maps to exactly one cached `Occurrence`
//!   per master; repeated lookups return the same `OccurrenceId`.
//! - The first-seen user-facing recurrence-id is kept for the cache entry's
//!   lifetime.
//! - A stored recipe always holds at least one override.

use crate::model::attr::{Attr, AttrValue};
use crate::model::item::ItemId;
use crate::model::triage::TriagePosition;
use crate::model::when::{RecurrenceKey, When};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Identity of one occurrence within a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceId {
    pub master: ItemId,
    pub key: RecurrenceKey,
}

impl Display for OccurrenceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "occurrence:{}@{}", self.master, self.key)
    }
}

/// Virtual item for one recurrence-id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub recurrence_id: When,
    pub position: TriagePosition,
}

/// Lazily populated per-master occurrence cache.
///
/// Entries live as long as the owning recurrence extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceCache {
    entries: BTreeMap<RecurrenceKey, Occurrence>,
}

impl OccurrenceCache {
    /// Returns the cached occurrence for `recurrence_id`, creating it first
    /// when needed. The flag is `true` when a new entry was created.
    pub fn get_or_create(&mut self, master: ItemId, recurrence_id: When) -> (OccurrenceId, bool) {
        let key = recurrence_id.key();
        if let Some(existing) = self.entries.get(&key) {
            return (existing.id, false);
        }
        let id = OccurrenceId { master, key };
        self.entries.insert(
            key,
            Occurrence {
                id,
                recurrence_id,
                position: TriagePosition::default(),
            },
        );
        (id, true)
    }

    pub fn get(&self, key: &RecurrenceKey) -> Option<&Occurrence> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &RecurrenceKey) -> Option<&mut Occurrence> {
        self.entries.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> {
        self.entries.values()
    }
}

/// Per-occurrence attribute overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRecipe {
    changes: BTreeMap<Attr, AttrValue>,
}

impl ModificationRecipe {
    pub fn get(&self, attr: Attr) -> Option<&AttrValue> {
        self.changes.get(&attr)
    }

    /// Sets an override, returning the previous value.
    pub fn set(&mut self, attr: Attr, value: AttrValue) -> Option<AttrValue> {
        self.changes.insert(attr, value)
    }

    pub fn remove(&mut self, attr: Attr) -> Option<AttrValue> {
        self.changes.remove(&attr)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Attr, &AttrValue)> {
        self.changes.iter()
    }
}
