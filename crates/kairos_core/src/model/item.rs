//! Master item record and its event/reminder extensions.
//!
//! # Responsibility
//! - Define the persisted shape of a master item.
//! - Compute event `start`/`duration` from raw values and day flags.
//!
//! # Invariants
//! - `id` is stable and never reused for another item.
//! - `base_duration` is never negative once a batch commits.
//! - Only a master item owns a `Recurrence` extension.

use crate::error::ConstraintError;
use crate::model::attr::ExtensionKind;
use crate::model::triage::{TriageFields, TriagePosition};
use crate::model::when::{Timestamp, When};
use crate::recurrence::Recurrence;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable identifier for a master item.
pub type ItemId = Uuid;

/// Widest duration or reminder offset accepted on commit, in days.
const MAX_SPAN_DAYS: i64 = 365 * 10_000;

/// Free/busy transparency of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transparency {
    #[default]
    Confirmed,
    Tentative,
    Fyi,
}

impl Transparency {
    /// Maps external status text; `cancelled` is shown as `fyi`, anything
    /// unknown as `confirmed`.
    pub fn from_status(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "tentative" => Self::Tentative,
            "cancelled" | "fyi" => Self::Fyi,
            _ => Self::Confirmed,
        }
    }
}

/// Event extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub base_start: Option<When>,
    #[serde(with = "crate::model::duration_seconds")]
    pub base_duration: Duration,
    pub all_day: bool,
    pub any_time: bool,
    pub transparency: Transparency,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            base_start: None,
            base_duration: Duration::hours(1),
            all_day: false,
            any_time: false,
            transparency: Transparency::Confirmed,
        }
    }
}

impl Event {
    /// Event starting at `start` with the default one-hour duration.
    pub fn starting_at(start: When) -> Self {
        Self {
            base_start: Some(start),
            ..Self::default()
        }
    }

    pub fn is_day(&self) -> bool {
        self.all_day || self.any_time
    }

    /// Effective start; day events start at floating midnight.
    pub fn start(&self) -> Option<When> {
        let base = self.base_start?;
        if self.is_day() {
            Some(base.floating_midnight())
        } else {
            Some(base)
        }
    }

    /// Effective duration; day events span whole days.
    pub fn duration(&self) -> Duration {
        if self.is_day() {
            self.base_duration
                .num_days()
                .checked_add(1)
                .and_then(Duration::try_days)
                .unwrap_or(self.base_duration)
        } else {
            self.base_duration
        }
    }

    pub fn end(&self) -> Option<When> {
        self.start()?.shifted(self.duration())
    }

    /// # Errors
    /// - `BadDuration` when `base_duration` is negative or wider than the
    ///   accepted span.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        validate_duration(self.base_duration)
    }
}

fn within_span(value: Duration) -> bool {
    Duration::try_days(MAX_SPAN_DAYS).is_some_and(|span| value.abs() <= span)
}

pub(crate) fn validate_duration(value: Duration) -> Result<(), ConstraintError> {
    if value < Duration::zero() || !within_span(value) {
        return Err(ConstraintError::BadDuration(format!(
            "{}s",
            value.num_seconds()
        )));
    }
    Ok(())
}

/// Reminder attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub fixed_trigger: Option<When>,
    #[serde(with = "crate::model::duration_seconds::option")]
    pub delta: Option<Duration>,
    /// Postponed alert instant; replaces the trigger while set.
    #[serde(default)]
    pub snooze: Option<When>,
    /// Dismissed reminders no longer alert.
    #[serde(default)]
    pub cleared: bool,
}

impl Reminder {
    pub fn fixed(trigger: When) -> Self {
        Self {
            fixed_trigger: Some(trigger),
            delta: None,
            snooze: None,
            cleared: false,
        }
    }

    pub fn relative(delta: Duration) -> Self {
        Self {
            fixed_trigger: None,
            delta: Some(delta),
            snooze: None,
            cleared: false,
        }
    }

    /// Instant the reminder still alerts at: the snooze when set, else the
    /// trigger. Cleared reminders have none.
    pub fn pending(&self, event_start: Option<When>) -> Option<When> {
        if self.cleared {
            return None;
        }
        self.snooze.or_else(|| self.trigger(event_start))
    }

    /// Trigger instant; relative reminders need an event start.
    pub fn trigger(&self, event_start: Option<When>) -> Option<When> {
        if let Some(fixed) = self.fixed_trigger {
            return Some(fixed);
        }
        let delta = self.delta?;
        event_start?.shifted(delta)
    }

    /// # Errors
    /// - `BadReminder` when the relative offset is wider than the accepted
    ///   span.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        match self.delta {
            Some(delta) if !within_span(delta) => Err(ConstraintError::BadReminder(format!(
                "{}s",
                delta.num_seconds()
            ))),
            _ => Ok(()),
        }
    }
}

/// Master item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub created: Timestamp,
    pub event: Option<Event>,
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub triage: TriageFields,
    #[serde(default)]
    pub position: TriagePosition,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

impl Item {
    /// Creates a new item with a generated stable ID.
    pub fn new(title: impl Into<String>, created: Timestamp) -> Self {
        Self::with_id(Uuid::new_v4(), title, created)
    }

    /// Creates an item with a caller-provided ID (import paths).
    pub fn with_id(id: ItemId, title: impl Into<String>, created: Timestamp) -> Self {
        Self {
            id,
            title: title.into(),
            created,
            event: None,
            recurrence: None,
            triage: TriageFields::default(),
            position: TriagePosition::default(),
            reminders: Vec::new(),
        }
    }

    /// Extension types currently attached.
    pub fn extensions(&self) -> BTreeSet<ExtensionKind> {
        let mut kinds = BTreeSet::from([ExtensionKind::Item, ExtensionKind::Triage]);
        if self.event.is_some() {
            kinds.insert(ExtensionKind::Event);
        }
        if self.recurrence.is_some() {
            kinds.insert(ExtensionKind::Recurrence);
        }
        if !self.reminders.is_empty() {
            kinds.insert(ExtensionKind::Reminders);
        }
        kinds
    }

    /// Checks every stored value against its domain rule.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        if let Some(event) = &self.event {
            event.validate()?;
        }
        if let Some(recurrence) = &self.recurrence {
            recurrence.validate()?;
        }
        for reminder in &self.reminders {
            reminder.validate()?;
        }
        Ok(())
    }
}
