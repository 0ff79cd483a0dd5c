//! Dashboard entries, snapshots and decorators.
//!
//! # Invariants
//! - An entry's `subject` never changes; a subject that stops being visible
//!   loses its entry and a new one is created if it comes back.
//! - Decorator ids are unique and use `[a-z0-9_-]`.

use crate::error::{validate_registry_id, RegistryError};
use crate::model::triage::TriageStatus;
use crate::model::when::{RecurrenceKey, Timestamp, When};
use crate::model::Subject;
use crate::store::SubjectView;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Process-unique dashboard entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

/// One row of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardEntry {
    id: EntryId,
    subject: Subject,
    decorations: Vec<String>,
}

impl DashboardEntry {
    pub(crate) fn new(id: EntryId, subject: Subject, decorations: Vec<String>) -> Self {
        Self {
            id,
            subject,
            decorations,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    /// Decorator ids attached when the entry was created.
    pub fn decorations(&self) -> &[String] {
        &self.decorations
    }

    pub fn is_occurrence(&self) -> bool {
        matches!(self.subject, Subject::Occurrence(_))
    }
}

/// Entries owned by one master.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ItemEntries {
    pub master: Option<DashboardEntry>,
    pub occurrences: BTreeMap<RecurrenceKey, DashboardEntry>,
}

impl ItemEntries {
    pub fn iter(&self) -> impl Iterator<Item = &DashboardEntry> {
        self.master.iter().chain(self.occurrences.values())
    }

    pub fn into_entries(self) -> impl Iterator<Item = DashboardEntry> {
        self.master.into_iter().chain(self.occurrences.into_values())
    }
}

/// Value a decorator contributes to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntryValue {
    Flag(bool),
    Text(String),
}

/// Read-only rendering of an entry at the current "now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub id: EntryId,
    pub subject: String,
    pub when: When,
    pub what: String,
    pub triage_status: TriageStatus,
    pub triage_section: TriageStatus,
    pub triage_position: Timestamp,
    pub pinned: bool,
    pub fields: BTreeMap<String, EntryValue>,
}

/// Adds a computed field to entries.
pub trait EntryDecorator {
    fn decorator_id(&self) -> &str;

    /// Whether the decorator applies to `subject` at entry creation.
    fn attaches(&self, _subject: &SubjectView<'_>) -> bool {
        true
    }

    fn value(&self, subject: &SubjectView<'_>) -> EntryValue;
}

/// Summarizes event and reminder state as `event`, `reminder` or empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventReminderDecorator;

impl EntryDecorator for EventReminderDecorator {
    fn decorator_id(&self) -> &str {
        "event_reminder"
    }

    fn value(&self, subject: &SubjectView<'_>) -> EntryValue {
        let triggers = subject.reminder_triggers();
        let scheduled = triggers.first().is_some_and(|trigger| !subject.is_past(trigger));
        let label = if scheduled {
            "reminder"
        } else if subject.event().is_some() {
            "event"
        } else if !triggers.is_empty() {
            "reminder"
        } else {
            ""
        };
        EntryValue::Text(label.to_string())
    }
}

/// Ordered set of entry decorators.
#[derive(Default, Clone)]
pub struct DecoratorRegistry {
    decorators: Vec<Arc<dyn EntryDecorator>>,
}

impl DecoratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `event_reminder` decorator.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.decorators.push(Arc::new(EventReminderDecorator));
        registry
    }

    pub fn register(&mut self, decorator: Arc<dyn EntryDecorator>) -> Result<(), RegistryError> {
        let decorator_id = validate_registry_id(decorator.decorator_id())?;
        if self.get(&decorator_id).is_some() {
            return Err(RegistryError::DuplicateId(decorator_id));
        }
        debug!("event=decorator_register module=dashboard status=ok decorator_id={decorator_id}");
        self.decorators.push(decorator);
        Ok(())
    }

    pub fn get(&self, decorator_id: &str) -> Option<Arc<dyn EntryDecorator>> {
        let wanted = decorator_id.trim();
        self.decorators
            .iter()
            .find(|decorator| decorator.decorator_id().trim() == wanted)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    pub fn decorator_ids(&self) -> Vec<String> {
        self.decorators
            .iter()
            .map(|decorator| decorator.decorator_id().trim().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EntryDecorator>> {
        self.decorators.iter()
    }
}

impl std::fmt::Debug for DecoratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorRegistry")
            .field("decorators", &self.decorator_ids())
            .finish()
    }
}

/// Display instant of a subject: the first upcoming of its fixed reminder
/// triggers and event start, else the most recent of them, else creation.
pub(crate) fn entry_when(subject: &SubjectView<'_>) -> When {
    let mut candidates: Vec<When> = subject
        .reminders()
        .iter()
        .filter(|reminder| !reminder.cleared)
        .filter_map(|reminder| reminder.snooze.or(reminder.fixed_trigger))
        .collect();
    candidates.extend(subject.event_start());

    let now = subject.now_timestamp();
    let upcoming = candidates
        .iter()
        .filter(|when| subject.timestamp(when) > now)
        .min_by_key(|when| subject.timestamp(when));
    let recent = candidates
        .iter()
        .filter(|when| subject.timestamp(when) <= now)
        .max_by_key(|when| subject.timestamp(when));
    upcoming
        .or(recent)
        .copied()
        .unwrap_or_else(|| When::from_timestamp(subject.created(), subject.default_timezone()))
}
