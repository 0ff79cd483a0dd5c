//! Timeline providers and their registry.
//!
//! # Responsibility
//! - Let independent concerns (events, reminders, custom hooks) contribute
//!   `(timestamp, status)` facts to a subject's timeline.
//!
//! # Invariants
//! - Provider ids are unique and use `[a-z0-9_-]`.
//! - Providers run in registration order; later registration wins exact
//!   ties of timestamp and weight.

use crate::error::{validate_registry_id, RegistryError};
use crate::model::triage::TriageStatus;
use crate::store::SubjectView;
use crate::triage::classifier::TriageFact;
use log::debug;
use std::sync::Arc;

/// Weight of event-start facts.
pub const EVENT_WEIGHT: u8 = 1;
/// Weight of reminder facts; reminders outrank event start on ties.
pub const REMINDER_WEIGHT: u8 = 2;

/// Contributes facts to a subject's triage timeline.
pub trait TimelineProvider {
    fn provider_id(&self) -> &str;

    /// Facts for `subject`. Reads must go through the view so the result is
    /// tracked for invalidation.
    fn facts(&self, subject: &SubjectView<'_>) -> Vec<TriageFact>;
}

/// Events are LATER until they start, then NOW.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStartedTimeline;

impl TimelineProvider for EventStartedTimeline {
    fn provider_id(&self) -> &str {
        "event_started"
    }

    fn facts(&self, subject: &SubjectView<'_>) -> Vec<TriageFact> {
        let Some(start) = subject.event_start() else {
            return Vec::new();
        };
        vec![
            TriageFact::new(0, TriageStatus::Later, EVENT_WEIGHT),
            TriageFact::new(subject.timestamp(&start), TriageStatus::Now, EVENT_WEIGHT),
        ]
    }
}

/// Items with reminders are LATER until a reminder fires, then NOW.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReminderTimeline;

impl TimelineProvider for ReminderTimeline {
    fn provider_id(&self) -> &str {
        "reminder_trigger"
    }

    fn facts(&self, subject: &SubjectView<'_>) -> Vec<TriageFact> {
        let triggers = subject.reminder_triggers();
        if triggers.is_empty() {
            return Vec::new();
        }
        let mut facts = Vec::with_capacity(triggers.len() + 1);
        facts.push(TriageFact::new(0, TriageStatus::Later, REMINDER_WEIGHT));
        facts.extend(triggers.iter().map(|trigger| {
            TriageFact::new(subject.timestamp(trigger), TriageStatus::Now, REMINDER_WEIGHT)
        }));
        facts
    }
}

/// Ordered set of timeline providers.
#[derive(Default, Clone)]
pub struct TimelineRegistry {
    providers: Vec<Arc<dyn TimelineProvider>>,
}

impl TimelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the event-start and reminder providers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.providers.push(Arc::new(EventStartedTimeline));
        registry.providers.push(Arc::new(ReminderTimeline));
        registry
    }

    /// Registers one provider after all existing ones.
    pub fn register(&mut self, provider: Arc<dyn TimelineProvider>) -> Result<(), RegistryError> {
        let provider_id = validate_registry_id(provider.provider_id())?;
        if self
            .providers
            .iter()
            .any(|existing| existing.provider_id().trim() == provider_id)
        {
            return Err(RegistryError::DuplicateId(provider_id));
        }
        debug!("event=timeline_register module=triage status=ok provider_id={provider_id}");
        self.providers.push(provider);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider ids in registration order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.provider_id().trim().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TimelineProvider>> {
        self.providers.iter()
    }
}

impl std::fmt::Debug for TimelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineRegistry")
            .field("providers", &self.provider_ids())
            .finish()
    }
}
