//! Display section and position planning.
//!
//! # Invariants
//! - LATER subjects sort by their next upcoming fact; everything else by
//!   its most recent past fact, never earlier than creation.
//! - Pinned section/position override the defaults until cleared.

use crate::model::triage::TriageStatus;
use crate::model::when::Timestamp;
use crate::model::Subject;
use crate::store::Store;
use crate::triage::classifier::TriageState;

/// Derived position of one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionState {
    pub default_section: TriageStatus,
    pub default_position: Timestamp,
    pub section: TriageStatus,
    pub position: Timestamp,
    pub pinned: bool,
}

/// Sort position implied by a triage state.
pub fn default_position(triage: &TriageState, now: Timestamp, created: Timestamp) -> Timestamp {
    if triage.calculated == TriageStatus::Later {
        let upcoming = triage
            .timeline
            .iter()
            .map(|fact| fact.timestamp)
            .filter(|timestamp| *timestamp > now)
            .min();
        if let Some(upcoming) = upcoming {
            return upcoming;
        }
    }
    triage
        .timeline
        .iter()
        .map(|fact| fact.timestamp)
        .filter(|timestamp| *timestamp <= now)
        .max()
        .map_or(created, |latest| latest.max(created))
}

pub(crate) fn plan(store: &Store, subject: Subject) -> PositionState {
    let triage = store.triage(subject);
    let default_section = triage.calculated;
    let default_position =
        default_position(&triage, store.now_timestamp(), store.created(subject));
    let pins = store.pinned(subject);
    PositionState {
        default_section,
        default_position,
        section: pins.pinned_section.unwrap_or(default_section),
        position: pins.pinned_position.unwrap_or(default_position),
        pinned: pins.is_pinned(),
    }
}
