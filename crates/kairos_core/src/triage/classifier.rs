//! Timeline facts and status computation.
//!
//! # Invariants
//! - Every timeline starts with the default fact `(0, NOW)`.
//! - The automatic status is the greatest fact at or before now; equal
//!   timestamps are broken by provider weight, then by insertion order.
//! - An occurrence's manual record is used verbatim and bypasses providers.

use crate::memo::Input;
use crate::model::attr::Attr;
use crate::model::triage::TriageStatus;
use crate::model::when::Timestamp;
use crate::model::Subject;
use crate::recurrence::occurrence::OccurrenceId;
use crate::store::Store;

/// Weight of the implicit `(0, NOW)` fact.
pub const DEFAULT_WEIGHT: u8 = 0;
/// Weight of facts that come from manual triage or the done watermark.
pub const MANUAL_WEIGHT: u8 = u8::MAX;

/// One `(timestamp, status)` pair contributed to a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriageFact {
    pub timestamp: Timestamp,
    pub status: TriageStatus,
    pub weight: u8,
}

impl TriageFact {
    pub fn new(timestamp: Timestamp, status: TriageStatus, weight: u8) -> Self {
        Self {
            timestamp,
            status,
            weight,
        }
    }

    fn default_fact() -> Self {
        Self::new(0, TriageStatus::Now, DEFAULT_WEIGHT)
    }
}

/// Derived triage of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageState {
    pub manual: Option<TriageStatus>,
    pub manual_timestamp: Option<Timestamp>,
    pub auto: Option<TriageStatus>,
    pub calculated: TriageStatus,
    /// Facts in insertion order.
    pub timeline: Vec<TriageFact>,
}

/// Greatest fact with `timestamp <= now`.
pub fn select_auto(timeline: &[TriageFact], now: Timestamp) -> Option<TriageStatus> {
    timeline
        .iter()
        .enumerate()
        .filter(|(_, fact)| fact.timestamp <= now)
        .max_by_key(|(index, fact)| (fact.timestamp, fact.weight, *index))
        .map(|(_, fact)| fact.status)
}

pub(crate) fn classify(store: &Store, subject: Subject) -> TriageState {
    if let Subject::Occurrence(occurrence) = subject {
        if let Some(state) = classify_from_ledger(store, occurrence) {
            return state;
        }
    }
    classify_standalone(store, subject)
}

/// Manual record or done watermark of the master, when either applies.
fn classify_from_ledger(store: &Store, occurrence: OccurrenceId) -> Option<TriageState> {
    let master = occurrence.master;
    store.read(Input::Rule(master));
    store.read(Input::Manual(master, occurrence.key));
    store.read(Input::Watermark(master));
    let recurrence = store.item(master)?.recurrence.as_ref()?;

    if let Some(record) = recurrence.manual_record(&occurrence.key) {
        return Some(TriageState {
            manual: Some(record.status),
            manual_timestamp: Some(record.timestamp),
            auto: None,
            calculated: record.status,
            timeline: vec![
                TriageFact::default_fact(),
                TriageFact::new(record.timestamp, record.status, MANUAL_WEIGHT),
            ],
        });
    }

    let watermark = store.timestamp(&recurrence.done_before()?);
    let start = store
        .resolved_event(Subject::Occurrence(occurrence))?
        .start()?;
    let start_ts = store.timestamp(&start);
    if start_ts >= watermark {
        return None;
    }
    Some(TriageState {
        manual: None,
        manual_timestamp: None,
        auto: Some(TriageStatus::Done),
        calculated: TriageStatus::Done,
        timeline: vec![
            TriageFact::default_fact(),
            TriageFact::new(start_ts, TriageStatus::Done, MANUAL_WEIGHT),
        ],
    })
}

fn classify_standalone(store: &Store, subject: Subject) -> TriageState {
    let manual = store
        .resolve(subject, Attr::TriageManual)
        .and_then(|value| value.as_status());
    let manual_timestamp = store
        .resolve(subject, Attr::TriageManualTimestamp)
        .and_then(|value| value.as_timestamp());

    let mut timeline = vec![TriageFact::default_fact()];
    if let (Some(status), Some(timestamp)) = (manual, manual_timestamp) {
        timeline.push(TriageFact::new(timestamp, status, MANUAL_WEIGHT));
    }
    let view = store.view(subject);
    for provider in store.timelines().iter() {
        timeline.extend(provider.facts(&view));
    }

    let auto = select_auto(&timeline, store.now_timestamp());
    let calculated = match (manual, manual_timestamp) {
        (Some(status), None) => status,
        _ => auto.unwrap_or(TriageStatus::Now),
    };
    TriageState {
        manual,
        manual_timestamp,
        auto,
        calculated,
        timeline,
    }
}

#[cfg(test)]
mod tests {
    use super::{select_auto, TriageFact, DEFAULT_WEIGHT, MANUAL_WEIGHT};
    use crate::model::triage::TriageStatus;

    #[test]
    fn latest_past_fact_wins() {
        let timeline = [
            TriageFact::new(0, TriageStatus::Now, DEFAULT_WEIGHT),
            TriageFact::new(0, TriageStatus::Later, 1),
            TriageFact::new(500, TriageStatus::Now, 1),
            TriageFact::new(900, TriageStatus::Done, MANUAL_WEIGHT),
        ];
        assert_eq!(select_auto(&timeline, 100), Some(TriageStatus::Later));
        assert_eq!(select_auto(&timeline, 500), Some(TriageStatus::Now));
        assert_eq!(select_auto(&timeline, 1_000), Some(TriageStatus::Done));
    }

    #[test]
    fn equal_weight_ties_go_to_later_insertion() {
        let timeline = [
            TriageFact::new(10, TriageStatus::Done, 1),
            TriageFact::new(10, TriageStatus::Later, 1),
        ];
        assert_eq!(select_auto(&timeline, 10), Some(TriageStatus::Later));
    }

    #[test]
    fn empty_past_yields_no_auto_status() {
        let timeline = [TriageFact::new(50, TriageStatus::Now, 1)];
        assert_eq!(select_auto(&timeline, 10), None);
    }
}
