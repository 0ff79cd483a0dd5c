//! Visible-set computation and entry bookkeeping.
//!
//! # Invariants
//! - Edited occurrences (override recipe or manual triage record) that are
//!   still members of their series are always visible.
//! - Every NOW occurrence is visible; at most one past DONE occurrence and
//!   at most one upcoming LATER occurrence are.
//! - The forward scan for the next LATER occurrence stops after
//!   `forward_scan_limit` future instances.

use crate::dashboard::entry::DashboardEntry;
use crate::memo::Input;
use crate::model::item::ItemId;
use crate::model::triage::TriageStatus;
use crate::model::when::RecurrenceKey;
use crate::model::Subject;
use crate::recurrence::occurrence::OccurrenceId;
use crate::store::Store;
use log::debug;
use std::collections::BTreeSet;

/// Entries added and removed by one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardChanges {
    pub added: Vec<DashboardEntry>,
    pub removed: Vec<DashboardEntry>,
}

impl DashboardChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn extend(&mut self, other: DashboardChanges) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

/// Recurrence-ids of `master` that get their own entry.
pub(crate) fn compute_visible(store: &Store, master: ItemId) -> BTreeSet<RecurrenceKey> {
    let mut visible = BTreeSet::new();
    let Some(rules) = store.rules(master) else {
        return visible;
    };
    store.read(Input::Recipes(master));
    store.read(Input::ManualRecords(master));
    store.read(Input::Watermark(master));
    let recurrence = rules.recurrence();

    for key in recurrence.recipe_keys().chain(recurrence.manual_keys()) {
        if rules.includes(*key) {
            visible.insert(*key);
        }
    }

    let now = store.now_timestamp();
    let watermark = recurrence.done_before().map(|when| store.timestamp(&when));
    let scan_limit = store.config().forward_scan_limit;
    let mut latest_done: Option<RecurrenceKey> = None;
    let mut before_watermark: Option<RecurrenceKey> = None;
    let mut next_later: Option<RecurrenceKey> = None;
    let mut future_seen = 0usize;

    for when in rules.occurrences() {
        let at = store.timestamp(&when);
        let key = when.key();
        let unedited = !visible.contains(&key);
        if unedited && watermark.is_some_and(|watermark| at < watermark) {
            if at <= now {
                before_watermark = Some(key);
            }
            continue;
        }
        if at > now {
            future_seen += 1;
            if future_seen > scan_limit {
                break;
            }
        }
        let subject = Subject::Occurrence(OccurrenceId { master, key });
        match store.triage(subject).calculated {
            TriageStatus::Now => {
                visible.insert(key);
            }
            TriageStatus::Done if at <= now => latest_done = Some(key),
            TriageStatus::Later if at > now => {
                next_later = Some(key);
                break;
            }
            _ => {}
        }
    }

    if let Some(key) = latest_done.or(before_watermark) {
        visible.insert(key);
    }
    if let Some(key) = next_later {
        visible.insert(key);
    }
    visible
}

/// Recomputes every master's entries.
pub(crate) fn refresh_all(store: &mut Store) -> DashboardChanges {
    let mut changes = DashboardChanges::default();
    let orphaned: Vec<ItemId> = store
        .entries
        .keys()
        .filter(|id| store.item(**id).is_none())
        .copied()
        .collect();
    for master in orphaned {
        changes.extend(drop_item(store, master));
    }
    let masters: Vec<ItemId> = store.item_ids().collect();
    for master in masters {
        changes.extend(refresh_item(store, master));
    }
    changes
}

/// Brings `master`'s entries in line with its visible set.
pub(crate) fn refresh_item(store: &mut Store, master: ItemId) -> DashboardChanges {
    let visible = store.visible_recurrence_ids(master);
    let mut changes = DashboardChanges::default();

    let existing = store.entries.entry(master).or_default();
    let stale: Vec<RecurrenceKey> = existing
        .occurrences
        .keys()
        .filter(|key| !visible.contains(key))
        .copied()
        .collect();
    for key in stale {
        if let Some(entry) = existing.occurrences.remove(&key) {
            changes.removed.push(entry);
        }
    }
    let missing: Vec<RecurrenceKey> = visible
        .iter()
        .filter(|key| !existing.occurrences.contains_key(key))
        .copied()
        .collect();
    let master_entry = if visible.is_empty() {
        None
    } else {
        existing.master.take()
    };
    let needs_master_entry = visible.is_empty() && existing.master.is_none();
    changes.removed.extend(master_entry);

    for key in missing {
        let Some(occurrence) = store.materialize(master, key) else {
            continue;
        };
        let entry = store.build_entry(Subject::Occurrence(occurrence));
        store
            .entries
            .entry(master)
            .or_default()
            .occurrences
            .insert(key, entry.clone());
        changes.added.push(entry);
    }
    if needs_master_entry {
        let entry = store.build_entry(Subject::Item(master));
        store.entries.entry(master).or_default().master = Some(entry.clone());
        changes.added.push(entry);
    }

    if !changes.is_empty() {
        debug!(
            "event=dashboard_refresh module=dashboard status=ok item={} added={} removed={}",
            master,
            changes.added.len(),
            changes.removed.len()
        );
    }
    changes
}

/// Removes every entry of `master`.
pub(crate) fn drop_item(store: &mut Store, master: ItemId) -> DashboardChanges {
    let removed = store
        .entries
        .remove(&master)
        .map(|entries| entries.into_entries().collect())
        .unwrap_or_default();
    DashboardChanges {
        added: Vec::new(),
        removed,
    }
}
