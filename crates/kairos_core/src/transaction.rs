//! Atomic change batches.
//!
//! # Responsibility
//! - Stage every mutation of a batch on copies of the touched items.
//! - Validate, apply, invalidate and refresh exactly once on commit.
//!
//! # Invariants
//! - Nothing staged is visible through the store until commit succeeds; a
//!   failed batch leaves the store untouched.
//! - Assigning two different values to the same occurrence attribute within
//!   one batch fails with `ConflictingChangeError`; repeating the same value
//!   is allowed.
//! - Derived state observed inside a batch is the last committed state.
//! - `pin` freezes the defaults computed after the batch is applied, so a
//!   subject created or edited earlier in the same batch pins its new state.

use crate::dashboard::aggregator::DashboardChanges;
use crate::error::{ConflictingChangeError, ConstraintError, CoreError, CoreResult};
use crate::memo::Input;
use crate::model::attr::{Attr, AttrValue, ExtensionKind};
use crate::model::item::{Event, Item, ItemId, Reminder};
use crate::model::triage::{ManualTriage, TriagePosition, TriageStatus};
use crate::model::when::{Timestamp, When};
use crate::model::Subject;
use crate::recurrence::occurrence::OccurrenceId;
use crate::recurrence::rule::Frequency;
use crate::recurrence::Recurrence;
use crate::store::{cached_occurrence, recurrence_id_in, Store};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Result of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<T> {
    pub value: T,
    /// Dashboard entries added and removed by the batch.
    pub changes: DashboardChanges,
}

/// One open change batch. Obtained through [`Store::transaction`].
pub struct Transaction<'s> {
    store: &'s mut Store,
    staged: BTreeMap<ItemId, Item>,
    removed: BTreeSet<ItemId>,
    reset: BTreeSet<ItemId>,
    dirty: HashSet<Input>,
    assigned: HashMap<(OccurrenceId, Attr), AttrValue>,
    pending_pins: Vec<Subject>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(store: &'s mut Store) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
            removed: BTreeSet::new(),
            reset: BTreeSet::new(),
            dirty: HashSet::new(),
            assigned: HashMap::new(),
            pending_pins: Vec::new(),
        }
    }

    /// Instant snapshotted when the batch opened.
    pub fn now(&self) -> DateTime<Utc> {
        self.store.now()
    }

    /// Item as staged so far in this batch.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        if self.removed.contains(&id) {
            return None;
        }
        self.staged.get(&id).or_else(|| self.store.item(id))
    }

    /// Creates a new item titled `title`, created now.
    pub fn create_item(&mut self, title: impl Into<String>) -> ItemId {
        let item = Item::new(title, self.now().timestamp());
        let id = item.id;
        self.staged.insert(id, item);
        self.dirty.insert(Input::Master(id));
        id
    }

    /// Inserts `item` as is, replacing any item with the same id.
    pub fn insert_item(&mut self, item: Item) -> ItemId {
        let id = item.id;
        self.removed.remove(&id);
        self.reset.insert(id);
        self.staged.insert(id, item);
        id
    }

    pub fn remove_item(&mut self, id: ItemId) -> CoreResult<()> {
        if self.item(id).is_none() {
            return Err(CoreError::ItemNotFound(id));
        }
        self.staged.remove(&id);
        self.removed.insert(id);
        Ok(())
    }

    pub fn set_title(&mut self, id: ItemId, title: impl Into<String>) -> CoreResult<()> {
        self.stage(id)?.title = title.into();
        self.dirty.insert(Input::Master(id));
        Ok(())
    }

    /// # Errors
    /// - `ExtensionPresent` when the item already has an event.
    pub fn add_event(&mut self, id: ItemId, event: Event) -> CoreResult<()> {
        let item = self.stage(id)?;
        if item.event.is_some() {
            return Err(CoreError::ExtensionPresent {
                item: id,
                extension: ExtensionKind::Event,
            });
        }
        item.event = Some(event);
        self.touch_master(id);
        Ok(())
    }

    /// Edits the event in place; values are validated at commit.
    pub fn update_event(&mut self, id: ItemId, edit: impl FnOnce(&mut Event)) -> CoreResult<()> {
        let event = self.stage(id)?.event.as_mut().ok_or(CoreError::ExtensionMissing {
            item: id,
            extension: ExtensionKind::Event,
        })?;
        edit(event);
        self.touch_master(id);
        Ok(())
    }

    pub fn remove_event(&mut self, id: ItemId) -> CoreResult<Event> {
        let event = self.stage(id)?.event.take().ok_or(CoreError::ExtensionMissing {
            item: id,
            extension: ExtensionKind::Event,
        })?;
        self.touch_master(id);
        Ok(event)
    }

    /// # Errors
    /// - `ExtensionPresent` when the item already recurs.
    pub fn add_recurrence(&mut self, id: ItemId, recurrence: Recurrence) -> CoreResult<()> {
        let item = self.stage(id)?;
        if item.recurrence.is_some() {
            return Err(CoreError::ExtensionPresent {
                item: id,
                extension: ExtensionKind::Recurrence,
            });
        }
        item.recurrence = Some(recurrence);
        self.touch_master(id);
        Ok(())
    }

    /// Removes the recurrence extension together with its ledger and
    /// occurrence cache.
    pub fn remove_recurrence(&mut self, id: ItemId) -> CoreResult<Recurrence> {
        let recurrence = self.stage(id)?.recurrence.take().ok_or(CoreError::ExtensionMissing {
            item: id,
            extension: ExtensionKind::Recurrence,
        })?;
        self.reset.insert(id);
        self.touch_master(id);
        Ok(recurrence)
    }

    pub fn set_frequency(&mut self, id: ItemId, frequency: Option<Frequency>) -> CoreResult<()> {
        self.recurrence_mut(id)?.set_frequency(frequency);
        self.dirty.insert(Input::Rule(id));
        Ok(())
    }

    pub fn set_count(&mut self, id: ItemId, count: Option<u32>) -> CoreResult<()> {
        self.recurrence_mut(id)?.set_count(count)?;
        self.dirty.insert(Input::Rule(id));
        Ok(())
    }

    pub fn set_until(&mut self, id: ItemId, until: Option<When>) -> CoreResult<()> {
        self.recurrence_mut(id)?.set_until(until);
        self.dirty.insert(Input::Rule(id));
        Ok(())
    }

    pub fn add_rdate(&mut self, id: ItemId, when: When) -> CoreResult<bool> {
        let added = self.recurrence_mut(id)?.add_rdate(when);
        self.dirty.insert(Input::Rule(id));
        Ok(added)
    }

    pub fn remove_rdate(&mut self, id: ItemId, when: &When) -> CoreResult<bool> {
        let removed = self.recurrence_mut(id)?.remove_rdate(when);
        self.dirty.insert(Input::Rule(id));
        Ok(removed)
    }

    pub fn add_exdate(&mut self, id: ItemId, when: When) -> CoreResult<bool> {
        let added = self.recurrence_mut(id)?.add_exdate(when);
        self.dirty.insert(Input::Rule(id));
        Ok(added)
    }

    pub fn remove_exdate(&mut self, id: ItemId, when: &When) -> CoreResult<bool> {
        let removed = self.recurrence_mut(id)?.remove_exdate(when);
        self.dirty.insert(Input::Rule(id));
        Ok(removed)
    }

    /// Sets the done-before watermark of a series.
    pub fn set_done_before(&mut self, id: ItemId, watermark: Option<When>) -> CoreResult<()> {
        self.recurrence_mut(id)?.set_done_before(watermark);
        self.dirty.insert(Input::Watermark(id));
        Ok(())
    }

    /// Identity-stable occurrence of `master` at `recurrence_id`.
    pub fn get_occurrence(
        &mut self,
        master: ItemId,
        recurrence_id: &When,
    ) -> CoreResult<OccurrenceId> {
        cached_occurrence(self.stage(master)?, recurrence_id)
    }

    /// Overrides `attr` for one occurrence.
    ///
    /// # Errors
    /// - `AttributeType` when `value` does not fit `attr`.
    /// - `ConflictingChangeError` when this batch already assigned a
    ///   different value to the same attribute of `occurrence`.
    pub fn modify(
        &mut self,
        occurrence: OccurrenceId,
        attr: Attr,
        value: AttrValue,
    ) -> CoreResult<()> {
        if !attr.accepts(&value) {
            return Err(ConstraintError::AttributeType {
                attr,
                value: format!("{value:?}"),
            }
            .into());
        }
        if let Some(previous) = self.assigned.get(&(occurrence, attr)) {
            if *previous != value {
                return Err(ConflictingChangeError { occurrence, attr }.into());
            }
        }
        self.recurrence_mut(occurrence.master)?
            .set_override(occurrence.key, attr, value.clone());
        self.assigned.insert((occurrence, attr), value);
        self.touch_recipe(occurrence);
        Ok(())
    }

    /// Drops every override of `occurrence`. Returns whether a recipe
    /// existed.
    pub fn unmodify(&mut self, occurrence: OccurrenceId) -> CoreResult<bool> {
        let removed = self
            .recurrence_mut(occurrence.master)?
            .remove_recipe(&occurrence.key)
            .is_some();
        self.assigned.retain(|(assigned, _), _| *assigned != occurrence);
        if removed {
            self.touch_recipe(occurrence);
        }
        Ok(removed)
    }

    /// Drops one override of `occurrence`.
    pub fn unmodify_attr(&mut self, occurrence: OccurrenceId, attr: Attr) -> CoreResult<bool> {
        let removed = self
            .recurrence_mut(occurrence.master)?
            .clear_override(&occurrence.key, attr)
            .is_some();
        self.assigned.remove(&(occurrence, attr));
        if removed {
            self.touch_recipe(occurrence);
        }
        Ok(removed)
    }

    /// Records a manual `(timestamp, status)` for one occurrence in its
    /// master's ledger.
    pub fn triage_occurrence(
        &mut self,
        occurrence: OccurrenceId,
        timestamp: Timestamp,
        status: TriageStatus,
    ) -> CoreResult<()> {
        self.recurrence_mut(occurrence.master)?
            .record_manual(occurrence.key, ManualTriage { timestamp, status });
        self.touch_manual(occurrence);
        Ok(())
    }

    pub fn clear_occurrence_triage(&mut self, occurrence: OccurrenceId) -> CoreResult<bool> {
        let cleared = self
            .recurrence_mut(occurrence.master)?
            .clear_manual(&occurrence.key)
            .is_some();
        if cleared {
            self.touch_manual(occurrence);
        }
        Ok(cleared)
    }

    /// Sets an item's manual triage. Without a timestamp the status is a
    /// permanent pin; with one it joins the timeline.
    pub fn set_triage(
        &mut self,
        id: ItemId,
        manual: Option<TriageStatus>,
        manual_timestamp: Option<Timestamp>,
    ) -> CoreResult<()> {
        let triage = &mut self.stage(id)?.triage;
        triage.manual = manual;
        triage.manual_timestamp = manual_timestamp;
        self.dirty.insert(Input::Master(id));
        Ok(())
    }

    /// Sets an item's manual triage from a raw status code.
    ///
    /// # Errors
    /// - `TriageRange` for codes below 100.
    pub fn set_triage_code(
        &mut self,
        id: ItemId,
        code: i64,
        manual_timestamp: Option<Timestamp>,
    ) -> CoreResult<()> {
        let status = TriageStatus::from_code(code)?;
        self.set_triage(id, Some(status), manual_timestamp)
    }

    pub fn add_reminder(&mut self, id: ItemId, reminder: Reminder) -> CoreResult<()> {
        self.stage(id)?.reminders.push(reminder);
        self.dirty.insert(Input::Master(id));
        Ok(())
    }

    /// Dismisses one reminder; it stays attached but stops alerting.
    pub fn clear_reminder(&mut self, id: ItemId, index: usize) -> CoreResult<()> {
        self.reminder_mut(id, index)?.cleared = true;
        self.dirty.insert(Input::Master(id));
        Ok(())
    }

    /// Postpones one reminder to `until`.
    pub fn snooze_reminder(&mut self, id: ItemId, index: usize, until: When) -> CoreResult<()> {
        let reminder = self.reminder_mut(id, index)?;
        reminder.snooze = Some(until);
        reminder.cleared = false;
        self.dirty.insert(Input::Master(id));
        Ok(())
    }

    pub fn clear_reminders(&mut self, id: ItemId) -> CoreResult<usize> {
        let cleared = std::mem::take(&mut self.stage(id)?.reminders).len();
        self.dirty.insert(Input::Master(id));
        Ok(cleared)
    }

    /// Freezes section and position at their defaults as of commit; no-op
    /// when already pinned.
    pub fn pin(&mut self, subject: Subject) -> CoreResult<()> {
        if self.pin_slot(subject)?.is_pinned() {
            return Ok(());
        }
        if !self.pending_pins.contains(&subject) {
            self.pending_pins.push(subject);
        }
        Ok(())
    }

    pub fn clear_pinned(&mut self, subject: Subject) -> CoreResult<()> {
        self.set_pins(subject, TriagePosition::default())
    }

    /// Pins to the NOW section at the current instant.
    pub fn pin_to_now(&mut self, subject: Subject) -> CoreResult<()> {
        let now = self.now().timestamp();
        self.set_pins(
            subject,
            TriagePosition {
                pinned_section: Some(TriageStatus::Now),
                pinned_position: Some(now),
            },
        )
    }

    fn set_pins(&mut self, subject: Subject, pins: TriagePosition) -> CoreResult<()> {
        *self.pin_slot(subject)? = pins;
        self.pending_pins.retain(|pending| *pending != subject);
        self.dirty.insert(Input::Pin(subject));
        Ok(())
    }

    /// Staged pins of `subject`; occurrences are materialized on demand.
    fn pin_slot(&mut self, subject: Subject) -> CoreResult<&mut TriagePosition> {
        let occurrence = match subject {
            Subject::Item(id) => return Ok(&mut self.stage(id)?.position),
            Subject::Occurrence(occurrence) => occurrence,
        };
        let missing = CoreError::ExtensionMissing {
            item: occurrence.master,
            extension: ExtensionKind::Recurrence,
        };
        let default_tz = self.store.default_timezone();
        let item = self.stage(occurrence.master)?;
        let recurrence = item.recurrence.as_ref().ok_or_else(|| missing.clone())?;
        let recurrence_id = recurrence_id_in(item, recurrence, occurrence.key, default_tz);
        cached_occurrence(item, &recurrence_id)?;
        item.recurrence
            .as_mut()
            .and_then(|recurrence| recurrence.occurrence_cache_mut().get_mut(&occurrence.key))
            .map(|cached| &mut cached.position)
            .ok_or(missing)
    }

    fn stage(&mut self, id: ItemId) -> CoreResult<&mut Item> {
        if self.removed.contains(&id) {
            return Err(CoreError::ItemNotFound(id));
        }
        match self.staged.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let item = self
                    .store
                    .items
                    .get(&id)
                    .cloned()
                    .ok_or(CoreError::ItemNotFound(id))?;
                Ok(entry.insert(item))
            }
        }
    }

    fn reminder_mut(&mut self, id: ItemId, index: usize) -> CoreResult<&mut Reminder> {
        self.stage(id)?
            .reminders
            .get_mut(index)
            .ok_or(CoreError::ReminderNotFound { item: id, index })
    }

    fn recurrence_mut(&mut self, id: ItemId) -> CoreResult<&mut Recurrence> {
        self.stage(id)?
            .recurrence
            .as_mut()
            .ok_or(CoreError::ExtensionMissing {
                item: id,
                extension: ExtensionKind::Recurrence,
            })
    }

    fn touch_master(&mut self, id: ItemId) {
        self.dirty.insert(Input::Master(id));
        self.dirty.insert(Input::Rule(id));
        self.dirty.insert(Input::Recipes(id));
        self.dirty.insert(Input::ManualRecords(id));
        self.dirty.insert(Input::Watermark(id));
    }

    fn touch_recipe(&mut self, occurrence: OccurrenceId) {
        self.dirty
            .insert(Input::Recipe(occurrence.master, occurrence.key));
        self.dirty.insert(Input::Recipes(occurrence.master));
    }

    fn touch_manual(&mut self, occurrence: OccurrenceId) {
        self.dirty
            .insert(Input::Manual(occurrence.master, occurrence.key));
        self.dirty.insert(Input::ManualRecords(occurrence.master));
    }

    /// Validates and applies the batch, then refreshes the dashboard.
    pub(crate) fn commit<T>(self, value: T) -> CoreResult<Committed<T>> {
        if let Some(err) = self
            .staged
            .values()
            .find_map(|item| item.validate().err())
        {
            let err = CoreError::from(err);
            self.abort(&err);
            return Err(err);
        }

        let Transaction {
            store,
            staged,
            removed,
            reset,
            dirty,
            pending_pins,
            ..
        } = self;
        let touched = staged.len() + removed.len();
        for id in &removed {
            store.items.remove(id);
            store.forget(*id);
        }
        for (id, item) in staged {
            store.items.insert(id, item);
        }
        for id in reset {
            store.forget(id);
        }
        let mut staled = 0;
        for input in dirty {
            staled += store.invalidate(input);
        }
        for subject in pending_pins {
            staled += store.freeze_pins(subject);
        }
        let changes = store.refresh();
        info!(
            "event=tx_commit module=transaction status=ok items={} staled={} added={} removed={}",
            touched,
            staled,
            changes.added.len(),
            changes.removed.len()
        );
        Ok(Committed { value, changes })
    }

    /// Discards the batch.
    pub(crate) fn abort(self, err: &CoreError) {
        warn!(
            "event=tx_abort module=transaction status=error code={} items={}",
            err.code(),
            self.staged.len() + self.removed.len()
        );
    }
}
