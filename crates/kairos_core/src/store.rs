//! In-memory item store with memoized triage and dashboard state.
//!
//! # Responsibility
//! - Own master items, their dashboard entries and the registries that
//!   feed classification.
//! - Serve attribute resolution for masters and occurrences.
//! - Memoize triage, position and visible sets, recording every input read
//!   so changes invalidate exactly the affected values.
//!
//! # Invariants
//! - "Now" is snapshotted once per change batch or tick; every derived
//!   value computed in between sees the same instant.
//! - Reads never mutate items. Occurrence materialization only touches the
//!   identity cache, which no derived value depends on.
//! - All writes go through `Store::transaction`.
//!
//! # See also
//! - `crate::transaction` for the change-batch boundary.

use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::dashboard::aggregator::{self, DashboardChanges};
use crate::dashboard::entry::{
    entry_when, DashboardEntry, DecoratorRegistry, EntryId, EntrySnapshot, ItemEntries,
};
use crate::error::{CoreError, CoreResult};
use crate::memo::{Cell, DependencyGraph, Derived, GraphStats, Input};
use crate::model::attr::{Attr, AttrValue, ExtensionKind};
use crate::model::item::{Event, Item, ItemId, Reminder};
use crate::model::triage::TriagePosition;
use crate::model::when::{RecurrenceKey, Timestamp, When};
use crate::model::Subject;
use crate::recurrence::occurrence::{Occurrence, OccurrenceId};
use crate::recurrence::rule::RecurrenceRules;
use crate::recurrence::Recurrence;
use crate::transaction::{Committed, Transaction};
use crate::triage::classifier::{self, TriageState};
use crate::triage::position::{self, PositionState};
use crate::triage::providers::TimelineRegistry;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

pub struct Store {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    now: DateTime<Utc>,
    pub(crate) items: BTreeMap<ItemId, Item>,
    pub(crate) entries: BTreeMap<ItemId, ItemEntries>,
    timelines: TimelineRegistry,
    decorators: DecoratorRegistry,
    memo: RefCell<DependencyGraph>,
    triage_cache: RefCell<HashMap<Subject, TriageState>>,
    position_cache: RefCell<HashMap<Subject, PositionState>>,
    visible_cache: RefCell<HashMap<ItemId, BTreeSet<RecurrenceKey>>>,
    next_entry: u64,
}

impl Store {
    /// Store with the built-in timeline providers and decorators.
    ///
    /// # Errors
    /// - Returns an error when `config` fails validation.
    pub fn new(config: EngineConfig, clock: Box<dyn Clock>) -> Result<Self, ConfigError> {
        Self::with_registries(
            config,
            clock,
            TimelineRegistry::with_builtin(),
            DecoratorRegistry::with_builtin(),
        )
    }

    pub fn with_registries(
        config: EngineConfig,
        clock: Box<dyn Clock>,
        timelines: TimelineRegistry,
        decorators: DecoratorRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now();
        info!(
            "event=store_open module=store status=ok tz={} providers={} decorators={}",
            config.default_timezone.name(),
            timelines.len(),
            decorators.len()
        );
        Ok(Self {
            config,
            clock,
            now,
            items: BTreeMap::new(),
            entries: BTreeMap::new(),
            timelines,
            decorators,
            memo: RefCell::new(DependencyGraph::new()),
            triage_cache: RefCell::new(HashMap::new()),
            position_cache: RefCell::new(HashMap::new()),
            visible_cache: RefCell::new(HashMap::new()),
            next_entry: 1,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn default_timezone(&self) -> Tz {
        self.config.default_timezone
    }

    pub fn timelines(&self) -> &TimelineRegistry {
        &self.timelines
    }

    pub fn decorators(&self) -> &DecoratorRegistry {
        &self.decorators
    }

    /// Snapshotted current instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.read(Input::Now);
        self.now
    }

    pub fn now_timestamp(&self) -> Timestamp {
        self.now().timestamp()
    }

    /// Epoch seconds of `when`; floating values use the default zone.
    pub fn timestamp(&self, when: &When) -> Timestamp {
        when.timestamp(self.config.default_timezone)
    }

    pub fn is_past(&self, when: &When) -> bool {
        self.timestamp(when) <= self.now_timestamp()
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.memo.borrow().stats()
    }

    pub(crate) fn read(&self, input: Input) {
        self.memo.borrow_mut().record_input(input);
    }

    /// Rule view of `master`'s series, when it has a recurrence extension
    /// and a start.
    pub fn rules(&self, master: ItemId) -> Option<RecurrenceRules<'_>> {
        self.read(Input::Master(master));
        self.read(Input::Rule(master));
        let item = self.items.get(&master)?;
        let recurrence = item.recurrence.as_ref()?;
        let start = series_start(item, recurrence)?;
        Some(RecurrenceRules::new(
            recurrence,
            start,
            self.config.default_timezone,
        ))
    }

    /// Recurrence-ids of `master` within `[start, end]`.
    pub fn occurrences_between(&self, master: ItemId, start: &When, end: &When) -> Vec<When> {
        self.rules(master)
            .map(|rules| rules.occurrences_between(start, end).collect())
            .unwrap_or_default()
    }

    /// Identity-stable occurrence for `recurrence_id`, created on demand.
    ///
    /// # Errors
    /// - `ItemNotFound` when `master` does not exist.
    /// - `ExtensionMissing` when `master` has no recurrence extension.
    pub fn get_occurrence(
        &mut self,
        master: ItemId,
        recurrence_id: &When,
    ) -> CoreResult<OccurrenceId> {
        let item = self
            .items
            .get_mut(&master)
            .ok_or(CoreError::ItemNotFound(master))?;
        cached_occurrence(item, recurrence_id)
    }

    pub fn occurrence(&self, id: OccurrenceId) -> Option<&Occurrence> {
        self.items
            .get(&id.master)?
            .recurrence
            .as_ref()?
            .occurrence_cache()
            .get(&id.key)
    }

    /// User-facing recurrence-id of an occurrence: the first-seen value when
    /// cached, else the key expressed in the series' zone.
    pub fn recurrence_id(&self, id: OccurrenceId) -> Option<When> {
        let item = self.items.get(&id.master)?;
        let recurrence = item.recurrence.as_ref()?;
        Some(recurrence_id_in(item, recurrence, id.key, self.config.default_timezone))
    }

    /// Value of `attr` as seen by `subject`.
    ///
    /// Occurrences read their override first, then the recurrence-id for the
    /// series' start attribute, then the master's value. Returns `None` when
    /// the owning extension is absent.
    pub fn resolve(&self, subject: Subject, attr: Attr) -> Option<AttrValue> {
        let master = subject.master();
        self.read(Input::Master(master));
        let item = self.items.get(&master)?;
        if let Subject::Occurrence(occurrence) = subject {
            self.read(Input::Rule(master));
            self.read(Input::Recipe(master, occurrence.key));
            if let Some(recurrence) = item.recurrence.as_ref() {
                let overridden = recurrence
                    .recipe(&occurrence.key)
                    .and_then(|recipe| recipe.get(attr));
                if let Some(value) = overridden {
                    return Some(value.clone());
                }
                if attr == recurrence.start_attr() && item.event.is_some() {
                    let recurrence_id = recurrence_id_in(
                        item,
                        recurrence,
                        occurrence.key,
                        self.config.default_timezone,
                    );
                    return Some(AttrValue::When(Some(recurrence_id)));
                }
            }
        }
        master_value(item, attr)
    }

    /// Event extension as seen by `subject`, overrides applied.
    pub fn resolved_event(&self, subject: Subject) -> Option<Event> {
        self.read(Input::Master(subject.master()));
        let base = self.items.get(&subject.master())?.event?;
        if matches!(subject, Subject::Item(_)) {
            return Some(base);
        }
        Some(Event {
            base_start: self
                .resolve(subject, Attr::BaseStart)
                .and_then(|value| value.as_when()),
            base_duration: self
                .resolve(subject, Attr::BaseDuration)
                .and_then(|value| value.as_duration())
                .unwrap_or(base.base_duration),
            all_day: self
                .resolve(subject, Attr::AllDay)
                .and_then(|value| value.as_flag())
                .unwrap_or(base.all_day),
            any_time: self
                .resolve(subject, Attr::AnyTime)
                .and_then(|value| value.as_flag())
                .unwrap_or(base.any_time),
            transparency: self
                .resolve(subject, Attr::Transparency)
                .and_then(|value| value.as_transparency())
                .unwrap_or(base.transparency),
        })
    }

    pub fn title(&self, subject: Subject) -> String {
        self.resolve(subject, Attr::Title)
            .and_then(|value| value.as_text().map(str::to_string))
            .unwrap_or_default()
    }

    /// Reminders of the master; occurrences share them.
    pub fn reminders(&self, subject: Subject) -> Vec<Reminder> {
        self.read(Input::Master(subject.master()));
        self.items
            .get(&subject.master())
            .map(|item| item.reminders.clone())
            .unwrap_or_default()
    }

    /// Pending alert instants of `subject`'s reminders; relative reminders
    /// follow the resolved event start and cleared ones are skipped.
    pub fn reminder_triggers(&self, subject: Subject) -> Vec<When> {
        let reminders = self.reminders(subject);
        if reminders.is_empty() {
            return Vec::new();
        }
        let start = self
            .resolved_event(subject)
            .and_then(|event| event.start());
        reminders
            .iter()
            .filter_map(|reminder| reminder.pending(start))
            .collect()
    }

    /// Creation timestamp; occurrences report their master's.
    pub fn created(&self, subject: Subject) -> Timestamp {
        self.read(Input::Master(subject.master()));
        self.items
            .get(&subject.master())
            .map_or(0, |item| item.created)
    }

    /// Stored pins of `subject`.
    pub fn pinned(&self, subject: Subject) -> TriagePosition {
        self.read(Input::Pin(subject));
        let Some(item) = self.items.get(&subject.master()) else {
            return TriagePosition::default();
        };
        match subject {
            Subject::Item(_) => item.position,
            Subject::Occurrence(occurrence) => item
                .recurrence
                .as_ref()
                .and_then(|recurrence| recurrence.occurrence_cache().get(&occurrence.key))
                .map(|cached| cached.position)
                .unwrap_or_default(),
        }
    }

    pub fn view(&self, subject: Subject) -> SubjectView<'_> {
        SubjectView {
            store: self,
            subject,
        }
    }

    /// Memoized triage of `subject`.
    pub fn triage(&self, subject: Subject) -> TriageState {
        self.memoized(Derived::Triage(subject), subject, &self.triage_cache, |store| {
            classifier::classify(store, subject)
        })
    }

    /// Memoized display section and position of `subject`.
    pub fn position(&self, subject: Subject) -> PositionState {
        self.memoized(
            Derived::Position(subject),
            subject,
            &self.position_cache,
            |store| position::plan(store, subject),
        )
    }

    /// Memoized recurrence-ids of `master` that get their own entry.
    pub fn visible_recurrence_ids(&self, master: ItemId) -> BTreeSet<RecurrenceKey> {
        self.memoized(Derived::Visible(master), master, &self.visible_cache, |store| {
            aggregator::compute_visible(store, master)
        })
    }

    fn memoized<K, V>(
        &self,
        key: Derived,
        slot: K,
        cache: &RefCell<HashMap<K, V>>,
        compute: impl FnOnce(&Self) -> V,
    ) -> V
    where
        K: Copy + Eq + Hash,
        V: Clone,
    {
        {
            let mut memo = self.memo.borrow_mut();
            if memo.is_fresh(key) {
                if let Some(value) = cache.borrow().get(&slot) {
                    memo.record(Cell::Derived(key));
                    return value.clone();
                }
            }
            memo.begin(key);
        }
        let value = compute(self);
        self.memo.borrow_mut().finish(key);
        cache.borrow_mut().insert(slot, value.clone());
        value
    }

    /// Entries currently shown for `master`.
    pub fn dashboard_entries(&self, master: ItemId) -> Vec<&DashboardEntry> {
        self.entries
            .get(&master)
            .map(|entries| entries.iter().collect())
            .unwrap_or_default()
    }

    /// Every entry on the dashboard, grouped by master.
    pub fn entries(&self) -> impl Iterator<Item = &DashboardEntry> {
        self.entries.values().flat_map(|entries| entries.iter())
    }

    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }

    /// Renders `entry` at the current "now".
    pub fn entry_snapshot(&self, entry: &DashboardEntry) -> EntrySnapshot {
        let subject = entry.subject();
        let view = self.view(subject);
        let triage = self.triage(subject);
        let position = self.position(subject);
        let fields = entry
            .decorations()
            .iter()
            .filter_map(|id| {
                self.decorators
                    .get(id)
                    .map(|decorator| (id.clone(), decorator.value(&view)))
            })
            .collect();
        EntrySnapshot {
            id: entry.id(),
            subject: subject.to_string(),
            when: entry_when(&view),
            what: view.title(),
            triage_status: triage.calculated,
            triage_section: position.section,
            triage_position: position.position,
            pinned: position.pinned,
            fields,
        }
    }

    /// Runs `change` as one atomic batch and refreshes the dashboard.
    ///
    /// # Errors
    /// - Any error returned by `change` or by commit-time validation; the
    ///   store is left exactly as it was.
    pub fn transaction<T>(
        &mut self,
        change: impl FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    ) -> CoreResult<Committed<T>> {
        self.sync_clock();
        let mut tx = Transaction::new(self);
        match change(&mut tx) {
            Ok(value) => tx.commit(value),
            Err(err) => {
                tx.abort(&err);
                Err(err)
            }
        }
    }

    /// Re-reads the clock and refreshes the dashboard.
    pub fn tick(&mut self) -> DashboardChanges {
        let moved = self.sync_clock();
        let changes = self.refresh();
        debug!(
            "event=clock_tick module=store status=ok moved={} now={} added={} removed={}",
            moved,
            self.now.timestamp(),
            changes.added.len(),
            changes.removed.len()
        );
        changes
    }

    /// Recomputes every master's entries without touching the clock.
    pub fn refresh(&mut self) -> DashboardChanges {
        aggregator::refresh_all(self)
    }

    /// Snapshots the clock; returns whether "now" moved.
    pub(crate) fn sync_clock(&mut self) -> bool {
        let now = self.clock.now();
        if now == self.now {
            return false;
        }
        self.now = now;
        self.invalidate(Input::Now);
        true
    }

    pub(crate) fn invalidate(&mut self, input: Input) -> usize {
        self.memo.get_mut().invalidate(input)
    }

    /// Drops memoized state of a removed master.
    pub(crate) fn forget(&mut self, master: ItemId) {
        self.memo.get_mut().forget_master(master);
        self.triage_cache
            .get_mut()
            .retain(|subject, _| subject.master() != master);
        self.position_cache
            .get_mut()
            .retain(|subject, _| subject.master() != master);
        self.visible_cache.get_mut().remove(&master);
    }

    /// Pins `subject` at its current default section and position. Returns
    /// the number of derived values invalidated.
    pub(crate) fn freeze_pins(&mut self, subject: Subject) -> usize {
        if !self.items.contains_key(&subject.master()) {
            return 0;
        }
        let current = self.position(subject);
        if current.pinned {
            return 0;
        }
        let pins = TriagePosition {
            pinned_section: Some(current.default_section),
            pinned_position: Some(current.default_position),
        };
        let Some(item) = self.items.get_mut(&subject.master()) else {
            return 0;
        };
        let slot = match subject {
            Subject::Item(_) => Some(&mut item.position),
            Subject::Occurrence(occurrence) => item
                .recurrence
                .as_mut()
                .and_then(|recurrence| recurrence.occurrence_cache_mut().get_mut(&occurrence.key))
                .map(|cached| &mut cached.position),
        };
        match slot {
            Some(slot) => {
                *slot = pins;
                self.invalidate(Input::Pin(subject))
            }
            None => 0,
        }
    }

    /// Ensures the cache holds an occurrence for `key`.
    pub(crate) fn materialize(
        &mut self,
        master: ItemId,
        key: RecurrenceKey,
    ) -> Option<OccurrenceId> {
        let default_tz = self.config.default_timezone;
        let item = self.items.get_mut(&master)?;
        let recurrence_id = recurrence_id_in(item, item.recurrence.as_ref()?, key, default_tz);
        cached_occurrence(item, &recurrence_id).ok()
    }

    pub(crate) fn build_entry(&mut self, subject: Subject) -> DashboardEntry {
        let decorations = {
            let view = self.view(subject);
            self.decorators
                .iter()
                .filter(|decorator| decorator.attaches(&view))
                .map(|decorator| decorator.decorator_id().trim().to_string())
                .collect()
        };
        let id = EntryId(self.next_entry);
        self.next_entry += 1;
        DashboardEntry::new(id, subject, decorations)
    }
}

/// Read access to one subject for timeline providers and decorators.
///
/// Every accessor records its reads, so values computed from a view are
/// invalidated when the underlying inputs change.
#[derive(Clone, Copy)]
pub struct SubjectView<'a> {
    store: &'a Store,
    subject: Subject,
}

impl<'a> SubjectView<'a> {
    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn title(&self) -> String {
        self.store.title(self.subject)
    }

    pub fn resolve(&self, attr: Attr) -> Option<AttrValue> {
        self.store.resolve(self.subject, attr)
    }

    pub fn event(&self) -> Option<Event> {
        self.store.resolved_event(self.subject)
    }

    pub fn event_start(&self) -> Option<When> {
        self.event().and_then(|event| event.start())
    }

    pub fn reminders(&self) -> Vec<Reminder> {
        self.store.reminders(self.subject)
    }

    pub fn reminder_triggers(&self) -> Vec<When> {
        self.store.reminder_triggers(self.subject)
    }

    pub fn created(&self) -> Timestamp {
        self.store.created(self.subject)
    }

    pub fn timestamp(&self, when: &When) -> Timestamp {
        self.store.timestamp(when)
    }

    pub fn now_timestamp(&self) -> Timestamp {
        self.store.now_timestamp()
    }

    pub fn is_past(&self, when: &When) -> bool {
        self.store.is_past(when)
    }

    pub fn default_timezone(&self) -> Tz {
        self.store.default_timezone()
    }
}

/// Start of the series: the master's effective start attribute.
fn series_start(item: &Item, recurrence: &Recurrence) -> Option<When> {
    match recurrence.start_attr() {
        Attr::BaseStart => item.event?.start(),
        attr => master_value(item, attr).and_then(|value| value.as_when()),
    }
}

pub(crate) fn recurrence_id_in(
    item: &Item,
    recurrence: &Recurrence,
    key: RecurrenceKey,
    default_tz: Tz,
) -> When {
    if let Some(cached) = recurrence.occurrence_cache().get(&key) {
        return cached.recurrence_id;
    }
    let zone = item
        .event
        .and_then(|event| event.base_start)
        .and_then(|start| start.zone());
    When::from_key(key, zone, default_tz)
}

pub(crate) fn cached_occurrence(item: &mut Item, recurrence_id: &When) -> CoreResult<OccurrenceId> {
    let master = item.id;
    let recurrence = item
        .recurrence
        .as_mut()
        .ok_or(CoreError::ExtensionMissing {
            item: master,
            extension: ExtensionKind::Recurrence,
        })?;
    let (occurrence, created) = recurrence
        .occurrence_cache_mut()
        .get_or_create(master, *recurrence_id);
    if created {
        debug!(
            "event=occurrence_create module=recurrence status=ok item={} key={}",
            master, occurrence.key
        );
    }
    Ok(occurrence)
}

/// Master's own value of `attr`; `None` when its extension is absent.
pub(crate) fn master_value(item: &Item, attr: Attr) -> Option<AttrValue> {
    match attr {
        Attr::Title => Some(AttrValue::Text(item.title.clone())),
        Attr::TriageManual => Some(AttrValue::Status(item.triage.manual)),
        Attr::TriageManualTimestamp => Some(AttrValue::Timestamp(item.triage.manual_timestamp)),
        Attr::BaseStart => item.event.map(|event| AttrValue::When(event.base_start)),
        Attr::BaseDuration => item.event.map(|event| AttrValue::Duration(event.base_duration)),
        Attr::AllDay => item.event.map(|event| AttrValue::Flag(event.all_day)),
        Attr::AnyTime => item.event.map(|event| AttrValue::Flag(event.any_time)),
        Attr::Transparency => item
            .event
            .map(|event| AttrValue::Transparency(event.transparency)),
    }
}
