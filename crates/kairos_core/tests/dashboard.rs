use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Tz;
use kairos_core::{
    EngineConfig, EntryValue, Event, Frequency, ItemId, Recurrence, Store, TriageStatus,
    VirtualClock, When,
};
use std::rc::Rc;

fn pacific(year: i32, month: u32, day: u32, hour: u32) -> When {
    When::from(
        Tz::US__Pacific
            .with_ymd_and_hms(year, month, day, hour, 0, 0)
            .single()
            .unwrap(),
    )
}

fn store_at(now: When) -> (Rc<VirtualClock>, Store) {
    let instant = Utc.timestamp_opt(now.timestamp(Tz::UTC), 0).single().unwrap();
    let clock = Rc::new(VirtualClock::at(instant));
    let store = Store::new(
        EngineConfig::with_timezone(Tz::US__Pacific),
        Box::new(clock.clone()),
    )
    .unwrap();
    (clock, store)
}

fn recurring_master(store: &mut Store) -> ItemId {
    store
        .transaction(|tx| {
            let id = tx.create_item("Weekly review");
            tx.add_event(id, Event::starting_at(pacific(2008, 11, 30, 9)))?;
            tx.add_recurrence(id, Recurrence::default())?;
            Ok(id)
        })
        .unwrap()
        .value
}

fn assert_exclusive(store: &Store, id: ItemId) {
    let entries = store.dashboard_entries(id);
    assert!(!entries.is_empty());
    let occurrences = entries.iter().filter(|entry| entry.is_occurrence()).count();
    assert!(
        (occurrences == 0 && entries.len() == 1) || occurrences == entries.len(),
        "mixed master and occurrence entries: {entries:?}"
    );
}

#[test]
fn weekly_frequency_splits_master_into_boundary_occurrences() {
    let (_clock, mut store) = store_at(pacific(2008, 12, 1, 0));
    let id = recurring_master(&mut store);

    assert_eq!(store.dashboard_entries(id).len(), 1);
    assert!(!store.dashboard_entries(id)[0].is_occurrence());
    assert_exclusive(&store, id);

    let committed = store
        .transaction(|tx| tx.set_frequency(id, Some(Frequency::Weekly)))
        .unwrap();
    assert_eq!(committed.changes.added.len(), 2);
    assert_eq!(committed.changes.removed.len(), 1);
    assert_eq!(store.dashboard_entries(id).len(), 2);
    assert_exclusive(&store, id);

    let visible = store.visible_recurrence_ids(id);
    assert!(visible.contains(&pacific(2008, 11, 30, 9).key()));
    assert!(visible.contains(&pacific(2008, 12, 7, 9).key()));

    store.transaction(|tx| tx.remove_recurrence(id)).unwrap();
    assert_eq!(store.dashboard_entries(id).len(), 1);
    assert!(!store.dashboard_entries(id)[0].is_occurrence());
}

#[test]
fn refresh_without_changes_reports_no_deltas() {
    let (_clock, mut store) = store_at(pacific(2008, 12, 1, 0));
    let id = recurring_master(&mut store);
    store
        .transaction(|tx| tx.set_frequency(id, Some(Frequency::Weekly)))
        .unwrap();

    let computed = store.graph_stats().computations;
    assert!(store.refresh().is_empty());
    assert!(store.refresh().is_empty());
    assert!(store.tick().is_empty());
    assert_eq!(store.graph_stats().computations, computed);
}

#[test]
fn clock_crossing_a_start_adds_the_next_boundary() {
    let (clock, mut store) = store_at(pacific(2008, 12, 1, 0));
    let id = recurring_master(&mut store);
    store
        .transaction(|tx| tx.set_frequency(id, Some(Frequency::Weekly)))
        .unwrap();
    let before: Vec<_> = store
        .dashboard_entries(id)
        .iter()
        .map(|entry| entry.id())
        .collect();

    clock.advance(Duration::days(6) + Duration::hours(10));
    let changes = store.tick();
    assert_eq!(changes.added.len(), 1);
    assert!(changes.removed.is_empty());
    assert_eq!(store.dashboard_entries(id).len(), 3);
    assert!(store
        .visible_recurrence_ids(id)
        .contains(&pacific(2008, 12, 14, 9).key()));

    // Entries that stayed visible keep their identity.
    let after: Vec<_> = store
        .dashboard_entries(id)
        .iter()
        .map(|entry| entry.id())
        .collect();
    assert!(before.iter().all(|entry| after.contains(entry)));
}

#[test]
fn edited_occurrences_stay_visible_until_unmodified() {
    let (_clock, mut store) = store_at(pacific(2008, 12, 1, 0));
    let id = recurring_master(&mut store);
    store
        .transaction(|tx| tx.set_frequency(id, Some(Frequency::Weekly)))
        .unwrap();

    let far = pacific(2008, 12, 21, 9);
    let committed = store
        .transaction(|tx| {
            let occurrence = tx.get_occurrence(id, &far)?;
            tx.modify(
                occurrence,
                kairos_core::Attr::Title,
                kairos_core::AttrValue::Text("Quarterly review".to_string()),
            )?;
            Ok(occurrence)
        })
        .unwrap();
    let occurrence = committed.value;
    assert_eq!(committed.changes.added.len(), 1);
    assert_eq!(store.dashboard_entries(id).len(), 3);
    assert_exclusive(&store, id);

    let committed = store.transaction(|tx| tx.unmodify(occurrence)).unwrap();
    assert!(committed.value);
    assert_eq!(committed.changes.removed.len(), 1);
    assert_eq!(store.dashboard_entries(id).len(), 2);
}

#[test]
fn removing_an_item_drops_all_of_its_entries() {
    let (_clock, mut store) = store_at(pacific(2008, 12, 1, 0));
    let id = recurring_master(&mut store);
    let plain = store
        .transaction(|tx| Ok(tx.create_item("Call back")))
        .unwrap()
        .value;
    store
        .transaction(|tx| tx.set_frequency(id, Some(Frequency::Weekly)))
        .unwrap();
    assert_eq!(store.entry_count(), 3);

    let committed = store.transaction(|tx| tx.remove_item(id)).unwrap();
    assert_eq!(committed.changes.removed.len(), 2);
    assert!(store.dashboard_entries(id).is_empty());
    assert!(store.item(id).is_none());
    assert_eq!(store.entry_count(), 1);
    assert_exclusive(&store, plain);
}

#[test]
fn snapshot_exposes_when_what_and_triage() {
    let (_clock, mut store) = store_at(pacific(2008, 12, 1, 0));
    let id = recurring_master(&mut store);
    store
        .transaction(|tx| tx.set_frequency(id, Some(Frequency::Weekly)))
        .unwrap();

    let upcoming = pacific(2008, 12, 7, 9);
    let entry = store
        .dashboard_entries(id)
        .into_iter()
        .find(|entry| {
            matches!(entry.subject(), kairos_core::Subject::Occurrence(occurrence)
                if occurrence.key == upcoming.key())
        })
        .unwrap()
        .clone();
    let snapshot = store.entry_snapshot(&entry);

    assert_eq!(snapshot.when, upcoming);
    assert_eq!(snapshot.what, "Weekly review");
    assert_eq!(snapshot.triage_status, TriageStatus::Later);
    assert_eq!(snapshot.triage_section, TriageStatus::Later);
    assert_eq!(snapshot.triage_position, upcoming.timestamp(Tz::UTC));
    assert_eq!(
        snapshot.fields.get("event_reminder"),
        Some(&EntryValue::Text("event".to_string()))
    );
}

#[test]
fn plain_items_get_exactly_one_entry() {
    let (_clock, mut store) = store_at(pacific(2008, 12, 1, 0));
    let id = store
        .transaction(|tx| Ok(tx.create_item("Inbox zero")))
        .unwrap()
        .value;
    assert_eq!(store.dashboard_entries(id).len(), 1);

    let snapshot = store.entry_snapshot(store.dashboard_entries(id)[0]);
    assert_eq!(snapshot.when, pacific(2008, 12, 1, 0));
    assert_eq!(snapshot.triage_status, TriageStatus::Now);
    assert_eq!(
        snapshot.fields.get("event_reminder"),
        Some(&EntryValue::Text(String::new()))
    );
}

#[test]
fn count_limited_past_series_shows_every_instance() {
    let (_clock, mut store) = store_at(pacific(2009, 1, 1, 0));
    let id = recurring_master(&mut store);
    store
        .transaction(|tx| {
            tx.set_frequency(id, Some(Frequency::Daily))?;
            tx.set_count(id, Some(3))
        })
        .unwrap();

    assert_eq!(store.dashboard_entries(id).len(), 3);
    assert_exclusive(&store, id);
}
