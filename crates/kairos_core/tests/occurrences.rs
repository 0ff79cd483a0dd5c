use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Tz;
use kairos_core::{
    Attr, AttrValue, ConstraintError, CoreError, EngineConfig, Event, Frequency, ItemId,
    Recurrence, Store, Subject, VirtualClock, When,
};
use std::rc::Rc;

fn zoned(tz: Tz, year: i32, month: u32, day: u32, hour: u32) -> When {
    When::from(tz.with_ymd_and_hms(year, month, day, hour, 0, 0).single().unwrap())
}

fn pacific(year: i32, month: u32, day: u32, hour: u32) -> When {
    zoned(Tz::US__Pacific, year, month, day, hour)
}

fn weekly_store() -> (Store, ItemId) {
    let now = Utc.with_ymd_and_hms(2008, 12, 1, 8, 0, 0).single().unwrap();
    let clock = Rc::new(VirtualClock::at(now));
    let mut store = Store::new(
        EngineConfig::with_timezone(Tz::US__Pacific),
        Box::new(clock),
    )
    .unwrap();
    let id = store
        .transaction(|tx| {
            let id = tx.create_item("Standup");
            tx.add_event(id, Event::starting_at(pacific(2008, 11, 30, 9)))?;
            tx.add_recurrence(id, Recurrence::default())?;
            tx.set_frequency(id, Some(Frequency::Weekly))?;
            Ok(id)
        })
        .unwrap()
        .value;
    (store, id)
}

#[test]
fn equivalent_recurrence_ids_share_one_occurrence() {
    let (mut store, id) = weekly_store();
    let eastern = zoned(Tz::US__Eastern, 2008, 12, 14, 12);
    let pacific_value = pacific(2008, 12, 14, 9);

    let first = store.get_occurrence(id, &eastern).unwrap();
    let second = store.get_occurrence(id, &pacific_value).unwrap();
    assert_eq!(first, second);

    // The first-seen encoding is kept.
    let cached = store.occurrence(first).unwrap();
    assert_eq!(cached.recurrence_id.tz_name(), Some("US/Eastern"));
    assert_eq!(store.recurrence_id(first), Some(eastern));
}

#[test]
fn aborted_batch_leaves_no_occurrence_behind() {
    let (mut store, id) = weekly_store();
    let recurrence_id = pacific(2008, 12, 21, 9);
    let err = store
        .transaction(|tx| {
            let occurrence = tx.get_occurrence(id, &recurrence_id)?;
            tx.modify(occurrence, Attr::AllDay, AttrValue::Text("no".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::Constraint(_)));
    let key = recurrence_id.key();
    assert!(store
        .occurrence(kairos_core::OccurrenceId { master: id, key })
        .is_none());

    let occurrence = store
        .transaction(|tx| tx.get_occurrence(id, &recurrence_id))
        .unwrap()
        .value;
    assert_eq!(
        store.occurrence(occurrence).map(|cached| cached.recurrence_id),
        Some(recurrence_id)
    );
}

#[test]
fn occurrences_inherit_and_take_their_own_start() {
    let (store, id) = weekly_store();
    let key = pacific(2008, 12, 7, 9).key();
    let occurrence = Subject::Occurrence(kairos_core::OccurrenceId { master: id, key });

    assert_eq!(store.title(occurrence), "Standup");
    let event = store.resolved_event(occurrence).unwrap();
    assert_eq!(event.start(), Some(pacific(2008, 12, 7, 9)));
    assert_eq!(event.duration(), Duration::hours(1));
}

#[test]
fn unmodify_restores_inherited_values() {
    let (mut store, id) = weekly_store();
    let occurrence = store
        .get_occurrence(id, &pacific(2008, 12, 7, 9))
        .unwrap();
    let subject = Subject::Occurrence(occurrence);
    let attrs = [Attr::Title, Attr::BaseStart, Attr::BaseDuration];
    let before: Vec<_> = attrs
        .iter()
        .map(|attr| store.resolve(subject, *attr))
        .collect();

    store
        .transaction(|tx| {
            tx.modify(occurrence, Attr::Title, AttrValue::Text("Moved".to_string()))?;
            tx.modify(
                occurrence,
                Attr::BaseStart,
                AttrValue::When(Some(pacific(2008, 12, 8, 9))),
            )?;
            tx.modify(
                occurrence,
                Attr::BaseDuration,
                AttrValue::Duration(Duration::hours(2)),
            )
        })
        .unwrap();
    assert_eq!(store.title(subject), "Moved");
    assert_eq!(store.title(Subject::Item(id)), "Standup");
    assert_eq!(
        store.resolved_event(subject).unwrap().start(),
        Some(pacific(2008, 12, 8, 9))
    );

    store.transaction(|tx| tx.unmodify(occurrence)).unwrap();
    let after: Vec<_> = attrs
        .iter()
        .map(|attr| store.resolve(subject, *attr))
        .collect();
    assert_eq!(after, before);
    let recurrence = store.item(id).unwrap().recurrence.as_ref().unwrap();
    assert!(recurrence.recipe(&occurrence.key).is_none());
}

#[test]
fn clearing_the_last_override_deletes_the_recipe() {
    let (mut store, id) = weekly_store();
    let occurrence = store
        .get_occurrence(id, &pacific(2008, 12, 7, 9))
        .unwrap();
    store
        .transaction(|tx| tx.modify(occurrence, Attr::AllDay, AttrValue::Flag(true)))
        .unwrap();
    let event = store
        .resolved_event(Subject::Occurrence(occurrence))
        .unwrap();
    assert_eq!(
        event.start(),
        Some(When::floating(
            chrono::NaiveDate::from_ymd_opt(2008, 12, 7)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        ))
    );
    assert_eq!(event.duration(), Duration::days(1));

    let committed = store
        .transaction(|tx| tx.unmodify_attr(occurrence, Attr::AllDay))
        .unwrap();
    assert!(committed.value);
    let recurrence = store.item(id).unwrap().recurrence.as_ref().unwrap();
    assert!(recurrence.recipe(&occurrence.key).is_none());
}

#[test]
fn unmodify_without_recipe_is_a_no_op() {
    let (mut store, id) = weekly_store();
    let occurrence = store
        .get_occurrence(id, &pacific(2008, 12, 7, 9))
        .unwrap();
    let committed = store.transaction(|tx| tx.unmodify(occurrence)).unwrap();
    assert!(!committed.value);
    assert!(committed.changes.is_empty());
}

#[test]
fn conflicting_change_aborts_the_whole_batch() {
    let (mut store, id) = weekly_store();
    let occurrence = store
        .get_occurrence(id, &pacific(2008, 12, 7, 9))
        .unwrap();
    let entries_before = store.entry_count();

    let err = store
        .transaction(|tx| {
            tx.set_title(id, "Renamed")?;
            tx.modify(occurrence, Attr::Title, AttrValue::Text("A".to_string()))?;
            tx.modify(occurrence, Attr::Title, AttrValue::Text("B".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(ref conflict) if conflict.attr == Attr::Title));
    assert!(err.to_string().contains("can't change the same attribute twice"));

    assert_eq!(store.title(Subject::Item(id)), "Standup");
    let recurrence = store.item(id).unwrap().recurrence.as_ref().unwrap();
    assert!(recurrence.recipe(&occurrence.key).is_none());
    assert_eq!(store.entry_count(), entries_before);
}

#[test]
fn repeating_the_same_value_is_not_a_conflict() {
    let (mut store, id) = weekly_store();
    let occurrence = store
        .get_occurrence(id, &pacific(2008, 12, 7, 9))
        .unwrap();
    store
        .transaction(|tx| {
            tx.modify(occurrence, Attr::Title, AttrValue::Text("A".to_string()))?;
            tx.modify(occurrence, Attr::Title, AttrValue::Text("A".to_string()))
        })
        .unwrap();
    assert_eq!(store.title(Subject::Occurrence(occurrence)), "A");
}

#[test]
fn invalid_override_values_are_rejected() {
    let (mut store, id) = weekly_store();
    let occurrence = store
        .get_occurrence(id, &pacific(2008, 12, 7, 9))
        .unwrap();

    let err = store
        .transaction(|tx| tx.modify(occurrence, Attr::AllDay, AttrValue::Text("yes".to_string())))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Constraint(ConstraintError::AttributeType { attr: Attr::AllDay, .. })
    ));

    let err = store
        .transaction(|tx| {
            tx.modify(
                occurrence,
                Attr::BaseDuration,
                AttrValue::Duration(Duration::minutes(-30)),
            )
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::Constraint(ConstraintError::BadDuration(_))));
    let recurrence = store.item(id).unwrap().recurrence.as_ref().unwrap();
    assert!(recurrence.recipe(&occurrence.key).is_none());
}

#[test]
fn occurrences_between_is_empty_without_a_series() {
    let (mut store, id) = weekly_store();
    let plain = store
        .transaction(|tx| Ok(tx.create_item("No rule")))
        .unwrap()
        .value;
    let low = pacific(2008, 11, 1, 0);
    let high = pacific(2009, 1, 1, 0);

    assert!(store.occurrences_between(plain, &low, &high).is_empty());
    assert_eq!(store.occurrences_between(id, &low, &high).len(), 5);
}

#[test]
fn rdates_and_exdates_adjust_the_series() {
    let (mut store, id) = weekly_store();
    store
        .transaction(|tx| {
            tx.set_count(id, Some(3))?;
            tx.add_exdate(id, pacific(2008, 12, 7, 9))?;
            tx.add_rdate(id, pacific(2008, 12, 10, 15))?;
            Ok(())
        })
        .unwrap();

    let all = store.occurrences_between(id, &pacific(2008, 11, 1, 0), &pacific(2009, 6, 1, 0));
    assert_eq!(
        all,
        vec![
            pacific(2008, 11, 30, 9),
            pacific(2008, 12, 10, 15),
            pacific(2008, 12, 14, 9),
        ]
    );
}

#[test]
fn extension_lifecycle_errors() {
    let (mut store, id) = weekly_store();
    let err = store
        .transaction(|tx| tx.add_recurrence(id, Recurrence::default()))
        .unwrap_err();
    assert!(matches!(err, CoreError::ExtensionPresent { .. }));

    let plain = store
        .transaction(|tx| Ok(tx.create_item("Loose")))
        .unwrap()
        .value;
    let err = store
        .transaction(|tx| tx.set_frequency(plain, Some(Frequency::Daily)))
        .unwrap_err();
    assert!(matches!(err, CoreError::ExtensionMissing { .. }));

    let err = store
        .get_occurrence(plain, &pacific(2008, 12, 7, 9))
        .unwrap_err();
    assert!(matches!(err, CoreError::ExtensionMissing { .. }));

    let missing = uuid::Uuid::new_v4();
    let err = store
        .transaction(|tx| tx.set_title(missing, "ghost"))
        .unwrap_err();
    assert_eq!(err, CoreError::ItemNotFound(missing));
}
