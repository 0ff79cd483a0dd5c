//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `kairos_core` linkage with a small deterministic dashboard run.
//! - Print one weekly series before and after the virtual clock moves.

use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Tz;
use kairos_core::{
    core_version, default_log_level, init_logging, EngineConfig, Event, Frequency, Recurrence,
    Store, VirtualClock, When,
};
use std::error::Error;
use std::rc::Rc;

fn main() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("KAIROS_LOG_DIR") {
        init_logging(default_log_level(), &log_dir)?;
    }
    println!("kairos_core version={}", core_version());

    let now = Utc
        .with_ymd_and_hms(2008, 12, 1, 8, 0, 0)
        .single()
        .ok_or("invalid demo clock")?;
    let clock = Rc::new(VirtualClock::at(now));
    let mut store = Store::new(
        EngineConfig::with_timezone(Tz::US__Pacific),
        Box::new(clock.clone()),
    )?;

    let start = Tz::US__Pacific
        .with_ymd_and_hms(2008, 11, 30, 9, 0, 0)
        .single()
        .ok_or("invalid demo start")?;
    let committed = store.transaction(|tx| {
        let id = tx.create_item("Weekly review");
        tx.add_event(id, Event::starting_at(When::from(start)))?;
        tx.add_recurrence(id, Recurrence::default())?;
        tx.set_frequency(id, Some(Frequency::Weekly))?;
        Ok(id)
    })?;
    println!("added={}", committed.changes.added.len());
    print_dashboard(&store, committed.value);

    clock.advance(Duration::days(7));
    let changes = store.tick();
    println!(
        "tick added={} removed={}",
        changes.added.len(),
        changes.removed.len()
    );
    print_dashboard(&store, committed.value);
    Ok(())
}

fn print_dashboard(store: &Store, item: kairos_core::ItemId) {
    for entry in store.dashboard_entries(item) {
        let snapshot = store.entry_snapshot(entry);
        println!(
            "{} when={} status={} position={}",
            snapshot.id, snapshot.when, snapshot.triage_status, snapshot.triage_position
        );
    }
}
