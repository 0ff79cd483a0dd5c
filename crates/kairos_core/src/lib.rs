//! Recurrence expansion and triage classification engine.
//! This crate is the single source of truth for series, occurrence and
//! dashboard invariants.

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod memo;
pub mod model;
pub mod recurrence;
pub mod store;
pub mod transaction;
pub mod triage;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{ConfigError, EngineConfig};
pub use dashboard::{
    DashboardChanges, DashboardEntry, DecoratorRegistry, EntryDecorator, EntryId, EntrySnapshot,
    EntryValue, EventReminderDecorator,
};
pub use error::{ConflictingChangeError, ConstraintError, CoreError, CoreResult, RegistryError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use memo::GraphStats;
pub use model::attr::{Attr, AttrValue, ExtensionKind};
pub use model::item::{Event, Item, ItemId, Reminder, Transparency};
pub use model::triage::{ManualTriage, TriagePosition, TriageStatus};
pub use model::when::{RecurrenceKey, Timestamp, When};
pub use model::Subject;
pub use recurrence::occurrence::{Occurrence, OccurrenceId};
pub use recurrence::rule::{Frequency, RecurrenceRules, SeriesLimit};
pub use recurrence::Recurrence;
pub use store::{Store, SubjectView};
pub use transaction::{Committed, Transaction};
pub use triage::{
    EventStartedTimeline, PositionState, ReminderTimeline, TimelineProvider, TimelineRegistry,
    TriageFact, TriageState,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
