//! Dashboard aggregation of masters and occurrences.
//!
//! # Responsibility
//! - Decide which occurrences of each series deserve their own entry.
//! - Maintain one entry per visible subject and report adds and removes.
//!
//! # Invariants
//! - A master with a non-empty visible set contributes no master entry; a
//!   master without one contributes exactly one.
//! - Refreshing twice without input changes reports no changes.
//!
//! # See also
//! - `crate::triage` for classification of each subject.

pub mod aggregator;
pub mod entry;

pub use aggregator::DashboardChanges;
pub use entry::{
    DashboardEntry, DecoratorRegistry, EntryDecorator, EntryId, EntrySnapshot, EntryValue,
    EventReminderDecorator,
};
