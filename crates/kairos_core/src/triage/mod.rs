//! Triage classification of items and occurrences.
//!
//! # Responsibility
//! - Merge timeline facts from registered providers into an automatic
//!   status, combine it with manual triage, and plan display positions.
//!
//! # Invariants
//! - Classification is a pure function of the store's inputs and the
//!   snapshotted "now".
//! - Manual status without a timestamp wins over every timeline fact.
//!
//! # See also
//! - `crate::dashboard` for how classified subjects become entries.

pub mod classifier;
pub mod position;
pub mod providers;

pub use classifier::{select_auto, TriageFact, TriageState, DEFAULT_WEIGHT, MANUAL_WEIGHT};
pub use position::{default_position, PositionState};
pub use providers::{EventStartedTimeline, ReminderTimeline, TimelineProvider, TimelineRegistry};
