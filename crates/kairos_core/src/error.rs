//! Core error taxonomy.
//!
//! # Responsibility
//! - Define the errors every mutating core operation can surface.
//! - Keep domain-rule violations separate from structural failures.
//!
//! # Invariants
//! - Any error returned inside a transaction aborts the whole batch.
//! - Constraint errors always carry the rejected value in their message.

use crate::model::attr::{Attr, ExtensionKind};
use crate::model::item::ItemId;
use crate::recurrence::occurrence::OccurrenceId;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// A stored or derived value violates a domain rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("can't set triage status to: {0}")]
    TriageRange(i64),
    #[error("can't set base_duration to: {0}")]
    BadDuration(String),
    #[error("can't set reminder delta to: {0}")]
    BadReminder(String),
    #[error("can't set base_start to: {0}")]
    MissingTimezone(String),
    #[error("can't set count to: 0")]
    ZeroCount,
    #[error("can't set {attr} to: {value}")]
    AttributeType { attr: Attr, value: String },
}

impl ConstraintError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::TriageRange(_) => "triage status",
            Self::BadDuration(_) => "base_duration",
            Self::BadReminder(_) => "reminder delta",
            Self::MissingTimezone(_) => "base_start",
            Self::ZeroCount => "count",
            Self::AttributeType { attr, .. } => attr.name(),
        }
    }
}

/// Two different values were assigned to one occurrence attribute within a
/// single change batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("can't change the same attribute twice: {attr} on {occurrence}")]
pub struct ConflictingChangeError {
    pub occurrence: OccurrenceId,
    pub attr: Attr,
}

/// Errors from core mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    Conflict(#[from] ConflictingChangeError),
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("extension {extension} has already been added to item {item}")]
    ExtensionPresent { item: ItemId, extension: ExtensionKind },
    #[error("extension {extension} is not present on item {item}")]
    ExtensionMissing { item: ItemId, extension: ExtensionKind },
    #[error("reminder {index} not found on item {item}")]
    ReminderNotFound { item: ItemId, index: usize },
}

impl CoreError {
    /// Stable short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Constraint(_) => "constraint",
            Self::Conflict(_) => "conflicting_change",
            Self::ItemNotFound(_) => "item_not_found",
            Self::ExtensionPresent { .. } => "extension_present",
            Self::ExtensionMissing { .. } => "extension_missing",
            Self::ReminderNotFound { .. } => "reminder_not_found",
        }
    }
}

/// Timeline provider or entry decorator registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry id is invalid: {0}")]
    InvalidId(String),
    #[error("registry id already registered: {0}")]
    DuplicateId(String),
}

/// Registry ids are lowercase ascii with digits, `_` or `-`.
pub(crate) fn validate_registry_id(id: &str) -> Result<String, RegistryError> {
    let id = id.trim();
    let valid = !id.is_empty()
        && id.chars().all(|ch| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-'
        });
    if !valid {
        return Err(RegistryError::InvalidId(id.to_string()));
    }
    Ok(id.to_string())
}
