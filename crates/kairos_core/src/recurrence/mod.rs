//! Recurrence extension: rule inputs, modification ledger and occurrence
//! cache of one master item.
//!
//! # Responsibility
//! - Hold the rule inputs (frequency, count xor until, rdates, exdates).
//! - Keep per-occurrence overrides and manual triage records.
//! - Own the identity-stable occurrence cache.
//!
//! # Invariants
//! - `count` and `until` are never both user-set; the other is derived.
//! - Ledger maps are keyed by normalized recurrence-id.
//! - A recipe is deleted as soon as its last override is cleared.
//! - The cache has no eviction; it is dropped with the extension.

pub mod occurrence;
pub mod rule;

use crate::error::ConstraintError;
use crate::model::attr::{Attr, AttrValue};
use crate::model::item::validate_duration;
use crate::model::triage::ManualTriage;
use crate::model::when::{RecurrenceKey, When};
use occurrence::{ModificationRecipe, OccurrenceCache};
use rule::{Frequency, SeriesLimit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recurrence extension of a master item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    frequency: Option<Frequency>,
    limit: Option<SeriesLimit>,
    #[serde(default)]
    rdates: BTreeMap<RecurrenceKey, When>,
    #[serde(default)]
    exdates: BTreeMap<RecurrenceKey, When>,
    start_attr: Attr,
    #[serde(default)]
    recipes: BTreeMap<RecurrenceKey, ModificationRecipe>,
    #[serde(default)]
    manual_triage: BTreeMap<RecurrenceKey, ManualTriage>,
    done_before: Option<When>,
    #[serde(skip)]
    occurrences: OccurrenceCache,
}

impl Default for Recurrence {
    fn default() -> Self {
        Self {
            frequency: None,
            limit: None,
            rdates: BTreeMap::new(),
            exdates: BTreeMap::new(),
            start_attr: Attr::BaseStart,
            recipes: BTreeMap::new(),
            manual_triage: BTreeMap::new(),
            done_before: None,
            occurrences: OccurrenceCache::default(),
        }
    }
}

impl Recurrence {
    pub fn frequency(&self) -> Option<Frequency> {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: Option<Frequency>) {
        self.frequency = frequency;
    }

    pub fn limit(&self) -> Option<SeriesLimit> {
        self.limit
    }

    /// Limits the series by instant count, replacing any `until`.
    ///
    /// # Errors
    /// - `ZeroCount` for `Some(0)`.
    pub fn set_count(&mut self, count: Option<u32>) -> Result<(), ConstraintError> {
        match count {
            Some(0) => Err(ConstraintError::ZeroCount),
            Some(count) => {
                self.limit = Some(SeriesLimit::Count(count));
                Ok(())
            }
            None => {
                if matches!(self.limit, Some(SeriesLimit::Count(_))) {
                    self.limit = None;
                }
                Ok(())
            }
        }
    }

    /// Limits the series by last instant, replacing any `count`.
    pub fn set_until(&mut self, until: Option<When>) {
        match until {
            Some(until) => self.limit = Some(SeriesLimit::Until(until)),
            None => {
                if matches!(self.limit, Some(SeriesLimit::Until(_))) {
                    self.limit = None;
                }
            }
        }
    }

    pub fn rdates(&self) -> impl Iterator<Item = &When> {
        self.rdates.values()
    }

    pub fn exdates(&self) -> impl Iterator<Item = &When> {
        self.exdates.values()
    }

    pub(crate) fn exdate_map(&self) -> &BTreeMap<RecurrenceKey, When> {
        &self.exdates
    }

    pub fn add_rdate(&mut self, when: When) -> bool {
        self.rdates.insert(when.key(), when).is_none()
    }

    pub fn remove_rdate(&mut self, when: &When) -> bool {
        self.rdates.remove(&when.key()).is_some()
    }

    pub fn add_exdate(&mut self, when: When) -> bool {
        self.exdates.insert(when.key(), when).is_none()
    }

    pub fn remove_exdate(&mut self, when: &When) -> bool {
        self.exdates.remove(&when.key()).is_some()
    }

    /// Attribute whose per-occurrence value is the recurrence-id.
    pub fn start_attr(&self) -> Attr {
        self.start_attr
    }

    pub fn set_start_attr(&mut self, attr: Attr) {
        self.start_attr = attr;
    }

    pub fn recipe(&self, key: &RecurrenceKey) -> Option<&ModificationRecipe> {
        self.recipes.get(key)
    }

    pub fn recipe_keys(&self) -> impl Iterator<Item = &RecurrenceKey> {
        self.recipes.keys()
    }

    /// Sets one override, creating the recipe on first use.
    pub fn set_override(
        &mut self,
        key: RecurrenceKey,
        attr: Attr,
        value: AttrValue,
    ) -> Option<AttrValue> {
        self.recipes.entry(key).or_default().set(attr, value)
    }

    /// Clears one override; the recipe goes away with its last entry.
    pub fn clear_override(&mut self, key: &RecurrenceKey, attr: Attr) -> Option<AttrValue> {
        let recipe = self.recipes.get_mut(key)?;
        let removed = recipe.remove(attr);
        if recipe.is_empty() {
            self.recipes.remove(key);
        }
        removed
    }

    pub fn remove_recipe(&mut self, key: &RecurrenceKey) -> Option<ModificationRecipe> {
        self.recipes.remove(key)
    }

    pub fn manual_record(&self, key: &RecurrenceKey) -> Option<ManualTriage> {
        self.manual_triage.get(key).copied()
    }

    pub fn manual_keys(&self) -> impl Iterator<Item = &RecurrenceKey> {
        self.manual_triage.keys()
    }

    pub fn record_manual(&mut self, key: RecurrenceKey, record: ManualTriage) {
        self.manual_triage.insert(key, record);
    }

    pub fn clear_manual(&mut self, key: &RecurrenceKey) -> Option<ManualTriage> {
        self.manual_triage.remove(key)
    }

    /// Watermark before which unmodified occurrences are DONE.
    pub fn done_before(&self) -> Option<When> {
        self.done_before
    }

    pub fn set_done_before(&mut self, watermark: Option<When>) {
        self.done_before = watermark;
    }

    pub fn occurrence_cache(&self) -> &OccurrenceCache {
        &self.occurrences
    }

    pub fn occurrence_cache_mut(&mut self) -> &mut OccurrenceCache {
        &mut self.occurrences
    }

    /// Checks limit and override values.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        if matches!(self.limit, Some(SeriesLimit::Count(0))) {
            return Err(ConstraintError::ZeroCount);
        }
        for recipe in self.recipes.values() {
            for (attr, value) in recipe.iter() {
                if !attr.accepts(value) {
                    return Err(ConstraintError::AttributeType {
                        attr: *attr,
                        value: format!("{value:?}"),
                    });
                }
                if let Some(duration) = value.as_duration() {
                    validate_duration(duration)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::rule::SeriesLimit;
    use super::Recurrence;
    use crate::model::attr::{Attr, AttrValue};
    use crate::model::when::RecurrenceKey;
    use chrono::Duration;

    #[test]
    fn count_and_until_replace_each_other() {
        let mut recurrence = Recurrence::default();
        recurrence.set_count(Some(4)).expect("count accepted");
        assert_eq!(recurrence.limit(), Some(SeriesLimit::Count(4)));

        recurrence.set_until(None);
        assert_eq!(recurrence.limit(), Some(SeriesLimit::Count(4)));

        assert!(recurrence.set_count(Some(0)).is_err());
        recurrence.set_count(None).expect("clearing count");
        assert_eq!(recurrence.limit(), None);
    }

    #[test]
    fn clearing_last_override_deletes_recipe() {
        let key = RecurrenceKey::Epoch(1_228_064_400);
        let mut recurrence = Recurrence::default();
        recurrence.set_override(key, Attr::Title, AttrValue::Text("moved".to_string()));
        recurrence.set_override(key, Attr::AllDay, AttrValue::Flag(true));

        recurrence.clear_override(&key, Attr::Title);
        assert!(recurrence.recipe(&key).is_some());
        recurrence.clear_override(&key, Attr::AllDay);
        assert!(recurrence.recipe(&key).is_none());
    }

    #[test]
    fn validate_rejects_negative_duration_override() {
        let key = RecurrenceKey::Epoch(0);
        let mut recurrence = Recurrence::default();
        recurrence.set_override(
            key,
            Attr::BaseDuration,
            AttrValue::Duration(Duration::minutes(-1)),
        );
        let err = recurrence.validate().expect_err("negative override must fail");
        assert_eq!(err.field(), "base_duration");
    }
}
