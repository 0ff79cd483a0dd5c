//! Recurrence rule expansion.
//!
//! # Responsibility
//! - Expand frequency/count/until into an ordered instant sequence.
//! - Merge inclusion dates and drop exclusion dates lazily.
//!
//! # Invariants
//! - Instants are generated from the series start by wall-clock
//!   arithmetic in the start's own zone, so DST shifts keep local times.
//! - Monthly/yearly steps landing on a nonexistent date are skipped, never
//!   clamped.
//! - A rule limited by `count` yields exactly `count` instants.

use crate::model::when::{RecurrenceKey, Timestamp, When};
use crate::recurrence::Recurrence;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::iter::Peekable;
use std::str::FromStr;
use thiserror::Error;

/// Rule frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    pub fn name(self) -> &'static str {
        match self {
            Self::Yearly => "yearly",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
            Self::Hourly => "hourly",
            Self::Minutely => "minutely",
            Self::Secondly => "secondly",
        }
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown frequency: {0}")]
pub struct UnknownFrequency(pub String);

impl FromStr for Frequency {
    type Err = UnknownFrequency;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yearly" => Ok(Self::Yearly),
            "monthly" => Ok(Self::Monthly),
            "weekly" => Ok(Self::Weekly),
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "minutely" => Ok(Self::Minutely),
            "secondly" => Ok(Self::Secondly),
            other => Err(UnknownFrequency(other.to_string())),
        }
    }
}

/// User-chosen end of a series; the other bound is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesLimit {
    Count(u32),
    Until(When),
}

enum Step {
    Instant(NaiveDateTime),
    Skip,
    End,
}

fn step(base: NaiveDateTime, frequency: Frequency, n: u32) -> Step {
    let n = i64::from(n);
    let delta = match frequency {
        Frequency::Yearly => return add_months(base, n * 12),
        Frequency::Monthly => return add_months(base, n),
        Frequency::Weekly => Duration::try_weeks(n),
        Frequency::Daily => Duration::try_days(n),
        Frequency::Hourly => Duration::try_hours(n),
        Frequency::Minutely => Duration::try_minutes(n),
        Frequency::Secondly => Duration::try_seconds(n),
    };
    match delta.and_then(|delta| base.checked_add_signed(delta)) {
        Some(value) => Step::Instant(value),
        None => Step::End,
    }
}

fn add_months(base: NaiveDateTime, months: i64) -> Step {
    let total = i64::from(base.year()) * 12 + i64::from(base.month0()) + months;
    let Ok(year) = i32::try_from(total.div_euclid(12)) else {
        return Step::End;
    };
    // rem_euclid(12) is in 0..12
    let month = (total.rem_euclid(12) + 1) as u32;
    if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
        return Step::End;
    }
    match NaiveDate::from_ymd_opt(year, month, base.day()) {
        Some(date) => Step::Instant(date.and_time(base.time())),
        None => Step::Skip,
    }
}

/// Lazy instant generator for one rule.
#[derive(Debug, Clone)]
pub struct RuleIter {
    start: When,
    base: NaiveDateTime,
    frequency: Frequency,
    index: u32,
    emitted: u32,
    count: Option<u32>,
    until: Option<Timestamp>,
    default_tz: Tz,
    finished: bool,
}

impl RuleIter {
    pub fn new(
        start: When,
        frequency: Frequency,
        count: Option<u32>,
        until: Option<Timestamp>,
        default_tz: Tz,
    ) -> Self {
        Self {
            start,
            base: start.naive_local(),
            frequency,
            index: 0,
            emitted: 0,
            count,
            until,
            default_tz,
            finished: false,
        }
    }
}

impl Iterator for RuleIter {
    type Item = When;

    fn next(&mut self) -> Option<When> {
        while !self.finished {
            if self.count.is_some_and(|count| self.emitted >= count) {
                self.finished = true;
                break;
            }
            let n = self.index;
            match self.index.checked_add(1) {
                Some(next) => self.index = next,
                None => self.finished = true,
            }
            let naive = match step(self.base, self.frequency, n) {
                Step::Instant(naive) => naive,
                Step::Skip => continue,
                Step::End => {
                    self.finished = true;
                    break;
                }
            };
            // DST gap: this wall-clock value does not exist
            let Some(when) = self.start.with_naive_local(naive) else {
                continue;
            };
            if self
                .until
                .is_some_and(|until| when.timestamp(self.default_tz) > until)
            {
                self.finished = true;
                break;
            }
            self.emitted += 1;
            return Some(when);
        }
        None
    }
}

/// Rule view over one recurrence extension and its series start.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceRules<'a> {
    recurrence: &'a Recurrence,
    start: When,
    default_tz: Tz,
}

impl<'a> RecurrenceRules<'a> {
    pub fn new(recurrence: &'a Recurrence, start: When, default_tz: Tz) -> Self {
        Self {
            recurrence,
            start,
            default_tz,
        }
    }

    pub fn start(&self) -> When {
        self.start
    }

    pub fn recurrence(&self) -> &'a Recurrence {
        self.recurrence
    }

    /// Builds the rule generator.
    ///
    /// An explicit `count` wins over an explicit `until`; without either the
    /// extension's own limit applies, else the series is open-ended.
    /// Returns `None` without a frequency.
    pub fn build_rule(&self, count: Option<u32>, until: Option<When>) -> Option<RuleIter> {
        let frequency = self.recurrence.frequency()?;
        let (count, until) = match (count, until) {
            (Some(count), _) => (Some(count), None),
            (None, Some(until)) => (None, Some(until)),
            (None, None) => match self.recurrence.limit() {
                Some(SeriesLimit::Count(count)) => (Some(count), None),
                Some(SeriesLimit::Until(until)) => (None, Some(until)),
                None => (None, None),
            },
        };
        Some(RuleIter::new(
            self.start,
            frequency,
            count,
            until.map(|until| until.timestamp(self.default_tz)),
            self.default_tz,
        ))
    }

    /// Number of rule instants; derived from `until` when only that is set.
    pub fn count(&self) -> Option<u32> {
        match self.recurrence.limit()? {
            SeriesLimit::Count(count) => Some(count),
            SeriesLimit::Until(until) => self
                .build_rule(None, Some(until))
                .and_then(|rule| u32::try_from(rule.count()).ok()),
        }
    }

    /// Last possible instant; derived from `count` when only that is set.
    pub fn until(&self) -> Option<When> {
        match self.recurrence.limit()? {
            SeriesLimit::Count(count) => self
                .build_rule(Some(count), None)
                .and_then(Iterator::last),
            SeriesLimit::Until(until) => Some(until),
        }
    }

    /// Full recurrence-id sequence, ascending.
    pub fn occurrences(&self) -> Occurrences<'a> {
        let mut rdates: Vec<(Timestamp, When)> = self
            .recurrence
            .rdates()
            .map(|when| (when.timestamp(self.default_tz), *when))
            .collect();
        rdates.sort_by_key(|(timestamp, _)| *timestamp);
        Occurrences {
            rule: self.build_rule(None, None).map(Iterator::peekable),
            rdates: rdates.into_iter().peekable(),
            exdates: self.recurrence.exdate_map(),
            default_tz: self.default_tz,
            last: None,
        }
    }

    /// Recurrence-ids within `[range_start, range_end]`; always finite.
    pub fn occurrences_between(
        &self,
        range_start: &When,
        range_end: &When,
    ) -> impl Iterator<Item = When> + 'a {
        let tz = self.default_tz;
        let low = range_start.timestamp(tz);
        let high = range_end.timestamp(tz);
        self.occurrences()
            .skip_while(move |when| when.timestamp(tz) < low)
            .take_while(move |when| when.timestamp(tz) <= high)
    }

    /// Whether `key` is a member of the series.
    pub fn includes(&self, key: RecurrenceKey) -> bool {
        let tz = self.default_tz;
        let target = match key {
            RecurrenceKey::Epoch(seconds) => seconds,
            RecurrenceKey::Floating(naive) => When::floating(naive).timestamp(tz),
        };
        self.occurrences()
            .take_while(|when| when.timestamp(tz) <= target)
            .any(|when| when.key() == key)
    }

    /// Latest recurrence-id strictly before `bound`.
    pub fn last_before(&self, bound: Timestamp) -> Option<When> {
        let tz = self.default_tz;
        self.occurrences()
            .take_while(|when| when.timestamp(tz) < bound)
            .last()
    }
}

/// Rule instants merged with inclusion dates, minus exclusion dates.
pub struct Occurrences<'a> {
    rule: Option<Peekable<RuleIter>>,
    rdates: Peekable<std::vec::IntoIter<(Timestamp, When)>>,
    exdates: &'a BTreeMap<RecurrenceKey, When>,
    default_tz: Tz,
    last: Option<RecurrenceKey>,
}

impl Iterator for Occurrences<'_> {
    type Item = When;

    fn next(&mut self) -> Option<When> {
        let tz = self.default_tz;
        loop {
            let rule_next = self
                .rule
                .as_mut()
                .and_then(|rule| rule.peek().map(|when| when.timestamp(tz)));
            let rdate_next = self.rdates.peek().map(|(timestamp, _)| *timestamp);
            let next = match (rule_next, rdate_next) {
                (None, None) => return None,
                (Some(rule_at), Some(rdate_at)) if rdate_at < rule_at => {
                    self.rdates.next().map(|(_, when)| when)
                }
                (Some(_), _) => self.rule.as_mut().and_then(Iterator::next),
                (None, Some(_)) => self.rdates.next().map(|(_, when)| when),
            }?;
            let key = next.key();
            if self.last == Some(key) {
                continue;
            }
            self.last = Some(key);
            if self.exdates.contains_key(&key) {
                continue;
            }
            return Some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Frequency, RuleIter};
    use crate::model::when::When;
    use chrono::{Datelike, NaiveDate, TimeZone, Timelike};
    use chrono_tz::Tz;

    fn pacific(y: i32, m: u32, d: u32, h: u32) -> When {
        When::from(
            Tz::US__Pacific
                .with_ymd_and_hms(y, m, d, h, 0, 0)
                .single()
                .expect("pacific instant"),
        )
    }

    #[test]
    fn weekly_keeps_local_time_across_dst() {
        let start = pacific(2009, 3, 1, 9);
        let instants: Vec<When> =
            RuleIter::new(start, Frequency::Weekly, Some(3), None, Tz::UTC).collect();
        assert_eq!(instants.len(), 3);
        for when in &instants {
            assert_eq!(when.naive_local().hour(), 9);
        }
        // 2009-03-08 is the spring-forward day
        assert_eq!(
            instants[2].timestamp(Tz::UTC) - instants[1].timestamp(Tz::UTC),
            7 * 24 * 3600
        );
        assert_eq!(
            instants[1].timestamp(Tz::UTC) - instants[0].timestamp(Tz::UTC),
            7 * 24 * 3600 - 3600
        );
    }

    #[test]
    fn monthly_skips_missing_days() {
        let start = pacific(2009, 1, 31, 8);
        let days: Vec<(u32, u32)> =
            RuleIter::new(start, Frequency::Monthly, Some(4), None, Tz::UTC)
                .map(|when| (when.naive_local().month(), when.naive_local().day()))
                .collect();
        assert_eq!(days, vec![(1, 31), (3, 31), (5, 31), (7, 31)]);
    }

    #[test]
    fn yearly_leap_day_lands_every_four_years() {
        let naive = NaiveDate::from_ymd_opt(2008, 2, 29)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("leap day");
        let years: Vec<i32> =
            RuleIter::new(When::floating(naive), Frequency::Yearly, Some(3), None, Tz::UTC)
                .map(|when| when.naive_local().year())
                .collect();
        assert_eq!(years, vec![2008, 2012, 2016]);
    }

    #[test]
    fn until_is_inclusive() {
        let start = pacific(2008, 11, 30, 9);
        let until = pacific(2008, 12, 14, 9);
        let count = RuleIter::new(
            start,
            Frequency::Weekly,
            None,
            Some(until.timestamp(Tz::UTC)),
            Tz::UTC,
        )
        .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn frequency_parses_case_insensitively() {
        assert_eq!("WEEKLY".parse::<Frequency>().ok(), Some(Frequency::Weekly));
        assert!("fortnightly".parse::<Frequency>().is_err());
    }
}
