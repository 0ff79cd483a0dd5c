//! Dependency-tracked memoization graph for derived values.
//!
//! # Responsibility
//! - Record which inputs (and other derived values) each derived value read
//!   during its last computation.
//! - Mark dependents stale when an input changes so they recompute lazily
//!   on their next read.
//!
//! # Invariants
//! - A derived value is fresh only if none of its recorded reads changed
//!   since it was computed.
//! - A derived value never appears twice on the computation stack; derived
//!   computations only get shared access to the store and cannot write
//!   inputs.

use crate::model::item::ItemId;
use crate::model::when::RecurrenceKey;
use crate::model::Subject;
use std::collections::{HashMap, HashSet};

/// Writable state a derived value may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Input {
    /// Snapshot of the clock.
    Now,
    /// Any non-recurrence attribute of a master (title, event, triage,
    /// reminders, attached extensions).
    Master(ItemId),
    /// Rule inputs: frequency, limit, rdates, exdates, start attribute.
    Rule(ItemId),
    Recipe(ItemId, RecurrenceKey),
    /// Membership of the recipe map.
    Recipes(ItemId),
    Manual(ItemId, RecurrenceKey),
    /// Membership of the manual-record map.
    ManualRecords(ItemId),
    Watermark(ItemId),
    Pin(Subject),
}

/// Memoized value slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Derived {
    Triage(Subject),
    Position(Subject),
    Visible(ItemId),
}

impl Derived {
    pub fn master(&self) -> ItemId {
        match self {
            Self::Triage(subject) | Self::Position(subject) => subject.master(),
            Self::Visible(item) => *item,
        }
    }
}

/// Node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Input(Input),
    Derived(Derived),
}

#[derive(Debug)]
struct Frame {
    key: Derived,
    reads: Vec<Cell>,
    seen: HashSet<Cell>,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub computations: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    dependencies: HashMap<Derived, Vec<Cell>>,
    dependents: HashMap<Cell, HashSet<Derived>>,
    fresh: HashSet<Derived>,
    frames: Vec<Frame>,
    stats: GraphStats,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read of `cell` by the computation on top of the stack.
    pub fn record(&mut self, cell: Cell) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.seen.insert(cell) {
                frame.reads.push(cell);
            }
        }
    }

    pub fn record_input(&mut self, input: Input) {
        self.record(Cell::Input(input));
    }

    pub fn is_fresh(&self, key: Derived) -> bool {
        self.fresh.contains(&key)
    }

    pub fn is_computing(&self, key: Derived) -> bool {
        self.frames.iter().any(|frame| frame.key == key)
    }

    /// Starts a computation of `key`.
    pub fn begin(&mut self, key: Derived) {
        debug_assert!(
            !self.is_computing(key),
            "derived value {key:?} re-entered its own computation"
        );
        self.frames.push(Frame {
            key,
            reads: Vec::new(),
            seen: HashSet::new(),
        });
    }

    /// Finishes the computation of `key`, replacing its recorded
    /// dependencies and marking it fresh. The caller's frame (if any) then
    /// records a read of `key`.
    pub fn finish(&mut self, key: Derived) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        debug_assert_eq!(frame.key, key, "unbalanced memo frames");

        if let Some(previous) = self.dependencies.remove(&key) {
            for cell in previous {
                if let Some(dependents) = self.dependents.get_mut(&cell) {
                    dependents.remove(&key);
                    if dependents.is_empty() {
                        self.dependents.remove(&cell);
                    }
                }
            }
        }
        for cell in &frame.reads {
            self.dependents.entry(*cell).or_default().insert(key);
        }
        self.dependencies.insert(key, frame.reads);
        self.fresh.insert(key);
        self.stats.computations += 1;
        self.record(Cell::Derived(key));
    }

    /// Marks every transitive dependent of `input` stale.
    ///
    /// Returns the number of values that went from fresh to stale.
    pub fn invalidate(&mut self, input: Input) -> usize {
        let mut staled = 0;
        let mut visited = HashSet::new();
        let mut pending = vec![Cell::Input(input)];
        while let Some(cell) = pending.pop() {
            let Some(dependents) = self.dependents.get(&cell) else {
                continue;
            };
            for dependent in dependents {
                if !visited.insert(*dependent) {
                    continue;
                }
                if self.fresh.remove(dependent) {
                    staled += 1;
                }
                pending.push(Cell::Derived(*dependent));
            }
        }
        self.stats.invalidations += 1;
        staled
    }

    /// Drops every node that belongs to `master`.
    pub fn forget_master(&mut self, master: ItemId) {
        let doomed: Vec<Derived> = self
            .dependencies
            .keys()
            .filter(|key| key.master() == master)
            .copied()
            .collect();
        for key in doomed {
            if let Some(previous) = self.dependencies.remove(&key) {
                for cell in previous {
                    if let Some(dependents) = self.dependents.get_mut(&cell) {
                        dependents.remove(&key);
                        if dependents.is_empty() {
                            self.dependents.remove(&cell);
                        }
                    }
                }
            }
            self.fresh.remove(&key);
        }
    }

    pub fn dependencies(&self, key: Derived) -> &[Cell] {
        self.dependencies.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stats(&self) -> GraphStats {
        self.stats
    }
}
