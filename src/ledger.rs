//! History and redo ledger per tracked object.

use std::collections::BTreeMap;

use crate::pose::ViewPose;
use crate::settings::StepTiming;
use crate::snapshot::Snapshot;

/// A recorded step together with its playback timing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Step {
    pub snapshot: Snapshot,
    pub timing: StepTiming,
}

impl Step {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            timing: StepTiming::default(),
        }
    }
}

/// Timeline of one mesh object.
///
/// `redo` holds the most recently undone step first. Steps only ever move
/// between `steps` and `redo`; [`ObjectRecord::set_view`] is the single
/// in-place edit.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub initial: Snapshot,
    steps: Vec<Step>,
    redo: Vec<Step>,
    /// Bumped whenever the step list changes shape.
    revision: u64,
}

impl ObjectRecord {
    #[must_use]
    pub fn new(initial: Snapshot) -> Self {
        Self::with_steps(initial, Vec::new())
    }

    #[must_use]
    pub fn with_steps(initial: Snapshot, steps: Vec<Step>) -> Self {
        Self {
            initial,
            steps,
            redo: Vec::new(),
            revision: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn redo(&self) -> &[Step] {
        &self.redo
    }

    #[must_use]
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The snapshot a step morphs away from: the initial state for step 0,
    /// the previous step otherwise.
    #[must_use]
    pub fn source_of(&self, index: usize) -> Option<&Snapshot> {
        match index {
            0 => Some(&self.initial),
            i => self.steps.get(i - 1).map(|s| &s.snapshot),
        }
    }

    /// Most recent state of the timeline.
    #[must_use]
    pub fn last_snapshot(&self) -> &Snapshot {
        self.steps.last().map_or(&self.initial, |s| &s.snapshot)
    }

    /// Position of `hash` in `[initial] + steps`, first match wins.
    #[must_use]
    pub fn find_in_history(&self, hash: u64) -> Option<usize> {
        std::iter::once(&self.initial)
            .chain(self.steps.iter().map(|s| &s.snapshot))
            .position(|snap| snap.hash == Some(hash))
    }

    #[must_use]
    pub fn find_in_redo(&self, hash: u64) -> Option<usize> {
        self.redo.iter().position(|s| s.snapshot.hash == Some(hash))
    }

    /// Truncates the timeline to `keep` steps, moving the removed tail in
    /// order onto the front of `redo`. Returns how many steps moved.
    pub fn undo_to(&mut self, keep: usize, redo_limit: usize) -> usize {
        if keep >= self.steps.len() {
            return 0;
        }
        let mut removed = self.steps.split_off(keep);
        let moved = removed.len();
        removed.append(&mut self.redo);
        removed.truncate(redo_limit);
        self.redo = removed;
        self.revision += 1;
        moved
    }

    /// Moves `redo[..=index]` back onto the end of the timeline.
    pub fn redo_through(&mut self, index: usize) -> usize {
        if index >= self.redo.len() {
            return 0;
        }
        let rest = self.redo.split_off(index + 1);
        let restored = std::mem::replace(&mut self.redo, rest);
        let count = restored.len();
        self.steps.extend(restored);
        self.revision += 1;
        count
    }

    /// Appends a new edit, abandoning whatever could have been redone.
    pub fn push_step(&mut self, snapshot: Snapshot) -> usize {
        self.redo.clear();
        self.steps.push(Step::new(snapshot));
        self.revision += 1;
        self.steps.len() - 1
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn remove_step(&mut self, index: usize) -> Option<Step> {
        if index >= self.steps.len() {
            return None;
        }
        self.revision += 1;
        Some(self.steps.remove(index))
    }

    /// Re-inserts a step; `index` past the end appends.
    pub fn insert_step(&mut self, index: usize, step: Step) {
        let index = index.min(self.steps.len());
        self.steps.insert(index, step);
        self.revision += 1;
    }

    /// Replaces the recorded view of one step.
    pub fn set_view(&mut self, index: usize, view: Option<ViewPose>) -> bool {
        match self.steps.get_mut(index) {
            Some(step) => {
                step.snapshot.view = view;
                true
            }
            None => false,
        }
    }
}

/// A step removed from a record, kept so it can be put back.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedStep {
    pub object: String,
    pub index: usize,
    pub step: Step,
    /// Record revision right after the removal.
    pub revision: u64,
}

/// Every tracked object's record, keyed by object name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    records: BTreeMap<String, ObjectRecord>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ObjectRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ObjectRecord> {
        self.records.get_mut(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, record: ObjectRecord) -> Option<ObjectRecord> {
        self.records.insert(name.into(), record)
    }

    pub fn remove(&mut self, name: &str) -> Option<ObjectRecord> {
        self.records.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectRecord)> {
        self.records.iter().map(|(name, rec)| (name.as_str(), rec))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record whose object fails `exists`; returns the dropped names.
    pub fn retain_existing(&mut self, mut exists: impl FnMut(&str) -> bool) -> Vec<String> {
        let gone: Vec<String> = self
            .records
            .keys()
            .filter(|name| !exists(name))
            .cloned()
            .collect();
        for name in &gone {
            self.records.remove(name);
        }
        gone
    }
}
