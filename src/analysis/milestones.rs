// src/analysis/milestones.rs
//
// Fire-once bookkeeping. Sensor noise can put the runner on either side of a
// lap line for several fixes in a row; every milestone side effect goes
// through the debouncer so it happens exactly once per session.

use std::collections::BTreeSet;
use tracing::debug;

/// Tolerance for cumulative-distance float error when testing a crossing
pub const DISTANCE_EPSILON_M: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MilestoneId {
    Takeoff,
    Landing,
    Release,
    Lap(u32),
    DirectionChangeRequired(u32),
    DirectionChangeDetected(u32),
    Checkpoint(u32),
    Completion,
}

#[derive(Debug, Clone, Default)]
pub struct MilestoneSet {
    fired: BTreeSet<MilestoneId>,
}

impl MilestoneSet {
    pub fn contains(&self, id: MilestoneId) -> bool {
        self.fired.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MilestoneDebouncer {
    set: MilestoneSet,
}

impl MilestoneDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only the first time `id` is seen this session
    pub fn fire(&mut self, id: MilestoneId) -> bool {
        let first = self.set.fired.insert(id);
        if !first {
            debug!("🔁 Milestone {:?} already fired, suppressed", id);
        }
        first
    }

    pub fn has_fired(&self, id: MilestoneId) -> bool {
        self.set.contains(id)
    }

    /// Fires every multiple of `interval` that `distance` has reached, up to
    /// `limit`, and returns the newly fired indices in ascending order.
    /// Indices skipped by a large jump are back-filled.
    pub fn fire_crossed(
        &mut self,
        previous: f64,
        distance: f64,
        interval: f64,
        limit: u32,
        make_id: fn(u32) -> MilestoneId,
    ) -> Vec<u32> {
        if interval <= 0.0 || !distance.is_finite() {
            return Vec::new();
        }
        let reached = ((distance + DISTANCE_EPSILON_M) / interval).floor();
        if reached < 1.0 {
            return Vec::new();
        }
        let reached = (reached as u64).min(limit as u64) as u32;
        // An index sitting exactly on `previous` may not have fired yet
        let start = ((previous.max(0.0) / interval).floor() as u64).max(1) as u32;

        (start..=reached)
            .filter(|&index| self.fire(make_id(index)))
            .collect()
    }

    pub fn fired(&self) -> &MilestoneSet {
        &self.set
    }
}
