//! [`Optimizer`] (`spec.md` §4.5): consumes a [`Selection`] and emits one
//! [`Plan`] per site per night.
//!
//! Grounded on `original_source/scheduler/core/components/optimizer/dummy.py`
//! (`DummyOptimizer`): this crate ships one concrete, greedy policy,
//! `GreedyMaxOptimizer`, built the same way — pick the highest-scoring
//! remaining schedulable group, place it in the first open slot run long
//! enough to hold it, repeat until nothing more fits (`SPEC_FULL.md` §4.5a).

use crate::model::{time_to_slots, Group, NightIndex, Observation, Plan, Plans, Resource, Visit};
use crate::selector::{GroupData, Selection};
use std::collections::HashSet;

/// An explicit `[start, end)` time-slot window an `add` call is restricted
/// to, used when re-running the optimizer over the remaining part of a
/// night after an interrupting event (`spec.md` §4.6 step 2).
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    pub start_time_slot: u32,
    pub end_time_slot: u32,
}

/// Placement policy over a [`Selection`] (`spec.md` §4.5). The core
/// guarantees only that scores and visibility are exposed via
/// [`GroupData`]; placement policy itself is pluggable.
pub trait Optimizer: Send + Sync {
    /// Prepares internal state (e.g. a worklist of observation groups) from
    /// a freshly built `Selection`.
    fn setup(&mut self, selection: &Selection);

    /// Attempts to place `group` into `plans`, honoring `interval` if given.
    /// Returns `false` if the group could not be placed (no open slot run
    /// long enough remains at any of its observations' sites).
    fn add(&mut self, group: &GroupData, plans: &mut Plans, interval: Option<Interval>) -> bool;

    /// Fills `plans` by repeatedly calling `add` until nothing more fits or
    /// every site's plan reports done.
    fn schedule(&mut self, plans: &mut Plans);
}

/// Greedy-max placement: `spec.md` §4.5's reference behavior. At each step,
/// picks the schedulable group (observation-group leaves only, matching the
/// original's `is_observation_group()` filter) with the highest total score
/// over its own schedulable slots for the current night, and places it
/// starting at the first open slot run in its site's plan.
pub struct GreedyMaxOptimizer {
    groups: Vec<GroupData>,
}

impl GreedyMaxOptimizer {
    #[must_use]
    pub fn new() -> Self { Self { groups: Vec::new() } }

    /// First open `(start_time, start_time_slot)` in `plan` (teacher's
    /// `DummyOptimizer::_allocate_time`): right after the last visit, or the
    /// plan's start if empty.
    fn allocate_time(plan: &Plan) -> (chrono::DateTime<chrono::Utc>, u32) {
        match plan.visits.last() {
            Some(last) => {
                let slot = last.end_time_slot().0;
                (plan.start + plan.time_slot_length * i32::try_from(slot).unwrap_or(i32::MAX), slot)
            }
            None => (plan.start, 0),
        }
    }

    fn score_over_range(scores: &[f64], start: usize, len: usize) -> f64 { scores.iter().skip(start).take(len).sum() }

    /// Rebuilds the worklist from `selection` like [`Optimizer::setup`], but
    /// drops any group that needs a resource in `blocked` — used when
    /// re-running the optimizer after a `Fault`/`EngTask` (`spec.md` §4.6
    /// step 2, §5).
    pub fn setup_excluding(&mut self, selection: &Selection, blocked: &HashSet<Resource>) {
        self.groups = selection
            .values()
            .filter(|gd| gd.group.is_observation_group())
            .filter(|gd| gd.group.observations().iter().all(|o| o.required_resources.is_disjoint(blocked)))
            .cloned()
            .collect();
    }

    /// Same worklist-draining loop as [`Optimizer::schedule`], restricted to
    /// `interval` (`spec.md` §4.6 step 2): used to re-plan only the part of
    /// the night an interrupting event left open.
    pub fn schedule_window(&mut self, plans: &mut Plans, interval: Interval) {
        loop {
            if plans.all_done() || self.groups.is_empty() {
                break;
            }
            let Some(best_idx) = self.best_remaining_index(plans.night) else { break };
            let candidate = self.groups[best_idx].clone();
            if !self.add(&candidate, plans, Some(interval)) {
                log::debug!(
                    "group {:?} could not be placed in window, dropping from worklist",
                    candidate.group.unique_id()
                );
            }
            self.groups.remove(best_idx);
        }
    }

    /// Index into `self.groups` of the group with the highest total score
    /// for `night` among its own schedulable slots; `None` if every
    /// remaining group has no schedulable slots left.
    fn best_remaining_index(&self, night: NightIndex) -> Option<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, gd)| {
                let slots = gd.group_info.schedulable_slot_indices.get(&night)?;
                if slots.is_empty() {
                    return None;
                }
                let scores = gd.group_info.scores.get(night.as_usize())?;
                let total: f64 = slots.iter().filter_map(|s| scores.get(s.as_usize())).sum();
                Some((i, total))
            })
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }
}

impl Default for GreedyMaxOptimizer {
    fn default() -> Self { Self::new() }
}

impl Optimizer for GreedyMaxOptimizer {
    fn setup(&mut self, selection: &Selection) {
        self.groups = selection.values().filter(|gd| gd.group.is_observation_group()).cloned().collect();
    }

    fn add(&mut self, group: &GroupData, plans: &mut Plans, interval: Option<Interval>) -> bool {
        let observations: Vec<&Observation> = group.group.observations();
        let Some(&observation) = observations.first() else { return false };

        let Some(plan) = plans.by_site.get_mut(&observation.site) else { return false };
        if plan.contains(&observation.id) {
            return false;
        }

        let obs_len = time_to_slots(plan.time_slot_length, observation.exec_time());
        let (mut start_time, mut start_slot) = Self::allocate_time(plan);

        if let Some(bound) = interval {
            if start_slot < bound.start_time_slot {
                start_time +=
                    plan.time_slot_length * i32::try_from(bound.start_time_slot - start_slot).unwrap_or(i32::MAX);
                start_slot = bound.start_time_slot;
            }
            if start_slot + obs_len > bound.end_time_slot {
                return false;
            }
        }

        if start_slot + obs_len > plan.num_slots() {
            return false;
        }

        let night_scores = group.group_info.scores.get(plans.night.as_usize()).cloned().unwrap_or_default();
        let visit_score = Self::score_over_range(&night_scores, start_slot as usize, obs_len as usize);

        plan.add_visit(Visit {
            obs_id: observation.id.clone(),
            start_time_slot: crate::model::TimeslotIndex(start_slot),
            time_slots: obs_len,
            atom_start_idx: 0,
            atom_end_idx: observation.sequence.len().saturating_sub(1),
            score: visit_score,
        });
        let _ = start_time;
        true
    }

    fn schedule(&mut self, plans: &mut Plans) {
        loop {
            if plans.all_done() || self.groups.is_empty() {
                break;
            }
            let Some(best_idx) = self.best_remaining_index(plans.night) else { break };
            let candidate = self.groups[best_idx].clone();
            if !self.add(&candidate, plans, None) {
                log::debug!("group {:?} could not be placed this round, dropping from worklist", candidate.group.unique_id());
            }
            self.groups.remove(best_idx);
        }
    }
}

/// Whether `group` is a single-observation leaf, matching
/// `Group::is_observation_group`.
#[must_use]
pub fn is_single_observation(group: &Group) -> bool { group.is_observation_group() }
