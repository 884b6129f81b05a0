//! [`Plan`]: a per-site, per-night ordered sequence of [`Visit`]s.

use super::observation::ObservationID;
use super::site::Site;
use super::units::TimeslotIndex;
use std::collections::HashMap;

/// One scheduled visit: an observation occupying `[start_time_slot,
/// start_time_slot + time_slots)`, executing atoms
/// `[atom_start_idx, atom_end_idx]` inclusive.
#[derive(Debug, Clone)]
pub struct Visit {
    pub obs_id: ObservationID,
    pub start_time_slot: TimeslotIndex,
    pub time_slots: u32,
    pub atom_start_idx: usize,
    pub atom_end_idx: usize,
    pub score: f64,
}

impl Visit {
    #[must_use]
    pub fn end_time_slot(&self) -> TimeslotIndex { self.start_time_slot + self.time_slots }
}

/// Aggregate statistics for one finalized night's plan, computed by
/// [`crate::accounting::stats::StatCalculator`].
#[derive(Debug, Clone, Default)]
pub struct NightStats {
    pub time_loss: chrono::TimeDelta,
    pub plan_score: f64,
    pub too_count: u32,
    pub completion_fraction: HashMap<super::program::Band, u32>,
    pub program_completion: HashMap<String, String>,
}

/// A night's plan at one site: visits ordered by `start_time_slot`, with
/// invariant non-overlap (`spec.md` §3, §8).
#[derive(Debug, Clone)]
pub struct Plan {
    pub site: Site,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    pub time_slot_length: chrono::TimeDelta,
    pub visits: Vec<Visit>,
    pub night_stats: Option<NightStats>,
    num_slots: u32,
}

impl Plan {
    #[must_use]
    pub fn new(
        site: Site,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        time_slot_length: chrono::TimeDelta,
        num_slots: u32,
    ) -> Self {
        Self { site, start, end, time_slot_length, visits: Vec::new(), night_stats: None, num_slots }
    }

    #[must_use]
    pub fn num_slots(&self) -> u32 { self.num_slots }

    /// Time slots occupied past the last visit's end, or the whole night if
    /// no visits are placed yet.
    #[must_use]
    pub fn time_left(&self) -> u32 {
        let occupied = self.visits.last().map_or(0, |v| v.end_time_slot().0);
        self.num_slots.saturating_sub(occupied)
    }

    /// `true` when `observation` already has a visit in this plan.
    #[must_use]
    pub fn contains(&self, obs_id: &ObservationID) -> bool { self.visits.iter().any(|v| &v.obs_id == obs_id) }

    /// Appends a visit at the end of the plan. The caller is responsible for
    /// ensuring it does not overlap (the Optimizer's contract, `spec.md`
    /// §4.5).
    ///
    /// # Panics
    /// Panics in debug builds if the visit would overlap the last one
    /// already present — this is a placement-policy bug, not recoverable
    /// input data, so it is a programmer error rather than a `Result`.
    pub fn add_visit(&mut self, visit: Visit) {
        debug_assert!(
            self.visits.last().is_none_or(|last| last.end_time_slot().0 <= visit.start_time_slot.0),
            "visit overlaps previous visit in plan"
        );
        self.visits.push(visit);
    }

    /// Returns the sub-plan of visits starting before time slot `stop`,
    /// used when stitching partial plans into a [`crate::model::timeline::NightlyTimeline`].
    #[must_use]
    pub fn slice_before(&self, stop: TimeslotIndex) -> Vec<Visit> {
        self.visits.iter().filter(|v| v.start_time_slot.0 < stop.0).cloned().collect()
    }

    /// Drops visits starting at or after `stop` and shortens a visit
    /// straddling it, mirroring the truncation
    /// [`crate::model::timeline::NightlyTimeline::final_plan`] applies when
    /// stitching. Used to discard the stale tail of a plan before
    /// re-running the optimizer over the remainder of a night (`spec.md`
    /// §4.6 step 2).
    pub fn truncate_from(&mut self, stop: TimeslotIndex) {
        self.visits.retain(|v| v.start_time_slot.0 < stop.0);
        if let Some(last) = self.visits.last_mut() {
            if last.end_time_slot().0 > stop.0 {
                last.time_slots = stop.0 - last.start_time_slot.0;
            }
        }
    }

    /// Checks the plan's non-overlap / ordering invariant (`spec.md` §8).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.visits.windows(2).all(|w| w[0].end_time_slot().0 <= w[1].start_time_slot.0)
            && self.visits.windows(2).all(|w| w[0].start_time_slot.0 <= w[1].start_time_slot.0)
            && self.visits.iter().all(|v| v.end_time_slot().0 <= self.num_slots)
    }
}

/// All per-site plans for one night.
#[derive(Debug, Clone)]
pub struct Plans {
    pub night: super::units::NightIndex,
    pub by_site: HashMap<Site, Plan>,
}

impl Plans {
    #[must_use]
    pub fn all_done(&self) -> bool { self.by_site.values().all(|p| p.time_left() == 0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::observation::ObservationID;
    use crate::model::program::ProgramID;

    fn visit(obs: &str, start: u32, len: u32) -> Visit {
        Visit {
            obs_id: ObservationID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: obs.into() },
            start_time_slot: TimeslotIndex(start),
            time_slots: len,
            atom_start_idx: 0,
            atom_end_idx: 0,
            score: 1.0,
        }
    }

    #[test]
    fn plan_rejects_overlap_via_is_valid() {
        let mut p = Plan::new(
            Site::GeminiNorth,
            chrono::Utc::now(),
            chrono::Utc::now(),
            chrono::TimeDelta::minutes(1),
            100,
        );
        p.visits.push(visit("o1", 0, 10));
        p.visits.push(visit("o2", 5, 10));
        assert!(!p.is_valid());
    }

    #[test]
    fn plan_accepts_sorted_nonoverlapping_visits() {
        let mut p = Plan::new(
            Site::GeminiNorth,
            chrono::Utc::now(),
            chrono::Utc::now(),
            chrono::TimeDelta::minutes(1),
            100,
        );
        p.add_visit(visit("o1", 0, 10));
        p.add_visit(visit("o2", 10, 10));
        assert!(p.is_valid());
        assert_eq!(p.time_left(), 80);
    }

    #[test]
    fn truncate_from_shortens_straddling_visit_and_drops_the_rest() {
        let mut p = Plan::new(Site::GeminiNorth, chrono::Utc::now(), chrono::Utc::now(), chrono::TimeDelta::minutes(1), 100);
        p.add_visit(visit("o1", 0, 10));
        p.add_visit(visit("o2", 10, 10));
        p.add_visit(visit("o3", 25, 10));

        p.truncate_from(TimeslotIndex(15));

        assert_eq!(p.visits.len(), 2);
        assert_eq!(p.visits[1].obs_id.local_id, "o2");
        assert_eq!(p.visits[1].time_slots, 5);
    }
}
