//! Night and program completion statistics, computed once a night's plan has
//! been charged by [`super::charge_night`].
//!
//! Grounded on `original_source/scheduler/core/stats_calculator/stats_calculator.py`
//! (`StatCalculator.program_real_total_used`, `calculate_timeline_stats`,
//! `calculate_program_completion`): `program_real_total_time` mirrors the
//! original's denominator (`part_time + acq_overhead + prog_time` summed
//! over every atom), and `plans_summary` mirrors its final
//! `program_id -> (completion, cumulative score)` map.

use crate::collector::Collector;
use crate::model::{Band, NightStats, NightlyTimeline, Plan, Program};
use std::collections::HashMap;

pub struct StatCalculator;

impl StatCalculator {
    /// Sum of `prog_time + part_time` over every atom in every observation,
    /// plus each observation's acquisition overhead: the program's full
    /// intended execution time, used as the completion-percentage
    /// denominator.
    #[must_use]
    fn program_real_total_time(program: &Program) -> chrono::TimeDelta {
        program.root_group.observations().iter().fold(chrono::TimeDelta::zero(), |acc, obs| {
            let atoms_total = obs
                .sequence
                .iter()
                .fold(chrono::TimeDelta::zero(), |a, atom| a + atom.prog_time + atom.part_time);
            acc + atoms_total + obs.acq_overhead
        })
    }

    #[must_use]
    fn program_total_used(program: &Program) -> chrono::TimeDelta {
        program
            .root_group
            .observations()
            .iter()
            .fold(chrono::TimeDelta::zero(), |acc, obs| acc + obs.total_used())
    }

    /// Percentage of `program_real_total_time` already charged, formatted
    /// as e.g. `"42.5%"`.
    #[must_use]
    pub fn program_completion_percent(program: &Program) -> f64 {
        let total = Self::program_real_total_time(program);
        if total <= chrono::TimeDelta::zero() {
            return 0.0;
        }
        100.0 * Self::program_total_used(program).num_seconds() as f64 / total.num_seconds() as f64
    }

    /// Computes and attaches [`NightStats`] to `plan` once its visits have
    /// been charged. `time_loss` is the cumulative blockage duration the
    /// night's event stream recorded (`spec.md` §4.6), supplied by the
    /// caller since charging itself has no visibility into events.
    pub fn compute_night_stats(plan: &mut Plan, collector: &Collector, time_loss: chrono::TimeDelta) {
        let mut plan_score = 0.0;
        let mut too_count = 0u32;
        let mut completion_fraction: HashMap<Band, u32> = HashMap::new();
        let mut program_completion: HashMap<String, String> = HashMap::new();
        let mut seen_programs = std::collections::HashSet::new();

        for visit in &plan.visits {
            plan_score += visit.score;
            let Some(program) = collector.program(&visit.obs_id.program_id) else { continue };
            if let Some(obs) = program.root_group.observations().into_iter().find(|o| o.id == visit.obs_id) {
                if obs.too_type.is_some() {
                    too_count += 1;
                }
            }
            if seen_programs.insert(program.id.clone()) {
                *completion_fraction.entry(program.band).or_insert(0) += 1;
                let pct = Self::program_completion_percent(&program);
                program_completion.insert(program.id.to_string(), format!("{pct:.1}%"));
            }
        }

        plan.night_stats =
            Some(NightStats { time_loss, plan_score, too_count, completion_fraction, program_completion });
    }

    /// Final per-program summary across the whole timeline: completion
    /// percentage and cumulative visit score, matching the original's
    /// `plans_summary` return contract (`spec.md` §6).
    #[must_use]
    pub fn plans_summary(collector: &Collector, timeline: &NightlyTimeline) -> HashMap<String, (String, f64)> {
        let mut summary = HashMap::new();
        for program_id in collector.program_ids() {
            let Some(program) = collector.program(&program_id) else { continue };
            let pct = Self::program_completion_percent(&program);
            let mut cumulative_score = 0.0;
            for by_site in timeline.timeline.values() {
                for entries in by_site.values() {
                    for entry in entries {
                        let Some(night_plan) = &entry.plan_generated else { continue };
                        cumulative_score += night_plan
                            .visits
                            .iter()
                            .filter(|v| v.obs_id.program_id == program_id)
                            .map(|v| v.score)
                            .sum::<f64>();
                    }
                }
            }
            summary.insert(program_id.to_string(), (format!("{pct:.1}%"), cumulative_score));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::observation::tests::sample_observation;
    use crate::model::{Group, ProgramID, Semester, Site, TimeslotIndex, UniqueGroupID, Visit};

    fn sample_program() -> Program {
        let obs = sample_observation();
        let group = Group::Observation {
            id: UniqueGroupID { program_id: obs.id.program_id.clone(), local_id: "o1".into() },
            obs: Box::new(obs),
        };
        Program {
            id: ProgramID("GN-2018B-Q-101".into()),
            program_type: "Queue".into(),
            band: crate::model::Band::Band1,
            thesis: false,
            awarded: chrono::TimeDelta::hours(10),
            used: chrono::TimeDelta::zero(),
            semester: Semester("2018B".into()),
            start: chrono::NaiveDate::from_ymd_opt(2018, 8, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2019, 1, 31).unwrap(),
            b3_min_fraction: 0.0,
            root_group: group,
        }
    }

    #[test]
    fn completion_percent_is_zero_with_no_charges() {
        let program = sample_program();
        assert_eq!(StatCalculator::program_completion_percent(&program), 0.0);
    }

    #[test]
    fn completion_percent_rises_after_charging() {
        let mut program = sample_program();
        if let Group::Observation { obs, .. } = &mut program.root_group {
            obs.sequence[0].program_used = obs.sequence[0].prog_time;
        }
        let pct = StatCalculator::program_completion_percent(&program);
        assert!(pct > 0.0);
    }

    fn noop_collector() -> Collector {
        use crate::adapters::{EngTask, Fault, InMemoryTargetInfoCache, NightConfiguration, ProgramFilter};
        use crate::model::{Conditions, PercentileBand, Radians, WindForecast};
        use std::sync::Arc;

        struct AllowAllFilter;
        impl ProgramFilter for AllowAllFilter {
            fn program_filter(&self, _program: &Program) -> bool { true }
        }

        struct NoopResourceService;
        #[async_trait::async_trait]
        impl crate::adapters::ResourceService for NoopResourceService {
            async fn night_configuration(&self, _site: Site, _date: chrono::NaiveDate) -> NightConfiguration {
                NightConfiguration { resources: std::collections::HashSet::new(), filter: Box::new(AllowAllFilter) }
            }
            async fn get_faults(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<Fault> { Vec::new() }
            async fn get_eng_tasks(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<EngTask> { Vec::new() }
            async fn weather_changes(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<(chrono::DateTime<chrono::Utc>, Conditions)> { Vec::new() }
            async fn conditions_forecast(&self, _site: Site, _date: chrono::NaiveDate) -> Conditions {
                Conditions { cloud_cover: PercentileBand::P100, image_quality: PercentileBand::P100 }
            }
            async fn wind_forecast(&self, _site: Site, _date: chrono::NaiveDate) -> WindForecast {
                WindForecast { speed_ms: 0.0, direction: Radians(0.0) }
            }
        }

        struct NoopEphemerisService;
        #[async_trait::async_trait]
        impl crate::adapters::EphemerisService for NoopEphemerisService {
            async fn positions(
                &self,
                _target_name: &str,
                _date: chrono::NaiveDate,
                _num_slots: u32,
                _slot_length: chrono::TimeDelta,
            ) -> Vec<(Radians, Radians)> {
                Vec::new()
            }
        }

        Collector::new(
            vec![Site::GeminiNorth],
            chrono::NaiveDate::from_ymd_opt(2018, 10, 1).unwrap(),
            1,
            chrono::TimeDelta::minutes(1),
            12.0,
            Arc::new(NoopResourceService),
            Arc::new(NoopEphemerisService),
            Arc::new(InMemoryTargetInfoCache::default()),
        )
    }

    #[test]
    fn night_stats_sums_visit_scores() {
        let start = chrono::DateTime::parse_from_rfc3339("2018-10-01T23:00:00Z").unwrap().to_utc();
        let mut plan = Plan::new(Site::GeminiNorth, start, start + chrono::TimeDelta::hours(8), chrono::TimeDelta::minutes(1), 480);
        let obs_id = crate::model::ObservationID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: "obs1".into() };
        plan.add_visit(Visit { obs_id, start_time_slot: TimeslotIndex(0), time_slots: 10, atom_start_idx: 0, atom_end_idx: 0, score: 3.5 });

        let collector = noop_collector();
        collector.update_program(sample_program());
        StatCalculator::compute_night_stats(&mut plan, &collector, chrono::TimeDelta::zero());

        let stats = plan.night_stats.unwrap();
        assert_eq!(stats.plan_score, 3.5);
        assert_eq!(stats.completion_fraction.get(&crate::model::Band::Band1), Some(&1));
    }
}
