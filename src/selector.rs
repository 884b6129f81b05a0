//! [`Selector`] (`spec.md` §4.4): filters each top-level [`Group`] by
//! conditions/resources/wind, invokes the [`Ranker`], and emits a
//! [`Selection`] keyed by group.
//!
//! Grounded on `original_source/scheduler/core/calculations/groupinfo.py`
//! (`GroupInfo`/`GroupData` shapes) — the original's Selector module itself
//! was not retrieved, so the filtering/combination rules follow `spec.md`
//! §4.4 directly.

use crate::collector::Collector;
use crate::error::SelectorError;
use crate::model::{Conditions, Group, NightIndex, Observation, PercentileBand, Program, Resource, Site, TimeslotIndex, UniqueGroupID};
use crate::ranker::{NightScores, Ranker};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Per-(top-level-group) scheduling metadata computed by the Selector
/// (`spec.md` §4.4), indexed by night.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub minimum_conditions: Conditions,
    pub is_splittable: bool,
    pub night_filtering: HashMap<NightIndex, bool>,
    pub conditions_score: HashMap<NightIndex, f64>,
    pub wind_score: HashMap<NightIndex, Vec<f64>>,
    pub schedulable_slot_indices: HashMap<NightIndex, Vec<TimeslotIndex>>,
    pub scores: NightScores,
}

/// A group paired with its computed [`GroupInfo`].
#[derive(Debug, Clone)]
pub struct GroupData {
    pub group: Group,
    pub group_info: GroupInfo,
}

/// `(program, group) -> GroupData` over a contiguous range of night
/// indices (`spec.md` §4.4).
pub type Selection = HashMap<UniqueGroupID, GroupData>;

pub struct Selector {
    collector: Arc<Collector>,
    ranker: Arc<Ranker>,
}

impl Selector {
    #[must_use]
    pub fn new(collector: Arc<Collector>, ranker: Arc<Ranker>) -> Self { Self { collector, ranker } }

    /// Builds a [`Selection`] over `night_indices` for every program's root
    /// group. `SelectorError::NestedSchedulingGroup` aborts the whole
    /// request (`spec.md` §7: structural violations are fatal).
    pub async fn select(&self, night_indices: &[NightIndex]) -> Result<Selection, SelectorError> {
        let mut selection = Selection::new();
        for program_id in self.collector.program_ids() {
            let Some(program) = self.collector.program(&program_id) else { continue };
            if program.root_group.has_nested_scheduling_group() {
                return Err(SelectorError::NestedSchedulingGroup(program.id.to_string()));
            }
            let group_info = self.build_group_info(&program, &program.root_group, night_indices).await;
            selection.insert(
                program.root_group.unique_id().clone(),
                GroupData { group: program.root_group.clone(), group_info },
            );
        }
        Ok(selection)
    }

    async fn build_group_info(&self, program: &Program, group: &Group, night_indices: &[NightIndex]) -> GroupInfo {
        let minimum_conditions = group
            .observations()
            .iter()
            .map(|o| o.constraints.required_conditions)
            .reduce(Conditions::most_restrictive)
            .unwrap_or(Conditions { cloud_cover: PercentileBand::P100, image_quality: PercentileBand::P100 });

        let required_resources: HashSet<Resource> =
            group.observations().iter().flat_map(|o| o.required_resources.iter().cloned()).collect();

        let observations: Vec<&Observation> = group.observations();
        let site = observations.first().map_or(Site::GeminiNorth, |o| o.site);

        let scores = self.ranker.score_group(group).unwrap_or_default();

        let mut night_filtering = HashMap::new();
        let mut conditions_score = HashMap::new();
        let mut wind_score = HashMap::new();
        let mut schedulable_slot_indices = HashMap::new();

        for (pos, &night) in night_indices.iter().enumerate() {
            let date = self.collector.date_for_night(night);
            let night_config = self.collector.resource_service.night_configuration(site, date).await;
            let filtering =
                required_resources.is_subset(&night_config.resources) && night_config.filter.program_filter(program);
            night_filtering.insert(night, filtering);

            let forecast = self.collector.resource_service.conditions_forecast(site, date).await;
            let c_score = Conditions::score_against(minimum_conditions, forecast);
            conditions_score.insert(night, c_score);

            let wind = self.collector.resource_service.wind_forecast(site, date).await;
            let ranker_night_scores = scores.get(pos).cloned().unwrap_or_default();
            let w_scores =
                self.wind_scores_for_night(program, &observations, site, night, &wind, ranker_night_scores.len()).await;

            let mut schedulable = Vec::new();
            for t in 0..ranker_night_scores.len() {
                let w = w_scores.get(t).copied().unwrap_or(1.0);
                let v = if filtering { ranker_night_scores[t] * c_score * w } else { 0.0 };
                if v > 0.0 {
                    schedulable.push(TimeslotIndex(u32::try_from(t).unwrap_or(u32::MAX)));
                }
            }
            wind_score.insert(night, w_scores);
            schedulable_slot_indices.insert(night, schedulable);
        }

        GroupInfo {
            minimum_conditions,
            is_splittable: matches!(group, Group::And { is_scheduling_group: false, .. }),
            night_filtering,
            conditions_score,
            wind_score,
            schedulable_slot_indices,
            scores,
        }
    }

    /// Per-slot wind score for a group at one night: the best score across
    /// the group's observations' pointing azimuths (any one observation
    /// being viable is enough for the group as a whole). Observations with
    /// no base target contribute nothing; if none have one, the group is
    /// treated as wind-neutral.
    async fn wind_scores_for_night(
        &self,
        program: &Program,
        observations: &[&Observation],
        site: Site,
        night: NightIndex,
        wind: &crate::model::WindForecast,
        num_slots: usize,
    ) -> Vec<f64> {
        if num_slots == 0 {
            return Vec::new();
        }
        let mut best = vec![0.0f64; num_slots];
        let mut any = false;
        for obs in observations {
            let Some(base_target) = obs.base_target.as_ref() else { continue };
            let ti = self
                .collector
                .get_or_compute_target_info(
                    program,
                    &obs.id.to_string(),
                    site,
                    base_target,
                    &obs.constraints,
                    &obs.required_resources,
                    night,
                )
                .await;
            any = true;
            for t in 0..num_slots.min(ti.az.len()) {
                let s = wind.score_for_azimuth(ti.az[t]);
                if s > best[t] {
                    best[t] = s;
                }
            }
        }
        if !any {
            return vec![1.0; num_slots];
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EngTask, Fault, InMemoryTargetInfoCache, NightConfiguration, ProgramFilter};
    use crate::collector::Collector;
    use crate::model::{Band, Program, ProgramID, Radians, Semester, WindForecast};
    use crate::ranker::RankerParameters;

    struct AllowAllFilter;
    impl ProgramFilter for AllowAllFilter {
        fn program_filter(&self, _program: &Program) -> bool { true }
    }

    struct FakeResourceService;
    #[async_trait::async_trait]
    impl crate::adapters::ResourceService for FakeResourceService {
        async fn night_configuration(&self, _site: Site, _date: chrono::NaiveDate) -> NightConfiguration {
            NightConfiguration { resources: HashSet::new(), filter: Box::new(AllowAllFilter) }
        }
        async fn get_faults(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<Fault> { Vec::new() }
        async fn get_eng_tasks(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<EngTask> { Vec::new() }
        async fn weather_changes(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<(chrono::DateTime<chrono::Utc>, Conditions)> { Vec::new() }
        async fn conditions_forecast(&self, _site: Site, _date: chrono::NaiveDate) -> Conditions {
            Conditions { cloud_cover: PercentileBand::P50, image_quality: PercentileBand::P50 }
        }
        async fn wind_forecast(&self, _site: Site, _date: chrono::NaiveDate) -> WindForecast {
            WindForecast { speed_ms: 0.0, direction: Radians(0.0) }
        }
    }

    struct FakeEphemerisService;
    #[async_trait::async_trait]
    impl crate::adapters::EphemerisService for FakeEphemerisService {
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

    fn sample_program() -> Program {
        Program {
            id: ProgramID("GN-2018B-Q-101".into()),
            program_type: "Queue".into(),
            band: Band::Band2,
            thesis: false,
            awarded: chrono::TimeDelta::hours(10),
            used: chrono::TimeDelta::zero(),
            semester: Semester("2018B".into()),
            start: chrono::NaiveDate::from_ymd_opt(2018, 8, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2019, 1, 31).unwrap(),
            b3_min_fraction: 0.8,
            root_group: crate::model::Group::Observation {
                id: UniqueGroupID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: "obs1".into() },
                obs: Box::new(crate::model::observation::tests::sample_observation()),
            },
        }
    }

    struct StaticProvider(Program);
    #[async_trait::async_trait]
    impl crate::adapters::ProgramProvider for StaticProvider {
        async fn parse_program(&self, _raw: &crate::adapters::RawProgram) -> Option<Program> { Some(self.0.clone()) }
    }

    async fn build_collector_and_ranker(
        program: Program,
        resource_service: Arc<dyn crate::adapters::ResourceService>,
    ) -> (Arc<Collector>, Arc<Ranker>, Vec<NightIndex>) {
        let collector = Arc::new(Collector::new(
            vec![Site::GeminiNorth],
            chrono::NaiveDate::from_ymd_opt(2018, 10, 1).unwrap(),
            1,
            chrono::TimeDelta::minutes(1),
            12.0,
            resource_service,
            Arc::new(FakeEphemerisService),
            Arc::new(InMemoryTargetInfoCache::default()),
        ));
        collector
            .ingest(vec![crate::adapters::RawProgram(serde_json::json!({}))], &StaticProvider(program), false)
            .await;
        let night_indices = vec![NightIndex(0)];
        let ranker = Arc::new(
            Ranker::build(
                collector.clone(),
                night_indices.clone(),
                vec![Site::GeminiNorth],
                RankerParameters::default(),
                crate::ranker::default_band_params(),
            )
            .await,
        );
        (collector, ranker, night_indices)
    }

    #[tokio::test]
    async fn selection_contains_one_entry_per_program() {
        let (collector, ranker, nights) =
            build_collector_and_ranker(sample_program(), Arc::new(FakeResourceService)).await;
        let selector = Selector::new(collector, ranker);
        let selection = selector.select(&nights).await.unwrap();
        assert_eq!(selection.len(), 1);
    }

    #[tokio::test]
    async fn nested_scheduling_group_is_fatal() {
        let mut program = sample_program();
        let leaf = program.root_group.clone();
        let inner = crate::model::Group::And {
            id: UniqueGroupID { program_id: program.id.clone(), local_id: "inner".into() },
            is_scheduling_group: true,
            children: vec![leaf],
        };
        program.root_group = crate::model::Group::And {
            id: UniqueGroupID { program_id: program.id.clone(), local_id: "outer".into() },
            is_scheduling_group: true,
            children: vec![inner],
        };
        let (collector, ranker, nights) = build_collector_and_ranker(program, Arc::new(FakeResourceService)).await;
        let selector = Selector::new(collector, ranker);
        let err = selector.select(&nights).await.unwrap_err();
        assert!(matches!(err, SelectorError::NestedSchedulingGroup(_)));
    }

    #[tokio::test]
    async fn night_filtering_rejects_when_required_resource_absent() {
        struct NoResourceService;
        #[async_trait::async_trait]
        impl crate::adapters::ResourceService for NoResourceService {
            async fn night_configuration(&self, _site: Site, _date: chrono::NaiveDate) -> NightConfiguration {
                NightConfiguration { resources: HashSet::new(), filter: Box::new(AllowAllFilter) }
            }
            async fn get_faults(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<Fault> { Vec::new() }
            async fn get_eng_tasks(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<EngTask> { Vec::new() }
            async fn weather_changes(&self, _site: Site, _date: chrono::NaiveDate) -> Vec<(chrono::DateTime<chrono::Utc>, Conditions)> { Vec::new() }
            async fn conditions_forecast(&self, _site: Site, _date: chrono::NaiveDate) -> Conditions {
                Conditions { cloud_cover: PercentileBand::P50, image_quality: PercentileBand::P50 }
            }
            async fn wind_forecast(&self, _site: Site, _date: chrono::NaiveDate) -> WindForecast {
                WindForecast { speed_ms: 0.0, direction: Radians(0.0) }
            }
        }
        let mut program = sample_program();
        if let crate::model::Group::Observation { obs, .. } = &mut program.root_group {
            obs.required_resources.insert(Resource("GMOS".into()));
        }
        let (collector, ranker, night_indices) =
            build_collector_and_ranker(program, Arc::new(NoResourceService)).await;
        let selector = Selector::new(collector, ranker);
        let selection = selector.select(&night_indices).await.unwrap();
        let group_info = &selection.values().next().unwrap().group_info;
        assert!(!group_info.night_filtering[&NightIndex(0)]);
        assert!(group_info.schedulable_slot_indices[&NightIndex(0)].is_empty());
    }
}
