//! [`SchedulerBuilder`] (`spec.md` §6): wires a [`Collector`], [`Ranker`],
//! and [`Scheduler`] together from external adapters and raw program
//! records.
//!
//! Grounded on `original_source/scheduler/core/builder/builder.py`:
//! `SchedulerBuilder.build_collector`/`build_selector`/`build_optimizer`
//! become this module's single `build` entry point. The original's
//! `ValidationBuilder.reset_collector_observations` post-processing step is
//! folded into `Collector::ingest`'s `validation_mode` flag instead of a
//! separate sweep, since ingest already walks every observation once
//! (`DESIGN.md`). `SimulationBuilder`/`OperationBuilder` are themselves
//! empty `pass` classes in the original, so `Mode::Simulation` and
//! `Mode::Operation` need nothing mode-specific added here either.

use crate::adapters::{EphemerisService, ProgramProvider, RawProgram, ResourceService, TargetInfoCache};
use crate::collector::Collector;
use crate::model::{NightIndex, Site};
use crate::ranker::{default_band_params, Ranker, RankerParameters};
use crate::scheduler::{Mode, Scheduler};
use std::sync::Arc;

/// Everything needed to build a [`Collector`] (`spec.md` §4.2), held so
/// [`Self::build`] can be called once ingest inputs are ready.
pub struct SchedulerBuilder {
    sites: Vec<Site>,
    start_vis_date: chrono::NaiveDate,
    num_nights: u32,
    time_slot_length: chrono::TimeDelta,
    twilight_bound_deg: f64,
    resource_service: Arc<dyn ResourceService>,
    ephemeris_service: Arc<dyn EphemerisService>,
    target_info_cache: Arc<dyn TargetInfoCache>,
}

impl SchedulerBuilder {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sites: Vec<Site>,
        start_vis_date: chrono::NaiveDate,
        num_nights: u32,
        time_slot_length: chrono::TimeDelta,
        twilight_bound_deg: f64,
        resource_service: Arc<dyn ResourceService>,
        ephemeris_service: Arc<dyn EphemerisService>,
        target_info_cache: Arc<dyn TargetInfoCache>,
    ) -> Self {
        Self {
            sites,
            start_vis_date,
            num_nights,
            time_slot_length,
            twilight_bound_deg,
            resource_service,
            ephemeris_service,
            target_info_cache,
        }
    }

    fn build_collector(&self) -> Collector {
        Collector::new(
            self.sites.clone(),
            self.start_vis_date,
            self.num_nights,
            self.time_slot_length,
            self.twilight_bound_deg,
            self.resource_service.clone(),
            self.ephemeris_service.clone(),
            self.target_info_cache.clone(),
        )
    }

    /// Builds the full pipeline for `mode`: a [`Collector`] that ingests
    /// `raw` via `provider` (resetting `ONGOING`/`OBSERVED` statuses and
    /// used times to zero when `mode == Mode::Validation`), a [`Ranker`]
    /// scoring every program over `[0, num_nights)`, and the resulting
    /// [`Scheduler`].
    pub async fn build(
        &self,
        mode: Mode,
        raw: Vec<RawProgram>,
        provider: &dyn ProgramProvider,
        ranker_params: RankerParameters,
    ) -> Scheduler {
        let collector = Arc::new(self.build_collector());
        collector.ingest(raw, provider, mode == Mode::Validation).await;

        let night_indices: Vec<NightIndex> = (0..self.num_nights).map(NightIndex).collect();
        let ranker = Arc::new(
            Ranker::build(collector.clone(), night_indices, self.sites.clone(), ranker_params, default_band_params()).await,
        );

        Scheduler::new(collector, ranker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EngTask, Fault, InMemoryTargetInfoCache, NightConfiguration, ProgramFilter};
    use crate::model::{
        Atom, Band, Conditions, Constraints, ElevationType, Group, ObsClass, Observation, ObservationID,
        ObservationStatus, PercentileBand, Program, ProgramID, Radians, Semester, SiderealTarget, Target,
        UniqueGroupID, WindForecast,
    };
    use std::collections::HashSet;

    struct AllowAllFilter;
    impl ProgramFilter for AllowAllFilter {
        fn program_filter(&self, _program: &Program) -> bool { true }
    }

    struct NoopResourceService;
    #[async_trait::async_trait]
    impl ResourceService for NoopResourceService {
        async fn night_configuration(&self, _site: Site, _date: chrono::NaiveDate) -> NightConfiguration {
            NightConfiguration { resources: HashSet::new(), filter: Box::new(AllowAllFilter) }
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
    impl EphemerisService for NoopEphemerisService {
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

    struct StaticProvider(Program);
    #[async_trait::async_trait]
    impl ProgramProvider for StaticProvider {
        async fn parse_program(&self, _raw: &RawProgram) -> Option<Program> { Some(self.0.clone()) }
    }

    fn sample_program() -> Program {
        let obs = Observation {
            id: ObservationID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: "obs1".into() },
            site: Site::GeminiNorth,
            obs_class: ObsClass::Science,
            status: ObservationStatus::Ready,
            constraints: Constraints {
                sky_background: crate::model::SkyBackground::SbAny,
                elevation_type: ElevationType::Airmass,
                elevation_min: 1.0,
                elevation_max: 2.5,
                timing_windows: Vec::new(),
                required_conditions: Conditions { cloud_cover: PercentileBand::P100, image_quality: PercentileBand::P100 },
            },
            acq_overhead: chrono::TimeDelta::minutes(2),
            sequence: vec![Atom::new(chrono::TimeDelta::minutes(15), chrono::TimeDelta::minutes(15), chrono::TimeDelta::zero())],
            base_target: Some(Target::Sidereal(SiderealTarget { ra: Radians(0.0), dec: Radians(0.0), proper_motion: None })),
            required_resources: HashSet::new(),
            too_type: None,
        };
        Program {
            id: ProgramID("GN-2018B-Q-101".into()),
            program_type: "Queue".into(),
            band: Band::Band1,
            thesis: false,
            awarded: chrono::TimeDelta::hours(10),
            used: chrono::TimeDelta::zero(),
            semester: Semester("2018B".into()),
            start: chrono::NaiveDate::from_ymd_opt(2018, 8, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2019, 1, 31).unwrap(),
            b3_min_fraction: 0.0,
            root_group: Group::Observation {
                id: UniqueGroupID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: "obs1".into() },
                obs: Box::new(obs),
            },
        }
    }

    #[tokio::test]
    async fn build_then_run_produces_a_summary_entry_for_the_ingested_program() {
        let builder = SchedulerBuilder::new(
            vec![Site::GeminiNorth],
            chrono::NaiveDate::from_ymd_opt(2018, 10, 1).unwrap(),
            1,
            chrono::TimeDelta::minutes(1),
            12.0,
            Arc::new(NoopResourceService),
            Arc::new(NoopEphemerisService),
            Arc::new(InMemoryTargetInfoCache::default()),
        );

        let scheduler = builder
            .build(Mode::Validation, vec![RawProgram(serde_json::json!({}))], &StaticProvider(sample_program()), RankerParameters::default())
            .await;

        let (_, summary) = scheduler
            .run(
                Mode::Validation,
                chrono::NaiveDate::from_ymd_opt(2018, 10, 1).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2018, 10, 2).unwrap(),
                1,
                &[Site::GeminiNorth],
                None,
            )
            .await
            .unwrap();

        assert!(summary.contains_key("GN-2018B-Q-101"));
    }
}
