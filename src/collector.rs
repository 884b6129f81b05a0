//! [`Collector`] (`spec.md` §4.2): program ingest and per-`(observation,
//! night)` [`TargetInfo`] computation.

use crate::adapters::{target_info_cache_key, EphemerisService, ProgramProvider, RawProgram, ResourceService, TargetInfoCache};
use crate::error::CollectorError;
use crate::ephemeris;
use crate::model::{
    ElevationType, NightIndex, Program, ProgramID, Radians, Site, SkyBackground, Target, TargetInfo,
    TimeslotIndex,
};
use crate::night_events::NightEventsManager;
use bitvec::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    pub programs_accepted: u32,
    pub programs_rejected: u32,
    pub observations_rejected_site: u32,
}

/// Owns all programs, observations, and cached [`TargetInfo`] for one
/// scheduling job (`spec.md` §9: re-modeled as an explicit value owned by
/// one job, replacing the original's process-wide globals).
pub struct Collector {
    pub sites: Vec<Site>,
    pub start_vis_date: chrono::NaiveDate,
    pub num_nights: u32,
    pub time_slot_length: chrono::TimeDelta,
    pub twilight_bound_deg: f64,

    pub night_events: Arc<NightEventsManager>,
    pub resource_service: Arc<dyn ResourceService>,
    ephemeris_service: Arc<dyn EphemerisService>,
    target_info_cache: Arc<dyn TargetInfoCache>,

    programs: RwLock<HashMap<ProgramID, Program>>,
    target_info: RwLock<HashMap<(String, u32), Arc<TargetInfo>>>,
    stats: RwLock<CollectorStats>,
}

impl Collector {
    #[must_use]
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
            night_events: Arc::new(NightEventsManager::new()),
            resource_service,
            ephemeris_service,
            target_info_cache,
            programs: RwLock::new(HashMap::new()),
            target_info: RwLock::new(HashMap::new()),
            stats: RwLock::new(CollectorStats::default()),
        }
    }

    #[must_use]
    pub fn date_for_night(&self, night: NightIndex) -> chrono::NaiveDate {
        self.start_vis_date + chrono::TimeDelta::days(i64::from(night.0))
    }

    #[must_use]
    pub fn stats(&self) -> CollectorStats { self.stats.read().expect("lock poisoned").clone() }

    #[must_use]
    pub fn program(&self, id: &ProgramID) -> Option<Program> {
        self.programs.read().expect("lock poisoned").get(id).cloned()
    }

    #[must_use]
    pub fn program_ids(&self) -> Vec<ProgramID> {
        self.programs.read().expect("lock poisoned").keys().cloned().collect()
    }

    /// Writes back a program mutated by [`crate::accounting`] after a
    /// night's plan is charged.
    pub fn update_program(&self, program: Program) {
        self.programs.write().expect("lock poisoned").insert(program.id.clone(), program);
    }

    /// Consumes raw program records, parsing and validating each
    /// (`spec.md` §4.2). Rejects programs with no resolvable semester, no
    /// type, zero awarded time, or an empty root group. Retains only
    /// observations whose site is in `self.sites`. On duplicate
    /// `ProgramID`, later wins with a `log::warn!`.
    ///
    /// `validation_mode` resets observation statuses/used-times on ingest
    /// per `spec.md` §6.
    pub async fn ingest(&self, raw: Vec<RawProgram>, provider: &dyn ProgramProvider, validation_mode: bool) {
        let mut programs = self.programs.write().expect("lock poisoned");
        let mut stats = self.stats.write().expect("lock poisoned");
        for record in raw {
            let Some(mut program) = provider.parse_program(&record).await else {
                stats.programs_rejected += 1;
                log::warn!("program record skipped: parse_program returned None");
                continue;
            };
            if let Err(e) = Self::validate_program(&program) {
                stats.programs_rejected += 1;
                log::warn!("program {} rejected: {e}", program.id);
                continue;
            }

            Self::retain_observations_in_sites(&mut program, &self.sites, &mut stats);

            if validation_mode {
                Self::reset_for_validation(&mut program);
            }

            if programs.contains_key(&program.id) {
                log::warn!("duplicate program id {}, later ingest wins", program.id);
            }
            stats.programs_accepted += 1;
            programs.insert(program.id.clone(), program);
        }
    }

    fn validate_program(program: &Program) -> Result<(), CollectorError> {
        if program.semester.0.trim().is_empty() {
            return Err(CollectorError::InvalidInput("no resolvable semester".into()));
        }
        if program.program_type.trim().is_empty() {
            return Err(CollectorError::InvalidInput("no program type".into()));
        }
        if program.awarded <= chrono::TimeDelta::zero() {
            return Err(CollectorError::InvalidInput("zero awarded time".into()));
        }
        if program.root_group.observations().is_empty() {
            return Err(CollectorError::InvalidInput("empty root group".into()));
        }
        Ok(())
    }

    fn retain_observations_in_sites(program: &mut Program, sites: &[Site], stats: &mut CollectorStats) {
        fn prune(group: &mut crate::model::Group, sites: &[Site], stats: &mut CollectorStats) -> bool {
            match group {
                crate::model::Group::Observation { obs, .. } => {
                    if sites.contains(&obs.site) {
                        true
                    } else {
                        stats.observations_rejected_site += 1;
                        false
                    }
                }
                crate::model::Group::And { children, .. } | crate::model::Group::Or { children, .. } => {
                    children.retain_mut(|c| prune(c, sites, stats));
                    !children.is_empty()
                }
            }
        }
        prune(&mut program.root_group, sites, stats);
    }

    fn reset_for_validation(program: &mut Program) {
        program.used = chrono::TimeDelta::zero();
        fn walk(group: &mut crate::model::Group) {
            match group {
                crate::model::Group::Observation { obs, .. } => obs.reset_for_validation(),
                crate::model::Group::And { children, .. } | crate::model::Group::Or { children, .. } => {
                    children.iter_mut().for_each(walk);
                }
            }
        }
        walk(&mut program.root_group);
    }

    /// Returns the cached `TargetInfo` for `(obs, night)`, computing and
    /// persisting it if absent. The external cache is checked first
    /// (`spec.md` §4.2); a cache miss or deserialization failure is
    /// `Transient` and silently recomputes (`spec.md` §7).
    pub async fn get_or_compute_target_info(
        &self,
        program: &Program,
        obs_id_str: &str,
        site: Site,
        base_target: &Target,
        constraints: &crate::model::Constraints,
        required_resources: &std::collections::HashSet<crate::model::Resource>,
        night: NightIndex,
    ) -> Arc<TargetInfo> {
        let local_key = (obs_id_str.to_string(), night.0);
        if let Some(hit) = self.target_info.read().expect("lock poisoned").get(&local_key) {
            return hit.clone();
        }

        let night_events = self.night_events.get_or_compute(
            site,
            self.date_for_night(night),
            self.time_slot_length,
            self.twilight_bound_deg,
        );

        let cache_key =
            target_info_cache_key(obs_id_str, ephemeris::julian_date(night_events.times[0]), self.time_slot_length.num_minutes());
        if let Some(bytes) = self.target_info_cache.get(&cache_key).await {
            let config = bincode::config::standard();
            if let Ok((ti, _)) = bincode::serde::decode_from_slice::<TargetInfo, _>(&bytes, config) {
                let arc = Arc::new(ti);
                self.target_info.write().expect("lock poisoned").insert(local_key, arc.clone());
                return arc;
            }
            log::debug!("target info cache deserialization failed for {cache_key}, recomputing");
        }

        let night_config = self.resource_service.night_configuration(site, self.date_for_night(night)).await;
        let resources_ok = required_resources.is_subset(&night_config.resources);
        let schedulable = night_config.filter.program_filter(program);

        let resolved_target = self.resolve_target(base_target, obs_id_str, night, &night_events).await;

        let ti = self.compute_target_info(
            &night_events,
            site,
            &resolved_target,
            constraints,
            resources_ok,
            schedulable,
            program.start,
            program.end,
        );

        if let Ok(bytes) = bincode::serde::encode_to_vec(&ti, bincode::config::standard()) {
            self.target_info_cache.set(&cache_key, bytes).await;
        }

        let arc = Arc::new(ti);
        self.target_info.write().expect("lock poisoned").insert(local_key, arc.clone());
        arc
    }

    /// For a nonsidereal target with no ephemeris samples yet loaded,
    /// fetches one sample per slot from the external ephemeris service
    /// (`spec.md` §6) and builds the resolved [`Target`]. Sidereal targets
    /// and already-populated nonsidereal targets pass through unchanged.
    async fn resolve_target(
        &self,
        base_target: &Target,
        obs_id_str: &str,
        night: NightIndex,
        night_events: &crate::night_events::NightEvents,
    ) -> Target {
        let Target::Nonsidereal(ns) = base_target else {
            return base_target.clone();
        };
        if !ns.jd.is_empty() {
            return base_target.clone();
        }
        let num_slots = u32::try_from(night_events.num_slots()).unwrap_or(u32::MAX);
        let positions = self
            .ephemeris_service
            .positions(obs_id_str, self.date_for_night(night), num_slots, self.time_slot_length)
            .await;
        let jds = night_events.times.iter().map(|t| ephemeris::julian_date(*t)).collect();
        Target::Nonsidereal(crate::adapters::nonsidereal_from_ephemeris(jds, positions))
    }

    /// Computes the per-slot geometry/feasibility arrays for one
    /// `(obs, night)` (`spec.md` §4.2 steps 1-9). `rem_visibility_time` /
    /// `rem_visibility_frac` are NOT filled here — they require the
    /// reverse-chronological accumulation across nights, done by
    /// [`Self::compute_target_info_series`].
    fn compute_target_info(
        &self,
        night_events: &crate::night_events::NightEvents,
        site: Site,
        base_target: &Target,
        constraints: &crate::model::Constraints,
        resources_ok: bool,
        schedulable: bool,
        program_start: chrono::NaiveDate,
        program_end: chrono::NaiveDate,
    ) -> TargetInfo {
        let location = site.location();
        let n = night_events.num_slots();
        let mut alt = Vec::with_capacity(n);
        let mut az = Vec::with_capacity(n);
        let mut hourangle = Vec::with_capacity(n);
        let mut airmass = Vec::with_capacity(n);
        let mut sky_brightness = Vec::with_capacity(n);
        let mut filter: BitVec<u8, Lsb0> = BitVec::repeat(false, n);

        let wants_sb = constraints.sky_background != SkyBackground::SbAny;

        for slot in 0..n {
            let t = night_events.times[slot];
            let jd = ephemeris::julian_date(t);
            let (ra, dec) = match base_target {
                Target::Sidereal(s) => s.coords_at(jd),
                Target::Nonsidereal(ns) => ns.coords_at(jd),
            };
            let lst = night_events.local_sidereal_times[slot];
            let ha = crate::sky::hour_angle(lst, ra);
            let (slot_alt, slot_az, _par) = crate::sky::alt_az_parallactic(dec, ha, location.latitude);
            let slot_airmass = crate::sky::airmass(slot_alt);

            let slot_sb = if wants_sb {
                let brightness = crate::sky::sky_brightness(
                    night_events.sun_alt[slot],
                    night_events.moon_alt[slot],
                    crate::sky::angular_separation(ra, dec, night_events.moon_ra[slot], night_events.moon_dec[slot]),
                    night_events.moon_dist_illum[slot],
                );
                crate::sky::brightness_to_band(brightness)
            } else {
                SkyBackground::SbAny
            };

            let targ_prop = match constraints.elevation_type {
                ElevationType::HourAngle => ha.0.to_degrees() / 15.0,
                ElevationType::Airmass | ElevationType::None => slot_airmass,
            };

            let sun_down = night_events.sun_alt_indices.binary_search(&slot).is_ok();
            let sb_ok = !wants_sb || slot_sb <= constraints.sky_background;
            let elev_ok = targ_prop >= constraints.elevation_min && targ_prop <= constraints.elevation_max;

            let visible = sun_down && sb_ok && resources_ok && schedulable && elev_ok;
            filter.set(slot, visible);

            alt.push(slot_alt);
            az.push(slot_az);
            hourangle.push(ha.0.to_degrees() / 15.0);
            airmass.push(slot_airmass);
            sky_brightness.push(slot_sb);
        }

        // Intersect with timing windows (spec.md §4.2 step 9): if none are
        // declared, the entire program [start, end] is the one implicit
        // window.
        for slot in 0..n {
            if filter[slot] {
                let t = night_events.times[slot];
                let in_window = if constraints.timing_windows.is_empty() {
                    let d = t.date_naive();
                    d >= program_start && d <= program_end
                } else {
                    constraints.timing_windows.iter().any(|w| w.contains(t))
                };
                filter.set(slot, in_window);
            }
        }

        let mut ti = TargetInfo {
            alt,
            az,
            hourangle,
            airmass,
            sky_brightness,
            visibility_slot_idx: Vec::new(),
            visibility_slot_filter: filter,
            visibility_time: chrono::TimeDelta::zero(),
            rem_visibility_time: chrono::TimeDelta::zero(),
            rem_visibility_frac: 0.0,
        };
        ti.sync_visibility_idx();
        ti.visibility_time = self.time_slot_length * i32::try_from(ti.visibility_slot_idx.len()).unwrap_or(i32::MAX);
        ti
    }

    /// Computes `TargetInfo` for every night in `[0, num_nights)` for one
    /// observation, in reverse night order, so `rem_visibility_time` can be
    /// accumulated as a running sum (`spec.md` §4.2 step 10).
    #[allow(clippy::too_many_arguments)]
    pub async fn compute_target_info_series(
        &self,
        program: &Program,
        obs_id_str: &str,
        site: Site,
        base_target: &Target,
        constraints: &crate::model::Constraints,
        required_resources: &std::collections::HashSet<crate::model::Resource>,
        remaining_exec_time: chrono::TimeDelta,
    ) -> Vec<Arc<TargetInfo>> {
        let mut series = Vec::with_capacity(self.num_nights as usize);
        let mut running = chrono::TimeDelta::zero();

        for n in (0..self.num_nights).rev() {
            let night = NightIndex(n);
            let ti = self
                .get_or_compute_target_info(program, obs_id_str, site, base_target, constraints, required_resources, night)
                .await;
            // `get_or_compute_target_info` may return a cached value whose
            // rem_visibility_time was already finalized; to keep the
            // accumulation correct we always derive a fresh owned copy here.
            let mut owned = (*ti).clone();
            running += owned.visibility_time;
            owned.rem_visibility_time = running;
            owned.rem_visibility_frac = if running > chrono::TimeDelta::zero() {
                (remaining_exec_time.num_seconds() as f64 / running.num_seconds() as f64).max(0.0)
            } else {
                0.0
            };
            series.push(Arc::new(owned));
        }
        series.reverse();
        series
    }

    #[must_use]
    pub fn visibility_slot_idx_for(ti: &TargetInfo) -> &[TimeslotIndex] { &ti.visibility_slot_idx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EngTask, Fault, InMemoryTargetInfoCache, NightConfiguration, ProgramFilter};
    use crate::model::{Band, Conditions, Constraints, PercentileBand, Program, ProgramID, Semester, WindForecast};
    use std::collections::HashSet;

    struct AllowAllFilter;
    impl ProgramFilter for AllowAllFilter {
        fn program_filter(&self, _program: &Program) -> bool { true }
    }

    struct FakeResourceService;
    #[async_trait::async_trait]
    impl ResourceService for FakeResourceService {
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

    struct FakeEphemerisService;
    #[async_trait::async_trait]
    impl EphemerisService for FakeEphemerisService {
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

    fn make_collector() -> Collector {
        Collector::new(
            vec![Site::GeminiNorth],
            chrono::NaiveDate::from_ymd_opt(2018, 10, 1).unwrap(),
            1,
            chrono::TimeDelta::minutes(1),
            12.0,
            Arc::new(FakeResourceService),
            Arc::new(FakeEphemerisService),
            Arc::new(InMemoryTargetInfoCache::default()),
        )
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
            root_group: crate::model::group::Group::Observation {
                id: crate::model::UniqueGroupID {
                    program_id: ProgramID("GN-2018B-Q-101".into()),
                    local_id: "obs1".into(),
                },
                obs: Box::new(crate::model::observation::tests::sample_observation()),
            },
        }
    }

    #[tokio::test]
    async fn program_with_zero_awarded_is_rejected() {
        let mut p = sample_program();
        p.awarded = chrono::TimeDelta::zero();
        assert!(Collector::validate_program(&p).is_err());
    }

    #[tokio::test]
    async fn program_with_empty_semester_is_rejected() {
        let mut p = sample_program();
        p.semester = Semester(String::new());
        assert!(Collector::validate_program(&p).is_err());
    }

    #[tokio::test]
    async fn valid_program_passes_validation() {
        let p = sample_program();
        assert!(Collector::validate_program(&p).is_ok());
    }

    #[tokio::test]
    async fn visibility_slots_all_fall_within_sun_down_window() {
        let collector = make_collector();
        let program = sample_program();
        let obs = &crate::model::observation::tests::sample_observation();
        let ti = collector
            .get_or_compute_target_info(
                &program,
                &obs.id.to_string(),
                Site::GeminiNorth,
                obs.base_target.as_ref().unwrap(),
                &obs.constraints,
                &obs.required_resources,
                NightIndex(0),
            )
            .await;
        let night_events = collector.night_events.get_or_compute(
            Site::GeminiNorth,
            collector.date_for_night(NightIndex(0)),
            collector.time_slot_length,
            collector.twilight_bound_deg,
        );
        for idx in &ti.visibility_slot_idx {
            assert!(night_events.sun_alt_indices.binary_search(&idx.as_usize()).is_ok());
        }
        assert!(ti.visibility_consistent());
    }

    #[tokio::test]
    async fn rem_visibility_time_accumulates_in_reverse() {
        let collector = Collector::new(
            vec![Site::GeminiNorth],
            chrono::NaiveDate::from_ymd_opt(2018, 10, 1).unwrap(),
            3,
            chrono::TimeDelta::minutes(1),
            12.0,
            Arc::new(FakeResourceService),
            Arc::new(FakeEphemerisService),
            Arc::new(InMemoryTargetInfoCache::default()),
        );
        let program = sample_program();
        let obs = crate::model::observation::tests::sample_observation();
        let series = collector
            .compute_target_info_series(
                &program,
                &obs.id.to_string(),
                Site::GeminiNorth,
                obs.base_target.as_ref().unwrap(),
                &obs.constraints,
                &obs.required_resources,
                chrono::TimeDelta::minutes(30),
            )
            .await;
        assert_eq!(series.len(), 3);
        for n in 0..2 {
            let expected = series[n].visibility_time + series[n + 1].rem_visibility_time;
            assert_eq!(series[n].rem_visibility_time, expected);
        }
        assert_eq!(
            series[2].rem_visibility_time,
            series[2].visibility_time
        );
    }
}
