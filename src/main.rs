//! Thin CLI entry point: builds a [`night_scheduler::SchedulerBuilder`] from
//! demo adapters, runs one scheduling request, and prints the resulting
//! timeline and per-program completion summary.
//!
//! Real adapters (an HTTP resource service, a live ephemeris source, a
//! persistent target-info cache) are out of scope for this crate
//! (`spec.md` §1) — the stubs below exist only so this binary has something
//! to schedule.

use clap::Parser;
use night_scheduler::adapters::{
    EngTask, EphemerisService, Fault, InMemoryTargetInfoCache, NightConfiguration, ProgramFilter, ProgramProvider,
    RawProgram, ResourceService,
};
use night_scheduler::model::{
    Atom, Band, Conditions, Constraints, ElevationType, Group, ObsClass, Observation, ObservationID,
    ObservationStatus, PercentileBand, Program, ProgramID, Radians, Semester, SiderealTarget, Site, SkyBackground,
    Target, UniqueGroupID, WindForecast,
};
use night_scheduler::ranker::RankerParameters;
use night_scheduler::{Mode, SchedulerBuilder};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(about = "Runs one night-scheduler request over a small demo program set")]
struct Cli {
    /// First night's date (local to the requested sites), e.g. `2018-10-01`.
    #[arg(long, default_value = "2018-10-01")]
    start_vis: chrono::NaiveDate,

    /// Number of consecutive nights to schedule.
    #[arg(long, default_value_t = 1)]
    num_nights: u32,

    /// Time slot length in minutes.
    #[arg(long, default_value_t = 1)]
    slot_minutes: i64,

    /// Run mode: validation, simulation, or operation.
    #[arg(long, default_value = "validation")]
    mode: String,
}

fn parse_mode(s: &str) -> Mode {
    match s.to_ascii_lowercase().as_str() {
        "simulation" => Mode::Simulation,
        "operation" => Mode::Operation,
        _ => Mode::Validation,
    }
}

struct AllowAllFilter;
impl ProgramFilter for AllowAllFilter {
    fn program_filter(&self, _program: &Program) -> bool { true }
}

/// Reports a clear, unconstrained night at every site: no faults, no
/// engineering tasks, best-case conditions and still air.
struct DemoResourceService;

#[async_trait::async_trait]
impl ResourceService for DemoResourceService {
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

/// No nonsidereal targets in the demo program set, so this never needs to
/// answer with real positions.
struct DemoEphemerisService;

#[async_trait::async_trait]
impl EphemerisService for DemoEphemerisService {
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

/// Hands the demo program set straight through, bypassing the opaque
/// `RawProgram` JSON entirely: `raw.0` is just an index into it.
struct DemoProvider(Vec<Program>);

#[async_trait::async_trait]
impl ProgramProvider for DemoProvider {
    async fn parse_program(&self, raw: &RawProgram) -> Option<Program> {
        let idx = usize::try_from(raw.0.as_u64()?).ok()?;
        self.0.get(idx).cloned()
    }
}

fn demo_observation(local_id: &str, band_minutes: i64) -> Observation {
    Observation {
        id: ObservationID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: local_id.into() },
        site: Site::GeminiNorth,
        obs_class: ObsClass::Science,
        status: ObservationStatus::Ready,
        constraints: Constraints {
            sky_background: SkyBackground::SbAny,
            elevation_type: ElevationType::Airmass,
            elevation_min: 1.0,
            elevation_max: 2.5,
            timing_windows: Vec::new(),
            required_conditions: Conditions { cloud_cover: PercentileBand::P100, image_quality: PercentileBand::P100 },
        },
        acq_overhead: chrono::TimeDelta::minutes(2),
        sequence: vec![Atom::new(
            chrono::TimeDelta::minutes(band_minutes),
            chrono::TimeDelta::minutes(band_minutes),
            chrono::TimeDelta::zero(),
        )],
        base_target: Some(Target::Sidereal(SiderealTarget { ra: Radians(0.9), dec: Radians(0.3), proper_motion: None })),
        required_resources: HashSet::new(),
        too_type: None,
    }
}

/// A single hardcoded demo program: just enough to exercise the full
/// `Collector -> Ranker -> Selector -> Optimizer -> Scheduler` pipeline end
/// to end.
fn demo_program() -> Program {
    let obs = demo_observation("demo-obs", 20);
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
        b3_min_fraction: 0.8,
        root_group: Group::Observation {
            id: UniqueGroupID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: "demo-obs".into() },
            obs: Box::new(obs),
        },
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let mode = parse_mode(&cli.mode);

    let builder = SchedulerBuilder::new(
        vec![Site::GeminiNorth],
        cli.start_vis,
        cli.num_nights,
        chrono::TimeDelta::minutes(cli.slot_minutes),
        12.0,
        Arc::new(DemoResourceService),
        Arc::new(DemoEphemerisService),
        Arc::new(InMemoryTargetInfoCache::default()),
    );

    let programs = vec![demo_program()];
    let raw: Vec<RawProgram> = (0..programs.len()).map(|i| RawProgram(serde_json::json!(i))).collect();
    let scheduler = builder.build(mode, raw, &DemoProvider(programs), RankerParameters::default()).await;

    let end_vis = cli.start_vis + chrono::Days::new(u64::from(cli.num_nights));
    match scheduler.run(mode, cli.start_vis, end_vis, cli.num_nights, &[Site::GeminiNorth], None).await {
        Ok((timeline, summary)) => {
            println!("{}", serde_json::to_string_pretty(&timeline.to_json()).expect("timeline json"));
            for (program_id, (completion, score)) in summary {
                println!("{program_id}: {completion} complete, cumulative score {score:.2}");
            }
        }
        Err(err) => log::error!("scheduler run failed: {err}"),
    }
}
