//! The semantic data model shared by every component: sites, programs,
//! observations, groups, target info, plans, and the nightly timeline.

pub mod atom;
pub mod conditions;
pub mod config;
pub mod group;
pub mod observation;
pub mod plan;
pub mod program;
pub mod site;
pub mod target;
pub mod target_info;
pub mod timeline;
pub mod units;

pub use atom::{Atom, QAState};
pub use conditions::{Conditions, PercentileBand, WindForecast};
pub use config::SchedulerConfig;
pub use group::{Group, UniqueGroupID};
pub use observation::{
    Constraints, ElevationType, ObsClass, Observation, ObservationID, ObservationStatus, Resource,
    SkyBackground, TimingWindow,
};
pub use plan::{NightStats, Plan, Plans, Visit};
pub use program::{Band, Program, ProgramID, Semester};
pub use site::{Site, SiteLocation};
pub use target::{NonsiderealTarget, ProperMotion, SiderealTarget, Target};
pub use target_info::TargetInfo;
pub use timeline::{NightlyTimeline, TimelineEntry};
pub use units::{time_to_slots, Degrees, HourAngle, NightIndex, Radians, TimeslotIndex};
