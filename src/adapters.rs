//! Adapter traits for the external collaborators named in `spec.md` §6.
//! The core only depends on these traits; concrete implementations (a
//! JSON file reader, an HTTP resource service, a Redis-backed cache, ...)
//! are out of scope per `spec.md` §1.

use crate::model::{Conditions, NonsiderealTarget, Program, Radians, Resource, Site, WindForecast};
use std::collections::HashSet;

/// Opaque raw program record handed to [`ProgramProvider::parse_program`];
/// the raw format is opaque to the core (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct RawProgram(pub serde_json::Value);

/// Parses raw program records into [`Program`]s. A `None` return signals a
/// record to skip (logged at `warn`, counted, not fatal).
#[async_trait::async_trait]
pub trait ProgramProvider: Send + Sync {
    async fn parse_program(&self, raw: &RawProgram) -> Option<Program>;
}

/// A scheduling filter over programs, e.g. a block schedule.
pub trait ProgramFilter: Send + Sync {
    fn program_filter(&self, program: &Program) -> bool;
}

/// A resource-blocking fault window (`spec.md` §4.6).
#[derive(Debug, Clone)]
pub struct Fault {
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub affects: HashSet<Resource>,
}

/// A scheduled engineering blockage (`spec.md` §4.6).
#[derive(Debug, Clone)]
pub struct EngTask {
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub affects: HashSet<Resource>,
}

/// Per-(site, date) resources, scheduling filter, and interior-event
/// sources.
pub struct NightConfiguration {
    pub resources: HashSet<Resource>,
    pub filter: Box<dyn ProgramFilter>,
}

/// Night configuration and conditions/wind forecast for one (site, date).
#[async_trait::async_trait]
pub trait ResourceService: Send + Sync {
    async fn night_configuration(&self, site: Site, date: chrono::NaiveDate) -> NightConfiguration;
    async fn get_faults(&self, site: Site, date: chrono::NaiveDate) -> Vec<Fault>;
    async fn get_eng_tasks(&self, site: Site, date: chrono::NaiveDate) -> Vec<EngTask>;
    /// Mid-night conditions updates, timestamped (`spec.md` §4.6's
    /// `WeatherChange` event); empty when the night's conditions never
    /// change from [`Self::conditions_forecast`]'s single per-night value.
    async fn weather_changes(&self, site: Site, date: chrono::NaiveDate) -> Vec<(chrono::DateTime<chrono::Utc>, Conditions)>;
    async fn conditions_forecast(&self, site: Site, date: chrono::NaiveDate) -> Conditions;
    async fn wind_forecast(&self, site: Site, date: chrono::NaiveDate) -> WindForecast;
}

/// Ephemeris positions for nonsidereal targets.
#[async_trait::async_trait]
pub trait EphemerisService: Send + Sync {
    async fn positions(
        &self,
        target_name: &str,
        date: chrono::NaiveDate,
        num_slots: u32,
        slot_length: chrono::TimeDelta,
    ) -> Vec<(Radians, Radians)>;
}

/// Alias kept for exposition: a `NonsiderealTarget` built from an
/// [`EphemerisService`] response.
#[must_use]
pub fn nonsidereal_from_ephemeris(
    jds: Vec<f64>,
    positions: Vec<(Radians, Radians)>,
) -> NonsiderealTarget {
    let (ra, dec) = positions.into_iter().unzip();
    NonsiderealTarget { jd: jds, ra, dec }
}

/// String-keyed get/set of serialized [`crate::model::TargetInfo`]. Keys
/// are `"{obs_id}{jd}{slot_length_minutes}"` (`spec.md` §6). Cache-miss or
/// deserialization failure is a `Transient` error per `spec.md` §7: the
/// caller recomputes silently rather than propagating.
#[async_trait::async_trait]
pub trait TargetInfoCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>);
}

/// Builds the `"{obs_id}{jd}{slot_length_minutes}"` cache key.
#[must_use]
pub fn target_info_cache_key(obs_id: &str, jd: f64, slot_length_minutes: i64) -> String {
    format!("{obs_id}{jd}{slot_length_minutes}")
}

/// An in-memory [`TargetInfoCache`] for tests and small deployments.
#[derive(Debug, Default)]
pub struct InMemoryTargetInfoCache {
    inner: tokio::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>,
}

#[async_trait::async_trait]
impl TargetInfoCache for InMemoryTargetInfoCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> { self.inner.read().await.get(key).cloned() }

    async fn set(&self, key: &str, value: Vec<u8>) {
        self.inner.write().await.insert(key.to_string(), value);
    }
}
