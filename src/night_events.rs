//! `NightEvents` cache (`spec.md` §4.1): per-(site, date, slot_length)
//! sun/moon geometry, sidereal times, and twilight slot bounds. The cache
//! is process-wide and write-once-per-key (`spec.md` §5) — two workers
//! computing the same key must get byte-identical arrays, since the
//! inputs are deterministic.

use crate::ephemeris;
use crate::model::{Radians, Site};
use crate::sky;
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-slot geometry for one night at one site.
#[derive(Debug, Clone)]
pub struct NightEvents {
    pub times: Vec<chrono::DateTime<chrono::Utc>>,
    pub local_sidereal_times: Vec<Radians>,
    pub sun_alt: Vec<Radians>,
    pub moon_alt: Vec<Radians>,
    pub moon_ra: Vec<Radians>,
    pub moon_dec: Vec<Radians>,
    pub moon_dist_illum: Vec<f64>,
    pub sun_moon_ang: Vec<Radians>,
    /// Slots where the sun is at or below 12 degrees below horizon.
    pub sun_alt_indices: Vec<usize>,
}

const TWILIGHT_SEARCH_STEP_MIN: i64 = 1;
const TWILIGHT_SEARCH_WINDOW_HOURS: i64 = 14;

impl NightEvents {
    /// Computes the night's per-slot arrays anchored to evening twilight
    /// and spaced by `slot_length` (`spec.md` §4.1).
    #[must_use]
    pub fn compute(site: Site, date: chrono::NaiveDate, slot_length: chrono::TimeDelta, twilight_bound_deg: f64) -> Self {
        let location = site.location();
        let noon_utc = date.and_hms_opt(12, 0, 0).expect("valid time").and_utc();

        let evening_twilight = Self::find_twilight(noon_utc, location.latitude, location.longitude, twilight_bound_deg, true);
        let morning_twilight = Self::find_twilight(noon_utc, location.latitude, location.longitude, twilight_bound_deg, false);

        let num_slots = crate::model::time_to_slots(slot_length, morning_twilight - evening_twilight);

        let mut times = Vec::with_capacity(num_slots as usize);
        let mut local_sidereal_times = Vec::with_capacity(num_slots as usize);
        let mut sun_alt = Vec::with_capacity(num_slots as usize);
        let mut moon_alt = Vec::with_capacity(num_slots as usize);
        let mut moon_ra = Vec::with_capacity(num_slots as usize);
        let mut moon_dec = Vec::with_capacity(num_slots as usize);
        let mut moon_dist_illum = Vec::with_capacity(num_slots as usize);
        let mut sun_moon_ang = Vec::with_capacity(num_slots as usize);
        let mut sun_alt_indices = Vec::new();

        for slot in 0..num_slots {
            let t = evening_twilight + slot_length * i32::try_from(slot).unwrap_or(i32::MAX);
            let jd = ephemeris::julian_date(t);
            let lst = ephemeris::local_sidereal_time(jd, location.longitude);

            let (sun_ra, sun_dec) = ephemeris::sun_position(jd);
            let sun_ha = sky::hour_angle(lst, sun_ra);
            let (s_alt, _, _) = sky::alt_az_parallactic(sun_dec, sun_ha, location.latitude);

            let (m_ra, m_dec, illum) = ephemeris::moon_position(jd);
            let moon_ha = sky::hour_angle(lst, m_ra);
            let (m_alt, _, _) = sky::alt_az_parallactic(m_dec, moon_ha, location.latitude);

            let sep = sky::angular_separation(sun_ra, sun_dec, m_ra, m_dec);

            if s_alt.to_degrees().0 <= -twilight_bound_deg {
                sun_alt_indices.push(slot as usize);
            }

            times.push(t);
            local_sidereal_times.push(lst);
            sun_alt.push(s_alt);
            moon_alt.push(m_alt);
            moon_ra.push(m_ra);
            moon_dec.push(m_dec);
            moon_dist_illum.push(illum);
            sun_moon_ang.push(sep);
        }

        Self {
            times,
            local_sidereal_times,
            sun_alt,
            moon_alt,
            moon_ra,
            moon_dec,
            moon_dist_illum,
            sun_moon_ang,
            sun_alt_indices,
        }
    }

    #[must_use]
    pub fn num_slots(&self) -> usize { self.times.len() }

    /// Bisects for the instant the sun crosses `-twilight_bound_deg`,
    /// searching from local noon forward (morning=false gives the evening
    /// crossing going into the night; morning=true gives the morning
    /// crossing out of it).
    fn find_twilight(
        noon_utc: chrono::DateTime<chrono::Utc>,
        lat: Radians,
        lon: Radians,
        bound_deg: f64,
        evening: bool,
    ) -> chrono::DateTime<chrono::Utc> {
        let step = chrono::TimeDelta::minutes(TWILIGHT_SEARCH_STEP_MIN);
        let mut t = noon_utc;
        let end = noon_utc + chrono::TimeDelta::hours(TWILIGHT_SEARCH_WINDOW_HOURS);
        let mut last_alt = Self::sun_alt_at(t, lat, lon);
        let mut crossing = None;
        while t < end {
            let next_t = t + step;
            let next_alt = Self::sun_alt_at(next_t, lat, lon);
            let threshold = -bound_deg;
            if evening && last_alt > threshold && next_alt <= threshold {
                crossing = Some(next_t);
                break;
            }
            if !evening && last_alt <= threshold && next_alt > threshold {
                crossing = Some(next_t);
                break;
            }
            t = next_t;
            last_alt = next_alt;
        }
        crossing.unwrap_or(if evening { noon_utc + chrono::TimeDelta::hours(7) } else { noon_utc + chrono::TimeDelta::hours(13) })
    }

    fn sun_alt_at(t: chrono::DateTime<chrono::Utc>, lat: Radians, lon: Radians) -> f64 {
        let jd = ephemeris::julian_date(t);
        let lst = ephemeris::local_sidereal_time(jd, lon);
        let (sun_ra, sun_dec) = ephemeris::sun_position(jd);
        let ha = sky::hour_angle(lst, sun_ra);
        let (alt, _, _) = sky::alt_az_parallactic(sun_dec, ha, lat);
        alt.to_degrees().0
    }
}

/// Cache key: `(site, date, slot_length)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    site: Site,
    date: chrono::NaiveDate,
    slot_length_ms: i64,
}

/// Process-wide memoizing cache of [`NightEvents`]. Entries are never
/// invalidated within a scheduling request (`spec.md` §4.1); concurrent
/// writers of the same key must (and do, since the computation is pure)
/// produce identical payloads, so last-writer-wins on a race is safe
/// (`spec.md` §5).
#[derive(Debug, Default)]
pub struct NightEventsManager {
    cache: RwLock<HashMap<CacheKey, std::sync::Arc<NightEvents>>>,
}

impl NightEventsManager {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn get_or_compute(
        &self,
        site: Site,
        date: chrono::NaiveDate,
        slot_length: chrono::TimeDelta,
        twilight_bound_deg: f64,
    ) -> std::sync::Arc<NightEvents> {
        let key = CacheKey { site, date, slot_length_ms: slot_length.num_milliseconds() };
        if let Some(hit) = self.cache.read().expect("cache lock poisoned").get(&key) {
            return hit.clone();
        }
        let computed = std::sync::Arc::new(NightEvents::compute(site, date, slot_length, twilight_bound_deg));
        self.cache.write().expect("cache lock poisoned").insert(key, computed.clone());
        computed
    }
}
