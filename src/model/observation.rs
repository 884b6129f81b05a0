//! [`Observation`]: site, constraints, sequence of [`Atom`]s, and status.

use super::atom::Atom;
use super::program::ProgramID;
use super::site::Site;
use super::target::Target;
use std::collections::HashSet;
use std::fmt;

/// Lifecycle status of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ObservationStatus {
    New,
    Ready,
    Ongoing,
    Observed,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ObsClass {
    Science,
    ProgramCal,
    PartnerCal,
    Acq,
    AcqCal,
    Daytime,
}

/// Type of elevation constraint applied to a slot's `targ_prop` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, Default)]
pub enum ElevationType {
    #[default]
    None,
    HourAngle,
    Airmass,
}

/// Sky-background band, ordered darkest (best) to brightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum_macros::Display, serde::Serialize, serde::Deserialize)]
pub enum SkyBackground {
    SB20,
    SB50,
    SB80,
    /// No SB constraint: any brightness is acceptable.
    SbAny,
}

/// A named resource required by an observation (instrument, AO system, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource(pub String);

/// A single timing window: `[start, start + duration)`, optionally repeated
/// `repeat` times spaced by `period` (spec.md §4.2 step 9).
#[derive(Debug, Clone, Copy)]
pub struct TimingWindow {
    pub start: chrono::DateTime<chrono::Utc>,
    pub duration: chrono::TimeDelta,
    /// Number of repeats; `1` means "just this one window", matching the
    /// spec's convention that `repeat=2` produces the window plus one echo.
    pub repeat: u32,
    pub period: chrono::TimeDelta,
}

impl TimingWindow {
    /// Expands this window into its `repeat` concrete `[start, end)` copies.
    #[must_use]
    pub fn expand(&self) -> Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
        (0..self.repeat.max(1))
            .map(|n| {
                let start = self.start + self.period * i32::try_from(n).unwrap_or(i32::MAX);
                (start, start + self.duration)
            })
            .collect()
    }

    /// Returns `true` if `at` falls inside any expansion of this window.
    #[must_use]
    pub fn contains(&self, at: chrono::DateTime<chrono::Utc>) -> bool {
        self.expand().into_iter().any(|(s, e)| at >= s && at < e)
    }
}

#[derive(Debug, Clone)]
pub struct Constraints {
    pub sky_background: SkyBackground,
    pub elevation_type: ElevationType,
    pub elevation_min: f64,
    pub elevation_max: f64,
    pub timing_windows: Vec<TimingWindow>,
    /// Cloud cover / image quality requirement, combined up a group tree by
    /// [`crate::selector::Selector`] into `minimum_conditions`.
    pub required_conditions: super::conditions::Conditions,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            sky_background: SkyBackground::SbAny,
            elevation_type: ElevationType::Airmass,
            elevation_min: 1.0,
            elevation_max: 2.3,
            timing_windows: Vec::new(),
            required_conditions: super::conditions::Conditions {
                cloud_cover: super::conditions::PercentileBand::P100,
                image_quality: super::conditions::PercentileBand::P100,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationID {
    pub program_id: ProgramID,
    pub local_id: String,
}

impl fmt::Display for ObservationID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.program_id, self.local_id)
    }
}

#[derive(Debug, Clone)]
pub struct Observation {
    pub id: ObservationID,
    pub site: Site,
    pub obs_class: ObsClass,
    pub status: ObservationStatus,
    pub constraints: Constraints,
    pub acq_overhead: chrono::TimeDelta,
    pub sequence: Vec<Atom>,
    pub base_target: Option<Target>,
    pub required_resources: HashSet<Resource>,
    /// `None` unless this is a target-of-opportunity observation.
    pub too_type: Option<String>,
}

impl Observation {
    /// `sum(atom.exec_time) + acq_overhead`, the invariant from spec.md §3.
    #[must_use]
    pub fn exec_time(&self) -> chrono::TimeDelta {
        self.sequence.iter().fold(self.acq_overhead, |acc, a| acc + a.exec_time)
    }

    /// Time already charged to program + partner accounts across all atoms.
    #[must_use]
    pub fn total_used(&self) -> chrono::TimeDelta {
        self.sequence
            .iter()
            .fold(chrono::TimeDelta::zero(), |acc, a| acc + a.program_used + a.partner_used)
    }

    /// `exec_time() - total_used()`, the remaining execution time fed into
    /// the Ranker's completion-fraction computation.
    #[must_use]
    pub fn remaining_exec_time(&self) -> chrono::TimeDelta { self.exec_time() - self.total_used() }

    /// Resets status `{ONGOING, OBSERVED} -> READY` and zeroes atom
    /// accumulators, per `VALIDATION` mode ingest (spec.md §6).
    pub fn reset_for_validation(&mut self) {
        if matches!(self.status, ObservationStatus::Ongoing | ObservationStatus::Observed) {
            self.status = ObservationStatus::Ready;
        }
        for atom in &mut self.sequence {
            atom.reset();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::atom::Atom;
    use crate::model::target::{SiderealTarget, Target};
    use crate::model::units::Radians;

    pub(crate) fn sample_observation() -> Observation {
        Observation {
            id: ObservationID { program_id: ProgramID("GN-2018B-Q-101".into()), local_id: "obs1".into() },
            site: Site::GeminiNorth,
            obs_class: ObsClass::Science,
            status: ObservationStatus::Ready,
            constraints: Constraints::default(),
            acq_overhead: chrono::TimeDelta::minutes(5),
            sequence: vec![Atom::new(
                chrono::TimeDelta::minutes(30),
                chrono::TimeDelta::minutes(30),
                chrono::TimeDelta::zero(),
            )],
            base_target: Some(Target::Sidereal(SiderealTarget {
                ra: Radians(0.5),
                dec: Radians(0.2),
                proper_motion: None,
            })),
            required_resources: HashSet::new(),
            too_type: None,
        }
    }

    #[test]
    fn exec_time_matches_invariant() {
        let obs = sample_observation();
        let sum: chrono::TimeDelta =
            obs.sequence.iter().fold(chrono::TimeDelta::zero(), |acc, a| acc + a.exec_time);
        assert_eq!(obs.exec_time(), sum + obs.acq_overhead);
    }

    #[test]
    fn validation_reset_clears_accumulators_and_status() {
        let mut obs = sample_observation();
        obs.status = ObservationStatus::Observed;
        obs.sequence[0].program_used = chrono::TimeDelta::minutes(30);
        obs.sequence[0].observed = true;

        obs.reset_for_validation();

        assert_eq!(obs.status, ObservationStatus::Ready);
        assert_eq!(obs.sequence[0].program_used, chrono::TimeDelta::zero());
        assert!(!obs.sequence[0].observed);
    }

    #[test]
    fn timing_window_expands_with_repeat_and_period() {
        let start = chrono::DateTime::parse_from_rfc3339("2018-10-01T02:00:00Z").unwrap().to_utc();
        let w = TimingWindow {
            start,
            duration: chrono::TimeDelta::hours(2),
            repeat: 2,
            period: chrono::TimeDelta::hours(24),
        };
        let copies = w.expand();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].0, start);
        assert_eq!(copies[1].0, start + chrono::TimeDelta::hours(24));
        assert!(w.contains(start + chrono::TimeDelta::hours(1)));
        assert!(!w.contains(start + chrono::TimeDelta::hours(3)));
    }
}
