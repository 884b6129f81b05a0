//! Program metadata: band, completion, thesis flag, and the root [`Group`].

use super::group::Group;
use std::fmt;

/// Program priority tier, 1 (highest) to 4 (lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::Display)]
pub enum Band {
    #[strum(serialize = "Band1")]
    Band1,
    #[strum(serialize = "Band2")]
    Band2,
    #[strum(serialize = "Band3")]
    Band3,
    #[strum(serialize = "Band4")]
    Band4,
}

/// Opaque program identifier, e.g. `GN-2018B-Q-101`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramID(pub String);

impl fmt::Display for ProgramID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// A semester designation, e.g. `2018B`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Semester(pub String);

/// A scheduling program: identified by [`ProgramID`], carrying awarded/used
/// time and a root [`Group`] of observations.
///
/// Invariant: `awarded > Duration::zero()` — rejected at ingest otherwise,
/// see [`crate::collector::Collector::ingest`].
#[derive(Debug, Clone)]
pub struct Program {
    pub id: ProgramID,
    /// OCS program type string (e.g. `"Queue"`, `"Classical"`). Empty
    /// means "no resolvable type" and is rejected at ingest.
    pub program_type: String,
    pub band: Band,
    pub thesis: bool,
    pub awarded: chrono::TimeDelta,
    pub used: chrono::TimeDelta,
    pub semester: Semester,
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
    /// Band-3 minimum time fraction (Band 3 minimum time / awarded time),
    /// used as the Ranker's inflection point `xb` for Band 3 programs.
    pub b3_min_fraction: f64,
    pub root_group: Group,
}

impl Program {
    /// `program.total_used() / program.total_awarded()` used for completion
    /// fractions; the caller is expected to add in-flight remaining time
    /// before calling, per the Ranker's `cplt` computation.
    #[must_use]
    pub fn completion_fraction(&self, remaining: chrono::TimeDelta) -> f64 {
        let total_awarded_secs = self.awarded.num_seconds().max(1) as f64;
        let used_secs = (self.used + remaining).num_seconds() as f64;
        used_secs / total_awarded_secs
    }
}
