//! [`Event`] / [`EventKind`] (`spec.md` §4.6): the per-site event stream
//! that drives a night's re-planning loop.
//!
//! Grounded on `original_source/scheduler/core/eventsqueue/events.py`: the
//! original types `Blockage` as an abstract parent of `Fault`/`EngTask`
//! carrying an `end: Option<DateTime<Utc>>` and a `time_loss()` accessor;
//! here that is a shared [`Blockage`] struct embedded in both variants
//! (`SPEC_FULL.md` §4.6a).

use crate::model::{Resource, Site};
use std::collections::HashSet;
use std::fmt;

/// A resource-blocking interval shared by [`EventKind::Fault`] and
/// [`EventKind::EngTask`].
#[derive(Debug, Clone, PartialEq)]
pub struct Blockage {
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub affects: HashSet<Resource>,
}

impl Blockage {
    /// Time lost to this blockage, bounded by `until` when still open.
    #[must_use]
    pub fn time_loss(&self, until: chrono::DateTime<chrono::Utc>) -> chrono::TimeDelta {
        let end = self.end.unwrap_or(until);
        (end - self.start).max(chrono::TimeDelta::zero())
    }
}

/// Interior and boundary events in one night's stream (`spec.md` §4.6).
/// Ordered for tie-breaking per `spec.md` §5:
/// `EveningTwilight < ResumeNight < WeatherChange < Fault < EngTask < MorningTwilight`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    EveningTwilight,
    ResumeNight,
    WeatherChange { new_conditions: crate::model::Conditions },
    Fault(Blockage),
    EngTask(Blockage),
    MorningTwilight,
}

impl EventKind {
    /// Ordinal used for the tie-break total order (`spec.md` §5); ties on
    /// timestamp are broken by this order, not declaration order, since
    /// twilight bookends must always sort outermost.
    #[must_use]
    fn rank(&self) -> u8 {
        match self {
            EventKind::EveningTwilight => 0,
            EventKind::ResumeNight => 1,
            EventKind::WeatherChange { .. } => 2,
            EventKind::Fault(_) => 3,
            EventKind::EngTask(_) => 4,
            EventKind::MorningTwilight => 5,
        }
    }

    #[must_use]
    fn label(&self) -> &'static str {
        match self {
            EventKind::EveningTwilight => "EveningTwilight",
            EventKind::ResumeNight => "ResumeNight",
            EventKind::WeatherChange { .. } => "WeatherChange",
            EventKind::Fault(_) => "Fault",
            EventKind::EngTask(_) => "EngTask",
            EventKind::MorningTwilight => "MorningTwilight",
        }
    }

    /// Does this event invalidate prior state and force a re-plan of the
    /// remaining window (`spec.md` §4.6 step 2)?
    #[must_use]
    pub fn invalidates_plan(&self) -> bool {
        matches!(self, EventKind::WeatherChange { .. } | EventKind::Fault(_) | EventKind::ResumeNight)
    }
}

/// One occurrence of an [`EventKind`] at a [`Site`] and instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub site: Site,
    pub kind: EventKind,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl Event {
    #[must_use]
    pub fn time(&self) -> chrono::DateTime<chrono::Utc> { self.at }

    #[must_use]
    pub fn description(&self) -> String {
        match &self.kind {
            EventKind::Fault(b) => format!("Fault({} resources)", b.affects.len()),
            EventKind::EngTask(b) => format!("EngTask({} resources)", b.affects.len()),
            EventKind::WeatherChange { new_conditions } => {
                format!("WeatherChange(cc={}, iq={})", new_conditions.cloud_cover, new_conditions.image_quality)
            }
            other => other.label().to_string(),
        }
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}

/// Total order: timestamp first, then the event-kind tie-break
/// (`spec.md` §5).
impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then_with(|| self.kind.rank().cmp(&other.kind.rank()))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} [{}]", self.kind.label(), self.site, self.at.format("%Y-%m-%d %H:%M"))
    }
}

/// A per-site, timestamp-ordered stream of events for one night.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: std::collections::BinaryHeap<std::cmp::Reverse<OrderedEvent>>,
}

/// Wraps [`Event`] so it can live in a min-heap ordered by [`Event::cmp`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderedEvent(Event);

impl PartialOrd for OrderedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}
impl Ord for OrderedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering { self.0.cmp(&other.0) }
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, event: Event) { self.events.push(std::cmp::Reverse(OrderedEvent(event))); }

    pub fn pop(&mut self) -> Option<Event> { self.events.pop().map(|std::cmp::Reverse(e)| e.0) }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.events.is_empty() }

    #[must_use]
    pub fn len(&self) -> usize { self.events.len() }
}
