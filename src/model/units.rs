//! Canonical numeric representations used throughout the scheduler core.
//!
//! Angles are carried internally as radians; degree/hour-angle values only
//! appear at adapter boundaries and are converted immediately on entry.

use std::fmt;
use std::ops::{Add, Sub};

/// An angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Radians(pub f64);

/// An angle in degrees, used only when talking to adapters.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Degrees(pub f64);

/// An hour angle, wrapped to `(-12h, +12h]` when constructed via [`HourAngle::wrap`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct HourAngle(pub f64);

impl Radians {
    pub const ZERO: Radians = Radians(0.0);

    pub fn to_degrees(self) -> Degrees { Degrees(self.0.to_degrees()) }
}

impl Degrees {
    pub fn to_radians(self) -> Radians { Radians(self.0.to_radians()) }
}

impl From<Degrees> for Radians {
    fn from(d: Degrees) -> Self { d.to_radians() }
}

impl From<Radians> for Degrees {
    fn from(r: Radians) -> Self { r.to_degrees() }
}

impl Add for Radians {
    type Output = Radians;
    fn add(self, rhs: Radians) -> Radians { Radians(self.0 + rhs.0) }
}

impl Sub for Radians {
    type Output = Radians;
    fn sub(self, rhs: Radians) -> Radians { Radians(self.0 - rhs.0) }
}

impl HourAngle {
    /// Wraps an hour-angle value (in hours) to `(-12, +12]`.
    pub fn wrap(hours: f64) -> Self {
        let mut h = hours % 24.0;
        if h <= -12.0 {
            h += 24.0;
        } else if h > 12.0 {
            h -= 24.0;
        }
        HourAngle(h)
    }

    pub fn hours(self) -> f64 { self.0 }
}

impl fmt::Display for Radians {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.6} rad", self.0) }
}

/// Index of a night within the requested visibility interval, `[0, num_nights)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NightIndex(pub u32);

impl NightIndex {
    pub fn as_usize(self) -> usize { self.0 as usize }
}

impl fmt::Display for NightIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "night[{}]", self.0) }
}

/// Index of a fixed-width time slot within one night at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TimeslotIndex(pub u32);

impl TimeslotIndex {
    pub fn as_usize(self) -> usize { self.0 as usize }
}

impl fmt::Display for TimeslotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "slot[{}]", self.0) }
}

impl Add<u32> for TimeslotIndex {
    type Output = TimeslotIndex;
    fn add(self, rhs: u32) -> TimeslotIndex { TimeslotIndex(self.0 + rhs) }
}

/// Converts a wall-clock duration into a whole number of time slots,
/// rounding up, mirroring `lucupy.timeutils.time2slots`.
pub fn time_to_slots(slot_length: chrono::TimeDelta, duration: chrono::TimeDelta) -> u32 {
    if duration <= chrono::TimeDelta::zero() {
        return 0;
    }
    let slot_ms = slot_length.num_milliseconds().max(1);
    let dur_ms = duration.num_milliseconds();
    u32::try_from((dur_ms + slot_ms - 1) / slot_ms).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_angle_wraps_to_range() {
        assert!((HourAngle::wrap(13.0).hours() - (-11.0)).abs() < 1e-9);
        assert!((HourAngle::wrap(-13.0).hours() - 11.0).abs() < 1e-9);
        assert!((HourAngle::wrap(12.0).hours() - 12.0).abs() < 1e-9);
        assert!((HourAngle::wrap(0.0).hours() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn time_to_slots_rounds_up() {
        let slot = chrono::TimeDelta::minutes(1);
        assert_eq!(time_to_slots(slot, chrono::TimeDelta::seconds(0)), 0);
        assert_eq!(time_to_slots(slot, chrono::TimeDelta::seconds(1)), 1);
        assert_eq!(time_to_slots(slot, chrono::TimeDelta::seconds(61)), 2);
        assert_eq!(time_to_slots(slot, chrono::TimeDelta::seconds(120)), 2);
    }

    #[test]
    fn to_timeslot_idx_is_monotone_in_event_time() {
        let twi = chrono::DateTime::parse_from_rfc3339("2018-10-01T23:00:00Z")
            .unwrap()
            .to_utc();
        let slot = chrono::TimeDelta::minutes(1);
        let earlier = twi + chrono::TimeDelta::minutes(30);
        let later = twi + chrono::TimeDelta::minutes(90);
        let a = time_to_slots(slot, earlier - twi);
        let b = time_to_slots(slot, later - twi);
        assert!(a < b);
    }
}
