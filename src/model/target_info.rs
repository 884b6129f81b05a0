//! [`TargetInfo`]: structure-of-arrays per-slot geometry and feasibility for
//! one `(observation, night)` pair.

use super::observation::SkyBackground;
use super::units::{Radians, TimeslotIndex};
use bitvec::prelude::*;

/// Per-`(obs, night)` arrays of length `num_timeslots(site, night)`.
///
/// Invariant: `visibility_slot_idx` matches `visibility_slot_filter` exactly
/// and every index lies in `[0, num_slots)` — see
/// [`TargetInfo::assert_visibility_consistent`] for the checked form used in
/// tests.
///
/// Invariant: `rem_visibility_time[n] = sum(visibility_time[n..=last])`,
/// accumulated in reverse-chronological night order by
/// [`crate::collector::Collector`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TargetInfo {
    pub alt: Vec<Radians>,
    pub az: Vec<Radians>,
    pub hourangle: Vec<f64>,
    pub airmass: Vec<f64>,
    pub sky_brightness: Vec<SkyBackground>,
    pub visibility_slot_idx: Vec<TimeslotIndex>,
    pub visibility_slot_filter: BitVec<u8, Lsb0>,
    pub visibility_time: chrono::TimeDelta,
    pub rem_visibility_time: chrono::TimeDelta,
    pub rem_visibility_frac: f64,
}

impl TargetInfo {
    #[must_use]
    pub fn num_slots(&self) -> usize { self.alt.len() }

    /// Builds `visibility_slot_idx` from `visibility_slot_filter`, keeping
    /// them in lock-step as the invariant requires.
    pub fn sync_visibility_idx(&mut self) {
        self.visibility_slot_idx = self
            .visibility_slot_filter
            .iter()
            .enumerate()
            .filter_map(|(i, b)| (*b).then(|| TimeslotIndex(u32::try_from(i).unwrap_or(u32::MAX))))
            .collect();
    }

    /// Checked invariant: `|visibility_slot_idx| == popcount(filter)` and
    /// every listed index lies in `[0, num_slots)`.
    #[must_use]
    pub fn visibility_consistent(&self) -> bool {
        self.visibility_slot_idx.len() == self.visibility_slot_filter.count_ones()
            && self.visibility_slot_idx.iter().all(|i| i.as_usize() < self.num_slots())
            && self
                .visibility_slot_idx
                .iter()
                .all(|i| self.visibility_slot_filter[i.as_usize()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(filter_bits: &[bool]) -> TargetInfo {
        let n = filter_bits.len();
        let mut filter: BitVec<u8, Lsb0> = BitVec::repeat(false, n);
        for (i, b) in filter_bits.iter().enumerate() {
            filter.set(i, *b);
        }
        let mut ti = TargetInfo {
            alt: vec![Radians(0.0); n],
            az: vec![Radians(0.0); n],
            hourangle: vec![0.0; n],
            airmass: vec![1.2; n],
            sky_brightness: vec![SkyBackground::SbAny; n],
            visibility_slot_idx: Vec::new(),
            visibility_slot_filter: filter,
            visibility_time: chrono::TimeDelta::zero(),
            rem_visibility_time: chrono::TimeDelta::zero(),
            rem_visibility_frac: 0.0,
        };
        ti.sync_visibility_idx();
        ti
    }

    #[test]
    fn visibility_idx_matches_filter() {
        let ti = make(&[true, false, true, true, false]);
        assert!(ti.visibility_consistent());
        assert_eq!(ti.visibility_slot_idx, vec![TimeslotIndex(0), TimeslotIndex(2), TimeslotIndex(3)]);
    }

    #[test]
    fn empty_filter_is_consistent() {
        let ti = make(&[false, false, false]);
        assert!(ti.visibility_consistent());
        assert!(ti.visibility_slot_idx.is_empty());
    }

    #[test]
    fn cache_round_trip_is_bit_exact() {
        let mut ti = make(&[true, false, true]);
        ti.alt = vec![Radians(0.1), Radians(0.2), Radians(0.3)];
        ti.rem_visibility_frac = 0.42;

        let config = bincode::config::standard();
        let encoded = bincode::serde::encode_to_vec(&ti, config).expect("encode");
        let (decoded, _len): (TargetInfo, usize) =
            bincode::serde::decode_from_slice(&encoded, config).expect("decode");

        assert_eq!(decoded.alt.len(), ti.alt.len());
        for (a, b) in decoded.alt.iter().zip(ti.alt.iter()) {
            assert_eq!(a.0.to_bits(), b.0.to_bits());
        }
        assert_eq!(decoded.visibility_slot_idx, ti.visibility_slot_idx);
        assert_eq!(decoded.visibility_slot_filter, ti.visibility_slot_filter);
        assert_eq!(decoded.rem_visibility_frac.to_bits(), ti.rem_visibility_frac.to_bits());
    }
}
