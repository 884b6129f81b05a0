//! [`Ranker`] (`spec.md` §4.3): scores observations on each requested
//! night's time slots, then aggregates up [`Group`] trees.
//!
//! Grounded on `components/ranker/__init__.py`. The `pow`-typo bug in
//! `_metric_slope` (a bare builtin `pow` compared against `1`/`2`, which is
//! never equal to either, so the `elif pow == 2` branch always runs) is
//! *not* reproduced: `comp_exp` is honored directly and the always-taken
//! branch's `b2` formula is used unconditionally. See `DESIGN.md`.

use crate::collector::Collector;
use crate::error::RankerError;
use crate::model::{Band, Group, NightIndex, Observation, ObservationID, Program, Site, UniqueGroupID};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerParameters {
    pub thesis_factor: f64,
    pub met_power: f64,
    pub vis_power: f64,
    pub wha_power: f64,
    /// `p` in `spec.md` §4.3: `1` is linear, `2` is parabolic.
    pub comp_exp: i32,
    pub dec_diff_less_40: (f64, f64, f64),
    pub dec_diff: (f64, f64, f64),
}

impl Default for RankerParameters {
    fn default() -> Self {
        Self {
            thesis_factor: 1.1,
            met_power: 1.0,
            vis_power: 1.0,
            wha_power: 1.0,
            comp_exp: 1,
            dec_diff_less_40: (3.0, 0.0, -0.08),
            dec_diff: (3.0, 0.1, -0.06),
        }
    }
}

/// Per-band piecewise-metric coefficients, precomputed once per [`Ranker`]
/// (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerBandParameters {
    pub m1: f64,
    pub b1: f64,
    pub m2: f64,
    pub b2: f64,
    pub xb: f64,
    pub xb0: f64,
    pub xc0: f64,
}

pub type RankerBandParameterMap = HashMap<Band, RankerBandParameters>;

/// Builds the default per-band coefficients: Band 4 is flat; Bands 3/2/1
/// cascade with `m2 in {1, 6, 20}` and `b1` bootstrapped so consecutive
/// bands are continuous at `c = 1`.
#[must_use]
pub fn default_band_params() -> RankerBandParameterMap {
    const XB: f64 = 0.8;
    let mut params = RankerBandParameterMap::new();
    params.insert(Band::Band4, RankerBandParameters { m1: 0.0, b1: 0.1, m2: 0.0, b2: 0.0, xb: XB, xb0: 0.0, xc0: 0.0 });

    let mut b1 = 1.2;
    for (band, m2) in [(Band::Band3, 1.0), (Band::Band2, 6.0), (Band::Band1, 20.0)] {
        let b2 = b1 + 5.0 - m2;
        let m1 = (m2 * XB + b2) / (XB * XB);
        params.insert(band, RankerBandParameters { m1, b1, m2, b2, xb: XB, xb0: 0.0, xc0: 0.0 });
        b1 += m2 + b2;
    }
    params
}

const COMPLETION_EPS: f64 = 1e-7;

/// Computes `(metric, metric_slope)` for one program's completion fraction
/// and band (`spec.md` §4.3). For Band 3, `xb` is the program's
/// `b3_min_fraction`; otherwise the band's fixed `xb`.
#[must_use]
fn metric_slope(
    completion: f64,
    band: Band,
    b3_min_fraction: f64,
    thesis: bool,
    params: &RankerParameters,
    band_params: &RankerBandParameterMap,
) -> (f64, f64) {
    let bp = band_params.get(&band).expect("band_params covers every Band variant");
    let xb = if band == Band::Band3 { b3_min_fraction } else { bp.xb };
    let b2 = bp.b2 + bp.xb0 + bp.b1;

    let (mut metric, mut slope) = (0.0, 0.0);
    if completion <= COMPLETION_EPS {
        // metric/slope stay 0.
    } else if completion < xb {
        metric = bp.m1 * completion.powi(params.comp_exp) + bp.b1;
        slope = f64::from(params.comp_exp) * bp.m1 * completion.powi(params.comp_exp - 1);
    } else if completion < 1.0 {
        metric = bp.m2 * completion + b2;
        slope = bp.m2;
    } else {
        metric = bp.m2 + b2 + bp.xc0;
        slope = bp.m2;
    }

    if thesis {
        metric += params.thesis_factor;
    }
    (metric, slope)
}

/// Per-night, per-slot score arrays, aligned with [`Ranker`]'s
/// `night_indices`.
pub type NightScores = Vec<Vec<f64>>;

/// Scores observations eagerly at construction and caches them by
/// [`ObservationID`]; group scores are cached lazily (`spec.md` §4.3).
pub struct Ranker {
    collector: Arc<Collector>,
    night_indices: Vec<NightIndex>,
    sites: Vec<Site>,
    params: RankerParameters,
    band_params: RankerBandParameterMap,
    observation_scores: RwLock<HashMap<ObservationID, NightScores>>,
    group_scores: RwLock<HashMap<UniqueGroupID, NightScores>>,
}

impl Ranker {
    pub async fn build(
        collector: Arc<Collector>,
        night_indices: Vec<NightIndex>,
        sites: Vec<Site>,
        params: RankerParameters,
        band_params: RankerBandParameterMap,
    ) -> Self {
        let ranker = Self {
            collector,
            night_indices,
            sites,
            params,
            band_params,
            observation_scores: RwLock::new(HashMap::new()),
            group_scores: RwLock::new(HashMap::new()),
        };
        ranker.score_all_observations().await;
        ranker
    }

    async fn score_all_observations(&self) {
        let mut scores = HashMap::new();
        for program_id in self.collector.program_ids() {
            let Some(program) = self.collector.program(&program_id) else { continue };
            for obs in program.root_group.observations() {
                if !self.sites.contains(&obs.site) {
                    continue;
                }
                let arr = self.score_obs(&program, obs).await;
                scores.insert(obs.id.clone(), arr);
            }
        }
        *self.observation_scores.write().expect("lock poisoned") = scores;
    }

    /// `spec.md` §4.3 observation score: `metric^met_power *
    /// rem_visibility_frac^vis_power * wha(t)^wha_power` at every slot in
    /// `visibility_slot_idx`, zero elsewhere. Observations with no base
    /// target score all zero (logged, `spec.md` §7 `MissingData`).
    async fn score_obs(&self, program: &Program, obs: &Observation) -> NightScores {
        let Some(base_target) = obs.base_target.as_ref() else {
            log::warn!("observation {} has no base target, scoring zero", obs.id);
            return self.zero_scores_for_site(obs.site).await;
        };

        let remaining = obs.remaining_exec_time();
        let cplt = program.completion_fraction(remaining);
        let (metric, _slope) =
            metric_slope(cplt, program.band, program.b3_min_fraction, program.thesis, &self.params, &self.band_params);

        let series = self
            .collector
            .compute_target_info_series(
                program,
                &obs.id.to_string(),
                obs.site,
                base_target,
                &obs.constraints,
                &obs.required_resources,
                remaining,
            )
            .await;

        let mut out = Vec::with_capacity(self.night_indices.len());
        for &night in &self.night_indices {
            let ti = &series[night.as_usize()];
            let night_events = self.collector.night_events.get_or_compute(
                obs.site,
                self.collector.date_for_night(night),
                self.collector.time_slot_length,
                self.collector.twilight_bound_deg,
            );
            let decs: Vec<crate::model::Radians> = night_events
                .times
                .iter()
                .map(|t| base_target.coords_at(crate::ephemeris::julian_date(*t)).1)
                .collect();
            let dec_diff = crate::sky::dec_diff_from_latitude(obs.site.location(), &decs);
            let c = if dec_diff.to_degrees().0 < 40.0 { self.params.dec_diff_less_40 } else { self.params.dec_diff };

            let mut scores = vec![0.0; ti.num_slots()];
            for &slot in &ti.visibility_slot_idx {
                let ha = ti.hourangle[slot.as_usize()];
                let wha = (c.0 + c.1 * ha + c.2 * ha * ha).max(0.0);
                scores[slot.as_usize()] =
                    metric.powf(self.params.met_power) * ti.rem_visibility_frac.powf(self.params.vis_power) * wha.powf(self.params.wha_power);
            }
            out.push(scores);
        }
        out
    }

    async fn zero_scores_for_site(&self, site: Site) -> NightScores {
        let mut out = Vec::with_capacity(self.night_indices.len());
        for &night in &self.night_indices {
            let ne = self.collector.night_events.get_or_compute(
                site,
                self.collector.date_for_night(night),
                self.collector.time_slot_length,
                self.collector.twilight_bound_deg,
            );
            out.push(vec![0.0; ne.num_slots()]);
        }
        out
    }

    #[must_use]
    pub fn observation_scores(&self, obs_id: &ObservationID) -> Option<NightScores> {
        self.observation_scores.read().expect("lock poisoned").get(obs_id).cloned()
    }

    /// Aggregates scores up a [`Group`] tree (`spec.md` §4.3): AND-groups
    /// combine children column-wise with "max unless any child is exactly
    /// zero". OR-groups are `RankerError::Unsupported`.
    pub fn score_group(&self, group: &Group) -> Result<NightScores, RankerError> {
        if let Some(cached) = self.group_scores.read().expect("lock poisoned").get(group.unique_id()) {
            return Ok(cached.clone());
        }
        let scored = self.score_group_uncached(group)?;
        self.group_scores.write().expect("lock poisoned").insert(group.unique_id().clone(), scored.clone());
        Ok(scored)
    }

    fn score_group_uncached(&self, group: &Group) -> Result<NightScores, RankerError> {
        match group {
            Group::Observation { obs, .. } => Ok(self
                .observation_scores
                .read()
                .expect("lock poisoned")
                .get(&obs.id)
                .cloned()
                .unwrap_or_else(|| {
                    self.night_indices
                        .iter()
                        .map(|_| Vec::new())
                        .collect()
                })),
            Group::And { children, .. } => {
                let child_scores: Result<Vec<_>, _> = children.iter().map(|c| self.score_group(c)).collect();
                Ok(Self::combine_and(&child_scores?, self.night_indices.len()))
            }
            Group::Or { .. } => Err(RankerError::Unsupported("OR-group scoring is not implemented".into())),
        }
    }

    fn combine_and(children: &[NightScores], num_nights: usize) -> NightScores {
        (0..num_nights)
            .map(|n| {
                let len = children.iter().filter_map(|c| c.get(n)).map(Vec::len).min().unwrap_or(0);
                (0..len)
                    .map(|t| {
                        let mut any_zero = false;
                        let mut max = f64::MIN;
                        for child in children {
                            let v = child[n][t];
                            if v == 0.0 {
                                any_zero = true;
                            }
                            if v > max {
                                max = v;
                            }
                        }
                        if any_zero { 0.0 } else { max }
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_params_are_continuous_at_xb_for_band2() {
        let bp = default_band_params();
        let band2 = bp.get(&Band::Band2).unwrap();
        let params = RankerParameters::default();
        let just_below = metric_slope(band2.xb - 1e-6, Band::Band2, 0.8, false, &params, &bp).0;
        let just_above = metric_slope(band2.xb + 1e-6, Band::Band2, 0.8, false, &params, &bp).0;
        assert!((just_below - just_above).abs() < 1e-3);
    }

    #[test]
    fn zero_completion_is_zero_metric_even_with_thesis() {
        let bp = default_band_params();
        let params = RankerParameters::default();
        let (metric, slope) = metric_slope(0.0, Band::Band1, 0.8, true, &params, &bp);
        // thesis is added unconditionally, even onto a zero base metric.
        assert!((metric - params.thesis_factor).abs() < 1e-9);
        assert_eq!(slope, 0.0);
    }

    #[test]
    fn band3_uses_program_b3_min_fraction_as_inflection() {
        let bp = default_band_params();
        let params = RankerParameters::default();
        let (low, _) = metric_slope(0.5, Band::Band3, 0.9, false, &params, &bp);
        let (high, _) = metric_slope(0.5, Band::Band3, 0.3, false, &params, &bp);
        // same completion, different b3min -> different piecewise branch -> different metric.
        assert!((low - high).abs() > 1e-9);
    }

    #[test]
    fn and_group_combiner_zeroes_out_when_any_child_is_zero() {
        let children = vec![vec![vec![1.0, 0.0, 2.0]], vec![vec![3.0, 5.0, 1.0]]];
        let combined = Ranker::combine_and(&children, 1);
        assert_eq!(combined[0], vec![3.0, 0.0, 2.0]);
    }
}
