//! [`Target`]: sidereal (RA/Dec + proper motion) or nonsidereal (ephemeris).

use super::units::Radians;

/// Proper motion in RA/Dec, milliarcsec/year, plus epoch.
#[derive(Debug, Clone, Copy)]
pub struct ProperMotion {
    pub d_ra_mas_yr: f64,
    pub d_dec_mas_yr: f64,
    pub epoch_jd: f64,
}

#[derive(Debug, Clone)]
pub struct SiderealTarget {
    pub ra: Radians,
    pub dec: Radians,
    pub proper_motion: Option<ProperMotion>,
}

/// A nonsidereal target's ephemeris: parallel RA/Dec arrays sampled at
/// specific Julian dates, as returned by an [`crate::adapters::EphemerisService`].
#[derive(Debug, Clone)]
pub struct NonsiderealTarget {
    pub jd: Vec<f64>,
    pub ra: Vec<Radians>,
    pub dec: Vec<Radians>,
}

#[derive(Debug, Clone)]
pub enum Target {
    Sidereal(SiderealTarget),
    Nonsidereal(NonsiderealTarget),
}

impl SiderealTarget {
    /// Applies proper motion to obtain the RA/Dec at a given Julian date.
    /// With no proper motion on record, returns the catalog coordinates
    /// unchanged.
    #[must_use]
    pub fn coords_at(&self, jd: f64) -> (Radians, Radians) {
        let Some(pm) = self.proper_motion else {
            return (self.ra, self.dec);
        };
        let years = (jd - pm.epoch_jd) / 365.25;
        let mas_to_rad = |mas: f64| (mas / 1000.0).to_radians() / 3600.0;
        let d_ra = mas_to_rad(pm.d_ra_mas_yr * years) / self.dec.0.cos().max(1e-6);
        let d_dec = mas_to_rad(pm.d_dec_mas_yr * years);
        (Radians(self.ra.0 + d_ra), Radians(self.dec.0 + d_dec))
    }
}

impl NonsiderealTarget {
    /// Finds the ephemeris sample nearest the given Julian date. Real
    /// adapters are expected to hand back one sample per requested slot,
    /// so this is typically an exact index match.
    #[must_use]
    pub fn coords_at(&self, jd: f64) -> (Radians, Radians) {
        if self.jd.is_empty() {
            return (Radians::ZERO, Radians::ZERO);
        }
        let idx = self
            .jd
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - jd).abs().partial_cmp(&(*b - jd).abs()).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0);
        (self.ra[idx], self.dec[idx])
    }
}
