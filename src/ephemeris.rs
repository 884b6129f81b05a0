//! Low-precision solar/lunar ephemeris and sidereal time, sufficient to
//! locate twilight bounds and moon separation for [`crate::night_events`].
//! Nonsidereal *target* positions are never computed here — those come
//! from the external [`crate::adapters::EphemerisService`] adapter per
//! `spec.md` §6.

use crate::model::Radians;

const J2000: f64 = 2_451_545.0;

/// Julian date of a UTC instant.
#[must_use]
pub fn julian_date(at: chrono::DateTime<chrono::Utc>) -> f64 {
    at.timestamp() as f64 / 86400.0 + 2_440_587.5 + (f64::from(at.timestamp_subsec_nanos()) / 1e9) / 86400.0
}

/// Greenwich Mean Sidereal Time, in radians, via the standard low-precision
/// IAU polynomial.
#[must_use]
pub fn gmst(jd: f64) -> Radians {
    let t = (jd - J2000) / 36525.0;
    let gmst_hours = 6.697_374_558 + 0.065_709_824_419_08 * (jd - J2000)
        + 0.000_026_087_83 * t * t;
    let wrapped = gmst_hours.rem_euclid(24.0);
    Radians(wrapped * std::f64::consts::PI / 12.0)
}

/// Local sidereal time at `longitude` (east positive), in radians.
#[must_use]
pub fn local_sidereal_time(jd: f64, longitude: Radians) -> Radians {
    Radians((gmst(jd).0 + longitude.0).rem_euclid(std::f64::consts::TAU))
}

/// Low-precision solar RA/Dec (good to a few arcminutes), sufficient for
/// twilight-bound and sky-brightness computations. Based on the standard
/// low-precision solar position algorithm (mean longitude + equation of
/// center).
#[must_use]
pub fn sun_position(jd: f64) -> (Radians, Radians) {
    let d = jd - J2000;
    let g = (357.529 + 0.985_600_28 * d).to_radians();
    let q = (280.459 + 0.985_647_3 * d).to_radians();
    let l = q + (1.915_f64.to_radians()) * g.sin() + (0.020_f64.to_radians()) * (2.0 * g).sin();
    let e = (23.439 - 0.000_000_4 * d).to_radians();

    let ra = (e.cos() * l.sin()).atan2(l.cos());
    let dec = (e.sin() * l.sin()).asin();
    (Radians(ra.rem_euclid(std::f64::consts::TAU)), Radians(dec))
}

/// Low-precision lunar RA/Dec and illuminated fraction, adequate for moon-
/// separation gating and sky-brightness estimates (not for precision
/// astrometry).
#[must_use]
pub fn moon_position(jd: f64) -> (Radians, Radians, f64) {
    let d = jd - J2000;
    let l = (218.316 + 13.176_396_1 * d).to_radians();
    let m = (134.963 + 13.064_993 * d).to_radians();
    let f = (93.272 + 13.229_350 * d).to_radians();

    let lon = l + (6.289_f64.to_radians()) * m.sin();
    let lat = (5.128_f64.to_radians()) * f.sin();
    let e = (23.439 - 0.000_000_4 * d).to_radians();

    let sin_dec = lat.sin() * e.cos() + lat.cos() * e.sin() * lon.sin();
    let dec = sin_dec.clamp(-1.0, 1.0).asin();
    let y = lon.sin() * e.cos() - lat.sin().tan() * e.sin();
    let ra = y.atan2(lon.cos());

    let (sun_ra, sun_dec) = sun_position(jd);
    let elongation = crate::sky::angular_separation(Radians(ra.rem_euclid(std::f64::consts::TAU)), Radians(dec), sun_ra, sun_dec);
    let illum_frac = (1.0 - elongation.0.cos()) / 2.0;

    (Radians(ra.rem_euclid(std::f64::consts::TAU)), Radians(dec), illum_frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn julian_date_of_j2000_epoch_is_correct() {
        let at = chrono::DateTime::parse_from_rfc3339("2000-01-01T12:00:00Z").unwrap().to_utc();
        assert!((julian_date(at) - J2000).abs() < 1e-6);
    }

    #[test]
    fn gmst_is_bounded() {
        let at = chrono::DateTime::parse_from_rfc3339("2018-10-01T04:00:00Z").unwrap().to_utc();
        let jd = julian_date(at);
        let g = gmst(jd);
        assert!(g.0 >= 0.0 && g.0 < std::f64::consts::TAU);
    }

    #[test]
    fn sun_position_dec_within_obliquity_bound() {
        let at = chrono::DateTime::parse_from_rfc3339("2018-06-21T12:00:00Z").unwrap().to_utc();
        let (_, dec) = sun_position(julian_date(at));
        assert!(dec.to_degrees().0.abs() <= 23.5);
    }

    #[test]
    fn moon_illumination_fraction_in_unit_range() {
        let at = chrono::DateTime::parse_from_rfc3339("2018-10-01T04:00:00Z").unwrap().to_utc();
        let (_, _, illum) = moon_position(julian_date(at));
        assert!((0.0..=1.0).contains(&illum));
    }
}
