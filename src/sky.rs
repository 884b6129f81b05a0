//! Sky geometry: hour angle, altitude/azimuth/parallactic angle, airmass,
//! and sky-brightness-to-band conversion, all in radians internally
//! (`spec.md` §4.2 steps 2-4).

use crate::model::{Radians, SiteLocation, SkyBackground};

/// `hourangle = LST - RA`, wrapped to `(-12h, +12h]` expressed in radians
/// (`-pi, +pi]`).
#[must_use]
pub fn hour_angle(local_sidereal_time: Radians, ra: Radians) -> Radians {
    let mut ha = local_sidereal_time.0 - ra.0;
    let two_pi = std::f64::consts::TAU;
    ha = ha.rem_euclid(two_pi);
    if ha > std::f64::consts::PI {
        ha -= two_pi;
    }
    Radians(ha)
}

/// Altitude, azimuth, and parallactic angle from declination, hour angle,
/// and site latitude, via the standard spherical-astronomy transform.
#[must_use]
pub fn alt_az_parallactic(dec: Radians, ha: Radians, lat: Radians) -> (Radians, Radians, Radians) {
    let (sin_dec, cos_dec) = dec.0.sin_cos();
    let (sin_lat, cos_lat) = lat.0.sin_cos();
    let (sin_ha, cos_ha) = ha.0.sin_cos();

    let sin_alt = sin_dec * sin_lat + cos_dec * cos_lat * cos_ha;
    let alt = sin_alt.clamp(-1.0, 1.0).asin();

    let cos_alt = alt.cos();
    let az = if cos_alt.abs() < 1e-9 {
        0.0
    } else {
        let sin_az = -sin_ha * cos_dec / cos_alt;
        let cos_az = (sin_dec - sin_alt * sin_lat) / (cos_alt * cos_lat.max(1e-9));
        sin_az.atan2(cos_az).rem_euclid(std::f64::consts::TAU)
    };

    let par_denominator = cos_dec * alt.cos();
    let parallactic = if par_denominator.abs() < 1e-9 {
        0.0
    } else {
        (sin_ha * cos_lat).atan2(sin_lat * cos_dec - cos_lat * sin_dec * cos_ha)
    };

    (Radians(alt), Radians(az), Radians(parallactic))
}

/// Airmass from altitude via the Kasten & Young (1989) approximation,
/// valid down to the horizon and standard in ground-based scheduling.
#[must_use]
pub fn airmass(alt: Radians) -> f64 {
    let alt_deg = alt.to_degrees().0;
    if alt_deg <= 0.0 {
        return f64::INFINITY;
    }
    let z_deg = 90.0 - alt_deg;
    1.0 / ((z_deg.to_radians().cos() + 0.50572 * (96.07995 - z_deg).powf(-1.6364)))
}

/// Angular separation between two (RA, Dec) points via the haversine
/// formula.
#[must_use]
pub fn angular_separation(ra1: Radians, dec1: Radians, ra2: Radians, dec2: Radians) -> Radians {
    let d_ra = ra1.0 - ra2.0;
    let d_dec = dec1.0 - dec2.0;
    let a = (d_dec / 2.0).sin().powi(2) + dec1.0.cos() * dec2.0.cos() * (d_ra / 2.0).sin().powi(2);
    Radians(2.0 * a.sqrt().clamp(0.0, 1.0).asin())
}

/// Converts a sky brightness in V-mag/arcsec^2 to the discrete
/// [`SkyBackground`] band used for feasibility filtering.
#[must_use]
pub fn brightness_to_band(v_mag_per_sq_arcsec: f64) -> SkyBackground {
    if v_mag_per_sq_arcsec >= 21.3 {
        SkyBackground::SB20
    } else if v_mag_per_sq_arcsec >= 20.0 {
        SkyBackground::SB50
    } else if v_mag_per_sq_arcsec >= 18.5 {
        SkyBackground::SB80
    } else {
        SkyBackground::SbAny
    }
}

/// Approximate sky brightness (mag/arcsec^2) from sun and moon altitude and
/// the moon's angular separation from the target, darker sky as both
/// bodies drop further below the horizon and further from the target.
#[must_use]
pub fn sky_brightness(sun_alt: Radians, moon_alt: Radians, moon_target_sep: Radians, moon_illum_frac: f64) -> f64 {
    const DARK_SKY_MAG: f64 = 21.9;
    let sun_penalty = if sun_alt.0 > Radians::ZERO.0 {
        5.0
    } else {
        (-sun_alt.to_degrees().0 / 18.0).min(1.0) * -1.0 + 1.0
    };
    let moon_penalty = if moon_alt.0 <= 0.0 {
        0.0
    } else {
        let sep_factor = (1.0 - (moon_target_sep.to_degrees().0 / 180.0).clamp(0.0, 1.0)).powi(2);
        moon_illum_frac * sep_factor * 3.0
    };
    DARK_SKY_MAG - sun_penalty.max(0.0) - moon_penalty
}

/// Site latitude's offset from a night's declination extreme, used by the
/// Ranker to pick the `wha` coefficient set (`spec.md` §4.3).
#[must_use]
pub fn dec_diff_from_latitude(site: SiteLocation, decs: &[Radians]) -> Radians {
    if decs.is_empty() {
        return Radians::ZERO;
    }
    if site.latitude.0 < 0.0 {
        let max_dec = decs.iter().cloned().fold(f64::NEG_INFINITY, |a, b| a.max(b.0));
        Radians((site.latitude.0 - max_dec).abs())
    } else {
        let min_dec = decs.iter().cloned().fold(f64::INFINITY, |a, b| a.min(b.0));
        Radians((min_dec - site.latitude.0).abs())
    }
}
