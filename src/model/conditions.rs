//! Observing conditions: cloud cover (CC), image quality (IQ), and the
//! graded-penalty scoring the [`crate::selector::Selector`] applies when a
//! forecast does not meet a group's required conditions.

/// A percentile band, ordered best (lowest percentile, e.g. 20) to worst
/// (100 = "any").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum_macros::Display)]
pub enum PercentileBand {
    P20,
    P50,
    P70,
    P80,
    P100,
}

impl PercentileBand {
    #[must_use]
    pub fn as_ratio(self) -> f64 {
        match self {
            PercentileBand::P20 => 0.2,
            PercentileBand::P50 => 0.5,
            PercentileBand::P70 => 0.7,
            PercentileBand::P80 => 0.8,
            PercentileBand::P100 => 1.0,
        }
    }
}

/// Minimum conditions required by a group, or a night's forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conditions {
    pub cloud_cover: PercentileBand,
    pub image_quality: PercentileBand,
}

impl Conditions {
    /// The most restrictive (lowest percentile = best) conjunction of two
    /// condition sets, used to combine child requirements up a group tree.
    #[must_use]
    pub fn most_restrictive(self, other: Conditions) -> Conditions {
        Conditions {
            cloud_cover: self.cloud_cover.min(other.cloud_cover),
            image_quality: self.image_quality.min(other.image_quality),
        }
    }

    /// `1.0` if the forecast meets or beats the required conditions;
    /// otherwise a graded penalty proportional to how far the forecast
    /// ratio falls short (`spec.md` §4.4).
    #[must_use]
    pub fn score_against(required: Conditions, forecast: Conditions) -> f64 {
        let cc_score = Self::component_score(required.cloud_cover, forecast.cloud_cover);
        let iq_score = Self::component_score(required.image_quality, forecast.image_quality);
        cc_score.min(iq_score)
    }

    fn component_score(required: PercentileBand, forecast: PercentileBand) -> f64 {
        if forecast <= required {
            1.0
        } else {
            let ratio = required.as_ratio() / forecast.as_ratio();
            ratio.clamp(0.0, 1.0)
        }
    }
}

/// Wind forecast for a night: speed (m/s) and direction (radians, from
/// north).
#[derive(Debug, Clone, Copy)]
pub struct WindForecast {
    pub speed_ms: f64,
    pub direction: super::units::Radians,
}

impl WindForecast {
    /// Score in `[0, 1]` for pointing a target at azimuth `target_az` under
    /// this forecast: full score below a calm threshold, graded down as
    /// wind speed increases and the pointing direction approaches the wind
    /// vector.
    #[must_use]
    pub fn score_for_azimuth(&self, target_az: super::units::Radians) -> f64 {
        const CALM_MS: f64 = 5.0;
        const MAX_MS: f64 = 20.0;
        if self.speed_ms <= CALM_MS {
            return 1.0;
        }
        let speed_frac = ((self.speed_ms - CALM_MS) / (MAX_MS - CALM_MS)).clamp(0.0, 1.0);
        let angle_diff = (target_az.0 - self.direction.0).abs() % std::f64::consts::TAU;
        let alignment = 1.0 - (angle_diff - std::f64::consts::PI).abs() / std::f64::consts::PI;
        (1.0 - speed_frac * alignment).clamp(0.0, 1.0)
    }
}
