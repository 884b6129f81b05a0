//! `Site`: a constant geographic location. The set of supported sites is
//! fixed at [`crate::collector::Collector`] construction time.

use super::units::{Degrees, Radians};
use std::fmt;

/// One of the observatory sites known to the scheduler. Sites are parameters,
/// not abstractions: there is no multi-observatory model beyond this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::Display, serde::Serialize, serde::Deserialize)]
pub enum Site {
    #[strum(serialize = "GN")]
    GeminiNorth,
    #[strum(serialize = "GS")]
    GeminiSouth,
}

/// Geographic location of a [`Site`]: latitude/longitude/altitude.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SiteLocation {
    pub latitude: Radians,
    pub longitude: Radians,
    pub altitude_m: f64,
}

impl Site {
    /// Returns the fixed location associated with this site.
    #[must_use]
    pub fn location(self) -> SiteLocation {
        match self {
            Site::GeminiNorth => SiteLocation {
                latitude: Degrees(19.823_8).to_radians(),
                longitude: Degrees(-155.469_56).to_radians(),
                altitude_m: 4213.0,
            },
            Site::GeminiSouth => SiteLocation {
                latitude: Degrees(-30.240_75).to_radians(),
                longitude: Degrees(-70.736_69).to_radians(),
                altitude_m: 2722.0,
            },
        }
    }

    #[must_use]
    pub fn all() -> &'static [Site] { &[Site::GeminiNorth, Site::GeminiSouth] }
}

impl fmt::Display for SiteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat={:.4} lon={:.4} alt={:.0}m",
            self.latitude.to_degrees().0,
            self.longitude.to_degrees().0,
            self.altitude_m
        )
    }
}
