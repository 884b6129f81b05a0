//! [`SchedulerConfig`]: consolidates the teacher's scattered top-level
//! `const`s (see `melvin-ob`'s `main.rs`) into one struct, loadable from an
//! optional TOML file with a hard-coded [`Default`] fallback.

use crate::model::site::Site;
use crate::ranker::{RankerBandParameterMap, RankerParameters, default_band_params};
use std::path::Path;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Width of one time slot. Default 1 minute, per `spec.md` §3.
    pub time_slot_length_minutes: i64,
    /// Twilight bound, degrees below horizon. Default 12, per `spec.md` §4.1.
    pub twilight_bound_deg: f64,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(skip, default = "RankerParameters::default")]
    pub ranker_params: RankerParameters,
    #[serde(skip, default = "default_band_params")]
    pub band_params: RankerBandParameterMap,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_slot_length_minutes: 1,
            twilight_bound_deg: 12.0,
            sites: Site::all().to_vec(),
            ranker_params: RankerParameters::default(),
            band_params: default_band_params(),
        }
    }
}

/// Errors arising from parsing a `SchedulerConfig` TOML file.
#[derive(Debug, Clone, strum_macros::Display)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::error::Error for ConfigError {}

impl SchedulerConfig {
    #[must_use]
    pub fn time_slot_length(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::minutes(self.time_slot_length_minutes)
    }

    /// Loads configuration from a TOML file, falling back to
    /// [`SchedulerConfig::default`] when the optional `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_one_minute_slots() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.time_slot_length(), chrono::TimeDelta::minutes(1));
    }

    #[test]
    fn missing_path_falls_back_to_default() {
        let cfg = SchedulerConfig::load(None).unwrap();
        assert_eq!(cfg.twilight_bound_deg, 12.0);
    }
}
