//! Match tuning.
//!
//! Every number the simulation uses lives here, so balance changes are a
//! RON edit rather than a code change. Missing sections fall back to
//! their defaults.
//!
//! # Example RON
//!
//! ```ron
//! MatchConfig(
//!     elixir: (initial: 7.0, max: 10.0, regen_rate: 0.5, overtime_multiplier: 2.0),
//!     timing: (normal_duration: 120.0, overtime_duration: 30.0, deploy_delay: 1.0),
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::economy::ElixirConfig;
use crate::error::{GameError, Result};
use crate::grid::GridConfig;
use crate::math::{fixed_decimal, Fixed};
use crate::towers::TowerCatalog;
use crate::unit_kind::UnitCatalog;

/// Match clock limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Seconds of regular play.
    #[serde(with = "fixed_decimal")]
    pub normal_duration: Fixed,
    /// Extra seconds of overtime before the crown count decides.
    #[serde(with = "fixed_decimal")]
    pub overtime_duration: Fixed,
    /// Seconds a deployed unit waits before acting.
    #[serde(with = "fixed_decimal")]
    pub deploy_delay: Fixed,
}

impl TimingConfig {
    /// Total match length.
    #[must_use]
    pub fn time_limit(&self) -> Fixed {
        self.normal_duration + self.overtime_duration
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            normal_duration: Fixed::from_num(180),
            overtime_duration: Fixed::from_num(60),
            deploy_delay: Fixed::from_num(1),
        }
    }
}

/// Complete configuration for one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Board geometry.
    pub grid: GridConfig,
    /// Elixir economy.
    pub elixir: ElixirConfig,
    /// Match clock.
    pub timing: TimingConfig,
    /// Per-kind unit stats.
    pub units: UnitCatalog,
    /// Tower stats.
    pub towers: TowerCatalog,
}

impl MatchConfig {
    /// Parse a config from RON text.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.timing.time_limit(), Fixed::from_num(240));
        assert_eq!(config.elixir.max, Fixed::from_num(10));
        assert_eq!(config.grid.rows, 34);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = MatchConfig::from_ron_str(
            "MatchConfig(timing: (normal_duration: 120.0, overtime_duration: 30.0, deploy_delay: 0.5))",
        )
        .unwrap();
        assert_eq!(config.timing.normal_duration, Fixed::from_num(120));
        assert_eq!(config.timing.deploy_delay, Fixed::from_num(0.5));
        assert_eq!(config.units, UnitCatalog::default());
        assert_eq!(config.elixir, ElixirConfig::default());
    }

    #[test]
    fn test_bad_ron_is_config_error() {
        let err = MatchConfig::from_ron_str("MatchConfig(timing: nope)").unwrap_err();
        assert!(matches!(err, GameError::ConfigParse(_)));
    }
}
