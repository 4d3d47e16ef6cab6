//! AI tuning loaded from RON.
//!
//! Values are plain numbers so config files stay readable; they are converted
//! to fixed-point once, when the planner or execution context is built.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::Fixed;
use crate::snapshot::DefId;
use crate::validation::{BuildCost, ExecutionContext};

/// A unit type the planner may build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOption {
    /// Type id.
    pub def_id: DefId,
    /// Engine name.
    pub name: String,
    /// Metal cost.
    pub metal_cost: f64,
    /// Energy cost.
    pub energy_cost: f64,
}

impl BuildOption {
    /// Cost in fixed-point.
    #[must_use]
    pub fn cost(&self) -> BuildCost {
        BuildCost {
            metal: to_fixed(self.metal_cost),
            energy: to_fixed(self.energy_cost),
        }
    }
}

/// Planner, validation and execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Cells per spatial grid axis.
    pub grid_resolution: u32,
    /// Largest batch sent to the engine.
    pub max_batch_size: usize,
    /// Engine time allowed per tick, `None` for unlimited.
    pub tick_budget_ms: Option<u64>,
    /// Health ratio below which threatened units retreat.
    pub retreat_threshold: f64,
    /// Health ratio below which own units are repaired.
    pub repair_threshold: f64,
    /// How far a retreat moves.
    pub safe_distance: f64,
    /// Radius in which attacking or patrolling foes count as a threat.
    pub threat_radius: f64,
    /// Radius in which idle military units pick a target.
    pub engage_radius: f64,
    /// Radius in which idle builders look for repairs.
    pub repair_radius: f64,
    /// Distance from the builder at which new structures are placed.
    pub build_offset: f64,
    /// Unit types treated as builders.
    pub builder_types: BTreeSet<DefId>,
    /// Unit types treated as military.
    pub military_types: BTreeSet<DefId>,
    /// Build options in preference order.
    pub build_catalogue: Vec<BuildOption>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            grid_resolution: 32,
            max_batch_size: 50,
            tick_budget_ms: Some(33),
            retreat_threshold: 0.3,
            repair_threshold: 0.6,
            safe_distance: 200.0,
            threat_radius: 400.0,
            engage_radius: 600.0,
            repair_radius: 300.0,
            build_offset: 64.0,
            builder_types: BTreeSet::from([103]),
            military_types: BTreeSet::from([200]),
            build_catalogue: vec![BuildOption {
                def_id: 101,
                name: "factory".to_string(),
                metal_cost: 80.0,
                energy_cost: 0.0,
            }],
        }
    }
}

impl AiConfig {
    /// Load and validate a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse and validate a config from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: AiConfig = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_resolution == 0 {
            return Err(invalid("grid_resolution", "must be at least 1"));
        }
        if self.max_batch_size == 0 {
            return Err(invalid("max_batch_size", "must be at least 1"));
        }
        for (field, value) in [
            ("retreat_threshold", self.retreat_threshold),
            ("repair_threshold", self.repair_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(field, format!("{value} is outside (0, 1]")));
            }
        }
        for (field, value) in [
            ("safe_distance", self.safe_distance),
            ("threat_radius", self.threat_radius),
            ("engage_radius", self.engage_radius),
            ("repair_radius", self.repair_radius),
            ("build_offset", self.build_offset),
        ] {
            if Fixed::checked_from_num(value).map_or(true, |v| v < Fixed::ZERO) {
                return Err(invalid(field, format!("{value} is not a non-negative distance")));
            }
        }
        for option in &self.build_catalogue {
            let costs = [("metal_cost", option.metal_cost), ("energy_cost", option.energy_cost)];
            for (field, value) in costs {
                if Fixed::checked_from_num(value).map_or(true, |v| v < Fixed::ZERO) {
                    return Err(invalid(
                        field,
                        format!("type {} has invalid cost {value}", option.def_id),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validation and execution settings derived from this config.
    #[must_use]
    pub fn execution_context(&self) -> ExecutionContext {
        let ctx = ExecutionContext {
            max_batch_size: NonZeroUsize::new(self.max_batch_size).unwrap_or(NonZeroUsize::MIN),
            tick_budget: self.tick_budget_ms.map(Duration::from_millis),
            ..ExecutionContext::default()
        };
        self.build_catalogue.iter().fold(ctx, |ctx, option| {
            ctx.with_build(option.def_id, option.name.clone(), option.cost())
        })
    }

    /// Retreat threshold in fixed-point.
    pub fn retreat_threshold(&self) -> Fixed {
        to_fixed(self.retreat_threshold)
    }

    /// Repair threshold in fixed-point.
    pub fn repair_threshold(&self) -> Fixed {
        to_fixed(self.repair_threshold)
    }

    /// Safe distance in fixed-point.
    pub fn safe_distance(&self) -> Fixed {
        to_fixed(self.safe_distance)
    }

    /// Threat radius in fixed-point.
    pub fn threat_radius(&self) -> Fixed {
        to_fixed(self.threat_radius)
    }

    /// Engage radius in fixed-point.
    pub fn engage_radius(&self) -> Fixed {
        to_fixed(self.engage_radius)
    }

    /// Repair radius in fixed-point.
    pub fn repair_radius(&self) -> Fixed {
        to_fixed(self.repair_radius)
    }

    /// Build offset in fixed-point.
    pub fn build_offset(&self) -> Fixed {
        to_fixed(self.build_offset)
    }
}

fn to_fixed(value: f64) -> Fixed {
    if value.is_nan() {
        Fixed::ZERO
    } else {
        Fixed::saturating_from_num(value)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AiConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grid_resolution, 32);
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.retreat_threshold(), Fixed::from_num(0.3));
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = AiConfig::from_ron_str("(max_batch_size: 20, builder_types: [7, 8])").unwrap();
        assert_eq!(config.max_batch_size, 20);
        assert_eq!(config.builder_types, BTreeSet::from([7, 8]));
        assert_eq!(config.grid_resolution, 32);
    }

    #[test]
    fn test_catalogue_from_ron() {
        let ron = r#"(
            build_catalogue: [
                (def_id: 101, name: "factory", metal_cost: 80.0, energy_cost: 0.0),
                (def_id: 102, name: "solar", metal_cost: 30.0, energy_cost: 5.0),
            ],
        )"#;
        let config = AiConfig::from_ron_str(ron).unwrap();
        let ctx = config.execution_context();
        assert_eq!(ctx.allowed_builds, BTreeSet::from([101, 102]));
        assert_eq!(ctx.build_name(102), Some("solar"));
        assert_eq!(ctx.build_costs[&102], BuildCost::from_ints(30, 5));
        assert_eq!(ctx.tick_budget, Some(Duration::from_millis(33)));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let cases = [
            "(grid_resolution: 0)",
            "(max_batch_size: 0)",
            "(retreat_threshold: 0.0)",
            "(repair_threshold: 1.5)",
            "(safe_distance: -1.0)",
        ];
        for ron in cases {
            assert!(
                matches!(AiConfig::from_ron_str(ron), Err(ConfigError::InvalidValue { .. })),
                "{ron} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_error_and_missing_file() {
        assert!(matches!(
            AiConfig::from_ron_str("(grid_resolution: \"big\")"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            AiConfig::load("/nonexistent/ai.ron"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
