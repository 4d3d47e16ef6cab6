//! Scenario loading and configuration.
//!
//! Scenarios define the initial engine state for headless runs: map size,
//! economy, unit type stats and starting units for every team.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Map dimensions (width along x, height along z) in world units.
    pub map_size: (f32, f32),
    /// Terrain elevation range.
    #[serde(default)]
    pub elevation: (f32, f32),
    /// Economy of team 0.
    #[serde(default)]
    pub resources: ResourceSetup,
    /// Stats for every unit type that appears or can be built.
    #[serde(default)]
    pub unit_types: Vec<UnitTypeSpec>,
    /// Starting units for all teams.
    pub units: Vec<UnitPlacement>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::skirmish()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// A small skirmish: two builders and a squad at home, a raiding party
    /// across the map.
    #[must_use]
    pub fn skirmish() -> Self {
        Self {
            name: "Skirmish".to_string(),
            description: "Builders and a squad against an approaching raid".to_string(),
            map_size: (2048.0, 2048.0),
            elevation: (0.0, 0.0),
            resources: ResourceSetup::default(),
            unit_types: UnitTypeSpec::defaults(),
            units: vec![
                UnitPlacement::new(103, 0, 256.0, 256.0, 2),
                UnitPlacement::new(200, 0, 320.0, 320.0, 4),
                UnitPlacement {
                    state_code: 3,
                    ..UnitPlacement::new(300, 1, 900.0, 900.0, 3)
                },
                UnitPlacement::new(300, 1, 1800.0, 1800.0, 2),
            ],
        }
    }

    /// Stats for `def_id`, falling back to [`UnitTypeSpec::generic`].
    #[must_use]
    pub fn unit_type(&self, def_id: i32) -> UnitTypeSpec {
        self.unit_types
            .iter()
            .find(|spec| spec.def_id == def_id)
            .cloned()
            .unwrap_or_else(|| UnitTypeSpec::generic(def_id))
    }
}

/// Starting and ongoing economy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSetup {
    /// Starting metal.
    pub metal: f32,
    /// Starting energy.
    pub energy: f32,
    /// Metal per second.
    pub metal_income: f32,
    /// Energy per second.
    pub energy_income: f32,
    /// Metal cap.
    pub metal_storage: f32,
    /// Energy cap.
    pub energy_storage: f32,
}

impl Default for ResourceSetup {
    fn default() -> Self {
        Self {
            metal: 1000.0,
            energy: 800.0,
            metal_income: 5.0,
            energy_income: 20.0,
            metal_storage: 2000.0,
            energy_storage: 2000.0,
        }
    }
}

/// Stats the mock engine needs for one unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTypeSpec {
    /// Type id.
    pub def_id: i32,
    /// Maximum health.
    pub max_health: f32,
    /// Movement speed in world units per second. Zero for structures.
    pub speed: f32,
    /// Damage per second while attacking.
    #[serde(default)]
    pub damage: f32,
    /// Attack range.
    #[serde(default = "default_range")]
    pub range: f32,
    /// Metal cost to build.
    #[serde(default)]
    pub metal_cost: f32,
    /// Energy cost to build.
    #[serde(default)]
    pub energy_cost: f32,
    /// Seconds to build.
    #[serde(default = "default_build_time")]
    pub build_time: f32,
}

fn default_range() -> f32 {
    100.0
}

fn default_build_time() -> f32 {
    5.0
}

impl UnitTypeSpec {
    /// Stats used for types a scenario does not describe.
    #[must_use]
    pub fn generic(def_id: i32) -> Self {
        Self {
            def_id,
            max_health: 100.0,
            speed: 60.0,
            damage: 10.0,
            range: default_range(),
            metal_cost: 0.0,
            energy_cost: 0.0,
            build_time: default_build_time(),
        }
    }

    /// Builder 103, factory 101, soldier 200, raider 300.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                max_health: 2000.0,
                speed: 0.0,
                damage: 0.0,
                metal_cost: 80.0,
                build_time: 3.0,
                ..Self::generic(101)
            },
            Self {
                max_health: 300.0,
                speed: 45.0,
                damage: 0.0,
                ..Self::generic(103)
            },
            Self {
                max_health: 200.0,
                speed: 70.0,
                damage: 25.0,
                range: 150.0,
                ..Self::generic(200)
            },
            Self {
                max_health: 150.0,
                speed: 80.0,
                damage: 20.0,
                ..Self::generic(300)
            },
        ]
    }
}

/// A group of identical units placed around a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type.
    pub def_id: i32,
    /// Owning team; 0 is the AI under test.
    pub team_id: i32,
    /// Planar position (x, z).
    pub position: (f32, f32),
    /// Number of units, spread in a row along x.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Starting health as a fraction of max health.
    #[serde(default = "default_health_ratio")]
    pub health_ratio: f32,
    /// Starting state code.
    #[serde(default)]
    pub state_code: i32,
}

fn default_count() -> u32 {
    1
}

fn default_health_ratio() -> f32 {
    1.0
}

impl UnitPlacement {
    /// Create a placement of `count` full-health idle units.
    #[must_use]
    pub fn new(def_id: i32, team_id: i32, x: f32, z: f32, count: u32) -> Self {
        Self {
            def_id,
            team_id,
            position: (x, z),
            count,
            health_ratio: default_health_ratio(),
            state_code: 0,
        }
    }
}
