//! Per-command validation against the tick's snapshot.
//!
//! Validation is pure: the same snapshot, context and command always give the
//! same [`ValidationResult`]. Checks short-circuit on the first failure.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::can_afford;
use crate::command::{Command, MAX_PATROL_WAYPOINTS};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::snapshot::{DefId, Unit, UnitId, WorldSnapshot};

/// Metal and energy needed to build one unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildCost {
    /// Metal cost.
    #[serde(with = "fixed_serde")]
    pub metal: Fixed,
    /// Energy cost.
    #[serde(with = "fixed_serde")]
    pub energy: Fixed,
}

impl BuildCost {
    /// Cost from whole numbers.
    #[must_use]
    pub fn from_ints(metal: i32, energy: i32) -> Self {
        Self {
            metal: Fixed::from_num(metal),
            energy: Fixed::from_num(energy),
        }
    }
}

/// Everything validation and execution need beyond the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    /// Unit types Build commands may construct.
    pub allowed_builds: BTreeSet<DefId>,
    /// Known build costs. Types without an entry skip the affordability check.
    pub build_costs: BTreeMap<DefId, BuildCost>,
    /// Names passed to the engine with Build records.
    pub build_names: BTreeMap<DefId, String>,
    /// Largest batch handed to the engine in one call.
    pub max_batch_size: NonZeroUsize,
    /// Budget for one tick's batches, compared against the summed
    /// engine-reported `elapsed_ms` of the batches executed so far.
    pub tick_budget: Option<Duration>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            allowed_builds: BTreeSet::new(),
            build_costs: BTreeMap::new(),
            build_names: BTreeMap::new(),
            max_batch_size: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            tick_budget: None,
        }
    }
}

impl ExecutionContext {
    /// Allow a build type with a known cost and name.
    #[must_use]
    pub fn with_build(mut self, def_id: DefId, name: impl Into<String>, cost: BuildCost) -> Self {
        self.allowed_builds.insert(def_id);
        self.build_costs.insert(def_id, cost);
        self.build_names.insert(def_id, name.into());
        self
    }

    /// Engine name for a build type, if known.
    #[must_use]
    pub fn build_name(&self, def_id: DefId) -> Option<&str> {
        self.build_names.get(&def_id).map(String::as_str)
    }
}

/// Outcome of validating one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    /// The command may be executed.
    Valid,
    /// Source unit missing, dead, or not ours.
    InvalidUnit(String),
    /// A position lies outside the map.
    InvalidPosition(String),
    /// Target missing, dead, or not a usable id.
    InvalidTarget(String),
    /// The economy cannot cover the command.
    InsufficientResources(String),
}

impl ValidationResult {
    /// Whether the command passed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Failure reason, `None` for [`ValidationResult::Valid`].
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::InvalidUnit(reason)
            | Self::InvalidPosition(reason)
            | Self::InvalidTarget(reason)
            | Self::InsufficientResources(reason) => Some(reason),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::InvalidUnit(reason) => write!(f, "invalid unit: {reason}"),
            Self::InvalidPosition(reason) => write!(f, "invalid position: {reason}"),
            Self::InvalidTarget(reason) => write!(f, "invalid target: {reason}"),
            Self::InsufficientResources(reason) => write!(f, "insufficient resources: {reason}"),
        }
    }
}

type Check<T> = Result<T, ValidationResult>;

/// Validate one command against the snapshot it was generated from.
#[must_use]
pub fn validate(
    snapshot: &WorldSnapshot,
    ctx: &ExecutionContext,
    command: &Command,
) -> ValidationResult {
    match check(snapshot, ctx, command) {
        Ok(()) => ValidationResult::Valid,
        Err(failure) => failure,
    }
}

fn check(snapshot: &WorldSnapshot, ctx: &ExecutionContext, command: &Command) -> Check<()> {
    let source = source_unit(snapshot, command.source_unit())?;

    match command {
        Command::Move { target, .. } => in_bounds(snapshot, *target, "move target"),
        Command::SetTarget { position, .. } => in_bounds(snapshot, *position, "target position"),
        Command::Attack { target, .. } => match snapshot.unit(*target) {
            Some(unit) if unit.is_alive() => Ok(()),
            Some(_) => Err(ValidationResult::InvalidTarget(format!(
                "attack target {target} is dead"
            ))),
            None => Err(ValidationResult::InvalidTarget(format!(
                "attack target {target} does not exist"
            ))),
        },
        Command::Build {
            def_id, position, ..
        } => {
            in_bounds(snapshot, *position, "build site")?;
            if !ctx.allowed_builds.contains(def_id) {
                return Err(ValidationResult::InvalidTarget(format!(
                    "unit {} may not build type {def_id}",
                    source.id
                )));
            }
            match ctx.build_costs.get(def_id) {
                Some(cost) if !can_afford(snapshot.resources(), cost.metal, cost.energy) => {
                    Err(ValidationResult::InsufficientResources(format!(
                        "type {def_id} needs {} metal and {} energy",
                        cost.metal, cost.energy
                    )))
                }
                _ => Ok(()),
            }
        }
        Command::Stop { .. } => Ok(()),
        // Targets may be map features, so only the id itself is checked.
        Command::Guard { target, .. }
        | Command::Repair { target, .. }
        | Command::Reclaim { target, .. } => {
            if *target >= 0 {
                Ok(())
            } else {
                Err(ValidationResult::InvalidTarget(format!(
                    "target id {target} is not valid"
                )))
            }
        }
        Command::Patrol { waypoints, .. } => {
            if waypoints.is_empty() {
                return Err(ValidationResult::InvalidPosition(
                    "patrol has no waypoints".to_string(),
                ));
            }
            if waypoints.len() > MAX_PATROL_WAYPOINTS {
                return Err(ValidationResult::InvalidPosition(format!(
                    "patrol has {} waypoints, at most {MAX_PATROL_WAYPOINTS} allowed",
                    waypoints.len()
                )));
            }
            waypoints
                .iter()
                .try_for_each(|waypoint| in_bounds(snapshot, *waypoint, "patrol waypoint"))
        }
    }
}

fn source_unit(snapshot: &WorldSnapshot, id: UnitId) -> Check<Unit> {
    let unit = snapshot
        .unit(id)
        .ok_or_else(|| ValidationResult::InvalidUnit(format!("unit {id} does not exist")))?;
    if !unit.is_alive() {
        return Err(ValidationResult::InvalidUnit(format!("unit {id} is dead")));
    }
    if !unit.is_own() {
        return Err(ValidationResult::InvalidUnit(format!(
            "unit {id} belongs to team {}",
            unit.team_id
        )));
    }
    Ok(unit)
}

fn in_bounds(snapshot: &WorldSnapshot, position: Vec3Fixed, what: &str) -> Check<()> {
    if snapshot.map().contains(position) {
        Ok(())
    } else {
        Err(ValidationResult::InvalidPosition(format!(
            "{what} ({}, {}) is outside the map",
            position.x, position.z
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{RawResources, RawUnit};
    use crate::snapshot::MapInfo;

    fn raw(id: i32, def_id: i32, team_id: i32) -> RawUnit {
        RawUnit {
            id,
            def_id,
            x: 100.0,
            y: 0.0,
            z: 100.0,
            health: 100.0,
            max_health: 100.0,
            team_id,
            state_code: 0,
            velocity: [0.0; 3],
            being_built: false,
        }
    }

    fn snapshot(metal: f32) -> WorldSnapshot {
        let resources = RawResources {
            metal,
            energy: 800.0,
            metal_storage: 2000.0,
            energy_storage: 2000.0,
            tick: 10,
            ..RawResources::default()
        };
        WorldSnapshot::build(
            &[raw(1, 103, 0), raw(2, 200, 0), raw(9, 200, 1)],
            &resources,
            MapInfo::flat(1024, 1024),
            Fixed::from_num(1) / 30,
        )
        .unwrap()
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::default().with_build(101, "factory", BuildCost::from_ints(80, 0))
    }

    #[test]
    fn test_move_inside_map_is_valid() {
        let cmd = Command::Move {
            unit: 1,
            target: Vec3Fixed::from_ints(500, 0, 500),
        };
        assert_eq!(validate(&snapshot(1000.0), &ctx(), &cmd), ValidationResult::Valid);
    }

    #[test]
    fn test_move_outside_map_is_invalid_position() {
        let cmd = Command::Move {
            unit: 1,
            target: Vec3Fixed::from_ints(5000, 0, 10),
        };
        let result = validate(&snapshot(1000.0), &ctx(), &cmd);
        assert!(matches!(result, ValidationResult::InvalidPosition(_)));
    }

    #[test]
    fn test_missing_and_foreign_units_are_invalid() {
        let snap = snapshot(1000.0);
        let missing = Command::Stop { unit: 42 };
        let foreign = Command::Stop { unit: 9 };
        assert!(matches!(
            validate(&snap, &ctx(), &missing),
            ValidationResult::InvalidUnit(_)
        ));
        assert!(matches!(
            validate(&snap, &ctx(), &foreign),
            ValidationResult::InvalidUnit(_)
        ));
    }

    #[test]
    fn test_source_is_checked_before_position() {
        let cmd = Command::Move {
            unit: 42,
            target: Vec3Fixed::from_ints(-5, 0, -5),
        };
        assert!(matches!(
            validate(&snapshot(1000.0), &ctx(), &cmd),
            ValidationResult::InvalidUnit(_)
        ));
    }

    #[test]
    fn test_attack_requires_existing_target() {
        let snap = snapshot(1000.0);
        let ok = Command::Attack { unit: 2, target: 9 };
        let missing = Command::Attack { unit: 2, target: 77 };
        assert!(validate(&snap, &ctx(), &ok).is_valid());
        assert!(matches!(
            validate(&snap, &ctx(), &missing),
            ValidationResult::InvalidTarget(_)
        ));
    }

    #[test]
    fn test_build_checks_allowed_set_and_cost() {
        let build = |def_id| Command::Build {
            unit: 1,
            def_id,
            position: Vec3Fixed::from_ints(200, 0, 200),
        };
        assert!(validate(&snapshot(1000.0), &ctx(), &build(101)).is_valid());
        assert!(matches!(
            validate(&snapshot(1000.0), &ctx(), &build(555)),
            ValidationResult::InvalidTarget(_)
        ));
        assert!(matches!(
            validate(&snapshot(10.0), &ctx(), &build(101)),
            ValidationResult::InsufficientResources(_)
        ));
    }

    #[test]
    fn test_target_ids_are_not_resolved() {
        let snap = snapshot(1000.0);
        let feature = Command::Reclaim { unit: 1, target: 90_000 };
        let negative = Command::Guard { unit: 1, target: -1 };
        assert!(validate(&snap, &ctx(), &feature).is_valid());
        assert!(matches!(
            validate(&snap, &ctx(), &negative),
            ValidationResult::InvalidTarget(_)
        ));
    }

    #[test]
    fn test_patrol_waypoint_limits() {
        let snap = snapshot(1000.0);
        let point = Vec3Fixed::from_ints(10, 0, 10);
        let empty = Command::Patrol {
            unit: 2,
            waypoints: vec![],
        };
        let too_many = Command::Patrol {
            unit: 2,
            waypoints: vec![point; MAX_PATROL_WAYPOINTS + 1],
        };
        let outside = Command::Patrol {
            unit: 2,
            waypoints: vec![point, Vec3Fixed::from_ints(10, 0, 4000)],
        };
        let ok = Command::Patrol {
            unit: 2,
            waypoints: vec![point; MAX_PATROL_WAYPOINTS],
        };
        for cmd in [empty, too_many, outside] {
            assert!(matches!(
                validate(&snap, &ctx(), &cmd),
                ValidationResult::InvalidPosition(_)
            ));
        }
        assert!(validate(&snap, &ctx(), &ok).is_valid());
    }

    #[test]
    fn test_validation_is_repeatable() {
        let snap = snapshot(10.0);
        let cmd = Command::Build {
            unit: 1,
            def_id: 101,
            position: Vec3Fixed::from_ints(200, 0, 200),
        };
        assert_eq!(validate(&snap, &ctx(), &cmd), validate(&snap, &ctx(), &cmd));
    }

    #[test]
    fn test_reason_text() {
        let result = ValidationResult::InvalidUnit("unit 4 does not exist".into());
        assert_eq!(result.reason(), Some("unit 4 does not exist"));
        assert_eq!(result.to_string(), "invalid unit: unit 4 does not exist");
        assert_eq!(ValidationResult::Valid.reason(), None);
    }
}
