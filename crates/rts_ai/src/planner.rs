//! Candidate command generation.
//!
//! The planner walks our units in ascending id order and gives each at most
//! one command. Rules are tried in a fixed order and the first that applies
//! wins: retreat, engage, build, repair, guard. Output depends only on the
//! grid's snapshot and the config, so replaying the same inputs always plans
//! the same commands.

use std::collections::BTreeSet;

use tracing::debug;

use crate::analysis::{
    find_safe_position, idle_builders, idle_military, most_urgent_repair, threatening_enemies,
};
use crate::command::Command;
use crate::config::AiConfig;
use crate::math::{DistanceSq, Fixed, Vec3Fixed};
use crate::snapshot::{Unit, UnitId, UnitState};
use crate::spatial::{SpatialGrid, TeamFilter};

/// Config values converted once per tick.
struct Params {
    retreat_threshold: Fixed,
    repair_threshold: Fixed,
    safe_distance: Fixed,
    threat_radius: Fixed,
    engage_radius_sq: DistanceSq,
    repair_radius: Fixed,
    build_offset: Fixed,
}

impl Params {
    fn from_config(config: &AiConfig) -> Self {
        Self {
            retreat_threshold: config.retreat_threshold(),
            repair_threshold: config.repair_threshold(),
            safe_distance: config.safe_distance(),
            threat_radius: config.threat_radius(),
            engage_radius_sq: DistanceSq::of_length(config.engage_radius()),
            repair_radius: config.repair_radius(),
            build_offset: config.build_offset(),
        }
    }
}

/// Stockpile left for builds this tick.
struct BuildBudget {
    metal: Fixed,
    energy: Fixed,
}

impl BuildBudget {
    fn try_spend(&mut self, metal: Fixed, energy: Fixed) -> bool {
        if self.metal >= metal && self.energy >= energy {
            self.metal -= metal;
            self.energy -= energy;
            true
        } else {
            false
        }
    }
}

/// Plan this tick's candidate commands.
#[must_use]
pub fn plan_commands(grid: &SpatialGrid<'_>, config: &AiConfig) -> Vec<Command> {
    let snapshot = grid.snapshot();
    let params = Params::from_config(config);
    let resources = snapshot.resources();
    let mut budget = BuildBudget {
        metal: resources.metal,
        energy: resources.energy,
    };

    let builders: BTreeSet<UnitId> = idle_builders(snapshot, &config.builder_types)
        .iter()
        .map(|unit| unit.id)
        .collect();
    let military: BTreeSet<UnitId> = idle_military(snapshot, &config.military_types)
        .iter()
        .map(|unit| unit.id)
        .collect();
    let all_builders: Vec<Unit> = snapshot
        .own_units()
        .filter(|unit| config.builder_types.contains(&unit.def_id))
        .collect();

    let mut commands = Vec::new();
    for unit in snapshot.own_units().filter(|unit| !unit.being_built) {
        let command = retreat(grid, &params, &unit)
            .or_else(|| {
                military
                    .contains(&unit.id)
                    .then(|| engage(grid, &params, &unit))
                    .flatten()
            })
            .or_else(|| {
                builders
                    .contains(&unit.id)
                    .then(|| build(grid, config, &params, &mut budget, &unit))
                    .flatten()
            })
            .or_else(|| {
                builders
                    .contains(&unit.id)
                    .then(|| repair(grid, &params, &unit))
                    .flatten()
            })
            .or_else(|| {
                military
                    .contains(&unit.id)
                    .then(|| guard(&all_builders, &unit))
                    .flatten()
            });
        if let Some(command) = command {
            commands.push(command);
        }
    }

    debug!(
        tick = snapshot.tick(),
        own = snapshot.own_count(),
        planned = commands.len(),
        "Planned commands"
    );
    commands
}

fn retreat(grid: &SpatialGrid<'_>, params: &Params, unit: &Unit) -> Option<Command> {
    if unit.health_ratio() >= params.retreat_threshold {
        return None;
    }
    if threatening_enemies(grid, unit.position, params.threat_radius).is_empty() {
        return None;
    }
    match find_safe_position(grid, unit.position, params.safe_distance) {
        Some(target) if target == unit.position => None,
        Some(target) => Some(Command::Move {
            unit: unit.id,
            target,
        }),
        None if unit.state == UnitState::Idle => None,
        None => Some(Command::Stop { unit: unit.id }),
    }
}

fn engage(grid: &SpatialGrid<'_>, params: &Params, unit: &Unit) -> Option<Command> {
    let foe = grid.nearest(unit.position, TeamFilter::Foes)?;
    let in_range = foe.position.distance_squared(unit.position) <= params.engage_radius_sq;
    in_range.then_some(Command::Attack {
        unit: unit.id,
        target: foe.id,
    })
}

fn build(
    grid: &SpatialGrid<'_>,
    config: &AiConfig,
    params: &Params,
    budget: &mut BuildBudget,
    unit: &Unit,
) -> Option<Command> {
    let option = config.build_catalogue.iter().find(|option| {
        let cost = option.cost();
        budget.try_spend(cost.metal, cost.energy)
    })?;
    let site = Vec3Fixed::new(
        unit.position.x.saturating_add(params.build_offset),
        unit.position.y,
        unit.position.z,
    );
    Some(Command::Build {
        unit: unit.id,
        def_id: option.def_id,
        position: grid.snapshot().map().clamp(site),
    })
}

fn repair(grid: &SpatialGrid<'_>, params: &Params, unit: &Unit) -> Option<Command> {
    let target =
        most_urgent_repair(grid, unit.position, params.repair_radius, params.repair_threshold)?;
    (target.id != unit.id).then_some(Command::Repair {
        unit: unit.id,
        target: target.id,
    })
}

fn guard(builders: &[Unit], unit: &Unit) -> Option<Command> {
    builders
        .iter()
        .filter(|builder| builder.id != unit.id)
        .min_by_key(|builder| (builder.position.distance_squared(unit.position), builder.id))
        .map(|builder| Command::Guard {
            unit: unit.id,
            target: builder.id,
        })
}
