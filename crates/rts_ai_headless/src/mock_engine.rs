//! In-process stand-in for the host engine.
//!
//! The mock serves raw unit and resource data through [`EngineBridge`] and
//! applies command records through [`CommandExecutor`]. Between AI ticks the
//! runner calls [`MockEngine::advance`] to move units, resolve attacks,
//! progress construction and collect income. The world is simulated with
//! plain floats, like a real engine would report it.
//!
//! Faults can be injected to exercise every error path of the pipeline.

use std::collections::{BTreeMap, BTreeSet};

use rts_ai::bridge::{
    BatchOutcome, CommandExecutor, EngineBridge, RawMapInfo, RawResources, RawUnit,
};
use rts_ai::command::{CommandRecord, CommandType, NO_TARGET};
use rts_ai::driver::TICK_RATE;
use rts_ai::error::BoundaryError;
use rts_ai::snapshot::{UnitState, OWN_TEAM};
use tracing::{debug, trace};

use crate::scenario::{ResourceSetup, Scenario, UnitTypeSpec};

/// Seconds per engine frame.
const FRAME_SECONDS: f32 = 1.0 / TICK_RATE as f32;

/// Guards stay within this distance of their charge.
const GUARD_DISTANCE: f32 = 60.0;

/// Health restored per second while repairing.
const REPAIR_RATE: f32 = 25.0;

/// Fraction of max health a structure starts with.
const FOUNDATION_HEALTH: f32 = 0.05;

/// Spacing between units of one placement.
const PLACEMENT_SPACING: f32 = 24.0;

/// Faults the mock can be told to produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Faults {
    /// Inbound fetches fail.
    pub input_unavailable: bool,
    /// Every batch call times out.
    pub execution_timeout: bool,
    /// Commands for these units are rejected by the engine.
    pub rejected_units: BTreeSet<i32>,
    /// The first unit is reported twice.
    pub duplicate_report: bool,
    /// The engine frame moves on after each batch, leaving later batches stale.
    pub advance_during_execution: bool,
    /// Elapsed time reported per batch.
    pub batch_elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Order {
    Hold,
    MoveTo([f32; 3]),
    Attack(i32),
    Build(i32),
    Guard(i32),
    Patrol { waypoints: Vec<[f32; 3]>, next: usize },
    Reclaim(i32),
    Repair(i32),
    Aim([f32; 3]),
}

/// One unit in the mock world.
#[derive(Debug, Clone, PartialEq)]
pub struct MockUnit {
    /// Unit id.
    pub id: i32,
    /// Unit type.
    pub def_id: i32,
    /// Owning team.
    pub team_id: i32,
    /// World position.
    pub position: [f32; 3],
    /// Velocity over the last frame.
    pub velocity: [f32; 3],
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
    /// Reported state.
    pub state: UnitState,
    /// Still under construction.
    pub being_built: bool,
    order: Order,
}

impl MockUnit {
    fn set_order(&mut self, order: Order, state: UnitState) {
        self.order = order;
        self.state = state;
    }

    fn go_idle(&mut self) {
        self.set_order(Order::Hold, UnitState::Idle);
        self.velocity = [0.0; 3];
    }

    fn raw(&self) -> RawUnit {
        RawUnit {
            id: self.id,
            def_id: self.def_id,
            x: self.position[0],
            y: self.position[1],
            z: self.position[2],
            health: self.health,
            max_health: self.max_health,
            team_id: self.team_id,
            state_code: self.state.code(),
            velocity: self.velocity,
            being_built: self.being_built,
        }
    }
}

enum Effect {
    Damage { target: i32, amount: f32 },
    Heal { target: i32, amount: f32 },
    Reclaim { target: i32 },
}

/// Engine double implementing both boundary traits.
#[derive(Debug, Clone)]
pub struct MockEngine {
    unit_types: BTreeMap<i32, UnitTypeSpec>,
    units: BTreeMap<i32, MockUnit>,
    next_id: i32,
    frame: u64,
    economy: ResourceSetup,
    map: RawMapInfo,
    faults: Faults,
    executed: Vec<CommandRecord>,
    batches: usize,
}

impl MockEngine {
    /// Empty world of the given size with the scenario defaults.
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            unit_types: UnitTypeSpec::defaults()
                .into_iter()
                .map(|spec| (spec.def_id, spec))
                .collect(),
            units: BTreeMap::new(),
            next_id: 1,
            frame: 0,
            economy: ResourceSetup::default(),
            map: RawMapInfo {
                width,
                height,
                min_elevation: 0.0,
                max_elevation: 0.0,
            },
            faults: Faults::default(),
            executed: Vec::new(),
            batches: 0,
        }
    }

    /// World as described by `scenario`.
    #[must_use]
    pub fn from_scenario(scenario: &Scenario) -> Self {
        let (width, height) = scenario.map_size;
        let mut engine = Self::new(width, height);
        engine.map.min_elevation = scenario.elevation.0;
        engine.map.max_elevation = scenario.elevation.1;
        engine.economy = scenario.resources;
        for spec in &scenario.unit_types {
            engine.unit_types.insert(spec.def_id, spec.clone());
        }
        for placement in &scenario.units {
            for i in 0..placement.count {
                let x = placement.position.0 + i as f32 * PLACEMENT_SPACING;
                let id = engine.spawn(placement.def_id, placement.team_id, x, placement.position.1);
                if let Some(unit) = engine.units.get_mut(&id) {
                    unit.health = (unit.max_health * placement.health_ratio).max(1.0);
                    unit.state = UnitState::from_code(placement.state_code).unwrap_or_default();
                }
            }
        }
        debug!(
            scenario = %scenario.name,
            units = engine.units.len(),
            "Mock engine loaded scenario"
        );
        engine
    }

    /// Add a complete, idle unit and return its id.
    pub fn spawn(&mut self, def_id: i32, team_id: i32, x: f32, z: f32) -> i32 {
        let spec = self.unit_type(def_id);
        let id = self.next_id;
        self.next_id += 1;
        let position = self.clamp([x, 0.0, z]);
        self.units.insert(
            id,
            MockUnit {
                id,
                def_id,
                team_id,
                position,
                velocity: [0.0; 3],
                health: spec.max_health,
                max_health: spec.max_health,
                state: UnitState::Idle,
                being_built: false,
                order: Order::Hold,
            },
        );
        id
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: i32) -> Option<&MockUnit> {
        self.units.get(&id)
    }

    /// Mutable access to a unit, for test setup.
    pub fn unit_mut(&mut self, id: i32) -> Option<&mut MockUnit> {
        self.units.get_mut(&id)
    }

    /// All units in id order.
    pub fn units(&self) -> impl Iterator<Item = &MockUnit> {
        self.units.values()
    }

    /// Live units of team 0.
    #[must_use]
    pub fn own_count(&self) -> usize {
        self.units.values().filter(|u| u.team_id == OWN_TEAM).count()
    }

    /// Live units of other teams.
    #[must_use]
    pub fn foe_count(&self) -> usize {
        self.units.len() - self.own_count()
    }

    /// Current engine frame.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Current economy.
    #[must_use]
    pub fn economy(&self) -> &ResourceSetup {
        &self.economy
    }

    /// Fault switches.
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Every record the engine has been asked to execute.
    #[must_use]
    pub fn executed(&self) -> &[CommandRecord] {
        &self.executed
    }

    /// Number of batch calls that reached the engine.
    #[must_use]
    pub const fn batches(&self) -> usize {
        self.batches
    }

    /// Simulate `frames` engine frames.
    pub fn advance(&mut self, frames: u64) {
        for _ in 0..frames {
            self.step();
        }
    }

    fn unit_type(&self, def_id: i32) -> UnitTypeSpec {
        self.unit_types
            .get(&def_id)
            .cloned()
            .unwrap_or_else(|| UnitTypeSpec::generic(def_id))
    }

    fn clamp(&self, [x, y, z]: [f32; 3]) -> [f32; 3] {
        [x.clamp(0.0, self.map.width), y, z.clamp(0.0, self.map.height)]
    }

    fn step(&mut self) {
        let e = &mut self.economy;
        e.metal = (e.metal + e.metal_income * FRAME_SECONDS).min(e.metal_storage);
        e.energy = (e.energy + e.energy_income * FRAME_SECONDS).min(e.energy_storage);

        let ids: Vec<i32> = self.units.keys().copied().collect();
        let mut effects = Vec::new();
        for id in ids {
            let Some(mut unit) = self.units.get(&id).cloned() else {
                continue;
            };
            let spec = self.unit_type(unit.def_id);
            self.act(&mut unit, &spec, &mut effects);
            self.units.insert(id, unit);
        }

        for effect in effects {
            self.apply(effect);
        }
        self.frame += 1;
    }

    fn act(&self, unit: &mut MockUnit, spec: &UnitTypeSpec, effects: &mut Vec<Effect>) {
        let step = spec.speed * FRAME_SECONDS;
        unit.velocity = [0.0; 3];
        match unit.order.clone() {
            Order::Hold => {
                if unit.team_id != OWN_TEAM && unit.state.is_hostile_action() {
                    let prey = self
                        .units
                        .values()
                        .filter(|u| u.team_id == OWN_TEAM)
                        .min_by(|a, b| {
                            let to_a = distance(a.position, unit.position);
                            to_a.total_cmp(&distance(b.position, unit.position))
                        });
                    if let Some(prey) = prey {
                        self.engage(unit, spec, prey.id, prey.position, effects);
                    }
                }
            }
            Order::MoveTo(dest) => {
                if move_toward(unit, dest, step) {
                    unit.go_idle();
                }
            }
            Order::Attack(target) => match self.units.get(&target) {
                Some(t) => self.engage(unit, spec, t.id, t.position, effects),
                None => unit.go_idle(),
            },
            Order::Build(structure) => match self.units.get(&structure) {
                Some(s) if s.being_built => {
                    let build_time = self.unit_type(s.def_id).build_time.max(FRAME_SECONDS);
                    let rate = s.max_health / build_time;
                    effects.push(Effect::Heal {
                        target: structure,
                        amount: rate * FRAME_SECONDS,
                    });
                }
                _ => unit.go_idle(),
            },
            Order::Guard(target) => match self.units.get(&target) {
                Some(t) if distance(unit.position, t.position) > GUARD_DISTANCE => {
                    move_toward(unit, t.position, step);
                }
                Some(_) => {}
                None => unit.go_idle(),
            },
            Order::Patrol { waypoints, next } => {
                if let Some(&dest) = waypoints.get(next) {
                    if move_toward(unit, dest, step) {
                        let next = (next + 1) % waypoints.len();
                        unit.order = Order::Patrol { waypoints, next };
                    }
                } else {
                    unit.go_idle();
                }
            }
            Order::Reclaim(target) => match self.units.get(&target) {
                Some(t) if distance(unit.position, t.position) <= spec.range => {
                    effects.push(Effect::Reclaim { target });
                    unit.go_idle();
                }
                Some(t) => {
                    move_toward(unit, t.position, step);
                }
                None => unit.go_idle(),
            },
            Order::Repair(target) => match self.units.get(&target) {
                Some(t) if t.health < t.max_health => {
                    if distance(unit.position, t.position) <= spec.range {
                        effects.push(Effect::Heal {
                            target,
                            amount: REPAIR_RATE * FRAME_SECONDS,
                        });
                    } else {
                        move_toward(unit, t.position, step);
                    }
                }
                _ => unit.go_idle(),
            },
            Order::Aim(_) => {}
        }
    }

    fn engage(
        &self,
        unit: &mut MockUnit,
        spec: &UnitTypeSpec,
        target: i32,
        position: [f32; 3],
        effects: &mut Vec<Effect>,
    ) {
        if distance(unit.position, position) <= spec.range {
            effects.push(Effect::Damage {
                target,
                amount: spec.damage * FRAME_SECONDS,
            });
        } else {
            move_toward(unit, position, spec.speed * FRAME_SECONDS);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Damage { target, amount } => {
                if let Some(unit) = self.units.get_mut(&target) {
                    unit.health -= amount;
                    if unit.health <= 0.0 {
                        trace!(unit = target, frame = self.frame, "Unit destroyed");
                        self.units.remove(&target);
                    }
                }
            }
            Effect::Heal { target, amount } => {
                if let Some(unit) = self.units.get_mut(&target) {
                    unit.health = (unit.health + amount).min(unit.max_health);
                    if unit.being_built && unit.health >= unit.max_health {
                        unit.being_built = false;
                        trace!(unit = target, frame = self.frame, "Construction finished");
                    }
                }
            }
            Effect::Reclaim { target } => {
                if let Some(unit) = self.units.remove(&target) {
                    let e = &mut self.economy;
                    e.metal = (e.metal + unit.max_health * 0.1).min(e.metal_storage);
                }
            }
        }
    }

    fn apply_record(&mut self, record: &CommandRecord) -> Result<(), String> {
        let source = record.source_unit_id;
        if self.faults.rejected_units.contains(&source) {
            return Err(format!("unit {source}: rejected by engine"));
        }
        match self.units.get(&source) {
            Some(unit) if unit.team_id == OWN_TEAM => {}
            _ => return Err(format!("unit {source} not found")),
        }
        let kind = record
            .kind()
            .ok_or_else(|| format!("unit {source}: unknown command code {}", record.command_type))?;
        let position = self.clamp([record.x, record.y, record.z]);
        let target = record.target_unit_id;

        let (order, state) = match kind {
            CommandType::Move => (Order::MoveTo(position), UnitState::Moving),
            CommandType::Build => {
                let structure = self.start_construction(record, position)?;
                (Order::Build(structure), UnitState::Building)
            }
            CommandType::Attack => {
                self.require_target(source, target)?;
                (Order::Attack(target), UnitState::Attacking)
            }
            CommandType::Stop => (Order::Hold, UnitState::Idle),
            CommandType::Guard => {
                self.require_target(source, target)?;
                (Order::Guard(target), UnitState::Guarding)
            }
            CommandType::Patrol => {
                let mut waypoints = vec![position];
                waypoints.extend(record.extra_positions.iter().map(|&p| self.clamp(p)));
                (Order::Patrol { waypoints, next: 0 }, UnitState::Patrolling)
            }
            CommandType::Reclaim => (Order::Reclaim(target), UnitState::Reclaiming),
            CommandType::Repair => {
                self.require_target(source, target)?;
                (Order::Repair(target), UnitState::Repairing)
            }
            CommandType::SetTarget => {
                let state = self.units.get(&source).map_or(UnitState::Idle, |u| u.state);
                (Order::Aim(position), state)
            }
        };
        if let Some(unit) = self.units.get_mut(&source) {
            unit.set_order(order, state);
        }
        Ok(())
    }

    fn require_target(&self, source: i32, target: i32) -> Result<(), String> {
        if target != NO_TARGET && self.units.contains_key(&target) {
            Ok(())
        } else {
            Err(format!("unit {source}: target {target} not found"))
        }
    }

    fn start_construction(
        &mut self,
        record: &CommandRecord,
        position: [f32; 3],
    ) -> Result<i32, String> {
        let spec = self.unit_type(record.build_def_id);
        if self.economy.metal < spec.metal_cost || self.economy.energy < spec.energy_cost {
            return Err(format!(
                "unit {}: cannot afford type {}",
                record.source_unit_id, record.build_def_id
            ));
        }
        self.economy.metal -= spec.metal_cost;
        self.economy.energy -= spec.energy_cost;

        let id = self.spawn(record.build_def_id, OWN_TEAM, position[0], position[2]);
        if let Some(structure) = self.units.get_mut(&id) {
            structure.being_built = true;
            structure.health = structure.max_health * FOUNDATION_HEALTH;
        }
        debug!(
            builder = record.source_unit_id,
            structure = id,
            def_id = record.build_def_id,
            name = %record.build_name,
            "Construction started"
        );
        Ok(id)
    }
}

impl EngineBridge for MockEngine {
    fn fetch_raw_units(&mut self) -> Result<Vec<RawUnit>, BoundaryError> {
        if self.faults.input_unavailable {
            return Err(BoundaryError::Unavailable("unit query failed".to_string()));
        }
        let mut units: Vec<RawUnit> = self.units.values().map(MockUnit::raw).collect();
        if self.faults.duplicate_report {
            if let Some(&first) = units.first() {
                units.push(first);
            }
        }
        Ok(units)
    }

    fn fetch_resource_state(&mut self) -> Result<RawResources, BoundaryError> {
        if self.faults.input_unavailable {
            return Err(BoundaryError::Unavailable("resource query failed".to_string()));
        }
        let e = &self.economy;
        Ok(RawResources {
            metal: e.metal,
            energy: e.energy,
            metal_income: e.metal_income,
            energy_income: e.energy_income,
            metal_storage: e.metal_storage,
            energy_storage: e.energy_storage,
            tick: self.frame,
        })
    }

    fn fetch_map_info(&mut self) -> Result<RawMapInfo, BoundaryError> {
        if self.faults.input_unavailable {
            return Err(BoundaryError::Unavailable("map query failed".to_string()));
        }
        Ok(self.map)
    }
}

impl CommandExecutor for MockEngine {
    fn execute_batch(&mut self, commands: &[CommandRecord]) -> Result<BatchOutcome, BoundaryError> {
        if self.faults.execution_timeout {
            return Err(BoundaryError::Timeout { timeout_ms: 50 });
        }
        let mut outcome = BatchOutcome {
            elapsed_ms: self.faults.batch_elapsed_ms,
            ..BatchOutcome::default()
        };
        for record in commands {
            match self.apply_record(record) {
                Ok(()) => outcome.success_count += 1,
                Err(reason) => {
                    outcome.failure_count += 1;
                    outcome.failure_reasons.push(reason);
                }
            }
        }
        self.executed.extend_from_slice(commands);
        self.batches += 1;
        if self.faults.advance_during_execution {
            self.frame += 1;
        }
        Ok(outcome)
    }

    fn current_frame(&self) -> Option<u64> {
        Some(self.frame)
    }
}

fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Move at most `step` along the ground towards `dest`. Returns true on arrival.
fn move_toward(unit: &mut MockUnit, dest: [f32; 3], step: f32) -> bool {
    let dx = dest[0] - unit.position[0];
    let dz = dest[2] - unit.position[2];
    let remaining = (dx * dx + dz * dz).sqrt();
    if remaining <= step {
        unit.position = [dest[0], unit.position[1], dest[2]];
        return true;
    }
    if step <= 0.0 {
        return false;
    }
    let (vx, vz) = (dx / remaining * step, dz / remaining * step);
    unit.position[0] += vx;
    unit.position[2] += vz;
    unit.velocity = [vx / FRAME_SECONDS, 0.0, vz / FRAME_SECONDS];
    false
}
