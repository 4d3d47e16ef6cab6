//! Immutable per-tick world model.
//!
//! A [`WorldSnapshot`] is built once per tick from raw engine data and dropped
//! at the end of the tick. Units are stored column-wise (structure of arrays)
//! sorted by id, so iteration order is deterministic and scans over a single
//! attribute stay cache-friendly. [`Unit`] is a `Copy` row view over those
//! columns; nothing in a snapshot is ever mutated after construction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bridge::{RawMapInfo, RawResources, RawUnit};
use crate::error::SnapshotError;
use crate::math::{fixed_from_f32, fixed_serde, Fixed, Vec2Fixed, Vec3Fixed};

/// Engine unit identifier.
pub type UnitId = i32;

/// Unit definition (type) identifier.
pub type DefId = i32;

/// Team identifier.
pub type TeamId = i32;

/// The team this AI plays for.
pub const OWN_TEAM: TeamId = 0;

/// What a unit is currently doing, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UnitState {
    /// No orders.
    #[default]
    Idle,
    /// Moving to a position.
    Moving,
    /// Constructing something.
    Building,
    /// Engaging a target.
    Attacking,
    /// Patrolling waypoints.
    Patrolling,
    /// Guarding another unit.
    Guarding,
    /// Reclaiming a feature or wreck.
    Reclaiming,
    /// Repairing another unit.
    Repairing,
    /// Falling back.
    Retreating,
}

impl UnitState {
    /// Map a raw engine state code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Idle,
            1 => Self::Moving,
            2 => Self::Building,
            3 => Self::Attacking,
            4 => Self::Patrolling,
            5 => Self::Guarding,
            6 => Self::Reclaiming,
            7 => Self::Repairing,
            8 => Self::Retreating,
            _ => return None,
        })
    }

    /// Raw engine state code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Idle => 0,
            Self::Moving => 1,
            Self::Building => 2,
            Self::Attacking => 3,
            Self::Patrolling => 4,
            Self::Guarding => 5,
            Self::Reclaiming => 6,
            Self::Repairing => 7,
            Self::Retreating => 8,
        }
    }

    /// Whether a foe in this state counts as a threat.
    #[must_use]
    pub const fn is_hostile_action(self) -> bool {
        matches!(self, Self::Attacking | Self::Patrolling)
    }
}

/// A live unit, read out of a snapshot by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Unit id.
    pub id: UnitId,
    /// Unit type.
    pub def_id: DefId,
    /// World position.
    pub position: Vec3Fixed,
    /// Current health, always positive in a snapshot.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Maximum health, always positive.
    #[serde(with = "fixed_serde")]
    pub max_health: Fixed,
    /// Owning team.
    pub team_id: TeamId,
    /// Current activity.
    pub state: UnitState,
    /// Velocity in world units per second.
    pub velocity: Vec3Fixed,
    /// Still under construction.
    pub being_built: bool,
}

impl Unit {
    /// Owned by this AI.
    #[must_use]
    pub const fn is_own(&self) -> bool {
        self.team_id == OWN_TEAM
    }

    /// Health above zero.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.health > Fixed::ZERO
    }

    /// `health / max_health`, in `(0, 1]` for any unit in a snapshot.
    #[must_use]
    pub fn health_ratio(&self) -> Fixed {
        self.health / self.max_health
    }
}

/// Economy state for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Metal stockpile, `0 <= metal <= metal_storage`.
    #[serde(with = "fixed_serde")]
    pub metal: Fixed,
    /// Energy stockpile, `0 <= energy <= energy_storage`.
    #[serde(with = "fixed_serde")]
    pub energy: Fixed,
    /// Metal income per second, never negative.
    #[serde(with = "fixed_serde")]
    pub metal_income: Fixed,
    /// Energy income per second, never negative.
    #[serde(with = "fixed_serde")]
    pub energy_income: Fixed,
    /// Metal storage cap.
    #[serde(with = "fixed_serde")]
    pub metal_storage: Fixed,
    /// Energy storage cap.
    #[serde(with = "fixed_serde")]
    pub energy_storage: Fixed,
    /// Engine frame these values belong to.
    pub tick: u64,
}

impl Resources {
    /// Convert and normalise raw economy data.
    ///
    /// Stockpiles above their storage cap are clamped to the cap.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::InvalidResources`] for negative or
    /// non-finite fields.
    pub fn from_raw(raw: &RawResources) -> Result<Self, SnapshotError> {
        let field = |name: &'static str, value: f32| -> Result<Fixed, SnapshotError> {
            match fixed_from_f32(value) {
                Some(v) if v >= Fixed::ZERO => Ok(v),
                _ => Err(SnapshotError::InvalidResources { field: name, value }),
            }
        };

        let metal_storage = field("metal_storage", raw.metal_storage)?;
        let energy_storage = field("energy_storage", raw.energy_storage)?;
        let mut metal = field("metal", raw.metal)?;
        let mut energy = field("energy", raw.energy)?;

        if metal > metal_storage {
            tracing::warn!(
                tick = raw.tick,
                metal = raw.metal,
                storage = raw.metal_storage,
                "Metal above storage cap, clamping"
            );
            metal = metal_storage;
        }
        if energy > energy_storage {
            tracing::warn!(
                tick = raw.tick,
                energy = raw.energy,
                storage = raw.energy_storage,
                "Energy above storage cap, clamping"
            );
            energy = energy_storage;
        }

        Ok(Self {
            metal,
            energy,
            metal_income: field("metal_income", raw.metal_income)?,
            energy_income: field("energy_income", raw.energy_income)?,
            metal_storage,
            energy_storage,
            tick: raw.tick,
        })
    }
}

/// Static map bounds. The playable area is `[0, width] x [0, height]` on the
/// planar axes (world x, world z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    /// Extent along world x.
    #[serde(with = "fixed_serde")]
    pub width: Fixed,
    /// Extent along world z.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
    /// Lowest terrain elevation.
    #[serde(with = "fixed_serde")]
    pub min_elevation: Fixed,
    /// Highest terrain elevation.
    #[serde(with = "fixed_serde")]
    pub max_elevation: Fixed,
}

impl MapInfo {
    /// Convert raw map data.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::InvalidMap`] for non-positive dimensions,
    /// non-finite values or inverted elevation bounds.
    pub fn from_raw(raw: &RawMapInfo) -> Result<Self, SnapshotError> {
        let convert = |name: &str, value: f32| {
            fixed_from_f32(value)
                .ok_or_else(|| SnapshotError::InvalidMap(format!("{name} is not finite: {value}")))
        };
        let width = convert("width", raw.width)?;
        let height = convert("height", raw.height)?;
        let min_elevation = convert("min_elevation", raw.min_elevation)?;
        let max_elevation = convert("max_elevation", raw.max_elevation)?;

        if width <= Fixed::ZERO || height <= Fixed::ZERO {
            return Err(SnapshotError::InvalidMap(format!(
                "dimensions must be positive, got {} x {}",
                raw.width, raw.height
            )));
        }
        if min_elevation > max_elevation {
            return Err(SnapshotError::InvalidMap(format!(
                "elevation bounds inverted: {} > {}",
                raw.min_elevation, raw.max_elevation
            )));
        }

        Ok(Self {
            width,
            height,
            min_elevation,
            max_elevation,
        })
    }

    /// Flat map of the given size, for tests and scenarios.
    #[must_use]
    pub fn flat(width: i32, height: i32) -> Self {
        Self {
            width: Fixed::from_num(width),
            height: Fixed::from_num(height),
            min_elevation: Fixed::ZERO,
            max_elevation: Fixed::ZERO,
        }
    }

    /// Back to boundary form, for captures.
    #[must_use]
    pub fn to_raw(&self) -> RawMapInfo {
        RawMapInfo {
            width: self.width.to_num(),
            height: self.height.to_num(),
            min_elevation: self.min_elevation.to_num(),
            max_elevation: self.max_elevation.to_num(),
        }
    }

    /// Whether the planar position lies inside the closed map rectangle.
    ///
    /// Elevation is not checked; terrain height varies under a position.
    #[must_use]
    pub fn contains(&self, position: Vec3Fixed) -> bool {
        position.x >= Fixed::ZERO
            && position.x <= self.width
            && position.z >= Fixed::ZERO
            && position.z <= self.height
    }

    /// Clamp a position onto the map rectangle, keeping its elevation.
    #[must_use]
    pub fn clamp(&self, position: Vec3Fixed) -> Vec3Fixed {
        Vec3Fixed::new(
            position.x.clamp(Fixed::ZERO, self.width),
            position.y,
            position.z.clamp(Fixed::ZERO, self.height),
        )
    }

    /// Planar map centre.
    #[must_use]
    pub fn center(&self) -> Vec2Fixed {
        let two = Fixed::from_num(2);
        Vec2Fixed::new(self.width / two, self.height / two)
    }

    /// The longer planar side.
    #[must_use]
    pub fn longest_side(&self) -> Fixed {
        self.width.max(self.height)
    }
}

/// Column storage for live units, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct UnitColumns {
    ids: Vec<UnitId>,
    def_ids: Vec<DefId>,
    positions: Vec<Vec3Fixed>,
    health: Vec<Fixed>,
    max_health: Vec<Fixed>,
    team_ids: Vec<TeamId>,
    states: Vec<UnitState>,
    velocities: Vec<Vec3Fixed>,
    being_built: Vec<bool>,
}

impl UnitColumns {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            def_ids: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            health: Vec::with_capacity(capacity),
            max_health: Vec::with_capacity(capacity),
            team_ids: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            being_built: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, unit: Unit) {
        self.ids.push(unit.id);
        self.def_ids.push(unit.def_id);
        self.positions.push(unit.position);
        self.health.push(unit.health);
        self.max_health.push(unit.max_health);
        self.team_ids.push(unit.team_id);
        self.states.push(unit.state);
        self.velocities.push(unit.velocity);
        self.being_built.push(unit.being_built);
    }

    fn row(&self, row: usize) -> Unit {
        Unit {
            id: self.ids[row],
            def_id: self.def_ids[row],
            position: self.positions[row],
            health: self.health[row],
            max_health: self.max_health[row],
            team_id: self.team_ids[row],
            state: self.states[row],
            velocity: self.velocities[row],
            being_built: self.being_built[row],
        }
    }
}

/// Convert one raw unit. `Ok(None)` means the unit is dead and filtered.
fn convert_unit(raw: &RawUnit) -> Result<Option<Unit>, SnapshotError> {
    let non_finite = |field| SnapshotError::NonFiniteUnitField {
        unit: raw.id,
        field,
    };

    let position = Vec3Fixed::from_f32(raw.x, raw.y, raw.z).ok_or_else(|| non_finite("position"))?;
    let velocity = Vec3Fixed::from_f32(raw.velocity[0], raw.velocity[1], raw.velocity[2])
        .ok_or_else(|| non_finite("velocity"))?;
    let mut health = fixed_from_f32(raw.health).ok_or_else(|| non_finite("health"))?;
    let max_health = fixed_from_f32(raw.max_health).ok_or_else(|| non_finite("max_health"))?;

    if health <= Fixed::ZERO {
        return Ok(None);
    }
    if max_health <= Fixed::ZERO {
        return Err(SnapshotError::InvalidMaxHealth {
            unit: raw.id,
            max_health: raw.max_health,
        });
    }
    let state = UnitState::from_code(raw.state_code).ok_or(SnapshotError::UnknownStateCode {
        unit: raw.id,
        code: raw.state_code,
    })?;
    if health > max_health {
        tracing::warn!(
            unit = raw.id,
            health = raw.health,
            max_health = raw.max_health,
            "Health above maximum, clamping"
        );
        health = max_health;
    }

    Ok(Some(Unit {
        id: raw.id,
        def_id: raw.def_id,
        position,
        health,
        max_health,
        team_id: raw.team_id,
        state,
        velocity,
        being_built: raw.being_built,
    }))
}

/// Immutable view of the world for one tick.
///
/// # Invariants
///
/// - Every unit has `health > 0` and `health <= max_health`.
/// - Unit ids are unique; rows are sorted by id.
/// - The own-team and foe row lists partition all rows by `team_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSnapshot {
    columns: UnitColumns,
    index: HashMap<UnitId, usize>,
    own_rows: Vec<usize>,
    foe_rows: Vec<usize>,
    resources: Resources,
    map: MapInfo,
    tick: u64,
    delta_seconds: Fixed,
}

impl WorldSnapshot {
    /// Build a snapshot from raw tick data.
    ///
    /// Dead units are dropped before anything else can see them. The tick
    /// number is taken from `raw_resources`.
    ///
    /// # Errors
    ///
    /// Returns a [`SnapshotError`] when the raw data is internally
    /// inconsistent. The caller should skip the tick.
    pub fn build(
        raw_units: &[RawUnit],
        raw_resources: &RawResources,
        map: MapInfo,
        delta_seconds: Fixed,
    ) -> Result<Self, SnapshotError> {
        let resources = Resources::from_raw(raw_resources)?;

        let mut live = Vec::with_capacity(raw_units.len());
        for raw in raw_units {
            if let Some(unit) = convert_unit(raw)? {
                live.push(unit);
            }
        }
        live.sort_unstable_by_key(|unit| unit.id);
        if let Some(pair) = live.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(SnapshotError::DuplicateUnitId(pair[0].id));
        }

        let mut columns = UnitColumns::with_capacity(live.len());
        let mut index = HashMap::with_capacity(live.len());
        let mut own_rows = Vec::new();
        let mut foe_rows = Vec::new();
        for (row, unit) in live.into_iter().enumerate() {
            index.insert(unit.id, row);
            if unit.is_own() {
                own_rows.push(row);
            } else {
                foe_rows.push(row);
            }
            columns.push(unit);
        }

        let dropped = raw_units.len() - columns.ids.len();
        tracing::debug!(
            tick = resources.tick,
            units = columns.ids.len(),
            own = own_rows.len(),
            foes = foe_rows.len(),
            dead_filtered = dropped,
            "World snapshot built"
        );

        Ok(Self {
            columns,
            index,
            own_rows,
            foe_rows,
            resources,
            map,
            tick: resources.tick,
            delta_seconds,
        })
    }

    /// A snapshot with no units and no resources.
    #[must_use]
    pub fn empty(map: MapInfo) -> Self {
        Self {
            columns: UnitColumns::default(),
            index: HashMap::new(),
            own_rows: Vec::new(),
            foe_rows: Vec::new(),
            resources: Resources::default(),
            map,
            tick: 0,
            delta_seconds: Fixed::ZERO,
        }
    }

    /// Engine frame of this snapshot.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Seconds elapsed since the previous snapshot.
    #[must_use]
    pub const fn delta_seconds(&self) -> Fixed {
        self.delta_seconds
    }

    /// Economy state.
    #[must_use]
    pub const fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Map bounds.
    #[must_use]
    pub const fn map(&self) -> &MapInfo {
        &self.map
    }

    /// Number of live units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.ids.len()
    }

    /// Whether there are no live units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.ids.is_empty()
    }

    /// Look up a live unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<Unit> {
        self.index.get(&id).map(|&row| self.columns.row(row))
    }

    /// Whether a live unit with this id exists.
    #[must_use]
    pub fn contains(&self, id: UnitId) -> bool {
        self.index.contains_key(&id)
    }

    /// All live units in ascending id order.
    pub fn units(&self) -> impl Iterator<Item = Unit> + '_ {
        (0..self.len()).map(|row| self.columns.row(row))
    }

    /// Own-team units in ascending id order.
    pub fn own_units(&self) -> impl Iterator<Item = Unit> + '_ {
        self.own_rows.iter().map(|&row| self.columns.row(row))
    }

    /// Units of every other team in ascending id order.
    pub fn foe_units(&self) -> impl Iterator<Item = Unit> + '_ {
        self.foe_rows.iter().map(|&row| self.columns.row(row))
    }

    /// Number of own-team units.
    #[must_use]
    pub fn own_count(&self) -> usize {
        self.own_rows.len()
    }

    /// Number of foe units.
    #[must_use]
    pub fn foe_count(&self) -> usize {
        self.foe_rows.len()
    }

    /// Position column, indexed by row.
    pub(crate) fn positions(&self) -> &[Vec3Fixed] {
        &self.columns.positions
    }

    /// Row view by row index.
    pub(crate) fn row(&self, row: usize) -> Unit {
        self.columns.row(row)
    }

    /// Id of a row.
    pub(crate) fn id_at(&self, row: usize) -> UnitId {
        self.columns.ids[row]
    }

    /// Team of a row.
    pub(crate) fn team_at(&self, row: usize) -> TeamId {
        self.columns.team_ids[row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: i32, team: i32, health: f32) -> RawUnit {
        RawUnit {
            id,
            def_id: 101,
            x: 10.0 * id as f32,
            y: 0.0,
            z: 5.0,
            health,
            max_health: 100.0,
            team_id: team,
            state_code: 0,
            velocity: [0.0; 3],
            being_built: false,
        }
    }

    fn resources() -> RawResources {
        RawResources {
            metal: 1000.0,
            energy: 800.0,
            metal_income: 5.0,
            energy_income: 20.0,
            metal_storage: 2000.0,
            energy_storage: 2000.0,
            tick: 42,
        }
    }

    fn build(units: &[RawUnit]) -> Result<WorldSnapshot, SnapshotError> {
        WorldSnapshot::build(units, &resources(), MapInfo::flat(1000, 1000), Fixed::ZERO)
    }

    #[test]
    fn test_dead_units_are_filtered() {
        let snapshot = build(&[raw(1, 0, 50.0), raw(2, 0, 0.0), raw(3, 1, -5.0)]).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(1));
        assert!(!snapshot.contains(2));
        assert!(!snapshot.contains(3));
    }

    #[test]
    fn test_partition_by_team() {
        let snapshot =
            build(&[raw(4, 2, 10.0), raw(1, 0, 10.0), raw(3, 0, 10.0), raw(2, 1, 10.0)]).unwrap();
        let own: Vec<_> = snapshot.own_units().map(|u| u.id).collect();
        let foes: Vec<_> = snapshot.foe_units().map(|u| u.id).collect();
        assert_eq!(own, vec![1, 3]);
        assert_eq!(foes, vec![2, 4]);
        assert_eq!(snapshot.own_count() + snapshot.foe_count(), snapshot.len());
    }

    #[test]
    fn test_units_iterate_in_id_order() {
        let snapshot = build(&[raw(9, 0, 1.0), raw(2, 1, 1.0), raw(5, 0, 1.0)]).unwrap();
        let ids: Vec<_> = snapshot.units().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = build(&[raw(1, 0, 10.0), raw(1, 1, 20.0)]).unwrap_err();
        assert_eq!(err, SnapshotError::DuplicateUnitId(1));
    }

    #[test]
    fn test_unknown_state_code_is_rejected() {
        let mut bad = raw(1, 0, 10.0);
        bad.state_code = 42;
        let err = build(&[bad]).unwrap_err();
        assert_eq!(err, SnapshotError::UnknownStateCode { unit: 1, code: 42 });
    }

    #[test]
    fn test_non_finite_position_is_rejected() {
        let mut bad = raw(1, 0, 10.0);
        bad.x = f32::NAN;
        assert!(matches!(
            build(&[bad]),
            Err(SnapshotError::NonFiniteUnitField { unit: 1, field: "position" })
        ));
    }

    #[test]
    fn test_zero_max_health_is_rejected() {
        let mut bad = raw(1, 0, 10.0);
        bad.max_health = 0.0;
        assert!(matches!(
            build(&[bad]),
            Err(SnapshotError::InvalidMaxHealth { unit: 1, .. })
        ));
    }

    #[test]
    fn test_health_above_max_is_clamped() {
        let snapshot = build(&[raw(1, 0, 150.0)]).unwrap();
        let unit = snapshot.unit(1).unwrap();
        assert_eq!(unit.health, unit.max_health);
        assert_eq!(unit.health_ratio(), Fixed::from_num(1));
    }

    #[test]
    fn test_resources_are_clamped_to_storage() {
        let mut res = resources();
        res.metal = 5000.0;
        let snapshot =
            WorldSnapshot::build(&[], &res, MapInfo::flat(100, 100), Fixed::ZERO).unwrap();
        assert_eq!(snapshot.resources().metal, Fixed::from_num(2000));
        assert_eq!(snapshot.tick(), 42);
    }

    #[test]
    fn test_negative_income_is_rejected() {
        let mut res = resources();
        res.metal_income = -1.0;
        let err =
            WorldSnapshot::build(&[], &res, MapInfo::flat(100, 100), Fixed::ZERO).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidResources { field: "metal_income", .. }
        ));
    }

    #[test]
    fn test_map_from_raw_rejects_zero_width() {
        let raw_map = RawMapInfo {
            width: 0.0,
            height: 100.0,
            min_elevation: 0.0,
            max_elevation: 10.0,
        };
        assert!(matches!(MapInfo::from_raw(&raw_map), Err(SnapshotError::InvalidMap(_))));
    }

    #[test]
    fn test_map_contains_is_closed() {
        let map = MapInfo::flat(100, 50);
        assert!(map.contains(Vec3Fixed::from_ints(0, 0, 0)));
        assert!(map.contains(Vec3Fixed::from_ints(100, 500, 50)));
        assert!(!map.contains(Vec3Fixed::from_ints(101, 0, 0)));
        assert!(!map.contains(Vec3Fixed::from_ints(0, 0, -1)));
    }

    #[test]
    fn test_state_codes_round_trip() {
        for code in 0..9 {
            let state = UnitState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert!(UnitState::from_code(9).is_none());
    }

    #[test]
    fn test_snapshot_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WorldSnapshot>();
    }
}
