//! Test fixtures and helpers.
//!
//! Raw unit rows, resource states and ready-made snapshots for
//! consistent testing.

use fixed::types::I32F32;
use rts_ai::bridge::{RawMapInfo, RawResources, RawUnit};
use rts_ai::snapshot::{MapInfo, UnitState, WorldSnapshot};

/// Builder type id used by the default config.
pub const BUILDER_TYPE: i32 = 103;

/// Military type id used by the default config.
pub const MILITARY_TYPE: i32 = 200;

/// Type id the default config knows how to build.
pub const FACTORY_TYPE: i32 = 101;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// A full-health idle unit on the ground at `(x, z)`.
#[must_use]
pub fn raw_unit(id: i32, def_id: i32, team_id: i32, x: f32, z: f32) -> RawUnit {
    RawUnit {
        id,
        def_id,
        x,
        y: 0.0,
        z,
        health: 100.0,
        max_health: 100.0,
        team_id,
        state_code: UnitState::Idle.code(),
        velocity: [0.0; 3],
        being_built: false,
    }
}

/// Same as [`raw_unit`] with health and state overridden.
#[must_use]
pub fn raw_unit_with(
    id: i32,
    def_id: i32,
    team_id: i32,
    (x, z): (f32, f32),
    health: f32,
    state: UnitState,
) -> RawUnit {
    RawUnit {
        health,
        state_code: state.code(),
        ..raw_unit(id, def_id, team_id, x, z)
    }
}

/// Stockpiles with generous storage and no income.
#[must_use]
pub fn raw_resources(metal: f32, energy: f32, tick: u64) -> RawResources {
    RawResources {
        metal,
        energy,
        metal_storage: metal.max(10_000.0),
        energy_storage: energy.max(10_000.0),
        tick,
        ..RawResources::default()
    }
}

/// Square flat map in boundary form.
#[must_use]
pub fn raw_map(size: f32) -> RawMapInfo {
    RawMapInfo {
        width: size,
        height: size,
        min_elevation: 0.0,
        max_elevation: 0.0,
    }
}

/// Build a snapshot on a flat square map.
///
/// # Panics
///
/// Panics if the fixture data is inconsistent.
#[must_use]
pub fn snapshot(units: &[RawUnit], resources: &RawResources, map_size: i32) -> WorldSnapshot {
    WorldSnapshot::build(units, resources, MapInfo::flat(map_size, map_size), fixed(1) / 30)
        .unwrap_or_else(|err| panic!("fixture snapshot rejected: {err}"))
}

/// One idle builder with plenty of metal and energy on a 1024 map.
#[must_use]
pub fn lone_builder() -> WorldSnapshot {
    snapshot(
        &[raw_unit(1, BUILDER_TYPE, 0, 256.0, 256.0)],
        &raw_resources(1000.0, 800.0, 30),
        1024,
    )
}

/// `count` own military units and `count` foes spread over a `map_size` map.
#[must_use]
pub fn skirmish_units(count: i32, map_size: i32) -> Vec<RawUnit> {
    let size = map_size as f32;
    (0..count)
        .flat_map(|i| {
            let f = i as f32;
            let own_x = (f * 37.0) % (size / 2.0);
            let own_z = (f * 53.0) % size;
            let foe_x = size - (f * 41.0) % (size / 2.0);
            let foe_z = (f * 29.0) % size;
            let own_def = if i % 4 == 0 { BUILDER_TYPE } else { MILITARY_TYPE };
            [
                raw_unit(i * 2 + 1, own_def, 0, own_x, own_z),
                raw_unit_with(
                    i * 2 + 2,
                    300,
                    1,
                    (foe_x, foe_z),
                    60.0,
                    if i % 3 == 0 { UnitState::Attacking } else { UnitState::Moving },
                ),
            ]
        })
        .collect()
}
