//! Pure analysis over one tick's snapshot and grid.
//!
//! Every function here is read-only and total: empty snapshots and empty
//! stockpiles produce empty or negative answers, never errors. Results are
//! ordered by ascending unit id.

use std::collections::BTreeSet;

use crate::math::{DistanceSq, Fixed, Vec2Fixed, Vec3Fixed};
use crate::snapshot::{DefId, Resources, Unit, UnitState, WorldSnapshot};
use crate::spatial::{SpatialGrid, TeamFilter};

/// Units (any team) whose `health / max_health` is below `threshold`.
#[must_use]
pub fn damaged_units(snapshot: &WorldSnapshot, threshold: Fixed) -> Vec<Unit> {
    snapshot
        .units()
        .filter(|unit| unit.health_ratio() < threshold)
        .collect()
}

/// Own builders of an allowed type that are not currently building.
#[must_use]
pub fn idle_builders(snapshot: &WorldSnapshot, allowed_types: &BTreeSet<DefId>) -> Vec<Unit> {
    snapshot
        .own_units()
        .filter(|unit| allowed_types.contains(&unit.def_id) && unit.state != UnitState::Building)
        .collect()
}

/// Own military units of an allowed type with no orders.
#[must_use]
pub fn idle_military(snapshot: &WorldSnapshot, allowed_types: &BTreeSet<DefId>) -> Vec<Unit> {
    snapshot
        .own_units()
        .filter(|unit| allowed_types.contains(&unit.def_id) && unit.state == UnitState::Idle)
        .collect()
}

/// Both stockpiles cover the requested cost.
#[must_use]
pub fn can_afford(resources: &Resources, metal_cost: Fixed, energy_cost: Fixed) -> bool {
    resources.metal >= metal_cost && resources.energy >= energy_cost
}

/// Whole seconds of income needed before a cost becomes affordable.
///
/// `Some(0)` if affordable now; `None` if a shortfall exists with zero income
/// for that resource. Waits too long to represent saturate at `u32::MAX`.
#[must_use]
pub fn seconds_until_affordable(
    resources: &Resources,
    metal_cost: Fixed,
    energy_cost: Fixed,
) -> Option<u32> {
    fn wait(have: Fixed, cost: Fixed, income: Fixed) -> Option<u32> {
        if have >= cost {
            return Some(0);
        }
        if income <= Fixed::ZERO {
            return None;
        }
        // A tiny income can push the quotient past the fixed range.
        let seconds = cost
            .saturating_sub(have)
            .checked_div(income)
            .and_then(Fixed::checked_ceil)
            .map_or(u32::MAX, Fixed::saturating_to_num::<u32>);
        Some(seconds)
    }

    let metal = wait(resources.metal, metal_cost, resources.metal_income)?;
    let energy = wait(resources.energy, energy_cost, resources.energy_income)?;
    Some(metal.max(energy))
}

/// Foes within `radius` of `position` that are attacking or patrolling.
#[must_use]
pub fn threatening_enemies(
    grid: &SpatialGrid<'_>,
    position: Vec3Fixed,
    radius: Fixed,
) -> Vec<Unit> {
    grid.query_radius(position, radius, TeamFilter::Foes)
        .into_iter()
        .filter(|unit| unit.state.is_hostile_action())
        .collect()
}

/// Summary of enemy presence around a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreatAssessment {
    /// Foes in range, whatever they are doing.
    pub foes: usize,
    /// Foes in range that are attacking or patrolling.
    pub hostile: usize,
    /// Summed health of the hostile foes.
    pub hostile_health: Fixed,
}

impl ThreatAssessment {
    /// No hostile foes in range.
    #[must_use]
    pub const fn is_clear(&self) -> bool {
        self.hostile == 0
    }
}

/// Count foes and hostile foes within `radius` of `position`.
#[must_use]
pub fn threat_assessment(
    grid: &SpatialGrid<'_>,
    position: Vec3Fixed,
    radius: Fixed,
) -> ThreatAssessment {
    grid.query_radius(position, radius, TeamFilter::Foes)
        .into_iter()
        .fold(ThreatAssessment::default(), |mut acc, unit| {
            acc.foes += 1;
            if unit.state.is_hostile_action() {
                acc.hostile += 1;
                acc.hostile_health = acc.hostile_health.saturating_add(unit.health);
            }
            acc
        })
}

/// Planar centroid of our own units, or `None` with no own units.
#[must_use]
pub fn own_centroid(snapshot: &WorldSnapshot) -> Option<Vec2Fixed> {
    let count = snapshot.own_count();
    if count == 0 {
        return None;
    }
    let divisor = Fixed::from_num(count);
    let (sum_x, sum_z) = snapshot.own_units().fold((Fixed::ZERO, Fixed::ZERO), |(x, z), unit| {
        (
            x.saturating_add(unit.position.x / divisor),
            z.saturating_add(unit.position.z / divisor),
        )
    });
    Some(Vec2Fixed::new(sum_x, sum_z))
}

/// A position at least nominally away from nearby foes.
///
/// If no foe lies within `2 * safe_distance` of `reference`, the reference is
/// already safe and is returned unchanged. Otherwise the result is
/// `reference` moved `safe_distance` towards the map centre, clamped to the
/// map. When the reference sits exactly on the map centre, the direction is
/// taken towards our own units' centroid instead; `None` means no direction
/// could be derived and the caller should stop the unit rather than move it.
///
/// The direction is not checked for threats itself.
#[must_use]
pub fn find_safe_position(
    grid: &SpatialGrid<'_>,
    reference: Vec3Fixed,
    safe_distance: Fixed,
) -> Option<Vec3Fixed> {
    let snapshot = grid.snapshot();
    let scan_radius = safe_distance.saturating_mul(Fixed::from_num(2));
    if !foes_within(grid, reference, scan_radius) {
        return Some(reference);
    }

    let here = reference.planar();
    let mut direction = (snapshot.map().center() - here).normalize();
    if direction == Vec2Fixed::ZERO {
        let centroid = own_centroid(snapshot)?;
        direction = (centroid - here).normalize();
        if direction == Vec2Fixed::ZERO {
            return None;
        }
    }

    let step = direction.scale(safe_distance);
    let target = Vec3Fixed::new(
        reference.x.saturating_add(step.x),
        reference.y,
        reference.z.saturating_add(step.y),
    );
    Some(snapshot.map().clamp(target))
}

/// Most damaged own unit below `threshold` within `radius` of `position`;
/// ties go to the lowest id. Units still under construction are skipped.
#[must_use]
pub fn most_urgent_repair(
    grid: &SpatialGrid<'_>,
    position: Vec3Fixed,
    radius: Fixed,
    threshold: Fixed,
) -> Option<Unit> {
    grid.query_radius(position, radius, TeamFilter::Own)
        .into_iter()
        .filter(|unit| unit.health_ratio() < threshold && !unit.being_built)
        .min_by_key(|unit| (unit.health_ratio(), unit.id))
}

/// Whether any foe at all is within `radius` of `position`. A negative
/// radius matches nothing.
#[must_use]
pub fn foes_within(grid: &SpatialGrid<'_>, position: Vec3Fixed, radius: Fixed) -> bool {
    if radius < Fixed::ZERO {
        return false;
    }
    let radius_sq = DistanceSq::of_length(radius);
    grid.nearest(position, TeamFilter::Foes)
        .is_some_and(|unit| unit.position.distance_squared(position) <= radius_sq)
}
