//! Uniform grid index over a [`WorldSnapshot`].
//!
//! The grid is rebuilt from scratch every tick and never mutated afterwards.
//! Units are bucketed by their planar position (world x, world z) into
//! `resolution x resolution` square cells of side
//! `max(width, height) / resolution`. Positions outside the map are clamped
//! into the border cells, so every live unit is queryable.
//!
//! Buckets are stored contiguously (a counting sort over cell indices): one
//! offsets array and one array of snapshot rows. Within a cell, rows keep
//! ascending id order.
//!
//! All queries are exact. The grid only prunes which units get a distance
//! check; it never approximates the answer.

use crate::math::{DistanceSq, Fixed, Vec2Fixed, Vec3Fixed};
use crate::snapshot::{TeamId, Unit, UnitId, WorldSnapshot, OWN_TEAM};

/// Upper bound on grid resolution; keeps the cell table small.
pub const MAX_GRID_RESOLUTION: u32 = 1024;

/// Which teams a query should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TeamFilter {
    /// Every team.
    #[default]
    Any,
    /// Only our own team.
    Own,
    /// Every team except ours.
    Foes,
    /// One specific team.
    Team(TeamId),
}

impl TeamFilter {
    /// Whether a unit of `team` passes this filter.
    #[must_use]
    pub const fn matches(self, team: TeamId) -> bool {
        match self {
            Self::Any => true,
            Self::Own => team == OWN_TEAM,
            Self::Foes => team != OWN_TEAM,
            Self::Team(wanted) => team == wanted,
        }
    }
}

/// Grid index borrowed from one tick's snapshot.
#[derive(Debug, Clone)]
pub struct SpatialGrid<'a> {
    snapshot: &'a WorldSnapshot,
    resolution: usize,
    cell_size: Fixed,
    /// `cell_starts[c]..cell_starts[c + 1]` indexes `cell_rows` for cell `c`.
    cell_starts: Vec<usize>,
    cell_rows: Vec<usize>,
}

impl<'a> SpatialGrid<'a> {
    /// Bucket every unit of `snapshot` into a `resolution x resolution` grid.
    ///
    /// A resolution of zero is treated as one; resolutions above
    /// [`MAX_GRID_RESOLUTION`] are capped.
    #[must_use]
    pub fn build(snapshot: &'a WorldSnapshot, resolution: u32) -> Self {
        let resolution = resolution.clamp(1, MAX_GRID_RESOLUTION) as usize;
        let mut cell_size = snapshot.map().longest_side() / Fixed::from_num(resolution);
        if cell_size <= Fixed::ZERO {
            cell_size = Fixed::DELTA;
        }

        let mut grid = Self {
            snapshot,
            resolution,
            cell_size,
            cell_starts: vec![0; resolution * resolution + 1],
            cell_rows: vec![0; snapshot.len()],
        };

        let cells: Vec<usize> = snapshot
            .positions()
            .iter()
            .map(|&position| grid.cell_index_of(position))
            .collect();

        for &cell in &cells {
            grid.cell_starts[cell + 1] += 1;
        }
        for cell in 0..resolution * resolution {
            grid.cell_starts[cell + 1] += grid.cell_starts[cell];
        }
        let mut cursor = grid.cell_starts.clone();
        for (row, &cell) in cells.iter().enumerate() {
            grid.cell_rows[cursor[cell]] = row;
            cursor[cell] += 1;
        }

        tracing::trace!(
            tick = snapshot.tick(),
            resolution,
            units = snapshot.len(),
            "Spatial grid built"
        );
        grid
    }

    /// The snapshot this grid indexes.
    #[must_use]
    pub const fn snapshot(&self) -> &'a WorldSnapshot {
        self.snapshot
    }

    /// Cells per side.
    #[must_use]
    pub const fn resolution(&self) -> usize {
        self.resolution
    }

    /// Side length of a cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// Cell coordinate along one planar axis, clamped into the grid.
    fn axis_cell(&self, coord: Fixed) -> usize {
        let last = self.resolution - 1;
        match coord.checked_div(self.cell_size) {
            // Integer conversion discards the fraction towards -inf, i.e. floor.
            Some(quotient) => quotient.to_num::<i64>().clamp(0, last as i64) as usize,
            None if coord < Fixed::ZERO => 0,
            None => last,
        }
    }

    fn cell_index_of(&self, position: Vec3Fixed) -> usize {
        self.axis_cell(position.z) * self.resolution + self.axis_cell(position.x)
    }

    fn rows_in_cell(&self, cx: usize, cz: usize) -> &[usize] {
        let cell = cz * self.resolution + cx;
        &self.cell_rows[self.cell_starts[cell]..self.cell_starts[cell + 1]]
    }

    /// Cell coordinates `(x, z)` holding a unit.
    #[must_use]
    pub fn cell_of(&self, id: UnitId) -> Option<(usize, usize)> {
        let unit = self.snapshot.unit(id)?;
        Some((self.axis_cell(unit.position.x), self.axis_cell(unit.position.z)))
    }

    /// Ids of the units bucketed into one cell, ascending.
    #[must_use]
    pub fn cell_units(&self, cx: usize, cz: usize) -> Vec<UnitId> {
        if cx >= self.resolution || cz >= self.resolution {
            return Vec::new();
        }
        self.rows_in_cell(cx, cz)
            .iter()
            .map(|&row| self.snapshot.id_at(row))
            .collect()
    }

    /// Rows whose cells overlap the planar box `[min, max]`, then filtered by `keep`.
    fn scan_box(
        &self,
        min: Vec2Fixed,
        max: Vec2Fixed,
        mut keep: impl FnMut(usize) -> bool,
    ) -> Vec<usize> {
        let (x0, x1) = (self.axis_cell(min.x), self.axis_cell(max.x));
        let (z0, z1) = (self.axis_cell(min.y), self.axis_cell(max.y));

        let mut rows = Vec::new();
        for cz in z0..=z1 {
            for cx in x0..=x1 {
                rows.extend(self.rows_in_cell(cx, cz).iter().copied().filter(|&row| keep(row)));
            }
        }
        // Rows are id-ordered, so sorting rows sorts ids.
        rows.sort_unstable();
        rows
    }

    fn rows_in_radius(&self, center: Vec3Fixed, radius: Fixed, filter: TeamFilter) -> Vec<usize> {
        if radius < Fixed::ZERO {
            return Vec::new();
        }
        let radius_sq = DistanceSq::of_length(radius);
        let positions = self.snapshot.positions();
        let min = Vec2Fixed::new(center.x.saturating_sub(radius), center.z.saturating_sub(radius));
        let max = Vec2Fixed::new(center.x.saturating_add(radius), center.z.saturating_add(radius));

        self.scan_box(min, max, |row| {
            filter.matches(self.snapshot.team_at(row))
                && positions[row].distance_squared(center) <= radius_sq
        })
    }

    /// Ids of units whose Euclidean distance to `center` is at most `radius`,
    /// ascending. A negative radius matches nothing.
    #[must_use]
    pub fn units_in_radius(&self, center: Vec3Fixed, radius: Fixed) -> Vec<UnitId> {
        self.rows_in_radius(center, radius, TeamFilter::Any)
            .into_iter()
            .map(|row| self.snapshot.id_at(row))
            .collect()
    }

    /// Units within `radius` of `center` that pass `filter`, ascending by id.
    #[must_use]
    pub fn query_radius(&self, center: Vec3Fixed, radius: Fixed, filter: TeamFilter) -> Vec<Unit> {
        self.rows_in_radius(center, radius, filter)
            .into_iter()
            .map(|row| self.snapshot.row(row))
            .collect()
    }

    /// Ids of units whose planar position lies in the closed box
    /// `[min, max]`, ascending. `Vec2Fixed::y` is world z.
    #[must_use]
    pub fn units_in_rectangle(&self, min: Vec2Fixed, max: Vec2Fixed) -> Vec<UnitId> {
        if min.x > max.x || min.y > max.y {
            return Vec::new();
        }
        let positions = self.snapshot.positions();
        self.scan_box(min, max, |row| {
            let p = positions[row].planar();
            p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
        })
        .into_iter()
        .map(|row| self.snapshot.id_at(row))
        .collect()
    }

    /// Closest unit to `position` passing `filter`; ties go to the lowest id.
    ///
    /// Searches outward ring by ring. Cells on ring `k` around the query
    /// cell are at least `(k - 1) * cell_size` away on one planar axis, even
    /// for clamped border cells, so the search stops once that bound exceeds
    /// the best distance found.
    #[must_use]
    pub fn nearest(&self, position: Vec3Fixed, filter: TeamFilter) -> Option<Unit> {
        let qx = self.axis_cell(position.x);
        let qz = self.axis_cell(position.z);
        let positions = self.snapshot.positions();
        let mut best: Option<(DistanceSq, UnitId, usize)> = None;

        for ring in 0..self.resolution {
            if let Some((best_sq, _, _)) = best {
                if ring >= 1 {
                    let gap = self.cell_size.saturating_mul(Fixed::from_num(ring - 1));
                    if DistanceSq::of_length(gap) > best_sq {
                        break;
                    }
                }
            }

            for (cx, cz) in self.ring_cells(qx, qz, ring) {
                for &row in self.rows_in_cell(cx, cz) {
                    if !filter.matches(self.snapshot.team_at(row)) {
                        continue;
                    }
                    let dist_sq = positions[row].distance_squared(position);
                    let id = self.snapshot.id_at(row);
                    let better = match best {
                        None => true,
                        Some((best_sq, best_id, _)) => (dist_sq, id) < (best_sq, best_id),
                    };
                    if better {
                        best = Some((dist_sq, id, row));
                    }
                }
            }
        }

        best.map(|(_, _, row)| self.snapshot.row(row))
    }

    /// In-bounds cells at Chebyshev distance exactly `ring` from `(qx, qz)`.
    fn ring_cells(&self, qx: usize, qz: usize, ring: usize) -> Vec<(usize, usize)> {
        let res = self.resolution as i64;
        let (qx, qz, k) = (qx as i64, qz as i64, ring as i64);
        let mut cells = Vec::new();
        let mut push = |x: i64, z: i64| {
            if (0..res).contains(&x) && (0..res).contains(&z) {
                cells.push((x as usize, z as usize));
            }
        };

        if k == 0 {
            push(qx, qz);
            return cells;
        }
        for dx in -k..=k {
            push(qx + dx, qz - k);
            push(qx + dx, qz + k);
        }
        for dz in (-k + 1)..k {
            push(qx - k, qz + dz);
            push(qx + k, qz + dz);
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{RawResources, RawUnit};
    use crate::snapshot::MapInfo;
    use proptest::prelude::*;

    fn raw(id: i32, team: i32, x: f32, z: f32) -> RawUnit {
        RawUnit {
            id,
            def_id: 1,
            x,
            y: 0.0,
            z,
            health: 10.0,
            max_health: 10.0,
            team_id: team,
            state_code: 0,
            velocity: [0.0; 3],
            being_built: false,
        }
    }

    fn snapshot(units: &[RawUnit]) -> WorldSnapshot {
        snapshot_on(units, MapInfo::flat(1000, 1000))
    }

    fn snapshot_on(units: &[RawUnit], map: MapInfo) -> WorldSnapshot {
        WorldSnapshot::build(units, &RawResources::default(), map, Fixed::ZERO).unwrap()
    }

    /// Squared distance over raw bits in `i128`, independent of `DistanceSq`.
    fn wide_distance_sq(a: Vec3Fixed, b: Vec3Fixed) -> i128 {
        let axis = |p: Fixed, q: Fixed| {
            let d = i128::from(p.to_bits()) - i128::from(q.to_bits());
            d * d
        };
        axis(a.x, b.x) + axis(a.y, b.y) + axis(a.z, b.z)
    }

    fn brute_force_radius(
        snapshot: &WorldSnapshot,
        center: Vec3Fixed,
        radius: Fixed,
    ) -> Vec<UnitId> {
        if radius < Fixed::ZERO {
            return Vec::new();
        }
        let radius_bits = i128::from(radius.to_bits());
        snapshot
            .units()
            .filter(|u| wide_distance_sq(u.position, center) <= radius_bits * radius_bits)
            .map(|u| u.id)
            .collect()
    }

    fn brute_force_nearest(snapshot: &WorldSnapshot, query: Vec3Fixed) -> Option<UnitId> {
        snapshot
            .foe_units()
            .min_by_key(|u| (wide_distance_sq(u.position, query), u.id))
            .map(|u| u.id)
    }

    #[test]
    fn test_cell_size_follows_longest_side() {
        let snap = WorldSnapshot::empty(MapInfo::flat(800, 400));
        let grid = SpatialGrid::build(&snap, 8);
        assert_eq!(grid.cell_size(), Fixed::from_num(100));
    }

    #[test]
    fn test_out_of_bounds_units_are_clamped_not_dropped() {
        let snap = snapshot(&[raw(1, 0, -500.0, -20.0), raw(2, 0, 5000.0, 999.0)]);
        let grid = SpatialGrid::build(&snap, 10);
        assert_eq!(grid.cell_of(1), Some((0, 0)));
        assert_eq!(grid.cell_of(2), Some((9, 9)));
        assert_eq!(
            grid.units_in_radius(Vec3Fixed::from_ints(-500, 0, -20), Fixed::from_num(1)),
            vec![1]
        );
    }

    #[test]
    fn test_each_unit_in_exactly_one_cell() {
        let units: Vec<_> = (0..50)
            .map(|i| raw(i, i % 3, (i * 37 % 1000) as f32, (i * 91 % 1000) as f32))
            .collect();
        let snap = snapshot(&units);
        let grid = SpatialGrid::build(&snap, 7);

        let mut seen = Vec::new();
        for cz in 0..7 {
            for cx in 0..7 {
                seen.extend(grid.cell_units(cx, cz));
            }
        }
        seen.sort_unstable();
        let expected: Vec<_> = (0..50).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let snap = snapshot(&[raw(1, 0, 100.0, 100.0), raw(2, 0, 103.0, 104.0)]);
        let grid = SpatialGrid::build(&snap, 16);
        let center = Vec3Fixed::from_ints(100, 0, 100);
        assert_eq!(grid.units_in_radius(center, Fixed::from_num(5)), vec![1, 2]);
        assert_eq!(grid.units_in_radius(center, Fixed::from_num(4)), vec![1]);
        assert!(grid.units_in_radius(center, Fixed::from_num(-1)).is_empty());
    }

    #[test]
    fn test_rectangle_is_closed() {
        let snap = snapshot(&[
            raw(1, 0, 10.0, 10.0),
            raw(2, 0, 20.0, 20.0),
            raw(3, 0, 21.0, 20.0),
        ]);
        let grid = SpatialGrid::build(&snap, 4);
        let min = Vec2Fixed::new(Fixed::from_num(10), Fixed::from_num(10));
        let max = Vec2Fixed::new(Fixed::from_num(20), Fixed::from_num(20));
        assert_eq!(grid.units_in_rectangle(min, max), vec![1, 2]);
        assert!(grid.units_in_rectangle(max, min).is_empty());
    }

    #[test]
    fn test_nearest_breaks_ties_by_lowest_id() {
        let snap = snapshot(&[
            raw(7, 1, 110.0, 100.0),
            raw(3, 1, 90.0, 100.0),
            raw(9, 0, 100.0, 100.0),
        ]);
        let grid = SpatialGrid::build(&snap, 20);
        let found = grid.nearest(Vec3Fixed::from_ints(100, 0, 100), TeamFilter::Foes);
        assert_eq!(found.map(|u| u.id), Some(3));
        let own = grid.nearest(Vec3Fixed::from_ints(0, 0, 0), TeamFilter::Own);
        assert_eq!(own.map(|u| u.id), Some(9));
    }

    #[test]
    fn test_nearest_on_empty_snapshot_is_none() {
        let snap = WorldSnapshot::empty(MapInfo::flat(100, 100));
        let grid = SpatialGrid::build(&snap, 4);
        assert!(grid.nearest(Vec3Fixed::ZERO, TeamFilter::Any).is_none());
    }

    #[test]
    fn test_nearest_finds_far_unit_across_rings() {
        let snap = snapshot(&[raw(1, 2, 990.0, 990.0)]);
        let grid = SpatialGrid::build(&snap, 32);
        let found = grid.nearest(Vec3Fixed::from_ints(5, 0, 5), TeamFilter::Team(2));
        assert_eq!(found.map(|u| u.id), Some(1));
    }

    #[test]
    fn test_large_map_distances_do_not_saturate() {
        let map = MapInfo::flat(200_000, 200_000);
        let snap = snapshot_on(&[raw(1, 1, 121_000.0, 0.0), raw(2, 1, 100_000.0, 0.0)], map);
        let grid = SpatialGrid::build(&snap, 16);

        let nearest = grid.nearest(Vec3Fixed::ZERO, TeamFilter::Foes);
        assert_eq!(nearest.map(|u| u.id), Some(2));
        assert_eq!(grid.units_in_radius(Vec3Fixed::ZERO, Fixed::from_num(120_000)), vec![2]);
    }

    proptest! {
        /// The grid must agree exactly with a full distance scan.
        #[test]
        fn prop_radius_matches_brute_force(
            points in proptest::collection::vec((-200i32..1200, -200i32..1200, 0i32..3), 0..80),
            cx in -200i32..1200,
            cz in -200i32..1200,
            radius in -10i32..600,
            resolution in 1u32..40,
        ) {
            let units: Vec<_> = points
                .iter()
                .enumerate()
                .map(|(i, &(x, z, team))| raw(i as i32, team, x as f32, z as f32))
                .collect();
            let snap = snapshot(&units);
            let grid = SpatialGrid::build(&snap, resolution);
            let center = Vec3Fixed::from_ints(cx, 0, cz);
            let radius = Fixed::from_num(radius);

            prop_assert_eq!(
                grid.units_in_radius(center, radius),
                brute_force_radius(&snap, center, radius)
            );
        }

        /// Nearest must match a full scan with lowest-id tie breaking.
        #[test]
        fn prop_nearest_matches_brute_force(
            points in proptest::collection::vec((-200i32..1200, -200i32..1200, 0i32..3), 0..60),
            qx in -300i32..1300,
            qz in -300i32..1300,
            resolution in 1u32..40,
        ) {
            let units: Vec<_> = points
                .iter()
                .enumerate()
                .map(|(i, &(x, z, team))| raw(i as i32, team, x as f32, z as f32))
                .collect();
            let snap = snapshot(&units);
            let grid = SpatialGrid::build(&snap, resolution);
            let query = Vec3Fixed::from_ints(qx, 0, qz);

            prop_assert_eq!(
                grid.nearest(query, TeamFilter::Foes).map(|u| u.id),
                brute_force_nearest(&snap, query)
            );
        }

        /// Distances far beyond the square root of the fixed range stay exact.
        #[test]
        fn prop_large_map_queries_match_brute_force(
            points in proptest::collection::vec(
                (-1_000_000i32..1_000_000, -1_000_000i32..1_000_000, 0i32..3),
                0..40,
            ),
            qx in -1_000_000i32..1_000_000,
            qz in -1_000_000i32..1_000_000,
            radius in 0i32..1_500_000,
            resolution in 1u32..40,
        ) {
            let units: Vec<_> = points
                .iter()
                .enumerate()
                .map(|(i, &(x, z, team))| raw(i as i32, team, x as f32, z as f32))
                .collect();
            let snap = snapshot_on(&units, MapInfo::flat(1_000_000, 1_000_000));
            let grid = SpatialGrid::build(&snap, resolution);
            let query = Vec3Fixed::from_ints(qx, 0, qz);
            let radius = Fixed::from_num(radius);

            prop_assert_eq!(
                grid.units_in_radius(query, radius),
                brute_force_radius(&snap, query, radius)
            );
            prop_assert_eq!(
                grid.nearest(query, TeamFilter::Foes).map(|u| u.id),
                brute_force_nearest(&snap, query)
            );
        }
    }
}
