//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the AI pipeline
//! produces identical commands given identical inputs.
//!
//! # Testing Strategy
//!
//! Captures are only useful if replaying them reproduces the original
//! decisions exactly. Sources of non-determinism include:
//!
//! - **Floating-point math**: Raw engine floats are converted to
//!   [`rts_ai::math::Fixed`] once, at snapshot construction.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Snapshots iterate in sorted unit id order.
//!
//! - **Unstable sorts**: Prioritization uses a stable sort so equal
//!   priorities keep their generation order.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual stages (grid, planner, prioritization)
//! 2. **Property tests**: Random unit sets still plan deterministically
//! 3. **Replay tests**: A capture played twice plans the same commands
//! 4. **Parallel tests**: Planning on N threads from one snapshot all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use rts_ai::capture::{CaptureBridge, TickCapture};
use rts_ai::config::AiConfig;
use rts_ai::driver::TickDriver;
use rts_ai::planner::plan_commands;
use rts_ai::snapshot::WorldSnapshot;
use rts_ai::spatial::SpatialGrid;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks per run.
    pub ticks: u64,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, ticks: u64) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            ticks,
        }
    }

    /// Get all unique hashes (should be 1 for a deterministic pipeline).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Pipeline is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a stateful process multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute a state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    DeterminismResult::from_hashes(hashes, ticks)
}

/// Hash of the commands planned for one snapshot.
#[must_use]
pub fn plan_hash(snapshot: &WorldSnapshot, config: &AiConfig) -> u64 {
    let grid = SpatialGrid::build(snapshot, config.grid_resolution);
    compute_hash(&plan_commands(&grid, config))
}

/// Replay a capture `runs` times through fresh drivers, hashing every
/// tick's planned commands.
///
/// Frames that fail snapshot construction contribute their tick number to
/// the hash, so a skipped tick is also part of what must reproduce.
///
/// # Panics
///
/// Panics if `config` is invalid.
pub fn verify_capture_replay(
    capture: &TickCapture,
    config: &AiConfig,
    runs: usize,
) -> DeterminismResult {
    let ticks = capture.len() as u64;
    let hashes = (0..runs)
        .map(|_| {
            let mut driver = TickDriver::new(config.clone())
                .unwrap_or_else(|err| panic!("invalid config: {err}"));
            let mut bridge = CaptureBridge::new(capture.clone());
            let mut hasher = DefaultHasher::new();
            for _ in 0..capture.len() {
                match driver.observe(&mut bridge) {
                    Ok(snapshot) => snapshot.tick().hash(&mut hasher),
                    Err(err) => err.to_string().hash(&mut hasher),
                }
                driver.plan().hash(&mut hasher);
            }
            hasher.finish()
        })
        .collect();
    DeterminismResult::from_hashes(hashes, ticks)
}

/// Plan the same snapshot on `threads` scoped threads and compare.
///
/// Snapshots and grids are shared read-only, so every thread must see the
/// same commands.
///
/// # Panics
///
/// Panics if a planning thread panics.
pub fn plan_in_parallel(
    snapshot: &WorldSnapshot,
    config: &AiConfig,
    threads: usize,
) -> DeterminismResult {
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| s.spawn(|| plan_hash(snapshot, config)))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| panic!("planning thread panicked")))
            .collect()
    });
    DeterminismResult::from_hashes(hashes, 1)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for pipeline testing.
///
/// These strategies generate random but reproducible raw engine data and
/// commands for property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use rts_ai::bridge::RawUnit;
    use rts_ai::command::Command;
    use rts_ai::math::{Fixed, Vec3Fixed};
    use rts_ai::snapshot::UnitState;

    use crate::fixtures::{BUILDER_TYPE, FACTORY_TYPE, MILITARY_TYPE};

    /// Generate a coordinate inside `[0, size]`.
    pub fn arb_coordinate(size: i32) -> impl Strategy<Value = Fixed> {
        (0..=size).prop_map(Fixed::from_num)
    }

    /// Generate a ground position on a `size` x `size` map.
    pub fn arb_position(size: i32) -> impl Strategy<Value = Vec3Fixed> {
        (arb_coordinate(size), arb_coordinate(size))
            .prop_map(|(x, z)| Vec3Fixed::new(x, Fixed::ZERO, z))
    }

    /// Generate a position that may lie off a `size` map by up to `size`.
    pub fn arb_loose_position(size: i32) -> impl Strategy<Value = Vec3Fixed> {
        ((-size..=2 * size), (-size..=2 * size)).prop_map(|(x, z)| Vec3Fixed::from_ints(x, 0, z))
    }

    /// Generate any unit state.
    pub fn arb_state() -> impl Strategy<Value = UnitState> {
        (0i32..=8).prop_map(|code| UnitState::from_code(code).unwrap_or_default())
    }

    /// Generate up to `max_units` live units with unique ids on a `size` map.
    ///
    /// Roughly half belong to team 0. Health is between 1% and 100%.
    pub fn arb_raw_units(max_units: usize, size: i32) -> impl Strategy<Value = Vec<RawUnit>> {
        let row = (
            prop_oneof![Just(BUILDER_TYPE), Just(MILITARY_TYPE), Just(300)],
            0i32..3,
            0..=size,
            0..=size,
            1u8..=100,
            arb_state(),
        );
        proptest::collection::vec(row, 0..max_units).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (def_id, team, x, z, health, state))| RawUnit {
                    id: i as i32 + 1,
                    def_id,
                    x: x as f32,
                    y: 0.0,
                    z: z as f32,
                    health: f32::from(health),
                    max_health: 100.0,
                    team_id: if team == 2 { 0 } else { team },
                    state_code: state.code(),
                    velocity: [0.0; 3],
                    being_built: false,
                })
                .collect()
        })
    }

    /// Generate any command for units `1..=max_unit`, with positions that may
    /// fall off a `size` map.
    pub fn arb_command(max_unit: i32, size: i32) -> impl Strategy<Value = Command> {
        let unit = 1..=max_unit;
        prop_oneof![
            (unit.clone(), arb_loose_position(size))
                .prop_map(|(unit, target)| Command::Move { unit, target }),
            (unit.clone(), 1..=max_unit)
                .prop_map(|(unit, target)| Command::Attack { unit, target }),
            (unit.clone(), arb_loose_position(size)).prop_map(|(unit, position)| Command::Build {
                unit,
                def_id: FACTORY_TYPE,
                position,
            }),
            unit.clone().prop_map(|unit| Command::Stop { unit }),
            (unit.clone(), -1..=max_unit)
                .prop_map(|(unit, target)| Command::Guard { unit, target }),
            (unit.clone(), proptest::collection::vec(arb_loose_position(size), 0..10))
                .prop_map(|(unit, waypoints)| Command::Patrol { unit, waypoints }),
            (unit.clone(), 0..=max_unit)
                .prop_map(|(unit, target)| Command::Reclaim { unit, target }),
            (unit.clone(), 1..=max_unit)
                .prop_map(|(unit, target)| Command::Repair { unit, target }),
            (unit, arb_position(size))
                .prop_map(|(unit, position)| Command::SetTarget { unit, position }),
        ]
    }

    /// Generate a sequence of commands.
    pub fn arb_command_sequence(
        max_len: usize,
        max_unit: i32,
        size: i32,
    ) -> impl Strategy<Value = Vec<Command>> {
        proptest::collection::vec(arb_command(max_unit, size), 0..max_len)
    }
}
