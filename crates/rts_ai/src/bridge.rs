//! Boundary contracts with the host engine.
//!
//! The engine bridge fills raw unit and resource data each tick and executes
//! command batches. Both directions are traits so the pipeline can be driven
//! by a live engine, a mock, or a recorded capture without changing the core.
//!
//! Only the semantic contract lives here. Struct layout for foreign calls is
//! the bridge's concern.

use serde::{Deserialize, Serialize};

use crate::command::CommandRecord;
use crate::error::{BoundaryError, SnapshotError};

/// One live unit as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawUnit {
    /// Unit id, unique within a tick.
    pub id: i32,
    /// Unit definition (type) id.
    pub def_id: i32,
    /// World x.
    pub x: f32,
    /// Elevation.
    pub y: f32,
    /// World z.
    pub z: f32,
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
    /// Owning team; 0 is our own team.
    pub team_id: i32,
    /// Raw [`UnitState`](crate::snapshot::UnitState) code.
    pub state_code: i32,
    /// Velocity in world units per second.
    #[serde(default)]
    pub velocity: [f32; 3],
    /// Whether the unit is still under construction.
    #[serde(default)]
    pub being_built: bool,
}

/// Unit data as parallel arrays, the layout the native bridge fills.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUnitColumns {
    /// Unit ids.
    pub ids: Vec<i32>,
    /// Definition ids.
    pub def_ids: Vec<i32>,
    /// Positions as `[x, y, z]`.
    pub positions: Vec<[f32; 3]>,
    /// Current health.
    pub health: Vec<f32>,
    /// Maximum health.
    pub max_health: Vec<f32>,
    /// Owning teams.
    pub team_ids: Vec<i32>,
    /// Raw state codes.
    pub state_codes: Vec<i32>,
}

impl RawUnitColumns {
    /// Zip the columns into rows.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::ColumnLengthMismatch`] naming the first
    /// column whose length differs from `ids`.
    pub fn into_rows(self) -> Result<Vec<RawUnit>, SnapshotError> {
        let expected = self.ids.len();
        let lengths = [
            ("def_ids", self.def_ids.len()),
            ("positions", self.positions.len()),
            ("health", self.health.len()),
            ("max_health", self.max_health.len()),
            ("team_ids", self.team_ids.len()),
            ("state_codes", self.state_codes.len()),
        ];
        if let Some(&(column, actual)) = lengths.iter().find(|(_, len)| *len != expected) {
            return Err(SnapshotError::ColumnLengthMismatch {
                column,
                expected,
                actual,
            });
        }

        let rows = self
            .ids
            .into_iter()
            .zip(self.def_ids)
            .zip(self.positions)
            .zip(self.health)
            .zip(self.max_health)
            .zip(self.team_ids)
            .zip(self.state_codes)
            .map(
                |((((((id, def_id), [x, y, z]), health), max_health), team_id), state_code)| {
                    RawUnit {
                        id,
                        def_id,
                        x,
                        y,
                        z,
                        health,
                        max_health,
                        team_id,
                        state_code,
                        velocity: [0.0; 3],
                        being_built: false,
                    }
                },
            )
            .collect();
        Ok(rows)
    }
}

/// Economy state for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResources {
    /// Metal stockpile.
    pub metal: f32,
    /// Energy stockpile.
    pub energy: f32,
    /// Metal income per second.
    pub metal_income: f32,
    /// Energy income per second.
    pub energy_income: f32,
    /// Metal storage capacity.
    pub metal_storage: f32,
    /// Energy storage capacity.
    pub energy_storage: f32,
    /// Current engine frame.
    pub tick: u64,
}

/// Static map description, fetched once per match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawMapInfo {
    /// Extent along world x.
    pub width: f32,
    /// Extent along world z.
    pub height: f32,
    /// Lowest terrain elevation.
    pub min_elevation: f32,
    /// Highest terrain elevation.
    pub max_elevation: f32,
}

/// What the engine reports after executing one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Commands the engine applied.
    pub success_count: usize,
    /// Commands the engine rejected.
    pub failure_count: usize,
    /// Engine-side execution time.
    pub elapsed_ms: f64,
    /// Reasons for rejected commands, when the engine supplies them.
    pub failure_reasons: Vec<String>,
}

/// Inbound half of the engine boundary.
pub trait EngineBridge {
    /// All live units this frame.
    ///
    /// # Errors
    /// Returns an error if the engine cannot be queried.
    fn fetch_raw_units(&mut self) -> Result<Vec<RawUnit>, BoundaryError>;

    /// Current economy state.
    ///
    /// # Errors
    /// Returns an error if the engine cannot be queried.
    fn fetch_resource_state(&mut self) -> Result<RawResources, BoundaryError>;

    /// Map description. Callers fetch this once and cache it.
    ///
    /// # Errors
    /// Returns an error if the engine cannot be queried.
    fn fetch_map_info(&mut self) -> Result<RawMapInfo, BoundaryError>;
}

/// Outbound half of the engine boundary.
pub trait CommandExecutor {
    /// Execute one ordered batch of resolved command records.
    ///
    /// Implementations enforce the engine's own timeout and report it as
    /// [`BoundaryError::Timeout`].
    ///
    /// # Errors
    /// Returns an error if the engine could not be reached at all. Commands
    /// the engine reached but rejected belong in [`BatchOutcome`].
    fn execute_batch(&mut self, commands: &[CommandRecord]) -> Result<BatchOutcome, BoundaryError>;

    /// The engine's current frame, if known.
    ///
    /// When this is newer than the snapshot a batch was validated against,
    /// the coordinator abandons the remaining batches.
    fn current_frame(&self) -> Option<u64> {
        None
    }
}
