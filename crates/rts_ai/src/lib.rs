//! # RTS AI
//!
//! Per-tick decision pipeline for an AI player in a real-time strategy engine.
//!
//! Each tick the engine's raw unit and resource data become an immutable
//! [`WorldSnapshot`](snapshot::WorldSnapshot), indexed by a
//! [`SpatialGrid`](spatial::SpatialGrid), analysed by pure functions, turned
//! into candidate [`Command`](command::Command)s, validated, prioritized,
//! batched and handed back to the engine.
//!
//! This crate contains **only** the decision logic:
//! - No rendering
//! - No engine bindings (the engine sits behind [`bridge`] traits)
//! - No randomness
//! - Fixed-point simulation math, so replays are exact
//!
//! ## Crate Structure
//!
//! - [`snapshot`] - Column-stored world model
//! - [`spatial`] - Uniform grid for radius and nearest queries
//! - [`analysis`] - Read-only queries over a snapshot
//! - [`command`] / [`validation`] - The command set and its rules
//! - [`priority`] / [`executor`] - Ordering, batching and submission
//! - [`planner`] / [`driver`] - Command generation and the tick loop
//! - [`capture`] - Recording raw inputs for replay

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod analysis;
pub mod bridge;
pub mod capture;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod math;
pub mod planner;
pub mod priority;
pub mod snapshot;
pub mod spatial;
pub mod validation;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analysis::{
        can_afford, damaged_units, find_safe_position, idle_builders, idle_military,
        most_urgent_repair, own_centroid, seconds_until_affordable, threat_assessment,
        threatening_enemies, ThreatAssessment,
    };
    pub use crate::bridge::{
        BatchOutcome, CommandExecutor, EngineBridge, RawMapInfo, RawResources, RawUnit,
        RawUnitColumns,
    };
    pub use crate::capture::{CaptureBridge, TickCapture};
    pub use crate::command::{Command, CommandRecord, CommandType};
    pub use crate::config::{AiConfig, BuildOption};
    pub use crate::driver::{TickDriver, TickReport, TICK_RATE};
    pub use crate::error::{BoundaryError, ConfigError, Result, SnapshotError, TickError};
    pub use crate::executor::{execute_commands, Abandoned, CommandBatchResult};
    pub use crate::math::{DistanceSq, Fixed, Vec2Fixed, Vec3Fixed};
    pub use crate::planner::plan_commands;
    pub use crate::priority::{batch, prioritize, CommandPriority};
    pub use crate::snapshot::{MapInfo, Resources, Unit, UnitId, UnitState, WorldSnapshot};
    pub use crate::spatial::{SpatialGrid, TeamFilter};
    pub use crate::validation::{validate, BuildCost, ExecutionContext, ValidationResult};
}
