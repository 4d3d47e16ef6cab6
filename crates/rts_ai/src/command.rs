//! The closed set of orders the AI can issue.
//!
//! A [`Command`] lives for one tick: produced by the planner, validated,
//! prioritized, converted into a [`CommandRecord`] for the engine and
//! dropped. Conversions are exhaustive matches, so adding a variant is a
//! compile error everywhere it needs handling.

use serde::{Deserialize, Serialize};

use crate::math::Vec3Fixed;
use crate::priority::CommandPriority;
use crate::snapshot::{DefId, UnitId};

/// Extra positions a record can carry beyond its main position.
pub const MAX_EXTRA_POSITIONS: usize = 7;

/// Most waypoints a Patrol can carry in one record.
pub const MAX_PATROL_WAYPOINTS: usize = MAX_EXTRA_POSITIONS + 1;

/// Byte budget for a build name, leaving room for a terminator.
pub const MAX_BUILD_NAME_BYTES: usize = 63;

/// Target id meaning "none" in a [`CommandRecord`].
pub const NO_TARGET: i32 = -1;

/// A single order for one of our units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Move to a position.
    Move {
        /// Unit receiving the order.
        unit: UnitId,
        /// Destination.
        target: Vec3Fixed,
    },
    /// Attack another unit of any team.
    Attack {
        /// Unit receiving the order.
        unit: UnitId,
        /// Unit to attack.
        target: UnitId,
    },
    /// Construct a unit type at a position.
    Build {
        /// Builder receiving the order.
        unit: UnitId,
        /// Type to construct.
        def_id: DefId,
        /// Placement.
        position: Vec3Fixed,
    },
    /// Drop all orders.
    Stop {
        /// Unit receiving the order.
        unit: UnitId,
    },
    /// Guard another unit.
    Guard {
        /// Unit receiving the order.
        unit: UnitId,
        /// Unit to guard.
        target: UnitId,
    },
    /// Patrol through waypoints.
    Patrol {
        /// Unit receiving the order.
        unit: UnitId,
        /// Waypoints in visiting order.
        waypoints: Vec<Vec3Fixed>,
    },
    /// Reclaim a unit or map feature.
    Reclaim {
        /// Unit receiving the order.
        unit: UnitId,
        /// Unit or feature id.
        target: i32,
    },
    /// Repair a unit.
    Repair {
        /// Unit receiving the order.
        unit: UnitId,
        /// Unit to repair.
        target: UnitId,
    },
    /// Set a firing target position.
    SetTarget {
        /// Unit receiving the order.
        unit: UnitId,
        /// Position to target.
        position: Vec3Fixed,
    },
}

/// Command kind with its engine code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandType {
    /// Code 1.
    Move,
    /// Code 2.
    Build,
    /// Code 3.
    Attack,
    /// Code 4.
    Stop,
    /// Code 5.
    Guard,
    /// Code 6.
    Patrol,
    /// Code 7.
    Reclaim,
    /// Code 8.
    Repair,
    /// Code 9.
    SetTarget,
}

impl CommandType {
    /// Engine command code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Move => 1,
            Self::Build => 2,
            Self::Attack => 3,
            Self::Stop => 4,
            Self::Guard => 5,
            Self::Patrol => 6,
            Self::Reclaim => 7,
            Self::Repair => 8,
            Self::SetTarget => 9,
        }
    }

    /// Parse an engine command code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Move,
            2 => Self::Build,
            3 => Self::Attack,
            4 => Self::Stop,
            5 => Self::Guard,
            6 => Self::Patrol,
            7 => Self::Reclaim,
            8 => Self::Repair,
            9 => Self::SetTarget,
            _ => return None,
        })
    }
}

impl Command {
    /// The unit this order is addressed to.
    #[must_use]
    pub const fn source_unit(&self) -> UnitId {
        match self {
            Self::Move { unit, .. }
            | Self::Attack { unit, .. }
            | Self::Build { unit, .. }
            | Self::Stop { unit }
            | Self::Guard { unit, .. }
            | Self::Patrol { unit, .. }
            | Self::Reclaim { unit, .. }
            | Self::Repair { unit, .. }
            | Self::SetTarget { unit, .. } => *unit,
        }
    }

    /// Kind of this command.
    #[must_use]
    pub const fn command_type(&self) -> CommandType {
        match self {
            Self::Move { .. } => CommandType::Move,
            Self::Attack { .. } => CommandType::Attack,
            Self::Build { .. } => CommandType::Build,
            Self::Stop { .. } => CommandType::Stop,
            Self::Guard { .. } => CommandType::Guard,
            Self::Patrol { .. } => CommandType::Patrol,
            Self::Reclaim { .. } => CommandType::Reclaim,
            Self::Repair { .. } => CommandType::Repair,
            Self::SetTarget { .. } => CommandType::SetTarget,
        }
    }

    /// Convert into the record the engine boundary executes.
    ///
    /// `build_name` is only used for Build and is truncated to
    /// [`MAX_BUILD_NAME_BYTES`]. Patrol waypoints beyond
    /// [`MAX_PATROL_WAYPOINTS`] cannot be represented; validation rejects
    /// such patrols before they get here.
    #[must_use]
    pub fn to_record(&self, priority: CommandPriority, build_name: Option<&str>) -> CommandRecord {
        let mut record = CommandRecord {
            command_type: self.command_type().code(),
            source_unit_id: self.source_unit(),
            target_unit_id: NO_TARGET,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            build_def_id: NO_TARGET,
            build_name: String::new(),
            priority: priority.code(),
            extra_positions: Vec::new(),
        };

        match self {
            Self::Move { target: position, .. } | Self::SetTarget { position, .. } => {
                record.set_position(*position);
            }
            Self::Attack { target, .. }
            | Self::Guard { target, .. }
            | Self::Reclaim { target, .. }
            | Self::Repair { target, .. } => {
                record.target_unit_id = *target;
            }
            Self::Build {
                def_id, position, ..
            } => {
                record.set_position(*position);
                record.build_def_id = *def_id;
                record.build_name = truncate_name(build_name.unwrap_or_default());
            }
            Self::Stop { .. } => {}
            Self::Patrol { waypoints, .. } => {
                if let Some((first, rest)) = waypoints.split_first() {
                    record.set_position(*first);
                    record.extra_positions = rest
                        .iter()
                        .take(MAX_EXTRA_POSITIONS)
                        .map(|p| p.to_f32())
                        .collect();
                }
            }
        }
        record
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_BUILD_NAME_BYTES {
        return name.to_string();
    }
    let mut end = MAX_BUILD_NAME_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// A resolved command as handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// [`CommandType`] code.
    pub command_type: i32,
    /// Unit receiving the order.
    pub source_unit_id: UnitId,
    /// Target unit or feature, or [`NO_TARGET`].
    pub target_unit_id: i32,
    /// Main position x, zero if unused.
    pub x: f32,
    /// Main position elevation, zero if unused.
    pub y: f32,
    /// Main position z, zero if unused.
    pub z: f32,
    /// Type to build, or [`NO_TARGET`].
    pub build_def_id: DefId,
    /// Name of the type to build, empty if unknown.
    pub build_name: String,
    /// [`CommandPriority`] code.
    pub priority: u8,
    /// Additional Patrol waypoints.
    pub extra_positions: Vec<[f32; 3]>,
}

impl CommandRecord {
    fn set_position(&mut self, position: Vec3Fixed) {
        let [x, y, z] = position.to_f32();
        self.x = x;
        self.y = y;
        self.z = z;
    }

    /// Kind of this record, if the code is known.
    #[must_use]
    pub const fn kind(&self) -> Option<CommandType> {
        CommandType::from_code(self.command_type)
    }
}
