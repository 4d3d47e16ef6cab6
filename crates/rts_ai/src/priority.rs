//! Command ordering and batching.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::math::Fixed;
use crate::snapshot::WorldSnapshot;

/// Health ratio below which an attacking unit is defending itself.
pub fn emergency_health_ratio() -> Fixed {
    Fixed::from_num(3) / 10
}

/// Execution priority; lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandPriority {
    /// Stop.
    Immediate,
    /// Attack by a unit below the emergency health ratio.
    EmergencyAttack,
    /// Repair and Reclaim.
    Sustain,
    /// Attack.
    Attack,
    /// Build.
    Build,
    /// Move and SetTarget.
    Movement,
    /// Guard and Patrol.
    Background,
}

impl CommandPriority {
    /// Priority of a command given the units it was generated from.
    #[must_use]
    pub fn of(command: &Command, snapshot: &WorldSnapshot) -> Self {
        match command {
            Command::Stop { .. } => Self::Immediate,
            Command::Attack { unit, .. } => {
                let desperate = snapshot
                    .unit(*unit)
                    .is_some_and(|u| u.health_ratio() < emergency_health_ratio());
                if desperate {
                    Self::EmergencyAttack
                } else {
                    Self::Attack
                }
            }
            Command::Repair { .. } | Command::Reclaim { .. } => Self::Sustain,
            Command::Build { .. } => Self::Build,
            Command::Move { .. } | Command::SetTarget { .. } => Self::Movement,
            Command::Guard { .. } | Command::Patrol { .. } => Self::Background,
        }
    }

    /// Numeric code, 0 through 6.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// A command paired with the priority it was sorted by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prioritized {
    /// Priority at sort time.
    pub priority: CommandPriority,
    /// The command.
    pub command: Command,
}

/// Order commands by priority. Equal priorities keep their input order.
#[must_use]
pub fn prioritize(commands: Vec<Command>, snapshot: &WorldSnapshot) -> Vec<Prioritized> {
    let mut ordered: Vec<Prioritized> = commands
        .into_iter()
        .map(|command| Prioritized {
            priority: CommandPriority::of(&command, snapshot),
            command,
        })
        .collect();
    ordered.sort_by_key(|entry| entry.priority);
    ordered
}

/// Split an ordered sequence into contiguous chunks of at most `max_batch_size`.
#[must_use]
pub fn batch<T>(ordered: &[T], max_batch_size: NonZeroUsize) -> Vec<&[T]> {
    ordered.chunks(max_batch_size.get()).collect()
}
