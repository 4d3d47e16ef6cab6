//! Error types for the decision pipeline.
//!
//! Validation and execution failures are not errors: they are folded into a
//! [`CommandBatchResult`](crate::executor::CommandBatchResult). Only the
//! variants below ever reach the caller of a tick.

use thiserror::Error;

use crate::executor::CommandBatchResult;

/// Result type alias using [`TickError`].
pub type Result<T> = std::result::Result<T, TickError>;

/// Raw input could not be turned into a [`WorldSnapshot`](crate::snapshot::WorldSnapshot).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    /// Parallel unit columns disagree on length.
    #[error("Unit column '{column}' has {actual} entries, expected {expected}")]
    ColumnLengthMismatch {
        /// Name of the offending column.
        column: &'static str,
        /// Length of the id column.
        expected: usize,
        /// Length of the offending column.
        actual: usize,
    },

    /// The same unit id appears twice in one tick.
    #[error("Duplicate unit ID: {0}")]
    DuplicateUnitId(i32),

    /// A numeric field is NaN, infinite or out of fixed-point range.
    #[error("Non-finite value in field '{field}' of unit {unit}")]
    NonFiniteUnitField {
        /// Unit id.
        unit: i32,
        /// Field name.
        field: &'static str,
    },

    /// Maximum health must be positive.
    #[error("Unit {unit} has non-positive max health {max_health}")]
    InvalidMaxHealth {
        /// Unit id.
        unit: i32,
        /// The reported maximum.
        max_health: f32,
    },

    /// The engine sent a state code with no [`UnitState`](crate::snapshot::UnitState).
    #[error("Unit {unit} has unknown state code {code}")]
    UnknownStateCode {
        /// Unit id.
        unit: i32,
        /// The raw code.
        code: i32,
    },

    /// Resource data is negative or non-finite.
    #[error("Invalid resource field '{field}': {value}")]
    InvalidResources {
        /// Field name.
        field: &'static str,
        /// The raw value.
        value: f32,
    },

    /// Map dimensions are unusable.
    #[error("Invalid map info: {0}")]
    InvalidMap(String),
}

/// The external engine boundary could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    /// The engine did not answer within its timeout.
    #[error("Engine call timed out after {timeout_ms} ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The engine refused or dropped the call.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

/// Failure to load or validate [`AiConfig`](crate::config::AiConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Config file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A value is outside its allowed range.
    #[error("Invalid config value '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Failure to save or load a [`TickCapture`](crate::capture::TickCapture).
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Failed to read or write the capture file.
    #[error("Capture IO failed: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to encode or decode the capture.
    #[error("Capture encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
    /// The capture was written by an incompatible version.
    #[error("Capture version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Supported version.
        expected: u32,
        /// Version in the file.
        actual: u32,
    },
}

/// Tick-level failure surfaced to the caller of [`TickDriver`](crate::driver::TickDriver).
///
/// The caller decides whether to try again next tick or halt; nothing is
/// retried within a tick.
#[derive(Debug, Error)]
pub enum TickError {
    /// Raw input was inconsistent; the tick was skipped and the previous
    /// snapshot retained.
    #[error("Tick {tick} skipped: {source}")]
    Construction {
        /// Frame reported by the engine, if resources were readable.
        tick: u64,
        /// What was wrong with the input.
        #[source]
        source: SnapshotError,
    },

    /// The engine could not be queried for this tick's input.
    #[error("Tick input unavailable: {0}")]
    InputUnavailable(#[source] BoundaryError),

    /// The execution boundary failed mid-tick. Batches already submitted are
    /// reported in `partial`; the rest are counted as failures.
    #[error("Execution boundary unavailable at tick {tick}: {source}")]
    BoundaryUnavailable {
        /// Tick of the snapshot the batches were validated against.
        tick: u64,
        /// Aggregated result including the failed batches.
        partial: Box<CommandBatchResult>,
        /// Boundary failure.
        #[source]
        source: BoundaryError,
    },
}
