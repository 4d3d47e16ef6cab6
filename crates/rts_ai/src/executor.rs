//! Execution coordinator: validate, prioritize, batch, submit.
//!
//! One call handles one tick's commands. Every input command ends up counted
//! exactly once, either as a success or as a failure with a reason, unless
//! the engine itself under-reports a batch. Nothing is retried: by the next
//! tick the snapshot has moved on and stale commands are meaningless.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::bridge::CommandExecutor;
use crate::command::{Command, CommandRecord, CommandType};
use crate::error::{Result, TickError};
use crate::priority::{batch, prioritize, Prioritized};
use crate::snapshot::WorldSnapshot;
use crate::validation::{validate, ExecutionContext, ValidationResult};

/// Why the remaining batches of a tick were not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Abandoned {
    /// The engine moved past the snapshot's frame.
    StaleSnapshot {
        /// Frame the commands were validated against.
        snapshot_tick: u64,
        /// Frame the engine reported.
        engine_frame: u64,
    },
    /// Reported execution time reached the tick budget.
    BudgetExhausted,
    /// The execution boundary could not be reached.
    BoundaryUnavailable,
}

/// Aggregated outcome of one tick's execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandBatchResult {
    /// Commands the engine applied.
    pub success_count: usize,
    /// Invalid, rejected and abandoned commands.
    pub failure_count: usize,
    /// Sum of engine-reported batch times.
    pub elapsed_ms: f64,
    /// One entry per invalid command, then the engine's reasons in batch order.
    pub failure_reasons: Vec<String>,
    /// Set when later batches were skipped.
    #[serde(default)]
    pub abandoned: Option<Abandoned>,
}

impl CommandBatchResult {
    /// Commands accounted for in this result.
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    fn abandon(&mut self, reason: Abandoned, remaining: usize, detail: String) {
        self.failure_count += remaining;
        self.failure_reasons.push(detail);
        self.abandoned = Some(reason);
    }
}

/// Resolve a prioritized command into the record the engine executes.
pub fn resolve(entry: &Prioritized, ctx: &ExecutionContext) -> CommandRecord {
    let build_name = match &entry.command {
        Command::Build { def_id, .. } => ctx.build_name(*def_id),
        _ => None,
    };
    entry.command.to_record(entry.priority, build_name)
}

/// Execute one tick's commands through `executor`.
///
/// An empty command list returns an all-zero result without touching the
/// executor. Before each batch the coordinator abandons the rest of the tick
/// if the engine reports a newer frame than the snapshot, or if the engine
/// time reported so far has used up the tick budget.
///
/// # Errors
///
/// Returns [`TickError::BoundaryUnavailable`] if a batch call fails. The
/// failed batch and every later one are counted as failures in the partial
/// result the error carries.
pub fn execute_commands<E>(
    snapshot: &WorldSnapshot,
    ctx: &ExecutionContext,
    commands: Vec<Command>,
    executor: &mut E,
) -> Result<CommandBatchResult>
where
    E: CommandExecutor + ?Sized,
{
    let mut result = CommandBatchResult::default();
    if commands.is_empty() {
        return Ok(result);
    }
    let tick = snapshot.tick();

    let mut valid = Vec::with_capacity(commands.len());
    for command in commands {
        match validate(snapshot, ctx, &command) {
            ValidationResult::Valid => valid.push(command),
            failure => {
                let unit = command.source_unit();
                warn!(tick, unit, reason = %failure, "Dropping invalid command");
                result.failure_count += 1;
                result
                    .failure_reasons
                    .push(describe(command.command_type(), unit, &failure));
            }
        }
    }

    let ordered = prioritize(valid, snapshot);
    let batches = batch(&ordered, ctx.max_batch_size);
    debug!(
        tick,
        valid = ordered.len(),
        invalid = result.failure_count,
        batches = batches.len(),
        "Executing commands"
    );

    for (index, chunk) in batches.iter().enumerate() {
        let remaining: usize = batches[index..].iter().map(|b| b.len()).sum();

        if let Some(engine_frame) = executor.current_frame().filter(|&frame| frame > tick) {
            warn!(tick, engine_frame, remaining, "Snapshot is stale, abandoning batches");
            result.abandon(
                Abandoned::StaleSnapshot {
                    snapshot_tick: tick,
                    engine_frame,
                },
                remaining,
                format!(
                    "abandoned {remaining} commands: snapshot tick {tick} \
                     is older than engine frame {engine_frame}"
                ),
            );
            break;
        }

        if let Some(budget) = ctx.tick_budget {
            let budget_ms = budget.as_secs_f64() * 1000.0;
            if result.elapsed_ms >= budget_ms {
                warn!(
                    tick,
                    elapsed_ms = result.elapsed_ms,
                    budget_ms,
                    remaining,
                    "Tick budget exhausted"
                );
                result.abandon(
                    Abandoned::BudgetExhausted,
                    remaining,
                    format!(
                        "abandoned {remaining} commands: {:.2} ms used of {budget_ms:.2} ms budget",
                        result.elapsed_ms
                    ),
                );
                break;
            }
        }

        let records: Vec<CommandRecord> = chunk.iter().map(|entry| resolve(entry, ctx)).collect();
        match executor.execute_batch(&records) {
            Ok(outcome) => {
                debug!(
                    tick,
                    batch = index,
                    size = records.len(),
                    success = outcome.success_count,
                    failure = outcome.failure_count,
                    "Batch executed"
                );
                result.success_count += outcome.success_count;
                result.failure_count += outcome.failure_count;
                result.elapsed_ms += outcome.elapsed_ms;
                result.failure_reasons.extend(outcome.failure_reasons);
            }
            Err(source) => {
                error!(
                    tick,
                    batch = index,
                    remaining,
                    error = %source,
                    "Execution boundary unavailable"
                );
                result.abandon(
                    Abandoned::BoundaryUnavailable,
                    remaining,
                    format!("batch {index} failed, {remaining} commands not executed: {source}"),
                );
                return Err(TickError::BoundaryUnavailable {
                    tick,
                    partial: Box::new(result),
                    source,
                });
            }
        }
    }

    Ok(result)
}

fn describe(kind: CommandType, unit: i32, failure: &ValidationResult) -> String {
    format!("{kind:?} for unit {unit}: {failure}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BatchOutcome, RawResources, RawUnit};
    use crate::error::BoundaryError;
    use crate::math::{Fixed, Vec3Fixed};
    use crate::snapshot::MapInfo;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        batches: Vec<Vec<CommandRecord>>,
        frame: Option<u64>,
        fail_on: Option<usize>,
        batch_ms: f64,
    }

    impl CommandExecutor for Recorder {
        fn execute_batch(
            &mut self,
            commands: &[CommandRecord],
        ) -> std::result::Result<BatchOutcome, BoundaryError> {
            if self.fail_on == Some(self.batches.len()) {
                return Err(BoundaryError::Timeout { timeout_ms: 5 });
            }
            self.batches.push(commands.to_vec());
            Ok(BatchOutcome {
                success_count: commands.len(),
                failure_count: 0,
                elapsed_ms: self.batch_ms,
                failure_reasons: Vec::new(),
            })
        }

        fn current_frame(&self) -> Option<u64> {
            self.frame
        }
    }

    fn snapshot(units: i32) -> WorldSnapshot {
        let raw: Vec<RawUnit> = (1..=units)
            .map(|id| RawUnit {
                id,
                def_id: 200,
                x: 50.0,
                y: 0.0,
                z: 50.0,
                health: 100.0,
                max_health: 100.0,
                team_id: 0,
                state_code: 0,
                velocity: [0.0; 3],
                being_built: false,
            })
            .collect();
        let resources = RawResources {
            tick: 7,
            ..RawResources::default()
        };
        WorldSnapshot::build(&raw, &resources, MapInfo::flat(1000, 1000), Fixed::ZERO).unwrap()
    }

    fn moves(n: i32) -> Vec<Command> {
        (1..=n)
            .map(|unit| Command::Move {
                unit,
                target: Vec3Fixed::from_ints(unit, 0, unit),
            })
            .collect()
    }

    fn ctx(max: usize) -> ExecutionContext {
        ExecutionContext {
            max_batch_size: NonZeroUsize::new(max).unwrap(),
            ..ExecutionContext::default()
        }
    }

    #[test]
    fn test_empty_input_skips_executor() {
        let mut recorder = Recorder {
            fail_on: Some(0),
            ..Recorder::default()
        };
        let result = execute_commands(&snapshot(1), &ctx(50), Vec::new(), &mut recorder).unwrap();
        assert_eq!(result, CommandBatchResult::default());
        assert!(recorder.batches.is_empty());
    }

    #[test]
    fn test_120_commands_go_out_as_50_50_20() {
        let mut recorder = Recorder::default();
        let result = execute_commands(&snapshot(120), &ctx(50), moves(120), &mut recorder).unwrap();
        let sizes: Vec<usize> = recorder.batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(result.success_count, 120);
        let sources: Vec<i32> =
            recorder.batches.concat().iter().map(|r| r.source_unit_id).collect();
        assert_eq!(sources, (1..=120).collect::<Vec<_>>());
    }

    #[test]
    fn test_invalid_commands_are_reported_not_submitted() {
        let mut commands = moves(2);
        commands.push(Command::Stop { unit: 99 });
        let mut recorder = Recorder::default();
        let result = execute_commands(&snapshot(2), &ctx(50), commands, &mut recorder).unwrap();
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        assert!(result.failure_reasons[0].contains("unit 99"));
        assert_eq!(recorder.batches[0].len(), 2);
    }

    #[test]
    fn test_stop_is_submitted_first() {
        let mut commands = moves(3);
        commands.push(Command::Stop { unit: 3 });
        let mut recorder = Recorder::default();
        execute_commands(&snapshot(3), &ctx(50), commands, &mut recorder).unwrap();
        assert_eq!(recorder.batches[0][0].kind(), Some(CommandType::Stop));
    }

    #[test]
    fn test_stale_snapshot_abandons_everything() {
        let mut recorder = Recorder {
            frame: Some(8),
            ..Recorder::default()
        };
        let result = execute_commands(&snapshot(10), &ctx(4), moves(10), &mut recorder).unwrap();
        assert!(recorder.batches.is_empty());
        assert_eq!(result.failure_count, 10);
        assert_eq!(
            result.abandoned,
            Some(Abandoned::StaleSnapshot {
                snapshot_tick: 7,
                engine_frame: 8
            })
        );
    }

    #[test]
    fn test_current_frame_equal_to_snapshot_is_fresh() {
        let mut recorder = Recorder {
            frame: Some(7),
            ..Recorder::default()
        };
        let result = execute_commands(&snapshot(3), &ctx(2), moves(3), &mut recorder).unwrap();
        assert_eq!(result.success_count, 3);
        assert!(result.abandoned.is_none());
    }

    #[test]
    fn test_budget_stops_later_batches() {
        let mut recorder = Recorder {
            batch_ms: 20.0,
            ..Recorder::default()
        };
        let context = ExecutionContext {
            tick_budget: Some(Duration::from_millis(33)),
            ..ctx(10)
        };
        let result = execute_commands(&snapshot(30), &context, moves(30), &mut recorder).unwrap();
        assert_eq!(recorder.batches.len(), 2);
        assert_eq!(result.success_count, 20);
        assert_eq!(result.failure_count, 10);
        assert_eq!(result.elapsed_ms, 40.0);
        assert_eq!(result.abandoned, Some(Abandoned::BudgetExhausted));
    }

    #[test]
    fn test_boundary_failure_marks_rest_failed() {
        let mut recorder = Recorder {
            fail_on: Some(1),
            ..Recorder::default()
        };
        let err = execute_commands(&snapshot(12), &ctx(5), moves(12), &mut recorder).unwrap_err();
        match err {
            TickError::BoundaryUnavailable { tick, partial, .. } => {
                assert_eq!(tick, 7);
                assert_eq!(partial.success_count, 5);
                assert_eq!(partial.failure_count, 7);
                assert_eq!(partial.total(), 12);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
