//! One call per simulation tick: fetch, build, plan, execute.
//!
//! The driver is the only place state survives between ticks: the cached map
//! info, the last good snapshot and an optional capture of raw inputs.

use tracing::{debug, error, info};

use crate::bridge::{CommandExecutor, EngineBridge};
use crate::capture::TickCapture;
use crate::command::Command;
use crate::config::AiConfig;
use crate::error::{ConfigError, Result, TickError};
use crate::executor::{execute_commands, Abandoned, CommandBatchResult};
use crate::math::Fixed;
use crate::planner::plan_commands;
use crate::snapshot::{MapInfo, WorldSnapshot};
use crate::spatial::SpatialGrid;
use crate::validation::ExecutionContext;

/// Engine frames per second.
pub const TICK_RATE: u32 = 30;

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Frame of the snapshot.
    pub tick: u64,
    /// Own units in the snapshot.
    pub own_units: usize,
    /// Foe units in the snapshot.
    pub foe_units: usize,
    /// Commands the planner produced.
    pub planned: usize,
    /// Execution outcome.
    pub result: CommandBatchResult,
}

impl TickReport {
    /// Later batches were skipped because the tick budget ran out.
    pub fn budget_exceeded(&self) -> bool {
        self.result.abandoned == Some(Abandoned::BudgetExhausted)
    }
}

/// Runs the decision pipeline once per tick.
#[derive(Debug)]
pub struct TickDriver {
    config: AiConfig,
    ctx: ExecutionContext,
    map: Option<MapInfo>,
    previous: Option<WorldSnapshot>,
    capture: Option<TickCapture>,
}

impl TickDriver {
    /// Create a driver after validating `config`.
    pub fn new(config: AiConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let ctx = config.execution_context();
        Ok(Self {
            config,
            ctx,
            map: None,
            previous: None,
            capture: None,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Validation and execution settings in use.
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// The last successfully built snapshot.
    pub fn snapshot(&self) -> Option<&WorldSnapshot> {
        self.previous.as_ref()
    }

    /// Record raw inputs from now on.
    pub fn start_capture(&mut self) {
        let mut capture = TickCapture::new();
        if let Some(map) = self.map {
            capture.record_map(map.to_raw());
        }
        self.capture = Some(capture);
    }

    /// Stop recording and hand back what was captured.
    pub fn take_capture(&mut self) -> Option<TickCapture> {
        self.capture.take()
    }

    /// Fetch this tick's inputs and replace the current snapshot.
    ///
    /// # Errors
    ///
    /// [`TickError::InputUnavailable`] if the engine cannot be queried, and
    /// [`TickError::Construction`] if its data is inconsistent. Either way the
    /// previous snapshot is kept.
    pub fn observe<B>(&mut self, bridge: &mut B) -> Result<&WorldSnapshot>
    where
        B: EngineBridge + ?Sized,
    {
        let snapshot = self.build_snapshot(bridge)?;
        Ok(self.previous.insert(snapshot))
    }

    /// Plan against the current snapshot without executing.
    pub fn plan(&self) -> Vec<Command> {
        self.previous.as_ref().map_or_else(Vec::new, |snapshot| {
            let grid = SpatialGrid::build(snapshot, self.config.grid_resolution);
            plan_commands(&grid, &self.config)
        })
    }

    /// Run one full tick against `engine`.
    ///
    /// # Errors
    ///
    /// Everything [`TickDriver::observe`] returns, plus
    /// [`TickError::BoundaryUnavailable`] if a batch call fails. In that case
    /// the new snapshot is still kept.
    pub fn tick<E>(&mut self, engine: &mut E) -> Result<TickReport>
    where
        E: EngineBridge + CommandExecutor + ?Sized,
    {
        let snapshot = self.build_snapshot(engine)?;
        let grid = SpatialGrid::build(&snapshot, self.config.grid_resolution);
        let commands = plan_commands(&grid, &self.config);
        let planned = commands.len();
        let outcome = execute_commands(&snapshot, &self.ctx, commands, engine);

        let tick = snapshot.tick();
        let own_units = snapshot.own_count();
        let foe_units = snapshot.foe_count();
        self.previous = Some(snapshot);

        let result = outcome?;
        debug!(
            tick,
            planned,
            success = result.success_count,
            failure = result.failure_count,
            elapsed_ms = result.elapsed_ms,
            "Tick complete"
        );
        Ok(TickReport {
            tick,
            own_units,
            foe_units,
            planned,
            result,
        })
    }

    fn map_info<B>(&mut self, bridge: &mut B) -> Result<MapInfo>
    where
        B: EngineBridge + ?Sized,
    {
        if let Some(map) = self.map {
            return Ok(map);
        }
        let raw = bridge.fetch_map_info().map_err(TickError::InputUnavailable)?;
        let map = MapInfo::from_raw(&raw).map_err(|source| {
            error!(error = %source, "Map info rejected");
            TickError::Construction { tick: 0, source }
        })?;
        info!(width = %map.width, height = %map.height, "Map info cached");
        if let Some(capture) = self.capture.as_mut() {
            capture.record_map(raw);
        }
        self.map = Some(map);
        Ok(map)
    }

    fn build_snapshot<B>(&mut self, bridge: &mut B) -> Result<WorldSnapshot>
    where
        B: EngineBridge + ?Sized,
    {
        let map = self.map_info(bridge)?;
        let units = bridge.fetch_raw_units().map_err(|source| {
            error!(error = %source, "Unit fetch failed");
            TickError::InputUnavailable(source)
        })?;
        let resources = bridge.fetch_resource_state().map_err(|source| {
            error!(error = %source, "Resource fetch failed");
            TickError::InputUnavailable(source)
        })?;

        let delta_seconds = self.previous.as_ref().map_or(Fixed::ZERO, |previous| {
            let frames = resources.tick.saturating_sub(previous.tick());
            Fixed::saturating_from_num(frames) / Fixed::from_num(TICK_RATE)
        });
        let built = WorldSnapshot::build(&units, &resources, map, delta_seconds);

        if let Some(capture) = self.capture.as_mut() {
            capture.record_frame(units, resources);
        }

        built.map_err(|source| {
            error!(
                tick = resources.tick,
                error = %source,
                "Snapshot construction failed, tick skipped"
            );
            TickError::Construction {
                tick: resources.tick,
                source,
            }
        })
    }
}
