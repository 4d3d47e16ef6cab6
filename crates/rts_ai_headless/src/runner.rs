//! Drives the AI against the mock engine for a fixed number of ticks.
//!
//! Each AI tick is followed by `frames_per_tick` engine frames. Tick errors
//! are counted and the run continues, the way a host engine would keep
//! calling the AI after a bad frame.

use std::path::Path;
use std::time::Instant;

use rts_ai::capture::TickCapture;
use rts_ai::config::AiConfig;
use rts_ai::driver::TickDriver;
use rts_ai::error::{CaptureError, ConfigError, TickError};
use rts_ai::executor::{Abandoned, CommandBatchResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::mock_engine::MockEngine;
use crate::scenario::{Scenario, ScenarioError};

/// Errors from setting up or persisting a headless run.
#[derive(Error, Debug)]
pub enum RunError {
    /// Scenario could not be loaded.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// AI configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Capture could not be written.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// Summary could not be serialized.
    #[error("Failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
    /// Summary could not be written.
    #[error("Failed to write summary: {0}")]
    Io(#[from] std::io::Error),
}

/// How long to run and what to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// AI ticks to run.
    pub ticks: u32,
    /// Engine frames simulated after each AI tick.
    pub frames_per_tick: u64,
    /// Record raw inputs for later replay.
    pub capture: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: 300,
            frames_per_tick: 15,
            capture: false,
        }
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// AI ticks attempted.
    pub ticks_run: u32,
    /// Ticks skipped because the engine reported inconsistent data.
    pub skipped_ticks: u32,
    /// Ticks where the engine could not be queried.
    pub input_failures: u32,
    /// Ticks where a batch call failed.
    pub boundary_failures: u32,
    /// Commands produced by the planner.
    pub commands_planned: usize,
    /// Commands the engine applied.
    pub commands_succeeded: usize,
    /// Commands that were invalid, rejected or abandoned.
    pub commands_failed: usize,
    /// Ticks cut short by the tick budget.
    pub budget_overruns: u32,
    /// Ticks cut short because the engine moved on.
    pub stale_abandons: u32,
    /// Engine frame at the end of the run.
    pub final_frame: u64,
    /// Own units alive at the end.
    pub final_own_units: usize,
    /// Foe units alive at the end.
    pub final_foe_units: usize,
    /// Metal at the end.
    pub final_metal: f32,
    /// Energy at the end.
    pub final_energy: f32,
    /// Wall-clock duration of the run.
    pub elapsed_ms: f64,
}

impl RunSummary {
    /// Pretty JSON for CI logs.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the summary as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), RunError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn absorb(&mut self, result: &CommandBatchResult) {
        self.commands_succeeded += result.success_count;
        self.commands_failed += result.failure_count;
        match result.abandoned {
            Some(Abandoned::BudgetExhausted) => self.budget_overruns += 1,
            Some(Abandoned::StaleSnapshot { .. }) => self.stale_abandons += 1,
            Some(Abandoned::BoundaryUnavailable) | None => {}
        }
    }
}

/// Result of [`HeadlessRunner::run`].
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Totals.
    pub summary: RunSummary,
    /// Recorded inputs, when capture was enabled.
    pub capture: Option<TickCapture>,
}

/// Headless match between the AI and a scripted world.
#[derive(Debug)]
pub struct HeadlessRunner {
    scenario: String,
    engine: MockEngine,
    driver: TickDriver,
    run: RunConfig,
}

impl HeadlessRunner {
    /// Set up a run. Fails if `ai` does not validate.
    pub fn new(scenario: &Scenario, ai: AiConfig, run: RunConfig) -> Result<Self, RunError> {
        let mut driver = TickDriver::new(ai)?;
        if run.capture {
            driver.start_capture();
        }
        Ok(Self {
            scenario: scenario.name.clone(),
            engine: MockEngine::from_scenario(scenario),
            driver,
            run,
        })
    }

    /// Load the scenario and AI config from RON files.
    pub fn from_files<P, Q>(scenario: P, ai: Q, run: RunConfig) -> Result<Self, RunError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let scenario = Scenario::load(scenario)?;
        let ai = AiConfig::load(ai)?;
        Self::new(&scenario, ai, run)
    }

    /// The simulated engine.
    pub fn engine(&self) -> &MockEngine {
        &self.engine
    }

    /// The simulated engine, for injecting faults.
    pub fn engine_mut(&mut self) -> &mut MockEngine {
        &mut self.engine
    }

    /// The AI driver.
    pub fn driver(&self) -> &TickDriver {
        &self.driver
    }

    /// Run every configured tick.
    pub fn run(&mut self) -> RunOutput {
        let started = Instant::now();
        let mut summary = RunSummary {
            scenario: self.scenario.clone(),
            ..RunSummary::default()
        };
        info!(
            scenario = %self.scenario,
            ticks = self.run.ticks,
            frames_per_tick = self.run.frames_per_tick,
            "Starting headless run"
        );

        for _ in 0..self.run.ticks {
            self.tick_once(&mut summary);
            self.engine.advance(self.run.frames_per_tick);
        }

        summary.final_frame = self.engine.frame();
        summary.final_own_units = self.engine.own_count();
        summary.final_foe_units = self.engine.foe_count();
        summary.final_metal = self.engine.economy().metal;
        summary.final_energy = self.engine.economy().energy;
        summary.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            scenario = %summary.scenario,
            ticks = summary.ticks_run,
            succeeded = summary.commands_succeeded,
            failed = summary.commands_failed,
            own = summary.final_own_units,
            foes = summary.final_foe_units,
            elapsed_ms = summary.elapsed_ms,
            "Headless run complete"
        );
        RunOutput {
            summary,
            capture: self.driver.take_capture(),
        }
    }

    fn tick_once(&mut self, summary: &mut RunSummary) {
        summary.ticks_run += 1;
        match self.driver.tick(&mut self.engine) {
            Ok(report) => {
                summary.commands_planned += report.planned;
                summary.absorb(&report.result);
            }
            Err(TickError::Construction { tick, source }) => {
                warn!(tick, error = %source, "Tick skipped");
                summary.skipped_ticks += 1;
            }
            Err(TickError::InputUnavailable(source)) => {
                warn!(error = %source, "Tick input unavailable");
                summary.input_failures += 1;
            }
            Err(TickError::BoundaryUnavailable { tick, partial, source }) => {
                warn!(tick, error = %source, "Execution boundary failed");
                summary.boundary_failures += 1;
                summary.commands_planned += partial.total();
                summary.absorb(&partial);
            }
        }
    }
}
