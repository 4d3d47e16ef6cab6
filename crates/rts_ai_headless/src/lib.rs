//! Headless harness for the AI pipeline.
//!
//! Runs [`rts_ai`] against an in-process engine so planning, validation and
//! execution can be exercised end to end in CI without a host engine:
//!
//! - **Scenarios**: RON files describing the map, economy and starting units
//! - **Mock engine**: applies command records and simulates movement,
//!   combat, construction and income between ticks
//! - **Fault injection**: unavailable inputs, timeouts, rejected commands,
//!   inconsistent unit reports and mid-tick frame advances
//! - **Captures**: raw inputs recorded during a run replay deterministically
//!
//! # Example
//!
//! ```no_run
//! use rts_ai::config::AiConfig;
//! use rts_ai_headless::{HeadlessRunner, RunConfig, Scenario};
//!
//! let mut runner =
//!     HeadlessRunner::new(&Scenario::skirmish(), AiConfig::default(), RunConfig::default())?;
//! let output = runner.run();
//! println!("{}", output.summary.to_json()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod mock_engine;
pub mod runner;
pub mod scenario;

pub use mock_engine::{Faults, MockEngine, MockUnit};
pub use runner::{HeadlessRunner, RunConfig, RunError, RunOutput, RunSummary};
pub use scenario::{ResourceSetup, Scenario, ScenarioError, UnitPlacement, UnitTypeSpec};
