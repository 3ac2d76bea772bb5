// Purpose: Defines the interface for scenario runners and provides implementations.

use async_trait::async_trait;
use serde::Serialize;
use snapline_core::{GlobalSnapshot, ProcessId};

use crate::audit::CutViolation;
use crate::config::{Mode, SimulationConfig};
use crate::error::SimulationResult;

pub mod concurrent;
pub mod sequential;

pub use concurrent::ConcurrentRunner;
pub use sequential::SequentialRunner;

/// Everything a scenario run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub mode: Mode,
    pub snapshot: GlobalSnapshot<String, String>,
    pub violations: Vec<CutViolation<String>>,
    /// Batches delivered; only the sequential driver counts them.
    pub steps: Option<u64>,
}

impl ScenarioOutcome {
    pub fn is_consistent(&self) -> bool {
        self.snapshot.is_complete() && self.violations.is_empty()
    }
}

/// Trait that defines the interface for scenario runners.
#[async_trait]
pub trait ScenarioRunner: Send + Sync {
    /// Execute the scenario's script and collect the snapshot.
    async fn run(&self, config: &SimulationConfig) -> SimulationResult<ScenarioOutcome>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// The runner matching a scenario's `mode`.
pub fn runner_for(mode: Mode) -> Box<dyn ScenarioRunner> {
    match mode {
        Mode::Sequential => Box::new(SequentialRunner),
        Mode::Concurrent => Box::new(ConcurrentRunner),
    }
}

/// Run `config` with the runner its `mode` selects.
pub async fn run_scenario(config: &SimulationConfig) -> SimulationResult<ScenarioOutcome> {
    let runner = runner_for(config.mode);
    tracing::info!(scenario = %config.name, runner = runner.name(), "running scenario");
    runner.run(config).await
}

fn pid(name: &str) -> ProcessId {
    ProcessId::new(name)
}
