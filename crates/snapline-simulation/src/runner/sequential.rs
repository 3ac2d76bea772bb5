// Purpose: Runs a scenario script on the single-threaded driver.

use async_trait::async_trait;
use snapline_core::NamedState;
use tracing::{info, warn};

use super::{pid, ScenarioOutcome, ScenarioRunner};
use crate::config::{ScriptStep, SimulationConfig};
use crate::driver::Simulation;
use crate::error::SimulationResult;

/// Applies every script step in order on a [`Simulation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialRunner;

impl SequentialRunner {
    fn apply(sim: &mut Simulation<String, NamedState>, step: &ScriptStep) -> SimulationResult<()> {
        match step {
            ScriptStep::Send { from, to, message } => sim.send(&pid(from), &pid(to), message.clone()),
            ScriptStep::Initiate { process } => sim.initiate(&pid(process)).map(|_| ()),
            ScriptStep::Marker { from, to } => sim.send_marker(&pid(from), &pid(to)),
            ScriptStep::Deliver { from, to } => sim.deliver(&pid(from), &pid(to)).map(|_| ()),
            ScriptStep::Run => sim.run_until_quiescent().map(|_| ()),
        }
    }
}

#[async_trait]
impl ScenarioRunner for SequentialRunner {
    async fn run(&self, config: &SimulationConfig) -> SimulationResult<ScenarioOutcome> {
        let topology = config.build_topology(|_| NamedState)?;
        let mut sim = Simulation::new(topology, config.driver_config());

        for step in &config.script {
            Self::apply(&mut sim, step)?;
        }

        if !sim.is_quiescent() {
            warn!(scenario = %config.name, "script finished with items still buffered");
        }

        let snapshot = sim.snapshot();
        let violations = sim.audit();
        info!(
            scenario = %config.name,
            complete = snapshot.is_complete(),
            in_flight = snapshot.total_in_flight(),
            violations = violations.len(),
            "sequential run finished"
        );

        Ok(ScenarioOutcome {
            scenario: config.name.clone(),
            mode: config.mode,
            snapshot,
            violations,
            steps: Some(sim.steps()),
        })
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}
