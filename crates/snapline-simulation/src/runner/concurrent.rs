// Purpose: Runs a scenario script on the task-per-process runtime.

use async_trait::async_trait;
use snapline_core::NamedState;
use tracing::info;

use super::{pid, ScenarioOutcome, ScenarioRunner};
use crate::config::{ScriptStep, SimulationConfig};
use crate::error::{SimulationError, SimulationResult};
use crate::runtime::Runtime;

/// Feeds `send` and `initiate` steps to a [`Runtime`] and waits for the snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrentRunner;

#[async_trait]
impl ScenarioRunner for ConcurrentRunner {
    async fn run(&self, config: &SimulationConfig) -> SimulationResult<ScenarioOutcome> {
        let topology = config.build_topology(|_| NamedState)?;
        let mut runtime = Runtime::<String, NamedState>::start(topology);

        let mut issued = Ok(());
        for step in &config.script {
            issued = match step {
                ScriptStep::Send { from, to, message } => {
                    runtime.send(&pid(from), &pid(to), message.clone())
                }
                ScriptStep::Initiate { process } => runtime.initiate(&pid(process)),
                manual => Err(SimulationError::configuration(format!(
                    "{:?} is not supported by the concurrent runtime",
                    manual
                ))),
            };
            if issued.is_err() {
                break;
            }
        }

        let collected = match issued {
            Ok(()) => runtime.collect(config.collect_timeout()).await,
            Err(e) => Err(e),
        };
        let ledger = runtime.shutdown().await?;
        let snapshot = collected?;
        let violations = ledger.audit(&snapshot);

        info!(
            scenario = %config.name,
            in_flight = snapshot.total_in_flight(),
            violations = violations.len(),
            "concurrent run finished"
        );

        Ok(ScenarioOutcome {
            scenario: config.name.clone(),
            mode: config.mode,
            snapshot,
            violations,
            steps: None,
        })
    }

    fn name(&self) -> &'static str {
        "concurrent"
    }
}
