//! Concurrent Runtime
//!
//! Each process runs in its own task; channels are drained whenever they
//! signal, in whatever interleaving the scheduler picks.

use std::time::Duration;

use anyhow::Result;
use snapline_core::{FnRecorder, NamedState, ProcessId, RecordingState};
use snapline_simulation::{run_scenario, Mode, Runtime, SimulationConfig, SimulationError, Topology};

fn pid(name: &str) -> ProcessId {
    ProcessId::new(name)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn complete_graph_snapshot_is_consistent() -> Result<()> {
    let ids = ["A", "B", "C", "D", "E"];
    let topology: Topology<String, NamedState> = Topology::complete(ids, |_| NamedState)?;
    let mut runtime = Runtime::start(topology);

    for (i, from) in ids.iter().enumerate() {
        for (j, to) in ids.iter().enumerate() {
            if i != j {
                runtime.send(&pid(from), &pid(to), format!("{}{}-early", from, to))?;
            }
        }
    }
    runtime.initiate(&pid("C"))?;
    for from in ids {
        let to = if from == "A" { "B" } else { "A" };
        runtime.send(&pid(from), &pid(to), format!("{}-late", from))?;
    }

    let snapshot = runtime.collect(Duration::from_secs(10)).await?;
    assert_eq!(snapshot.processes.len(), ids.len());
    for process in snapshot.processes.values() {
        assert_eq!(process.state, RecordingState::Complete);
        assert_eq!(process.closed_channels.len(), ids.len() - 1);
    }
    let ledger = runtime.shutdown().await?;
    let violations = ledger.audit(&snapshot);
    assert!(violations.is_empty(), "{:?}", violations);
    Ok(())
}

#[tokio::test]
async fn custom_recorder_runs_inside_tasks() -> Result<()> {
    let topology = Topology::ring(["P1", "P2"], |id: &ProcessId| {
        let label = id.to_string();
        FnRecorder::new(move |_: &ProcessId| label.len())
    })?;
    let mut runtime: Runtime<u8, _> = Runtime::start(topology);
    runtime.send(&pid("P2"), &pid("P1"), 7)?;
    runtime.initiate(&pid("P2"))?;

    let snapshot = runtime.collect(Duration::from_secs(5)).await?;
    assert_eq!(snapshot.get(&pid("P1")).and_then(|p| p.local_state), Some(2));
    let ledger = runtime.shutdown().await?;
    assert!(ledger.audit(&snapshot).is_empty());
    Ok(())
}

#[tokio::test]
async fn concurrent_scenario_file_runs() -> Result<()> {
    let config = SimulationConfig::from_toml_str(include_str!("../scenarios/concurrent_ring.toml"))?;
    assert_eq!(config.mode, Mode::Concurrent);

    let outcome = run_scenario(&config).await?;
    assert!(outcome.is_consistent());
    assert_eq!(outcome.steps, None);
    Ok(())
}

#[tokio::test]
async fn disconnected_process_times_out() -> Result<()> {
    let mut topology: Topology<String, NamedState> = Topology::ring(["P1", "P2"], |_| NamedState)?;
    topology.add_process("Lonely", NamedState)?;
    topology.connect("Lonely", "P1")?;

    // Lonely has no incoming channel, so no marker ever reaches it.
    let mut runtime = Runtime::start(topology);
    runtime.initiate(&pid("P1"))?;

    let err = runtime.collect(Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, SimulationError::Timeout { pending, .. } if pending >= 1));
    runtime.shutdown().await?;
    Ok(())
}
