//! Reference Ring Scenario
//!
//! Three processes P1 -> P2 -> P3 -> P1. "M1" and "M2" are in flight when P1
//! starts the snapshot, markers are injected on every channel, and each
//! channel is delivered once in ring order.

use anyhow::Result;
use snapline_core::{ChannelId, NamedState, ProcessId, RecordingState};
use snapline_simulation::{
    run_scenario, DriverConfig, Simulation, SimulationConfig, Topology,
};

fn pid(name: &str) -> ProcessId {
    ProcessId::new(name)
}

fn manual_ring() -> Result<Simulation<String, NamedState>> {
    let topology = Topology::ring(["P1", "P2", "P3"], |_| NamedState)?;
    Ok(Simulation::new(
        topology,
        DriverConfig {
            forward_markers: false,
            ..DriverConfig::default()
        },
    ))
}

#[test]
fn ring_with_whole_batch_delivery_records_empty_channels() -> Result<()> {
    let mut sim = manual_ring()?;
    sim.send(&pid("P1"), &pid("P2"), "M1".into())?;
    sim.send(&pid("P2"), &pid("P3"), "M2".into())?;

    let outcome = sim.initiate(&pid("P1"))?;
    assert!(outcome.captured);
    assert!(!outcome.completed);

    sim.send_marker(&pid("P1"), &pid("P2"))?;
    sim.send_marker(&pid("P2"), &pid("P3"))?;
    sim.send_marker(&pid("P3"), &pid("P1"))?;

    sim.deliver_in_order(&[
        ChannelId::new("P1", "P2"),
        ChannelId::new("P2", "P3"),
        ChannelId::new("P3", "P1"),
    ])?;

    let snapshot = sim.snapshot();
    for (name, sender) in [("P1", "P3"), ("P2", "P1"), ("P3", "P2")] {
        let process = snapshot.get(&pid(name)).expect("process in snapshot");
        assert_eq!(process.state, RecordingState::Complete);
        assert_eq!(
            process.local_state.as_deref(),
            Some(format!("Local State of {}", name).as_str())
        );
        // M1 and M2 share a batch with the marker that follows them, so they
        // are delivered before their receiver starts recording.
        assert_eq!(process.channel_state(&pid(sender)), Some(&[][..]));
    }
    assert!(sim.is_quiescent());
    assert!(sim.audit().is_empty());
    Ok(())
}

#[test]
fn message_delivered_after_capture_is_recorded() -> Result<()> {
    let mut sim = manual_ring()?;
    sim.send(&pid("P3"), &pid("P1"), "M3".into())?;
    sim.initiate(&pid("P1"))?;

    // M3 left P3 before P3's cut and reaches P1 after P1's, so it is in flight.
    sim.deliver(&pid("P3"), &pid("P1"))?;
    sim.send_marker(&pid("P3"), &pid("P1"))?;
    sim.deliver(&pid("P3"), &pid("P1"))?;

    let p1 = sim.process(&pid("P1")).expect("P1 exists");
    assert!(p1.is_complete());
    assert_eq!(p1.channel_state(&pid("P3")), Some(&["M3".to_string()][..]));
    Ok(())
}

#[test]
fn initiator_channel_closes_on_its_own_marker() -> Result<()> {
    let mut sim = manual_ring()?;
    sim.initiate(&pid("P1"))?;
    sim.send_marker(&pid("P3"), &pid("P1"))?;
    sim.send(&pid("P3"), &pid("P1"), "after".into())?;
    sim.deliver(&pid("P3"), &pid("P1"))?;

    let p1 = sim.process(&pid("P1")).expect("P1 exists");
    assert_eq!(p1.channel_state(&pid("P3")), Some(&[][..]));
    assert_eq!(p1.local_state().map(String::as_str), Some("Local State of P1"));
    Ok(())
}

#[tokio::test]
async fn reference_scenario_file_matches_manual_run() -> Result<()> {
    let config = SimulationConfig::reference_ring()?;
    let outcome = run_scenario(&config).await?;

    let mut sim = manual_ring()?;
    sim.send(&pid("P1"), &pid("P2"), "M1".into())?;
    sim.send(&pid("P2"), &pid("P3"), "M2".into())?;
    sim.initiate(&pid("P1"))?;
    for (from, to) in [("P1", "P2"), ("P2", "P3"), ("P3", "P1")] {
        sim.send_marker(&pid(from), &pid(to))?;
    }
    for (from, to) in [("P1", "P2"), ("P2", "P3"), ("P3", "P1")] {
        sim.deliver(&pid(from), &pid(to))?;
    }

    assert_eq!(outcome.snapshot, sim.snapshot());
    assert!(outcome.is_consistent());
    Ok(())
}

#[test]
fn forwarded_markers_need_no_manual_injection() -> Result<()> {
    let topology = Topology::ring(["P1", "P2", "P3"], |_| NamedState)?;
    let mut sim: Simulation<String, NamedState> = Simulation::new(topology, DriverConfig::default());
    sim.send(&pid("P1"), &pid("P2"), "M1".into())?;
    sim.send(&pid("P2"), &pid("P3"), "M2".into())?;
    sim.initiate(&pid("P1"))?;
    sim.run_until_quiescent()?;

    let snapshot = sim.snapshot();
    assert!(snapshot.is_complete());
    assert_eq!(snapshot.total_in_flight(), 0);
    assert!(sim.audit().is_empty());
    Ok(())
}
