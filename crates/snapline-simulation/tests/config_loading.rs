//! Scenario Loading
//!
//! Scenario files on disk, parsed, validated and run end to end.

use std::io::Write;

use anyhow::Result;
use snapline_simulation::{
    run_scenario, DeliveryPolicy, Mode, ScriptStep, Shape, SimulationConfig, SimulationError,
};
use tempfile::NamedTempFile;

fn write_scenario(content: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[tokio::test]
async fn scenario_file_round_trip() -> Result<()> {
    let file = write_scenario(
        r#"
        name = "pair"
        processes = ["A", "B"]
        channels = [{ from = "A", to = "B" }, { from = "B", to = "A" }]

        [[script]]
        action = "send"
        from = "A"
        to = "B"
        message = "hello"

        [[script]]
        action = "initiate"
        process = "B"

        [[script]]
        action = "run"
        "#,
    )?;

    let config = SimulationConfig::from_file(file.path())?;
    assert_eq!(config.shape, None);
    assert_eq!(config.channels.len(), 2);

    let outcome = run_scenario(&config).await?;
    assert!(outcome.is_consistent());
    let b = outcome.snapshot.get(&"B".into()).expect("B in snapshot");
    assert_eq!(b.channel_state(&"A".into()), Some(&["hello".to_string()][..]));
    Ok(())
}

#[test]
fn bundled_scenarios_validate() -> Result<()> {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    let mesh = SimulationConfig::from_file(dir.join("mesh.toml"))?;
    assert_eq!(mesh.shape, Some(Shape::Complete));
    assert_eq!(mesh.delivery, DeliveryPolicy::Random);
    assert_eq!(mesh.script.last(), Some(&ScriptStep::Run));

    let ring = SimulationConfig::from_file(dir.join("ring.toml"))?;
    assert_eq!(ring, SimulationConfig::reference_ring()?);

    let concurrent = SimulationConfig::from_file(dir.join("concurrent_ring.toml"))?;
    assert_eq!(concurrent.mode, Mode::Concurrent);
    Ok(())
}

#[tokio::test]
async fn mesh_scenario_is_consistent() -> Result<()> {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    let config = SimulationConfig::from_file(dir.join("mesh.toml"))?;
    let outcome = run_scenario(&config).await?;
    assert!(outcome.is_consistent(), "{:?}", outcome.violations);
    Ok(())
}

#[test]
fn missing_file_is_io_error() {
    let err = SimulationConfig::from_file("/nonexistent/scenario.toml").unwrap_err();
    assert!(matches!(err, SimulationError::Io(_)));
}

#[tokio::test]
async fn topology_errors_surface_at_run_time() -> Result<()> {
    let file = write_scenario(
        r#"
        name = "dup"
        processes = ["A", "B"]
        shape = "ring"
        channels = [{ from = "A", to = "B" }]
        "#,
    )?;
    let config = SimulationConfig::from_file(file.path())?;
    let err = run_scenario(&config).await.unwrap_err();
    assert!(matches!(err, SimulationError::Topology(_)));
    Ok(())
}
