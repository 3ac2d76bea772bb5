// Purpose: Provides a command-line interface for running snapshot scenarios.

use std::fmt::{self, Debug, Write as _};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use snapline_core::{GlobalSnapshot, ProcessId};
use snapline_error::SnaplineError;
use tracing::{error, info};

use crate::audit::CutViolation;
use crate::config::SimulationConfig;
use crate::driver::{DeliveryPolicy, DriverConfig, Simulation};
use crate::randomness::SeededRng;
use crate::runner::{run_scenario, ScenarioOutcome};
use crate::topology::Topology;
use crate::workload::{initial_supply, random_transfers, snapshot_supply, TokenLedger};

/// Snapline snapshot simulator
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format for snapshot reports
    #[clap(long, value_enum, env = "SNAPLINE_FORMAT", default_value_t = OutputFormat::Pretty, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario file
    Run(RunArgs),

    /// Check a scenario file without running it
    Validate(ValidateArgs),

    /// Run the built-in three-process ring
    Ring,

    /// Move tokens around at random and check the snapshot conserves them
    Tokens(TokensArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Scenario file path
    #[clap(required = true)]
    scenario_path: PathBuf,

    /// Override the scenario's seed
    #[clap(long)]
    seed: Option<u64>,

    /// Exit with an error if the cut is inconsistent
    #[clap(long)]
    fail_on_violation: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Scenario file path
    #[clap(required = true)]
    scenario_path: PathBuf,
}

#[derive(Args, Debug)]
struct TokensArgs {
    /// Number of processes
    #[clap(long, default_value = "4")]
    processes: usize,

    /// Starting balance of every process
    #[clap(long, default_value = "100")]
    balance: u64,

    /// Transfers issued on each side of the snapshot
    #[clap(long, default_value = "25")]
    transfers: usize,

    /// Largest single transfer
    #[clap(long, default_value = "20")]
    max_amount: u64,

    /// Wire every pair of processes instead of a ring
    #[clap(long)]
    complete: bool,

    #[clap(long, env = "SNAPLINE_SEED")]
    seed: Option<u64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report
    Pretty,
    /// Pretty-printed JSON
    Json,
}

/// Run the CLI
pub async fn run() -> Result<()> {
    execute(Cli::parse()).await
}

/// Run an already parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => run_file(args, cli.format).await,
        Command::Validate(args) => validate_file(args),
        Command::Ring => {
            let config = SimulationConfig::reference_ring()?;
            let outcome = run_scenario(&config).await?;
            println!("{}", render(&outcome, cli.format)?);
            Ok(())
        }
        Command::Tokens(args) => run_tokens(args, cli.format),
    }
}

async fn run_file(args: RunArgs, format: OutputFormat) -> Result<()> {
    info!("Loading scenario: {}", args.scenario_path.display());
    let mut config = SimulationConfig::from_file(&args.scenario_path)
        .with_context(|| format!("Failed to load scenario: {}", args.scenario_path.display()))?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let outcome = match run_scenario(&config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&e.to_message())?);
            }
            return Err(e).with_context(|| format!("Scenario '{}' failed", config.name));
        }
    };
    println!("{}", render(&outcome, format)?);

    if args.fail_on_violation && !outcome.is_consistent() {
        error!(scenario = %config.name, "snapshot is not a consistent cut");
        bail!(
            "scenario '{}' produced an inconsistent snapshot ({} violation(s))",
            config.name,
            outcome.violations.len()
        );
    }
    Ok(())
}

fn validate_file(args: ValidateArgs) -> Result<()> {
    let config = SimulationConfig::from_file(&args.scenario_path)
        .with_context(|| format!("Invalid scenario: {}", args.scenario_path.display()))?;
    println!(
        "{}: {} process(es), {} script step(s), {:?} mode",
        config.name,
        config.processes.len(),
        config.script.len(),
        config.mode
    );
    Ok(())
}

/// JSON report of a token workload run.
#[derive(Serialize)]
struct TokenReport<'a> {
    seed: u64,
    supply: i128,
    recorded: i128,
    snapshot: &'a GlobalSnapshot<i128, u64>,
    violations: &'a [CutViolation<u64>],
}

fn run_tokens(args: TokensArgs, format: OutputFormat) -> Result<()> {
    if args.processes < 2 {
        bail!("the token workload needs at least two processes");
    }
    let supply = initial_supply(args.processes, args.balance).with_context(|| {
        format!(
            "{} processes holding {} tokens each overflow the token supply",
            args.processes, args.balance
        )
    })?;
    let names: Vec<String> = (1..=args.processes).map(|i| format!("P{}", i)).collect();
    let recorder = |_: &ProcessId| TokenLedger::new(args.balance);
    let topology = if args.complete {
        Topology::complete(names.iter().map(String::as_str), recorder)?
    } else {
        Topology::ring(names.iter().map(String::as_str), recorder)?
    };

    let mut sim = Simulation::new(
        topology,
        DriverConfig {
            delivery: DeliveryPolicy::Random,
            seed: args.seed,
            ..DriverConfig::default()
        },
    );
    let mut rng = SeededRng::new(sim.seed());

    random_transfers(&mut sim, &mut rng, args.transfers, args.max_amount)?;
    sim.initiate(&ProcessId::new(names[0].as_str()))?;
    random_transfers(&mut sim, &mut rng, args.transfers, args.max_amount)?;
    sim.run_until_quiescent()?;

    let snapshot = sim.snapshot();
    let violations = sim.audit();
    let recorded = snapshot_supply(&snapshot).context("recorded token supply overflows")?;

    match format {
        OutputFormat::Json => {
            let report = TokenReport {
                seed: sim.seed(),
                supply,
                recorded,
                snapshot: &snapshot,
                violations: &violations,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Pretty => {
            let mut out = String::new();
            writeln!(out, "Token workload (seed {})", sim.seed())?;
            write_snapshot(&mut out, &snapshot)?;
            write_violations(&mut out, &violations)?;
            writeln!(out, "Supply: {} expected, {} recorded", supply, recorded)?;
            print!("{}", out);
        }
    }

    if recorded != supply {
        bail!("snapshot recorded {} tokens, expected {}", recorded, supply);
    }
    Ok(())
}

/// Format a scenario outcome for the terminal.
pub fn render(outcome: &ScenarioOutcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Pretty => {
            let mut out = String::new();
            write!(out, "Scenario: {} ({:?}", outcome.scenario, outcome.mode)?;
            if let Some(steps) = outcome.steps {
                write!(out, ", {} batch(es)", steps)?;
            }
            writeln!(out, ")")?;
            write_snapshot(&mut out, &outcome.snapshot)?;
            write_violations(&mut out, &outcome.violations)?;
            Ok(out)
        }
    }
}

fn write_snapshot<S: Debug, M: Debug>(out: &mut String, snapshot: &GlobalSnapshot<S, M>) -> fmt::Result {
    for (id, process) in &snapshot.processes {
        write!(out, "  {:<6}{:?}", id.as_str(), process.state)?;
        match &process.local_state {
            Some(state) => writeln!(out, "  local_state={:?}", state)?,
            None => writeln!(out, "  local_state=<none>")?,
        }
        for (sender, log) in &process.channel_states {
            writeln!(out, "        from {}: {:?}", sender, log)?;
        }
    }
    writeln!(
        out,
        "Complete: {}, in flight: {}",
        if snapshot.is_complete() { "yes" } else { "no" },
        snapshot.total_in_flight()
    )
}

fn write_violations<M: Debug>(out: &mut String, violations: &[CutViolation<M>]) -> fmt::Result {
    if violations.is_empty() {
        return writeln!(out, "Cut consistent: yes");
    }
    writeln!(out, "Cut consistent: no")?;
    for violation in violations {
        writeln!(out, "  - {}", violation)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "snapline",
            "run",
            "scenarios/ring.toml",
            "--fail-on-violation",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Run(args) => {
                assert!(args.fail_on_violation);
                assert_eq!(args.scenario_path, PathBuf::from("scenarios/ring.toml"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_tokens_defaults() {
        let cli = Cli::try_parse_from(["snapline", "tokens"]).unwrap();
        match cli.command {
            Command::Tokens(args) => {
                assert_eq!(args.processes, 4);
                assert_eq!(args.balance, 100);
                assert!(!args.complete);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pretty_report_lists_every_channel() {
        let config = SimulationConfig::reference_ring().unwrap();
        let outcome = run_scenario(&config).await.unwrap();
        let report = render(&outcome, OutputFormat::Pretty).unwrap();

        assert!(report.contains("Scenario: ring (Sequential, 3 batch(es))"));
        assert!(report.contains("local_state=\"Local State of P2\""));
        assert!(report.contains("from P3: []"));
        assert!(report.contains("Cut consistent: yes"));
    }

    #[tokio::test]
    async fn test_json_report_is_valid() {
        let config = SimulationConfig::reference_ring().unwrap();
        let outcome = run_scenario(&config).await.unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&render(&outcome, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["scenario"], "ring");
        assert_eq!(json["snapshot"]["processes"]["P1"]["state"], "complete");
    }

    #[test]
    fn test_token_workload_conserves_supply() {
        let cli = Cli::try_parse_from(["snapline", "tokens", "--seed", "3", "--complete"]).unwrap();
        match cli.command {
            Command::Tokens(args) => run_tokens(args, OutputFormat::Json).unwrap(),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_workload_with_huge_balances() {
        let cli = Cli::try_parse_from([
            "snapline",
            "tokens",
            "--processes",
            "2",
            "--balance",
            "5000000000000000000",
            "--transfers",
            "3",
            "--max-amount",
            "18446744073709551615",
            "--seed",
            "1",
        ])
        .unwrap();
        execute(cli).await.unwrap();
    }

    #[test]
    fn test_negative_balance_is_rejected() {
        assert!(Cli::try_parse_from(["snapline", "tokens", "--balance=-5"]).is_err());
    }
}
