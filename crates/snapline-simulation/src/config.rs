//! Configuration for Simulation
//!
//! Scenario files are TOML. A scenario names its processes, how they are
//! wired, how the run is driven, and an ordered script of steps:
//!
//! ```toml
//! name = "ring"
//! processes = ["P1", "P2", "P3"]
//! shape = "ring"
//!
//! [[script]]
//! action = "initiate"
//! process = "P1"
//!
//! [[script]]
//! action = "run"
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snapline_core::{LocalStateRecorder, ProcessId};

use crate::driver::{DeliveryPolicy, DriverConfig};
use crate::error::{SimulationError, SimulationResult};
use crate::topology::Topology;

const REFERENCE_RING: &str = include_str!("../scenarios/ring.toml");

//-----------------------------------------------------------------------------
// Configuration Structures
//-----------------------------------------------------------------------------

/// Which execution model runs the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Sequential,
    Concurrent,
}

/// Pre-built wiring applied before any explicit `channels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Ring,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub from: String,
    pub to: String,
}

/// One step of a scenario script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Enqueue an application message.
    Send {
        from: String,
        to: String,
        message: String,
    },
    /// Start the snapshot at `process`.
    Initiate { process: String },
    /// Inject a marker by hand. Sequential mode only.
    Marker { from: String, to: String },
    /// Drain one channel. Sequential mode only.
    Deliver { from: String, to: String },
    /// Deliver until every channel is empty. Sequential mode only.
    Run,
}

impl ScriptStep {
    fn processes(&self) -> Vec<&str> {
        match self {
            ScriptStep::Send { from, to, .. }
            | ScriptStep::Marker { from, to }
            | ScriptStep::Deliver { from, to } => vec![from.as_str(), to.as_str()],
            ScriptStep::Initiate { process } => vec![process.as_str()],
            ScriptStep::Run => Vec::new(),
        }
    }

    /// Steps that hand delivery control to the script.
    fn is_manual(&self) -> bool {
        matches!(
            self,
            ScriptStep::Marker { .. } | ScriptStep::Deliver { .. } | ScriptStep::Run
        )
    }
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub processes: Vec<String>,
    #[serde(default)]
    pub shape: Option<Shape>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default = "default_forward_markers")]
    pub forward_markers: bool,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub delivery: DeliveryPolicy,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

fn default_forward_markers() -> bool {
    true
}

fn default_max_steps() -> u64 {
    10_000
}

fn default_collect_timeout_ms() -> u64 {
    5_000
}

impl SimulationConfig {
    /// Load and validate a scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> SimulationResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a scenario from TOML text.
    pub fn from_toml_str(content: &str) -> SimulationResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in three-process ring.
    pub fn reference_ring() -> SimulationResult<Self> {
        Self::from_toml_str(REFERENCE_RING)
    }

    pub fn to_toml_string(&self) -> SimulationResult<String> {
        toml::to_string(self).map_err(|e| SimulationError::configuration(e.to_string()))
    }

    pub fn validate(&self) -> SimulationResult<()> {
        if self.processes.is_empty() {
            return Err(SimulationError::configuration(format!(
                "scenario '{}' declares no processes",
                self.name
            )));
        }
        if self.max_steps == 0 {
            return Err(SimulationError::configuration("max_steps must be positive"));
        }

        let mut known = BTreeSet::new();
        for process in &self.processes {
            if !known.insert(process.as_str()) {
                return Err(SimulationError::configuration(format!(
                    "process '{}' is declared twice",
                    process
                )));
            }
        }

        let channel_ends = self
            .channels
            .iter()
            .flat_map(|c| [c.from.as_str(), c.to.as_str()]);
        let step_ends = self.script.iter().flat_map(ScriptStep::processes);
        for name in channel_ends.chain(step_ends) {
            if !known.contains(name) {
                return Err(SimulationError::configuration(format!(
                    "unknown process '{}'",
                    name
                )));
            }
        }

        if self.mode == Mode::Concurrent {
            if let Some(step) = self.script.iter().find(|s| s.is_manual()) {
                return Err(SimulationError::configuration(format!(
                    "{:?} steps are only allowed in sequential mode",
                    step
                )));
            }
        }
        Ok(())
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            forward_markers: self.forward_markers,
            delivery: self.delivery,
            seed: self.seed,
            max_steps: self.max_steps,
        }
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    /// Wire the declared processes, giving each a recorder from `recorder`.
    pub fn build_topology<M, R, F>(&self, mut recorder: F) -> SimulationResult<Topology<M, R>>
    where
        R: LocalStateRecorder<M>,
        F: FnMut(&ProcessId) -> R,
    {
        let ids = self.processes.iter().map(String::as_str);
        let mut topology = match self.shape {
            Some(Shape::Ring) => Topology::ring(ids, &mut recorder)?,
            Some(Shape::Complete) => Topology::complete(ids, &mut recorder)?,
            None => {
                let mut topology = Topology::new();
                for id in ids {
                    let id = ProcessId::new(id);
                    let r = recorder(&id);
                    topology.add_process(id, r)?;
                }
                topology
            }
        };
        for channel in &self.channels {
            topology.connect(channel.from.as_str(), channel.to.as_str())?;
        }
        Ok(topology)
    }
}
