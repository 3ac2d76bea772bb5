//! Snapline Simulation
//!
//! Drives the marker protocol from `snapline-core` over explicit process
//! graphs.
//!
//! ## Core Components
//!
//! - **Topology**: owns every process and channel of one run
//! - **Simulation**: the sequential driver, delivering one whole channel at a time
//! - **Runtime**: one tokio task per process for concurrent delivery
//! - **CutLedger**: checks a recorded snapshot against what was actually sent and delivered
//! - **SimulationConfig**: TOML scenarios with an ordered script of steps
//!
//! ## Getting Started
//!
//! ```rust
//! use snapline_core::NamedState;
//! use snapline_simulation::{DriverConfig, Simulation, Topology};
//!
//! let topology = Topology::ring(["P1", "P2", "P3"], |_| NamedState).unwrap();
//! let mut sim: Simulation<String, NamedState> = Simulation::new(topology, DriverConfig::default());
//!
//! sim.send(&"P1".into(), &"P2".into(), "M1".to_string()).unwrap();
//! sim.initiate(&"P1".into()).unwrap();
//! sim.run_until_quiescent().unwrap();
//!
//! assert!(sim.snapshot().is_complete());
//! assert!(sim.audit().is_empty());
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod randomness;
pub mod runner;
pub mod runtime;
pub mod topology;
pub mod workload;

pub use audit::{CutLedger, CutViolation};
pub use config::{ChannelConfig, Mode, ScriptStep, Shape, SimulationConfig};
pub use driver::{DeliveryPolicy, DriverConfig, Simulation};
pub use error::{SimulationError, SimulationResult};
pub use randomness::SeededRng;
pub use runner::{run_scenario, ScenarioOutcome, ScenarioRunner};
pub use runtime::Runtime;
pub use topology::{Node, Topology};
pub use workload::{initial_supply, random_transfers, snapshot_supply, TokenLedger};
