//! Error types for Simulation
//!
//! This module defines the error types used throughout the simulation crate,
//! wrapping protocol and topology failures from the core and adding the
//! driver-level failures (configuration, step limits, timeouts).

//-----------------------------------------------------------------------------
// Error Types
//-----------------------------------------------------------------------------

use snapline_error::{codes, ErrorCode, ErrorDomain, ProtocolError, SnaplineError, TopologyError};
use thiserror::Error;

/// Main error type for the simulation crate.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// A process rejected a delivered marker or message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The process graph could not be built.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Represents an error during simulation setup or configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A scenario file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A scenario file is not valid TOML for the expected schema.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The driver delivered `max_steps` batches without reaching quiescence.
    #[error("Step limit of {0} reached before channels drained")]
    StepLimit(u64),

    /// Not every process completed its snapshot in time.
    #[error("Timed out after {elapsed_ms}ms waiting for {pending} process snapshot(s)")]
    Timeout { elapsed_ms: u64, pending: usize },

    /// Represents an error in the concurrent runtime's task plumbing.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// An error passed up from outside the workspace.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl SnaplineError for SimulationError {
    fn code(&self) -> ErrorCode {
        match self {
            SimulationError::Protocol(err) => err.code(),
            SimulationError::Topology(err) => err.code(),
            SimulationError::Configuration(_) => codes::INVALID_CONFIG,
            SimulationError::Io(_) => codes::CONFIG_IO,
            SimulationError::Parse(_) => codes::CONFIG_PARSE,
            SimulationError::StepLimit(_) => codes::STEP_LIMIT,
            SimulationError::Timeout { .. } => codes::TIMEOUT,
            SimulationError::Runtime(_) | SimulationError::Upstream(_) => codes::RUNTIME,
        }
    }

    fn domain(&self) -> ErrorDomain {
        match self {
            SimulationError::Protocol(_) => ErrorDomain::Protocol,
            SimulationError::Topology(_) => ErrorDomain::Topology,
            SimulationError::Configuration(_) | SimulationError::Io(_) | SimulationError::Parse(_) => {
                ErrorDomain::Config
            }
            _ => ErrorDomain::Simulation,
        }
    }
}

impl SimulationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SimulationError::Configuration(message.into())
    }
}

/// Result type alias for simulation operations.
pub type SimulationResult<T> = Result<T, SimulationError>;
