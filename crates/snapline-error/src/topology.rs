// Topology error types
// Raised while wiring processes and channels together

use thiserror::Error;

use crate::{codes, ErrorCode, ErrorDomain, SnaplineError};

/// Errors raised while constructing a process graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    #[error("Process already exists: {0}")]
    DuplicateProcess(String),

    #[error("Channel already exists: {src} -> {dst}")]
    DuplicateChannel { src: String, dst: String },

    #[error("No channel from {src} to {dst}")]
    UnknownChannel { src: String, dst: String },

    #[error("Channel from {0} to itself is not allowed")]
    SelfLoop(String),

    /// A channel was attached to a process that is not its destination.
    #[error("Channel {src} -> {dst} cannot be attached to {process}")]
    WrongDestination {
        process: String,
        src: String,
        dst: String,
    },
}

impl SnaplineError for TopologyError {
    fn code(&self) -> ErrorCode {
        match self {
            TopologyError::UnknownProcess(_) => codes::UNKNOWN_PROCESS,
            TopologyError::DuplicateProcess(_) => codes::DUPLICATE_PROCESS,
            TopologyError::DuplicateChannel { .. } => codes::DUPLICATE_CHANNEL,
            TopologyError::UnknownChannel { .. } => codes::UNKNOWN_CHANNEL,
            TopologyError::SelfLoop(_) => codes::SELF_LOOP,
            TopologyError::WrongDestination { .. } => codes::WRONG_DESTINATION,
        }
    }

    fn domain(&self) -> ErrorDomain {
        ErrorDomain::Topology
    }
}

/// Convenient Result type for topology construction
pub type TopologyResult<T> = Result<T, TopologyError>;
