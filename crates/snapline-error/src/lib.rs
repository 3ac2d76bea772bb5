// Snapline Error Handling Framework
// Central location for error types, traits, and handling utilities

use std::error::Error as StdError;
use std::fmt;

pub use thiserror;

mod protocol;
mod topology;

pub use protocol::{ProtocolError, ProtocolResult};
pub use topology::{TopologyError, TopologyResult};

/// Error domains representing different components of the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorDomain {
    Protocol,
    Topology,
    Simulation,
    Config,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Protocol => write!(f, "protocol"),
            ErrorDomain::Topology => write!(f, "topology"),
            ErrorDomain::Simulation => write!(f, "simulation"),
            ErrorDomain::Config => write!(f, "config"),
        }
    }
}

/// Error code structure for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Error codes, grouped by domain.
pub mod codes {
    use crate::ErrorCode;

    // Protocol error codes start with 1000
    pub const CHANNEL_NOT_FOUND: ErrorCode = ErrorCode(1001);
    pub const DUPLICATE_MARKER: ErrorCode = ErrorCode(1002);
    pub const ALREADY_RECORDING: ErrorCode = ErrorCode(1003);

    // Topology error codes start with 2000
    pub const UNKNOWN_PROCESS: ErrorCode = ErrorCode(2001);
    pub const DUPLICATE_PROCESS: ErrorCode = ErrorCode(2002);
    pub const DUPLICATE_CHANNEL: ErrorCode = ErrorCode(2003);
    pub const SELF_LOOP: ErrorCode = ErrorCode(2004);
    pub const WRONG_DESTINATION: ErrorCode = ErrorCode(2005);
    pub const UNKNOWN_CHANNEL: ErrorCode = ErrorCode(2006);

    // Simulation error codes start with 3000
    pub const STEP_LIMIT: ErrorCode = ErrorCode(3001);
    pub const TIMEOUT: ErrorCode = ErrorCode(3002);
    pub const RUNTIME: ErrorCode = ErrorCode(3003);

    // Configuration error codes start with 4000
    pub const INVALID_CONFIG: ErrorCode = ErrorCode(4001);
    pub const CONFIG_IO: ErrorCode = ErrorCode(4002);
    pub const CONFIG_PARSE: ErrorCode = ErrorCode(4003);
}

/// Standard error message format for serialization
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub domain: ErrorDomain,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Base trait for all errors in the Snapline workspace.
pub trait SnaplineError: StdError + Send + Sync + 'static {
    /// Numeric code identifying the failure.
    fn code(&self) -> ErrorCode;

    /// Component the failure originated from.
    fn domain(&self) -> ErrorDomain;

    /// Render the error in the serializable message format.
    fn to_message(&self) -> ErrorMessage {
        ErrorMessage {
            code: self.code(),
            domain: self.domain(),
            message: self.to_string(),
            details: None,
        }
    }
}

/// Shorthand for a boxed SnaplineError
pub type BoxError = Box<dyn SnaplineError>;

impl From<ProtocolError> for BoxError {
    fn from(err: ProtocolError) -> Self {
        Box::new(err)
    }
}

impl From<TopologyError> for BoxError {
    fn from(err: TopologyError) -> Self {
        Box::new(err)
    }
}
