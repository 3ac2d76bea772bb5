// Protocol error types
// Raised by a process when a delivered item breaks the marker protocol

use thiserror::Error;

use crate::{codes, ErrorCode, ErrorDomain, SnaplineError};

/// Errors raised by the marker-receipt state machine.
///
/// All of them are local to the offending process: the simulator has no
/// distributed retry layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A marker or message names a sender with no registered incoming channel.
    #[error("{process}: no incoming channel from {sender}")]
    ChannelNotFound { process: String, sender: String },

    /// A second marker arrived on a channel whose recording is already closed.
    #[error("{process}: duplicate marker from {sender} in the current epoch")]
    DuplicateMarker { process: String, sender: String },

    /// The process was asked to initiate while it is already part of the epoch.
    #[error("{process}: snapshot already in progress, cannot initiate")]
    AlreadyRecording { process: String },
}

impl ProtocolError {
    pub fn channel_not_found(process: impl Into<String>, sender: impl Into<String>) -> Self {
        ProtocolError::ChannelNotFound {
            process: process.into(),
            sender: sender.into(),
        }
    }

    pub fn duplicate_marker(process: impl Into<String>, sender: impl Into<String>) -> Self {
        ProtocolError::DuplicateMarker {
            process: process.into(),
            sender: sender.into(),
        }
    }

    pub fn already_recording(process: impl Into<String>) -> Self {
        ProtocolError::AlreadyRecording {
            process: process.into(),
        }
    }

    /// Whether the error is a violation of the once-per-epoch marker rule.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            ProtocolError::DuplicateMarker { .. } | ProtocolError::AlreadyRecording { .. }
        )
    }
}

impl SnaplineError for ProtocolError {
    fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::ChannelNotFound { .. } => codes::CHANNEL_NOT_FOUND,
            ProtocolError::DuplicateMarker { .. } => codes::DUPLICATE_MARKER,
            ProtocolError::AlreadyRecording { .. } => codes::ALREADY_RECORDING,
        }
    }

    fn domain(&self) -> ErrorDomain {
        ErrorDomain::Protocol
    }
}

/// Convenient Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
