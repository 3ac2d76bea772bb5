//! Identifiers and the items that travel over channels

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique, immutable identifier of a simulated process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    /// Create a new process ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProcessId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The fixed endpoints of a directed channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub src: ProcessId,
    pub dst: ProcessId,
}

impl ChannelId {
    pub fn new(src: impl Into<ProcessId>, dst: impl Into<ProcessId>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// An item buffered on a channel.
///
/// Application payloads and the marker share one FIFO so the marker
/// demarcates "before" and "after" the cut on that channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelItem<M> {
    /// An application message.
    Message(M),
    /// The snapshot marker sentinel.
    Marker,
}

impl<M> ChannelItem<M> {
    /// Returns `true` if this is the marker.
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::Marker)
    }

    /// Extracts the payload if this is an application message.
    pub fn as_message(&self) -> Option<&M> {
        match self {
            Self::Message(msg) => Some(msg),
            Self::Marker => None,
        }
    }
}
