//! Snapshot results read back by a driver after the epoch

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::ProcessId;

/// Where a process stands in the current snapshot epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// No marker seen yet.
    #[default]
    Idle,
    /// Local state captured; at least one incoming channel still open.
    Recording,
    /// A marker has been received on every incoming channel.
    Complete,
}

/// One process's share of the global snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot<S, M> {
    pub process: ProcessId,
    pub state: RecordingState,
    pub local_state: Option<S>,
    /// Recorded in-flight messages, keyed by the sending process.
    pub channel_states: BTreeMap<ProcessId, Vec<M>>,
    /// Senders whose marker has arrived.
    pub closed_channels: BTreeSet<ProcessId>,
}

impl<S, M> ProcessSnapshot<S, M> {
    pub fn is_complete(&self) -> bool {
        self.state == RecordingState::Complete
    }

    /// Recorded messages for the channel from `sender`, if it is an incoming channel.
    pub fn channel_state(&self, sender: &ProcessId) -> Option<&[M]> {
        self.channel_states.get(sender).map(Vec::as_slice)
    }
}

/// The cut: every process's local state plus every channel's in-flight messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSnapshot<S, M> {
    pub processes: BTreeMap<ProcessId, ProcessSnapshot<S, M>>,
}

impl<S, M> Default for GlobalSnapshot<S, M> {
    fn default() -> Self {
        Self {
            processes: BTreeMap::new(),
        }
    }
}

impl<S, M> GlobalSnapshot<S, M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: ProcessSnapshot<S, M>) {
        self.processes.insert(snapshot.process.clone(), snapshot);
    }

    pub fn get(&self, process: &ProcessId) -> Option<&ProcessSnapshot<S, M>> {
        self.processes.get(process)
    }

    /// True when every process has closed every incoming channel.
    pub fn is_complete(&self) -> bool {
        !self.processes.is_empty() && self.processes.values().all(ProcessSnapshot::is_complete)
    }

    /// Recorded in-flight messages as `(sender, receiver, messages)`.
    pub fn in_flight(&self) -> impl Iterator<Item = (&ProcessId, &ProcessId, &[M])> {
        self.processes.values().flat_map(|snapshot| {
            snapshot
                .channel_states
                .iter()
                .map(move |(sender, msgs)| (sender, &snapshot.process, msgs.as_slice()))
        })
    }

    pub fn total_in_flight(&self) -> usize {
        self.in_flight().map(|(_, _, msgs)| msgs.len()).sum()
    }
}
