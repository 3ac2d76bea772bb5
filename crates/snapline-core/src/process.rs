//! Per-process marker/message state machine
//!
//! Each [`Process`] reacts to items drained from its incoming channels:
//!
//! 1. The first marker (or self-initiation) captures local state and opens
//!    recording on every *other* incoming channel. The channel the marker
//!    arrived on has nothing in flight and is closed immediately.
//! 2. Every later marker closes recording on the channel it arrived on.
//! 3. Messages are appended to a channel's log only while that channel is
//!    open, so FIFO order guarantees that post-marker messages are excluded.
//! 4. Once every incoming channel is closed the process is `Complete`.
//!
//! The process never initiates delivery itself; a driver decides when each
//! channel is drained.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use snapline_error::{ProtocolError, ProtocolResult, TopologyError, TopologyResult};
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::recorder::LocalStateRecorder;
use crate::snapshot::{ProcessSnapshot, RecordingState};
use crate::types::{ChannelItem, ProcessId};

/// Result of handing a marker to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkerOutcome {
    /// Local state was captured by this call.
    pub captured: bool,
    /// This call closed the last open incoming channel.
    pub completed: bool,
}

/// Summary of draining one incoming channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sender: ProcessId,
    pub messages: usize,
    pub markers: usize,
    pub captured: bool,
    pub completed: bool,
}

impl DeliveryReport {
    fn new(sender: ProcessId) -> Self {
        Self {
            sender,
            messages: 0,
            markers: 0,
            captured: false,
            completed: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages == 0 && self.markers == 0
    }
}

/// A simulated process participating in one snapshot epoch.
pub struct Process<M, R: LocalStateRecorder<M>> {
    id: ProcessId,
    recorder: R,
    local_state: Option<R::State>,
    state: RecordingState,
    incoming_channels: BTreeMap<ProcessId, Arc<Channel<M>>>,
    channel_states: BTreeMap<ProcessId, Vec<M>>,
    received_marker_from: BTreeSet<ProcessId>,
}

impl<M, R: LocalStateRecorder<M>> Process<M, R> {
    pub fn new(id: impl Into<ProcessId>, recorder: R) -> Self {
        Self {
            id: id.into(),
            recorder,
            local_state: None,
            state: RecordingState::Idle,
            incoming_channels: BTreeMap::new(),
            channel_states: BTreeMap::new(),
            received_marker_from: BTreeSet::new(),
        }
    }

    /// Register an incoming channel, keyed by its source process.
    pub fn attach_incoming(&mut self, channel: Arc<Channel<M>>) -> TopologyResult<()> {
        if channel.dst() != &self.id {
            return Err(TopologyError::WrongDestination {
                process: self.id.to_string(),
                src: channel.src().to_string(),
                dst: channel.dst().to_string(),
            });
        }
        let sender = channel.src().clone();
        if self.incoming_channels.contains_key(&sender) {
            return Err(TopologyError::DuplicateChannel {
                src: sender.to_string(),
                dst: self.id.to_string(),
            });
        }
        self.channel_states.insert(sender.clone(), Vec::new());
        self.incoming_channels.insert(sender, channel);
        Ok(())
    }

    /// Start a snapshot at this process.
    ///
    /// Equivalent to receiving a marker from itself; the caller is then
    /// responsible for sending a marker on every outgoing channel.
    pub fn initiate(&mut self) -> ProtocolResult<MarkerOutcome> {
        let me = self.id.clone();
        self.receive_marker(&me)
    }

    /// Handle a marker that arrived from `sender`.
    pub fn receive_marker(&mut self, sender: &ProcessId) -> ProtocolResult<MarkerOutcome> {
        if *sender != self.id && !self.incoming_channels.contains_key(sender) {
            return Err(ProtocolError::channel_not_found(self.id.as_str(), sender.as_str()));
        }

        match self.state {
            RecordingState::Idle => Ok(self.begin_recording(sender)),
            RecordingState::Recording | RecordingState::Complete => self.close_channel(sender),
        }
    }

    /// Handle an application message that arrived from `sender`.
    pub fn receive_message(&mut self, sender: &ProcessId, msg: M) -> ProtocolResult<()> {
        if !self.incoming_channels.contains_key(sender) {
            return Err(ProtocolError::channel_not_found(self.id.as_str(), sender.as_str()));
        }

        self.recorder.on_message(sender, &msg);

        if self.state == RecordingState::Recording && !self.received_marker_from.contains(sender) {
            if let Some(log) = self.channel_states.get_mut(sender) {
                log.push(msg);
            }
        }
        Ok(())
    }

    /// Drain the channel from `sender` and route each item in send order.
    ///
    /// A protocol error aborts the batch; items after the offending one are
    /// discarded along with it.
    pub fn deliver_from(&mut self, sender: &ProcessId) -> ProtocolResult<DeliveryReport> {
        let channel = self
            .incoming_channels
            .get(sender)
            .cloned()
            .ok_or_else(|| ProtocolError::channel_not_found(self.id.as_str(), sender.as_str()))?;

        let batch = channel.receive_all();
        let mut report = DeliveryReport::new(sender.clone());
        if !batch.is_empty() {
            debug!(channel = %channel.id(), items = batch.len(), "delivering batch");
        }

        for item in batch {
            match item {
                ChannelItem::Marker => {
                    report.markers += 1;
                    let outcome = self.receive_marker(sender)?;
                    report.captured |= outcome.captured;
                    report.completed |= outcome.completed;
                }
                ChannelItem::Message(msg) => {
                    report.messages += 1;
                    self.receive_message(sender, msg)?;
                }
            }
        }
        Ok(report)
    }

    /// Drain every incoming channel once, in sender order.
    pub fn deliver_all(&mut self) -> ProtocolResult<Vec<DeliveryReport>> {
        let senders: Vec<ProcessId> = self.incoming_channels.keys().cloned().collect();
        let mut reports = Vec::with_capacity(senders.len());
        for sender in &senders {
            let report = self.deliver_from(sender)?;
            if !report.is_empty() {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Let the recorder account for a message this process is sending.
    pub fn note_send(&mut self, to: &ProcessId, msg: &M) {
        self.recorder.on_send(to, msg);
    }

    /// First marker: capture local state and open recording.
    fn begin_recording(&mut self, sender: &ProcessId) -> MarkerOutcome {
        self.state = RecordingState::Recording;
        self.local_state = Some(self.recorder.record_local_state(&self.id));
        info!(process = %self.id, trigger = %sender, "records its local state");

        for (peer, log) in self.channel_states.iter_mut() {
            if peer != sender {
                log.clear();
            }
        }

        // The marker is the first thing on its own channel this epoch, so
        // that channel has nothing in flight.
        if *sender != self.id {
            self.received_marker_from.insert(sender.clone());
        }

        MarkerOutcome {
            captured: true,
            completed: self.check_complete(),
        }
    }

    /// Later marker: freeze the log for the channel it arrived on.
    fn close_channel(&mut self, sender: &ProcessId) -> ProtocolResult<MarkerOutcome> {
        if *sender == self.id {
            warn!(process = %self.id, "initiation requested while already recording");
            return Err(ProtocolError::already_recording(self.id.as_str()));
        }
        if !self.received_marker_from.insert(sender.clone()) {
            warn!(process = %self.id, sender = %sender, "duplicate marker");
            return Err(ProtocolError::duplicate_marker(self.id.as_str(), sender.as_str()));
        }

        debug!(
            process = %self.id,
            sender = %sender,
            recorded = self.channel_states.get(sender).map_or(0, Vec::len),
            "channel recording closed"
        );

        Ok(MarkerOutcome {
            captured: false,
            completed: self.check_complete(),
        })
    }

    fn check_complete(&mut self) -> bool {
        let all_closed = self
            .incoming_channels
            .keys()
            .all(|sender| self.received_marker_from.contains(sender));

        if self.state == RecordingState::Recording && all_closed {
            self.state = RecordingState::Complete;
            info!(process = %self.id, "snapshot complete");
            true
        } else {
            false
        }
    }

    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// True from the first marker onwards, including after completion.
    pub fn is_recording(&self) -> bool {
        self.state != RecordingState::Idle
    }

    pub fn is_complete(&self) -> bool {
        self.state == RecordingState::Complete
    }

    pub fn local_state(&self) -> Option<&R::State> {
        self.local_state.as_ref()
    }

    pub fn channel_states(&self) -> &BTreeMap<ProcessId, Vec<M>> {
        &self.channel_states
    }

    pub fn channel_state(&self, sender: &ProcessId) -> Option<&[M]> {
        self.channel_states.get(sender).map(Vec::as_slice)
    }

    pub fn received_marker_from(&self) -> &BTreeSet<ProcessId> {
        &self.received_marker_from
    }

    pub fn incoming_senders(&self) -> impl Iterator<Item = &ProcessId> {
        self.incoming_channels.keys()
    }

    pub fn incoming_channel(&self, sender: &ProcessId) -> Option<&Arc<Channel<M>>> {
        self.incoming_channels.get(sender)
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }
}

impl<M: Clone, R: LocalStateRecorder<M>> Process<M, R> {
    /// Copy out this process's share of the snapshot.
    pub fn snapshot(&self) -> ProcessSnapshot<R::State, M> {
        ProcessSnapshot {
            process: self.id.clone(),
            state: self.state,
            local_state: self.local_state.clone(),
            channel_states: self.channel_states.clone(),
            closed_channels: self.received_marker_from.clone(),
        }
    }
}

impl<M, R: LocalStateRecorder<M>> fmt::Debug for Process<M, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("local_state", &self.local_state)
            .field("incoming", &self.incoming_channels.keys().collect::<Vec<_>>())
            .field("received_marker_from", &self.received_marker_from)
            .finish()
    }
}
