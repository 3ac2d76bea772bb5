//! Process graph construction
//!
//! A [`Topology`] owns every process and channel explicitly. Each channel is
//! shared by exactly two owners: the receiving [`Process`], which drains it,
//! and the sending [`Node`], which appends to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use snapline_core::{
    Channel, ChannelId, LocalStateRecorder, Process, ProcessId, TopologyError, TopologyResult,
};
use tokio::sync::Notify;
use tracing::debug;

/// A process together with the channels it sends on.
pub struct Node<M, R: LocalStateRecorder<M>> {
    pub process: Process<M, R>,
    outgoing: BTreeMap<ProcessId, Arc<Channel<M>>>,
    /// Shared by every incoming channel of this node.
    waker: Arc<Notify>,
}

impl<M, R: LocalStateRecorder<M>> Node<M, R> {
    fn new(process: Process<M, R>) -> Self {
        Self {
            process,
            outgoing: BTreeMap::new(),
            waker: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> &ProcessId {
        self.process.id()
    }

    pub fn outgoing(&self) -> &BTreeMap<ProcessId, Arc<Channel<M>>> {
        &self.outgoing
    }

    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.waker)
    }

    /// Send an application message to `to`, letting the recorder see it first.
    pub fn send(&mut self, to: &ProcessId, msg: M) -> TopologyResult<()> {
        let channel = self
            .outgoing
            .get(to)
            .map(Arc::clone)
            .ok_or_else(|| TopologyError::UnknownChannel {
                src: self.id().to_string(),
                dst: to.to_string(),
            })?;
        self.process.note_send(to, &msg);
        channel.send_message(msg);
        Ok(())
    }

    /// Send a marker on every outgoing channel.
    pub fn broadcast_markers(&self) {
        for channel in self.outgoing.values() {
            debug!(channel = %channel.id(), "forwarding marker");
            channel.send_marker();
        }
    }
}

/// Owns the processes and channels of one simulation.
pub struct Topology<M, R: LocalStateRecorder<M>> {
    nodes: BTreeMap<ProcessId, Node<M, R>>,
    channels: BTreeMap<ChannelId, Arc<Channel<M>>>,
}

impl<M, R: LocalStateRecorder<M>> Default for Topology<M, R> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            channels: BTreeMap::new(),
        }
    }
}

impl<M, R: LocalStateRecorder<M>> Topology<M, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process with its local state recorder.
    pub fn add_process(&mut self, id: impl Into<ProcessId>, recorder: R) -> TopologyResult<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(TopologyError::DuplicateProcess(id.to_string()));
        }
        self.nodes
            .insert(id.clone(), Node::new(Process::new(id, recorder)));
        Ok(())
    }

    /// Create the directed channel `src -> dst` and wire both ends.
    pub fn connect(
        &mut self,
        src: impl Into<ProcessId>,
        dst: impl Into<ProcessId>,
    ) -> TopologyResult<Arc<Channel<M>>> {
        let (src, dst) = (src.into(), dst.into());
        if src == dst {
            return Err(TopologyError::SelfLoop(src.to_string()));
        }
        if !self.nodes.contains_key(&src) {
            return Err(TopologyError::UnknownProcess(src.to_string()));
        }
        let id = ChannelId::new(src.clone(), dst.clone());
        if self.channels.contains_key(&id) {
            return Err(TopologyError::DuplicateChannel {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }

        let receiver = self
            .nodes
            .get_mut(&dst)
            .ok_or_else(|| TopologyError::UnknownProcess(dst.to_string()))?;
        let channel = Arc::new(Channel::with_waker(src.clone(), dst.clone(), receiver.waker()));
        receiver.process.attach_incoming(Arc::clone(&channel))?;

        if let Some(sender) = self.nodes.get_mut(&src) {
            sender.outgoing.insert(dst, Arc::clone(&channel));
        }
        self.channels.insert(id, Arc::clone(&channel));
        Ok(channel)
    }

    /// Processes `ids[0] -> ids[1] -> ... -> ids[n-1] -> ids[0]`.
    pub fn ring<I, F>(ids: I, mut recorder: F) -> TopologyResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<ProcessId>,
        F: FnMut(&ProcessId) -> R,
    {
        let ids: Vec<ProcessId> = ids.into_iter().map(Into::into).collect();
        let mut topology = Self::new();
        for id in &ids {
            topology.add_process(id.clone(), recorder(id))?;
        }
        if ids.len() > 1 {
            for (i, src) in ids.iter().enumerate() {
                let dst = &ids[(i + 1) % ids.len()];
                topology.connect(src.clone(), dst.clone())?;
            }
        }
        Ok(topology)
    }

    /// Every ordered pair of distinct processes gets a channel.
    pub fn complete<I, F>(ids: I, mut recorder: F) -> TopologyResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<ProcessId>,
        F: FnMut(&ProcessId) -> R,
    {
        let ids: Vec<ProcessId> = ids.into_iter().map(Into::into).collect();
        let mut topology = Self::new();
        for id in &ids {
            topology.add_process(id.clone(), recorder(id))?;
        }
        for src in &ids {
            for dst in &ids {
                if src != dst {
                    topology.connect(src.clone(), dst.clone())?;
                }
            }
        }
        Ok(topology)
    }

    pub fn node(&self, id: &ProcessId) -> Option<&Node<M, R>> {
        self.nodes.get(id)
    }

    /// Mutable access to a node; unknown ids are an error.
    pub fn require_node_mut(&mut self, id: &ProcessId) -> TopologyResult<&mut Node<M, R>> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TopologyError::UnknownProcess(id.to_string()))
    }

    pub fn process(&self, id: &ProcessId) -> Option<&Process<M, R>> {
        self.node(id).map(|node| &node.process)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<M, R>> {
        self.nodes.values()
    }

    pub fn channel(&self, id: &ChannelId) -> Option<&Arc<Channel<M>>> {
        self.channels.get(id)
    }

    pub fn channels(&self) -> &BTreeMap<ChannelId, Arc<Channel<M>>> {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn into_nodes(self) -> BTreeMap<ProcessId, Node<M, R>> {
        self.nodes
    }
}
