// Purpose: Runs every process as its own tokio task over shared FIFO channels.
//
// Each task owns its `Node` outright, so a process's state is only ever
// touched from one place. Tasks sleep on the node's `Notify`, which every
// incoming channel signals on send, and drain all incoming channels when
// woken. Pending commands are served before wake-ups. Markers are always
// forwarded.
//
// Tasks share nothing but the channels. Each keeps its own `CutLedger` of
// the sends and deliveries it performed; the ledgers are merged when the
// tasks are shut down.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use snapline_core::{
    ChannelId, GlobalSnapshot, LocalStateRecorder, ProcessId, ProcessSnapshot, TopologyError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audit::CutLedger;
use crate::driver::deliver_batch;
use crate::error::{SimulationError, SimulationResult};
use crate::topology::{Node, Topology};

/// Instructions a node task accepts from the outside.
#[derive(Debug)]
enum Command<M> {
    Send { to: ProcessId, msg: M },
    Initiate,
    Shutdown,
}

/// What node tasks report back to the runtime.
#[derive(Debug)]
enum NodeEvent<S, M> {
    Completed(ProcessSnapshot<S, M>),
    Failed {
        process: ProcessId,
        error: SimulationError,
    },
}

/// A running set of node tasks.
///
/// Must be started from inside a tokio runtime.
pub struct Runtime<M, R: LocalStateRecorder<M>> {
    commands: BTreeMap<ProcessId, mpsc::UnboundedSender<Command<M>>>,
    events: mpsc::UnboundedReceiver<NodeEvent<R::State, M>>,
    tasks: Vec<(ProcessId, JoinHandle<CutLedger<M>>)>,
    collected: BTreeMap<ProcessId, ProcessSnapshot<R::State, M>>,
}

impl<M, R> Runtime<M, R>
where
    M: Clone + PartialEq + Send + 'static,
    R: LocalStateRecorder<M> + 'static,
{
    /// Spawn one task per process in `topology`.
    pub fn start(topology: Topology<M, R>) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let mut commands = BTreeMap::new();
        let mut tasks = Vec::new();

        for (id, node) in topology.into_nodes() {
            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let handle = tokio::spawn(run_node(node, command_rx, event_tx.clone()));
            commands.insert(id.clone(), command_tx);
            tasks.push((id, handle));
        }

        info!(processes = tasks.len(), "concurrent runtime started");
        Self {
            commands,
            events,
            tasks,
            collected: BTreeMap::new(),
        }
    }

    /// Ask `from` to send `msg` to `to`.
    pub fn send(&self, from: &ProcessId, to: &ProcessId, msg: M) -> SimulationResult<()> {
        self.command(
            from,
            Command::Send {
                to: to.clone(),
                msg,
            },
        )
    }

    /// Ask `initiator` to start the snapshot.
    pub fn initiate(&self, initiator: &ProcessId) -> SimulationResult<()> {
        info!(process = %initiator, "snapshot initiated");
        self.command(initiator, Command::Initiate)
    }

    fn command(&self, process: &ProcessId, command: Command<M>) -> SimulationResult<()> {
        let sender = self
            .commands
            .get(process)
            .ok_or_else(|| TopologyError::UnknownProcess(process.to_string()))?;
        sender
            .send(command)
            .map_err(|_| SimulationError::Runtime(format!("task for {} has stopped", process)))
    }

    /// Wait until every process has reported a complete snapshot.
    ///
    /// Snapshots already reported survive a timeout, so a later call only
    /// waits for the remainder.
    pub async fn collect(
        &mut self,
        timeout: Duration,
    ) -> SimulationResult<GlobalSnapshot<R::State, M>> {
        let started = Instant::now();
        let deadline = started + timeout;

        while self.collected.len() < self.commands.len() {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(NodeEvent::Completed(snapshot))) => {
                    debug!(process = %snapshot.process, "snapshot collected");
                    self.collected.insert(snapshot.process.clone(), snapshot);
                }
                Ok(Some(NodeEvent::Failed { process, error })) => {
                    error!(process = %process, error = %error, "node task failed");
                    return Err(error);
                }
                Ok(None) => {
                    return Err(SimulationError::Runtime(
                        "every node task exited before completing".to_string(),
                    ))
                }
                Err(_) => {
                    return Err(SimulationError::Timeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        pending: self.commands.len() - self.collected.len(),
                    })
                }
            }
        }

        let mut global = GlobalSnapshot::new();
        for snapshot in self.collected.values() {
            global.insert(snapshot.clone());
        }
        Ok(global)
    }

    /// Stop every task and wait for them to exit.
    ///
    /// Returns the merged record of every send and delivery the tasks
    /// performed, ready to audit a collected snapshot.
    pub async fn shutdown(self) -> SimulationResult<CutLedger<M>> {
        for sender in self.commands.values() {
            // A task that already stopped has nothing left to shut down.
            let _ = sender.send(Command::Shutdown);
        }

        let (ids, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let mut ledger = CutLedger::new();
        for (id, joined) in ids.iter().zip(join_all(handles).await) {
            let part = joined
                .map_err(|e| SimulationError::Runtime(format!("task for {} panicked: {}", id, e)))?;
            ledger.merge(part);
        }
        info!("concurrent runtime stopped");
        Ok(ledger)
    }
}

async fn run_node<M, R>(
    mut node: Node<M, R>,
    mut commands: mpsc::UnboundedReceiver<Command<M>>,
    events: mpsc::UnboundedSender<NodeEvent<R::State, M>>,
) -> CutLedger<M>
where
    M: Clone + PartialEq + Send + 'static,
    R: LocalStateRecorder<M> + 'static,
{
    let waker = node.waker();
    let mut ledger = CutLedger::new();
    let mut reported = false;

    loop {
        let result = tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::Send { to, msg }) => send(&mut node, &to, msg, &mut ledger),
                Some(Command::Initiate) => initiate(&mut node),
                Some(Command::Shutdown) | None => break,
            },
            _ = waker.notified() => drain(&mut node, &mut ledger),
        };

        match result {
            Ok(()) if node.process.is_complete() && !reported => {
                reported = true;
                let _ = events.send(NodeEvent::Completed(node.process.snapshot()));
            }
            Ok(()) => {}
            Err(error) => {
                warn!(process = %node.id(), error = %error, "stopping node task");
                let _ = events.send(NodeEvent::Failed {
                    process: node.id().clone(),
                    error,
                });
                break;
            }
        }
    }
    debug!(process = %node.id(), "node task exited");
    ledger
}

fn send<M, R>(node: &mut Node<M, R>, to: &ProcessId, msg: M, ledger: &mut CutLedger<M>) -> SimulationResult<()>
where
    M: Clone + PartialEq,
    R: LocalStateRecorder<M>,
{
    let before_cut = !node.process.is_recording();
    let channel = ChannelId::new(node.id().clone(), to.clone());
    node.send(to, msg.clone())?;
    ledger.record_send(&channel, &msg, before_cut);
    Ok(())
}

fn initiate<M, R>(node: &mut Node<M, R>) -> SimulationResult<()>
where
    R: LocalStateRecorder<M>,
{
    node.process.initiate()?;
    node.broadcast_markers();
    Ok(())
}

fn drain<M, R>(node: &mut Node<M, R>, ledger: &mut CutLedger<M>) -> SimulationResult<()>
where
    M: Clone + PartialEq,
    R: LocalStateRecorder<M>,
{
    let senders: Vec<ProcessId> = node.process.incoming_senders().cloned().collect();
    for sender in &senders {
        let batch = match node.process.incoming_channel(sender) {
            Some(channel) => channel.receive_all(),
            None => continue,
        };
        if batch.is_empty() {
            continue;
        }
        deliver_batch(node, sender, batch, true, ledger)?;
    }
    Ok(())
}
