//! Local state capture
//!
//! The algorithm only cares about *when* local state is captured (exactly
//! once, on the first marker), not *what* it contains. Applications plug
//! their own capture in through [`LocalStateRecorder`].

use std::fmt;

use crate::types::ProcessId;

/// Application-defined capture of a process's local state.
///
/// The hooks let an application keep the bookkeeping it later snapshots,
/// e.g. a balance that moves with every transfer sent or received.
pub trait LocalStateRecorder<M>: Send {
    /// The captured value stored in the snapshot.
    type State: Clone + fmt::Debug + Send + 'static;

    /// Capture the current local state. Called once per snapshot epoch.
    fn record_local_state(&mut self, process: &ProcessId) -> Self::State;

    /// Observe an application message delivered to this process.
    fn on_message(&mut self, _from: &ProcessId, _msg: &M) {}

    /// Observe an application message this process is about to send.
    fn on_send(&mut self, _to: &ProcessId, _msg: &M) {}
}

/// Captures the fixed label `"Local State of <name>"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedState;

impl<M> LocalStateRecorder<M> for NamedState {
    type State = String;

    fn record_local_state(&mut self, process: &ProcessId) -> String {
        format!("Local State of {}", process)
    }
}

/// Adapts a closure into a recorder.
pub struct FnRecorder<F> {
    capture: F,
}

impl<F> FnRecorder<F> {
    pub fn new(capture: F) -> Self {
        Self { capture }
    }
}

impl<F> fmt::Debug for FnRecorder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRecorder").finish_non_exhaustive()
    }
}

impl<M, S, F> LocalStateRecorder<M> for FnRecorder<F>
where
    F: FnMut(&ProcessId) -> S + Send,
    S: Clone + fmt::Debug + Send + 'static,
{
    type State = S;

    fn record_local_state(&mut self, process: &ProcessId) -> S {
        (self.capture)(process)
    }
}
