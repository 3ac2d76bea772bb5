//! Token-transfer workload
//!
//! Every process starts with a balance and moves tokens to its neighbours.
//! Tokens are never created or destroyed, so a consistent snapshot must
//! account for the whole supply: the captured balances plus the transfers
//! recorded as in flight.

use snapline_core::{GlobalSnapshot, LocalStateRecorder, ProcessId};
use tracing::debug;

use crate::driver::Simulation;
use crate::error::SimulationResult;
use crate::randomness::SeededRng;

/// Recorder that keeps a running token balance.
///
/// The balance is an `i128` so any `u64` transfer moves it by exactly its
/// amount, whatever the starting balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLedger {
    balance: i128,
}

impl TokenLedger {
    pub fn new(initial: u64) -> Self {
        Self {
            balance: i128::from(initial),
        }
    }

    pub fn balance(&self) -> i128 {
        self.balance
    }
}

impl LocalStateRecorder<u64> for TokenLedger {
    type State = i128;

    fn record_local_state(&mut self, _process: &ProcessId) -> i128 {
        self.balance
    }

    fn on_message(&mut self, _from: &ProcessId, amount: &u64) {
        self.balance = self.balance.saturating_add(i128::from(*amount));
    }

    fn on_send(&mut self, _to: &ProcessId, amount: &u64) {
        self.balance = self.balance.saturating_sub(i128::from(*amount));
    }
}

/// Issue `count` random transfers over the simulation's channels.
///
/// Amounts never exceed the sender's current balance. Returns the number of
/// transfers actually sent; a sender with nothing left is skipped.
pub fn random_transfers(
    sim: &mut Simulation<u64, TokenLedger>,
    rng: &mut SeededRng,
    count: usize,
    max_amount: u64,
) -> SimulationResult<usize> {
    let channels: Vec<_> = sim.topology().channels().keys().cloned().collect();
    let mut sent = 0;

    for _ in 0..count {
        let Some(channel) = rng.sample(&channels).cloned() else {
            break;
        };
        let balance = sim.process(&channel.src).map_or(0, |p| p.recorder().balance());
        let available = u64::try_from(balance.max(0)).unwrap_or(u64::MAX);
        let ceiling = available.min(max_amount);
        if ceiling == 0 {
            continue;
        }
        let amount = rng.gen_range(1..=ceiling);
        debug!(channel = %channel, amount, "transfer");
        sim.send(&channel.src, &channel.dst, amount)?;
        sent += 1;
    }
    Ok(sent)
}

/// Captured balances plus every transfer recorded as in flight.
///
/// Returns `None` if the total does not fit in an `i128`.
pub fn snapshot_supply(snapshot: &GlobalSnapshot<i128, u64>) -> Option<i128> {
    let balances = snapshot
        .processes
        .values()
        .filter_map(|p| p.local_state);
    let in_flight = snapshot
        .in_flight()
        .flat_map(|(_, _, amounts)| amounts.iter())
        .map(|amount| i128::from(*amount));
    balances.chain(in_flight).try_fold(0i128, i128::checked_add)
}

/// The supply `processes` ledgers starting at `balance` hold between them.
pub fn initial_supply(processes: usize, balance: u64) -> Option<i128> {
    i128::try_from(processes).ok()?.checked_mul(i128::from(balance))
}
