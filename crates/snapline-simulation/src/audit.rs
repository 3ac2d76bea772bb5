// Purpose: Checks a recorded snapshot against the driver's view of every send and delivery
//
// The driver sees things no process can: for each message, whether its sender
// had already captured local state when it was sent, and whether its receiver
// had captured when it was delivered. That is enough to compute exactly what
// each channel log must contain for the cut to be consistent.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use snapline_core::{ChannelId, GlobalSnapshot};

/// A departure from the consistent-cut invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CutViolation<M> {
    /// Messages sent after the sender's cut were received before the receiver's cut.
    Orphan { channel: ChannelId, count: usize },
    /// The channel log differs from the messages that crossed the cut.
    RecordedMismatch {
        channel: ChannelId,
        expected: Vec<M>,
        recorded: Vec<M>,
    },
    /// The receiver never got the marker for this channel.
    ChannelStillOpen { channel: ChannelId },
}

impl<M: fmt::Debug> fmt::Display for CutViolation<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orphan { channel, count } => write!(
                f,
                "{}: {} message(s) sent after the sender's cut were received before the receiver's cut",
                channel, count
            ),
            Self::RecordedMismatch {
                channel,
                expected,
                recorded,
            } => write!(f, "{}: recorded {:?}, expected {:?}", channel, recorded, expected),
            Self::ChannelStillOpen { channel } => write!(f, "{}: marker never delivered", channel),
        }
    }
}

/// Send/delivery history of a single channel.
#[derive(Debug, Clone)]
struct ChannelHistory<M> {
    /// Every message sent, with whether the sender was still before its cut.
    sent: Vec<(M, bool)>,
    /// Messages delivered while the receiver was still before its cut.
    delivered_before_cut: usize,
}

impl<M> Default for ChannelHistory<M> {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            delivered_before_cut: 0,
        }
    }
}

/// Driver-side ledger used to audit a snapshot.
#[derive(Debug, Clone)]
pub struct CutLedger<M> {
    channels: BTreeMap<ChannelId, ChannelHistory<M>>,
}

impl<M> Default for CutLedger<M> {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }
}

impl<M: Clone + PartialEq> CutLedger<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message enqueued on `channel`.
    pub fn record_send(&mut self, channel: &ChannelId, msg: &M, sender_before_cut: bool) {
        self.channels
            .entry(channel.clone())
            .or_default()
            .sent
            .push((msg.clone(), sender_before_cut));
    }

    /// Record a message delivered from `channel`.
    pub fn record_delivery(&mut self, channel: &ChannelId, receiver_before_cut: bool) {
        if receiver_before_cut {
            self.channels
                .entry(channel.clone())
                .or_default()
                .delivered_before_cut += 1;
        }
    }

    /// Fold in a ledger kept by another observer.
    ///
    /// Each channel's sends must all come from one ledger, so their order
    /// survives the merge.
    pub fn merge(&mut self, other: CutLedger<M>) {
        for (channel, history) in other.channels {
            let entry = self.channels.entry(channel).or_default();
            entry.sent.extend(history.sent);
            entry.delivered_before_cut += history.delivered_before_cut;
        }
    }

    /// Compare every recorded channel log with what actually crossed the cut.
    ///
    /// Channels are audited only once their receiver has captured local
    /// state; an empty result means the snapshot is a consistent cut.
    pub fn audit<S>(&self, snapshot: &GlobalSnapshot<S, M>) -> Vec<CutViolation<M>> {
        let mut violations = Vec::new();

        for (receiver, process) in &snapshot.processes {
            if process.local_state.is_none() {
                continue;
            }
            for (sender, recorded) in &process.channel_states {
                let channel = ChannelId::new(sender.clone(), receiver.clone());
                let history = self.channels.get(&channel);

                let (sent_before_cut, delivered_before_cut) = history.map_or((0, 0), |h| {
                    let before = h.sent.iter().take_while(|(_, before)| *before).count();
                    (before, h.delivered_before_cut)
                });

                if delivered_before_cut > sent_before_cut {
                    violations.push(CutViolation::Orphan {
                        channel: channel.clone(),
                        count: delivered_before_cut - sent_before_cut,
                    });
                    continue;
                }

                if !process.closed_channels.contains(sender) {
                    violations.push(CutViolation::ChannelStillOpen { channel });
                    continue;
                }

                let expected: Vec<M> = history
                    .map(|h| {
                        h.sent[delivered_before_cut..sent_before_cut]
                            .iter()
                            .map(|(msg, _)| msg.clone())
                            .collect()
                    })
                    .unwrap_or_default();

                if &expected != recorded {
                    violations.push(CutViolation::RecordedMismatch {
                        channel,
                        expected,
                        recorded: recorded.clone(),
                    });
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapline_core::{ProcessId, ProcessSnapshot, RecordingState};
    use std::collections::BTreeSet;

    fn receiver_snapshot(recorded: Vec<&'static str>, closed: bool) -> GlobalSnapshot<(), &'static str> {
        let mut global = GlobalSnapshot::new();
        let mut closed_channels = BTreeSet::new();
        if closed {
            closed_channels.insert(ProcessId::new("P1"));
        }
        global.insert(ProcessSnapshot {
            process: "P2".into(),
            state: RecordingState::Complete,
            local_state: Some(()),
            channel_states: [(ProcessId::new("P1"), recorded)].into_iter().collect(),
            closed_channels,
        });
        global
    }

    fn c12() -> ChannelId {
        ChannelId::new("P1", "P2")
    }

    #[test]
    fn test_matching_log_is_consistent() {
        let mut ledger = CutLedger::new();
        ledger.record_send(&c12(), &"a", true);
        ledger.record_send(&c12(), &"b", true);
        ledger.record_send(&c12(), &"c", false);
        ledger.record_delivery(&c12(), true);

        assert!(ledger.audit(&receiver_snapshot(vec!["b"], true)).is_empty());
    }

    #[test]
    fn test_merged_sender_and_receiver_ledgers() {
        let mut sender = CutLedger::new();
        sender.record_send(&c12(), &"a", true);
        sender.record_send(&c12(), &"b", true);
        sender.record_send(&c12(), &"c", false);
        let mut receiver = CutLedger::new();
        receiver.record_delivery(&c12(), true);
        receiver.record_delivery(&c12(), false);

        let mut merged = CutLedger::new();
        merged.merge(receiver);
        merged.merge(sender);
        assert!(merged.audit(&receiver_snapshot(vec!["b"], true)).is_empty());
        assert_eq!(
            merged.audit(&receiver_snapshot(vec![], true)),
            vec![CutViolation::RecordedMismatch {
                channel: c12(),
                expected: vec!["b"],
                recorded: vec![],
            }]
        );
    }

    #[test]
    fn test_mismatch_reports_expected_log() {
        let mut ledger = CutLedger::new();
        ledger.record_send(&c12(), &"a", true);

        let violations = ledger.audit(&receiver_snapshot(vec![], true));
        assert_eq!(
            violations,
            vec![CutViolation::RecordedMismatch {
                channel: c12(),
                expected: vec!["a"],
                recorded: vec![],
            }]
        );
    }

    #[test]
    fn test_orphan_message_detected() {
        let mut ledger = CutLedger::new();
        ledger.record_send(&c12(), &"late", false);
        ledger.record_delivery(&c12(), true);

        let violations = ledger.audit(&receiver_snapshot(vec![], true));
        assert_eq!(
            violations,
            vec![CutViolation::Orphan {
                channel: c12(),
                count: 1
            }]
        );
        assert!(violations[0].to_string().contains("P1->P2"));
    }

    #[test]
    fn test_open_channel_reported() {
        let ledger: CutLedger<&'static str> = CutLedger::new();
        let violations = ledger.audit(&receiver_snapshot(vec![], false));
        assert_eq!(violations, vec![CutViolation::ChannelStillOpen { channel: c12() }]);
    }
}
