//! Directed FIFO channels
//!
//! A [`Channel`] is an unbounded queue from one process to another. Sends
//! append to the tail; [`Channel::receive_all`] drains the whole buffer in
//! insertion order. Both take the same lock, so a drain is atomic with
//! respect to concurrent sends: an item is either returned by the drain or
//! left for the next one, never both and never dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::trace;

use crate::types::{ChannelId, ChannelItem, ProcessId};

/// A directed, reliable, FIFO channel between two fixed endpoints.
#[derive(Debug)]
pub struct Channel<M> {
    id: ChannelId,
    buffer: Mutex<VecDeque<ChannelItem<M>>>,
    /// Signalled on every send so a reader task can park until data arrives.
    waker: Option<Arc<Notify>>,
}

impl<M> Channel<M> {
    /// Create a new empty channel from `src` to `dst`
    pub fn new(src: impl Into<ProcessId>, dst: impl Into<ProcessId>) -> Self {
        Self {
            id: ChannelId::new(src, dst),
            buffer: Mutex::new(VecDeque::new()),
            waker: None,
        }
    }

    /// Create a channel that notifies `waker` whenever an item is sent.
    pub fn with_waker(
        src: impl Into<ProcessId>,
        dst: impl Into<ProcessId>,
        waker: Arc<Notify>,
    ) -> Self {
        Self {
            waker: Some(waker),
            ..Self::new(src, dst)
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn src(&self) -> &ProcessId {
        &self.id.src
    }

    pub fn dst(&self) -> &ProcessId {
        &self.id.dst
    }

    /// Append an item to the tail of the buffer.
    pub fn send(&self, item: ChannelItem<M>) {
        {
            let mut buffer = self.lock();
            buffer.push_back(item);
            trace!(channel = %self.id, depth = buffer.len(), "item enqueued");
        }
        if let Some(waker) = &self.waker {
            waker.notify_one();
        }
    }

    /// Append an application message.
    pub fn send_message(&self, msg: M) {
        self.send(ChannelItem::Message(msg));
    }

    /// Append the marker sentinel.
    pub fn send_marker(&self) {
        self.send(ChannelItem::Marker);
    }

    /// Drain every buffered item, oldest first, leaving the channel empty.
    pub fn receive_all(&self) -> Vec<ChannelItem<M>> {
        let mut buffer = self.lock();
        buffer.drain(..).collect()
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ChannelItem<M>>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_receive_all_preserves_send_order() {
        let mut rng = rand::thread_rng();
        let channel = Channel::new("P1", "P2");
        let mut expected = Vec::new();

        for i in 0..rng.gen_range(1..200) {
            let item = if rng.gen_bool(0.1) {
                ChannelItem::Marker
            } else {
                ChannelItem::Message(i)
            };
            expected.push(item.clone());
            channel.send(item);
        }

        assert_eq!(channel.receive_all(), expected);
    }

    #[test]
    fn test_second_receive_all_is_empty() {
        let channel = Channel::new("P1", "P2");
        channel.send_message("M1");
        channel.send_marker();

        assert_eq!(channel.receive_all().len(), 2);
        assert!(channel.receive_all().is_empty());
        assert!(channel.is_empty());
    }

    #[test]
    fn test_sends_after_drain_land_in_next_batch() {
        let channel = Channel::new("P1", "P2");
        channel.send_message(1);
        let first = channel.receive_all();
        channel.send_message(2);

        assert_eq!(first, vec![ChannelItem::Message(1)]);
        assert_eq!(channel.receive_all(), vec![ChannelItem::Message(2)]);
    }

    #[test]
    fn test_concurrent_sends_are_neither_lost_nor_duplicated() {
        let channel = Arc::new(Channel::new("P1", "P2"));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let channel = Arc::clone(&channel);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        channel.send_message((w, i));
                    }
                })
            })
            .collect();

        let mut received = Vec::new();
        while received.len() < 2000 {
            received.extend(channel.receive_all());
            std::thread::yield_now();
        }
        for writer in writers {
            writer.join().unwrap();
        }
        received.extend(channel.receive_all());

        assert_eq!(received.len(), 2000);
        // Per-writer order survives the interleaving.
        for w in 0..4 {
            let seq: Vec<_> = received
                .iter()
                .filter_map(|item| item.as_message())
                .filter(|(writer, _)| *writer == w)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(seq, (0..500).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_send_wakes_reader() {
        let waker = Arc::new(Notify::new());
        let channel = Channel::with_waker("P1", "P2", Arc::clone(&waker));
        channel.send_message("M1");

        // The permit is stored even though nobody was waiting yet.
        tokio::time::timeout(std::time::Duration::from_secs(1), waker.notified())
            .await
            .expect("send should notify the reader");
        assert_eq!(channel.len(), 1);
    }
}
